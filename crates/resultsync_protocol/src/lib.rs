//! # ResultSync Protocol
//!
//! Data-model types for the ResultSync engine.
//!
//! This crate provides:
//! - `ChangeEvent` for incremental query output batches
//! - `ViewItem` for snapshot stream elements (header + rows)
//! - `SinkDocument` and `SyncPointMetadata` for sink-side records
//! - `QueryConfig` for per-query sink configuration
//!
//! This is a pure data crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_event;
mod config;
mod document;
mod view;

pub use change_event::{ChangeEvent, ResultRow, UpdatedResult};
pub use config::{ConfigError, QueryConfig, DEFAULT_KEY_FIELD};
pub use document::{SinkDocument, SyncPointMetadata, SYNC_POINT_METADATA_VERSION};
pub use view::{ViewHeader, ViewItem};
