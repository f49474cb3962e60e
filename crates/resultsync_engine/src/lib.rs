//! # ResultSync Engine
//!
//! Query-result synchronization engine for ResultSync.
//!
//! This crate provides:
//! - Sync-point store (durable, cached cursor per reaction/query)
//! - Bootstrapper (snapshot load establishing the baseline cursor)
//! - Change applier (ordered, idempotent application of change events)
//! - Capability traits for sinks, transforms, embeddings, readiness probes,
//!   and snapshot sources
//! - In-memory implementations of every capability for tests and local runs
//!
//! ## Architecture
//!
//! The engine bridges a **snapshot + ordered change feed** source with
//! idempotent application to an external sink:
//! 1. Preflight the sink (and embedding provider, for vector sinks)
//! 2. Bootstrap each query without a sync point from a snapshot stream
//! 3. Apply incremental change events, filtering stale sequences
//!
//! ## Key Invariants
//!
//! - The sync point per (reaction, query) is non-decreasing
//! - An event with `sequence <= sync point` causes zero sink mutations
//! - The sync point never advances past a partially failed event
//! - The sync-point store is the only writer of sync-point records
//!
//! A single logical writer per query is assumed; the engine does not
//! coordinate concurrent bootstrap of the same query across instances.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod applier;
mod bootstrap;
mod config;
mod embedding;
mod error;
mod lifecycle;
mod readiness;
mod sink;
mod snapshot;
mod sync_point;
mod transform;

pub use applier::ChangeApplier;
pub use bootstrap::Bootstrapper;
pub use config::ReactionConfig;
pub use embedding::{EmbeddingProvider, MockEmbeddingProvider};
pub use error::{EngineError, EngineResult};
pub use lifecycle::{ErrorStateHandler, RecordingErrorHandler};
pub use readiness::{MockReadinessGate, ReadinessGate, ReadinessStatus};
pub use sink::{MemorySink, SinkAdapter, SinkCollection};
pub use snapshot::{MockSnapshotSource, SnapshotSource, SnapshotStream};
pub use sync_point::SyncPointStore;
pub use transform::{DocumentProcessor, DocumentTransform, PassthroughTransform};
