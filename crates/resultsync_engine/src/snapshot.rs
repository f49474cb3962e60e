//! Snapshot stream source.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use futures::stream::{self, Stream};
use parking_lot::Mutex;
use resultsync_protocol::ViewItem;
use std::collections::HashMap;
use std::pin::Pin;

/// A pull-based snapshot stream: one header followed by zero or more rows.
pub type SnapshotStream = Pin<Box<dyn Stream<Item = EngineResult<ViewItem>> + Send>>;

/// Capability for reading the current full result set of a query.
///
/// Used once per query during bootstrap. The first stream element must be a
/// [`ViewItem::Header`]; the bootstrapper treats anything else as fatal.
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Opens the snapshot stream for a query.
    async fn current_result(&self, query_id: &str) -> EngineResult<SnapshotStream>;
}

/// A snapshot source serving canned streams, for tests.
#[derive(Debug, Default)]
pub struct MockSnapshotSource {
    streams: Mutex<HashMap<String, Vec<ViewItem>>>,
}

impl MockSnapshotSource {
    /// Creates a source with no streams configured.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the items served for a query.
    pub fn set_stream(&self, query_id: impl Into<String>, items: Vec<ViewItem>) {
        self.streams.lock().insert(query_id.into(), items);
    }
}

#[async_trait]
impl SnapshotSource for MockSnapshotSource {
    async fn current_result(&self, query_id: &str) -> EngineResult<SnapshotStream> {
        let items = self
            .streams
            .lock()
            .get(query_id)
            .cloned()
            .ok_or_else(|| {
                EngineError::snapshot(query_id, "no snapshot stream configured")
            })?;
        Ok(Box::pin(stream::iter(items.into_iter().map(Ok))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn serves_configured_items() {
        let source = MockSnapshotSource::new();
        let mut row = resultsync_protocol::ResultRow::new();
        row.insert("id".into(), json!("a"));
        source.set_stream("orders", vec![ViewItem::header(10), ViewItem::row(row)]);

        let mut stream = source.current_result("orders").await.unwrap();
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.as_header().unwrap().sequence, 10);
        let second = stream.next().await.unwrap().unwrap();
        assert!(second.as_row().is_some());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn unknown_query_is_an_error() {
        let source = MockSnapshotSource::new();
        assert!(source.current_result("missing").await.is_err());
    }
}
