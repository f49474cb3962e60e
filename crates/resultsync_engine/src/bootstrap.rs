//! Bootstrap: establishing the baseline sync point from a snapshot.

use crate::config::ReactionConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::ErrorStateHandler;
use crate::readiness::{ReadinessGate, ReadinessStatus};
use crate::sink::SinkAdapter;
use crate::snapshot::SnapshotSource;
use crate::sync_point::SyncPointStore;
use crate::transform::DocumentTransform;
use futures::StreamExt;
use resultsync_protocol::{QueryConfig, ResultRow, ViewItem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Bootstraps queries that have no sync point yet.
///
/// For each configured query the bootstrapper either finds an existing sync
/// point (nothing to do; incremental flow takes over) or loads the full
/// snapshot into the sink and initializes the sync point at the snapshot's
/// header sequence. Nothing is committed before the final step, so a
/// restart at any earlier point safely starts over.
pub struct Bootstrapper {
    config: ReactionConfig,
    sink: Arc<dyn SinkAdapter>,
    transform: Arc<dyn DocumentTransform>,
    embeddings: Option<Arc<dyn EmbeddingProvider>>,
    sync_points: Arc<SyncPointStore>,
    readiness: Arc<dyn ReadinessGate>,
    snapshots: Arc<dyn SnapshotSource>,
    errors: Arc<dyn ErrorStateHandler>,
    cancelled: AtomicBool,
}

impl Bootstrapper {
    /// Creates a bootstrapper for a plain key-value sink.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ReactionConfig,
        sink: Arc<dyn SinkAdapter>,
        transform: Arc<dyn DocumentTransform>,
        sync_points: Arc<SyncPointStore>,
        readiness: Arc<dyn ReadinessGate>,
        snapshots: Arc<dyn SnapshotSource>,
        errors: Arc<dyn ErrorStateHandler>,
    ) -> Self {
        Self {
            config,
            sink,
            transform,
            embeddings: None,
            sync_points,
            readiness,
            snapshots,
            errors,
            cancelled: AtomicBool::new(false),
        }
    }

    /// Adds an embedding provider, making preflight verify it too.
    ///
    /// Used by document/vector sinks.
    pub fn with_embeddings(mut self, embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Cancels an ongoing snapshot collection.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn check_cancelled(&self) -> EngineResult<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Verifies the sink (and embedding provider, when configured) is
    /// reachable. Process-wide, runs once before any query work.
    ///
    /// Any failure here is a misconfiguration, not worth retrying: the
    /// termination hook is invoked and the error propagated.
    pub async fn preflight(&self) -> EngineResult<()> {
        let probe_name = format!("_resultsync_probe_{}", Uuid::new_v4().simple());
        let probe_config = QueryConfig::new(probe_name.clone());

        if let Err(e) = self
            .sink
            .create_or_get_collection(&probe_name, &probe_config)
            .await
        {
            let message = format!("sink connectivity test failed: {e}");
            self.errors.terminate(&message);
            return Err(e);
        }
        // Best-effort cleanup; some sinks cannot delete collections.
        if let Err(e) = self.sink.ensure_collection_deleted(&probe_name).await {
            warn!(error = %e, "could not remove preflight probe collection");
        }
        info!("sink connectivity test successful");

        if let Some(embeddings) = &self.embeddings {
            let texts = vec!["connectivity probe".to_string()];
            match embeddings.generate_embeddings(&texts).await {
                Ok(vectors) if vectors.first().is_some_and(|v| !v.is_empty()) => {
                    info!(
                        dimensions = vectors[0].len(),
                        "embedding provider test successful"
                    );
                }
                Ok(_) => {
                    let message = "embedding provider returned an empty vector".to_string();
                    self.errors.terminate(&message);
                    return Err(EngineError::Embedding(message));
                }
                Err(e) => {
                    let message = format!("embedding provider test failed: {e}");
                    self.errors.terminate(&message);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Initializes every configured query.
    ///
    /// Creates the metadata collection, then per query: validates the
    /// configuration, ensures the target collection, and bootstraps from a
    /// snapshot when no sync point exists.
    pub async fn initialize_queries(&self, queries: &[(String, QueryConfig)]) -> EngineResult<()> {
        self.sync_points.initialize_metadata_collection().await?;

        if queries.is_empty() {
            warn!("no queries configured");
            return Ok(());
        }

        for (query_id, config) in queries {
            if let Err(e) = self.initialize_query(query_id, config).await {
                if !matches!(e, EngineError::Cancelled) {
                    self.errors
                        .terminate(&format!("failed to initialize query '{query_id}': {e}"));
                }
                return Err(e);
            }
        }
        info!("all queries initialized");
        Ok(())
    }

    async fn initialize_query(&self, query_id: &str, config: &QueryConfig) -> EngineResult<()> {
        config.validate(query_id)?;

        let collection = self
            .sink
            .create_or_get_collection(&config.collection_name, config)
            .await?;

        if let Some(sequence) = self
            .sync_points
            .get(&self.config.reaction_id, query_id)
            .await?
        {
            info!(query_id, sequence, "query already has a sync point");
            return Ok(());
        }

        info!(query_id, "no sync point found, starting bootstrap");
        let status = self
            .readiness
            .wait_ready(query_id, self.config.readiness_timeout)
            .await?;
        if status != ReadinessStatus::Ready {
            return Err(EngineError::QueryNotReady {
                query_id: query_id.into(),
                waited_secs: self.config.readiness_timeout.as_secs(),
            });
        }

        let mut stream = self.snapshots.current_result(query_id).await?;

        let header = match stream.next().await {
            Some(Ok(ViewItem::Header(header))) => header,
            Some(Ok(ViewItem::Row(_))) => {
                return Err(EngineError::snapshot(
                    query_id,
                    "first snapshot element is not a header",
                ));
            }
            Some(Err(e)) => return Err(e),
            None => {
                return Err(EngineError::snapshot(
                    query_id,
                    "snapshot stream ended before producing a header",
                ));
            }
        };
        debug!(query_id, sequence = header.sequence, "snapshot header read");

        let mut rows: Vec<ResultRow> = Vec::new();
        while let Some(item) = stream.next().await {
            self.check_cancelled()?;
            match item? {
                ViewItem::Row(row) => rows.push(row),
                ViewItem::Header(_) => {
                    return Err(EngineError::snapshot(
                        query_id,
                        "unexpected second header in snapshot stream",
                    ));
                }
            }
        }

        if rows.is_empty() {
            info!(query_id, "snapshot carries no rows");
        } else {
            info!(query_id, count = rows.len(), "loading snapshot rows");
            let documents = self.transform.process(rows, config).await?;
            if !documents.is_empty() {
                self.sink.upsert(&collection, documents).await?;
            }
        }

        let initialized = self
            .sync_points
            .initialize(&self.config.reaction_id, query_id, header.sequence)
            .await?;
        if !initialized {
            warn!(
                query_id,
                "sync point already exists; a racing writer finished bootstrap first"
            );
        }
        info!(
            query_id,
            sequence = header.sequence,
            "bootstrap complete"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::lifecycle::RecordingErrorHandler;
    use crate::readiness::MockReadinessGate;
    use crate::sink::MemorySink;
    use crate::snapshot::MockSnapshotSource;
    use crate::transform::PassthroughTransform;
    use serde_json::json;

    struct Fixture {
        sink: Arc<MemorySink>,
        readiness: Arc<MockReadinessGate>,
        snapshots: Arc<MockSnapshotSource>,
        errors: Arc<RecordingErrorHandler>,
        bootstrapper: Bootstrapper,
    }

    fn fixture() -> Fixture {
        let config = ReactionConfig::new("reaction-1").with_embedding_dimensions(4);
        let sink = Arc::new(MemorySink::new());
        let readiness = Arc::new(MockReadinessGate::new());
        let snapshots = Arc::new(MockSnapshotSource::new());
        let errors = Arc::new(RecordingErrorHandler::new());
        let sync_points = Arc::new(SyncPointStore::new(
            Arc::clone(&sink) as Arc<dyn SinkAdapter>,
            config.clone(),
        ));
        let bootstrapper = Bootstrapper::new(
            config,
            Arc::clone(&sink) as Arc<dyn SinkAdapter>,
            Arc::new(PassthroughTransform::new()),
            sync_points,
            Arc::clone(&readiness) as Arc<dyn ReadinessGate>,
            Arc::clone(&snapshots) as Arc<dyn SnapshotSource>,
            Arc::clone(&errors) as Arc<dyn ErrorStateHandler>,
        );
        Fixture {
            sink,
            readiness,
            snapshots,
            errors,
            bootstrapper,
        }
    }

    fn row(id: &str) -> ResultRow {
        let mut row = ResultRow::new();
        row.insert("id".into(), json!(id));
        row
    }

    #[tokio::test]
    async fn preflight_succeeds_against_healthy_sink() {
        let f = fixture();
        f.bootstrapper.preflight().await.unwrap();
        assert!(!f.errors.terminated());
    }

    #[tokio::test]
    async fn preflight_terminates_on_unreachable_sink() {
        let f = fixture();
        f.sink.set_fail_collections(true);
        assert!(f.bootstrapper.preflight().await.is_err());
        assert!(f.errors.terminated());
    }

    #[tokio::test]
    async fn preflight_terminates_on_embedding_failure() {
        let f = fixture();
        let embeddings = Arc::new(MockEmbeddingProvider::new(4));
        embeddings.set_fail(true);
        let bootstrapper = f.bootstrapper.with_embeddings(embeddings);

        assert!(bootstrapper.preflight().await.is_err());
        assert!(f.errors.terminated());
    }

    #[tokio::test]
    async fn bootstrap_loads_snapshot_and_sets_sync_point() {
        let f = fixture();
        f.snapshots.set_stream(
            "orders",
            vec![
                ViewItem::header(10),
                ViewItem::row(row("a")),
                ViewItem::row(row("b")),
            ],
        );

        let queries = vec![("orders".to_string(), QueryConfig::new("orders"))];
        f.bootstrapper.initialize_queries(&queries).await.unwrap();

        assert_eq!(f.sink.document_count("orders"), 2);
        let metadata_doc = f
            .sink
            .document("_resultsync_metadata_reaction-1", "sync_orders")
            .unwrap();
        let metadata =
            resultsync_protocol::SyncPointMetadata::from_content(&metadata_doc.content).unwrap();
        assert_eq!(metadata.sequence, 10);
    }

    #[tokio::test]
    async fn existing_sync_point_skips_snapshot() {
        let f = fixture();
        // No snapshot stream configured; a snapshot read would fail.
        let queries = vec![("orders".to_string(), QueryConfig::new("orders"))];

        f.bootstrapper
            .sync_points
            .initialize_metadata_collection()
            .await
            .unwrap();
        f.bootstrapper
            .sync_points
            .initialize("reaction-1", "orders", 7)
            .await
            .unwrap();

        f.bootstrapper.initialize_queries(&queries).await.unwrap();
        assert_eq!(f.sink.document_count("orders"), 0);
        assert!(!f.errors.terminated());
    }

    #[tokio::test]
    async fn missing_header_is_fatal() {
        let f = fixture();
        f.snapshots
            .set_stream("orders", vec![ViewItem::row(row("a"))]);
        let queries = vec![("orders".to_string(), QueryConfig::new("orders"))];

        let result = f.bootstrapper.initialize_queries(&queries).await;
        assert!(matches!(result, Err(EngineError::Snapshot { .. })));
        assert!(f.errors.terminated());
        assert_eq!(f.sink.document_count("orders"), 0);
    }

    #[tokio::test]
    async fn empty_stream_is_fatal() {
        let f = fixture();
        f.snapshots.set_stream("orders", vec![]);
        let queries = vec![("orders".to_string(), QueryConfig::new("orders"))];

        let result = f.bootstrapper.initialize_queries(&queries).await;
        assert!(matches!(result, Err(EngineError::Snapshot { .. })));
        assert!(f.errors.terminated());
    }

    #[tokio::test]
    async fn header_only_snapshot_initializes_empty() {
        let f = fixture();
        f.snapshots.set_stream("orders", vec![ViewItem::header(3)]);
        let queries = vec![("orders".to_string(), QueryConfig::new("orders"))];

        f.bootstrapper.initialize_queries(&queries).await.unwrap();
        assert_eq!(f.sink.document_count("orders"), 0);
        assert_eq!(
            f.bootstrapper
                .sync_points
                .get("reaction-1", "orders")
                .await
                .unwrap(),
            Some(3)
        );
    }

    #[tokio::test]
    async fn readiness_timeout_terminates() {
        let f = fixture();
        f.readiness.set_status("orders", ReadinessStatus::TimedOut);
        f.snapshots.set_stream("orders", vec![ViewItem::header(1)]);
        let queries = vec![("orders".to_string(), QueryConfig::new("orders"))];

        let result = f.bootstrapper.initialize_queries(&queries).await;
        assert!(matches!(result, Err(EngineError::QueryNotReady { .. })));
        assert!(f.errors.terminated());
    }

    #[tokio::test]
    async fn invalid_config_terminates() {
        let f = fixture();
        let queries = vec![("orders".to_string(), QueryConfig::new(""))];

        let result = f.bootstrapper.initialize_queries(&queries).await;
        assert!(matches!(result, Err(EngineError::Configuration(_))));
        assert!(f.errors.terminated());
    }

    #[tokio::test]
    async fn cancelled_collection_commits_nothing() {
        let f = fixture();
        f.snapshots.set_stream(
            "orders",
            vec![
                ViewItem::header(10),
                ViewItem::row(row("a")),
                ViewItem::row(row("b")),
            ],
        );
        f.bootstrapper.cancel();
        let queries = vec![("orders".to_string(), QueryConfig::new("orders"))];

        let result = f.bootstrapper.initialize_queries(&queries).await;
        assert!(matches!(result, Err(EngineError::Cancelled)));
        assert_eq!(f.sink.document_count("orders"), 0);
        assert_eq!(
            f.bootstrapper
                .sync_points
                .get("reaction-1", "orders")
                .await
                .unwrap(),
            None
        );
        // Cancellation is not a fatal condition.
        assert!(!f.errors.terminated());
    }
}
