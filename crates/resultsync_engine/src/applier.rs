//! Incremental change application.

use crate::config::ReactionConfig;
use crate::error::{EngineError, EngineResult};
use crate::lifecycle::ErrorStateHandler;
use crate::sink::SinkAdapter;
use crate::sync_point::SyncPointStore;
use crate::transform::DocumentTransform;
use resultsync_protocol::{ChangeEvent, QueryConfig, ResultRow};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Applies incremental change events under the ordering/idempotency guard.
///
/// An event whose sequence is at or below the stored sync point is a no-op;
/// otherwise its upserts and deletes are issued against the sink and, only
/// if both batches succeed, the sync point advances to the event's sequence.
pub struct ChangeApplier {
    config: ReactionConfig,
    sink: Arc<dyn SinkAdapter>,
    transform: Arc<dyn DocumentTransform>,
    sync_points: Arc<SyncPointStore>,
    errors: Arc<dyn ErrorStateHandler>,
}

impl ChangeApplier {
    /// Creates an applier over a sink and transform.
    pub fn new(
        config: ReactionConfig,
        sink: Arc<dyn SinkAdapter>,
        transform: Arc<dyn DocumentTransform>,
        sync_points: Arc<SyncPointStore>,
        errors: Arc<dyn ErrorStateHandler>,
    ) -> Self {
        Self {
            config,
            sink,
            transform,
            sync_points,
            errors,
        }
    }

    /// Applies one change event.
    ///
    /// Returns `Ok(())` both for a fully applied event and for a stale one
    /// that was skipped. A partial failure surfaces as
    /// [`EngineError::ApplyFailed`] with the sync point withheld, so the
    /// event can be retried from the same sequence.
    pub async fn handle_change(
        &self,
        event: &ChangeEvent,
        query_config: &QueryConfig,
    ) -> EngineResult<()> {
        debug!(
            query_id = %event.query_id,
            sequence = event.sequence,
            added = event.added_results.len(),
            updated = event.updated_results.len(),
            deleted = event.deleted_results.len(),
            "received change event"
        );

        let reaction_id = self.config.reaction_id.clone();
        let current = self
            .sync_points
            .get(&reaction_id, &event.query_id)
            .await?
            .ok_or_else(|| {
                warn!(query_id = %event.query_id, "change event for unbootstrapped query");
                EngineError::NotBootstrapped(event.query_id.clone())
            })?;

        if event.sequence <= current {
            debug!(
                query_id = %event.query_id,
                sequence = event.sequence,
                sync_point = current,
                "skipping stale change event"
            );
            return Ok(());
        }

        let collection = self
            .sink
            .create_or_get_collection(&query_config.collection_name, query_config)
            .await?;

        let reserved_key = SyncPointStore::sync_point_key_for_query(&event.query_id);
        let upsert_rows = self.partition_rows(
            event.upsert_rows(),
            query_config,
            &reserved_key,
        )?;
        let delete_keys = self.partition_keys(
            event.deleted_results.iter(),
            query_config,
            &reserved_key,
        )?;

        let mut failures: Vec<EngineError> = Vec::new();

        if !upsert_rows.is_empty() {
            match self.transform.process(upsert_rows, query_config).await {
                Ok(documents) if !documents.is_empty() => {
                    if let Err(e) = self.sink.upsert(&collection, documents).await {
                        error!(
                            query_id = %event.query_id,
                            sequence = event.sequence,
                            error = %e,
                            "upsert batch failed"
                        );
                        failures.push(e);
                    }
                }
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => failures.push(e),
            }
        }

        if !delete_keys.is_empty() {
            if let Err(e) = self.sink.delete(&collection, &delete_keys).await {
                error!(
                    query_id = %event.query_id,
                    sequence = event.sequence,
                    error = %e,
                    "delete batch failed"
                );
                failures.push(e);
            }
        }

        if !failures.is_empty() {
            return Err(EngineError::ApplyFailed {
                query_id: event.query_id.clone(),
                sequence: event.sequence,
                errors: failures,
            });
        }

        if self
            .sync_points
            .try_update(&reaction_id, &event.query_id, event.sequence)
            .await
        {
            info!(
                query_id = %event.query_id,
                sequence = event.sequence,
                "change event applied"
            );
            Ok(())
        } else {
            // The sink already advanced but the cursor did not; reconciling
            // automatically is unsafe.
            let err = EngineError::SyncPointWrite {
                query_id: event.query_id.clone(),
                sequence: event.sequence,
            };
            self.errors.terminate(&err.to_string());
            Err(err)
        }
    }

    /// Collects upsert rows, dropping any whose key is the sync point's own
    /// storage key.
    fn partition_rows<'a>(
        &self,
        rows: impl Iterator<Item = &'a ResultRow>,
        query_config: &QueryConfig,
        reserved_key: &str,
    ) -> EngineResult<Vec<ResultRow>> {
        let mut kept = Vec::new();
        for row in rows {
            let key = self.transform.extract_key(row, query_config)?;
            if key == reserved_key {
                debug!(key, "dropping record with reserved sync-point key");
                continue;
            }
            kept.push(row.clone());
        }
        Ok(kept)
    }

    /// Collects delete keys, with the same reserved-key guard.
    fn partition_keys<'a>(
        &self,
        rows: impl Iterator<Item = &'a ResultRow>,
        query_config: &QueryConfig,
        reserved_key: &str,
    ) -> EngineResult<Vec<String>> {
        let mut keys = Vec::new();
        for row in rows {
            let key = self.transform.extract_key(row, query_config)?;
            if key == reserved_key {
                debug!(key, "dropping delete with reserved sync-point key");
                continue;
            }
            keys.push(key);
        }
        Ok(keys)
    }
}
