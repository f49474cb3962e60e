//! Durable, cached sync points.

use crate::config::ReactionConfig;
use crate::error::{EngineError, EngineResult};
use crate::sink::{SinkAdapter, SinkCollection};
use parking_lot::RwLock;
use resultsync_protocol::{QueryConfig, SinkDocument, SyncPointMetadata};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Key prefix for sync-point records inside the metadata collection.
const SYNC_POINT_KEY_PREFIX: &str = "sync_";

/// Durable, cached cursor per (reaction, query).
///
/// Sync points live in a dedicated metadata collection in the sink, keyed
/// deterministically per query, so sink data and engine bookkeeping never
/// collide. This store is the only writer of sync-point records.
pub struct SyncPointStore {
    sink: Arc<dyn SinkAdapter>,
    config: ReactionConfig,
    cache: RwLock<HashMap<String, u64>>,
    // Serializes durable read-through on cache misses so concurrent callers
    // do not issue duplicate sink reads.
    read_lock: Mutex<()>,
    metadata_collection: RwLock<Option<SinkCollection>>,
}

impl SyncPointStore {
    /// Creates a store over a sink.
    pub fn new(sink: Arc<dyn SinkAdapter>, config: ReactionConfig) -> Self {
        Self {
            sink,
            config,
            cache: RwLock::new(HashMap::new()),
            read_lock: Mutex::new(()),
            metadata_collection: RwLock::new(None),
        }
    }

    /// The storage key for a query's sync point.
    ///
    /// Exposed so the change applier can guard against the engine's own
    /// bookkeeping entry being fed back through the pipeline.
    pub fn sync_point_key_for_query(query_id: &str) -> String {
        format!("{SYNC_POINT_KEY_PREFIX}{query_id}")
    }

    /// Creates the metadata collection this store writes to.
    ///
    /// Must be called once before any other operation.
    pub async fn initialize_metadata_collection(&self) -> EngineResult<()> {
        let name = self.config.metadata_collection_name();
        info!(collection = %name, "initializing metadata collection");

        let metadata_config = QueryConfig::new(name.clone())
            .with_key_field("key")
            .with_document_template("{{content}}");
        let collection = self
            .sink
            .create_or_get_collection(&name, &metadata_config)
            .await?;
        *self.metadata_collection.write() = Some(collection);
        Ok(())
    }

    fn metadata_collection(&self) -> EngineResult<SinkCollection> {
        self.metadata_collection.read().clone().ok_or_else(|| {
            EngineError::Configuration(
                "metadata collection not initialized; call initialize_metadata_collection first"
                    .into(),
            )
        })
    }

    fn cache_key(&self, reaction_id: &str, query_id: &str) -> String {
        format!("{reaction_id}::{query_id}")
    }

    /// Returns the sync point for a (reaction, query), or `None` if never
    /// initialized.
    ///
    /// Cache-first; on a miss the durable record is read under a lock with
    /// a double-check after acquisition.
    pub async fn get(&self, reaction_id: &str, query_id: &str) -> EngineResult<Option<u64>> {
        let collection = self.metadata_collection()?;
        let cache_key = self.cache_key(reaction_id, query_id);

        if let Some(sequence) = self.cache.read().get(&cache_key) {
            debug!(query_id, sequence, "sync point found in cache");
            return Ok(Some(*sequence));
        }

        let _guard = self.read_lock.lock().await;
        if let Some(sequence) = self.cache.read().get(&cache_key) {
            return Ok(Some(*sequence));
        }

        let key = Self::sync_point_key_for_query(query_id);
        match self.sink.get(&collection, &key).await? {
            Some(document) => {
                let metadata = SyncPointMetadata::from_content(&document.content)?;
                self.cache.write().insert(cache_key, metadata.sequence);
                info!(
                    reaction_id,
                    query_id,
                    sequence = metadata.sequence,
                    "loaded sync point from metadata collection"
                );
                Ok(Some(metadata.sequence))
            }
            None => {
                debug!(reaction_id, query_id, "no sync point found");
                Ok(None)
            }
        }
    }

    /// Creates the sync point at an initial sequence.
    ///
    /// Idempotent: returns `false` without writing when a sync point
    /// already exists (a racing writer got there first; not an error).
    pub async fn initialize(
        &self,
        reaction_id: &str,
        query_id: &str,
        initial_sequence: u64,
    ) -> EngineResult<bool> {
        let collection = self.metadata_collection()?;

        if self.get(reaction_id, query_id).await?.is_some() {
            debug!(reaction_id, query_id, "sync point already exists");
            return Ok(false);
        }

        let document = self.build_document(reaction_id, query_id, initial_sequence, 0)?;
        self.sink.upsert(&collection, vec![document]).await?;
        self.cache
            .write()
            .insert(self.cache_key(reaction_id, query_id), initial_sequence);
        info!(
            reaction_id,
            query_id, initial_sequence, "initialized sync point"
        );
        Ok(true)
    }

    /// Advances the sync point, write-through: durable write first, then
    /// cache. Returns `false` on failure instead of an error so the caller
    /// decides fatality.
    pub async fn try_update(&self, reaction_id: &str, query_id: &str, sequence: u64) -> bool {
        match self.update(reaction_id, query_id, sequence).await {
            Ok(()) => true,
            Err(e) => {
                error!(
                    reaction_id,
                    query_id,
                    sequence,
                    error = %e,
                    "failed to update sync point"
                );
                false
            }
        }
    }

    async fn update(&self, reaction_id: &str, query_id: &str, sequence: u64) -> EngineResult<()> {
        let collection = self.metadata_collection()?;

        let processed_count = self
            .read_processed_count(&collection, query_id)
            .await
            .saturating_add(1);
        let document = self.build_document(reaction_id, query_id, sequence, processed_count)?;
        self.sink.upsert(&collection, vec![document]).await?;
        self.cache
            .write()
            .insert(self.cache_key(reaction_id, query_id), sequence);
        debug!(reaction_id, query_id, sequence, "updated sync point");
        Ok(())
    }

    /// Removes the durable record and the cache entry. Explicit reset path.
    pub async fn delete(&self, reaction_id: &str, query_id: &str) -> EngineResult<()> {
        let collection = self.metadata_collection()?;
        let key = Self::sync_point_key_for_query(query_id);
        self.sink.delete(&collection, &[key]).await?;
        self.cache
            .write()
            .remove(&self.cache_key(reaction_id, query_id));
        info!(reaction_id, query_id, "deleted sync point");
        Ok(())
    }

    async fn read_processed_count(&self, collection: &SinkCollection, query_id: &str) -> u64 {
        let key = Self::sync_point_key_for_query(query_id);
        match self.sink.get(collection, &key).await {
            Ok(Some(document)) => SyncPointMetadata::from_content(&document.content)
                .map(|m| m.processed_count)
                .unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                warn!(query_id, error = %e, "could not read processed count");
                0
            }
        }
    }

    fn build_document(
        &self,
        reaction_id: &str,
        query_id: &str,
        sequence: u64,
        processed_count: u64,
    ) -> EngineResult<SinkDocument> {
        let metadata = SyncPointMetadata::new(reaction_id, query_id, sequence, processed_count);
        // Zero vector sized to the configured dimensions; the metadata
        // document is only ever fetched by key.
        Ok(
            SinkDocument::new(Self::sync_point_key_for_query(query_id), metadata.to_content()?)
                .with_title(format!("Sync point for query {query_id}"))
                .with_source("resultsync-metadata")
                .with_vector(vec![0.0; self.config.embedding_dimensions]),
        )
    }
}
