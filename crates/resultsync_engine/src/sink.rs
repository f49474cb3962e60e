//! Sink capability abstraction.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use parking_lot::RwLock;
use resultsync_protocol::{QueryConfig, SinkDocument};
use std::collections::{BTreeMap, HashMap};

/// Handle to a collection in a sink.
///
/// Obtained from [`SinkAdapter::create_or_get_collection`] and passed back
/// to the mutation operations. The handle is cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SinkCollection {
    name: String,
}

impl SinkCollection {
    /// Creates a handle for a collection name.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// The collection name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Capability interface over an external store.
///
/// Both the bootstrapper and the change applier depend only on this trait,
/// never on a concrete store client. Implementations cover two families:
/// plain key-value pass-through and document/vector stores.
#[async_trait]
pub trait SinkAdapter: Send + Sync {
    /// Gets or creates a collection, returning a handle to it.
    ///
    /// When `config.create_collection` is false the collection must already
    /// exist.
    async fn create_or_get_collection(
        &self,
        name: &str,
        config: &QueryConfig,
    ) -> EngineResult<SinkCollection>;

    /// Upserts documents into a collection. Existing keys are overwritten.
    async fn upsert(
        &self,
        collection: &SinkCollection,
        documents: Vec<SinkDocument>,
    ) -> EngineResult<()>;

    /// Deletes documents from a collection by key. Missing keys are not an
    /// error.
    async fn delete(&self, collection: &SinkCollection, keys: &[String]) -> EngineResult<()>;

    /// Gets a document by key, or `None` if absent.
    async fn get(
        &self,
        collection: &SinkCollection,
        key: &str,
    ) -> EngineResult<Option<SinkDocument>>;

    /// Returns true if a collection exists.
    async fn exists(&self, name: &str) -> EngineResult<bool>;

    /// Deletes a collection if it exists. Not all sinks support this.
    async fn ensure_collection_deleted(&self, name: &str) -> EngineResult<()>;
}

#[derive(Debug, Default)]
struct MemorySinkState {
    collections: HashMap<String, BTreeMap<String, SinkDocument>>,
    upsert_calls: u64,
    delete_calls: u64,
    get_calls: u64,
    fail_upserts: bool,
    fail_deletes: bool,
    fail_collections: bool,
}

/// An in-memory sink for tests and local runs.
///
/// Stores documents per collection and offers failure injection plus
/// mutation counters so tests can assert exactly how the engine touched
/// the sink.
#[derive(Debug, Default)]
pub struct MemorySink {
    state: RwLock<MemorySinkState>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every upsert fail until cleared.
    pub fn set_fail_upserts(&self, fail: bool) {
        self.state.write().fail_upserts = fail;
    }

    /// Makes every delete fail until cleared.
    pub fn set_fail_deletes(&self, fail: bool) {
        self.state.write().fail_deletes = fail;
    }

    /// Makes collection creation and existence checks fail until cleared.
    pub fn set_fail_collections(&self, fail: bool) {
        self.state.write().fail_collections = fail;
    }

    /// Number of upsert calls issued against this sink.
    pub fn upsert_calls(&self) -> u64 {
        self.state.read().upsert_calls
    }

    /// Number of delete calls issued against this sink.
    pub fn delete_calls(&self) -> u64 {
        self.state.read().delete_calls
    }

    /// Number of get calls issued against this sink.
    pub fn get_calls(&self) -> u64 {
        self.state.read().get_calls
    }

    /// Number of documents in a collection, or 0 if it does not exist.
    pub fn document_count(&self, collection: &str) -> usize {
        self.state
            .read()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Fetches a document without going through the async trait.
    pub fn document(&self, collection: &str, key: &str) -> Option<SinkDocument> {
        self.state
            .read()
            .collections
            .get(collection)
            .and_then(|c| c.get(key))
            .cloned()
    }

    /// All keys in a collection, sorted.
    pub fn keys(&self, collection: &str) -> Vec<String> {
        self.state
            .read()
            .collections
            .get(collection)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SinkAdapter for MemorySink {
    async fn create_or_get_collection(
        &self,
        name: &str,
        config: &QueryConfig,
    ) -> EngineResult<SinkCollection> {
        let mut state = self.state.write();
        if state.fail_collections {
            return Err(EngineError::sink_retryable("injected collection failure"));
        }
        if !state.collections.contains_key(name) {
            if !config.create_collection {
                return Err(EngineError::sink_fatal(format!(
                    "collection '{name}' does not exist and creation is disabled"
                )));
            }
            state.collections.insert(name.to_string(), BTreeMap::new());
        }
        Ok(SinkCollection::new(name))
    }

    async fn upsert(
        &self,
        collection: &SinkCollection,
        documents: Vec<SinkDocument>,
    ) -> EngineResult<()> {
        let mut state = self.state.write();
        if state.fail_upserts {
            return Err(EngineError::sink_retryable("injected upsert failure"));
        }
        state.upsert_calls += 1;
        let entries = state
            .collections
            .get_mut(collection.name())
            .ok_or_else(|| {
                EngineError::sink_fatal(format!("unknown collection '{}'", collection.name()))
            })?;
        for document in documents {
            entries.insert(document.key.clone(), document);
        }
        Ok(())
    }

    async fn delete(&self, collection: &SinkCollection, keys: &[String]) -> EngineResult<()> {
        let mut state = self.state.write();
        if state.fail_deletes {
            return Err(EngineError::sink_retryable("injected delete failure"));
        }
        state.delete_calls += 1;
        let entries = state
            .collections
            .get_mut(collection.name())
            .ok_or_else(|| {
                EngineError::sink_fatal(format!("unknown collection '{}'", collection.name()))
            })?;
        for key in keys {
            entries.remove(key);
        }
        Ok(())
    }

    async fn get(
        &self,
        collection: &SinkCollection,
        key: &str,
    ) -> EngineResult<Option<SinkDocument>> {
        let mut state = self.state.write();
        state.get_calls += 1;
        Ok(state
            .collections
            .get(collection.name())
            .and_then(|c| c.get(key))
            .cloned())
    }

    async fn exists(&self, name: &str) -> EngineResult<bool> {
        let state = self.state.read();
        if state.fail_collections {
            return Err(EngineError::sink_retryable("injected collection failure"));
        }
        Ok(state.collections.contains_key(name))
    }

    async fn ensure_collection_deleted(&self, name: &str) -> EngineResult<()> {
        self.state.write().collections.remove(name);
        Ok(())
    }
}
