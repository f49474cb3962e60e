//! Configuration for a reaction instance.

use std::time::Duration;

/// Default bound on waiting for a query to become ready.
const DEFAULT_READINESS_TIMEOUT: Duration = Duration::from_secs(300);

/// Prefix for the metadata collection holding sync points.
const METADATA_COLLECTION_PREFIX: &str = "_resultsync_metadata_";

/// Configuration for one reaction instance.
///
/// A reaction binds the engine to one external sink and a set of queries.
/// This configuration is process-wide; per-query settings live in
/// [`resultsync_protocol::QueryConfig`].
#[derive(Debug, Clone)]
pub struct ReactionConfig {
    /// Name of this reaction instance.
    pub reaction_id: String,
    /// Prefix for the metadata collection name.
    pub metadata_prefix: String,
    /// How long to wait for a query to become ready during bootstrap.
    ///
    /// Must be strictly shorter than the readiness transport's own timeout
    /// so a logical not-ready result is produced instead of a raw transport
    /// error.
    pub readiness_timeout: Duration,
    /// Dimensionality of embedding vectors, for vector sinks.
    ///
    /// Metadata documents carry a zero vector of this size so one backend
    /// can serve both data and bookkeeping roles.
    pub embedding_dimensions: usize,
}

impl ReactionConfig {
    /// Creates a configuration for a reaction instance.
    pub fn new(reaction_id: impl Into<String>) -> Self {
        Self {
            reaction_id: reaction_id.into(),
            metadata_prefix: METADATA_COLLECTION_PREFIX.into(),
            readiness_timeout: DEFAULT_READINESS_TIMEOUT,
            embedding_dimensions: 1536,
        }
    }

    /// Sets the metadata collection prefix.
    pub fn with_metadata_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.metadata_prefix = prefix.into();
        self
    }

    /// Sets the readiness wait bound.
    pub fn with_readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Sets the embedding dimensionality.
    pub fn with_embedding_dimensions(mut self, dimensions: usize) -> Self {
        self.embedding_dimensions = dimensions;
        self
    }

    /// The metadata collection name for this reaction.
    pub fn metadata_collection_name(&self) -> String {
        format!("{}{}", self.metadata_prefix, self.reaction_id)
    }
}
