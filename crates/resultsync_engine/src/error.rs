//! Error types for the sync engine.

use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during synchronization.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid or missing configuration. Fatal, never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Sink operation failed.
    #[error("sink error: {message}")]
    Sink {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Embedding provider failed.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Template compilation or rendering failed.
    #[error("template error: {0}")]
    Template(String),

    /// The snapshot stream was malformed (missing or misplaced header).
    #[error("snapshot error for query '{query_id}': {message}")]
    Snapshot {
        /// The query whose snapshot failed.
        query_id: String,
        /// What went wrong.
        message: String,
    },

    /// The query did not become ready within the configured bound.
    #[error("query '{query_id}' not ready after {waited_secs}s")]
    QueryNotReady {
        /// The query that never became ready.
        query_id: String,
        /// How long the engine waited.
        waited_secs: u64,
    },

    /// A change event arrived for a query that was never bootstrapped.
    #[error("query '{0}' has no sync point; bootstrap must run first")]
    NotBootstrapped(String),

    /// One or more batches of a change event failed to apply.
    #[error(
        "failed to apply change event {sequence} for query '{query_id}' \
         ({} error(s))", .errors.len()
    )]
    ApplyFailed {
        /// The query whose event failed.
        query_id: String,
        /// Sequence of the failed event.
        sequence: u64,
        /// Every batch failure collected while applying the event.
        errors: Vec<EngineError>,
    },

    /// The sync point could not be written after the sink already advanced.
    #[error(
        "failed to record sync point {sequence} for query '{query_id}' \
         after the sink was mutated"
    )]
    SyncPointWrite {
        /// The query whose sync point write failed.
        query_id: String,
        /// Sequence that could not be recorded.
        sequence: u64,
    },

    /// The operation was cancelled.
    #[error("operation cancelled")]
    Cancelled,

    /// JSON serialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    /// Creates a retryable sink error.
    pub fn sink_retryable(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable sink error.
    pub fn sink_fatal(message: impl Into<String>) -> Self {
        Self::Sink {
            message: message.into(),
            retryable: false,
        }
    }

    /// Creates a snapshot error for a query.
    pub fn snapshot(query_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Snapshot {
            query_id: query_id.into(),
            message: message.into(),
        }
    }

    /// Returns true if this error must terminate the process.
    ///
    /// Fatal conditions are misconfiguration, untrusted snapshot baselines,
    /// readiness timeouts, and a cursor that diverged from the sink.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Configuration(_)
                | EngineError::Snapshot { .. }
                | EngineError::QueryNotReady { .. }
                | EngineError::NotBootstrapped(_)
                | EngineError::SyncPointWrite { .. }
        )
    }

    /// Returns true if the operation can be retried from the same sequence.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Sink { retryable, .. } => *retryable,
            EngineError::ApplyFailed { .. } => true,
            EngineError::Embedding(_) => true,
            _ => false,
        }
    }
}

impl From<resultsync_protocol::ConfigError> for EngineError {
    fn from(err: resultsync_protocol::ConfigError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}
