//! Sink-side document types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for serialized sync-point metadata.
pub const SYNC_POINT_METADATA_VERSION: &str = "1.0";

/// The unit written to a document or vector sink.
///
/// For a plain key-value sink the document degenerates to the key plus the
/// serialized record in `content`, with no vector or title.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SinkDocument {
    /// Unique key of the document within its collection.
    pub key: String,
    /// Rendered or serialized document body.
    pub content: String,
    /// Optional short title, rendered from the title template.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Embedding vector, when the sink is a vector store.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    /// When this document was produced by the engine.
    pub timestamp: DateTime<Utc>,
    /// Provenance tag identifying the writer.
    pub source: String,
}

impl SinkDocument {
    /// Creates a document with the given key and content, stamped now.
    pub fn new(key: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            content: content.into(),
            title: None,
            vector: None,
            timestamp: Utc::now(),
            source: "resultsync".into(),
        }
    }

    /// Sets the title.
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the embedding vector.
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Sets the provenance tag.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Durable bookkeeping record for one (reaction, query) pair.
///
/// Serialized as JSON into the `content` of a metadata document. The
/// `sequence` is non-decreasing for the lifetime of the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPointMetadata {
    /// The reaction instance that owns this sync point.
    pub reaction_id: String,
    /// The query this sync point tracks.
    pub query_id: String,
    /// Last feed sequence fully applied to the sink.
    pub sequence: u64,
    /// When the sync point was last written.
    pub last_updated: DateTime<Utc>,
    /// Number of change events applied since bootstrap.
    pub processed_count: u64,
    /// Metadata schema version.
    pub version: String,
}

impl SyncPointMetadata {
    /// Creates metadata for a (reaction, query) pair at a sequence.
    pub fn new(
        reaction_id: impl Into<String>,
        query_id: impl Into<String>,
        sequence: u64,
        processed_count: u64,
    ) -> Self {
        Self {
            reaction_id: reaction_id.into(),
            query_id: query_id.into(),
            sequence,
            last_updated: Utc::now(),
            processed_count,
            version: SYNC_POINT_METADATA_VERSION.into(),
        }
    }

    /// Serializes to the JSON carried in a metadata document's content.
    pub fn to_content(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parses metadata back from a metadata document's content.
    pub fn from_content(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_builder() {
        let doc = SinkDocument::new("a", "hello")
            .with_title("Order A")
            .with_vector(vec![0.1, 0.2])
            .with_source("test");

        assert_eq!(doc.key, "a");
        assert_eq!(doc.title.as_deref(), Some("Order A"));
        assert_eq!(doc.vector.as_deref(), Some(&[0.1, 0.2][..]));
        assert_eq!(doc.source, "test");
    }

    #[test]
    fn metadata_content_round_trip() {
        let metadata = SyncPointMetadata::new("reaction-1", "orders", 42, 7);
        let content = metadata.to_content().unwrap();
        let parsed = SyncPointMetadata::from_content(&content).unwrap();

        assert_eq!(parsed.sequence, 42);
        assert_eq!(parsed.processed_count, 7);
        assert_eq!(parsed.query_id, "orders");
        assert_eq!(parsed.version, SYNC_POINT_METADATA_VERSION);
    }

    #[test]
    fn metadata_rejects_garbage() {
        assert!(SyncPointMetadata::from_content("not json").is_err());
    }
}
