//! Per-query sink configuration.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default key field used when a query does not configure one.
pub const DEFAULT_KEY_FIELD: &str = "id";

/// Errors raised when a query configuration is invalid.
///
/// Configuration errors are fatal: they indicate a misdeployed reaction,
/// not a transient condition worth retrying.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// No target collection or store name configured.
    #[error("query '{0}' has no collection name configured")]
    MissingCollectionName(String),

    /// The key field name is empty.
    #[error("query '{0}' has an empty key field")]
    EmptyKeyField(String),

    /// A template string is present but empty.
    #[error("query '{0}' has an empty {1} template")]
    EmptyTemplate(String, &'static str),
}

/// Immutable per-query configuration.
///
/// Loaded once at startup and never mutated. Field names follow the upstream
/// camelCase configuration format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryConfig {
    /// Target collection (or state store) name in the sink.
    pub collection_name: String,
    /// Field of each result record that holds the sink key.
    #[serde(default = "default_key_field")]
    pub key_field: String,
    /// Template rendering a record into document content (vector sinks).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_template: Option<String>,
    /// Optional template rendering a record into a document title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_template: Option<String>,
    /// Whether the engine may create the collection if it does not exist.
    #[serde(default = "default_create_collection")]
    pub create_collection: bool,
}

fn default_key_field() -> String {
    DEFAULT_KEY_FIELD.into()
}

fn default_create_collection() -> bool {
    true
}

impl QueryConfig {
    /// Creates a configuration for a collection with default settings.
    pub fn new(collection_name: impl Into<String>) -> Self {
        Self {
            collection_name: collection_name.into(),
            key_field: default_key_field(),
            document_template: None,
            title_template: None,
            create_collection: true,
        }
    }

    /// Sets the key field.
    pub fn with_key_field(mut self, key_field: impl Into<String>) -> Self {
        self.key_field = key_field.into();
        self
    }

    /// Sets the document template.
    pub fn with_document_template(mut self, template: impl Into<String>) -> Self {
        self.document_template = Some(template.into());
        self
    }

    /// Sets the title template.
    pub fn with_title_template(mut self, template: impl Into<String>) -> Self {
        self.title_template = Some(template.into());
        self
    }

    /// Sets whether the collection may be created.
    pub fn with_create_collection(mut self, create: bool) -> Self {
        self.create_collection = create;
        self
    }

    /// Validates the configuration for a query.
    pub fn validate(&self, query_id: &str) -> Result<(), ConfigError> {
        if self.collection_name.is_empty() {
            return Err(ConfigError::MissingCollectionName(query_id.into()));
        }
        if self.key_field.is_empty() {
            return Err(ConfigError::EmptyKeyField(query_id.into()));
        }
        if matches!(self.document_template.as_deref(), Some("")) {
            return Err(ConfigError::EmptyTemplate(query_id.into(), "document"));
        }
        if matches!(self.title_template.as_deref(), Some("")) {
            return Err(ConfigError::EmptyTemplate(query_id.into(), "title"));
        }
        Ok(())
    }
}
