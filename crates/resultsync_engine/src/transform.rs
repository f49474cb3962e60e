//! Record-to-document transforms.

use crate::embedding::EmbeddingProvider;
use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use handlebars::Handlebars;
use parking_lot::RwLock;
use resultsync_protocol::{QueryConfig, ResultRow, SinkDocument};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Transforms query result records into sink documents.
///
/// The plain key-value family passes records through unmodified; the
/// document/vector family renders templates and attaches embeddings.
#[async_trait]
pub trait DocumentTransform: Send + Sync {
    /// Transforms a batch of records into sink documents.
    async fn process(
        &self,
        rows: Vec<ResultRow>,
        config: &QueryConfig,
    ) -> EngineResult<Vec<SinkDocument>>;

    /// Extracts the sink key from a record per the configured key field.
    ///
    /// A missing or null key value is a configuration error.
    fn extract_key(&self, row: &ResultRow, config: &QueryConfig) -> EngineResult<String> {
        let value = row.get(&config.key_field).ok_or_else(|| {
            EngineError::Configuration(format!(
                "key field '{}' not found in result record",
                config.key_field
            ))
        })?;
        match value {
            serde_json::Value::Null => Err(EngineError::Configuration(format!(
                "key field '{}' is null in result record",
                config.key_field
            ))),
            serde_json::Value::String(s) => Ok(s.clone()),
            other => Ok(other.to_string()),
        }
    }
}

/// Pass-through transform for plain key-value sinks.
///
/// The record is serialized as-is into the document content; no template
/// rendering and no embedding.
#[derive(Debug, Default)]
pub struct PassthroughTransform;

impl PassthroughTransform {
    /// Creates a pass-through transform.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentTransform for PassthroughTransform {
    async fn process(
        &self,
        rows: Vec<ResultRow>,
        config: &QueryConfig,
    ) -> EngineResult<Vec<SinkDocument>> {
        let mut documents = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = self.extract_key(row, config)?;
            let content = serde_json::to_string(row)?;
            documents.push(SinkDocument::new(key, content));
        }
        Ok(documents)
    }
}

/// Cache of compiled templates keyed by template string.
///
/// Reads take a short read lock on the name map, dropped before anything
/// else is locked; compilation holds the map's write lock for the re-check,
/// naming, and insert, so two callers racing on the same template compile
/// it once and no lock is held during render.
struct TemplateCache {
    registry: RwLock<Handlebars<'static>>,
    names: RwLock<HashMap<String, String>>,
}

impl TemplateCache {
    fn new() -> Self {
        Self {
            registry: RwLock::new(Handlebars::new()),
            names: RwLock::new(HashMap::new()),
        }
    }

    fn render(&self, template: &str, data: &serde_json::Value) -> EngineResult<String> {
        let cached = self.names.read().get(template).cloned();
        let name = match cached {
            Some(name) => name,
            None => self.compile(template)?,
        };
        self.registry
            .read()
            .render(&name, data)
            .map_err(|e| EngineError::Template(e.to_string()))
    }

    fn compile(&self, template: &str) -> EngineResult<String> {
        let mut names = self.names.write();
        // Another caller may have compiled this template while we waited.
        if let Some(name) = names.get(template) {
            return Ok(name.clone());
        }
        let name = format!("tpl-{}", names.len());
        self.registry
            .write()
            .register_template_string(&name, template)
            .map_err(|e| EngineError::Template(e.to_string()))?;
        names.insert(template.to_string(), name.clone());
        debug!(name, "compiled template");
        Ok(name)
    }
}

/// Transform for document/vector sinks.
///
/// Renders document content (and optionally a title) from each record via
/// configured templates, then batches every rendered text into a single
/// embedding call and assigns the vectors back by position.
pub struct DocumentProcessor {
    embeddings: Arc<dyn EmbeddingProvider>,
    templates: TemplateCache,
}

impl DocumentProcessor {
    /// Creates a processor backed by an embedding provider.
    pub fn new(embeddings: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embeddings,
            templates: TemplateCache::new(),
        }
    }

    fn render_content(&self, row: &ResultRow, config: &QueryConfig) -> EngineResult<String> {
        let template = config.document_template.as_deref().ok_or_else(|| {
            EngineError::Configuration("document template is not configured".into())
        })?;
        let data = strip_absent_fields(row);
        self.templates.render(template, &data)
    }

    fn render_title(&self, row: &ResultRow, config: &QueryConfig) -> Option<String> {
        let template = config.title_template.as_deref()?;
        let data = strip_absent_fields(row);
        match self.templates.render(template, &data) {
            Ok(title) => Some(title),
            Err(e) => {
                warn!(error = %e, "failed to render title template");
                None
            }
        }
    }
}

/// Drops null and empty-string fields from a record before rendering.
///
/// Conditional template sections must see these fields as absent rather
/// than present-but-blank.
fn strip_absent_fields(row: &ResultRow) -> serde_json::Value {
    let mut stripped = ResultRow::new();
    for (key, value) in row {
        match value {
            serde_json::Value::Null => {}
            serde_json::Value::String(s) if s.is_empty() => {}
            _ => {
                stripped.insert(key.clone(), value.clone());
            }
        }
    }
    serde_json::Value::Object(stripped)
}

#[async_trait]
impl DocumentTransform for DocumentProcessor {
    async fn process(
        &self,
        rows: Vec<ResultRow>,
        config: &QueryConfig,
    ) -> EngineResult<Vec<SinkDocument>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        debug!(count = rows.len(), "processing records for vectorization");

        let mut documents = Vec::with_capacity(rows.len());
        let mut texts = Vec::with_capacity(rows.len());
        for row in &rows {
            let key = self.extract_key(row, config)?;
            let content = self.render_content(row, config)?;
            let mut document = SinkDocument::new(key, content.clone());
            if let Some(title) = self.render_title(row, config) {
                document = document.with_title(title);
            }
            documents.push(document);
            texts.push(content);
        }

        let vectors = self.embeddings.generate_embeddings(&texts).await?;
        for (document, vector) in documents.iter_mut().zip(vectors) {
            document.vector = Some(vector);
        }
        Ok(documents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use serde_json::json;

    fn row(pairs: &[(&str, serde_json::Value)]) -> ResultRow {
        let mut row = ResultRow::new();
        for (key, value) in pairs {
            row.insert((*key).to_string(), value.clone());
        }
        row
    }

    fn processor() -> DocumentProcessor {
        DocumentProcessor::new(Arc::new(MockEmbeddingProvider::new(4)))
    }

    #[tokio::test]
    async fn passthrough_serializes_record() {
        let transform = PassthroughTransform::new();
        let config = QueryConfig::new("orders");
        let rows = vec![row(&[("id", json!("a")), ("value", json!(1))])];

        let documents = transform.process(rows, &config).await.unwrap();
        assert_eq!(documents.len(), 1);
        assert_eq!(documents[0].key, "a");
        assert!(documents[0].vector.is_none());
        let parsed: serde_json::Value = serde_json::from_str(&documents[0].content).unwrap();
        assert_eq!(parsed["value"], json!(1));
    }

    #[tokio::test]
    async fn missing_key_is_configuration_error() {
        let transform = PassthroughTransform::new();
        let config = QueryConfig::new("orders");
        let rows = vec![row(&[("value", json!(1))])];

        let result = transform.process(rows, &config).await;
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[tokio::test]
    async fn null_key_is_configuration_error() {
        let transform = PassthroughTransform::new();
        let config = QueryConfig::new("orders");
        let rows = vec![row(&[("id", json!(null))])];

        let result = transform.process(rows, &config).await;
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[test]
    fn numeric_key_is_stringified() {
        let transform = PassthroughTransform::new();
        let config = QueryConfig::new("orders");
        let key = transform
            .extract_key(&row(&[("id", json!(42))]), &config)
            .unwrap();
        assert_eq!(key, "42");
    }

    #[tokio::test]
    async fn renders_template_and_embeds_in_batch() {
        let embeddings = Arc::new(MockEmbeddingProvider::new(4));
        let processor = DocumentProcessor::new(Arc::clone(&embeddings) as Arc<_>);
        let config = QueryConfig::new("orders")
            .with_document_template("Order {{id}}: {{item}}")
            .with_title_template("Order {{id}}");
        let rows = vec![
            row(&[("id", json!("a")), ("item", json!("widget"))]),
            row(&[("id", json!("b")), ("item", json!("gadget"))]),
        ];

        let documents = processor.process(rows, &config).await.unwrap();
        assert_eq!(documents.len(), 2);
        assert_eq!(documents[0].content, "Order a: widget");
        assert_eq!(documents[0].title.as_deref(), Some("Order a"));
        assert_eq!(documents[0].vector.as_ref().unwrap().len(), 4);
        // One embedding call for the whole batch.
        assert_eq!(embeddings.calls(), 1);
    }

    #[tokio::test]
    async fn conditional_block_absent_for_null_and_empty_fields() {
        let processor = processor();
        let config = QueryConfig::new("orders")
            .with_document_template("{{id}}{{#if note}} note: {{note}}{{/if}}");

        let with_note = row(&[("id", json!("a")), ("note", json!("rush"))]);
        let null_note = row(&[("id", json!("b")), ("note", json!(null))]);
        let empty_note = row(&[("id", json!("c")), ("note", json!(""))]);

        let documents = processor
            .process(vec![with_note, null_note, empty_note], &config)
            .await
            .unwrap();
        assert_eq!(documents[0].content, "a note: rush");
        assert_eq!(documents[1].content, "b");
        assert_eq!(documents[2].content, "c");
    }

    #[tokio::test]
    async fn missing_document_template_is_configuration_error() {
        let processor = processor();
        let config = QueryConfig::new("orders");
        let result = processor
            .process(vec![row(&[("id", json!("a"))])], &config)
            .await;
        assert!(matches!(result, Err(EngineError::Configuration(_))));
    }

    #[tokio::test]
    async fn failed_title_render_is_dropped_not_fatal() {
        let processor = processor();
        let config = QueryConfig::new("orders")
            .with_document_template("{{id}}")
            .with_title_template("{{#if}}broken{{/if}}");

        let documents = processor
            .process(vec![row(&[("id", json!("a"))])], &config)
            .await
            .unwrap();
        assert_eq!(documents[0].content, "a");
        assert!(documents[0].title.is_none());
    }

    #[tokio::test]
    async fn cold_cache_miss_compiles_and_renders() {
        let processor = processor();
        let first = QueryConfig::new("orders").with_document_template("one {{id}}");
        let second = QueryConfig::new("orders").with_document_template("two {{id}}");

        // Both renders start from a cache miss; each must compile, insert,
        // and render without re-entering the name map.
        let documents = processor
            .process(vec![row(&[("id", json!("a"))])], &first)
            .await
            .unwrap();
        assert_eq!(documents[0].content, "one a");

        let documents = processor
            .process(vec![row(&[("id", json!("a"))])], &second)
            .await
            .unwrap();
        assert_eq!(documents[0].content, "two a");
        assert_eq!(processor.templates.names.read().len(), 2);
    }

    #[tokio::test]
    async fn template_compiled_once_per_string() {
        let processor = processor();
        let config = QueryConfig::new("orders").with_document_template("{{id}}");

        processor
            .process(vec![row(&[("id", json!("a"))])], &config)
            .await
            .unwrap();
        processor
            .process(vec![row(&[("id", json!("b"))])], &config)
            .await
            .unwrap();
        assert_eq!(processor.templates.names.read().len(), 1);
    }

    #[tokio::test]
    async fn embedding_failure_propagates() {
        let embeddings = Arc::new(MockEmbeddingProvider::new(4));
        embeddings.set_fail(true);
        let processor = DocumentProcessor::new(embeddings);
        let config = QueryConfig::new("orders").with_document_template("{{id}}");

        let result = processor
            .process(vec![row(&[("id", json!("a"))])], &config)
            .await;
        assert!(matches!(result, Err(EngineError::Embedding(_))));
    }
}
