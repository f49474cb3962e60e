//! Embedding capability abstraction.

use crate::error::{EngineError, EngineResult};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Capability for turning text into embedding vectors.
///
/// Implementations batch remote calls; the engine passes all pending texts
/// in one call to amortize latency. Output order matches input order.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generates one embedding per input text, in input order.
    async fn generate_embeddings(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>>;
}

/// A deterministic embedding provider for tests.
///
/// Produces fixed-dimension vectors derived from the text bytes, so equal
/// texts always embed identically.
#[derive(Debug)]
pub struct MockEmbeddingProvider {
    dimensions: usize,
    fail: Mutex<bool>,
    calls: Mutex<u64>,
}

impl MockEmbeddingProvider {
    /// Creates a provider emitting vectors of the given dimensionality.
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            fail: Mutex::new(false),
            calls: Mutex::new(0),
        }
    }

    /// Makes every call fail until cleared.
    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    /// Number of batch calls made.
    pub fn calls(&self) -> u64 {
        *self.calls.lock()
    }

    fn embed(&self, text: &str) -> Vec<f32> {
        let mut seed = 0u32;
        for byte in text.bytes() {
            seed = seed.wrapping_mul(31).wrapping_add(u32::from(byte));
        }
        (0..self.dimensions)
            .map(|i| {
                let v = seed.wrapping_add(i as u32) % 1000;
                v as f32 / 1000.0
            })
            .collect()
    }
}

#[async_trait]
impl EmbeddingProvider for MockEmbeddingProvider {
    async fn generate_embeddings(&self, texts: &[String]) -> EngineResult<Vec<Vec<f32>>> {
        if *self.fail.lock() {
            return Err(EngineError::Embedding("injected embedding failure".into()));
        }
        *self.calls.lock() += 1;
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}
