//! Embedding providers
//!
//! [`EmbeddingProvider`] is the capability boundary between the engine and
//! whatever turns text into vectors. Variants are chosen at configuration
//! time:
//!
//! - [`LocalModel`]: deterministic, offline hashed n-gram embeddings
//! - [`OpenAiEmbeddings`](crate::remote::OpenAiEmbeddings): remote model over HTTP
//! - [`StaticModel`]: fixed lookup table, used to pin exact vectors in tests
//! - [`CachedProvider`](crate::cache::CachedProvider): LRU wrapper around any of the above

use crate::error::ProviderError;
use crate::vector::Vector;
use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};

/// Default dimension for local text embeddings
pub const DEFAULT_LOCAL_DIM: usize = 384;

/// Produces fixed-size vectors from text.
///
/// Implementations must return exactly one vector per input, in input
/// order, each of length [`EmbeddingProvider::dimension`]. Failures are
/// reported as [`ProviderError`], never as placeholder vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Identity of the model behind this provider
    fn model_id(&self) -> &str;

    /// Vector dimension returned by [`EmbeddingProvider::embed_batch`]
    fn dimension(&self) -> usize;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>, ProviderError>;

    async fn embed(&self, text: &str) -> Result<Vector, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| ProviderError::Malformed("no embedding returned".into()))
    }
}

/// Offline text embedder built from hashed character trigrams and words.
///
/// Deterministic for a given model id, dimension and input; texts that share
/// words and trigrams land close together under cosine similarity.
#[derive(Debug, Clone)]
pub struct LocalModel {
    model_id: String,
    dim: usize,
}

impl LocalModel {
    pub fn new(model_id: impl Into<String>, dim: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dim: dim.max(1),
        }
    }

    /// Hash a text into a unit-length vector
    pub fn embed_text(&self, text: &str) -> Vector {
        let mut vector = vec![0.0f32; self.dim];
        let normalized = text.to_lowercase();

        for trigram in generate_trigrams(&normalized) {
            let pos = self.bucket(&trigram);
            vector[pos] += 1.0;
        }

        // Words contribute more than trigrams
        for word in normalized.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric());
            if word.is_empty() {
                continue;
            }
            let pos = self.bucket(word);
            vector[pos] += 2.0;
        }

        let mut vector = Vector::new(vector);
        vector.normalize();
        vector
    }

    fn bucket(&self, token: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        self.model_id.hash(&mut hasher);
        token.hash(&mut hasher);
        (hasher.finish() as usize) % self.dim
    }
}

impl Default for LocalModel {
    fn default() -> Self {
        Self::new("local-trigram", DEFAULT_LOCAL_DIM)
    }
}

#[async_trait]
impl EmbeddingProvider for LocalModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>, ProviderError> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}

/// Generate character trigrams from a string
fn generate_trigrams(s: &str) -> HashSet<String> {
    let padded = format!("  {}  ", s);
    let chars: Vec<char> = padded.chars().collect();

    chars
        .windows(3)
        .map(|w| w.iter().collect::<String>())
        .collect()
}

/// Provider backed by a fixed table of text → vector.
///
/// Unknown texts are an error, so a test can never silently score against
/// a vector it did not define.
#[derive(Debug, Clone)]
pub struct StaticModel {
    model_id: String,
    dim: usize,
    table: HashMap<String, Vector>,
}

impl StaticModel {
    pub fn new(model_id: impl Into<String>, dim: usize) -> Self {
        Self {
            model_id: model_id.into(),
            dim,
            table: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.table.insert(text.into(), Vector::new(vector));
        self
    }
}

#[async_trait]
impl EmbeddingProvider for StaticModel {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>, ProviderError> {
        texts
            .iter()
            .map(|t| {
                self.table.get(t).cloned().ok_or_else(|| {
                    ProviderError::Unavailable(format!("no embedding registered for '{}'", t))
                })
            })
            .collect()
    }
}
