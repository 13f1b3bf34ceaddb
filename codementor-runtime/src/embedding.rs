//! Text embeddings for semantic memory search
//!
//! - `OpenAIEmbedder`: the `/embeddings` endpoint
//! - `HashEmbedder`: deterministic token hashing, no network access

use crate::config::IndexConfig;
use crate::error::{self, Error, Result};
use crate::provider::{ProviderConfig, ProviderType};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Turns text into fixed-length vectors
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Length of every vector this embedder produces
    fn dims(&self) -> usize;

    /// Embed a batch of documents, one vector per input in order
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| Error::embedding_failed("no embedding returned for query"))
    }
}

/// Build the embedder named by `config.embed` (`"<provider>:<model>"`).
///
/// Supported providers: `openai` (credentials from the environment) and
/// `hash` (offline).
pub fn init_embeddings(config: &IndexConfig) -> Result<Arc<dyn Embedder>> {
    let (provider, model) = config.embed.split_once(':').ok_or_else(|| {
        Error::config_invalid("embed", format!("expected '<provider>:<model>', got '{}'", config.embed))
            .with_operation("embedding::init_embeddings")
    })?;

    match provider {
        "openai" => {
            let provider_config = ProviderConfig::from_env(ProviderType::OpenAI)?;
            Ok(Arc::new(OpenAIEmbedder::new(provider_config, model, config.dims)?))
        }
        "hash" => Ok(Arc::new(HashEmbedder::new(config.dims))),
        other => Err(Error::config_invalid("embed", format!("unsupported embedding provider '{}'", other))
            .with_operation("embedding::init_embeddings")),
    }
}

/// Cosine similarity of two vectors. Zero vectors score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ============================================================================
// OpenAI
// ============================================================================

/// Embeddings from an OpenAI-compatible `/embeddings` endpoint
pub struct OpenAIEmbedder {
    client: Client,
    config: ProviderConfig,
    model: String,
    dims: usize,
}

impl OpenAIEmbedder {
    pub fn new(config: ProviderConfig, model: impl Into<String>, dims: usize) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(60)))
            .build()
            .map_err(error::client_build_failed)?;

        Ok(Self {
            client,
            config,
            model: model.into(),
            dims,
        })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.openai.com/v1")
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

#[async_trait]
impl Embedder for OpenAIEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut req = self
            .client
            .post(format!("{}/embeddings", self.base_url()))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
                dimensions: self.dims,
            });
        if let Some(api_key) = self.config.api_key.as_deref().filter(|k| !k.is_empty()) {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = req.send().await.map_err(|e| {
            error::network_failed("embedding request failed")
                .with_operation("embedding::embed_documents")
                .set_source(e)
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let err = Error::embedding_failed(text)
                .with_operation("embedding::embed_documents")
                .with_context("status", status.as_u16().to_string())
                .with_context("model", self.model.clone());
            // only throttling and server errors are worth retrying
            return Err(if status.as_u16() == 429 || status.is_server_error() {
                err
            } else {
                err.permanent()
            });
        }

        let mut body: EmbeddingResponse = response.json().await.map_err(|e| {
            error::parse_error("invalid embeddings response")
                .with_operation("embedding::embed_documents")
                .set_source(e)
        })?;

        if body.data.len() != texts.len() {
            return Err(Error::embedding_failed(format!(
                "requested {} embeddings, got {}",
                texts.len(),
                body.data.len()
            ))
            .with_operation("embedding::embed_documents"));
        }

        body.data.sort_by_key(|d| d.index);
        Ok(body.data.into_iter().map(|d| d.embedding).collect())
    }
}

// ============================================================================
// Hashing
// ============================================================================

/// Offline bag-of-words embedder.
///
/// Each lower-cased alphanumeric token is hashed (FNV-1a) into a signed
/// bucket; the result is L2-normalised. Texts sharing vocabulary score high
/// under cosine similarity, which is enough for recall in tests and
/// `--offline` sessions.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dims: usize,
}

impl HashEmbedder {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }

    pub fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dims];

        for token in text
            .split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|t| !t.is_empty())
        {
            let hash = fnv1a(token.to_lowercase().as_bytes());
            let bucket = (hash % self.dims as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for b in bytes {
        hash ^= u64::from(*b);
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed(t)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]) - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
        assert!((cosine_similarity(&[1.0, 0.0], &[-1.0, 0.0]) + 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn test_hash_embedder_is_deterministic_and_normalised() {
        let embedder = HashEmbedder::new(64);
        let a = embedder.embed_query("Why does my for loop skip the last index?").await.unwrap();
        let b = embedder.embed_query("why does my FOR loop skip the last index").await.unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn test_hash_embedder_ranks_shared_vocabulary_higher() {
        let embedder = HashEmbedder::new(256);
        let query = embedder.embed("off by one error in loop bounds");
        let related = embedder.embed("Hint 1: think about the loop bounds and off by one errors");
        let unrelated = embedder.embed("recursion base case missing for fibonacci");

        assert!(cosine_similarity(&query, &related) > cosine_similarity(&query, &unrelated));
    }

    #[test]
    fn test_hash_embedder_empty_text() {
        let embedder = HashEmbedder::new(8);
        let vectors = tokio_test::block_on(embedder.embed_documents(&["  ... ".to_string(), String::new()])).unwrap();
        assert_eq!(vectors, vec![vec![0.0; 8], vec![0.0; 8]]);
    }

    #[test]
    fn test_init_embeddings() {
        let embedder = init_embeddings(&IndexConfig::new(32, "hash:bow")).unwrap();
        assert_eq!(embedder.dims(), 32);

        let err = init_embeddings(&IndexConfig::new(32, "cohere:embed-v3")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);

        let err = init_embeddings(&IndexConfig::new(32, "text-embedding-3-small")).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
    }
}
