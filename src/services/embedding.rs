//! Embedding backends and the chunk embedder.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ModelError;
use crate::models::{Chunk, EmbeddingBackendKind, EmbeddingConfig, EmbeddingRecord};

/// Something that turns texts into fixed-dimension vectors.
///
/// Implementations must return exactly one vector per input text, in input order.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError>;

    fn model_id(&self) -> &str;

    fn dimension(&self) -> usize;
}

/// Request body for the /embed endpoint.
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    inputs: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    truncate: Option<bool>,
}

/// Response from the /embed endpoint.
#[derive(Debug, Deserialize)]
struct EmbedResponse(Vec<Vec<f32>>);

/// Health response from the /health endpoint.
#[derive(Debug, Deserialize)]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
}

/// Backend that calls a text-embeddings HTTP server.
#[derive(Debug, Clone)]
pub struct HttpEmbeddingBackend {
    client: Client,
    base_url: String,
    model_id: String,
    dimension: usize,
}

impl HttpEmbeddingBackend {
    pub fn new(config: &EmbeddingConfig) -> Result<Self, ModelError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ModelError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            model_id: config.model_id.clone(),
            dimension: config.dimension as usize,
        })
    }

    /// Check if the embedding server is healthy and ready.
    pub async fn health_check(&self) -> Result<HealthResponse, ModelError> {
        let url = format!("{}/health", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ModelError::ConnectionError(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ModelError::ServerError(format!(
                "health check failed with status: {}",
                response.status()
            )));
        }

        // Server may return an empty or non-JSON body on health check
        let text = response.text().await.unwrap_or_default();
        Ok(serde_json::from_str(&text).unwrap_or(HealthResponse {
            status: Some("healthy".to_string()),
            model_id: None,
        }))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl EmbeddingBackend for HttpEmbeddingBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/embed", self.base_url);
        let request = EmbedRequest {
            inputs: texts,
            truncate: Some(true),
        };

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ModelError::Timeout
                } else if e.is_connect() {
                    ModelError::ConnectionError(e.to_string())
                } else {
                    ModelError::RequestError(e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::ServerError(format!("status {}: {}", status, body)));
        }

        let embed_response: EmbedResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        Ok(embed_response.0)
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

/// Build the backend selected in the configuration.
pub fn create_backend(
    config: &EmbeddingConfig,
    model_dir: Option<&Path>,
) -> Result<Arc<dyn EmbeddingBackend>, ModelError> {
    match config.backend {
        EmbeddingBackendKind::Http => Ok(Arc::new(HttpEmbeddingBackend::new(config)?)),
        EmbeddingBackendKind::Onnx => {
            let dir = model_dir.ok_or_else(|| {
                ModelError::NotFound("no model directory could be determined".to_string())
            })?;
            Ok(Arc::new(super::onnx::OnnxEmbeddingBackend::load(config, dir)?))
        }
    }
}

/// Embeds chunks in batches and checks every vector before handing anything back.
#[derive(Clone)]
pub struct Embedder {
    backend: Arc<dyn EmbeddingBackend>,
    batch_size: usize,
}

impl Embedder {
    pub fn new(backend: Arc<dyn EmbeddingBackend>, batch_size: usize) -> Self {
        Self {
            backend,
            batch_size: batch_size.max(1),
        }
    }

    pub fn model_id(&self) -> &str {
        self.backend.model_id()
    }

    pub fn dimension(&self) -> usize {
        self.backend.dimension()
    }

    /// Embed all chunks. Fails as a whole if any batch fails or returns a bad vector.
    pub async fn embed(&self, chunks: Vec<Chunk>) -> Result<Vec<EmbeddingRecord>, ModelError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let mut vectors = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            let embeddings = self.embed_checked(batch).await?;
            debug!(batch = i, size = batch.len(), "embedded batch");
            vectors.extend(embeddings);
        }

        Ok(chunks
            .into_iter()
            .zip(vectors)
            .map(|(chunk, vector)| EmbeddingRecord::new(chunk, vector))
            .collect())
    }

    /// Embed a single query string.
    pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        self.embed_checked(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("empty embedding response".to_string()))
    }

    async fn embed_checked(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let embeddings = self.backend.embed_texts(texts).await?;

        if embeddings.len() != texts.len() {
            return Err(ModelError::CountMismatch {
                expected: texts.len(),
                actual: embeddings.len(),
            });
        }

        let expected = self.backend.dimension();
        if let Some(bad) = embeddings.iter().find(|v| v.len() != expected) {
            return Err(ModelError::DimensionMismatch {
                expected,
                actual: bad.len(),
            });
        }

        Ok(embeddings)
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("model_id", &self.backend.model_id())
            .field("batch_size", &self.batch_size)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Document;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Length-and-vowel embedding, with knobs for misbehaving.
    struct StubBackend {
        dimension: usize,
        drop_last: bool,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn new(dimension: usize) -> Self {
            Self {
                dimension,
                drop_last: false,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl EmbeddingBackend for StubBackend {
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut out: Vec<Vec<f32>> = texts
                .iter()
                .map(|t| {
                    let mut v = vec![0.0; self.dimension];
                    v[0] = t.len() as f32;
                    v
                })
                .collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }

        fn model_id(&self) -> &str {
            "stub"
        }

        fn dimension(&self) -> usize {
            self.dimension
        }
    }

    fn chunks(n: usize) -> Vec<Chunk> {
        let doc = Document::new("doc.txt", "x");
        (0..n)
            .map(|i| Chunk::new(&doc, "a".repeat(i + 1), i as u32, i as u64, None))
            .collect()
    }

    #[tokio::test]
    async fn test_embed_preserves_order_across_batches() {
        let backend = Arc::new(StubBackend::new(4));
        let embedder = Embedder::new(backend.clone(), 2);

        let records = embedder.embed(chunks(5)).await.unwrap();

        assert_eq!(records.len(), 5);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        for (i, record) in records.iter().enumerate() {
            assert_eq!(record.chunk.chunk_index, i as u32);
            assert_eq!(record.vector[0], (i + 1) as f32);
            assert_eq!(record.dimension(), 4);
        }
    }

    #[tokio::test]
    async fn test_embed_empty_input() {
        let embedder = Embedder::new(Arc::new(StubBackend::new(4)), 8);
        assert!(embedder.embed(Vec::new()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_count_mismatch_is_error() {
        let backend = StubBackend {
            drop_last: true,
            ..StubBackend::new(4)
        };
        let embedder = Embedder::new(Arc::new(backend), 8);

        let result = embedder.embed(chunks(3)).await;
        assert!(matches!(
            result,
            Err(ModelError::CountMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_dimension_mismatch_is_error() {
        struct Ragged;

        #[async_trait]
        impl EmbeddingBackend for Ragged {
            async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
                Ok(texts.iter().map(|_| vec![1.0, 2.0]).collect())
            }
            fn model_id(&self) -> &str {
                "ragged"
            }
            fn dimension(&self) -> usize {
                3
            }
        }

        let embedder = Embedder::new(Arc::new(Ragged), 8);
        let result = embedder.embed(chunks(1)).await;
        assert!(matches!(
            result,
            Err(ModelError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_embed_query() {
        let embedder = Embedder::new(Arc::new(StubBackend::new(2)), 8);
        let vector = embedder.embed_query("abc").await.unwrap();
        assert_eq!(vector, vec![3.0, 0.0]);
    }

    #[test]
    fn test_http_backend_trims_base_url() {
        let config = EmbeddingConfig {
            url: "http://localhost:8080/".to_string(),
            ..Default::default()
        };
        let backend = HttpEmbeddingBackend::new(&config).unwrap();
        assert_eq!(backend.base_url(), "http://localhost:8080");
        assert_eq!(backend.dimension(), 384);
    }

    #[test]
    fn test_onnx_backend_requires_model_dir() {
        let config = EmbeddingConfig::default();
        let result = create_backend(&config, None);
        assert!(matches!(result, Err(ModelError::NotFound(_))));
    }
}
