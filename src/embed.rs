//! Embedder collaborator contract (spec §6): an external service that
//! turns text into fixed-dimension vectors. Treated as a collaborator,
//! not a core subsystem — the Indexer and Retriever depend only on the
//! [`Embedder`] trait.
//!
//! Grounded on the teacher's `EmbeddingProvider` trait plus its
//! `embed_openai` retry/backoff loop (`embedding/mod.rs`): same
//! `model_name`/`dims` accessors, same exponential-backoff-on-429/5xx
//! policy, generalized into a batched `embed`/`embed_batch` surface with
//! a progress callback per spec §6.
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

/// Options for [`Embedder::embed_batch`]: batch size and an optional
/// progress callback invoked after each batch completes.
pub struct EmbedBatchOptions<'a> {
    pub batch_size: usize,
    pub on_progress: Option<Box<dyn FnMut(usize, usize) + Send + 'a>>,
}

impl Default for EmbedBatchOptions<'_> {
    fn default() -> Self {
        Self { batch_size: 100, on_progress: None }
    }
}

/// The external embedding-model collaborator. Every returned vector's
/// length equals `dims()`. Rate-limiting and retries are the
/// implementation's concern, not the caller's.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_name(&self) -> &str;
    fn dims(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Default implementation batches through `embed`; a remote provider
    /// should override this to issue one request per batch instead.
    async fn embed_batch(&self, texts: &[String], options: EmbedBatchOptions<'_>) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        let mut on_progress = options.on_progress;
        for chunk in texts.chunks(options.batch_size.max(1)) {
            for text in chunk {
                out.push(self.embed(text).await?);
            }
            if let Some(cb) = on_progress.as_mut() {
                cb(out.len(), texts.len());
            }
        }
        Ok(out)
    }
}

/// A no-op embedder returning zero-length vectors; useful for tests and
/// for the `embedding.provider = "disabled"` configuration (spec §6).
pub struct DisabledEmbedder;

#[async_trait]
impl Embedder for DisabledEmbedder {
    fn model_name(&self) -> &str {
        "disabled"
    }

    fn dims(&self) -> usize {
        0
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Ok(Vec::new())
    }
}

/// A reference remote embedder calling an OpenAI-compatible embeddings
/// endpoint, with the teacher's exponential backoff (1s base, capped at
/// 32s, retrying only on 429/5xx).
pub struct RemoteEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    max_retries: u32,
    base_url: String,
}

impl RemoteEmbedder {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>, dims: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            model: model.into(),
            dims,
            max_retries: 5,
            base_url: "https://api.openai.com/v1/embeddings".to_string(),
        }
    }

    async fn request_with_retry(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut attempt = 0u32;
        loop {
            let response = self
                .client
                .post(&self.base_url)
                .bearer_auth(&self.api_key)
                .json(&serde_json::json!({ "model": self.model, "input": texts }))
                .send()
                .await
                .map_err(|e| Error::Embedding(e.to_string()))?;

            let status = response.status();
            if status.is_success() {
                let body: serde_json::Value = response
                    .json()
                    .await
                    .map_err(|e| Error::Embedding(e.to_string()))?;
                return parse_embedding_response(&body);
            }

            let retryable = status.as_u16() == 429 || status.is_server_error();
            if !retryable || attempt >= self.max_retries {
                let detail = response.text().await.unwrap_or_default();
                return Err(Error::Embedding(format!("embedding request failed ({status}): {detail}")));
            }

            let backoff = Duration::from_secs(1u64 << attempt.min(5)).min(Duration::from_secs(32));
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

fn parse_embedding_response(body: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = body
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| Error::Embedding("missing `data` array in embedding response".to_string()))?;

    data.iter()
        .map(|item| {
            item.get("embedding")
                .and_then(|e| e.as_array())
                .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|v| v as f32).collect())
                .ok_or_else(|| Error::Embedding("missing `embedding` field in response item".to_string()))
        })
        .collect()
}

#[async_trait]
impl Embedder for RemoteEmbedder {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let vectors = self.request_with_retry(std::slice::from_ref(&text.to_string())).await?;
        vectors
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty response for single-text embed".to_string()))
    }

    async fn embed_batch(&self, texts: &[String], options: EmbedBatchOptions<'_>) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        let mut on_progress = options.on_progress;
        for chunk in texts.chunks(options.batch_size.max(1)) {
            let vectors = self.request_with_retry(chunk).await?;
            out.extend(vectors);
            if let Some(cb) = on_progress.as_mut() {
                cb(out.len(), texts.len());
            }
        }
        Ok(out)
    }
}
