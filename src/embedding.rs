//! Embedding model abstraction and implementations.
//!
//! Defines the [`EmbeddingModel`] trait and concrete implementations:
//! - **[`DisabledModel`]** — returns errors; used when embeddings are not configured.
//! - **[`OpenAiModel`]** — calls the OpenAI embeddings API.
//! - **[`OllamaModel`]** — calls a local Ollama instance's `/api/embed` endpoint.
//!
//! Remote calls carry a per-call timeout and exponential-backoff retry for
//! transient errors: HTTP 429 and 5xx retry, other 4xx fail immediately,
//! network errors retry. Backoff doubles from 1s, capped at 32s.
//!
//! Also provides the blob helpers for storing vectors in SQLite:
//! [`vec_to_blob`] encodes a `Vec<f32>` as little-endian bytes and
//! [`blob_to_vec`] decodes it back.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::time::Duration;

use crate::config::EmbeddingConfig;

/// A fixed-dimension text embedding model. Assumed deterministic per
/// input; may fail or time out per call.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Model identifier recorded alongside vectors.
    fn model_name(&self) -> &str;
    /// Vector dimensionality; constant for a configured system.
    fn dims(&self) -> usize;
    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single text.
pub async fn embed_one(model: &dyn EmbeddingModel, text: &str) -> Result<Vec<f32>> {
    let mut vectors = model.embed(&[text.to_string()]).await?;
    vectors
        .pop()
        .ok_or_else(|| anyhow!("empty embedding response"))
}

/// Instantiate the configured embedding model.
pub fn create_model(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "openai" => Ok(Box::new(OpenAiModel::new(config)?)),
        "ollama" => Ok(Box::new(OllamaModel::new(config)?)),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

/// Encode an embedding as little-endian f32 bytes for BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(vec.len() * 4);
    for v in vec {
        blob.extend_from_slice(&v.to_le_bytes());
    }
    blob
}

/// Decode a BLOB written by [`vec_to_blob`].
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect()
}

// ============ Disabled ============

/// A no-op model that always errors; the configured default.
pub struct DisabledModel;

#[async_trait]
impl EmbeddingModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    fn dims(&self) -> usize {
        0
    }
    async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>> {
        bail!("Embedding provider is disabled")
    }
}

// ============ OpenAI ============

/// Embeddings via `POST https://api.openai.com/v1/embeddings`.
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAiModel {
    model: String,
    dims: usize,
    max_retries: u32,
    timeout_secs: u64,
}

impl OpenAiModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for openai provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for openai provider"))?;

        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }

        Ok(Self {
            model,
            dims,
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OpenAiModel {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY not set"))?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let json = post_json_with_retry(
            "https://api.openai.com/v1/embeddings",
            Some(&api_key),
            &body,
            self.max_retries,
            self.timeout_secs,
        )
        .await?;

        let data = json
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| anyhow!("Unexpected OpenAI response shape"))?;

        let mut vectors = Vec::with_capacity(data.len());
        for item in data {
            let embedding = item
                .get("embedding")
                .and_then(|e| e.as_array())
                .ok_or_else(|| anyhow!("Missing embedding in OpenAI response"))?;
            vectors.push(parse_vector(embedding, self.dims)?);
        }

        if vectors.len() != texts.len() {
            bail!(
                "OpenAI returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            );
        }

        Ok(vectors)
    }
}

// ============ Ollama ============

/// Embeddings via a local Ollama instance's `/api/embed` endpoint.
pub struct OllamaModel {
    model: String,
    dims: usize,
    base_url: String,
    max_retries: u32,
    timeout_secs: u64,
}

impl OllamaModel {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("embedding.model required for ollama provider"))?;
        let dims = config
            .dims
            .ok_or_else(|| anyhow!("embedding.dims required for ollama provider"))?;

        Ok(Self {
            model,
            dims,
            base_url: config.ollama_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl EmbeddingModel for OllamaModel {
    fn model_name(&self) -> &str {
        &self.model
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let url = format!("{}/api/embed", self.base_url);
        let json =
            post_json_with_retry(&url, None, &body, self.max_retries, self.timeout_secs).await?;

        let embeddings = json
            .get("embeddings")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow!("Unexpected Ollama response shape"))?;

        let mut vectors = Vec::with_capacity(embeddings.len());
        for embedding in embeddings {
            let values = embedding
                .as_array()
                .ok_or_else(|| anyhow!("Malformed embedding in Ollama response"))?;
            vectors.push(parse_vector(values, self.dims)?);
        }

        if vectors.len() != texts.len() {
            bail!(
                "Ollama returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            );
        }

        Ok(vectors)
    }
}

fn parse_vector(values: &[serde_json::Value], dims: usize) -> Result<Vec<f32>> {
    let vector: Vec<f32> = values
        .iter()
        .map(|v| v.as_f64().unwrap_or(0.0) as f32)
        .collect();

    if vector.len() != dims {
        bail!(
            "embedding length {} does not match configured dims {}",
            vector.len(),
            dims
        );
    }

    Ok(vector)
}

/// POST a JSON body with bounded exponential-backoff retry.
///
/// 429 and 5xx responses retry; other 4xx fail immediately; network
/// errors retry. Backoff: 1s, 2s, 4s, 8s, 16s, 32s.
async fn post_json_with_retry(
    url: &str,
    bearer: Option<&str>,
    body: &serde_json::Value,
    max_retries: u32,
    timeout_secs: u64,
) -> Result<serde_json::Value> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()?;

    let mut last_err = None;

    for attempt in 0..=max_retries {
        if attempt > 0 {
            let delay = Duration::from_secs(1 << (attempt - 1).min(5));
            tokio::time::sleep(delay).await;
        }

        let mut request = client.post(url).json(body);
        if let Some(token) = bearer {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        match request.send().await {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response.json().await?);
                }

                if status.as_u16() == 429 || status.is_server_error() {
                    let body_text = response.text().await.unwrap_or_default();
                    last_err = Some(anyhow!("embedding API error {}: {}", status, body_text));
                    continue;
                }

                let body_text = response.text().await.unwrap_or_default();
                bail!("embedding API error {}: {}", status, body_text);
            }
            Err(e) => {
                last_err = Some(anyhow!("embedding request failed: {}", e));
                continue;
            }
        }
    }

    Err(last_err.unwrap_or_else(|| anyhow!("embedding request failed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_round_trip() {
        let vec = vec![0.5f32, -1.25, 3.75, 0.0];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 16);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[tokio::test]
    async fn disabled_model_errors() {
        let model = DisabledModel;
        assert!(model.embed(&["x".to_string()]).await.is_err());
    }

    #[test]
    fn dims_mismatch_is_rejected() {
        let values = vec![
            serde_json::json!(0.1),
            serde_json::json!(0.2),
            serde_json::json!(0.3),
        ];
        assert!(parse_vector(&values, 3).is_ok());
        assert!(parse_vector(&values, 4).is_err());
    }
}
