//! Embedding providers.
//!
//! `Embedder` is the seam to the ML inference sidecar that turns text or raw
//! audio into vectors. The concrete client speaks plain HTTP; model loading
//! and GPU scheduling live entirely on the provider side.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client as HttpClient;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::config::EmbedderConfig;
use crate::error::{AppError, Result};
use crate::models::EmbeddingVector;

/// Text/audio embedding provider.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a piece of text into the metadata vector space.
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector>;

    /// Extract sonic features from a complete audio object. The bytes are
    /// consumed; callers keep their own copy for anything they still need.
    async fn extract_audio_features(&self, audio: Bytes) -> Result<EmbeddingVector>;
}

#[derive(Debug, Serialize)]
struct EmbedTextRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

/// HTTP client for the inference sidecar.
pub struct HttpEmbedder {
    http: HttpClient,
    base_url: String,
}

impl HttpEmbedder {
    pub fn new(config: &EmbedderConfig) -> Result<Self> {
        let http = HttpClient::builder()
            // Audio feature extraction can take the provider a while; the
            // timeout has to cover its worst case, not ours.
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AppError::Configuration(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed_text(&self, text: &str) -> Result<EmbeddingVector> {
        let response = self
            .http
            .post(format!("{}/embed/text", self.base_url))
            .json(&EmbedTextRequest { text })
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::Embedding(format!("text embedding request failed: {e}")))?;

        let body: EmbeddingResponse = response.json().await?;
        debug!(dim = body.embedding.len(), "text embedding generated");
        Ok(body.embedding)
    }

    async fn extract_audio_features(&self, audio: Bytes) -> Result<EmbeddingVector> {
        let size = audio.len();
        let response = self
            .http
            .post(format!("{}/embed/audio", self.base_url))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(audio)
            .send()
            .await?
            .error_for_status()
            .map_err(|e| AppError::Embedding(format!("audio embedding request failed: {e}")))?;

        let body: EmbeddingResponse = response.json().await?;
        debug!(
            bytes = size,
            dim = body.embedding.len(),
            "audio features extracted"
        );
        Ok(body.embedding)
    }
}
