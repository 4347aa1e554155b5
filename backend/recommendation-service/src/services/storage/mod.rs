//! Audio object storage access.
//!
//! The audio pipeline reads whole objects into memory: feature extraction
//! needs the full waveform anyway, and in-memory bytes make the duration
//! probe a cheap clone instead of a second download.

use async_trait::async_trait;
use aws_sdk_s3::Client;
use bytes::Bytes;
use lofty::prelude::AudioFile;
use lofty::probe::Probe;
use std::io::Cursor;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::error::{AppError, Result};

/// Object storage the audio pipeline reads from.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AudioStore: Send + Sync {
    /// Download a complete audio object.
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes>;

    /// Playable duration in seconds of an in-memory audio object.
    async fn probe_duration(&self, audio: Bytes) -> Result<f64>;
}

/// Locate the storage object key inside a stored URL: everything after the
/// `{bucket}/` marker.
pub fn object_key_from_url<'a>(url: &'a str, bucket: &str) -> Option<&'a str> {
    let marker = format!("{bucket}/");
    let start = url.find(&marker)? + marker.len();
    let key = &url[start..];
    (!key.is_empty()).then_some(key)
}

/// S3-compatible store (AWS or MinIO).
pub struct S3AudioStore {
    client: Client,
}

impl S3AudioStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub async fn from_config(config: &StorageConfig) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared = loader.load().await;

        let mut builder = aws_sdk_s3::config::Builder::from(&shared);
        if config.force_path_style {
            builder = builder.force_path_style(true);
        }

        info!(
            bucket = %config.bucket,
            endpoint = config.endpoint.as_deref().unwrap_or("aws"),
            "S3 audio store initialized"
        );

        Self {
            client: Client::from_conf(builder.build()),
        }
    }
}

#[async_trait]
impl AudioStore for S3AudioStore {
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.contains("NoSuchKey") || message.contains("404") {
                    AppError::NotFound(format!("audio object {key} not found"))
                } else {
                    AppError::Storage(format!("Failed to download audio object: {e}"))
                }
            })?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| AppError::Storage(format!("Failed to read audio body: {e}")))?;

        let bytes = data.into_bytes();
        debug!(key, size = bytes.len(), "audio object downloaded");
        Ok(bytes)
    }

    async fn probe_duration(&self, audio: Bytes) -> Result<f64> {
        let file = Probe::new(Cursor::new(audio))
            .guess_file_type()
            .map_err(|e| AppError::Storage(format!("Failed to sniff audio container: {e}")))?
            .read()
            .map_err(|e| AppError::Storage(format!("Failed to probe audio duration: {e}")))?;

        Ok(file.properties().duration().as_secs_f64())
    }
}
