/// Data models for recommendation-service
///
/// This module defines structures for:
/// - Job: a queued unit of work and its JSON payload
/// - JobOutcome: the structured result every handler returns
/// - Catalog records consumed by the embedding pipeline
/// - UserVectors: the cached for-you vector pair
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// A vector in one of the learned embedding spaces. Produced by the external
/// embedder and treated as opaque numbers here.
pub type EmbeddingVector = Vec<f32>;

/// A queued unit of work.
///
/// The type tag travels inside the JSON body, next to the payload fields,
/// exactly as the API-side producer enqueues it.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(rename = "type")]
    pub job_type: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Job {
    /// Borrow a required string field from the payload. Empty strings count
    /// as absent, matching the producer's loose validation.
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload
            .get(field)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Optional boolean payload field, absent reads as false.
    pub fn payload_bool(&self, field: &str) -> bool {
        self.payload
            .get(field)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

// ========================================
// Catalog records
// ========================================

/// Entity kinds with a persisted embedding column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingKind {
    Track,
    Album,
    Artist,
    UserPreference,
    Playlist,
}

impl EmbeddingKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Track => "Track",
            Self::Album => "Album",
            Self::Artist => "Artist",
            Self::UserPreference => "UserPreference",
            Self::Playlist => "Playlist",
        }
    }
}

/// Track row consumed by the audio pipeline.
#[derive(Debug, Clone)]
pub struct TrackRecord {
    pub id: Uuid,
    pub audio_url: Option<String>,
}

/// Track joined with its artist, the source of the metadata embedding text.
#[derive(Debug, Clone, Default)]
pub struct TrackDetails {
    pub title: String,
    pub description: Option<String>,
    pub tags: Vec<String>,
    pub artist_name: Option<String>,
    pub artist_genres: Vec<String>,
    pub artist_country: Option<String>,
}

/// One listening-history, liked-track, or stored-preference row. Either
/// vector column may be NULL for tracks that have not been embedded yet;
/// downstream math degrades those to empty vectors.
#[derive(Debug, Clone, Default)]
pub struct UserSignal {
    pub meta_vector: Option<EmbeddingVector>,
    pub sonic_vector: Option<EmbeddingVector>,
}

// ========================================
// Results
// ========================================

/// The for-you vector pair. Derived and ephemeral: always recomputable from
/// the source signals, cached briefly, never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserVectors {
    pub user_meta_vector: EmbeddingVector,
    pub user_audio_vector: EmbeddingVector,
}

/// Payload of a successful job.
#[derive(Debug, Clone, PartialEq)]
pub enum JobData {
    Vector(EmbeddingVector),
    Profile(UserVectors),
    Empty,
}

/// Structured result every handler returns. No error type crosses the
/// handler boundary; the worker runtime only ever sees one of these.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Done(JobData),
    /// A required payload field was absent. Carries the wire label,
    /// e.g. `no track ID`.
    Missing(&'static str),
    /// Type tag outside the queue's allow-list.
    InvalidType,
    /// Allow-listed type with no handler yet.
    NotImplemented,
    Error(String),
}

impl JobOutcome {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error(message.into())
    }

    /// Wire status label, used for completion logging.
    pub fn status(&self) -> &str {
        match self {
            Self::Done(_) => "done",
            Self::Missing(label) => label,
            Self::InvalidType => "invalid embedding type",
            Self::NotImplemented => "not implemented",
            Self::Error(_) => "error",
        }
    }
}
