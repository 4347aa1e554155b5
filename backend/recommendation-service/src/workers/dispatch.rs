//! Type-routed job dispatch.
//!
//! Each queue carries a closed set of job types. Routing is an exhaustive
//! match over an enum: adding a type means extending the enum and the match,
//! never comparing loose strings at call sites. An unknown tag produces the
//! invalid-type outcome before any handler or collaborator runs.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, warn};

use crate::models::{Job, JobOutcome};
use crate::services::{EmbeddingHandlers, PersonalizationHandlers};

/// Routes a fetched job to its handler.
///
/// Never fails: every failure mode is already folded into the returned
/// outcome by the handlers.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &Job) -> JobOutcome;
}

// ========================================
// Embedding queue
// ========================================

/// Job types accepted on the embedding queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingJobKind {
    Track,
    TrackAudio,
    Album,
    Artist,
    UserPref,
    UserPlaylist,
    SearchQuery,
}

impl EmbeddingJobKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "track" => Some(Self::Track),
            "track_audio" => Some(Self::TrackAudio),
            "album" => Some(Self::Album),
            "artist" => Some(Self::Artist),
            "user_pref" => Some(Self::UserPref),
            "user_playlist" => Some(Self::UserPlaylist),
            "search_query" => Some(Self::SearchQuery),
            _ => None,
        }
    }
}

pub struct EmbeddingDispatcher {
    handlers: Arc<EmbeddingHandlers>,
}

impl EmbeddingDispatcher {
    pub fn new(handlers: Arc<EmbeddingHandlers>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl JobDispatcher for EmbeddingDispatcher {
    async fn dispatch(&self, job: &Job) -> JobOutcome {
        let Some(kind) = EmbeddingJobKind::parse(&job.job_type) else {
            error!(job_id = %job.id, job_type = %job.job_type, "Invalid embedding type");
            return JobOutcome::InvalidType;
        };

        match kind {
            EmbeddingJobKind::Track => self.handlers.track_metadata(job).await,
            EmbeddingJobKind::TrackAudio => self.handlers.track_audio(job).await,
            EmbeddingJobKind::Album => self.handlers.album(job).await,
            EmbeddingJobKind::Artist => self.handlers.artist(job).await,
            EmbeddingJobKind::UserPref => self.handlers.user_pref(job).await,
            EmbeddingJobKind::UserPlaylist => self.handlers.user_playlist(job).await,
            EmbeddingJobKind::SearchQuery => self.handlers.search_query(job).await,
        }
    }
}

// ========================================
// Personalization queue
// ========================================

/// Job types accepted on the personalization queue. Only the first two have
/// handlers today; the rest resolve to an explicit not-implemented outcome
/// instead of a silent fall-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonalizationJobKind {
    ForYou,
    TrendingNow,
    NewReleases,
    RecommendedForYou,
    NextPlaylist,
}

impl PersonalizationJobKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "for_you" => Some(Self::ForYou),
            "trending_now" => Some(Self::TrendingNow),
            "new_releases" => Some(Self::NewReleases),
            "recommended_for_you" => Some(Self::RecommendedForYou),
            "next_playlist" => Some(Self::NextPlaylist),
            _ => None,
        }
    }
}

pub struct PersonalizationDispatcher {
    handlers: Arc<PersonalizationHandlers>,
}

impl PersonalizationDispatcher {
    pub fn new(handlers: Arc<PersonalizationHandlers>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl JobDispatcher for PersonalizationDispatcher {
    async fn dispatch(&self, job: &Job) -> JobOutcome {
        let Some(kind) = PersonalizationJobKind::parse(&job.job_type) else {
            error!(job_id = %job.id, job_type = %job.job_type, "Invalid embedding type");
            return JobOutcome::InvalidType;
        };

        match kind {
            PersonalizationJobKind::ForYou => self.handlers.for_you(job).await,
            PersonalizationJobKind::TrendingNow => self.handlers.trending_now(job).await,
            PersonalizationJobKind::NewReleases
            | PersonalizationJobKind::RecommendedForYou
            | PersonalizationJobKind::NextPlaylist => {
                warn!(
                    job_id = %job.id,
                    job_type = %job.job_type,
                    "allow-listed job type has no handler"
                );
                JobOutcome::NotImplemented
            }
        }
    }
}

// ========================================
// Sonic queue
// ========================================

/// The sonic queue carries only track-audio work; every job goes straight to
/// the audio handler without a type tag check.
pub struct SonicDispatcher {
    handlers: Arc<EmbeddingHandlers>,
}

impl SonicDispatcher {
    pub fn new(handlers: Arc<EmbeddingHandlers>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl JobDispatcher for SonicDispatcher {
    async fn dispatch(&self, job: &Job) -> JobOutcome {
        self.handlers.track_audio(job).await
    }
}
