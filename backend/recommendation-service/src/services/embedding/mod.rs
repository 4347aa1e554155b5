//! Embedding job handlers.
//!
//! One handler per entity type on the embedding queue. Each validates its
//! payload before touching any collaborator, produces a vector through the
//! `Embedder`, and persists it through the `CatalogRepository`. The
//! track-audio handler additionally pulls the source object from storage and
//! records the probed duration in the same write as the vector.
//!
//! Handlers are safe to run more than once for the same logical job: every
//! persistence call replaces the target vector wholesale.

use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use crate::db::CatalogRepository;
use crate::error::{AppError, Result};
use crate::models::{EmbeddingKind, EmbeddingVector, Job, JobData, JobOutcome, TrackDetails};
use crate::services::embedder::Embedder;
use crate::services::storage::{object_key_from_url, AudioStore};

pub struct EmbeddingHandlers {
    catalog: Arc<dyn CatalogRepository>,
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn AudioStore>,
    bucket: String,
}

impl EmbeddingHandlers {
    pub fn new(
        catalog: Arc<dyn CatalogRepository>,
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn AudioStore>,
        bucket: String,
    ) -> Self {
        Self {
            catalog,
            embedder,
            store,
            bucket,
        }
    }

    /// `track` - metadata embedding from the track's full details.
    pub async fn track_metadata(&self, job: &Job) -> JobOutcome {
        let Some(track_id) = job.payload_str("track_id") else {
            error!(job_id = %job.id, "No track ID found");
            return JobOutcome::Missing("no track ID");
        };

        match self.embed_track_metadata(track_id).await {
            Ok(vector) => JobOutcome::Done(JobData::Vector(vector)),
            Err(e) => {
                error!(job_id = %job.id, track_id, error = %e, "Error embedding track");
                JobOutcome::error(e.to_string())
            }
        }
    }

    async fn embed_track_metadata(&self, track_id: &str) -> Result<EmbeddingVector> {
        let track_id = parse_id(track_id)?;
        let details = self
            .catalog
            .get_full_track_details(track_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("track {track_id} not found")))?;

        let text = embedding_text_for_track(&details);
        let vector = self.embedder.embed_text(&text).await?;
        self.catalog
            .update_embedding(track_id, &vector, EmbeddingKind::Track)
            .await?;

        Ok(vector)
    }

    /// `track_audio` - sonic embedding plus duration from the stored object.
    pub async fn track_audio(&self, job: &Job) -> JobOutcome {
        let Some(track_id) = job.payload_str("trackId") else {
            error!(job_id = %job.id, "No track ID found");
            return JobOutcome::Missing("no track ID");
        };

        match self.embed_track_audio(track_id).await {
            Ok(vector) => {
                info!(job_id = %job.id, track_id, "Sonic embedding updated");
                JobOutcome::Done(JobData::Vector(vector))
            }
            Err(e) => {
                error!(job_id = %job.id, track_id, error = %e, "Error sonic-embedding track");
                JobOutcome::error(e.to_string())
            }
        }
    }

    async fn embed_track_audio(&self, track_id: &str) -> Result<EmbeddingVector> {
        let track_id = parse_id(track_id)?;
        let track = self
            .catalog
            .get_track(track_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("track {track_id} not found")))?;

        let audio_url = track
            .audio_url
            .ok_or_else(|| AppError::Validation(format!("track {track_id} has no audio URL")))?;
        let key = object_key_from_url(&audio_url, &self.bucket).ok_or_else(|| {
            AppError::Validation(format!(
                "audio URL carries no {} object key: {audio_url}",
                self.bucket
            ))
        })?;

        // One download; the probe works on a clone so it cannot consume the
        // bytes the feature extractor needs.
        let audio = self.store.download(&self.bucket, key).await?;
        let duration_secs = self.store.probe_duration(audio.clone()).await?;
        let vector = self.embedder.extract_audio_features(audio).await?;

        self.catalog
            .update_embedding_and_duration(track_id, &vector, duration_secs)
            .await?;

        Ok(vector)
    }

    /// `album`
    pub async fn album(&self, job: &Job) -> JobOutcome {
        let Some(album_id) = job.payload_str("album_id") else {
            return JobOutcome::Missing("no album ID");
        };
        let Some(metadata) = job.payload_str("album_metadata") else {
            return JobOutcome::Missing("no album metadata");
        };

        self.embed_metadata(job, album_id, metadata, EmbeddingKind::Album)
            .await
    }

    /// `artist`
    pub async fn artist(&self, job: &Job) -> JobOutcome {
        let Some(artist_id) = job.payload_str("artist_id") else {
            return JobOutcome::Missing("no artist ID");
        };
        let Some(metadata) = job.payload_str("artist_metadata") else {
            return JobOutcome::Missing("no artist metadata");
        };

        self.embed_metadata(job, artist_id, metadata, EmbeddingKind::Artist)
            .await
    }

    /// `user_pref`
    pub async fn user_pref(&self, job: &Job) -> JobOutcome {
        let Some(user_id) = job.payload_str("user_id") else {
            return JobOutcome::Missing("no user ID");
        };
        let Some(metadata) = job.payload_str("user_metadata") else {
            return JobOutcome::Missing("no user metadata");
        };

        self.embed_metadata(job, user_id, metadata, EmbeddingKind::UserPreference)
            .await
    }

    /// `user_playlist`
    pub async fn user_playlist(&self, job: &Job) -> JobOutcome {
        let Some(playlist_id) = job.payload_str("playlist_id") else {
            error!(job_id = %job.id, "No playlist ID found");
            return JobOutcome::Missing("no playlist ID");
        };
        let Some(metadata) = job.payload_str("playlist_metadata") else {
            error!(job_id = %job.id, "No playlist metadata found");
            return JobOutcome::Missing("no playlist metadata");
        };

        self.embed_metadata(job, playlist_id, metadata, EmbeddingKind::Playlist)
            .await
    }

    /// `search_query` - embed only; query vectors are consumed inline by the
    /// search path and never persisted.
    pub async fn search_query(&self, job: &Job) -> JobOutcome {
        let Some(query_text) = job.payload_str("query_text") else {
            error!(job_id = %job.id, "No query text found");
            return JobOutcome::Missing("no query text");
        };

        match self.embedder.embed_text(query_text).await {
            Ok(vector) => JobOutcome::Done(JobData::Vector(vector)),
            Err(e) => {
                error!(job_id = %job.id, error = %e, "Error embedding search query");
                JobOutcome::error(e.to_string())
            }
        }
    }

    async fn embed_metadata(
        &self,
        job: &Job,
        entity_id: &str,
        metadata: &str,
        kind: EmbeddingKind,
    ) -> JobOutcome {
        match self.embed_and_store(entity_id, metadata, kind).await {
            Ok(vector) => JobOutcome::Done(JobData::Vector(vector)),
            Err(e) => {
                error!(
                    job_id = %job.id,
                    entity = kind.as_str(),
                    error = %e,
                    "Error processing embedding"
                );
                JobOutcome::error(e.to_string())
            }
        }
    }

    async fn embed_and_store(
        &self,
        entity_id: &str,
        metadata: &str,
        kind: EmbeddingKind,
    ) -> Result<EmbeddingVector> {
        let entity_id = parse_id(entity_id)?;
        let vector = self.embedder.embed_text(metadata).await?;
        self.catalog.update_embedding(entity_id, &vector, kind).await?;
        Ok(vector)
    }
}

fn parse_id(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| AppError::Validation(format!("invalid entity id {raw}: {e}")))
}

/// Compose the text fed to the metadata embedder from track + artist details.
pub fn embedding_text_for_track(details: &TrackDetails) -> String {
    let mut parts = vec![details.title.clone()];

    if let Some(artist) = &details.artist_name {
        parts.push(artist.clone());
    }
    if !details.artist_genres.is_empty() {
        parts.push(details.artist_genres.join(", "));
    }
    if !details.tags.is_empty() {
        parts.push(details.tags.join(", "));
    }
    if let Some(description) = &details.description {
        parts.push(description.clone());
    }
    if let Some(country) = &details.artist_country {
        parts.push(country.clone());
    }

    parts.join(". ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog_repo::MockCatalogRepository;
    use crate::models::TrackRecord;
    use crate::services::embedder::MockEmbedder;
    use crate::services::storage::MockAudioStore;
    use bytes::Bytes;
    use mockall::predicate::{always, eq};
    use serde_json::json;

    const BUCKET: &str = "audio-tracks";

    fn job(body: serde_json::Value) -> Job {
        serde_json::from_value(body).expect("job should decode")
    }

    /// Handlers over mocks with zero expectations: any collaborator call
    /// panics the test.
    fn untouchable_handlers() -> EmbeddingHandlers {
        EmbeddingHandlers::new(
            Arc::new(MockCatalogRepository::new()),
            Arc::new(MockEmbedder::new()),
            Arc::new(MockAudioStore::new()),
            BUCKET.to_string(),
        )
    }

    #[tokio::test]
    async fn test_missing_fields_short_circuit_without_collaborator_calls() {
        let handlers = untouchable_handlers();

        let cases = [
            (json!({ "id": "1", "type": "track" }), "no track ID"),
            (json!({ "id": "2", "type": "track_audio" }), "no track ID"),
            (json!({ "id": "3", "type": "album" }), "no album ID"),
            (
                json!({ "id": "4", "type": "album", "album_id": "x" }),
                "no album metadata",
            ),
            (json!({ "id": "5", "type": "artist" }), "no artist ID"),
            (json!({ "id": "6", "type": "user_pref" }), "no user ID"),
            (json!({ "id": "7", "type": "user_playlist" }), "no playlist ID"),
            (json!({ "id": "8", "type": "search_query" }), "no query text"),
        ];

        for (body, expected) in cases {
            let job = job(body);
            let outcome = match job.job_type.as_str() {
                "track" => handlers.track_metadata(&job).await,
                "track_audio" => handlers.track_audio(&job).await,
                "album" => handlers.album(&job).await,
                "artist" => handlers.artist(&job).await,
                "user_pref" => handlers.user_pref(&job).await,
                "user_playlist" => handlers.user_playlist(&job).await,
                "search_query" => handlers.search_query(&job).await,
                other => panic!("unexpected type {other}"),
            };
            assert_eq!(outcome, JobOutcome::Missing(expected));
        }
    }

    #[tokio::test]
    async fn test_album_embeds_and_persists() {
        let album_id = Uuid::new_v4();
        let vector = vec![0.5, 0.5];

        let mut embedder = MockEmbedder::new();
        let expected = vector.clone();
        embedder
            .expect_embed_text()
            .with(eq("lo-fi beats, 2021"))
            .times(1)
            .returning(move |_| Ok(expected.clone()));

        let mut catalog = MockCatalogRepository::new();
        catalog
            .expect_update_embedding()
            .with(eq(album_id), always(), eq(EmbeddingKind::Album))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let handlers = EmbeddingHandlers::new(
            Arc::new(catalog),
            Arc::new(embedder),
            Arc::new(MockAudioStore::new()),
            BUCKET.to_string(),
        );

        let outcome = handlers
            .album(&job(json!({
                "id": "1",
                "type": "album",
                "album_id": album_id.to_string(),
                "album_metadata": "lo-fi beats, 2021"
            })))
            .await;

        assert_eq!(outcome, JobOutcome::Done(JobData::Vector(vector)));
    }

    #[tokio::test]
    async fn test_search_query_never_persists() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_text()
            .times(1)
            .returning(|_| Ok(vec![1.0]));

        // Catalog mock has no expectations: an update_embedding call panics.
        let handlers = EmbeddingHandlers::new(
            Arc::new(MockCatalogRepository::new()),
            Arc::new(embedder),
            Arc::new(MockAudioStore::new()),
            BUCKET.to_string(),
        );

        let outcome = handlers
            .search_query(&job(json!({
                "id": "1",
                "type": "search_query",
                "query_text": "late night drive"
            })))
            .await;

        assert_eq!(outcome, JobOutcome::Done(JobData::Vector(vec![1.0])));
    }

    #[tokio::test]
    async fn test_embedder_failure_becomes_error_outcome() {
        let mut embedder = MockEmbedder::new();
        embedder
            .expect_embed_text()
            .returning(|_| Err(AppError::Embedding("provider down".to_string())));

        let handlers = EmbeddingHandlers::new(
            Arc::new(MockCatalogRepository::new()),
            Arc::new(embedder),
            Arc::new(MockAudioStore::new()),
            BUCKET.to_string(),
        );

        let outcome = handlers
            .artist(&job(json!({
                "id": "1",
                "type": "artist",
                "artist_id": Uuid::new_v4().to_string(),
                "artist_metadata": "shoegaze quartet"
            })))
            .await;

        match outcome {
            JobOutcome::Error(message) => assert!(!message.is_empty()),
            other => panic!("expected error outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_track_audio_pipeline() {
        let track_id = Uuid::new_v4();
        let audio = Bytes::from_static(b"ID3fake-mp3-bytes");
        let features = vec![0.1, 0.2, 0.3];

        let mut catalog = MockCatalogRepository::new();
        let url = format!("https://minio.internal:9000/{BUCKET}/tracks/{track_id}.mp3");
        catalog
            .expect_get_track()
            .with(eq(track_id))
            .times(1)
            .returning(move |id| {
                Ok(Some(TrackRecord {
                    id,
                    audio_url: Some(url.clone()),
                }))
            });
        catalog
            .expect_update_embedding_and_duration()
            .withf(move |id, vector, duration| {
                *id == track_id && vector == [0.1, 0.2, 0.3] && (*duration - 184.5).abs() < 1e-9
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let mut store = MockAudioStore::new();
        let download = audio.clone();
        let expected_key = format!("tracks/{track_id}.mp3");
        store
            .expect_download()
            .withf(move |bucket, key| bucket == BUCKET && key == expected_key)
            .times(1)
            .returning(move |_, _| Ok(download.clone()));
        store
            .expect_probe_duration()
            .times(1)
            .returning(|_| Ok(184.5));

        let mut embedder = MockEmbedder::new();
        let extracted = features.clone();
        embedder
            .expect_extract_audio_features()
            .withf(move |bytes| bytes == &audio)
            .times(1)
            .returning(move |_| Ok(extracted.clone()));

        let handlers = EmbeddingHandlers::new(
            Arc::new(catalog),
            Arc::new(embedder),
            Arc::new(store),
            BUCKET.to_string(),
        );

        let outcome = handlers
            .track_audio(&job(json!({
                "id": "1",
                "type": "track_audio",
                "trackId": track_id.to_string()
            })))
            .await;

        assert_eq!(outcome, JobOutcome::Done(JobData::Vector(features)));
    }

    #[tokio::test]
    async fn test_track_audio_rejects_foreign_url() {
        let track_id = Uuid::new_v4();

        let mut catalog = MockCatalogRepository::new();
        catalog.expect_get_track().returning(|id| {
            Ok(Some(TrackRecord {
                id,
                audio_url: Some("https://cdn.example.com/elsewhere/a.mp3".to_string()),
            }))
        });

        // Storage mock has no expectations: a download attempt panics.
        let handlers = EmbeddingHandlers::new(
            Arc::new(catalog),
            Arc::new(MockEmbedder::new()),
            Arc::new(MockAudioStore::new()),
            BUCKET.to_string(),
        );

        let outcome = handlers
            .track_audio(&job(json!({
                "id": "1",
                "type": "track_audio",
                "trackId": track_id.to_string()
            })))
            .await;

        assert!(matches!(outcome, JobOutcome::Error(_)));
    }

    #[test]
    fn test_embedding_text_composition() {
        let details = TrackDetails {
            title: "Night Drive".to_string(),
            description: Some("instrumental synth".to_string()),
            tags: vec!["synthwave".to_string(), "retro".to_string()],
            artist_name: Some("Neon Lines".to_string()),
            artist_genres: vec!["electronic".to_string()],
            artist_country: Some("SE".to_string()),
        };

        assert_eq!(
            embedding_text_for_track(&details),
            "Night Drive. Neon Lines. electronic. synthwave, retro. instrumental synth. SE"
        );
    }

    #[test]
    fn test_embedding_text_skips_absent_fields() {
        let details = TrackDetails {
            title: "Untitled".to_string(),
            ..TrackDetails::default()
        };
        assert_eq!(embedding_text_for_track(&details), "Untitled");
    }
}
