//! Catalog repository - embedding persistence for tracks, albums, artists,
//! user preferences, and playlists.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{EmbeddingKind, TrackDetails, TrackRecord};

/// Catalog-side persistence used by the embedding handlers.
///
/// Every write replaces the whole vector, so re-delivered jobs simply write
/// the same value again (last write wins).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn get_track(&self, track_id: Uuid) -> Result<Option<TrackRecord>>;

    async fn get_full_track_details(&self, track_id: Uuid) -> Result<Option<TrackDetails>>;

    async fn update_embedding(
        &self,
        entity_id: Uuid,
        vector: &[f32],
        kind: EmbeddingKind,
    ) -> Result<()>;

    /// Persist the sonic vector and the probed duration as one write.
    async fn update_embedding_and_duration(
        &self,
        track_id: Uuid,
        vector: &[f32],
        duration_secs: f64,
    ) -> Result<()>;
}

pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn get_track(&self, track_id: Uuid) -> Result<Option<TrackRecord>> {
        let row = sqlx::query(r#"SELECT "id", "audioUrl" FROM "Track" WHERE "id" = $1"#)
            .bind(track_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match row {
            Some(row) => Some(TrackRecord {
                id: row.try_get("id")?,
                audio_url: row.try_get("audioUrl")?,
            }),
            None => None,
        })
    }

    async fn get_full_track_details(&self, track_id: Uuid) -> Result<Option<TrackDetails>> {
        let row = sqlx::query(
            r#"
            SELECT t."title", t."description", t."tags",
                   a."name" AS "artistName",
                   a."genres" AS "artistGenres",
                   a."country" AS "artistCountry"
            FROM "Track" t
            LEFT JOIN "Artist" a ON a."id" = t."artistId"
            WHERE t."id" = $1
            "#,
        )
        .bind(track_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => Some(TrackDetails {
                title: row.try_get("title")?,
                description: row.try_get("description")?,
                tags: row.try_get::<Option<Vec<String>>, _>("tags")?.unwrap_or_default(),
                artist_name: row.try_get("artistName")?,
                artist_genres: row
                    .try_get::<Option<Vec<String>>, _>("artistGenres")?
                    .unwrap_or_default(),
                artist_country: row.try_get("artistCountry")?,
            }),
            None => None,
        })
    }

    async fn update_embedding(
        &self,
        entity_id: Uuid,
        vector: &[f32],
        kind: EmbeddingKind,
    ) -> Result<()> {
        let sql = match kind {
            EmbeddingKind::Track => {
                r#"UPDATE "Track" SET "embeddingVector" = $2 WHERE "id" = $1"#
            }
            EmbeddingKind::Album => {
                r#"UPDATE "Album" SET "embeddingVector" = $2 WHERE "id" = $1"#
            }
            EmbeddingKind::Artist => {
                r#"UPDATE "Artist" SET "embeddingVector" = $2 WHERE "id" = $1"#
            }
            EmbeddingKind::UserPreference => {
                r#"UPDATE "UserPreference" SET "embeddingVector" = $2 WHERE "userId" = $1"#
            }
            EmbeddingKind::Playlist => {
                r#"UPDATE "Playlist" SET "embeddingVector" = $2 WHERE "id" = $1"#
            }
        };

        sqlx::query(sql)
            .bind(entity_id)
            .bind(Vector::from(vector.to_vec()))
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn update_embedding_and_duration(
        &self,
        track_id: Uuid,
        vector: &[f32],
        duration_secs: f64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE "Track"
            SET "sonicEmbeddingVector" = $2, "durationSec" = $3
            WHERE "id" = $1
            "#,
        )
        .bind(track_id)
        .bind(Vector::from(vector.to_vec()))
        .bind(duration_secs)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
