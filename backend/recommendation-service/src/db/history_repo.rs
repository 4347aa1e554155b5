//! History repository - user play history, liked tracks, and the stored
//! preference vector.

use async_trait::async_trait;
use pgvector::Vector;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::error::Result;
use crate::models::UserSignal;

/// User-signal reads feeding the personalization handlers.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HistoryRepository: Send + Sync {
    /// Most recently played first.
    async fn listening_history(&self, user_id: Uuid, limit: i64) -> Result<Vec<UserSignal>>;

    /// Most recently liked first.
    async fn liked_tracks(&self, user_id: Uuid, limit: i64) -> Result<Vec<UserSignal>>;

    async fn user_preference(&self, user_id: Uuid) -> Result<Option<UserSignal>>;
}

pub struct PgHistoryRepository {
    pool: PgPool,
}

impl PgHistoryRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn signal_from_row(row: &PgRow) -> std::result::Result<UserSignal, sqlx::Error> {
    Ok(UserSignal {
        meta_vector: row
            .try_get::<Option<Vector>, _>("embeddingVector")?
            .map(|v| v.to_vec()),
        sonic_vector: row
            .try_get::<Option<Vector>, _>("sonicEmbeddingVector")?
            .map(|v| v.to_vec()),
    })
}

#[async_trait]
impl HistoryRepository for PgHistoryRepository {
    async fn listening_history(&self, user_id: Uuid, limit: i64) -> Result<Vec<UserSignal>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT t."embeddingVector", t."sonicEmbeddingVector"
            FROM "PlayHistory" ph
            JOIN "Track" t ON t."id" = ph."trackId"
            WHERE ph."userId" = $1
            ORDER BY ph."playedAt" DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| signal_from_row(row).map_err(Into::into))
            .collect()
    }

    async fn liked_tracks(&self, user_id: Uuid, limit: i64) -> Result<Vec<UserSignal>> {
        if limit <= 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT t."embeddingVector", t."sonicEmbeddingVector"
            FROM "TrackLike" tl
            JOIN "Track" t ON t."id" = tl."trackId"
            WHERE tl."userId" = $1
            ORDER BY tl."createdAt" DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| signal_from_row(row).map_err(Into::into))
            .collect()
    }

    async fn user_preference(&self, user_id: Uuid) -> Result<Option<UserSignal>> {
        let row = sqlx::query(
            r#"SELECT "embeddingVector" FROM "UserPreference" WHERE "userId" = $1"#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match row {
            Some(row) => Some(UserSignal {
                meta_vector: row
                    .try_get::<Option<Vector>, _>("embeddingVector")?
                    .map(|v| v.to_vec()),
                sonic_vector: None,
            }),
            None => None,
        })
    }
}
