//! Personalization job handlers.
//!
//! `for_you` folds a user's recent listening history, liked tracks, and
//! stored preference into one (metadata-space, audio-space) vector pair and
//! caches it briefly. The pair is derived state: recomputable at any time,
//! so the cache write is best-effort and re-delivered jobs just overwrite.

use std::sync::Arc;

use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::config::PersonalizationConfig;
use crate::db::HistoryRepository;
use crate::error::Result;
use crate::models::{Job, JobData, JobOutcome, UserSignal, UserVectors};
use crate::services::aggregate;
use crate::services::cache::{user_vectors_key, VectorCache};

pub struct PersonalizationHandlers {
    history: Arc<dyn HistoryRepository>,
    cache: Arc<dyn VectorCache>,
    config: PersonalizationConfig,
}

impl PersonalizationHandlers {
    pub fn new(
        history: Arc<dyn HistoryRepository>,
        cache: Arc<dyn VectorCache>,
        config: PersonalizationConfig,
    ) -> Self {
        Self {
            history,
            cache,
            config,
        }
    }

    /// `for_you` - recompute and cache the user's vector pair.
    ///
    /// `is_recent` narrows the inputs to the in-session signal (last play
    /// only, no likes) and caches under the `recent:` key with the shorter
    /// TTL.
    pub async fn for_you(&self, job: &Job) -> JobOutcome {
        let Some(raw_user_id) = job.payload_str("user_id") else {
            error!(job_id = %job.id, "No user ID found");
            return JobOutcome::Missing("no user ID");
        };
        let is_recent = job.payload_bool("is_recent");

        let user_id = match Uuid::parse_str(raw_user_id) {
            Ok(id) => id,
            Err(e) => {
                error!(job_id = %job.id, user_id = raw_user_id, error = %e, "Invalid user ID");
                return JobOutcome::error(format!("invalid user id {raw_user_id}: {e}"));
            }
        };

        match self.build_user_vectors(user_id, is_recent).await {
            Ok(vectors) => {
                self.cache_vectors(user_id, is_recent, &vectors).await;
                JobOutcome::Done(JobData::Profile(vectors))
            }
            Err(e) => {
                error!(job_id = %job.id, %user_id, error = %e, "Error processing user personalization");
                JobOutcome::error(e.to_string())
            }
        }
    }

    async fn build_user_vectors(&self, user_id: Uuid, is_recent: bool) -> Result<UserVectors> {
        let config = &self.config;
        let history_limit = if is_recent {
            config.recent_history_limit
        } else {
            config.history_limit
        };
        let liked_limit = if is_recent {
            config.recent_liked_limit
        } else {
            config.liked_limit
        };

        let listened = self.history.listening_history(user_id, history_limit).await?;
        let liked = self.history.liked_tracks(user_id, liked_limit).await?;
        let preference = self.history.user_preference(user_id).await?;

        let pref_meta = preference
            .and_then(|signal| signal.meta_vector)
            .unwrap_or_default();

        // Geometric recency decay over the history only, index 0 the most
        // recent play. Liked tracks carry no order signal worth weighting.
        let weights: Option<Vec<f32>> = (!listened.is_empty()).then(|| {
            (0..listened.len())
                .map(|i| config.decay_base.powi(i as i32))
                .collect()
        });

        let avg_listened_meta =
            aggregate::weighted_average(&meta_vectors(&listened), weights.as_deref())?;
        let avg_listened_audio =
            aggregate::weighted_average(&sonic_vectors(&listened), weights.as_deref())?;
        let avg_liked_meta = aggregate::average(&meta_vectors(&liked))?;
        let avg_liked_audio = aggregate::average(&sonic_vectors(&liked))?;

        let user_meta_vector = aggregate::weighted_blend(
            &pref_meta,
            &avg_listened_meta,
            &avg_liked_meta,
            config.pref_weight,
            config.listened_weight,
            config.liked_weight,
        );
        let user_audio_vector = aggregate::weighted_blend(
            &avg_listened_audio,
            &avg_liked_audio,
            &[],
            config.audio_listened_weight,
            config.audio_liked_weight,
            0.0,
        );

        debug!(
            %user_id,
            is_recent,
            history = listened.len(),
            liked = liked.len(),
            meta_dim = user_meta_vector.len(),
            audio_dim = user_audio_vector.len(),
            "user vectors computed"
        );

        Ok(UserVectors {
            user_meta_vector,
            user_audio_vector,
        })
    }

    /// Best-effort cache write; failure is logged and never fails the job.
    async fn cache_vectors(&self, user_id: Uuid, is_recent: bool, vectors: &UserVectors) {
        let key = user_vectors_key(user_id, is_recent);
        let ttl = if is_recent {
            self.config.recent_cache_ttl_secs
        } else {
            self.config.cache_ttl_secs
        };

        let value = match serde_json::to_string(vectors) {
            Ok(value) => value,
            Err(e) => {
                warn!(%user_id, error = %e, "failed to serialize user vectors for caching");
                return;
            }
        };

        if let Err(e) = self.cache.set(&key, &value, ttl).await {
            warn!(%user_id, error = %e, "failed to cache user vectors");
        }
    }

    /// `trending_now` - placeholder until the ranking pipeline lands; kept so
    /// the queue's type enumeration stays exhaustive.
    pub async fn trending_now(&self, job: &Job) -> JobOutcome {
        debug!(job_id = %job.id, "trending_now requested");
        JobOutcome::Done(JobData::Empty)
    }
}

fn meta_vectors(signals: &[UserSignal]) -> Vec<Vec<f32>> {
    signals
        .iter()
        .map(|signal| signal.meta_vector.clone().unwrap_or_default())
        .collect()
}

fn sonic_vectors(signals: &[UserSignal]) -> Vec<Vec<f32>> {
    signals
        .iter()
        .map(|signal| signal.sonic_vector.clone().unwrap_or_default())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::history_repo::MockHistoryRepository;
    use crate::error::AppError;
    use crate::services::cache::MockVectorCache;
    use mockall::predicate::eq;
    use serde_json::json;

    fn job(body: serde_json::Value) -> Job {
        serde_json::from_value(body).expect("job should decode")
    }

    fn test_config() -> PersonalizationConfig {
        PersonalizationConfig {
            decay_base: 0.5,
            history_limit: 10,
            recent_history_limit: 1,
            liked_limit: 4,
            recent_liked_limit: 0,
            pref_weight: 0.2,
            listened_weight: 0.6,
            liked_weight: 0.2,
            audio_listened_weight: 0.7,
            audio_liked_weight: 0.3,
            cache_ttl_secs: 10,
            recent_cache_ttl_secs: 5,
        }
    }

    fn signal(meta: &[f32], sonic: &[f32]) -> UserSignal {
        UserSignal {
            meta_vector: (!meta.is_empty()).then(|| meta.to_vec()),
            sonic_vector: (!sonic.is_empty()).then(|| sonic.to_vec()),
        }
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len(), "dimension mismatch");
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 0.001, "expected {expected:?}, got {actual:?}");
        }
    }

    #[tokio::test]
    async fn test_missing_user_id_short_circuits() {
        let handlers = PersonalizationHandlers::new(
            Arc::new(MockHistoryRepository::new()),
            Arc::new(MockVectorCache::new()),
            test_config(),
        );

        let outcome = handlers.for_you(&job(json!({ "id": "1", "type": "for_you" }))).await;
        assert_eq!(outcome, JobOutcome::Missing("no user ID"));
    }

    #[tokio::test]
    async fn test_for_you_blends_and_caches() {
        let user_id = Uuid::new_v4();

        let mut history = MockHistoryRepository::new();
        history
            .expect_listening_history()
            .with(eq(user_id), eq(10))
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    signal(&[2.0, 0.0], &[1.0, 1.0]),
                    signal(&[0.0, 2.0], &[3.0, 1.0]),
                ])
            });
        history
            .expect_liked_tracks()
            .with(eq(user_id), eq(4))
            .times(1)
            .returning(|_, _| Ok(vec![signal(&[1.0, 1.0], &[])]));
        history
            .expect_user_preference()
            .with(eq(user_id))
            .times(1)
            .returning(|_| Ok(Some(signal(&[4.0, 4.0], &[]))));

        let mut cache = MockVectorCache::new();
        let expected_key = user_vectors_key(user_id, false);
        cache
            .expect_set()
            .withf(move |key, value, ttl| {
                key == expected_key && *ttl == 10 && value.contains("user_meta_vector")
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let handlers =
            PersonalizationHandlers::new(Arc::new(history), Arc::new(cache), test_config());

        let outcome = handlers
            .for_you(&job(json!({
                "id": "1",
                "type": "for_you",
                "user_id": user_id.to_string()
            })))
            .await;

        let JobOutcome::Done(JobData::Profile(vectors)) = outcome else {
            panic!("expected profile outcome, got {outcome:?}");
        };

        // History average with decay 0.5: ([2,0]*1 + [0,2]*0.5) / 1.5 = [4/3, 2/3].
        // Meta blend: 0.2*[4,4] + 0.6*[4/3, 2/3] + 0.2*[1,1] = [1.8, 1.4].
        assert_close(&vectors.user_meta_vector, &[1.8, 1.4]);
        // Audio: liked has no sonic vectors, so 0.7 * ([1,1]*1 + [3,1]*0.5)/1.5.
        assert_close(&vectors.user_audio_vector, &[7.0 / 6.0, 0.7]);
    }

    #[tokio::test]
    async fn test_recent_variant_uses_short_ttl_and_prefixed_key() {
        let user_id = Uuid::new_v4();

        let mut history = MockHistoryRepository::new();
        history
            .expect_listening_history()
            .with(eq(user_id), eq(1))
            .returning(|_, _| Ok(vec![signal(&[1.0], &[1.0])]));
        history
            .expect_liked_tracks()
            .with(eq(user_id), eq(0))
            .returning(|_, _| Ok(Vec::new()));
        history.expect_user_preference().returning(|_| Ok(None));

        let mut cache = MockVectorCache::new();
        let expected_key = user_vectors_key(user_id, true);
        cache
            .expect_set()
            .withf(move |key, _, ttl| key == expected_key && *ttl == 5)
            .times(1)
            .returning(|_, _, _| Ok(()));

        let handlers =
            PersonalizationHandlers::new(Arc::new(history), Arc::new(cache), test_config());

        let outcome = handlers
            .for_you(&job(json!({
                "id": "1",
                "type": "for_you",
                "user_id": user_id.to_string(),
                "is_recent": true
            })))
            .await;

        assert!(matches!(outcome, JobOutcome::Done(JobData::Profile(_))));
    }

    #[tokio::test]
    async fn test_empty_signals_degrade_to_empty_vectors() {
        let mut history = MockHistoryRepository::new();
        history
            .expect_listening_history()
            .returning(|_, _| Ok(Vec::new()));
        history.expect_liked_tracks().returning(|_, _| Ok(Vec::new()));
        history.expect_user_preference().returning(|_| Ok(None));

        let mut cache = MockVectorCache::new();
        cache.expect_set().returning(|_, _, _| Ok(()));

        let handlers =
            PersonalizationHandlers::new(Arc::new(history), Arc::new(cache), test_config());

        let outcome = handlers
            .for_you(&job(json!({
                "id": "1",
                "type": "for_you",
                "user_id": Uuid::new_v4().to_string()
            })))
            .await;

        assert_eq!(
            outcome,
            JobOutcome::Done(JobData::Profile(UserVectors {
                user_meta_vector: Vec::new(),
                user_audio_vector: Vec::new(),
            }))
        );
    }

    #[tokio::test]
    async fn test_repository_failure_becomes_error_outcome() {
        let mut history = MockHistoryRepository::new();
        history
            .expect_listening_history()
            .returning(|_, _| Err(AppError::Database("connection reset".to_string())));

        let handlers = PersonalizationHandlers::new(
            Arc::new(history),
            Arc::new(MockVectorCache::new()),
            test_config(),
        );

        let outcome = handlers
            .for_you(&job(json!({
                "id": "1",
                "type": "for_you",
                "user_id": Uuid::new_v4().to_string()
            })))
            .await;

        match outcome {
            JobOutcome::Error(message) => assert!(message.contains("connection reset")),
            other => panic!("expected error outcome, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_write_failure_does_not_downgrade_result() {
        let mut history = MockHistoryRepository::new();
        history
            .expect_listening_history()
            .returning(|_, _| Ok(vec![signal(&[1.0], &[])]));
        history.expect_liked_tracks().returning(|_, _| Ok(Vec::new()));
        history.expect_user_preference().returning(|_| Ok(None));

        let mut cache = MockVectorCache::new();
        cache
            .expect_set()
            .times(1)
            .returning(|_, _, _| Err(AppError::Redis("write refused".to_string())));

        let handlers =
            PersonalizationHandlers::new(Arc::new(history), Arc::new(cache), test_config());

        let outcome = handlers
            .for_you(&job(json!({
                "id": "1",
                "type": "for_you",
                "user_id": Uuid::new_v4().to_string()
            })))
            .await;

        assert!(matches!(outcome, JobOutcome::Done(JobData::Profile(_))));
    }

    #[tokio::test]
    async fn test_trending_now_returns_empty_done() {
        let handlers = PersonalizationHandlers::new(
            Arc::new(MockHistoryRepository::new()),
            Arc::new(MockVectorCache::new()),
            test_config(),
        );

        let outcome = handlers
            .trending_now(&job(json!({ "id": "1", "type": "trending_now" })))
            .await;
        assert_eq!(outcome, JobOutcome::Done(JobData::Empty));
    }
}
