use std::env;

#[derive(Debug, Clone)]
pub struct Config {
    pub service: ServiceConfig,
    pub redis: RedisConfig,
    pub storage: StorageConfig,
    pub embedder: EmbedderConfig,
    pub queues: QueueConfig,
    pub worker: WorkerConfig,
    pub personalization: PersonalizationConfig,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub service_name: String,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Custom endpoint for S3-compatible stores (MinIO); None = AWS default.
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    /// Path-style addressing, required by MinIO.
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct EmbedderConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub embedding: String,
    pub personalization: String,
    pub sonic: String,
    /// Blocking fetch window; bounds how long shutdown waits on an idle queue.
    pub fetch_timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs in flight per queue. Bounds pressure on the embedder and storage.
    pub concurrency: usize,
}

#[derive(Debug, Clone)]
pub struct PersonalizationConfig {
    /// Geometric recency decay base over the listening history.
    pub decay_base: f32,
    pub history_limit: i64,
    pub recent_history_limit: i64,
    pub liked_limit: i64,
    pub recent_liked_limit: i64,
    /// Metadata-space blend: stored preference / listened average / liked average.
    pub pref_weight: f32,
    pub listened_weight: f32,
    pub liked_weight: f32,
    /// Audio-space blend: listened average / liked average.
    pub audio_listened_weight: f32,
    pub audio_liked_weight: f32,
    pub cache_ttl_secs: u64,
    /// The recent variant captures an in-session signal and must expire
    /// sooner than the general one.
    pub recent_cache_ttl_secs: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Config {
            service: ServiceConfig {
                service_name: env::var("SERVICE_NAME")
                    .unwrap_or_else(|_| "recommendation-service".to_string()),
            },
            redis: RedisConfig {
                url: env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            },
            storage: StorageConfig {
                endpoint: env::var("S3_ENDPOINT").ok(),
                region: env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                bucket: env::var("S3_BUCKET").unwrap_or_else(|_| "audio-tracks".to_string()),
                force_path_style: parsed_env("S3_FORCE_PATH_STYLE", true),
            },
            embedder: EmbedderConfig {
                base_url: env::var("EMBEDDER_URL")
                    .unwrap_or_else(|_| "http://localhost:8100".to_string()),
                timeout_secs: parsed_env("EMBEDDER_TIMEOUT_SECS", 120),
            },
            queues: QueueConfig {
                embedding: env::var("EMBEDDING_QUEUE").unwrap_or_else(|_| "embedding".to_string()),
                personalization: env::var("PERSONALIZATION_QUEUE")
                    .unwrap_or_else(|_| "personalization".to_string()),
                sonic: env::var("SONIC_QUEUE").unwrap_or_else(|_| "sonic-embedding".to_string()),
                fetch_timeout_secs: parsed_env("QUEUE_FETCH_TIMEOUT_SECS", 5),
            },
            worker: WorkerConfig {
                concurrency: parsed_env("WORKER_CONCURRENCY", 5),
            },
            personalization: PersonalizationConfig {
                decay_base: parsed_env("RECENCY_DECAY_BASE", 0.6),
                history_limit: parsed_env("HISTORY_LIMIT", 10),
                recent_history_limit: parsed_env("RECENT_HISTORY_LIMIT", 1),
                liked_limit: parsed_env("LIKED_LIMIT", 4),
                recent_liked_limit: parsed_env("RECENT_LIKED_LIMIT", 0),
                pref_weight: parsed_env("BLEND_PREF_WEIGHT", 0.2),
                listened_weight: parsed_env("BLEND_LISTENED_WEIGHT", 0.6),
                liked_weight: parsed_env("BLEND_LIKED_WEIGHT", 0.2),
                audio_listened_weight: parsed_env("BLEND_AUDIO_LISTENED_WEIGHT", 0.7),
                audio_liked_weight: parsed_env("BLEND_AUDIO_LIKED_WEIGHT", 0.3),
                cache_ttl_secs: parsed_env("USER_VECTORS_TTL_SECS", 10),
                recent_cache_ttl_secs: parsed_env("RECENT_USER_VECTORS_TTL_SECS", 5),
            },
        }
    }
}

fn parsed_env<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|e| panic!("{key} must be a valid value: {e}")),
        Err(_) => default,
    }
}
