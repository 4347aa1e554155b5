//! Job queue consumption.
//!
//! Transport semantics (delivery guarantees, retry, backoff) belong to the
//! external queue service; this module only fetches, decodes, and removes
//! jobs. Delivery is assumed at-least-once, which is why completed jobs are
//! proactively removed and failed ones are left where the queue's own retry
//! policy can find them.

use async_trait::async_trait;
use redis::Client;
use tracing::{debug, info};

use crate::error::{AppError, Result};
use crate::models::Job;

/// A named queue the worker runtime drains.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Next available job, or None when the fetch window elapsed empty.
    async fn next_job(&self) -> Result<Option<Job>>;

    /// Delete a completed job's payload from the queue store.
    async fn remove(&self, job_id: &str) -> Result<()>;

    /// Queue name, for logging.
    fn name(&self) -> &str;

    /// Release the queue connection. Default: nothing to hold.
    async fn close(&self) {}
}

/// Redis-list-backed queue consumer.
///
/// The producer LPUSHes job ids onto `jobs:{name}:pending` and stores each
/// JSON body in the `jobs:{name}:payloads` hash. A popped id whose payload
/// is gone was already handled elsewhere and is skipped.
///
/// Blocking fetches get their own connection per call; sharing a multiplexed
/// connection with other commands would stall them for the whole BRPOP
/// window.
pub struct RedisJobQueue {
    client: Client,
    name: String,
    fetch_timeout_secs: u64,
}

impl RedisJobQueue {
    pub fn new(client: Client, name: impl Into<String>, fetch_timeout_secs: u64) -> Self {
        Self {
            client,
            name: name.into(),
            fetch_timeout_secs,
        }
    }

    fn pending_key(&self) -> String {
        format!("jobs:{}:pending", self.name)
    }

    fn payloads_key(&self) -> String {
        format!("jobs:{}:payloads", self.name)
    }
}

#[async_trait]
impl JobQueue for RedisJobQueue {
    async fn next_job(&self) -> Result<Option<Job>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(self.pending_key())
            .arg(self.fetch_timeout_secs)
            .query_async(&mut conn)
            .await?;
        let Some((_, job_id)) = popped else {
            return Ok(None);
        };

        let raw: Option<String> = redis::cmd("HGET")
            .arg(self.payloads_key())
            .arg(&job_id)
            .query_async(&mut conn)
            .await?;
        let Some(raw) = raw else {
            debug!(queue = %self.name, job_id = %job_id, "popped id without payload, skipping");
            return Ok(None);
        };

        let job: Job = serde_json::from_str(&raw)
            .map_err(|e| AppError::Serialization(format!("undecodable job {job_id}: {e}")))?;
        Ok(Some(job))
    }

    async fn remove(&self, job_id: &str) -> Result<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = redis::cmd("HDEL")
            .arg(self.payloads_key())
            .arg(job_id)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn close(&self) {
        info!(queue = %self.name, "queue connection released");
    }
}
