//! Queue consumption: job type routing and the worker runtime.

pub mod dispatch;
pub mod queue;
pub mod runtime;

pub use dispatch::{
    EmbeddingDispatcher, EmbeddingJobKind, JobDispatcher, PersonalizationDispatcher,
    PersonalizationJobKind, SonicDispatcher,
};
pub use queue::{JobQueue, RedisJobQueue};
pub use runtime::QueueWorker;
