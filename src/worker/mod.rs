//! Worker pool and job runner
//!
//! [`WorkerPool`] spawns a fixed number of workers. Each one claims a request
//! from the [`Scheduler`](crate::queue::Scheduler), hands it to the shared
//! [`JobRunner`] inside its own task and releases the slot when the job is
//! over, whatever its outcome.

mod pool;
mod runner;

pub use pool::WorkerPool;
pub use runner::{ChapterPhase, JobRunner, JobState, JobSummary};
