//! Request queueing
//!
//! - [`Scheduler`]: FIFO backlog, admission control and cancellation
//! - [`RequestBroker`]: the submission facade used by the API and CLI
//! - [`BacklogMirror`]: optional fjall copy of the backlog, replayed on start

mod broker;
mod mirror;
mod request;
mod scheduler;

pub use broker::RequestBroker;
pub use mirror::{BacklogMirror, MirrorEntry, MirrorError};
pub use request::{Bundle, ContentRequest, Packaging, Submission};
pub use scheduler::{Cancellation, ClaimedJob, Enqueued, Position, Scheduler};

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request not found: {0}")]
    NotFound(Uuid),

    #[error("worker pool failure: {0}")]
    PoolFatal(String),
}
