//! Artifact delivery
//!
//! A [`DeliverySink`] makes one attempt per call and says how it failed;
//! [`deliver_with_retry`] turns that into the retry behaviour: rate limits are
//! waited out for as long as the sink keeps asking, network trouble gets a
//! bounded number of attempts, rejections are final.

mod retry;
mod store;

pub use retry::{DeliveryPolicy, deliver_with_retry};
pub use store::ObjectStoreSink;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::archive::ArchiveArtifact;
use crate::retry::{Classify, FailureClass};

/// Opaque handle naming where artifacts of a request go
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(String);

impl Destination {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("network error: {0}")]
    Network(String),

    #[error("delivery attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("delivery rejected: {0}")]
    Rejected(String),
}

impl Classify for DeliveryError {
    fn classify(&self) -> FailureClass {
        match self {
            DeliveryError::RateLimited { retry_after } => FailureClass::RateLimited(*retry_after),
            DeliveryError::Network(_) | DeliveryError::Timeout(_) => FailureClass::Transient,
            DeliveryError::Rejected(_) => FailureClass::Fatal,
        }
    }
}

/// Where an artifact ended up
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReceipt {
    pub key: String,
    pub size: u64,
    /// Attempts it took, filled in by [`deliver_with_retry`]
    pub attempts: u32,
}

#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// One delivery attempt
    async fn deliver(
        &self,
        artifact: &ArchiveArtifact,
        destination: &Destination,
    ) -> Result<DeliveryReceipt, DeliveryError>;
}
