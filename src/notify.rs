//! Lifecycle notifications
//!
//! Delivery of notifications is best-effort: a sink failure is logged and
//! never changes the outcome of a job.

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::delivery::Destination;
use crate::worker::JobState;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Notification failed: {0}")]
    SendFailed(String),

    #[error("Notification channel closed")]
    Closed,
}

/// Events emitted while a request moves through the pool
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Notification {
    JobStarted {
        request_id: Uuid,
        catalog_title: String,
        submitter_id: String,
    },
    ChapterSkipped {
        request_id: Uuid,
        chapter_label: String,
        reason: String,
    },
    JobCompleted {
        request_id: Uuid,
        state: JobState,
        delivered: usize,
        skipped: usize,
    },
}

impl Notification {
    pub fn request_id(&self) -> Uuid {
        match self {
            Notification::JobStarted { request_id, .. }
            | Notification::ChapterSkipped { request_id, .. }
            | Notification::JobCompleted { request_id, .. } => *request_id,
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), NotifyError>;
}

/// Send and swallow failures
pub async fn notify_best_effort(
    sink: &dyn NotificationSink,
    destination: &Destination,
    notification: &Notification,
) {
    if let Err(e) = sink.notify(destination, notification).await {
        warn!(
            request_id = %notification.request_id(),
            error = %e,
            "Dropping notification"
        );
    }
}

/// Writes events to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl NotificationSink for LogNotifier {
    async fn notify(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        let event = serde_json::to_string(notification)
            .map_err(|e| NotifyError::SendFailed(e.to_string()))?;
        info!(%destination, %event, "Notification");
        Ok(())
    }
}

/// Forwards events into an mpsc channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<(Destination, Notification)>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<(Destination, Notification)>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationSink for ChannelNotifier {
    async fn notify(
        &self,
        destination: &Destination,
        notification: &Notification,
    ) -> Result<(), NotifyError> {
        self.tx
            .send((destination.clone(), notification.clone()))
            .map_err(|_| NotifyError::Closed)
    }
}
