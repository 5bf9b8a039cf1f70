use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{Cancellation, Enqueued, Position, QueueError, Scheduler, Submission};
use crate::notify::{Notification, NotificationSink, notify_best_effort};
use crate::observability::Metrics;
use crate::worker::JobState;

/// Submission facade shared by the HTTP API and the CLI
///
/// The broker is not a task of its own, just a struct with methods called by
/// handlers. Work reaches the pool through the [`Scheduler`] it wraps.
#[derive(Clone)]
pub struct RequestBroker {
    scheduler: Arc<Scheduler>,
    notifier: Arc<dyn NotificationSink>,
    metrics: Arc<Metrics>,
}

impl RequestBroker {
    pub fn new(
        scheduler: Arc<Scheduler>,
        notifier: Arc<dyn NotificationSink>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            scheduler,
            notifier,
            metrics,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn submit(&self, submission: Submission) -> Result<Enqueued, QueueError> {
        let submitter_id = submission.submitter_id.clone();

        match self.scheduler.enqueue(submission) {
            Ok(enqueued) => {
                self.metrics.add_requests_submitted(1);
                info!(
                    request_id = %enqueued.request_id,
                    %submitter_id,
                    position = enqueued.position,
                    "Request accepted"
                );
                Ok(enqueued)
            }
            Err(e) => {
                self.metrics.add_requests_rejected(1);
                warn!(%submitter_id, error = %e, "Request rejected");
                Err(e)
            }
        }
    }

    pub fn query_position(&self, request_id: Uuid) -> Result<Position, QueueError> {
        self.scheduler.position_of(request_id)
    }

    /// Cancel a request; a request that never ran gets its terminal notification here
    pub async fn cancel(&self, request_id: Uuid) -> Result<Cancellation, QueueError> {
        let outcome = self.scheduler.cancel(request_id)?;

        if let Cancellation::Dequeued(request) = &outcome {
            self.metrics.add_jobs_cancelled(1);
            let summary = Notification::JobCompleted {
                request_id,
                state: JobState::Cancelled,
                delivered: 0,
                skipped: 0,
            };
            notify_best_effort(self.notifier.as_ref(), &request.destination, &summary).await;
        }

        Ok(outcome)
    }

    /// Health check: the queue lock is usable
    pub fn health_check(&self) -> bool {
        self.scheduler.queued().is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::Destination;
    use crate::notify::ChannelNotifier;
    use crate::source::{CatalogEntry, ChapterDescriptor, ContentSource, SourceError};
    use async_trait::async_trait;

    struct StubSource;

    #[async_trait]
    impl ContentSource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }
        async fn search(&self, _query: &str) -> Result<Vec<CatalogEntry>, SourceError> {
            Ok(Vec::new())
        }
        async fn list_chapters(&self, _catalog_id: &str) -> Result<Vec<ChapterDescriptor>, SourceError> {
            Ok(Vec::new())
        }
        async fn resolve_pages(&self, _chapter_id: &str) -> Result<Vec<String>, SourceError> {
            Ok(Vec::new())
        }
    }

    fn submission(chapters: usize) -> Submission {
        Submission::builder()
            .submitter_id("bob")
            .catalog_title("Title")
            .chapters(
                (1..=chapters)
                    .map(|i| ChapterDescriptor::new(format!("c{i}"), i as f64, "Title"))
                    .collect(),
            )
            .source(Arc::new(StubSource) as Arc<dyn ContentSource>)
            .destination(Destination::new("dest"))
            .build()
    }

    #[tokio::test]
    async fn test_submit_counts_accepted_and_rejected() {
        let (notifier, _rx) = ChannelNotifier::new();
        let metrics = Arc::new(Metrics::new());
        let broker = RequestBroker::new(Arc::new(Scheduler::new(1)), Arc::new(notifier), metrics.clone());

        let enqueued = broker.submit(submission(2)).unwrap();
        assert_eq!(enqueued.position, 1);
        assert!(broker.submit(submission(0)).is_err());

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests_submitted, 1);
        assert_eq!(snapshot.requests_rejected, 1);
        assert_eq!(
            broker.query_position(enqueued.request_id).unwrap(),
            Position::Queued(1)
        );
    }

    #[tokio::test]
    async fn test_cancel_queued_sends_terminal_notification() {
        let (notifier, mut rx) = ChannelNotifier::new();
        let metrics = Arc::new(Metrics::new());
        let broker = RequestBroker::new(Arc::new(Scheduler::new(1)), Arc::new(notifier), metrics.clone());

        let id = broker.submit(submission(1)).unwrap().request_id;
        assert!(matches!(broker.cancel(id).await.unwrap(), Cancellation::Dequeued(_)));

        let (destination, event) = rx.recv().await.unwrap();
        assert_eq!(destination.as_str(), "dest");
        assert_eq!(
            event,
            Notification::JobCompleted {
                request_id: id,
                state: JobState::Cancelled,
                delivered: 0,
                skipped: 0,
            }
        );
        assert_eq!(metrics.snapshot().jobs_cancelled, 1);
        assert!(matches!(broker.cancel(id).await, Err(QueueError::NotFound(_))));
    }
}
