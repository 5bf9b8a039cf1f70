//! Job runner: drives one request through fetch, archive and delivery

use bon::Builder;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::archive::ArchiveBuilder;
use crate::delivery::{DeliveryPolicy, DeliverySink, Destination, deliver_with_retry};
use crate::fetch::PageFetcher;
use crate::notify::{Notification, NotificationSink, notify_best_effort};
use crate::observability::Metrics;
use crate::queue::{Bundle, ContentRequest};
use crate::retry::RetryError;
use crate::source::{ChapterDescriptor, SourceError};

/// Lifecycle of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    /// At least one chapter was delivered
    Completed,
    /// Nothing could be delivered
    PartiallyFailed,
    Cancelled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::PartiallyFailed => "partially_failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Step a chapter is in while its job is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChapterPhase {
    Fetching,
    Archiving,
    Delivering,
}

impl fmt::Display for ChapterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChapterPhase::Fetching => "fetching",
            ChapterPhase::Archiving => "archiving",
            ChapterPhase::Delivering => "delivering",
        })
    }
}

/// Terminal outcome of one job; counts are chapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub request_id: Uuid,
    pub state: JobState,
    pub delivered: usize,
    pub skipped: usize,
}

#[derive(Default)]
struct Tally {
    delivered: usize,
    skipped: usize,
}

#[derive(Builder)]
pub struct JobRunner {
    fetcher: PageFetcher,
    archiver: ArchiveBuilder,
    sink: Arc<dyn DeliverySink>,
    delivery: DeliveryPolicy,
    notifier: Arc<dyn NotificationSink>,
    #[builder(default)]
    metrics: Arc<Metrics>,
    /// Hard limit on a page-list lookup
    #[builder(default = Duration::from_secs(60))]
    resolve_timeout: Duration,
}

impl JobRunner {
    /// Run `request` to a terminal state
    ///
    /// Chapter failures are absorbed; `cancel` is checked before every bundle.
    /// Exactly one `JobCompleted` notification is sent.
    pub async fn run(&self, request: &ContentRequest, cancel: &CancellationToken) -> JobSummary {
        let request_id = request.request_id;
        info!(
            %request_id,
            title = %request.catalog_title,
            chapters = request.chapters.len(),
            state = %JobState::Running,
            "Job started"
        );
        self.notify(
            request,
            Notification::JobStarted {
                request_id,
                catalog_title: request.catalog_title.clone(),
                submitter_id: request.submitter_id.clone(),
            },
        )
        .await;

        let mut tally = Tally::default();
        let mut cancelled = false;

        for bundle in request.packaging.bundles(&request.chapters) {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }
            self.run_bundle(request, &bundle, &mut tally).await;
        }

        let state = if cancelled {
            self.metrics.add_jobs_cancelled(1);
            JobState::Cancelled
        } else if tally.delivered > 0 {
            self.metrics.add_jobs_completed(1);
            JobState::Completed
        } else {
            self.metrics.add_jobs_partially_failed(1);
            JobState::PartiallyFailed
        };

        let summary = JobSummary {
            request_id,
            state,
            delivered: tally.delivered,
            skipped: tally.skipped,
        };
        info!(
            %request_id,
            %state,
            delivered = summary.delivered,
            skipped = summary.skipped,
            "Job finished"
        );
        self.notify(
            request,
            Notification::JobCompleted {
                request_id,
                state,
                delivered: summary.delivered,
                skipped: summary.skipped,
            },
        )
        .await;

        summary
    }

    /// Terminal notification for a job whose task died before it could send one
    pub async fn report_crash(&self, request_id: Uuid, destination: &Destination, reason: &str) {
        warn!(%request_id, reason, "Job crashed");
        self.metrics.add_jobs_partially_failed(1);
        let summary = Notification::JobCompleted {
            request_id,
            state: JobState::PartiallyFailed,
            delivered: 0,
            skipped: 0,
        };
        notify_best_effort(self.notifier.as_ref(), destination, &summary).await;
    }

    async fn run_bundle(&self, request: &ContentRequest, bundle: &Bundle<'_>, tally: &mut Tally) {
        let request_id = request.request_id;

        // Fetching
        let mut pages: Vec<Bytes> = Vec::new();
        let mut included: Vec<&ChapterDescriptor> = Vec::new();
        for chapter in bundle.chapters {
            debug!(%request_id, chapter = chapter.label(), phase = %ChapterPhase::Fetching, "Chapter phase");
            match self.fetch_chapter(request, chapter).await {
                Ok(chapter_pages) => {
                    pages.extend(chapter_pages);
                    included.push(chapter);
                }
                Err(reason) => self.skip(request, &[chapter], &reason, tally).await,
            }
        }
        if included.is_empty() {
            return;
        }

        // Archiving
        debug!(%request_id, bundle = %bundle.label, phase = %ChapterPhase::Archiving, "Chapter phase");
        let artifact = match self
            .archiver
            .build(&request.catalog_title, &bundle.label, pages)
            .await
        {
            Ok(artifact) => artifact,
            Err(e) => {
                let reason = format!("packing failed: {e}");
                self.skip(request, &included, &reason, tally).await;
                return;
            }
        };

        // Delivering
        debug!(%request_id, artifact = artifact.name(), phase = %ChapterPhase::Delivering, "Chapter phase");
        let outcome = deliver_with_retry(
            self.sink.as_ref(),
            &self.delivery,
            &artifact,
            &request.destination,
        )
        .await;

        if let Err(e) = artifact.release() {
            warn!(%request_id, error = %e, "Failed to remove artifact");
        }

        match outcome {
            Ok(receipt) => {
                self.metrics
                    .add_delivery_retries(u64::from(receipt.attempts.saturating_sub(1)));
                self.metrics.add_chapters_delivered(included.len() as u64);
                tally.delivered += included.len();
            }
            Err(e) => {
                if let RetryError::Exhausted { attempts, .. } = &e {
                    self.metrics
                        .add_delivery_retries(u64::from(attempts.saturating_sub(1)));
                }
                let reason = format!("delivery failed: {e}");
                self.skip(request, &included, &reason, tally).await;
            }
        }
    }

    /// Resolve and download one chapter; `Err` carries the skip reason
    async fn fetch_chapter(
        &self,
        request: &ContentRequest,
        chapter: &ChapterDescriptor,
    ) -> Result<Vec<Bytes>, String> {
        let locators = tokio::time::timeout(
            self.resolve_timeout,
            request.source.resolve_pages(&chapter.id),
        )
        .await
        .map_err(|_| SourceError::Timeout(self.resolve_timeout))
        .and_then(|resolved| resolved)
        .map_err(|e| format!("source unavailable: {e}"))?;

        if locators.is_empty() {
            return Err("chapter has no pages".to_string());
        }

        let fetched = self.fetcher.fetch_chapter(&locators).await;
        self.metrics.add_pages_failed(fetched.failed as u64);
        if fetched.is_empty() {
            return Err(format!("all {} pages failed", locators.len()));
        }
        if fetched.failed > 0 {
            warn!(
                request_id = %request.request_id,
                chapter = chapter.label(),
                failed = fetched.failed,
                "Packing chapter with missing pages"
            );
        }

        Ok(fetched.pages.into_iter().map(|page| page.bytes).collect())
    }

    async fn skip(
        &self,
        request: &ContentRequest,
        chapters: &[&ChapterDescriptor],
        reason: &str,
        tally: &mut Tally,
    ) {
        for chapter in chapters {
            warn!(
                request_id = %request.request_id,
                chapter = chapter.label(),
                reason,
                "Chapter skipped"
            );
            self.metrics.add_chapters_skipped(1);
            tally.skipped += 1;
            self.notify(
                request,
                Notification::ChapterSkipped {
                    request_id: request.request_id,
                    chapter_label: chapter.label().to_string(),
                    reason: reason.to_string(),
                },
            )
            .await;
        }
    }

    async fn notify(&self, request: &ContentRequest, notification: Notification) {
        notify_best_effort(self.notifier.as_ref(), &request.destination, &notification).await;
    }
}
