use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{BacklogMirror, ContentRequest, Packaging, QueueError, Submission};
use crate::source::SourceRegistry;

/// Result of a successful enqueue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Enqueued {
    pub request_id: Uuid,
    /// 1-based place in the backlog
    pub position: usize,
}

/// Where a known request currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Queued(usize),
    Running,
}

#[derive(Debug)]
pub enum Cancellation {
    /// Removed from the backlog before it ever ran
    Dequeued(ContentRequest),
    /// Running; its token has been triggered and it stops at the next bundle
    Signalled,
}

/// A request handed to a worker together with its cancellation token
#[derive(Debug)]
pub struct ClaimedJob {
    pub request: ContentRequest,
    pub cancel: CancellationToken,
}

struct InFlight {
    seq: u64,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    backlog: VecDeque<ContentRequest>,
    in_flight: HashMap<Uuid, InFlight>,
    next_seq: u64,
}

/// FIFO backlog plus admission control for a fixed number of running jobs
///
/// Every request is in exactly one of: the backlog, the in-flight map, or
/// gone. Moving between them happens under a single lock, so a claim can
/// never exceed capacity and a cancel can never race a claim.
pub struct Scheduler {
    state: Mutex<QueueState>,
    available: Notify,
    capacity: usize,
    mirror: Option<BacklogMirror>,
}

impl Scheduler {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
            capacity: capacity.max(1),
            mirror: None,
        }
    }

    pub fn with_mirror(mut self, mirror: BacklogMirror) -> Self {
        self.mirror = Some(mirror);
        self
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueState>, QueueError> {
        self.state
            .lock()
            .map_err(|_| QueueError::PoolFatal("queue lock poisoned".to_string()))
    }

    pub fn enqueue(&self, submission: Submission) -> Result<Enqueued, QueueError> {
        if submission.chapters.is_empty() {
            return Err(QueueError::InvalidRequest("no chapters selected".to_string()));
        }
        if let Packaging::Volumes {
            chapters_per_volume: 0,
        } = submission.packaging
        {
            return Err(QueueError::InvalidRequest(
                "chapters_per_volume must be at least 1".to_string(),
            ));
        }

        let (request, position) = {
            let mut state = self.lock()?;
            let request = ContentRequest {
                request_id: submission.request_id.unwrap_or_else(Uuid::now_v7),
                seq: state.next_seq,
                submitter_id: submission.submitter_id,
                catalog_title: submission.catalog_title,
                chapters: submission.chapters,
                source: submission.source,
                destination: submission.destination,
                packaging: submission.packaging,
                submitted_at: OffsetDateTime::now_utc(),
            };
            state.next_seq += 1;
            // Recorded under the lock: no claim can finish it before the entry exists
            if let Some(mirror) = &self.mirror {
                if let Err(e) = mirror.record(&request) {
                    warn!(request_id = %request.request_id, error = %e, "Failed to mirror request");
                }
            }
            state.backlog.push_back(request.clone());
            (request, state.backlog.len())
        };

        debug!(
            request_id = %request.request_id,
            seq = request.seq,
            position,
            chapters = request.chapters.len(),
            "Request enqueued"
        );
        self.available.notify_waiters();

        Ok(Enqueued {
            request_id: request.request_id,
            position,
        })
    }

    /// Claim the oldest request if a slot is free; never waits
    pub fn try_claim(&self) -> Result<Option<ClaimedJob>, QueueError> {
        let mut state = self.lock()?;
        if state.in_flight.len() >= self.capacity {
            return Ok(None);
        }
        let Some(request) = state.backlog.pop_front() else {
            return Ok(None);
        };

        let cancel = CancellationToken::new();
        state.in_flight.insert(
            request.request_id,
            InFlight {
                seq: request.seq,
                cancel: cancel.clone(),
            },
        );
        debug!(request_id = %request.request_id, running = state.in_flight.len(), "Request claimed");

        Ok(Some(ClaimedJob { request, cancel }))
    }

    /// Wait until a request can be claimed; `None` once `shutdown` fires
    pub async fn claim(&self, shutdown: &CancellationToken) -> Result<Option<ClaimedJob>, QueueError> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a wake-up between the check and the await is not lost
            notified.as_mut().enable();

            if shutdown.is_cancelled() {
                return Ok(None);
            }
            if let Some(job) = self.try_claim()? {
                return Ok(Some(job));
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = shutdown.cancelled() => return Ok(None),
            }
        }
    }

    /// Release the slot held by `request_id`
    pub fn finish(&self, request_id: Uuid) -> Result<(), QueueError> {
        {
            let mut state = self.lock()?;
            let entry = state.in_flight.remove(&request_id).ok_or_else(|| {
                QueueError::PoolFatal(format!("finish for request {request_id} that is not running"))
            })?;
            self.forget(request_id, entry.seq);
        }

        self.available.notify_waiters();
        Ok(())
    }

    pub fn position_of(&self, request_id: Uuid) -> Result<Position, QueueError> {
        let state = self.lock()?;
        if state.in_flight.contains_key(&request_id) {
            return Ok(Position::Running);
        }
        state
            .backlog
            .iter()
            .position(|r| r.request_id == request_id)
            .map(|i| Position::Queued(i + 1))
            .ok_or(QueueError::NotFound(request_id))
    }

    pub fn cancel(&self, request_id: Uuid) -> Result<Cancellation, QueueError> {
        let mut state = self.lock()?;

        if let Some(index) = state.backlog.iter().position(|r| r.request_id == request_id) {
            let removed = state.backlog.remove(index);
            if let Some(request) = removed {
                self.forget(request_id, request.seq);
                drop(state);
                info!(%request_id, "Queued request cancelled");
                return Ok(Cancellation::Dequeued(request));
            }
            return Err(QueueError::NotFound(request_id));
        }

        match state.in_flight.get(&request_id) {
            Some(entry) => {
                entry.cancel.cancel();
                info!(%request_id, "Running request signalled to stop");
                Ok(Cancellation::Signalled)
            }
            None => Err(QueueError::NotFound(request_id)),
        }
    }

    /// Trigger the cancellation token of every running request
    pub fn signal_all(&self) -> Result<usize, QueueError> {
        let state = self.lock()?;
        for entry in state.in_flight.values() {
            entry.cancel.cancel();
        }
        Ok(state.in_flight.len())
    }

    pub fn queued(&self) -> Result<usize, QueueError> {
        Ok(self.lock()?.backlog.len())
    }

    pub fn running(&self) -> Result<usize, QueueError> {
        Ok(self.lock()?.in_flight.len())
    }

    /// Re-enqueue whatever a previous process left in the mirror
    ///
    /// Entries whose source is no longer registered are dropped. The mirror is
    /// cleared first and rewritten by the enqueues.
    pub fn restore(&self, registry: &SourceRegistry) -> Result<usize, QueueError> {
        let Some(mirror) = &self.mirror else {
            return Ok(0);
        };

        let entries = match mirror.load() {
            Ok(entries) => entries,
            Err(e) => {
                warn!(error = %e, "Failed to read backlog mirror, starting empty");
                return Ok(0);
            }
        };
        if let Err(e) = mirror.clear() {
            warn!(error = %e, "Failed to clear backlog mirror");
        }

        let mut restored = 0;
        for entry in entries {
            let source = match registry.get(&entry.source) {
                Ok(source) => source,
                Err(e) => {
                    warn!(request_id = %entry.request_id, error = %e, "Dropping mirrored request");
                    continue;
                }
            };

            let submission = Submission::builder()
                .request_id(entry.request_id)
                .submitter_id(entry.submitter_id)
                .catalog_title(entry.catalog_title)
                .chapters(entry.chapters)
                .source(source)
                .destination(entry.destination)
                .packaging(entry.packaging)
                .build();

            match self.enqueue(submission) {
                Ok(_) => restored += 1,
                Err(QueueError::InvalidRequest(reason)) => {
                    warn!(request_id = %entry.request_id, %reason, "Dropping mirrored request");
                }
                Err(e) => return Err(e),
            }
        }

        if restored > 0 {
            info!(restored, "Backlog restored from mirror");
        }
        Ok(restored)
    }

    /// Drop the mirror entry; callers hold the state lock
    fn forget(&self, request_id: Uuid, seq: u64) {
        if let Some(mirror) = &self.mirror {
            if let Err(e) = mirror.remove(seq) {
                warn!(%request_id, error = %e, "Failed to remove request from mirror");
            }
        }
    }
}
