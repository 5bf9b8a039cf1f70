//! Wiring: builds every component from a [`Config`]

use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::api::AppState;
use crate::archive::ArchiveBuilder;
use crate::config::Config;
use crate::delivery::{DeliveryError, DeliveryPolicy, DeliverySink, ObjectStoreSink};
use crate::fetch::{FetchError, HttpClient, PageFetcher, build_http_client};
use crate::intake::Intake;
use crate::notify::NotificationSink;
use crate::observability::Metrics;
use crate::queue::{BacklogMirror, MirrorError, QueueError, RequestBroker, Scheduler};
use crate::source::SourceRegistry;
use crate::worker::{JobRunner, WorkerPool};

#[derive(Debug, Error)]
pub enum AppError {
    #[error("HTTP client: {0}")]
    Http(#[from] FetchError),

    #[error("storage: {0}")]
    Storage(#[from] DeliveryError),

    #[error("backlog mirror: {0}")]
    Mirror(#[from] MirrorError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

/// Every long-lived component, ready to serve
pub struct App {
    pub config: Arc<Config>,
    pub registry: Arc<SourceRegistry>,
    pub intake: Intake,
    pub scheduler: Arc<Scheduler>,
    pub broker: RequestBroker,
    pub runner: Arc<JobRunner>,
    pub metrics: Arc<Metrics>,
}

impl App {
    /// Build with the configured object store as delivery sink
    pub fn build(config: Config, notifier: Arc<dyn NotificationSink>) -> Result<Self, AppError> {
        let sink = Arc::new(ObjectStoreSink::from_config(&config.storage)?);
        Self::build_with_sink(config, notifier, sink)
    }

    pub fn build_with_sink(
        config: Config,
        notifier: Arc<dyn NotificationSink>,
        sink: Arc<dyn DeliverySink>,
    ) -> Result<Self, AppError> {
        let client = build_http_client(&config.fetch)?;
        let registry = Arc::new(SourceRegistry::from_config(&config.sources, client.clone()));
        let metrics = Arc::new(Metrics::new());

        let mut scheduler = Scheduler::new(config.pool.size);
        if let Some(path) = &config.server.mirror_path {
            scheduler = scheduler.with_mirror(BacklogMirror::open(path)?);
        }
        let scheduler = Arc::new(scheduler);

        let runner = JobRunner::builder()
            .fetcher(PageFetcher::from_config(
                Arc::new(HttpClient::new(client)),
                &config.pool,
                &config.fetch,
            ))
            .archiver(ArchiveBuilder::from_config(&config.archive))
            .sink(sink)
            .delivery(DeliveryPolicy::from_config(&config.delivery))
            .notifier(notifier.clone())
            .metrics(metrics.clone())
            .resolve_timeout(config.fetch.request_timeout())
            .build();

        let intake = Intake::new(registry.clone(), config.fetch.request_timeout());
        let broker = RequestBroker::new(scheduler.clone(), notifier, metrics.clone());

        info!(
            sources = registry.len(),
            pool_size = config.pool.size,
            page_concurrency = config.pool.page_concurrency,
            "Application assembled"
        );

        Ok(Self {
            config: Arc::new(config),
            registry,
            intake,
            scheduler,
            broker,
            runner: Arc::new(runner),
            metrics,
        })
    }

    /// Re-enqueue requests a previous run left in the mirror
    pub fn restore_backlog(&self) -> Result<usize, AppError> {
        Ok(self.scheduler.restore(&self.registry)?)
    }

    pub fn start_pool(&self, shutdown: CancellationToken) -> WorkerPool {
        WorkerPool::start(
            self.scheduler.clone(),
            self.runner.clone(),
            self.config.pool.size,
            shutdown,
        )
    }

    pub fn state(&self) -> AppState {
        AppState::new(
            self.config.clone(),
            self.intake.clone(),
            self.broker.clone(),
            self.metrics.clone(),
        )
    }
}
