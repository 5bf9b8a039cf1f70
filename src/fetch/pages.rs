use bytes::Bytes;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::{AssetClient, FetchError};
use crate::config::{FetchConfig, PoolConfig};
use crate::humanize::ByteSize;
use crate::retry::{Backoff, RetryError, RetryPolicy};

/// Rate-limit waits a single page may sit through before it is dropped
const PAGE_RATE_LIMIT_WAITS: u32 = 5;

/// One downloaded page, tagged with its position in the chapter
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub index: usize,
    pub bytes: Bytes,
}

/// Surviving pages in original order plus the number that were dropped
#[derive(Debug, Default)]
pub struct FetchedChapter {
    pub pages: Vec<FetchedPage>,
    pub failed: usize,
}

impl FetchedChapter {
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}

/// Bounded fan-out downloader for the pages of one chapter
#[derive(Clone)]
pub struct PageFetcher {
    client: Arc<dyn AssetClient>,
    concurrency: usize,
    policy: RetryPolicy,
    page_timeout: Duration,
    max_page_bytes: ByteSize,
}

impl PageFetcher {
    pub fn new(
        client: Arc<dyn AssetClient>,
        concurrency: usize,
        policy: RetryPolicy,
        page_timeout: Duration,
        max_page_bytes: ByteSize,
    ) -> Self {
        Self {
            client,
            concurrency: concurrency.max(1),
            policy,
            page_timeout,
            max_page_bytes,
        }
    }

    pub fn from_config(client: Arc<dyn AssetClient>, pool: &PoolConfig, fetch: &FetchConfig) -> Self {
        let policy = RetryPolicy::new(
            fetch.max_attempts,
            Backoff::Exponential {
                base: fetch.backoff(),
                max: fetch.backoff().saturating_mul(8),
            },
        )
        .with_rate_limit_waits(Some(PAGE_RATE_LIMIT_WAITS));

        Self::new(
            client,
            pool.page_concurrency,
            policy,
            fetch.request_timeout(),
            fetch.max_page_bytes,
        )
    }

    /// Download every locator with at most `concurrency` in flight
    ///
    /// Pages that still fail after their retry budget are dropped; the
    /// returned pages are sorted back into locator order regardless of
    /// completion order.
    pub async fn fetch_chapter(&self, locators: &[String]) -> FetchedChapter {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks = JoinSet::new();

        for (index, locator) in locators.iter().cloned().enumerate() {
            let semaphore = semaphore.clone();
            let fetcher = self.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                (index, fetcher.fetch_page(index, &locator).await)
            });
        }

        let mut chapter = FetchedChapter::default();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, Ok(bytes))) => chapter.pages.push(FetchedPage { index, bytes }),
                Ok((index, Err(e))) => {
                    warn!(page = index, error = %e, "Dropping page");
                    chapter.failed += 1;
                }
                Err(e) => {
                    warn!(error = %e, "Page task aborted");
                    chapter.failed += 1;
                }
            }
        }

        chapter.pages.sort_by_key(|page| page.index);
        debug!(
            fetched = chapter.pages.len(),
            failed = chapter.failed,
            "Chapter pages fetched"
        );
        chapter
    }

    async fn fetch_page(&self, index: usize, locator: &str) -> Result<Bytes, RetryError<FetchError>> {
        let label = format!("page {index}");

        self.policy
            .run(&label, |_attempt| async move {
                let bytes = tokio::time::timeout(self.page_timeout, self.client.get(locator))
                    .await
                    .map_err(|_| FetchError::Timeout(self.page_timeout))??;

                if self.max_page_bytes.is_exceeded_by(bytes.len()) {
                    return Err(FetchError::TooLarge {
                        size: bytes.len() as u64,
                        limit: self.max_page_bytes.as_u64(),
                    });
                }
                Ok(bytes)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `page-N` locators with per-page delays and scripted failures
    #[derive(Default)]
    struct ScriptedClient {
        delays: HashMap<String, Duration>,
        failures: Mutex<HashMap<String, Vec<FetchError>>>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        calls: AtomicUsize,
    }

    impl ScriptedClient {
        fn fail(self, locator: &str, errors: Vec<FetchError>) -> Self {
            self.failures.lock().unwrap().insert(locator.to_string(), errors);
            self
        }
    }

    #[async_trait]
    impl AssetClient for ScriptedClient {
        async fn get(&self, locator: &str) -> Result<Bytes, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let delay = self.delays.get(locator).copied().unwrap_or(Duration::from_millis(5));
            tokio::time::sleep(delay).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let scripted = self
                .failures
                .lock()
                .unwrap()
                .get_mut(locator)
                .and_then(|errors| (!errors.is_empty()).then(|| errors.remove(0)));
            match scripted {
                Some(err) => Err(err),
                None => Ok(Bytes::from(locator.to_string())),
            }
        }
    }

    fn locators(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("page-{i}")).collect()
    }

    fn fetcher(client: Arc<ScriptedClient>, concurrency: usize, max_attempts: u32) -> PageFetcher {
        PageFetcher::new(
            client,
            concurrency,
            RetryPolicy::new(max_attempts, Backoff::Fixed(Duration::from_millis(1))),
            Duration::from_secs(1),
            ByteSize::mib(1),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_preserved_when_completion_is_reversed() {
        let mut client = ScriptedClient::default();
        for i in 0..6u64 {
            client
                .delays
                .insert(format!("page-{i}"), Duration::from_millis(60 - i * 10));
        }
        let client = Arc::new(client);

        let chapter = fetcher(client, 6, 1).fetch_chapter(&locators(6)).await;

        let bodies: Vec<_> = chapter.pages.iter().map(|p| p.bytes.clone()).collect();
        assert_eq!(bodies, locators(6).into_iter().map(Bytes::from).collect::<Vec<_>>());
        assert_eq!(chapter.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let client = Arc::new(ScriptedClient::default());

        let chapter = fetcher(client.clone(), 4, 1).fetch_chapter(&locators(20)).await;

        assert_eq!(chapter.pages.len(), 20);
        assert!(client.peak.load(Ordering::SeqCst) <= 4);
        assert!(client.peak.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_page_is_dropped_not_fatal() {
        let client = Arc::new(ScriptedClient::default().fail(
            "page-1",
            vec![FetchError::Status {
                status: 404,
                url: "page-1".into(),
            }],
        ));

        let chapter = fetcher(client, 2, 3).fetch_chapter(&locators(3)).await;

        let indices: Vec<_> = chapter.pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(chapter.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_page_failure_is_retried() {
        let client = Arc::new(ScriptedClient::default().fail(
            "page-0",
            vec![FetchError::Request("reset".into()), FetchError::Request("reset".into())],
        ));

        let chapter = fetcher(client.clone(), 1, 3).fetch_chapter(&locators(1)).await;

        assert_eq!(chapter.pages.len(), 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_oversized_page_is_rejected() {
        let client = Arc::new(ScriptedClient::default());
        let fetcher = PageFetcher::new(
            client,
            1,
            RetryPolicy::new(3, Backoff::Fixed(Duration::from_millis(1))),
            Duration::from_secs(1),
            ByteSize(3),
        );

        let chapter = fetcher.fetch_chapter(&locators(1)).await;
        assert!(chapter.is_empty());
        assert_eq!(chapter.failed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_page_times_out_and_is_dropped() {
        let mut client = ScriptedClient::default();
        client
            .delays
            .insert("page-1".to_string(), Duration::from_secs(3600));
        let client = Arc::new(client);

        let started = tokio::time::Instant::now();
        let chapter = fetcher(client.clone(), 3, 2).fetch_chapter(&locators(3)).await;

        // Two attempts of at most one second each, not the hour the page would take
        assert!(started.elapsed() < Duration::from_secs(5));
        let indices: Vec<_> = chapter.pages.iter().map(|p| p.index).collect();
        assert_eq!(indices, vec![0, 2]);
        assert_eq!(chapter.failed, 1);
        assert_eq!(client.calls.load(Ordering::SeqCst), 4);
    }
}
