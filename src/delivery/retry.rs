use std::time::Duration;
use tracing::info;

use super::{DeliveryError, DeliveryReceipt, DeliverySink, Destination};
use crate::archive::ArchiveArtifact;
use crate::config::DeliveryConfig;
use crate::retry::{Backoff, RetryError, RetryPolicy};

/// Retry policy plus the hard limit on a single attempt
#[derive(Debug, Clone)]
pub struct DeliveryPolicy {
    pub retry: RetryPolicy,
    pub attempt_timeout: Duration,
}

impl DeliveryPolicy {
    pub fn new(retry: RetryPolicy, attempt_timeout: Duration) -> Self {
        Self {
            retry,
            attempt_timeout,
        }
    }

    /// Fixed backoff between network failures, rate limits waited out without bound
    pub fn from_config(config: &DeliveryConfig) -> Self {
        let retry = RetryPolicy::new(config.max_attempts, Backoff::Fixed(config.backoff()))
            .with_rate_limit_margin(config.rate_limit_margin())
            .with_rate_limit_waits(None);

        Self::new(retry, config.attempt_timeout())
    }
}

/// Deliver `artifact`, retrying according to `policy`
pub async fn deliver_with_retry(
    sink: &dyn DeliverySink,
    policy: &DeliveryPolicy,
    artifact: &ArchiveArtifact,
    destination: &Destination,
) -> Result<DeliveryReceipt, RetryError<DeliveryError>> {
    let timeout = policy.attempt_timeout;
    let mut attempts = 0;

    let result = policy
        .retry
        .run(artifact.name(), |attempt| {
            attempts = attempt;
            async move {
                tokio::time::timeout(timeout, sink.deliver(artifact, destination))
                    .await
                    .map_err(|_| DeliveryError::Timeout(timeout))?
            }
        })
        .await;

    result.map(|mut receipt| {
        receipt.attempts = attempts;
        info!(
            artifact = artifact.name(),
            key = %receipt.key,
            attempts,
            "Artifact delivered"
        );
        receipt
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveBuilder;
    use crate::config::Compression;
    use async_trait::async_trait;
    use bytes::Bytes;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Fails with the scripted errors in order, then succeeds
    struct ScriptedSink {
        script: Mutex<Vec<DeliveryError>>,
        calls: AtomicU32,
    }

    impl ScriptedSink {
        fn new(script: Vec<DeliveryError>) -> Self {
            Self {
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl DeliverySink for ScriptedSink {
        async fn deliver(
            &self,
            artifact: &ArchiveArtifact,
            destination: &Destination,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut script = self.script.lock().unwrap();
            if !script.is_empty() {
                return Err(script.remove(0));
            }
            Ok(DeliveryReceipt {
                key: format!("{destination}/{}", artifact.name()),
                size: artifact.size(),
                attempts: 0,
            })
        }
    }

    struct StallingSink;

    #[async_trait]
    impl DeliverySink for StallingSink {
        async fn deliver(
            &self,
            _artifact: &ArchiveArtifact,
            _destination: &Destination,
        ) -> Result<DeliveryReceipt, DeliveryError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(DeliveryError::Rejected("unreachable".into()))
        }
    }

    fn policy(max_attempts: u32) -> DeliveryPolicy {
        DeliveryPolicy::from_config(&DeliveryConfig {
            max_attempts,
            backoff_ms: 10,
            rate_limit_margin_ms: 5,
            attempt_timeout_ms: 1_000,
        })
    }

    async fn artifact(dir: &TempDir) -> ArchiveArtifact {
        ArchiveBuilder::new(dir.path(), Compression::Stored)
            .build("T", "Chapter 1", vec![Bytes::from_static(b"page")])
            .await
            .unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_are_waited_out_indefinitely() {
        let dir = TempDir::new().unwrap();
        let artifact = artifact(&dir).await;
        let script = (0..10)
            .map(|_| DeliveryError::RateLimited {
                retry_after: Duration::from_secs(30),
            })
            .collect();
        let sink = ScriptedSink::new(script);

        let started = tokio::time::Instant::now();
        let receipt = deliver_with_retry(&sink, &policy(1), &artifact, &Destination::new("d"))
            .await
            .unwrap();

        assert_eq!(receipt.attempts, 11);
        assert_eq!(receipt.key, "d/T_Chapter_1.cbz");
        // 10 waits of retry_after plus margin
        assert!(started.elapsed() >= Duration::from_millis(10 * 30_005));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failures_are_bounded() {
        let dir = TempDir::new().unwrap();
        let artifact = artifact(&dir).await;
        let script = (0..10).map(|_| DeliveryError::Network("reset".into())).collect();
        let sink = ScriptedSink::new(script);

        let result = deliver_with_retry(&sink, &policy(3), &artifact, &Destination::new("d")).await;

        assert!(matches!(result, Err(RetryError::Exhausted { attempts: 3, .. })));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_final() {
        let dir = TempDir::new().unwrap();
        let artifact = artifact(&dir).await;
        let sink = ScriptedSink::new(vec![DeliveryError::Rejected("too large".into())]);

        let result = deliver_with_retry(&sink, &policy(3), &artifact, &Destination::new("d")).await;

        assert!(matches!(result, Err(RetryError::Fatal(DeliveryError::Rejected(_)))));
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_attempt_times_out_and_counts_as_transient() {
        let dir = TempDir::new().unwrap();
        let artifact = artifact(&dir).await;

        let result =
            deliver_with_retry(&StallingSink, &policy(2), &artifact, &Destination::new("d")).await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 2);
                assert!(matches!(last, DeliveryError::Timeout(_)));
            }
            other => panic!("expected timeout exhaustion, got {:?}", other.map(|_| ())),
        }
    }
}
