use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default = "default_sources")]
    pub sources: HashMap<String, SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            pool: PoolConfig::default(),
            fetch: FetchConfig::default(),
            delivery: DeliveryConfig::default(),
            archive: ArchiveConfig::default(),
            storage: StorageConfig::default(),
            sources: default_sources(),
        }
    }
}

/// HTTP submission API
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Advisory on-disk copy of the backlog; `None` disables it
    #[serde(default = "default_mirror_path")]
    pub mirror_path: Option<PathBuf>,
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            mirror_path: default_mirror_path(),
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

fn default_mirror_path() -> Option<PathBuf> {
    Some(PathBuf::from("data/backlog"))
}

fn default_max_payload_bytes() -> ByteSize {
    ByteSize::kib(64)
}

/// Admission control
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
    /// Jobs running at once
    #[serde(default = "default_pool_size")]
    pub size: usize,
    /// Page downloads in flight per chapter
    #[serde(default = "default_page_concurrency")]
    pub page_concurrency: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: default_pool_size(),
            page_concurrency: default_page_concurrency(),
        }
    }
}

fn default_pool_size() -> usize {
    2
}

fn default_page_concurrency() -> usize {
    10
}

/// Page downloads and source queries
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Hard limit for a single page download or source query
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_fetch_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_fetch_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default = "default_max_page_bytes")]
    pub max_page_bytes: ByteSize,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl FetchConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
            max_attempts: default_fetch_max_attempts(),
            backoff_ms: default_fetch_backoff_ms(),
            max_page_bytes: default_max_page_bytes(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_request_timeout_ms() -> u64 {
    60_000
}

fn default_fetch_max_attempts() -> u32 {
    3
}

fn default_fetch_backoff_ms() -> u64 {
    1_000
}

fn default_max_page_bytes() -> ByteSize {
    ByteSize::mib(32)
}

fn default_user_agent() -> String {
    concat!("chapterbox/", env!("CARGO_PKG_VERSION")).to_string()
}

/// Delivery retry policy
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
    /// Attempts while failures are network-transient; rate limits do not count
    #[serde(default = "default_delivery_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_delivery_backoff_ms")]
    pub backoff_ms: u64,
    /// Added to every rate-limit wait the sink asks for
    #[serde(default = "default_rate_limit_margin_ms")]
    pub rate_limit_margin_ms: u64,
    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,
}

impl DeliveryConfig {
    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }

    pub fn rate_limit_margin(&self) -> Duration {
        Duration::from_millis(self.rate_limit_margin_ms)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_ms)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_delivery_max_attempts(),
            backoff_ms: default_delivery_backoff_ms(),
            rate_limit_margin_ms: default_rate_limit_margin_ms(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
        }
    }
}

fn default_delivery_max_attempts() -> u32 {
    3
}

fn default_delivery_backoff_ms() -> u64 {
    2_000
}

fn default_rate_limit_margin_ms() -> u64 {
    1_000
}

fn default_attempt_timeout_ms() -> u64 {
    120_000
}

/// Zip member compression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    Deflated,
    Stored,
}

/// Temporary artifact storage
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_scratch_dir")]
    pub scratch_dir: PathBuf,
    #[serde(default)]
    pub compression: Compression,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            scratch_dir: default_scratch_dir(),
            compression: Compression::default(),
        }
    }
}

fn default_scratch_dir() -> PathBuf {
    PathBuf::from("tmp")
}

/// Where delivered artifacts end up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    #[default]
    Local,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub provider: StorageProvider,
    #[serde(default = "default_storage_root")]
    pub root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            root: default_storage_root(),
        }
    }
}

fn default_storage_root() -> PathBuf {
    PathBuf::from("cbz_cache")
}

/// Supported source adapters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Mangaflix,
    Toonbr,
}

/// One `[sources.<name>]` table
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    pub kind: SourceKind,
    pub api_url: String,
    /// Host prefixed to relative page paths (toonbr)
    pub cdn_url: Option<String>,
    /// `selected_language` query value (mangaflix)
    pub language: Option<String>,
}

fn default_sources() -> HashMap<String, SourceConfig> {
    HashMap::from([
        (
            "mangaflix".to_string(),
            SourceConfig {
                kind: SourceKind::Mangaflix,
                api_url: "https://api.mangaflix.net/v1".to_string(),
                cdn_url: None,
                language: Some("pt-br".to_string()),
            },
        ),
        (
            "toonbr".to_string(),
            SourceConfig {
                kind: SourceKind::Toonbr,
                api_url: "https://api.toonbr.com".to_string(),
                cdn_url: Some("https://cdn2.toonbr.com".to_string()),
                language: None,
            },
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.server.bind_addr.to_string(), "0.0.0.0:8080");
        assert_eq!(config.server.max_payload_bytes, ByteSize::kib(64));
        assert_eq!(config.pool.size, 2);
        assert_eq!(config.pool.page_concurrency, 10);
        assert_eq!(config.fetch.request_timeout(), Duration::from_secs(60));
        assert_eq!(config.delivery.rate_limit_margin(), Duration::from_secs(1));
        assert_eq!(config.archive.compression, Compression::Deflated);
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.sources["toonbr"].kind, SourceKind::Toonbr);
    }

    #[test]
    fn test_user_agent_carries_version() {
        assert!(default_user_agent().starts_with("chapterbox/"));
    }
}
