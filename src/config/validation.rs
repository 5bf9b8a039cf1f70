use super::models::{Config, SourceKind};
use thiserror::Error;

/// Page fan-out beyond this saturates most CDNs' per-client limits
pub const MAX_PAGE_CONCURRENCY: usize = 64;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("pool.size must be at least 1")]
    InvalidPoolSize,

    #[error("pool.page_concurrency must be between 1 and {limit}, got {actual}")]
    InvalidPageConcurrency { actual: usize, limit: usize },

    #[error("{section}.max_attempts must be at least 1")]
    InvalidRetryAttempts { section: &'static str },

    #[error("Timeout must be positive: {field}")]
    InvalidTimeout { field: &'static str },

    #[error("No content sources configured")]
    NoSourcesConfigured,

    #[error("Source '{source_name}' has an invalid URL '{url}', expected http:// or https://")]
    InvalidSourceUrl { source_name: String, url: String },

    #[error("Source '{source_name}' of kind toonbr requires cdn_url")]
    MissingCdnUrl { source_name: String },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_pool(config)?;
    validate_retries(config)?;
    validate_timeouts(config)?;
    validate_sources(config)?;
    Ok(())
}

fn validate_pool(config: &Config) -> Result<(), ValidationError> {
    if config.pool.size == 0 {
        return Err(ValidationError::InvalidPoolSize);
    }

    let concurrency = config.pool.page_concurrency;
    if concurrency == 0 || concurrency > MAX_PAGE_CONCURRENCY {
        return Err(ValidationError::InvalidPageConcurrency {
            actual: concurrency,
            limit: MAX_PAGE_CONCURRENCY,
        });
    }

    Ok(())
}

fn validate_retries(config: &Config) -> Result<(), ValidationError> {
    if config.fetch.max_attempts == 0 {
        return Err(ValidationError::InvalidRetryAttempts { section: "fetch" });
    }
    if config.delivery.max_attempts == 0 {
        return Err(ValidationError::InvalidRetryAttempts { section: "delivery" });
    }
    Ok(())
}

/// A zero timeout would turn every request into an immediate failure
fn validate_timeouts(config: &Config) -> Result<(), ValidationError> {
    let timeouts = [
        ("fetch.connect_timeout_ms", config.fetch.connect_timeout_ms),
        ("fetch.request_timeout_ms", config.fetch.request_timeout_ms),
        ("delivery.attempt_timeout_ms", config.delivery.attempt_timeout_ms),
    ];

    for (field, value) in timeouts {
        if value == 0 {
            return Err(ValidationError::InvalidTimeout { field });
        }
    }

    Ok(())
}

fn validate_sources(config: &Config) -> Result<(), ValidationError> {
    if config.sources.is_empty() {
        return Err(ValidationError::NoSourcesConfigured);
    }

    for (name, source) in &config.sources {
        let urls = std::iter::once(&source.api_url).chain(source.cdn_url.as_ref());
        for url in urls {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ValidationError::InvalidSourceUrl {
                    source_name: name.clone(),
                    url: url.clone(),
                });
            }
        }

        if source.kind == SourceKind::Toonbr && source.cdn_url.is_none() {
            return Err(ValidationError::MissingCdnUrl {
                source_name: name.clone(),
            });
        }
    }

    Ok(())
}
