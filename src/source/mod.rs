//! Content sources: catalog search, chapter listing and page resolution
//!
//! Every source adapter implements [`ContentSource`] explicitly and is looked
//! up by name through the [`SourceRegistry`] when a request is composed.
//!
//! ## Example
//!
//! ```rust,ignore
//! use chapterbox::source::SourceRegistry;
//!
//! let registry = SourceRegistry::from_config(&config.sources, client);
//! let source = registry.get("toonbr")?;
//! let chapters = source.list_chapters("some-slug").await?;
//! let pages = source.resolve_pages(&chapters[0].id).await?;
//! ```

mod mangaflix;
mod registry;
mod toonbr;

pub use mangaflix::MangaflixSource;
pub use registry::{RegistryError, SourceRegistry};
pub use toonbr::ToonbrSource;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Any failure talking to a source; callers treat all of them as "source unavailable"
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source request failed: {0}")]
    Request(String),

    #[error("source returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("malformed source response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("source timed out after {0:?}")]
    Timeout(Duration),

    #[error("not found: {0}")]
    NotFound(String),
}

/// One search hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub title: String,
    pub catalog_id: String,
}

/// One chapter of a catalog entry, as produced by a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDescriptor {
    pub id: String,
    pub number: f64,
    pub display_name: String,
    pub catalog_title: String,
}

impl ChapterDescriptor {
    pub fn new(id: impl Into<String>, number: f64, catalog_title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            number,
            display_name: format!("Chapter {}", format_number(number)),
            catalog_title: catalog_title.into(),
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = name.into();
        self
    }

    /// Label used in notifications and artifact names
    pub fn label(&self) -> &str {
        &self.display_name
    }
}

/// Fixed capability interface every source adapter implements
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Registry name, also persisted in the backlog mirror
    fn name(&self) -> &str;

    async fn search(&self, query: &str) -> Result<Vec<CatalogEntry>, SourceError>;

    async fn list_chapters(&self, catalog_id: &str) -> Result<Vec<ChapterDescriptor>, SourceError>;

    /// Ordered page-asset locators for one chapter
    async fn resolve_pages(&self, chapter_id: &str) -> Result<Vec<String>, SourceError>;
}

/// Render a chapter number without a trailing ".0"
pub fn format_number(number: f64) -> String {
    if number.fract() == 0.0 && number.abs() < 1e15 {
        format!("{}", number as i64)
    } else {
        format!("{number}")
    }
}

/// Sources disagree on whether chapter numbers are JSON numbers or strings
pub(crate) fn parse_chapter_number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Send a prepared GET and return the body of a successful response
pub(crate) async fn get_body(
    client: &reqwest::Client,
    request: reqwest::RequestBuilder,
) -> Result<Bytes, SourceError> {
    let request = request
        .build()
        .map_err(|e| SourceError::Request(e.to_string()))?;
    let url = request.url().to_string();
    debug!(%url, "Querying source");

    let response = client
        .execute(request)
        .await
        .map_err(|e| SourceError::Request(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status {
            status: status.as_u16(),
            url,
        });
    }

    response
        .bytes()
        .await
        .map_err(|e| SourceError::Request(format!("failed to read body: {e}")))
}

/// `{base}/{segment}` with the segment percent-encoded so ids cannot add path, query or fragment
pub(crate) fn join_segment(base: &str, segment: &str) -> String {
    format!("{base}/{}", urlencoding::encode(segment))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(12.0), "12");
        assert_eq!(format_number(12.5), "12.5");
        assert_eq!(format_number(0.0), "0");
    }

    #[test]
    fn test_parse_chapter_number_variants() {
        assert_eq!(parse_chapter_number(Some(&json!(3))), Some(3.0));
        assert_eq!(parse_chapter_number(Some(&json!("10.5"))), Some(10.5));
        assert_eq!(parse_chapter_number(Some(&json!("extra"))), None);
        assert_eq!(parse_chapter_number(Some(&Value::Null)), None);
        assert_eq!(parse_chapter_number(None), None);
    }

    #[test]
    fn test_descriptor_default_label() {
        let chapter = ChapterDescriptor::new("c-1", 7.5, "Title");
        assert_eq!(chapter.label(), "Chapter 7.5");

        let named = chapter.with_display_name("Prologue");
        assert_eq!(named.label(), "Prologue");
    }

    #[test]
    fn test_join_segment_escapes_reserved_characters() {
        assert_eq!(
            join_segment("https://api.example/mangas", "abc?x#y"),
            "https://api.example/mangas/abc%3Fx%23y"
        );
        assert_eq!(
            join_segment("https://api.example/mangas", "a/b c"),
            "https://api.example/mangas/a%2Fb%20c"
        );
        assert_eq!(join_segment("https://h", "plain-1"), "https://h/plain-1");
    }
}
