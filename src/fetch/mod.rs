//! Page asset downloads
//!
//! [`PageFetcher`] fans the pages of one chapter out over a semaphore-bounded
//! [`tokio::task::JoinSet`], retries each page through the shared
//! [`RetryPolicy`](crate::retry::RetryPolicy) and drops pages that never
//! succeed instead of failing the chapter.

mod http;
mod pages;

pub use http::{AssetClient, FetchError, HttpClient, build_http_client};
pub use pages::{FetchedChapter, FetchedPage, PageFetcher};
