//! API models for the chapterbox submission endpoints.
//!
//! - `POST /requests` accepts a [`DownloadOrder`](crate::intake::DownloadOrder)
//!   and answers with [`SubmitResponse`]
//! - `GET /requests/{id}` returns a [`StatusResponse`]
//! - `DELETE /requests/{id}` returns a [`CancelResponse`]
//!
//! # Submission
//!
//! ```json
//! {
//!   "submitter_id": "user-42",
//!   "source": "toonbr",
//!   "catalog_id": "solo-leveling",
//!   "selection": { "mode": "from", "chapter_id": "1203" },
//!   "order": "ascending",
//!   "packaging": { "mode": "volumes", "chapters_per_volume": 10 },
//!   "destination": "channel-7"
//! }
//! ```
//!
//! `selection` defaults to every chapter, `order` to ascending and
//! `packaging` to one artifact per chapter.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::source::CatalogEntry;
use crate::worker::JobState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitResponse {
    pub request_id: Uuid,
    /// 1-based place in the backlog at submission time
    pub position: usize,
    pub chapter_count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub request_id: Uuid,
    pub state: JobState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    Dequeued,
    Signalled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub request_id: Uuid,
    pub outcome: CancelOutcome,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchQuery {
    pub source: String,
    pub q: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResponse {
    pub source: String,
    pub results: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub components: HashMap<String, String>,
    pub version: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}
