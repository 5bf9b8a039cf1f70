//! Turning "download these chapters of that title" into a queued [`Submission`]
//!
//! Shared by the HTTP API and the `download` command: look the source up,
//! list the catalog entry's chapters, apply the selection and order.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use crate::delivery::Destination;
use crate::queue::{Packaging, Submission};
use crate::selection::{self, ChapterOrder, ChapterSelection, SelectionError};
use crate::source::{CatalogEntry, RegistryError, SourceError, SourceRegistry};

#[derive(Debug, Error)]
pub enum IntakeError {
    #[error(transparent)]
    UnknownSource(#[from] RegistryError),

    #[error("source unavailable: {0}")]
    SourceUnavailable(#[from] SourceError),

    #[error(transparent)]
    Selection(#[from] SelectionError),
}

/// A download order as a client states it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadOrder {
    pub submitter_id: String,
    pub source: String,
    pub catalog_id: String,
    #[serde(default)]
    pub selection: ChapterSelection,
    #[serde(default)]
    pub order: ChapterOrder,
    #[serde(default)]
    pub packaging: Packaging,
    pub destination: Destination,
}

#[derive(Clone)]
pub struct Intake {
    registry: Arc<SourceRegistry>,
    timeout: Duration,
}

impl Intake {
    /// `timeout` bounds every source query made on behalf of a caller
    pub fn new(registry: Arc<SourceRegistry>, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub async fn search(&self, source: &str, query: &str) -> Result<Vec<CatalogEntry>, IntakeError> {
        let source = self.registry.get(source)?;
        let results = tokio::time::timeout(self.timeout, source.search(query))
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))??;
        Ok(results)
    }

    /// Resolve `order` against its source into a submission ready to enqueue
    pub async fn prepare(&self, order: DownloadOrder) -> Result<Submission, IntakeError> {
        let source = self.registry.get(&order.source)?;

        let listed = tokio::time::timeout(self.timeout, source.list_chapters(&order.catalog_id))
            .await
            .map_err(|_| SourceError::Timeout(self.timeout))??;
        debug!(
            source = %order.source,
            catalog_id = %order.catalog_id,
            listed = listed.len(),
            "Chapters listed"
        );

        let catalog_title = listed
            .first()
            .map(|c| c.catalog_title.clone())
            .unwrap_or_else(|| order.catalog_id.clone());
        let chapters = selection::resolve(listed, &order.selection, order.order)?;

        Ok(Submission::builder()
            .submitter_id(order.submitter_id)
            .catalog_title(catalog_title)
            .chapters(chapters)
            .source(source)
            .destination(order.destination)
            .packaging(order.packaging)
            .build())
    }
}
