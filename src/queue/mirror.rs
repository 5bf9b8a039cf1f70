use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use super::{ContentRequest, Packaging};
use crate::delivery::Destination;
use crate::source::ChapterDescriptor;

#[derive(Error, Debug)]
pub enum MirrorError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MirrorError>;

/// One mirrored request; the source is stored by registry name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MirrorEntry {
    pub seq: u64,
    pub request_id: Uuid,
    pub submitter_id: String,
    pub catalog_title: String,
    pub chapters: Vec<ChapterDescriptor>,
    pub source: String,
    pub destination: Destination,
    pub packaging: Packaging,
    pub submitted_at: i64,
}

impl From<&ContentRequest> for MirrorEntry {
    fn from(request: &ContentRequest) -> Self {
        Self {
            seq: request.seq,
            request_id: request.request_id,
            submitter_id: request.submitter_id.clone(),
            catalog_title: request.catalog_title.clone(),
            chapters: request.chapters.clone(),
            source: request.source.name().to_string(),
            destination: request.destination.clone(),
            packaging: request.packaging,
            submitted_at: request.submitted_at.unix_timestamp(),
        }
    }
}

/// Advisory on-disk copy of the backlog
///
/// Layout: `backlog` partition, u64 sequence (big-endian) → JSON [`MirrorEntry`].
/// Big-endian keys make iteration order equal enqueue order.
pub struct BacklogMirror {
    keyspace: Keyspace,
    backlog: PartitionHandle,
}

impl BacklogMirror {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!("Opening backlog mirror at: {}", path.as_ref().display());

        let keyspace = Config::new(path).open()?;
        let backlog = keyspace.open_partition("backlog", PartitionCreateOptions::default())?;

        Ok(Self { keyspace, backlog })
    }

    pub fn record(&self, request: &ContentRequest) -> Result<()> {
        let value = serde_json::to_vec(&MirrorEntry::from(request))?;
        self.backlog.insert(request.seq.to_be_bytes(), value)?;
        self.keyspace.persist(PersistMode::Buffer)?;
        debug!(seq = request.seq, request_id = %request.request_id, "Request mirrored");
        Ok(())
    }

    pub fn remove(&self, seq: u64) -> Result<()> {
        self.backlog.remove(seq.to_be_bytes())?;
        self.keyspace.persist(PersistMode::Buffer)?;
        Ok(())
    }

    /// All entries in enqueue order
    pub fn load(&self) -> Result<Vec<MirrorEntry>> {
        let mut entries = Vec::new();
        for item in self.backlog.iter() {
            let (_key, value) = item?;
            entries.push(serde_json::from_slice(&value)?);
        }
        Ok(entries)
    }

    pub fn clear(&self) -> Result<()> {
        let keys = self
            .backlog
            .keys()
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for key in keys {
            self.backlog.remove(key)?;
        }
        self.keyspace.persist(PersistMode::Buffer)?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.backlog.len()?)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.backlog.is_empty()?)
    }

    /// Flush all writes to disk
    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(PersistMode::SyncAll)?;
        Ok(())
    }
}
