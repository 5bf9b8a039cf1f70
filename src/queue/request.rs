use bon::Builder;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::delivery::Destination;
use crate::source::{ChapterDescriptor, ContentSource};

/// How the chapters of a request are grouped into artifacts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Packaging {
    /// One artifact per chapter
    #[default]
    PerChapter,
    /// Consecutive chapters packed together, labelled `Volume N`
    Volumes { chapters_per_volume: usize },
}

impl Packaging {
    /// Split `chapters` into the groups that each become one artifact
    pub fn bundles<'a>(&self, chapters: &'a [ChapterDescriptor]) -> Vec<Bundle<'a>> {
        match *self {
            Packaging::PerChapter => chapters
                .iter()
                .map(|chapter| Bundle {
                    label: chapter.label().to_string(),
                    chapters: std::slice::from_ref(chapter),
                })
                .collect(),
            Packaging::Volumes {
                chapters_per_volume,
            } => chapters
                .chunks(chapters_per_volume.max(1))
                .enumerate()
                .map(|(i, chunk)| Bundle {
                    label: format!("Volume {}", i + 1),
                    chapters: chunk,
                })
                .collect(),
        }
    }
}

/// Chapters that end up in one artifact
#[derive(Debug, Clone, PartialEq)]
pub struct Bundle<'a> {
    pub label: String,
    pub chapters: &'a [ChapterDescriptor],
}

/// What a caller hands to [`Scheduler::enqueue`](super::Scheduler::enqueue)
#[derive(Builder)]
pub struct Submission {
    /// Reused when a request is restored from the backlog mirror
    pub request_id: Option<Uuid>,
    #[builder(into)]
    pub submitter_id: String,
    #[builder(into)]
    pub catalog_title: String,
    pub chapters: Vec<ChapterDescriptor>,
    pub source: Arc<dyn ContentSource>,
    pub destination: Destination,
    #[builder(default)]
    pub packaging: Packaging,
}

/// A queued unit of work; immutable once enqueued
#[derive(Clone)]
pub struct ContentRequest {
    pub request_id: Uuid,
    /// Enqueue order, also the backlog mirror key
    pub seq: u64,
    pub submitter_id: String,
    pub catalog_title: String,
    pub chapters: Vec<ChapterDescriptor>,
    pub source: Arc<dyn ContentSource>,
    pub destination: Destination,
    pub packaging: Packaging,
    pub submitted_at: OffsetDateTime,
}

impl fmt::Debug for ContentRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentRequest")
            .field("request_id", &self.request_id)
            .field("seq", &self.seq)
            .field("submitter_id", &self.submitter_id)
            .field("catalog_title", &self.catalog_title)
            .field("chapters", &self.chapters.len())
            .field("source", &self.source.name())
            .field("destination", &self.destination)
            .field("packaging", &self.packaging)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapters(n: usize) -> Vec<ChapterDescriptor> {
        (1..=n)
            .map(|i| ChapterDescriptor::new(format!("c{i}"), i as f64, "T"))
            .collect()
    }

    #[test]
    fn test_per_chapter_bundles() {
        let chapters = chapters(3);
        let bundles = Packaging::PerChapter.bundles(&chapters);

        assert_eq!(bundles.len(), 3);
        assert_eq!(bundles[1].label, "Chapter 2");
        assert_eq!(bundles[1].chapters, &chapters[1..2]);
    }

    #[test]
    fn test_volume_bundles_keep_order() {
        let chapters = chapters(5);
        let bundles = Packaging::Volumes {
            chapters_per_volume: 2,
        }
        .bundles(&chapters);

        let labels: Vec<_> = bundles.iter().map(|b| b.label.as_str()).collect();
        assert_eq!(labels, ["Volume 1", "Volume 2", "Volume 3"]);
        assert_eq!(bundles[2].chapters, &chapters[4..]);
    }

    #[test]
    fn test_packaging_wire_format() {
        let parsed: Packaging =
            serde_json::from_str(r#"{"mode":"volumes","chapters_per_volume":10}"#).unwrap();
        assert_eq!(
            parsed,
            Packaging::Volumes {
                chapters_per_volume: 10
            }
        );
        assert_eq!(
            serde_json::from_str::<Packaging>(r#"{"mode":"per_chapter"}"#).unwrap(),
            Packaging::PerChapter
        );
    }
}
