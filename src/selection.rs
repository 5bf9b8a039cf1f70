//! Turning a chapter listing plus a user selection into the ordered chapter list of a request

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::source::ChapterDescriptor;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("chapter not found: {0}")]
    UnknownChapter(String),

    #[error("selection matched no chapters")]
    Empty,
}

/// Which chapters of a catalog entry to download
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ChapterSelection {
    #[default]
    All,
    Single {
        chapter_id: String,
    },
    /// The given chapter and everything after it in the requested order
    From {
        chapter_id: String,
    },
    /// Exactly these chapters, in the order given
    Ids {
        ids: Vec<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChapterOrder {
    #[default]
    Ascending,
    Descending,
}

/// Resolve `selection` against the chapters a source listed
pub fn resolve(
    mut chapters: Vec<ChapterDescriptor>,
    selection: &ChapterSelection,
    order: ChapterOrder,
) -> Result<Vec<ChapterDescriptor>, SelectionError> {
    chapters.sort_by(|a, b| match order {
        ChapterOrder::Ascending => a.number.total_cmp(&b.number),
        ChapterOrder::Descending => b.number.total_cmp(&a.number),
    });

    let selected = match selection {
        ChapterSelection::All => chapters,
        ChapterSelection::Single { chapter_id } => vec![take(&chapters, chapter_id)?],
        ChapterSelection::From { chapter_id } => {
            let start = chapters
                .iter()
                .position(|c| &c.id == chapter_id)
                .ok_or_else(|| SelectionError::UnknownChapter(chapter_id.clone()))?;
            chapters.split_off(start)
        }
        ChapterSelection::Ids { ids } => ids
            .iter()
            .map(|id| take(&chapters, id))
            .collect::<Result<_, _>>()?,
    };

    if selected.is_empty() {
        return Err(SelectionError::Empty);
    }
    Ok(selected)
}

fn take(chapters: &[ChapterDescriptor], id: &str) -> Result<ChapterDescriptor, SelectionError> {
    chapters
        .iter()
        .find(|c| c.id == id)
        .cloned()
        .ok_or_else(|| SelectionError::UnknownChapter(id.to_string()))
}
