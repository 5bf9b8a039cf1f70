use thiserror::Error;

use crate::intake::DownloadOrder;
use crate::queue::Packaging;
use crate::selection::ChapterSelection;

const MAX_ID_LEN: usize = 128;
const MAX_EXPLICIT_IDS: usize = 1000;

#[derive(Debug, Error)]
pub enum OrderValidationError {
    #[error("{0} must not be empty")]
    Missing(&'static str),
    #[error("{0} exceeds {max} characters", max = MAX_ID_LEN)]
    TooLong(&'static str),
    #[error("selection ids must contain between 1 and {max} entries", max = MAX_EXPLICIT_IDS)]
    InvalidIdCount,
    #[error("chapters_per_volume must be at least 1")]
    InvalidVolumeSize,
}

pub fn validate_order(order: &DownloadOrder) -> Result<(), OrderValidationError> {
    let fields = [
        ("submitter_id", order.submitter_id.as_str()),
        ("source", order.source.as_str()),
        ("catalog_id", order.catalog_id.as_str()),
        ("destination", order.destination.as_str()),
    ];
    for (name, value) in fields {
        if value.trim().is_empty() {
            return Err(OrderValidationError::Missing(name));
        }
        if value.chars().count() > MAX_ID_LEN {
            return Err(OrderValidationError::TooLong(name));
        }
    }

    match &order.selection {
        ChapterSelection::Ids { ids } if !(1..=MAX_EXPLICIT_IDS).contains(&ids.len()) => {
            return Err(OrderValidationError::InvalidIdCount);
        }
        ChapterSelection::Single { chapter_id } | ChapterSelection::From { chapter_id }
            if chapter_id.is_empty() =>
        {
            return Err(OrderValidationError::Missing("chapter_id"));
        }
        _ => {}
    }

    if let Packaging::Volumes {
        chapters_per_volume: 0,
    } = order.packaging
    {
        return Err(OrderValidationError::InvalidVolumeSize);
    }

    Ok(())
}
