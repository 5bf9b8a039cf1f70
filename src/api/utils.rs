//! API utility functions
//!
//! Pure helpers for HTTP request processing, kept apart from the handlers
//! so they can be unit tested.

use uuid::Uuid;

use crate::api::error::ApiError;

/// Submissions must be JSON; parameters such as `charset` are tolerated
pub fn ensure_json(content_type: Option<&str>) -> Result<(), ApiError> {
    let raw = content_type
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    let media: mime::Mime = raw
        .parse()
        .map_err(|_| ApiError::InvalidPayload(format!("unparseable Content-Type '{raw}'")))?;

    if media.type_() == mime::APPLICATION && media.subtype() == mime::JSON {
        return Ok(());
    }
    Err(ApiError::InvalidPayload(format!(
        "expected application/json, got {}/{}",
        media.type_(),
        media.subtype()
    )))
}

/// Request ids in paths are UUIDs; anything else cannot name a request
pub fn parse_request_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::NotFound(format!("request {raw}")))
}
