use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::IntoResponse,
};
use std::collections::HashMap;
use tracing::info;

use super::{
    models::{
        CancelOutcome, CancelResponse, HealthResponse, SearchQuery, SearchResponse, StatusResponse,
        SubmitResponse,
    },
    state::AppState,
    utils::{ensure_json, parse_request_id},
    validation::validate_order,
};
use crate::api::error::ApiError;
use crate::intake::DownloadOrder;
use crate::queue::{Cancellation, Position};
use crate::worker::JobState;

/// Submission endpoint (POST /requests)
///
/// ## Flow:
/// 1. Validate Content-Type, read the (already decompressed) body under the size limit
/// 2. Deserialize and validate the [`DownloadOrder`]
/// 3. List the catalog entry's chapters through its source and apply the selection
/// 4. Enqueue through the broker
/// 5. Return 202 Accepted with the request id and backlog position
pub async fn submit_request(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    ensure_json(
        headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
    )?;

    let limit = state.max_payload_bytes();
    let body_bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| ApiError::PayloadTooLarge(limit))?;

    let order: DownloadOrder = serde_json::from_slice(&body_bytes)?;
    validate_order(&order).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let source = order.source.clone();
    let submission = state.intake.prepare(order).await.inspect_err(|_| {
        state.metrics.add_requests_rejected(1);
    })?;
    let chapter_count = submission.chapters.len();

    let enqueued = state.broker.submit(submission)?;
    info!(
        request_id = %enqueued.request_id,
        %source,
        chapter_count,
        "Request queued via API"
    );

    let response = SubmitResponse {
        request_id: enqueued.request_id,
        position: enqueued.position,
        chapter_count,
    };

    Ok((StatusCode::ACCEPTED, Json(response)))
}

/// Request status endpoint (GET /requests/{request_id})
///
/// Only queued and running requests are known; finished ones are reported
/// through notifications and answer 404 here.
pub async fn get_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    let response = match state.broker.query_position(request_id)? {
        Position::Queued(position) => StatusResponse {
            request_id,
            state: JobState::Queued,
            position: Some(position),
        },
        Position::Running => StatusResponse {
            request_id,
            state: JobState::Running,
            position: None,
        },
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Cancellation endpoint (DELETE /requests/{request_id})
pub async fn cancel_request(
    State(state): State<AppState>,
    Path(request_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let request_id = parse_request_id(&request_id)?;

    let outcome = match state.broker.cancel(request_id).await? {
        Cancellation::Dequeued(_) => CancelOutcome::Dequeued,
        Cancellation::Signalled => CancelOutcome::Signalled,
    };

    Ok((StatusCode::OK, Json(CancelResponse { request_id, outcome })))
}

/// Catalog search endpoint (GET /search?source=&q=)
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, ApiError> {
    if query.q.trim().is_empty() {
        return Err(ApiError::InvalidPayload("q must not be empty".into()));
    }

    let results = state.intake.search(&query.source, &query.q).await?;

    Ok(Json(SearchResponse {
        source: query.source,
        results,
    }))
}

/// Health check endpoint (GET /health)
///
/// Returns 503 Service Unavailable if the queue lock is poisoned or no
/// source is registered.
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let mut components = HashMap::new();

    components.insert("api".to_string(), "healthy".to_string());
    components.insert(
        "queue".to_string(),
        status_label(state.broker.health_check()).to_string(),
    );
    components.insert(
        "sources".to_string(),
        status_label(!state.intake.registry().is_empty()).to_string(),
    );

    let all_healthy = components.values().all(|status| status == "healthy");
    let status_code = if all_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = HealthResponse {
        status: status_label(all_healthy).to_string(),
        components,
        version: env!("CARGO_PKG_VERSION").to_string(),
    };

    (status_code, Json(response))
}

/// Counter snapshot (GET /metrics)
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.snapshot())
}

fn status_label(healthy: bool) -> &'static str {
    if healthy { "healthy" } else { "unhealthy" }
}
