use std::future::Future;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{
    services::{cancel_request, get_request, health, metrics, search, submit_request},
    state::AppState,
};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// All API routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/requests", post(submit_request))
        .route("/requests/{request_id}", get(get_request).delete(cancel_request))
        .route("/search", get(search))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .with_state(state)
        // Content-Encoding is undone here, so handlers always see plain bodies
        .layer(RequestDecompressionLayer::new())
}

/// Serve `router` on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, router: Router, shutdown: F) -> Result<(), AnyError>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(address = %listener.local_addr()?, "chapterbox API listening");

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
