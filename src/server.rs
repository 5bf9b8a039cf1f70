use std::net::SocketAddr;
use std::sync::Arc;

use chapterbox::api;
use chapterbox::app::App;
use chapterbox::config::Config;
use chapterbox::notify::LogNotifier;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(mut config: Config, address: Option<SocketAddr>) -> Result<(), AnyError> {
    if let Some(address) = address {
        config.server.bind_addr = address;
    }

    let app = App::build(config, Arc::new(LogNotifier::new()))?;
    app.restore_backlog()?;

    let shutdown = CancellationToken::new();
    let mut pool = app.start_pool(shutdown.clone());

    let listener = TcpListener::bind(app.config.server.bind_addr).await?;
    let http_shutdown = shutdown.clone();
    let server = tokio::spawn(api::serve(listener, api::router(app.state()), async move {
        http_shutdown.cancelled().await
    }));

    tokio::select! {
        _ = shutdown_signal() => {}
        result = pool.wait() => {
            // Workers only stop on their own after a fatal queue error
            shutdown.cancel();
            server.await??;
            return result.map_err(Into::into);
        }
    }

    shutdown.cancel();
    let pool_result = pool.shutdown().await;
    server.await??;
    pool_result?;

    info!("chapterbox stopped");
    Ok(())
}

pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    info!("Shutdown signal received");
}
