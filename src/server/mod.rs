pub mod routes;
pub mod state;

use axum::routing::{delete, get, post};
use axum::Router;
use std::path::Path;
use std::time::Duration;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};

use crate::config::AppConfig;
use crate::errors::Result;
use crate::utils::ensure_dir_exists;

pub use state::{AppState, SystemInfo};

pub fn make_app(state: AppState, static_dir: Option<&Path>) -> Router {
    let api = Router::new()
        .route("/spotify/playlist", post(routes::get_playlist))
        .route("/spotify/track/{track_id}", get(routes::get_track))
        .route("/youtube/search", post(routes::search_videos))
        .route("/convert/start", post(routes::start_conversion))
        .route("/convert/status/{job_id}", get(routes::conversion_status))
        .route("/convert/download/{job_id}", get(routes::download_archive))
        .route("/convert/cleanup/{job_id}", delete(routes::cleanup_job))
        .fallback(routes::not_found);

    let app = Router::new()
        .route("/health", get(routes::health))
        .route("/debug", get(routes::debug_info))
        .route("/test-conversion", get(routes::test_conversion))
        .nest("/api", api);

    // Unknown paths get the front end's index.html so client-side routing works.
    let app = match static_dir {
        Some(dir) => app.fallback_service(
            ServeDir::new(dir).fallback(ServeFile::new(dir.join("index.html"))),
        ),
        None => app.fallback(routes::not_found),
    };

    app.layer(CorsLayer::permissive()).with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            log::error!("❌ [SERVER] Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                log::error!("❌ [SERVER] Failed to install SIGTERM handler: {}", e);
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
    log::info!("🛑 [SERVER] Shutdown signal received");
}

/// Builds the state from `config` and serves until Ctrl+C or SIGTERM.
pub async fn run_server(config: &AppConfig) -> Result<()> {
    ensure_dir_exists(&config.output.work_dir).await?;
    let state = AppState::from_config(config)?;
    let sweeper = state
        .jobs
        .start_sweeper(Duration::from_secs(config.jobs.sweep_interval_secs));

    let app = make_app(state, config.server.static_dir.as_deref());
    let listener =
        tokio::net::TcpListener::bind((config.server.host.as_str(), config.server.port)).await?;
    log::info!(
        "🚀 [SERVER] Listening on http://{} (demo mode: {})",
        listener.local_addr()?,
        config.demo_mode
    );

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;
    sweeper.abort();
    served?;
    Ok(())
}
