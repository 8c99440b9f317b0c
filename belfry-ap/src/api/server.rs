//! HTTP server setup and routing

use crate::app::App;
use belfry_common::{Error, Result};
use axum::{
    routing::{delete, get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application context passed to all handlers.
///
/// Clone is cheap: everything inside is an `Arc`.
#[derive(Clone)]
pub struct AppContext {
    pub app: Arc<App>,
}

/// Build the API router.
pub fn create_router(app: Arc<App>) -> Router {
    let ctx = AppContext { app };

    Router::new()
        .route("/health", get(super::handlers::health))
        .nest(
            "/api",
            Router::new()
                // combined status
                .route("/status", get(super::handlers::get_status))
                // schedule
                .route("/schedule", get(super::handlers::get_schedule))
                .route("/schedule", post(super::handlers::update_schedule))
                .route("/schedule/day", post(super::handlers::update_day))
                .route("/schedule/:day/activities", post(super::handlers::add_activity))
                .route(
                    "/schedule/:day/activities/:activity_id",
                    delete(super::handlers::remove_activity),
                )
                .route("/timeline", get(super::handlers::get_timeline))
                // scheduler control
                .route("/scheduler/start", post(super::handlers::start_scheduler))
                .route("/scheduler/stop", post(super::handlers::stop_scheduler))
                // audio
                .route("/audio/status", get(super::handlers::get_audio_status))
                .route("/audio/volume/:channel", get(super::handlers::get_volume))
                .route("/audio/volume/:channel", post(super::handlers::set_volume))
                .route("/audio/bell", post(super::handlers::trigger_bell))
                .route("/audio/announcement", post(super::handlers::trigger_announcement))
                .route("/audio/tts", post(super::handlers::trigger_tts))
                .route("/audio/stop-all", post(super::handlers::stop_all))
                // manual player
                .route("/player/status", get(super::handlers::player_status))
                .route("/player/files", get(super::handlers::player_files))
                .route("/player/play-file", post(super::handlers::player_play_file))
                .route("/player/play-radio", post(super::handlers::player_play_radio))
                .route("/player/playlist", post(super::handlers::player_playlist))
                .route("/player/next", post(super::handlers::player_next))
                .route("/player/previous", post(super::handlers::player_previous))
                .route("/player/toggle", post(super::handlers::player_toggle))
                .route("/player/stop", post(super::handlers::player_stop))
                .route("/player/seek", post(super::handlers::player_seek))
                .route("/player/volume", post(super::handlers::player_volume))
                // birthdays
                .route("/birthdays", get(super::handlers::birthday_status))
                .route("/birthdays", post(super::handlers::add_birthday))
                .route("/birthdays/:name", delete(super::handlers::remove_birthday))
                .route("/birthdays/import", post(super::handlers::import_birthdays))
                .route("/birthdays/settings", post(super::handlers::birthday_settings))
                // holidays
                .route("/holidays", get(super::handlers::holiday_status))
                .route("/holidays", post(super::handlers::add_holiday))
                .route("/holidays/:date", delete(super::handlers::remove_holiday))
                .route("/holidays/mute", post(super::handlers::mute_holiday))
                .route("/holidays/settings", post(super::handlers::holiday_settings)),
        )
        // SSE event stream
        .route("/events", get(super::sse::event_stream))
        .with_state(ctx)
        // local control panels live on other origins
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until a shutdown signal arrives.
pub async fn run(app: Arc<App>, port: u16) -> Result<()> {
    let router = create_router(app);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| Error::Http(format!("server error: {}", e)))?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
