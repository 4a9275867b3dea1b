//! HTTP surface of the gateway.

pub mod api;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::WebState;

/// Build the router over shared state.
pub fn router(state: Arc<WebState>) -> Router {
    Router::new()
        // Intent API
        .route("/intents", post(api::post_intent))
        // Executor reports
        .route("/api/sessions", get(api::get_sessions))
        .route("/api/sessions/:id", get(api::get_session))
        .route("/api/sessions/:id/state", post(api::post_session_state))
        .route("/api/sessions/:id/heartbeat", post(api::post_heartbeat))
        // Playback decisions
        .route("/api/playback-info", post(api::post_playback_info))
        .route("/api/playback/decide", post(api::post_playback_decide))
        .route("/api/media/:id", post(api::post_media))
        // Breakers and statistics
        .route("/api/breakers", get(api::get_breakers))
        .route("/api/breakers/:name/report", post(api::post_breaker_report))
        .route("/api/metrics", get(api::get_metrics))
        .route("/api/stats", get(api::get_stats))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the web server.
pub async fn start_web_server(
    listen_addr: SocketAddr,
    state: Arc<WebState>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(listen_addr).await?;
    log::info!("Gateway listening on http://{}", listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
