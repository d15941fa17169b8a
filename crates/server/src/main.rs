mod api;
mod state;

use crate::state::AppState;
use axum::{
    http::{Method, header},
    routing::any,
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tramspot::config::Config;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    info!("Starting proxy...");
    let config = Config::from_env();
    let state = Arc::new(AppState::new(&config.upstream_url));
    info!("Forwarding to {}", state.upstream);

    // Preflight requests are answered here with 200 and no body.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    let app = axum::Router::new()
        .route("/", any(api::proxy))
        .route("/{*path}", any(api::proxy))
        .layer(cors)
        .with_state(state);
    let listener = match tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await {
        Ok(listener) => listener,
        Err(err) => {
            error!("Failed to bind port {}: {err}", config.port);
            std::process::exit(1);
        }
    };
    info!("Listening to port {}", config.port);
    if let Err(err) = axum::serve(listener, app).await {
        error!("Server stopped: {err}");
        std::process::exit(1);
    }
}
