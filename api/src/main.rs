use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use searchlens_mcp_runtime::context::RuntimeConfig;
use searchlens_mcp_runtime::{default_token_manager, tools};

mod error;
mod middleware;
mod routes;
mod state;

#[tokio::main]
async fn main() {
    // Load .env if present (dev only)
    let _ = dotenvy::dotenv();

    // Structured JSON logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "searchlens_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let registry = tools::build_registry().expect("Failed to build tool registry");
    let app_state = state::AppState {
        registry: Arc::new(registry),
        auth: default_token_manager(),
        runtime: RuntimeConfig::from_env(),
        pending_authorizations: Arc::new(Mutex::new(HashMap::new())),
    };

    let cors_layer = middleware::cors::build_cors_layer();

    let app = Router::new()
        .merge(routes::health::router())
        .merge(routes::mcp::router())
        .merge(routes::oauth::router())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer),
        )
        .with_state(app_state);

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(3000);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("searchlens API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app).await.expect("Server error");
}
