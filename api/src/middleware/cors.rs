use axum::http::{HeaderName, HeaderValue, Method};
use tower_http::cors::CorsLayer;

// Agent-runtime origins that talk to the MCP endpoints from the browser.
const CONNECTOR_ORIGINS: &[&str] = &[
    "https://chatgpt.com",
    "https://chat.openai.com",
    "https://claude.ai",
];

/// CORS layer for the MCP and OAuth surfaces.
///
/// Allowed origins come from `SEARCHLENS_CORS_ORIGINS` (comma-separated,
/// default `http://localhost:3000`); the known connector origins are
/// always included.
pub fn build_cors_layer() -> CorsLayer {
    let configured = std::env::var("SEARCHLENS_CORS_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());

    let origins: Vec<HeaderValue> = configured
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .chain(CONNECTOR_ORIGINS.iter().copied())
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            HeaderName::from_static("authorization"),
            HeaderName::from_static("content-type"),
        ])
        .allow_credentials(true)
        .max_age(std::time::Duration::from_secs(3600))
}
