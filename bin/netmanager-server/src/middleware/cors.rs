use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let origins: Vec<HeaderValue> = state
        .config
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    // Wildcard when nothing usable is configured; set NM_CORS_ORIGINS to restrict.
    let layer = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };
    layer.allow_headers(Any).allow_methods(Any)
}
