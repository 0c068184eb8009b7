//! Axum router construction.
//!
//! [`build`] assembles the complete application router:
//! - `/api/*` JSON endpoints for the web UI
//! - `/ws` live log stream
//! - the built web UI from `NM_WEB_DIR`, with an `index.html` fallback
//! - CORS and per-request trace-id middleware

mod accounts;
mod backup;
mod health;
mod iface_map;
mod login;
mod mwan;
mod ws;

use std::sync::Arc;

use axum::{Router, middleware};
use tower::ServiceBuilder;
use tower_http::services::{ServeDir, ServeFile};
use tracing::{info, warn};

use crate::middleware::{cors, trace};
use crate::state::AppState;

/// Build the complete Axum [`Router`] for the application.
pub fn build(state: Arc<AppState>) -> Router {
    let api_router = Router::new()
        .merge(health::router())
        .merge(mwan::router())
        .merge(iface_map::router())
        .merge(accounts::router())
        .merge(login::router())
        .merge(backup::router());

    let mut app = Router::new().nest("/api", api_router).merge(ws::router());

    let web_dir = &state.config.web_dir;
    if web_dir.is_dir() {
        info!(path = %web_dir.display(), "serving web UI");
        let spa = ServeDir::new(web_dir).fallback(ServeFile::new(web_dir.join("index.html")));
        app = app.fallback_service(spa);
    } else {
        warn!(path = %web_dir.display(), "web UI directory not found; serving API only");
    }

    app
        // Outermost layers execute first on the way in.
        .layer(ServiceBuilder::new().layer(cors::cors_layer(&state)))
        .layer(middleware::from_fn(trace::trace_middleware))
        .with_state(state)
}
