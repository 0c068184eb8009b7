//! Liveness endpoint with a summary of what the controller is watching.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use netmanager_core::entities::{BindingStore, CredentialStore};
use serde_json::{Value, json};

use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(get_health))
}

/// `{"status", "version", "monitor_enabled", "bindings", "accounts"}`.
///
/// Fails with 500 when the database cannot be read.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ServerError> {
    let bindings = state.store.all_bindings().await?.len();
    let accounts = state.store.list_credentials().await?.len();
    Ok(Json(json!({
        "status":          "ok",
        "version":         env!("CARGO_PKG_VERSION"),
        "monitor_enabled": state.config.monitor().enabled(),
        "bindings":        bindings,
        "accounts":        accounts,
    })))
}
