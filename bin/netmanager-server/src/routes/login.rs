//! Manual failover trigger.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/login/start", post(start_login))
}

#[derive(Debug, Deserialize)]
pub struct StartLoginQuery {
    #[serde(default)]
    pub wan: String,
}

/// Start the login pipeline for `?wan=` in the background.
///
/// Returns as soon as the run is spawned; progress arrives on `/ws`.
pub async fn start_login(
    State(state): State<Arc<AppState>>,
    Query(q): Query<StartLoginQuery>,
) -> Result<Json<Value>, ServerError> {
    let wan = q.wan.trim().to_owned();
    if wan.is_empty() {
        return Err(ServerError::BadRequest("wan is required".into()));
    }
    info!(%wan, "manual login requested");
    let pipeline = Arc::clone(&state.pipeline);
    tokio::spawn(async move {
        let outcome = pipeline.login_for_iface(&wan).await;
        info!(%wan, logged_in = outcome.logged_in(), "manual login finished");
    });
    Ok(Json(json!({ "ok": true })))
}
