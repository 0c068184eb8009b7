//! Read-only views of the router's `mwan3` state.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use netmanager_core::uci::resolve_member_mapping;
use serde::Serialize;

use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/mwan/interfaces", get(get_interfaces))
        .route("/mwan/status", get(get_status))
}

#[derive(Debug, Serialize)]
pub struct InterfacesResponse {
    /// WAN interface → `mwan3` member section.
    pub member_map: HashMap<String, String>,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: String,
}

pub async fn get_interfaces(
    State(state): State<Arc<AppState>>,
) -> Result<Json<InterfacesResponse>, ServerError> {
    let raw = state.uci().fetch_config().await?;
    Ok(Json(InterfacesResponse { member_map: resolve_member_mapping(&raw) }))
}

pub async fn get_status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ServerError> {
    let status = state.uci().status().await?;
    Ok(Json(StatusResponse { status }))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use crate::routes::testing::{TestApp, get, json_body};

    #[tokio::test]
    async fn interfaces_are_resolved_from_uci_show() {
        let app = TestApp::new().await;
        let resp = app.send(get("/api/mwan/interfaces")).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["member_map"]["wan"], "wan_m1");
        assert_eq!(body["member_map"]["wanb"], "wanb_m1");
    }

    #[tokio::test]
    async fn status_is_passed_through() {
        let app = TestApp::new().await;
        let body = json_body(app.send(get("/api/mwan/status")).await).await;
        assert_eq!(body["status"], "interface wan is online");
    }
}
