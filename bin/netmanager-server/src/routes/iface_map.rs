//! WAN interface → NIC bindings.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use netmanager_core::entities::BindingStore;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/iface-map", get(list_bindings).post(upsert_binding))
}

/// Also accepts the `{WanIface, Nic}` field names the web UI posts.
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct BindingBody {
    #[serde(alias = "WanIface")]
    #[validate(length(min = 1, max = 64))]
    pub wan_iface: String,
    #[serde(alias = "Nic")]
    #[validate(length(min = 1, max = 64))]
    pub nic: String,
}

pub async fn list_bindings(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BindingBody>>, ServerError> {
    let mut bindings: Vec<BindingBody> = state
        .store
        .all_bindings()
        .await?
        .into_iter()
        .map(|(wan_iface, nic)| BindingBody { wan_iface, nic })
        .collect();
    bindings.sort_by(|a, b| a.wan_iface.cmp(&b.wan_iface));
    Ok(Json(bindings))
}

pub async fn upsert_binding(
    State(state): State<Arc<AppState>>,
    Json(body): Json<BindingBody>,
) -> Result<Json<Value>, ServerError> {
    body.validate()?;
    state.store.upsert_binding(body.wan_iface.trim(), body.nic.trim()).await?;
    Ok(Json(json!({ "ok": true })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::testing::{TestApp, get, json_body, post_json};

    #[tokio::test]
    async fn binding_is_stored_and_listed() {
        let app = TestApp::new().await;
        let resp = app.send(post_json("/api/iface-map", json!({"wan_iface": "wanb", "nic": "eth1"}))).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.send(post_json("/api/iface-map", json!({"wan_iface": "wanb", "nic": "eth2"}))).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(app.send(get("/api/iface-map")).await).await;
        assert_eq!(body, json!([{"wan_iface": "wanb", "nic": "eth2"}]));
    }

    #[tokio::test]
    async fn web_ui_field_names_are_accepted() {
        let app = TestApp::new().await;
        let resp = app.send(post_json("/api/iface-map", json!({"WanIface": "wan", "Nic": "eth0"}))).await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(app.send(get("/api/iface-map")).await).await;
        assert_eq!(body, json!([{"wan_iface": "wan", "nic": "eth0"}]));
    }

    #[tokio::test]
    async fn empty_fields_are_rejected() {
        let app = TestApp::new().await;
        let resp = app.send(post_json("/api/iface-map", json!({"wan_iface": "", "nic": "eth1"}))).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
