//! Campus-network accounts.
//!
//! Secrets go in through `POST` and never come back out.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use netmanager_core::entities::{
    BandwidthClass, Credential, CredentialState, CredentialStore, NewCredential,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use validator::Validate;

use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/accounts", get(list_accounts).post(create_account))
}

/// Also accepts the `{Username, Password, Bandwidth}` names the web UI posts.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateAccountRequest {
    #[serde(alias = "Username")]
    #[validate(length(min = 1, max = 64))]
    pub username: String,
    #[serde(alias = "Password")]
    #[validate(length(min = 1, max = 128))]
    pub password: String,
    /// Mbps; one of 20, 50, 100 or 200.
    #[serde(alias = "Bandwidth")]
    pub bandwidth: i64,
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    pub id: i64,
    pub username: String,
    pub bandwidth: BandwidthClass,
    pub status: CredentialState,
    pub last_used_at: i64,
    pub disabled: bool,
}

impl From<Credential> for AccountResponse {
    fn from(c: Credential) -> Self {
        Self {
            id: c.id,
            username: c.username,
            bandwidth: c.bandwidth,
            status: c.state,
            last_used_at: c.last_used_at,
            disabled: c.disabled,
        }
    }
}

pub async fn list_accounts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<AccountResponse>>, ServerError> {
    let accounts = state.store.list_credentials().await?;
    Ok(Json(accounts.into_iter().map(AccountResponse::from).collect()))
}

pub async fn create_account(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<Json<Value>, ServerError> {
    req.validate()?;
    let bandwidth = BandwidthClass::try_from(req.bandwidth)
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let id = state
        .store
        .insert_credential(NewCredential {
            username: req.username.trim().to_owned(),
            secret: req.password,
            bandwidth,
        })
        .await?;
    Ok(Json(json!({ "id": id })))
}

#[cfg(test)]
mod tests {
    use axum::http::StatusCode;
    use serde_json::json;

    use crate::routes::testing::{TestApp, get, json_body, post_json};

    #[tokio::test]
    async fn created_account_is_listed_without_secret() {
        let app = TestApp::new().await;
        let resp = app
            .send(post_json(
                "/api/accounts",
                json!({"username": "2020123", "password": "s3cret", "bandwidth": 100}),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = app.send(get("/api/accounts")).await;
        let body = json_body(resp).await;
        assert_eq!(body[0]["username"], "2020123");
        assert_eq!(body[0]["bandwidth"], 100);
        assert_eq!(body[0]["status"], "IDLE");
        assert_eq!(body[0]["last_used_at"], 0);
        assert!(!body.to_string().contains("s3cret"));
    }

    #[tokio::test]
    async fn web_ui_field_names_are_accepted() {
        let app = TestApp::new().await;
        let resp = app
            .send(post_json(
                "/api/accounts",
                json!({"Username": "2021007", "Password": "pw", "Bandwidth": 50}),
            ))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);

        let body = json_body(app.send(get("/api/accounts")).await).await;
        assert_eq!(body[0]["username"], "2021007");
        assert_eq!(body[0]["bandwidth"], 50);
    }

    #[tokio::test]
    async fn unknown_bandwidth_is_rejected() {
        let app = TestApp::new().await;
        let resp = app
            .send(post_json("/api/accounts", json!({"username": "u", "password": "p", "bandwidth": 30})))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_username_is_rejected() {
        let app = TestApp::new().await;
        let resp = app
            .send(post_json("/api/accounts", json!({"username": "", "password": "p", "bandwidth": 20})))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
