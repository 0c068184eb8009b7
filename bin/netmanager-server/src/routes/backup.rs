//! Database snapshot download and restore.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ServerError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/backup", get(download_backup))
        .route("/restore", post(upload_restore).layer(DefaultBodyLimit::max(RESTORE_LIMIT)))
}

/// Largest accepted restore upload.
const RESTORE_LIMIT: usize = 64 * 1024 * 1024;

fn scratch_path() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("netmanager-{}.db", Uuid::new_v4()))
}

/// Stream a consistent copy of the SQLite database as an attachment.
pub async fn download_backup(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ServerError> {
    let tmp = scratch_path();
    state.store.snapshot_to(&tmp).await?;
    let read = tokio::fs::read(&tmp).await;
    if let Err(e) = tokio::fs::remove_file(&tmp).await {
        warn!(path = %tmp.display(), error = %e, "failed to remove snapshot file");
    }
    let bytes = read?;
    info!(bytes = bytes.len(), "database snapshot served");

    let filename = format!("netmanager-{}.db", Utc::now().format("%Y%m%d-%H%M%S"));
    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_owned()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{filename}\"")),
        ],
        bytes,
    ))
}

/// Replace accounts and interface bindings with those in an uploaded snapshot.
pub async fn upload_restore(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Value>, ServerError> {
    if body.is_empty() {
        return Err(ServerError::BadRequest("empty upload".into()));
    }
    let tmp = scratch_path();
    tokio::fs::write(&tmp, &body).await?;
    let restored = state.store.restore_from(&tmp).await;
    if let Err(e) = tokio::fs::remove_file(&tmp).await {
        warn!(path = %tmp.display(), error = %e, "failed to remove uploaded snapshot");
    }
    let counts = restored.map_err(|e| {
        warn!(error = %e, bytes = body.len(), "rejected restore upload");
        ServerError::BadRequest("upload is not a netmanager backup".into())
    })?;
    info!(credentials = counts.credentials, bindings = counts.bindings, "database restored");
    state.hub.publish(format!(
        "restored {} accounts and {} interface bindings",
        counts.credentials, counts.bindings
    ));
    Ok(Json(json!({ "ok": true })))
}
