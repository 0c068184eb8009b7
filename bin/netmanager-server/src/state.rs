//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use netmanager_core::{ConfigClient, LogHub, LoginPipeline, SqliteStore};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Credentials and interface bindings.
    pub store: Arc<SqliteStore>,
    /// Also the failover trigger used by the monitor.
    pub pipeline: Arc<LoginPipeline<SqliteStore>>,
    /// Live progress messages for websocket clients.
    pub hub: LogHub,
}

impl AppState {
    pub fn uci(&self) -> &Arc<dyn ConfigClient> {
        self.pipeline.weights().config_client()
    }
}
