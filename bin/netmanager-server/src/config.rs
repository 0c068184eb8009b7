//! Server configuration, loaded from environment variables at startup.

use std::path::PathBuf;
use std::time::Duration;

use netmanager_core::{MonitorConfig, PortalOptions, SshAuth, SshTarget};

/// Runtime configuration for netmanager-server.
///
/// Every field has a default so the server starts without any environment
/// variables set (it will still need a reachable router to do anything).
#[derive(Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:8080"`).
    pub bind_address: String,

    /// sqlx SQLite URL (default: `"sqlite://netmanager.db"`).
    pub database_url: String,

    pub ssh_host: String,
    pub ssh_port: u16,
    pub ssh_user: String,
    pub ssh_key: PathBuf,
    /// When set, password auth is used instead of `ssh_key`.
    pub ssh_password: Option<String>,

    /// Path to the campus-network login binary.
    pub login_binary: PathBuf,
    pub login_host: Option<String>,
    pub login_ip: Option<String>,
    pub login_teaching: bool,

    /// Seconds between connectivity probes; `0` disables the monitor.
    pub monitor_interval: u64,
    pub monitor_urls: Vec<String>,

    /// Built web UI, served with an `index.html` fallback when present.
    pub web_dir: PathBuf,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,
    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,
    /// When set, also write a daily-rolling log file into this directory.
    pub log_dir: Option<PathBuf>,

    /// Comma-separated allowed origins; unset allows any origin.
    pub cors_allowed_origins: Option<String>,

    /// Per-subscriber backlog of the live log stream.
    pub log_buffer: usize,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("database_url", &self.database_url)
            .field("ssh_host", &self.ssh_host)
            .field("ssh_port", &self.ssh_port)
            .field("ssh_user", &self.ssh_user)
            .field("ssh_key", &self.ssh_key)
            .field("ssh_password", &self.ssh_password.as_ref().map(|_| "***"))
            .field("login_binary", &self.login_binary)
            .field("monitor_interval", &self.monitor_interval)
            .field("monitor_urls", &self.monitor_urls)
            .field("web_dir", &self.web_dir)
            .field("log_level", &self.log_level)
            .field("log_json", &self.log_json)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build [`Config`] from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let env_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_owned());

        Self {
            bind_address: env_or("NM_LISTEN", "0.0.0.0:8080"),
            database_url: env_or("NM_DATABASE_URL", "sqlite://netmanager.db"),
            ssh_host: env_or("NM_SSH_HOST", "127.0.0.1"),
            ssh_port: parse_env(get("NM_SSH_PORT"), 22),
            ssh_user: env_or("NM_SSH_USER", "root"),
            ssh_key: env_or("NM_SSH_KEY", "/root/.ssh/id_rsa").into(),
            ssh_password: get("NM_SSH_PASSWORD"),
            login_binary: env_or("NM_LOGIN_BINARY", "/usr/local/bin/srun-login").into(),
            login_host: get("NM_LOGIN_HOST"),
            login_ip: get("NM_LOGIN_IP"),
            login_teaching: get("NM_LOGIN_TEACHING").map(|v| is_truthy(&v)).unwrap_or(true),
            monitor_interval: parse_env(get("NM_MONITOR_INTERVAL"), 30),
            monitor_urls: split_list(&env_or(
                "NM_MONITOR_URLS",
                "https://www.baidu.com,https://www.qq.com",
            )),
            web_dir: env_or("NM_WEB_DIR", "web/dist").into(),
            log_level: env_or("NM_LOG", "info"),
            log_json: get("NM_LOG_JSON").map(|v| is_truthy(&v)).unwrap_or(false),
            log_dir: get("NM_LOG_DIR").map(PathBuf::from),
            cors_allowed_origins: get("NM_CORS_ORIGINS"),
            log_buffer: parse_env(get("NM_LOG_BUFFER"), netmanager_core::hub::DEFAULT_CAPACITY),
        }
    }

    pub fn ssh_target(&self) -> SshTarget {
        let auth = match &self.ssh_password {
            Some(pw) => SshAuth::Password(pw.clone()),
            None => SshAuth::KeyFile(self.ssh_key.clone()),
        };
        SshTarget {
            host: self.ssh_host.clone(),
            port: self.ssh_port,
            user: self.ssh_user.clone(),
            auth,
        }
    }

    pub fn portal(&self) -> PortalOptions {
        PortalOptions {
            host: self.login_host.clone(),
            teaching: self.login_teaching,
            ip: self.login_ip.clone(),
        }
    }

    pub fn monitor(&self) -> MonitorConfig {
        MonitorConfig {
            interval: Duration::from_secs(self.monitor_interval),
            probe_urls: self.monitor_urls.clone(),
        }
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn parse_env<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}

fn is_truthy(v: &str) -> bool {
    v == "1" || v.eq_ignore_ascii_case("true")
}

fn split_list(v: &str) -> Vec<String> {
    v.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_owned).collect()
}
