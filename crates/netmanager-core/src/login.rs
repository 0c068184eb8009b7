//! Running the external campus-network login binary.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::LoginError;

/// Deadline for one run of the login binary.
pub const LOGIN_TIMEOUT: Duration = Duration::from_secs(40);

/// Portal options shared by every login.
#[derive(Debug, Clone, Default)]
pub struct PortalOptions {
    /// Override for the portal host.
    pub host: Option<String>,
    /// Selects `--teaching-ip` over `--dormitory-ip` when `ip` is set.
    pub teaching: bool,
    pub ip: Option<String>,
}

/// One login attempt.
pub struct LoginRequest<'a> {
    pub nic: &'a str,
    pub username: &'a str,
    pub secret: &'a str,
    pub portal: &'a PortalOptions,
}

/// Authenticates a credential on a NIC.  Success is all that is reported.
#[async_trait]
pub trait LoginRunner: Send + Sync {
    async fn login(&self, req: &LoginRequest<'_>, timeout: Duration) -> Result<(), LoginError>;
}

/// [`LoginRunner`] that spawns the login binary as a child process.
#[derive(Debug, Clone)]
pub struct ProcessLoginRunner {
    binary: PathBuf,
}

impl ProcessLoginRunner {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

/// Command-line arguments for `req`, in the order the binary expects.
pub fn login_args(req: &LoginRequest<'_>) -> Vec<String> {
    let mut args = vec!["-i".to_owned(), req.nic.to_owned()];
    if let Some(host) = req.portal.host.as_deref().filter(|h| !h.is_empty()) {
        args.extend(["--host".to_owned(), host.to_owned()]);
    }
    if let Some(ip) = req.portal.ip.as_deref().filter(|ip| !ip.is_empty()) {
        let flag = if req.portal.teaching { "--teaching-ip" } else { "--dormitory-ip" };
        args.extend([flag.to_owned(), ip.to_owned()]);
    }
    args.extend([
        "--username".to_owned(),
        req.username.to_owned(),
        "--password".to_owned(),
        req.secret.to_owned(),
    ]);
    args
}

#[async_trait]
impl LoginRunner for ProcessLoginRunner {
    async fn login(&self, req: &LoginRequest<'_>, timeout: Duration) -> Result<(), LoginError> {
        if self.binary.as_os_str().is_empty() {
            return Err(LoginError::EmptyBinary);
        }
        debug!(binary = %self.binary.display(), nic = req.nic, username = req.username, "running login binary");

        let mut child = tokio::process::Command::new(&self.binary)
            .args(login_args(req))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        let waited = tokio::time::timeout(timeout, child.wait()).await;
        match waited {
            Ok(status) => {
                let status = status?;
                if status.success() { Ok(()) } else { Err(LoginError::Exit(status)) }
            }
            Err(_) => {
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "failed to kill timed-out login binary");
                }
                Err(LoginError::Timeout(timeout))
            }
        }
    }
}
