//! One-shot SSH transport built on `ssh2`.
//!
//! Every command gets a fresh TCP connection, handshake and session; nothing
//! is pooled.  `ssh2` is blocking, so the whole exchange runs on the tokio
//! blocking pool.

use std::io::Read;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use ssh2::Session;
use tracing::{debug, warn};

use super::Transport;
use crate::error::ChannelError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const IO_TIMEOUT: Duration = Duration::from_secs(60);

/// How to authenticate against the router.
#[derive(Clone)]
pub enum SshAuth {
    KeyFile(PathBuf),
    Password(String),
}

impl std::fmt::Debug for SshAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SshAuth::KeyFile(p) => f.debug_tuple("KeyFile").field(p).finish(),
            SshAuth::Password(_) => f.write_str("Password(***)"),
        }
    }
}

/// Address and login of the router.
#[derive(Debug, Clone)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub auth: SshAuth,
}

impl SshTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct SshTransport {
    target: SshTarget,
}

impl SshTransport {
    /// Build a transport for `target`.
    ///
    /// A key file that cannot be read is reported here, at startup, rather
    /// than on the first command.
    pub fn new(target: SshTarget) -> Result<Self, ChannelError> {
        if let SshAuth::KeyFile(path) = &target.auth {
            std::fs::metadata(path).map_err(|e| ChannelError::Key {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        }
        Ok(Self { target })
    }
}

#[async_trait]
impl Transport for SshTransport {
    async fn run(&mut self, command: &str) -> Result<String, ChannelError> {
        let target = self.target.clone();
        let command = command.to_owned();
        tokio::task::spawn_blocking(move || run_blocking(&target, &command))
            .await
            .map_err(|e| ChannelError::Worker(e.to_string()))?
    }
}

fn run_blocking(target: &SshTarget, command: &str) -> Result<String, ChannelError> {
    let addr = target.addr();
    let tcp = connect(&addr)?;
    tcp.set_read_timeout(Some(IO_TIMEOUT)).ok();
    tcp.set_write_timeout(Some(IO_TIMEOUT)).ok();

    let mut sess = Session::new()?;
    sess.set_tcp_stream(tcp);
    sess.handshake()?;

    let auth = match &target.auth {
        SshAuth::KeyFile(path) => sess.userauth_pubkey_file(&target.user, None, path, None),
        SshAuth::Password(pw) => sess.userauth_password(&target.user, pw),
    };
    if let Err(e) = auth {
        warn!(addr = %addr, user = %target.user, error = %e, "ssh authentication rejected");
        return Err(ChannelError::Auth { user: target.user.clone() });
    }
    if !sess.authenticated() {
        return Err(ChannelError::Auth { user: target.user.clone() });
    }

    let mut channel = sess.channel_session()?;
    channel.exec(command)?;

    let mut stdout = String::new();
    channel.read_to_string(&mut stdout)?;
    let mut stderr = String::new();
    if let Err(e) = channel.stderr().read_to_string(&mut stderr) {
        debug!(error = %e, "failed to read ssh stderr");
    }
    channel.wait_close()?;
    let status = channel.exit_status()?;

    if status != 0 {
        return Err(ChannelError::CommandFailed { status, stderr: stderr.trim().to_owned() });
    }
    Ok(stdout)
}

fn connect(addr: &str) -> Result<TcpStream, ChannelError> {
    let dial_err = |source: std::io::Error| ChannelError::Dial { addr: addr.to_owned(), source };

    let mut last_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved");
    for sock in addr.to_socket_addrs().map_err(dial_err)? {
        match TcpStream::connect_timeout(&sock, CONNECT_TIMEOUT) {
            Ok(s) => return Ok(s),
            Err(e) => last_err = e,
        }
    }
    Err(dial_err(last_err))
}
