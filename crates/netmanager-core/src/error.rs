use std::time::Duration;

use thiserror::Error;

/// Failures of a single remote command.
///
/// Transport errors are always propagated to the caller and never retried
/// inside the channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// TCP connect to the router failed or timed out.
    #[error("ssh dial {addr}: {source}")]
    Dial {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// SSH handshake or channel setup failed.
    #[error("ssh session: {0}")]
    Session(#[from] ssh2::Error),

    /// The server rejected the configured credentials.
    #[error("ssh authentication failed for user {user}")]
    Auth { user: String },

    /// Reading command output failed.
    #[error("ssh read: {0}")]
    Io(#[from] std::io::Error),

    /// The remote command exited non-zero.
    #[error("run: exit status {status}, stderr: {stderr}")]
    CommandFailed { status: i32, stderr: String },

    /// The private key configured for the channel is missing or unreadable.
    #[error("read key {path}: {message}")]
    Key { path: String, message: String },

    /// The channel actor has stopped and can no longer accept commands.
    #[error("command channel closed")]
    Closed,

    /// The blocking worker running the command panicked or was cancelled.
    #[error("ssh worker: {0}")]
    Worker(String),
}

/// Errors raised by the `uci` configuration client.
#[derive(Debug, Error)]
pub enum UciError {
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// Refused to interpolate a name that is not a plain uci identifier.
    #[error("invalid uci section name {0:?}")]
    InvalidSection(String),

    #[error("empty backup path")]
    EmptyBackupPath,
}

/// Outcome of the rollback attempted after a failed step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RollbackStatus {
    Restored,
    Failed(String),
}

impl std::fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RollbackStatus::Restored => f.write_str("rolled back"),
            RollbackStatus::Failed(e) => write!(f, "rollback failed: {e}"),
        }
    }
}

/// The mutating steps of a weight application, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum WeightStep {
    SetWeight,
    Commit,
    Restart,
    Status,
}

/// Errors returned by [`crate::mwan::WeightController::apply_weight`].
#[derive(Debug, Error)]
pub enum WeightError {
    /// `uci show mwan3` could not be fetched; nothing was changed.
    #[error("uci show: {0}")]
    Fetch(#[source] UciError),

    /// The interface has no load-balancer member; nothing was changed.
    #[error("member not found for iface {0}")]
    MemberNotFound(String),

    /// The backup could not be taken; nothing was changed.
    #[error("backup: {0}")]
    Backup(#[source] UciError),

    /// A step after the backup failed and a rollback was attempted.
    #[error("{step}: {source} ({rollback})")]
    Step {
        step: WeightStep,
        #[source]
        source: UciError,
        rollback: RollbackStatus,
    },

    /// `mwan3 status` returned nothing after the restart.
    #[error("empty status after restart ({rollback})")]
    EmptyStatus { rollback: RollbackStatus },
}

impl WeightError {
    /// True when the remote configuration was never touched.
    pub fn before_mutation(&self) -> bool {
        matches!(
            self,
            WeightError::Fetch(_) | WeightError::MemberNotFound(_) | WeightError::Backup(_)
        )
    }
}

/// Failures of the external login process.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("empty login binary path")]
    EmptyBinary,

    #[error("spawn login binary: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("login exited with {0}")]
    Exit(std::process::ExitStatus),

    #[error("login timed out after {0:?}")]
    Timeout(Duration),
}
