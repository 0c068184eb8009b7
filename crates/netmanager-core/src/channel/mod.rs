//! Serialized command channel to the router.
//!
//! [`CommandChannel`] is a cheap, clonable handle to a single actor task that
//! exclusively owns a [`Transport`].  Requests are queued on a bounded mpsc
//! channel and executed strictly one after another, so at most one remote
//! command is in flight across the whole process.
//!
//! Each call to [`CommandChannel::execute`] is queued on its own.  A sequence of
//! calls (e.g. show → set → commit) is **not** atomic: commands from another
//! caller may be interleaved between them.
//!
//! A caller that gives up waiting (its future is dropped) does not cancel the
//! command; the actor always runs a dequeued command to completion.

pub mod ssh;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::error::ChannelError;

pub use ssh::{SshAuth, SshTarget, SshTransport};

/// Something that can run exactly one shell command on the remote host.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Run `command` and return its standard output.
    async fn run(&mut self, command: &str) -> Result<String, ChannelError>;
}

/// A queued request for the channel actor.
struct ChannelRequest {
    command: String,
    reply_tx: oneshot::Sender<Result<String, ChannelError>>,
}

/// Handle to the channel actor.
#[derive(Clone, Debug)]
pub struct CommandChannel {
    tx: mpsc::Sender<ChannelRequest>,
}

impl CommandChannel {
    /// Spawn the actor owning `transport`.
    ///
    /// * `queue_capacity` – maximum number of commands waiting for the actor.
    pub fn spawn<T: Transport>(transport: T, queue_capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        tokio::spawn(Self::run_loop(transport, rx));
        Self { tx }
    }

    async fn run_loop<T: Transport>(mut transport: T, mut rx: mpsc::Receiver<ChannelRequest>) {
        while let Some(req) = rx.recv().await {
            debug!(command = %req.command, "executing remote command");
            let result = transport.run(&req.command).await;
            if let Err(e) = &result {
                warn!(command = %req.command, error = %e, "remote command failed");
            }
            if req.reply_tx.send(result).is_err() {
                debug!(command = %req.command, "caller went away before the reply");
            }
        }
        debug!("command channel actor stopped");
    }

    /// Execute one command and wait for its standard output.
    pub async fn execute(&self, command: impl Into<String>) -> Result<String, ChannelError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(ChannelRequest { command: command.into(), reply_tx })
            .await
            .map_err(|_| ChannelError::Closed)?;
        reply_rx.await.map_err(|_| ChannelError::Closed)?
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;

    use super::*;

    /// Tracks how many commands are inside `run` at the same time.
    struct CountingTransport {
        in_flight: Arc<AtomicUsize>,
        max_seen: Arc<AtomicUsize>,
        executed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Transport for CountingTransport {
        async fn run(&mut self, command: &str) -> Result<String, ChannelError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_seen.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.executed.fetch_add(1, Ordering::SeqCst);
            if command == "false" {
                return Err(ChannelError::CommandFailed { status: 1, stderr: "nope".into() });
            }
            Ok(format!("{command}\n"))
        }
    }

    fn counting() -> (CountingTransport, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let max_seen = Arc::new(AtomicUsize::new(0));
        let executed = Arc::new(AtomicUsize::new(0));
        let t = CountingTransport {
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_seen: Arc::clone(&max_seen),
            executed: Arc::clone(&executed),
        };
        (t, max_seen, executed)
    }

    #[tokio::test]
    async fn concurrent_commands_never_overlap() {
        let (transport, max_seen, executed) = counting();
        let channel = CommandChannel::spawn(transport, 4);

        let mut handles = Vec::new();
        for i in 0..32 {
            let ch = channel.clone();
            handles.push(tokio::spawn(async move { ch.execute(format!("echo {i}")).await }));
        }
        for h in handles {
            let out = h.await.expect("join").expect("command ok");
            assert!(out.starts_with("echo "));
        }

        assert_eq!(executed.load(Ordering::SeqCst), 32);
        assert_eq!(max_seen.load(Ordering::SeqCst), 1, "commands overlapped");
    }

    #[tokio::test]
    async fn command_failure_is_returned_not_retried() {
        let (transport, _, executed) = counting();
        let channel = CommandChannel::spawn(transport, 1);

        let err = channel.execute("false").await.unwrap_err();
        assert!(matches!(err, ChannelError::CommandFailed { status: 1, .. }));
        assert!(err.to_string().contains("nope"), "stderr should be embedded");
        assert_eq!(executed.load(Ordering::SeqCst), 1);
    }

    /// Holds each command until the test opens the gate.
    struct GatedTransport {
        started: Arc<Notify>,
        gate: Arc<Notify>,
        finished: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn run(&mut self, command: &str) -> Result<String, ChannelError> {
            self.started.notify_one();
            self.gate.notified().await;
            let _ = self.finished.send(command.to_owned());
            Ok(String::new())
        }
    }

    #[tokio::test]
    async fn abandoned_command_still_completes() {
        let started = Arc::new(Notify::new());
        let gate = Arc::new(Notify::new());
        let (finished, mut finished_rx) = mpsc::unbounded_channel();
        let channel = CommandChannel::spawn(
            GatedTransport { started: Arc::clone(&started), gate: Arc::clone(&gate), finished },
            1,
        );

        let caller = tokio::spawn({
            let channel = channel.clone();
            async move { channel.execute("uci commit mwan3").await }
        });
        started.notified().await;
        caller.abort();
        assert!(caller.await.unwrap_err().is_cancelled());

        gate.notify_one();
        let done = tokio::time::timeout(Duration::from_secs(1), finished_rx.recv())
            .await
            .expect("command finished after its caller left");
        assert_eq!(done.as_deref(), Some("uci commit mwan3"));
    }
}
