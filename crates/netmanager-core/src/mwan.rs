//! Apply a load-balancer weight to one WAN interface with backup and rollback.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::error::{RollbackStatus, UciError, WeightError, WeightStep};
use crate::uci::{ConfigClient, resolve_member_mapping};

/// Time `mwan3` is given to come back up before its status is read.
pub const SETTLE_INTERVAL: Duration = Duration::from_secs(2);

/// Orchestrates backup → set → commit → restart → verify for `mwan3`.
///
/// Verification is weak: any `mwan3 status` output counts as success unless
/// it is empty or whitespace only, which is treated as empty and rolled back.
/// The new weight itself is not read back.
#[derive(Clone)]
pub struct WeightController {
    uci: Arc<dyn ConfigClient>,
    settle: Duration,
}

impl std::fmt::Debug for WeightController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeightController").field("settle", &self.settle).finish()
    }
}

impl WeightController {
    pub fn new(uci: Arc<dyn ConfigClient>) -> Self {
        Self { uci, settle: SETTLE_INTERVAL }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn config_client(&self) -> &Arc<dyn ConfigClient> {
        &self.uci
    }

    pub async fn apply_weight(&self, wan_iface: &str, weight: u32) -> Result<(), WeightError> {
        let raw = self.uci.fetch_config().await.map_err(WeightError::Fetch)?;
        let member = resolve_member_mapping(&raw)
            .remove(wan_iface)
            .ok_or_else(|| WeightError::MemberNotFound(wan_iface.to_owned()))?;

        let backup = self.uci.backup().await.map_err(WeightError::Backup)?;
        info!(%wan_iface, %member, weight, backup = %backup, "applying mwan3 weight");

        if let Err(e) = self.uci.set_member_weight(&member, weight).await {
            return Err(self.fail(WeightStep::SetWeight, e, &backup).await);
        }
        if let Err(e) = self.uci.commit().await {
            return Err(self.fail(WeightStep::Commit, e, &backup).await);
        }
        if let Err(e) = self.uci.restart().await {
            return Err(self.fail(WeightStep::Restart, e, &backup).await);
        }

        tokio::time::sleep(self.settle).await;

        match self.uci.status().await {
            Err(e) => Err(self.fail(WeightStep::Status, e, &backup).await),
            Ok(status) if status.trim().is_empty() => {
                let rollback = self.rollback(&backup).await;
                Err(WeightError::EmptyStatus { rollback })
            }
            Ok(_) => {
                info!(%wan_iface, %member, weight, "mwan3 weight applied");
                Ok(())
            }
        }
    }

    async fn fail(&self, step: WeightStep, source: UciError, backup: &str) -> WeightError {
        warn!(%step, error = %source, "mwan3 step failed; rolling back");
        let rollback = self.rollback(backup).await;
        WeightError::Step { step, source, rollback }
    }

    async fn rollback(&self, backup: &str) -> RollbackStatus {
        match self.uci.rollback(backup).await {
            Ok(()) => RollbackStatus::Restored,
            Err(e) => {
                warn!(backup = %backup, error = %e, "mwan3 rollback failed");
                RollbackStatus::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use tracing_test::traced_test;

    use super::*;
    use crate::error::ChannelError;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Fetch,
        Backup,
        Set(String, u32),
        Commit,
        Restart,
        Status,
        Rollback(String),
    }

    /// Fake `mwan3` that records calls and fails on request.
    #[derive(Default)]
    struct FakeUci {
        calls: Mutex<Vec<Call>>,
        fail_on: Option<&'static str>,
        status_text: &'static str,
    }

    impl FakeUci {
        fn new() -> Self {
            Self { status_text: "interface wan is online", ..Default::default() }
        }

        fn failing(step: &'static str) -> Self {
            Self { fail_on: Some(step), ..Self::new() }
        }

        fn record(&self, call: Call, name: &str) -> Result<(), UciError> {
            self.calls.lock().expect("calls lock").push(call);
            if self.fail_on == Some(name) {
                return Err(UciError::Channel(ChannelError::CommandFailed {
                    status: 1,
                    stderr: format!("{name} exploded"),
                }));
            }
            Ok(())
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    #[async_trait]
    impl ConfigClient for FakeUci {
        async fn fetch_config(&self) -> Result<String, UciError> {
            self.record(Call::Fetch, "fetch")?;
            Ok("mwan3.wan_m1_w2.interface='wan'\nmwan3.wanb_m1_w3.interface='wanb'\n".into())
        }
        async fn set_member_weight(&self, member: &str, weight: u32) -> Result<(), UciError> {
            self.record(Call::Set(member.into(), weight), "set")
        }
        async fn commit(&self) -> Result<(), UciError> {
            self.record(Call::Commit, "commit")
        }
        async fn restart(&self) -> Result<(), UciError> {
            self.record(Call::Restart, "restart")
        }
        async fn status(&self) -> Result<String, UciError> {
            self.record(Call::Status, "status")?;
            Ok(self.status_text.into())
        }
        async fn backup(&self) -> Result<String, UciError> {
            self.record(Call::Backup, "backup")?;
            Ok("/tmp/mwan3.backup".into())
        }
        async fn rollback(&self, path: &str) -> Result<(), UciError> {
            self.record(Call::Rollback(path.into()), "rollback")
        }
    }

    fn controller(fake: Arc<FakeUci>) -> WeightController {
        WeightController::new(fake).with_settle(Duration::ZERO)
    }

    fn rollback() -> Call {
        Call::Rollback("/tmp/mwan3.backup".into())
    }

    #[tokio::test]
    async fn success_runs_every_step_without_rollback() {
        let fake = Arc::new(FakeUci::new());
        controller(Arc::clone(&fake)).apply_weight("wanb", 10).await.expect("applied");

        assert_eq!(
            fake.calls(),
            vec![
                Call::Fetch,
                Call::Backup,
                Call::Set("wanb_m1_w3".into(), 10),
                Call::Commit,
                Call::Restart,
                Call::Status,
            ]
        );
    }

    #[tokio::test]
    async fn unknown_interface_touches_nothing() {
        let fake = Arc::new(FakeUci::new());
        let err = controller(Arc::clone(&fake)).apply_weight("wanc", 5).await.unwrap_err();

        assert!(matches!(&err, WeightError::MemberNotFound(i) if i == "wanc"));
        assert!(err.before_mutation());
        assert_eq!(fake.calls(), vec![Call::Fetch]);
    }

    #[tokio::test]
    async fn failed_backup_aborts_before_mutation() {
        let fake = Arc::new(FakeUci::failing("backup"));
        let err = controller(Arc::clone(&fake)).apply_weight("wan", 5).await.unwrap_err();

        assert!(matches!(err, WeightError::Backup(_)));
        assert_eq!(fake.calls(), vec![Call::Fetch, Call::Backup]);
    }

    #[tokio::test]
    async fn failed_set_rolls_back() {
        let fake = Arc::new(FakeUci::failing("set"));
        let err = controller(Arc::clone(&fake)).apply_weight("wan", 5).await.unwrap_err();

        assert!(matches!(err, WeightError::Step { step: WeightStep::SetWeight, .. }));
        assert_eq!(
            fake.calls(),
            vec![Call::Fetch, Call::Backup, Call::Set("wan_m1_w2".into(), 5), rollback()]
        );
    }

    #[tokio::test]
    async fn failed_commit_rolls_back_with_same_backup() {
        let fake = Arc::new(FakeUci::failing("commit"));
        let err = controller(Arc::clone(&fake)).apply_weight("wan", 20).await.unwrap_err();

        match &err {
            WeightError::Step { step, rollback, .. } => {
                assert_eq!(*step, WeightStep::Commit);
                assert_eq!(*rollback, RollbackStatus::Restored);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            fake.calls(),
            vec![
                Call::Fetch,
                Call::Backup,
                Call::Set("wan_m1_w2".into(), 20),
                Call::Commit,
                rollback(),
            ]
        );
        assert!(err.to_string().contains("commit exploded"));
    }

    #[tokio::test]
    async fn failed_restart_rolls_back() {
        let fake = Arc::new(FakeUci::failing("restart"));
        let err = controller(Arc::clone(&fake)).apply_weight("wan", 2).await.unwrap_err();

        assert!(matches!(err, WeightError::Step { step: WeightStep::Restart, .. }));
        assert_eq!(fake.calls().last(), Some(&rollback()));
        assert!(!fake.calls().contains(&Call::Status));
    }

    #[tokio::test]
    async fn whitespace_only_status_counts_as_empty() {
        let fake = Arc::new(FakeUci { status_text: "  \n", ..FakeUci::new() });
        let err = controller(Arc::clone(&fake)).apply_weight("wan", 2).await.unwrap_err();

        assert!(matches!(err, WeightError::EmptyStatus { rollback: RollbackStatus::Restored }));
        assert_eq!(fake.calls().last(), Some(&rollback()));
    }

    #[tokio::test]
    #[traced_test]
    async fn rollback_failure_is_reported() {
        let fake = Arc::new(FakeUci { status_text: "", fail_on: Some("rollback"), ..Default::default() });
        let err = controller(fake).apply_weight("wan", 2).await.unwrap_err();

        assert!(matches!(err, WeightError::EmptyStatus { rollback: RollbackStatus::Failed(_) }));
        assert!(err.to_string().contains("rollback failed"));
        assert!(logs_contain("mwan3 rollback failed"));
    }
}
