//! `login_for_iface`: bind → select → login → re-weight.
//!
//! Every branch publishes a message to the [`LogHub`] and returns a
//! [`LoginOutcome`]; nothing is escalated as a fatal error.  A failed login
//! only marks the credential RETRYING; re-triggering is left to the monitor
//! or the operator.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::entities::{BindingStore, CredentialState, CredentialStore};
use crate::error::{LoginError, WeightError};
use crate::hub::LogHub;
use crate::login::{LOGIN_TIMEOUT, LoginRequest, LoginRunner, PortalOptions};
use crate::monitor::Trigger;
use crate::mwan::WeightController;
use crate::selector::{Claim, CredentialSelector};
use crate::weights;

/// How a pipeline run ended.
#[derive(Debug)]
pub enum LoginOutcome {
    /// No NIC is bound to the interface.
    NoBinding,
    /// No credential is eligible.
    NoCredential,
    /// Eligible credentials exist, but concurrent logins kept claiming them first.
    Contended,
    /// The record store could not be read.
    Store(sqlx::Error),
    /// The login binary failed; the credential is now RETRYING.
    LoginFailed { credential_id: i64, error: LoginError },
    /// Logged in and re-weighted.
    Applied { credential_id: i64, weight: u32 },
    /// Logged in, but the weight could not be applied.
    WeightFailed { credential_id: i64, weight: u32, error: WeightError },
}

impl LoginOutcome {
    pub fn logged_in(&self) -> bool {
        matches!(self, LoginOutcome::Applied { .. } | LoginOutcome::WeightFailed { .. })
    }
}

pub struct LoginPipeline<S> {
    store: Arc<S>,
    selector: CredentialSelector<S>,
    runner: Arc<dyn LoginRunner>,
    weights: WeightController,
    hub: LogHub,
    portal: PortalOptions,
    login_timeout: Duration,
}

impl<S> std::fmt::Debug for LoginPipeline<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginPipeline")
            .field("portal", &self.portal)
            .field("login_timeout", &self.login_timeout)
            .finish_non_exhaustive()
    }
}

impl<S: CredentialStore + BindingStore> LoginPipeline<S> {
    pub fn new(
        store: Arc<S>,
        runner: Arc<dyn LoginRunner>,
        weights: WeightController,
        hub: LogHub,
        portal: PortalOptions,
    ) -> Self {
        Self {
            selector: CredentialSelector::new(Arc::clone(&store)),
            store,
            runner,
            weights,
            hub,
            portal,
            login_timeout: LOGIN_TIMEOUT,
        }
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn selector(&self) -> &CredentialSelector<S> {
        &self.selector
    }

    pub fn weights(&self) -> &WeightController {
        &self.weights
    }

    pub async fn login_for_iface(&self, wan_iface: &str) -> LoginOutcome {
        self.hub.publish(format!("starting login of a new account on {wan_iface}"));

        let nic = match self.store.get_binding(wan_iface).await {
            Ok(Some(nic)) if !nic.is_empty() => nic,
            Ok(_) => {
                self.hub.publish(format!("no NIC bound to {wan_iface}; bind one in settings first"));
                return LoginOutcome::NoBinding;
            }
            Err(e) => {
                self.hub.publish(format!("reading NIC binding for {wan_iface} failed: {e}"));
                return LoginOutcome::Store(e);
            }
        };

        let credential = match self.selector.claim_next().await {
            Ok(Claim::Claimed(c)) => c,
            Ok(Claim::Exhausted) => {
                self.hub.publish("no account available");
                return LoginOutcome::NoCredential;
            }
            Ok(Claim::Contended) => {
                self.hub.publish("accounts are busy with other logins; try again");
                return LoginOutcome::Contended;
            }
            Err(e) => {
                self.hub.publish(format!("selecting an account failed: {e}"));
                return LoginOutcome::Store(e);
            }
        };
        let id = credential.id;
        info!(%wan_iface, %nic, credential_id = id, username = %credential.username, "logging in");

        let req = LoginRequest {
            nic: &nic,
            username: &credential.username,
            secret: &credential.secret,
            portal: &self.portal,
        };
        if let Err(error) = self.runner.login(&req, self.login_timeout).await {
            self.set_state(id, CredentialState::Retrying).await;
            self.hub.publish(format!("login on {wan_iface} failed: {error}"));
            return LoginOutcome::LoginFailed { credential_id: id, error };
        }

        self.set_state(id, CredentialState::Online).await;
        if let Err(e) = self.store.mark_used_now(id).await {
            warn!(credential_id = id, error = %e, "failed to stamp last_used_at");
        }
        self.hub.publish(format!("login on {wan_iface} succeeded"));

        let weight = weights::from_bandwidth(credential.bandwidth);
        self.hub.publish(format!("setting {wan_iface} weight to {weight} and restarting mwan3"));
        match self.weights.apply_weight(wan_iface, weight).await {
            Ok(()) => {
                self.hub.publish("mwan3 restarted with the new weight");
                LoginOutcome::Applied { credential_id: id, weight }
            }
            Err(error) => {
                self.hub.publish(format!("applying mwan3 weight failed: {error}"));
                LoginOutcome::WeightFailed { credential_id: id, weight, error }
            }
        }
    }

    async fn set_state(&self, id: i64, state: CredentialState) {
        if let Err(e) = self.store.update_credential_state(id, state).await {
            warn!(credential_id = id, %state, error = %e, "failed to update credential state");
        }
    }
}

#[async_trait]
impl<S: CredentialStore + BindingStore> Trigger for LoginPipeline<S> {
    async fn fire(&self, wan_iface: &str) {
        let outcome = self.login_for_iface(wan_iface).await;
        info!(%wan_iface, logged_in = outcome.logged_in(), "failover trigger finished");
    }
}
