//! Choosing which credential logs in next.
//!
//! Ordering, most preferred first:
//! 1. higher bandwidth class;
//! 2. never used (`last_used_at == 0`) before used;
//! 3. older `last_used_at` before newer;
//! 4. lower id (keeps the order total).

use std::cmp::Reverse;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::entities::{Credential, CredentialState, CredentialStore};

/// How often [`CredentialSelector::claim_next`] re-selects after losing a race.
const CLAIM_ATTEMPTS: usize = 8;

fn is_eligible(c: &Credential) -> bool {
    !c.disabled && c.state != CredentialState::Failed
}

fn rank(c: &Credential) -> (Reverse<i64>, bool, i64, i64) {
    (Reverse(c.bandwidth.mbps()), c.last_used_at != 0, c.last_used_at, c.id)
}

/// Highest-ranked eligible credential in `credentials`.
pub fn best_candidate<'a, I>(credentials: I) -> Option<&'a Credential>
where
    I: IntoIterator<Item = &'a Credential>,
{
    credentials.into_iter().filter(|c| is_eligible(c)).min_by_key(|c| rank(c))
}

/// Result of [`CredentialSelector::claim_next`].
#[derive(Debug)]
pub enum Claim {
    /// The credential is now CONNECTING and owned by the caller.
    Claimed(Credential),
    /// No credential is eligible.
    Exhausted,
    /// Eligible credentials exist but every attempt lost to a concurrent claim.
    Contended,
}

impl Claim {
    pub fn credential(self) -> Option<Credential> {
        match self {
            Claim::Claimed(c) => Some(c),
            Claim::Exhausted | Claim::Contended => None,
        }
    }
}

#[derive(Debug)]
pub struct CredentialSelector<S> {
    store: Arc<S>,
}

impl<S> Clone for CredentialSelector<S> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store) }
    }
}

impl<S: CredentialStore> CredentialSelector<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// The credential that would be used next, without claiming it.
    ///
    /// `Ok(None)` means no credential is eligible; it is not an error.
    pub async fn next_candidate(&self) -> Result<Option<Credential>, sqlx::Error> {
        let all = self.store.list_credentials().await?;
        Ok(best_candidate(&all).cloned())
    }

    /// Select and atomically mark the next credential CONNECTING.
    ///
    /// Credentials already CONNECTING are skipped so two concurrent logins
    /// never share one.  The state change is a compare-and-set keyed on the
    /// state observed during selection; a lost race re-runs the selection, up
    /// to a fixed number of attempts before reporting [`Claim::Contended`].
    pub async fn claim_next(&self) -> Result<Claim, sqlx::Error> {
        for attempt in 0..CLAIM_ATTEMPTS {
            let all = self.store.list_credentials().await?;
            let Some(candidate) = best_candidate(
                all.iter().filter(|c| c.state != CredentialState::Connecting),
            ) else {
                return Ok(Claim::Exhausted);
            };

            let claimed = self
                .store
                .compare_and_set_state(candidate.id, candidate.state, CredentialState::Connecting)
                .await?;
            if claimed {
                let mut c = candidate.clone();
                c.state = CredentialState::Connecting;
                debug!(id = c.id, username = %c.username, "credential claimed");
                return Ok(Claim::Claimed(c));
            }
            debug!(id = candidate.id, attempt, "credential claimed concurrently; reselecting");
        }
        warn!(attempts = CLAIM_ATTEMPTS, "lost every credential claim race");
        Ok(Claim::Contended)
    }

    /// Release credentials a previous process left CONNECTING.
    pub async fn release_stale_claims(&self) -> Result<u64, sqlx::Error> {
        let n = self
            .store
            .reset_credential_states(CredentialState::Connecting, CredentialState::Retrying)
            .await?;
        if n > 0 {
            info!(count = n, "released credentials left connecting by a previous run");
        }
        Ok(n)
    }
}
