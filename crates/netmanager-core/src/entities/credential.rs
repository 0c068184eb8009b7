use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::SqliteStore;

/// Contracted line speed of a campus account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub enum BandwidthClass {
    Mbps20,
    Mbps50,
    Mbps100,
    Mbps200,
}

#[derive(Debug, Error)]
#[error("unknown bandwidth class {0} (expected 20, 50, 100 or 200)")]
pub struct UnknownBandwidth(pub i64);

impl BandwidthClass {
    pub fn mbps(self) -> i64 {
        match self {
            BandwidthClass::Mbps20 => 20,
            BandwidthClass::Mbps50 => 50,
            BandwidthClass::Mbps100 => 100,
            BandwidthClass::Mbps200 => 200,
        }
    }
}

impl TryFrom<i64> for BandwidthClass {
    type Error = UnknownBandwidth;

    fn try_from(v: i64) -> Result<Self, Self::Error> {
        match v {
            20 => Ok(BandwidthClass::Mbps20),
            50 => Ok(BandwidthClass::Mbps50),
            100 => Ok(BandwidthClass::Mbps100),
            200 => Ok(BandwidthClass::Mbps200),
            other => Err(UnknownBandwidth(other)),
        }
    }
}

impl From<BandwidthClass> for i64 {
    fn from(b: BandwidthClass) -> Self {
        b.mbps()
    }
}

/// Login state of a credential, stored by its upper-case name.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CredentialState {
    Idle,
    Connecting,
    Online,
    Retrying,
    Failed,
    Disabled,
}

/// A row in the `accounts` table.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub id: i64,
    pub username: String,
    pub secret: String,
    pub bandwidth: BandwidthClass,
    pub state: CredentialState,
    /// Unix seconds of the last successful login; `0` if never used.
    pub last_used_at: i64,
    pub disabled: bool,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("secret", &"***")
            .field("bandwidth", &self.bandwidth)
            .field("state", &self.state)
            .field("last_used_at", &self.last_used_at)
            .field("disabled", &self.disabled)
            .finish()
    }
}

#[derive(Clone)]
pub struct NewCredential {
    pub username: String,
    pub secret: String,
    pub bandwidth: BandwidthClass,
}

pub trait CredentialStore: Send + Sync + 'static {
    /// All credentials ordered by id.
    fn list_credentials(&self) -> impl Future<Output = Result<Vec<Credential>, sqlx::Error>> + Send;

    /// Insert an IDLE, never-used credential and return its id.
    fn insert_credential(
        &self,
        new: NewCredential,
    ) -> impl Future<Output = Result<i64, sqlx::Error>> + Send;

    fn update_credential_state(
        &self,
        id: i64,
        state: CredentialState,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Move `id` from `expected` to `new`; `false` if the state had changed.
    fn compare_and_set_state(
        &self,
        id: i64,
        expected: CredentialState,
        new: CredentialState,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// Stamp `last_used_at` with the current time.
    fn mark_used_now(&self, id: i64) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    /// Move every credential in state `from` to `to`; returns rows changed.
    fn reset_credential_states(
        &self,
        from: CredentialState,
        to: CredentialState,
    ) -> impl Future<Output = Result<u64, sqlx::Error>> + Send;
}

type CredentialRow = (i64, String, String, i64, String, i64, i64);

fn from_row(
    (id, username, secret, bandwidth, status, last_used_at, disabled): CredentialRow,
) -> Result<Credential, sqlx::Error> {
    let bandwidth =
        BandwidthClass::try_from(bandwidth).map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    let state = status
        .parse::<CredentialState>()
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?;
    Ok(Credential {
        id,
        username,
        secret,
        bandwidth,
        state,
        last_used_at,
        disabled: disabled != 0,
    })
}

impl CredentialStore for SqliteStore {
    async fn list_credentials(&self) -> Result<Vec<Credential>, sqlx::Error> {
        let rows: Vec<CredentialRow> = sqlx::query_as(
            "SELECT id, username, password, bandwidth, status, last_used_at, disabled \
             FROM accounts ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(from_row).collect()
    }

    async fn insert_credential(&self, new: NewCredential) -> Result<i64, sqlx::Error> {
        let result = sqlx::query(
            "INSERT INTO accounts (username, password, bandwidth, status, last_used_at, disabled) \
             VALUES (?1, ?2, ?3, ?4, 0, 0)",
        )
        .bind(&new.username)
        .bind(&new.secret)
        .bind(new.bandwidth.mbps())
        .bind(CredentialState::Idle.as_ref())
        .execute(&self.pool)
        .await?;
        Ok(result.last_insert_rowid())
    }

    async fn update_credential_state(
        &self,
        id: i64,
        state: CredentialState,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE accounts SET status = ?1 WHERE id = ?2")
            .bind(state.as_ref())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn compare_and_set_state(
        &self,
        id: i64,
        expected: CredentialState,
        new: CredentialState,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE accounts SET status = ?1 WHERE id = ?2 AND status = ?3")
            .bind(new.as_ref())
            .bind(id)
            .bind(expected.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn mark_used_now(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE accounts SET last_used_at = ?1 WHERE id = ?2")
            .bind(chrono::Utc::now().timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn reset_credential_states(
        &self,
        from: CredentialState,
        to: CredentialState,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE accounts SET status = ?1 WHERE status = ?2")
            .bind(to.as_ref())
            .bind(from.as_ref())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
impl SqliteStore {
    /// Force row contents the public API cannot produce directly.
    pub(crate) async fn set_credential_fields(
        &self,
        id: i64,
        last_used_at: i64,
        disabled: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE accounts SET last_used_at = ?1, disabled = ?2 WHERE id = ?3")
            .bind(last_used_at)
            .bind(disabled as i64)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
