//! Record store for credentials and interface bindings.
//!
//! Each concern is a trait ([`CredentialStore`], [`BindingStore`]) so the
//! pipeline never names a database.  The default implementation is
//! [`SqliteStore`]; to move to another database implement both traits for
//! your new type.
//!
//! Trait methods use `impl Future` in their signatures, so callers are generic
//! over the store rather than holding trait objects.

pub mod binding;
pub mod credential;

pub use binding::BindingStore;
pub use credential::{
    BandwidthClass, Credential, CredentialState, CredentialStore, NewCredential, UnknownBandwidth,
};

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqlitePoolOptions};
use sqlx::{Connection, SqlitePool};

/// Rows copied by [`SqliteStore::restore_from`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestoreCounts {
    pub credentials: u64,
    pub bindings: u64,
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the SQLite database at `url` and run pending migrations.
    ///
    /// `url` should be a sqlx-compatible SQLite URL, e.g. `"sqlite://netmanager.db"`
    /// or `"sqlite::memory:"` for tests.  An in-memory database is pinned to a
    /// single connection so every query sees the same data.
    pub async fn connect(url: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool_options = if url.contains(":memory:") {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(4)
        };
        let pool = pool_options.connect_with(options).await?;
        // Path is resolved relative to CARGO_MANIFEST_DIR at compile time.
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self { pool })
    }

    /// Write a consistent copy of the database to `path` (which must not exist).
    pub async fn snapshot_to(&self, path: &Path) -> Result<(), sqlx::Error> {
        sqlx::query("VACUUM INTO ?1")
            .bind(path.to_string_lossy().into_owned())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Replace every credential and binding with the rows of the database file
    /// at `path`, typically one produced by [`snapshot_to`](Self::snapshot_to).
    ///
    /// The file is attached to one pooled connection and copied in a single
    /// transaction; on any error the live tables are left untouched.
    pub async fn restore_from(&self, path: &Path) -> Result<RestoreCounts, sqlx::Error> {
        let mut conn = self.pool.acquire().await?;
        // ATTACH is refused inside a transaction.
        sqlx::query("ATTACH DATABASE ?1 AS upload")
            .bind(path.to_string_lossy().into_owned())
            .execute(&mut *conn)
            .await?;
        let copied = copy_from_upload(&mut conn).await;
        let detached = sqlx::query("DETACH DATABASE upload").execute(&mut *conn).await;
        let counts = copied?;
        detached?;
        Ok(counts)
    }
}

async fn copy_from_upload(conn: &mut SqliteConnection) -> Result<RestoreCounts, sqlx::Error> {
    let mut tx = conn.begin().await?;
    sqlx::query("DELETE FROM main.accounts").execute(&mut *tx).await?;
    let credentials = sqlx::query(
        "INSERT INTO main.accounts \
             (id, username, password, bandwidth, status, last_used_at, disabled) \
         SELECT id, username, password, bandwidth, status, last_used_at, disabled \
         FROM upload.accounts",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();
    sqlx::query("DELETE FROM main.iface_map").execute(&mut *tx).await?;
    let bindings = sqlx::query(
        "INSERT INTO main.iface_map (id, wan_iface, nic_name) \
         SELECT id, wan_iface, nic_name FROM upload.iface_map",
    )
    .execute(&mut *tx)
    .await?
    .rows_affected();
    tx.commit().await?;
    Ok(RestoreCounts { credentials, bindings })
}
