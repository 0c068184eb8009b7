use std::collections::HashMap;
use std::future::Future;

use super::SqliteStore;

/// Administrator-declared mapping from an `mwan3` interface to a host NIC.
pub trait BindingStore: Send + Sync + 'static {
    fn get_binding(
        &self,
        wan_iface: &str,
    ) -> impl Future<Output = Result<Option<String>, sqlx::Error>> + Send;

    /// Insert or replace the NIC bound to `wan_iface`.
    fn upsert_binding(
        &self,
        wan_iface: &str,
        nic: &str,
    ) -> impl Future<Output = Result<(), sqlx::Error>> + Send;

    fn all_bindings(&self) -> impl Future<Output = Result<HashMap<String, String>, sqlx::Error>> + Send;
}

impl BindingStore for SqliteStore {
    async fn get_binding(&self, wan_iface: &str) -> Result<Option<String>, sqlx::Error> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT nic_name FROM iface_map WHERE wan_iface = ?1")
                .bind(wan_iface)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(nic,)| nic))
    }

    async fn upsert_binding(&self, wan_iface: &str, nic: &str) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT INTO iface_map (wan_iface, nic_name) VALUES (?1, ?2) \
             ON CONFLICT(wan_iface) DO UPDATE SET nic_name = excluded.nic_name",
        )
        .bind(wan_iface)
        .bind(nic)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn all_bindings(&self) -> Result<HashMap<String, String>, sqlx::Error> {
        let rows: Vec<(String, String)> =
            sqlx::query_as("SELECT wan_iface, nic_name FROM iface_map")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().collect())
    }
}
