//! `connections` table adapter (§4.5)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use vts_gateway_core::{ConnectionRecord, ConnectionStatus};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[async_trait]
pub trait ConnectionStore: Send + Sync {
    async fn put(&self, record: &ConnectionRecord) -> Result<(), PersistenceError>;
    async fn get(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, PersistenceError>;
    async fn delete(&self, connection_id: &str) -> Result<(), PersistenceError>;
    async fn touch(&self, connection_id: &str, last_activity: DateTime<Utc>, ttl: DateTime<Utc>) -> Result<(), PersistenceError>;
    /// List connection ids whose `ttl` has already passed `now`. ScyllaDB
    /// enforces TTL server-side (records vanish on their own); this is
    /// used by the in-memory adapter's health-sweep task, and by Scylla
    /// only for visibility/metrics since its rows are already gone.
    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaConnectionStore {
    client: ScyllaClient,
}

impl ScyllaConnectionStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn row_to_record(&self, row: scylla::frame::response::result::Row) -> Result<ConnectionRecord, PersistenceError> {
        let (connection_id, status, connected_at, last_activity, ttl, client_ip, user_agent): (
            String,
            String,
            i64,
            i64,
            i64,
            Option<String>,
            Option<String>,
        ) = row.into_typed().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(ConnectionRecord {
            connection_id,
            status: if status == "CONNECTED" { ConnectionStatus::Connected } else { ConnectionStatus::Disconnected },
            connected_at: DateTime::from_timestamp_millis(connected_at).unwrap_or_else(Utc::now),
            last_activity: DateTime::from_timestamp_millis(last_activity).unwrap_or_else(Utc::now),
            ttl: DateTime::from_timestamp_millis(ttl).unwrap_or_else(Utc::now),
            client_ip,
            user_agent,
        })
    }
}

#[async_trait]
impl ConnectionStore for ScyllaConnectionStore {
    async fn put(&self, record: &ConnectionRecord) -> Result<(), PersistenceError> {
        let query = format!(
            "INSERT INTO {}.connections (connection_id, status, connected_at, last_activity, ttl, client_ip, user_agent)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &record.connection_id,
                    "CONNECTED",
                    record.connected_at.timestamp_millis(),
                    record.last_activity.timestamp_millis(),
                    record.ttl.timestamp_millis(),
                    &record.client_ip,
                    &record.user_agent,
                ),
            )
            .await?;

        Ok(())
    }

    async fn get(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, PersistenceError> {
        let query = format!(
            "SELECT connection_id, status, connected_at, last_activity, ttl, client_ip, user_agent
             FROM {}.connections WHERE connection_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (connection_id,)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(self.row_to_record(row)?));
            }
        }
        Ok(None)
    }

    async fn delete(&self, connection_id: &str) -> Result<(), PersistenceError> {
        let query = format!("DELETE FROM {}.connections WHERE connection_id = ?", self.client.keyspace());
        self.client.session().query_unpaged(query, (connection_id,)).await?;
        Ok(())
    }

    async fn touch(&self, connection_id: &str, last_activity: DateTime<Utc>, ttl: DateTime<Utc>) -> Result<(), PersistenceError> {
        let query = format!(
            "UPDATE {}.connections SET last_activity = ?, ttl = ? WHERE connection_id = ?",
            self.client.keyspace()
        );
        self.client
            .session()
            .query_unpaged(query, (last_activity.timestamp_millis(), ttl.timestamp_millis(), connection_id))
            .await?;
        Ok(())
    }

    async fn list_expired(&self, _now: DateTime<Utc>) -> Result<Vec<String>, PersistenceError> {
        // ScyllaDB's `default_time_to_live` already removes expired rows
        // server-side; there is nothing left here to sweep.
        Ok(Vec::new())
    }
}

/// In-memory adapter for local development and tests, mirroring the
/// dual in-memory/distributed store split the session manager uses.
#[derive(Default)]
pub struct InMemoryConnectionStore {
    records: RwLock<HashMap<String, ConnectionRecord>>,
}

impl InMemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn put(&self, record: &ConnectionRecord) -> Result<(), PersistenceError> {
        self.records.write().insert(record.connection_id.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, connection_id: &str) -> Result<Option<ConnectionRecord>, PersistenceError> {
        Ok(self.records.read().get(connection_id).cloned())
    }

    async fn delete(&self, connection_id: &str) -> Result<(), PersistenceError> {
        self.records.write().remove(connection_id);
        Ok(())
    }

    async fn touch(&self, connection_id: &str, last_activity: DateTime<Utc>, ttl: DateTime<Utc>) -> Result<(), PersistenceError> {
        if let Some(record) = self.records.write().get_mut(connection_id) {
            record.last_activity = last_activity;
            record.ttl = ttl;
        }
        Ok(())
    }

    async fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<String>, PersistenceError> {
        Ok(self
            .records
            .read()
            .values()
            .filter(|record| record.is_expired(now))
            .map(|record| record.connection_id.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryConnectionStore::new();
        let record = ConnectionRecord::new("conn-1", Some("1.2.3.4".to_string()), None);
        store.put(&record).await.unwrap();

        let fetched = store.get("conn-1").await.unwrap().unwrap();
        assert_eq!(fetched.connection_id, "conn-1");
        assert_eq!(fetched.client_ip.as_deref(), Some("1.2.3.4"));
    }

    #[tokio::test]
    async fn delete_of_absent_record_does_not_error() {
        let store = InMemoryConnectionStore::new();
        store.delete("nope").await.unwrap();
    }

    #[tokio::test]
    async fn touch_updates_last_activity_and_ttl() {
        let store = InMemoryConnectionStore::new();
        let record = ConnectionRecord::new("conn-1", None, None);
        store.put(&record).await.unwrap();

        let new_activity = Utc::now() + chrono::Duration::seconds(10);
        let new_ttl = new_activity + chrono::Duration::seconds(86_400);
        store.touch("conn-1", new_activity, new_ttl).await.unwrap();

        let fetched = store.get("conn-1").await.unwrap().unwrap();
        assert_eq!(fetched.last_activity, new_activity);
        assert_eq!(fetched.ttl, new_ttl);
    }
}
