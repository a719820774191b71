//! Connection Manager (§4.1)
//!
//! Tracks live connections, registers on connect, removes on disconnect,
//! refreshes `lastActivity`/`ttl` on every inbound frame, and exposes the
//! health predicate used by operational tooling. Grounded on the
//! teacher's `SessionManager::start_cleanup_task` (interval + `watch`
//! shutdown channel) in `server/src/session.rs`; repurposed here to
//! sweep TTL-expired connection records rather than idle agent sessions,
//! since the store itself (not an in-process map) owns connection state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};
use vts_gateway_core::ConnectionRecord;
use vts_gateway_persistence::ConnectionStore;

/// How often the background sweep checks for TTL-expired records.
const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct ConnectionManager {
    store: Arc<dyn ConnectionStore>,
    ttl_seconds: i64,
    health_window_seconds: i64,
}

impl ConnectionManager {
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self::with_config(store, vts_gateway_core::connection::DEFAULT_TTL_SECONDS, vts_gateway_core::connection::DEFAULT_HEALTH_WINDOW_SECONDS)
    }

    /// Honors the `connection.ttlSeconds` / `connection.inactivityHealthSeconds`
    /// config options (§6) instead of the compiled-in defaults.
    pub fn with_config(store: Arc<dyn ConnectionStore>, ttl_seconds: i64, health_window_seconds: i64) -> Self {
        Self { store, ttl_seconds, health_window_seconds }
    }

    /// Register a new connection. Storage failures here are fatal to the
    /// connect handshake (§4.1 Failure semantics) and propagate to the
    /// caller, who must refuse the upgrade.
    pub async fn register(
        &self,
        connection_id: &str,
        client_ip: Option<String>,
        user_agent: Option<String>,
    ) -> Result<ConnectionRecord, vts_gateway_persistence::PersistenceError> {
        let record = ConnectionRecord::with_ttl(connection_id, client_ip, user_agent, self.ttl_seconds);
        self.store.put(&record).await?;
        Ok(record)
    }

    /// Remove a connection record. Never propagates failure: the
    /// transport already considers the connection gone (§4.1).
    pub async fn remove(&self, connection_id: &str) {
        if let Err(err) = self.store.delete(connection_id).await {
            warn!(connection_id, error = %err, "failed to remove connection record");
        }
    }

    /// Refresh `lastActivity`/`ttl`. Called on every inbound frame.
    /// Failures are logged and swallowed; an unrefreshed record simply
    /// expires via TTL (§4.1).
    pub async fn touch(&self, connection_id: &str) {
        let now = Utc::now();
        let ttl = now + chrono::Duration::seconds(self.ttl_seconds);
        if let Err(err) = self.store.touch(connection_id, now, ttl).await {
            warn!(connection_id, error = %err, "failed to refresh connection activity");
        }
    }

    pub async fn get(&self, connection_id: &str) -> Option<ConnectionRecord> {
        self.store.get(connection_id).await.unwrap_or_else(|err| {
            warn!(connection_id, error = %err, "failed to read connection record");
            None
        })
    }

    /// True iff a record exists and its `lastActivity` is within the
    /// inactivity window (§4.1, default 5 minutes).
    pub async fn is_healthy(&self, connection_id: &str) -> bool {
        match self.get(connection_id).await {
            Some(record) => record.is_healthy_within(Utc::now(), self.health_window_seconds),
            None => false,
        }
    }

    /// Start a background task that periodically removes TTL-expired
    /// records, for backends where the store has no native TTL sweep
    /// (the in-memory adapter; ScyllaDB enforces TTL server-side).
    /// Returns a shutdown sender mirroring `SessionManager`'s pattern.
    pub fn start_health_sweep(self: &Arc<Self>) -> watch::Sender<bool> {
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let manager = Arc::clone(self);

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(SWEEP_INTERVAL);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        manager.sweep_expired().await;
                    }
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("connection health sweep shutting down");
                            break;
                        }
                    }
                }
            }
        });

        shutdown_tx
    }

    async fn sweep_expired(&self) {
        let expired = match self.store.list_expired(Utc::now()).await {
            Ok(ids) => ids,
            Err(err) => {
                warn!(error = %err, "connection health sweep failed to list expired records");
                return;
            }
        };
        if expired.is_empty() {
            return;
        }
        for connection_id in &expired {
            self.remove(connection_id).await;
        }
        info!(count = expired.len(), "connection health sweep removed expired records");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vts_gateway_persistence::InMemoryConnectionStore;

    #[tokio::test]
    async fn register_then_get_round_trips() {
        let manager = ConnectionManager::new(Arc::new(InMemoryConnectionStore::new()));
        manager.register("conn-1", Some("1.2.3.4".to_string()), None).await.unwrap();

        let record = manager.get("conn-1").await.unwrap();
        assert_eq!(record.connection_id, "conn-1");
        assert!(manager.is_healthy("conn-1").await);
    }

    #[tokio::test]
    async fn remove_of_absent_connection_does_not_panic() {
        let manager = ConnectionManager::new(Arc::new(InMemoryConnectionStore::new()));
        manager.remove("nope").await;
        assert!(manager.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn unregistered_connection_is_unhealthy() {
        let manager = ConnectionManager::new(Arc::new(InMemoryConnectionStore::new()));
        assert!(!manager.is_healthy("nope").await);
    }

    #[tokio::test]
    async fn touch_keeps_connection_healthy() {
        let manager = ConnectionManager::new(Arc::new(InMemoryConnectionStore::new()));
        manager.register("conn-1", None, None).await.unwrap();
        manager.touch("conn-1").await;
        assert!(manager.is_healthy("conn-1").await);
    }

    #[tokio::test]
    async fn custom_health_window_is_honored() {
        let manager = ConnectionManager::with_config(Arc::new(InMemoryConnectionStore::new()), 86_400, 0);
        manager.register("conn-1", None, None).await.unwrap();
        // With a zero-second health window, even a just-registered
        // connection is already outside it.
        assert!(!manager.is_healthy("conn-1").await);
    }
}
