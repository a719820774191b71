//! Connection records owned exclusively by the Connection Manager (§4.1)

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Default TTL extension applied on register/touch: 24 hours.
pub const DEFAULT_TTL_SECONDS: i64 = 86_400;

/// Inactivity threshold used by `isHealthy`: 5 minutes.
pub const DEFAULT_HEALTH_WINDOW_SECONDS: i64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// A single live-connection record. `DISCONNECTED` never appears in
/// storage — its absence from the store *is* the disconnected state; this
/// variant exists only so in-memory call sites can represent "about to be
/// removed" without a second map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: String,
    pub status: ConnectionStatus,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ttl: DateTime<Utc>,
    pub client_ip: Option<String>,
    pub user_agent: Option<String>,
}

impl ConnectionRecord {
    pub fn new(connection_id: impl Into<String>, client_ip: Option<String>, user_agent: Option<String>) -> Self {
        Self::with_ttl(connection_id, client_ip, user_agent, DEFAULT_TTL_SECONDS)
    }

    /// Same as [`Self::new`] but with an explicit TTL extension, so
    /// callers can honor the `connection.ttlSeconds` config option (§6)
    /// instead of always taking the 24h default.
    pub fn with_ttl(connection_id: impl Into<String>, client_ip: Option<String>, user_agent: Option<String>, ttl_seconds: i64) -> Self {
        let now = Utc::now();
        Self {
            connection_id: connection_id.into(),
            status: ConnectionStatus::Connected,
            connected_at: now,
            last_activity: now,
            ttl: now + Duration::seconds(ttl_seconds),
            client_ip,
            user_agent,
        }
    }

    /// Apply a `touch`: refresh `last_activity` and extend the TTL.
    pub fn touch(&mut self) {
        self.touch_with_ttl(DEFAULT_TTL_SECONDS);
    }

    pub fn touch_with_ttl(&mut self, ttl_seconds: i64) {
        let now = Utc::now();
        self.last_activity = now;
        self.ttl = now + Duration::seconds(ttl_seconds);
    }

    pub fn is_healthy(&self, now: DateTime<Utc>) -> bool {
        self.is_healthy_within(now, DEFAULT_HEALTH_WINDOW_SECONDS)
    }

    pub fn is_healthy_within(&self, now: DateTime<Utc>, health_window_seconds: i64) -> bool {
        (now - self.last_activity) < Duration::seconds(health_window_seconds)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_record_is_healthy() {
        let record = ConnectionRecord::new("conn-1", None, None);
        assert!(record.is_healthy(Utc::now()));
        assert_eq!(record.last_activity, record.connected_at);
    }

    #[test]
    fn touch_extends_ttl() {
        let mut record = ConnectionRecord::new("conn-1", None, None);
        let original_ttl = record.ttl;
        record.ttl = Utc::now() - Duration::seconds(1);
        record.touch();
        assert!(record.ttl > original_ttl - Duration::seconds(1));
        assert!(!record.is_expired(Utc::now()));
    }

    #[test]
    fn unhealthy_after_inactivity_window() {
        let mut record = ConnectionRecord::new("conn-1", None, None);
        record.last_activity = Utc::now() - Duration::seconds(DEFAULT_HEALTH_WINDOW_SECONDS + 1);
        assert!(!record.is_healthy(Utc::now()));
    }
}
