//! ScyllaDB schema creation (§4.5)

use scylla::Session;

use crate::error::PersistenceError;

/// Fallback item TTL for the `conversations` table when no config value
/// is supplied: 30 days (§6 `conversation.itemTtlDays`).
pub const DEFAULT_CONVERSATION_TTL_DAYS: u32 = 30;

/// Fallback TTL for the `connections` table: 24 hours (§6
/// `connection.ttlSeconds`).
pub const DEFAULT_CONNECTION_TTL_SECONDS: i64 = 86_400;

pub async fn create_keyspace(session: &Session, keyspace: &str, replication_factor: u8) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create keyspace: {e}")))?;

    Ok(())
}

/// Create the `connections` and `conversations` tables, honoring the
/// `connection.ttlSeconds` / `conversation.itemTtlDays` config options (§6).
pub async fn create_tables(
    session: &Session,
    keyspace: &str,
    connection_ttl_seconds: i64,
    conversation_item_ttl_days: u32,
) -> Result<(), PersistenceError> {
    let connections_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.connections (
            connection_id TEXT,
            status TEXT,
            connected_at TIMESTAMP,
            last_activity TIMESTAMP,
            ttl TIMESTAMP,
            client_ip TEXT,
            user_agent TEXT,
            PRIMARY KEY (connection_id)
        ) WITH default_time_to_live = {connection_ttl_seconds}
    "#
    );

    session
        .query_unpaged(connections_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create connections table: {e}")))?;

    // §4.5 requires a GSI on (status, connectedAt); ScyllaDB's equivalent
    // is a materialized view partitioned by status and clustered by
    // connectedAt, used to list/health-sweep connections by status
    // without a full table scan.
    let connections_by_status_view = format!(
        r#"
        CREATE MATERIALIZED VIEW IF NOT EXISTS {keyspace}.connections_by_status AS
        SELECT * FROM {keyspace}.connections
        WHERE status IS NOT NULL AND connected_at IS NOT NULL AND connection_id IS NOT NULL
        PRIMARY KEY ((status), connected_at, connection_id)
        WITH CLUSTERING ORDER BY (connected_at DESC)
    "#
    );

    session
        .query_unpaged(connections_by_status_view, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create connections_by_status materialized view: {e}")))?;

    let conversation_ttl_seconds = i64::from(conversation_item_ttl_days) * 24 * 60 * 60;
    let conversations_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {keyspace}.conversations (
            conversation_id TEXT,
            item_timestamp TEXT,
            connection_id TEXT,
            created_at TIMESTAMP,
            payload_json TEXT,
            PRIMARY KEY ((conversation_id), item_timestamp)
        ) WITH CLUSTERING ORDER BY (item_timestamp ASC)
        AND default_time_to_live = {conversation_ttl_seconds}
    "#
    );

    session
        .query_unpaged(conversations_table, &[])
        .await
        .map_err(|e| PersistenceError::Schema(format!("failed to create conversations table: {e}")))?;

    tracing::info!("connections and conversations tables ensured");
    Ok(())
}
