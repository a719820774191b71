//! ScyllaDB persistence layer for the VTS voice gateway
//!
//! Provides persistent storage for:
//! - Connections (§4.1, `connections` table)
//! - Conversation items (§4.5, `conversations` table)

pub mod client;
pub mod connections;
pub mod conversations;
pub mod error;
pub mod schema;

pub use client::{ScyllaClient, ScyllaConfig};
pub use connections::{ConnectionStore, InMemoryConnectionStore, ScyllaConnectionStore};
pub use conversations::{ConversationStore, InMemoryConversationStore, ScyllaConversationStore};
pub use error::PersistenceError;

/// Initialize ScyllaDB-backed persistence: connect, ensure schema, build
/// both table adapters.
pub async fn init(config: ScyllaConfig) -> Result<PersistenceLayer, PersistenceError> {
    let client = ScyllaClient::connect(config).await?;
    client.ensure_schema().await?;

    Ok(PersistenceLayer {
        connections: std::sync::Arc::new(ScyllaConnectionStore::new(client.clone())),
        conversations: std::sync::Arc::new(ScyllaConversationStore::new(client)),
    })
}

/// In-memory persistence for local development and tests.
pub fn init_in_memory() -> PersistenceLayer {
    PersistenceLayer {
        connections: std::sync::Arc::new(InMemoryConnectionStore::new()),
        conversations: std::sync::Arc::new(InMemoryConversationStore::new()),
    }
}

/// Combined persistence layer wired to the composition root.
pub struct PersistenceLayer {
    pub connections: std::sync::Arc<dyn ConnectionStore>,
    pub conversations: std::sync::Arc<dyn ConversationStore>,
}
