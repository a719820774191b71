//! `conversations` table adapter (§4.5)
//!
//! Items sort by `itemTimestamp` lexicographically: prefix-then-time,
//! never globally chronological (§4.5).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use vts_gateway_core::{ConversationItem, ItemPayload};

use crate::client::ScyllaClient;
use crate::error::PersistenceError;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn put_item(&self, item: &ConversationItem) -> Result<(), PersistenceError>;
    async fn get_item(&self, conversation_id: &str, item_timestamp: &str) -> Result<Option<ConversationItem>, PersistenceError>;
    async fn delete_item(&self, conversation_id: &str, item_timestamp: &str) -> Result<(), PersistenceError>;
    /// Full replace of an existing item — used, for example, to flip a
    /// `TRANSCRIPTION_SESSION` marker's status from ACTIVE to STOPPED.
    async fn update_item(&self, item: &ConversationItem) -> Result<(), PersistenceError>;
    async fn list_items(&self, conversation_id: &str) -> Result<Vec<ConversationItem>, PersistenceError>;
}

#[derive(Clone)]
pub struct ScyllaConversationStore {
    client: ScyllaClient,
}

impl ScyllaConversationStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn row_to_item(&self, row: scylla::frame::response::result::Row) -> Result<ConversationItem, PersistenceError> {
        let (conversation_id, item_timestamp, connection_id, created_at, payload_json): (String, String, String, i64, String) =
            row.into_typed().map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let payload: ItemPayload = serde_json::from_str(&payload_json).map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        Ok(ConversationItem {
            conversation_id,
            item_timestamp,
            connection_id,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            payload,
        })
    }
}

#[async_trait]
impl ConversationStore for ScyllaConversationStore {
    async fn put_item(&self, item: &ConversationItem) -> Result<(), PersistenceError> {
        let payload_json = serde_json::to_string(&item.payload).map_err(|e| PersistenceError::InvalidData(e.to_string()))?;

        let query = format!(
            "INSERT INTO {}.conversations (conversation_id, item_timestamp, connection_id, created_at, payload_json)
             VALUES (?, ?, ?, ?, ?)",
            self.client.keyspace()
        );

        self.client
            .session()
            .query_unpaged(
                query,
                (
                    &item.conversation_id,
                    &item.item_timestamp,
                    &item.connection_id,
                    item.created_at.timestamp_millis(),
                    payload_json,
                ),
            )
            .await?;

        Ok(())
    }

    async fn get_item(&self, conversation_id: &str, item_timestamp: &str) -> Result<Option<ConversationItem>, PersistenceError> {
        let query = format!(
            "SELECT conversation_id, item_timestamp, connection_id, created_at, payload_json
             FROM {}.conversations WHERE conversation_id = ? AND item_timestamp = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (conversation_id, item_timestamp)).await?;

        if let Some(rows) = result.rows {
            if let Some(row) = rows.into_iter().next() {
                return Ok(Some(self.row_to_item(row)?));
            }
        }
        Ok(None)
    }

    async fn delete_item(&self, conversation_id: &str, item_timestamp: &str) -> Result<(), PersistenceError> {
        let query = format!(
            "DELETE FROM {}.conversations WHERE conversation_id = ? AND item_timestamp = ?",
            self.client.keyspace()
        );
        self.client.session().query_unpaged(query, (conversation_id, item_timestamp)).await?;
        Ok(())
    }

    async fn update_item(&self, item: &ConversationItem) -> Result<(), PersistenceError> {
        self.put_item(item).await
    }

    async fn list_items(&self, conversation_id: &str) -> Result<Vec<ConversationItem>, PersistenceError> {
        let query = format!(
            "SELECT conversation_id, item_timestamp, connection_id, created_at, payload_json
             FROM {}.conversations WHERE conversation_id = ?",
            self.client.keyspace()
        );

        let result = self.client.session().query_unpaged(query, (conversation_id,)).await?;

        let mut items = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                items.push(self.row_to_item(row)?);
            }
        }
        Ok(items)
    }
}

/// In-memory adapter, keyed by `(conversationId, itemTimestamp)`, with a
/// `BTreeMap` sort key so `list_items` preserves the prefix-then-time
/// order without needing a separate index.
#[derive(Default)]
pub struct InMemoryConversationStore {
    items: RwLock<BTreeMap<(String, String), ConversationItem>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn put_item(&self, item: &ConversationItem) -> Result<(), PersistenceError> {
        self.items
            .write()
            .insert((item.conversation_id.clone(), item.item_timestamp.clone()), item.clone());
        Ok(())
    }

    async fn get_item(&self, conversation_id: &str, item_timestamp: &str) -> Result<Option<ConversationItem>, PersistenceError> {
        Ok(self.items.read().get(&(conversation_id.to_string(), item_timestamp.to_string())).cloned())
    }

    async fn delete_item(&self, conversation_id: &str, item_timestamp: &str) -> Result<(), PersistenceError> {
        self.items.write().remove(&(conversation_id.to_string(), item_timestamp.to_string()));
        Ok(())
    }

    async fn update_item(&self, item: &ConversationItem) -> Result<(), PersistenceError> {
        self.put_item(item).await
    }

    async fn list_items(&self, conversation_id: &str) -> Result<Vec<ConversationItem>, PersistenceError> {
        Ok(self
            .items
            .read()
            .range((conversation_id.to_string(), String::new())..(conversation_id.to_string(), String::from('\u{10FFFF}')))
            .map(|(_, item)| item.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vts_gateway_core::AnalysisResult;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryConversationStore::new();
        let item = ConversationItem::message("conn-1", "m1", "hello", None);
        store.put_item(&item).await.unwrap();

        let fetched = store.get_item(&item.conversation_id, &item.item_timestamp).await.unwrap().unwrap();
        assert_eq!(fetched.conversation_id, item.conversation_id);
    }

    #[tokio::test]
    async fn list_items_orders_prefix_then_time() {
        let store = InMemoryConversationStore::new();
        let message = ConversationItem::message("conn-1", "m1", "hi", None);
        let transcription = ConversationItem::transcription("conn-1", "text", 0.9);
        store.put_item(&message).await.unwrap();
        store.put_item(&transcription).await.unwrap();

        let items = store.list_items(&message.conversation_id).await.unwrap();
        assert_eq!(items.len(), 2);
        // "MSG#" < "TRANS#" lexicographically.
        assert!(items[0].item_timestamp.starts_with("MSG#"));
        assert!(items[1].item_timestamp.starts_with("TRANS#"));
    }

    #[tokio::test]
    async fn update_item_replaces_payload() {
        let store = InMemoryConversationStore::new();
        let analysis = AnalysisResult {
            classification: vts_gateway_core::Classification::Green,
            suggested_response: "ok".to_string(),
            confidence: 0.8,
            risk_factors: vec![],
            recommended_actions: vec![],
            timestamp: Utc::now(),
            is_emergency: false,
            error: None,
        };
        let mut item = ConversationItem::ai_response("conn-1", analysis, "hi");
        store.put_item(&item).await.unwrap();

        if let ItemPayload::AiResponse { analysis, .. } = &mut item.payload {
            analysis.confidence = 0.99;
        }
        store.update_item(&item).await.unwrap();

        let fetched = store.get_item(&item.conversation_id, &item.item_timestamp).await.unwrap().unwrap();
        if let ItemPayload::AiResponse { analysis, .. } = fetched.payload {
            assert_eq!(analysis.confidence, 0.99);
        } else {
            panic!("expected AiResponse payload");
        }
    }
}
