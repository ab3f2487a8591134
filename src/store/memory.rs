use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{MessageDraft, MessageStore, StoreError, StoredMessage};

/// In-memory message store for development and tests.
#[derive(Default)]
pub struct MemoryMessageStore {
    messages: RwLock<Vec<StoredMessage>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    pub async fn all(&self) -> Vec<StoredMessage> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn persist(&self, draft: MessageDraft) -> Result<StoredMessage, StoreError> {
        let stored = StoredMessage {
            id: Uuid::new_v4(),
            content: draft.content,
            sender_id: draft.sender_id,
            chat_id: draft.chat_id,
            created_at: Utc::now(),
        };
        self.messages.write().await.push(stored.clone());
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_persist_assigns_canonical_id() {
        let store = MemoryMessageStore::new();
        let draft = MessageDraft {
            content: "hi".to_string(),
            sender_id: "u1".to_string(),
            chat_id: "c1".to_string(),
        };

        let first = store.persist(draft.clone()).await.unwrap();
        let second = store.persist(draft).await.unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(store.len().await, 2);
    }
}
