//! Durable message storage collaborator.
//!
//! The relay hands finished drafts to a [`MessageStore`] in a background
//! task; the store assigns the canonical message id. Broadcast delivery
//! never waits on, or rolls back for, the durable write.

mod memory;
mod postgres;

pub use memory::MemoryMessageStore;
pub use postgres::PostgresMessageStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// The subset of message fields that becomes durable.
#[derive(Debug, Clone)]
pub struct MessageDraft {
    pub content: String,
    pub sender_id: String,
    pub chat_id: String,
}

/// A persisted message, with the store's canonical id.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    pub id: Uuid,
    pub content: String,
    pub sender_id: String,
    pub chat_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist one message draft. At-most-one attempt; retry policy, if
    /// any, belongs behind this trait.
    async fn persist(&self, draft: MessageDraft) -> Result<StoredMessage, StoreError>;
}
