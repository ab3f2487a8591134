use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use uuid::Uuid;

use crate::config::DatabaseConfig;

use super::{MessageDraft, MessageStore, StoreError, StoredMessage};

/// Message store backed by the chat service's PostgreSQL database.
pub struct PostgresMessageStore {
    pool: PgPool,
}

impl PostgresMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a store with its own connection pool from configuration.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        let url = config
            .url
            .as_deref()
            .ok_or_else(|| StoreError::Unavailable("database.url is not set".to_string()))?;

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds as u64))
            .connect(url)
            .await?;

        tracing::info!(pool_size = config.pool_size, "PostgreSQL connection pool created");

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl MessageStore for PostgresMessageStore {
    async fn persist(&self, draft: MessageDraft) -> Result<StoredMessage, StoreError> {
        let (id, created_at): (Uuid, DateTime<Utc>) = sqlx::query_as(
            "INSERT INTO messages (content, sender_id, chat_id) \
             VALUES ($1, $2, $3) \
             RETURNING id, created_at",
        )
        .bind(&draft.content)
        .bind(&draft.sender_id)
        .bind(&draft.chat_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoredMessage {
            id,
            content: draft.content,
            sender_id: draft.sender_id,
            chat_id: draft.chat_id,
            created_at,
        })
    }
}
