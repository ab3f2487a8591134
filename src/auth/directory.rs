use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::AppError;

use super::UserIdentity;

/// User-store collaborator: resolves a token subject to a full identity.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn lookup(&self, user_id: &str) -> Result<UserIdentity, AppError>;
}

/// Directory backed by the external user store's `users` table.
pub struct PostgresUserDirectory {
    pool: PgPool,
}

impl PostgresUserDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserDirectory for PostgresUserDirectory {
    async fn lookup(&self, user_id: &str) -> Result<UserIdentity, AppError> {
        let row: Option<(String, String)> =
            sqlx::query_as("SELECT id, name FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| AppError::Internal(format!("User lookup failed: {}", e)))?;

        match row {
            Some((id, name)) => Ok(UserIdentity { id, name }),
            None => Err(AppError::Auth(format!("Unknown user: {}", user_id))),
        }
    }
}

/// Fixed in-memory directory for development and tests.
#[derive(Default)]
pub struct StaticUserDirectory {
    users: HashMap<String, UserIdentity>,
}

impl StaticUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, identity: UserIdentity) -> Self {
        self.users.insert(identity.id.clone(), identity);
        self
    }

    pub fn insert(&mut self, identity: UserIdentity) {
        self.users.insert(identity.id.clone(), identity);
    }
}

#[async_trait]
impl UserDirectory for StaticUserDirectory {
    async fn lookup(&self, user_id: &str) -> Result<UserIdentity, AppError> {
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| AppError::Auth(format!("Unknown user: {}", user_id)))
    }
}
