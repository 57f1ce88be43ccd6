use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::info;

/// User record in the database.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String, // Argon2 PHC string, never the plaintext
    pub disabled: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Error)]
pub enum UserError {
    #[error("Username already registered")]
    UsernameTaken,

    #[error("Email already registered")]
    EmailTaken,

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Exact-match lookup; `Ok(None)` when nobody has that username.
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError>;

    async fn create(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> Result<User, UserError>;
}

#[derive(Clone)]
pub struct PgUserStore {
    db: PgPool,
}

impl PgUserStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, disabled, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn create(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> Result<User, UserError> {
        let mut tx = self.db.begin().await?;

        let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&mut *tx)
            .await?;
        if taken.is_some() {
            return Err(UserError::UsernameTaken);
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, disabled, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(map_unique_violation)?;

        tx.commit().await?;
        info!(user_id = user.id, "user row inserted");
        Ok(user)
    }
}

fn map_unique_violation(err: sqlx::Error) -> UserError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return match db.constraint() {
                Some("users_email_key") => UserError::EmailTaken,
                _ => UserError::UsernameTaken,
            };
        }
    }
    UserError::Storage(err)
}

/// Users kept in process memory; ids start at 1.
#[derive(Default, Clone)]
pub struct InMemoryUserStore {
    table: Arc<RwLock<UserTable>>,
}

#[derive(Default)]
struct UserTable {
    last_id: i64,
    rows: Vec<User>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `username` as disabled; returns whether such a user exists.
    #[cfg(test)]
    pub async fn disable(&self, username: &str) -> bool {
        let mut table = self.table.write().await;
        match table.rows.iter_mut().find(|u| u.username == username) {
            Some(user) => {
                user.disabled = true;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        let table = self.table.read().await;
        Ok(table.rows.iter().find(|u| u.username == username).cloned())
    }

    async fn create(
        &self,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> Result<User, UserError> {
        let mut table = self.table.write().await;

        if table.rows.iter().any(|u| u.username == username) {
            return Err(UserError::UsernameTaken);
        }
        if let Some(email) = email {
            if table.rows.iter().any(|u| u.email.as_deref() == Some(email)) {
                return Err(UserError::EmailTaken);
            }
        }

        table.last_id += 1;
        let user = User {
            id: table.last_id,
            username: username.to_owned(),
            email: email.map(str::to_owned),
            password_hash: password_hash.to_owned(),
            disabled: false,
            created_at: OffsetDateTime::now_utc(),
        };
        table.rows.push(user.clone());
        Ok(user)
    }
}
