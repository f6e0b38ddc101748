//! Where the auth token lives between runs.
//!
//! Only the token bundle is stored; the merged session user is always
//! rebuilt from the backend.

use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::info;

use crate::AppResult;

use super::AuthSession;

const SESSION_KEY: &str = "zoomies.auth.token";

#[async_trait]
pub trait SessionStorage: Send + Sync {
    async fn load(&self) -> AppResult<Option<AuthSession>>;
    async fn save(&self, session: &AuthSession) -> AppResult<()>;
    async fn clear(&self) -> AppResult<()>;
}

/// Forgets everything when the process exits.
#[derive(Default)]
pub struct MemoryStorage {
    session: Mutex<Option<AuthSession>>,
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn load(&self) -> AppResult<Option<AuthSession>> {
        Ok(self.session.lock().unwrap_or_else(PoisonError::into_inner).clone())
    }

    async fn save(&self, session: &AuthSession) -> AppResult<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner).take();
        Ok(())
    }
}

/// Key/value table in a local SQLite file.
pub struct SqliteStorage {
    db_pool: SqlitePool,
}

impl SqliteStorage {
    pub async fn connect(database_url: &str) -> AppResult<Self> {
        let db_pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(database_url)
            .await?;
        Self::with_pool(db_pool).await
    }

    pub async fn with_pool(db_pool: SqlitePool) -> AppResult<Self> {
        sqlx::query("CREATE TABLE IF NOT EXISTS auth_storage (key TEXT PRIMARY KEY, value TEXT NOT NULL)")
            .execute(&db_pool)
            .await?;
        info!("session storage ready");
        Ok(Self { db_pool })
    }
}

#[async_trait]
impl SessionStorage for SqliteStorage {
    async fn load(&self) -> AppResult<Option<AuthSession>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT value FROM auth_storage WHERE key=?")
            .bind(SESSION_KEY)
            .fetch_optional(&self.db_pool)
            .await?;

        match row {
            Some((value,)) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, session: &AuthSession) -> AppResult<()> {
        let value = serde_json::to_string(session)?;
        sqlx::query("INSERT INTO auth_storage (key,value) VALUES (?,?) ON CONFLICT(key) DO UPDATE SET value=excluded.value")
            .bind(SESSION_KEY)
            .bind(value)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }

    async fn clear(&self) -> AppResult<()> {
        sqlx::query("DELETE FROM auth_storage WHERE key=?")
            .bind(SESSION_KEY)
            .execute(&self.db_pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;
    use uuid::Uuid;

    use super::*;
    use crate::auth::Identity;

    fn session() -> AuthSession {
        AuthSession {
            access_token: "jwt".to_owned(),
            refresh_token: "refresh".to_owned(),
            token_type: "bearer".to_owned(),
            expires_in: 3600,
            expires_at: Some(1_900_000_000),
            user: Identity {
                id: Uuid::now_v7(),
                email: Some("a@x.com".to_owned()),
                created_at: datetime!(2024-05-01 12:00 UTC),
                last_sign_in_at: None,
                email_confirmed_at: Some(datetime!(2024-05-01 12:05 UTC)),
                user_metadata: serde_json::json!({ "username": "mabel" }),
                identities: None,
            },
        }
    }

    async fn round_trip(storage: &dyn SessionStorage) {
        assert_eq!(storage.load().await.unwrap(), None);

        let first = session();
        storage.save(&first).await.unwrap();
        assert_eq!(storage.load().await.unwrap(), Some(first));

        let second = session();
        storage.save(&second).await.unwrap();
        assert_eq!(storage.load().await.unwrap(), Some(second));

        storage.clear().await.unwrap();
        assert_eq!(storage.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_storage() {
        round_trip(&MemoryStorage::default()).await;
    }

    #[tokio::test]
    async fn sqlite_storage() {
        let storage = SqliteStorage::connect("sqlite::memory:").await.unwrap();
        round_trip(&storage).await;
    }
}
