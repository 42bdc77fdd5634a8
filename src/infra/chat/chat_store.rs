use crate::core::chat::{ChatError, ChatStore, ChatUser, NewMessage, NewUser};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteChatStore {
    pool: Pool<Sqlite>,
}

impl SqliteChatStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT,
                is_admin INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS conversations (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'active',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                sender_id TEXT NOT NULL,
                message TEXT NOT NULL,
                message_type TEXT NOT NULL DEFAULT 'text',
                status TEXT NOT NULL DEFAULT 'sent',
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_conversation
            ON messages(conversation_id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sessions (
                connection_id TEXT PRIMARY KEY,
                is_online INTEGER NOT NULL,
                last_seen TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl ChatStore for SqliteChatStore {
    async fn create_user(&self, user: NewUser) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO users (id, name, email, is_admin, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.name)
        .bind(&user.email)
        .bind(user.is_admin)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn get_user_by_id(&self, id: &str) -> Result<Option<ChatUser>, ChatError> {
        let row = sqlx::query("SELECT id, name, email, is_admin FROM users WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))?;

        Ok(row.map(|row| ChatUser {
            id: row.get("id"),
            name: row.get("name"),
            email: row.get("email"),
            is_admin: row.get("is_admin"),
        }))
    }

    async fn create_conversation(&self, id: &str, user_id: &str) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO conversations (id, user_id, status, created_at)
            VALUES (?, ?, 'active', ?)
            "#,
        )
        .bind(id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn create_message(&self, message: NewMessage) -> Result<i64, ChatError> {
        let result = sqlx::query(
            r#"
            INSERT INTO messages (conversation_id, sender_id, message, message_type, status, created_at)
            VALUES (?, ?, ?, ?, 'sent', ?)
            "#,
        )
        .bind(&message.conversation_id)
        .bind(&message.sender_id)
        .bind(&message.message)
        .bind(&message.message_type)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Storage(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn update_message_status(&self, message_id: i64, status: &str) -> Result<(), ChatError> {
        sqlx::query("UPDATE messages SET status = ? WHERE id = ?")
            .bind(status)
            .bind(message_id)
            .execute(&self.pool)
            .await
            .map_err(|e| ChatError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn update_session_status(
        &self,
        connection_id: &str,
        is_online: bool,
    ) -> Result<(), ChatError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (connection_id, is_online, last_seen)
            VALUES (?, ?, ?)
            ON CONFLICT(connection_id) DO UPDATE SET
                is_online = excluded.is_online,
                last_seen = excluded.last_seen
            "#,
        )
        .bind(connection_id)
        .bind(is_online)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(|e| ChatError::Storage(e.to_string()))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn store() -> SqliteChatStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let store = SqliteChatStore::new(pool);
        store.migrate().await.unwrap();
        store
    }

    fn visitor(id: &str) -> NewUser {
        NewUser {
            id: id.to_string(),
            name: "Website Visitor".to_string(),
            email: None,
            is_admin: false,
        }
    }

    #[tokio::test]
    async fn test_create_user_is_idempotent() {
        let store = store().await;

        store.create_user(visitor("u1")).await.unwrap();
        store
            .create_user(NewUser {
                name: "Second Attempt".to_string(),
                ..visitor("u1")
            })
            .await
            .unwrap();

        let user = store.get_user_by_id("u1").await.unwrap().unwrap();
        assert_eq!(user.name, "Website Visitor");
        assert!(!user.is_admin);
    }

    #[tokio::test]
    async fn test_unknown_user_is_none() {
        let store = store().await;
        assert!(store.get_user_by_id("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_conversation_is_idempotent() {
        let store = store().await;

        store.create_conversation("c1", "u1").await.unwrap();
        store.create_conversation("c1", "u2").await.unwrap();

        let row = sqlx::query("SELECT COUNT(*) AS n, MAX(user_id) AS owner FROM conversations")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<i64, _>("n"), 1);
        assert_eq!(row.get::<String, _>("owner"), "u1");
    }

    #[tokio::test]
    async fn test_messages_get_sequential_ids_and_status_updates() {
        let store = store().await;

        let first = store
            .create_message(NewMessage {
                conversation_id: "c1".to_string(),
                sender_id: "u1".to_string(),
                message: "hello".to_string(),
                message_type: "text".to_string(),
            })
            .await
            .unwrap();
        let second = store
            .create_message(NewMessage {
                conversation_id: "c1".to_string(),
                sender_id: "u1".to_string(),
                message: "again".to_string(),
                message_type: "text".to_string(),
            })
            .await
            .unwrap();
        assert!(second > first);

        store.update_message_status(first, "read").await.unwrap();

        let row = sqlx::query("SELECT status FROM messages WHERE id = ?")
            .bind(first)
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("status"), "read");
    }

    #[tokio::test]
    async fn test_session_status_upserts() {
        let store = store().await;

        store.update_session_status("conn-1", true).await.unwrap();
        store.update_session_status("conn-1", false).await.unwrap();

        let row = sqlx::query("SELECT is_online FROM sessions WHERE connection_id = ?")
            .bind("conn-1")
            .fetch_one(&store.pool)
            .await
            .unwrap();
        assert!(!row.get::<bool, _>("is_online"));
    }
}
