use crate::core::rag::{KnowledgeDocument, KnowledgeStore, NewKnowledge, RagError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Row, Sqlite};

pub struct SqliteKnowledgeStore {
    pool: Pool<Sqlite>,
}

impl SqliteKnowledgeStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    pub async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS knowledge_base (
                id INTEGER PRIMARY KEY,
                content TEXT NOT NULL,
                embedding TEXT,
                metadata TEXT NOT NULL DEFAULT '{}',
                source TEXT NOT NULL DEFAULT 'manual',
                category TEXT NOT NULL DEFAULT 'general',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Index for the category listing endpoint
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_knowledge_base_category
            ON knowledge_base(category)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Result<String, RagError> {
        serde_json::to_string(embedding).map_err(|e| RagError::Storage(e.to_string()))
    }
}

fn row_to_document(row: &sqlx::sqlite::SqliteRow) -> KnowledgeDocument {
    let metadata_json: String = row.get("metadata");
    KnowledgeDocument {
        id: row.get("id"),
        content: row.get("content"),
        embedding: row.get("embedding"),
        category: row.get("category"),
        source: row.get("source"),
        metadata: serde_json::from_str(&metadata_json)
            .unwrap_or_else(|_| serde_json::json!({})),
        created_at: row.get::<DateTime<Utc>, _>("created_at"),
        updated_at: row.get::<DateTime<Utc>, _>("updated_at"),
    }
}

#[async_trait]
impl KnowledgeStore for SqliteKnowledgeStore {
    async fn add(&self, doc: NewKnowledge) -> Result<i64, RagError> {
        let embedding = Self::serialize_embedding(&doc.embedding)?;
        let metadata =
            serde_json::to_string(&doc.metadata).map_err(|e| RagError::Storage(e.to_string()))?;
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            INSERT INTO knowledge_base (content, embedding, metadata, source, category, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&doc.content)
        .bind(embedding)
        .bind(metadata)
        .bind(&doc.source)
        .bind(&doc.category)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| RagError::Storage(e.to_string()))?;

        Ok(result.last_insert_rowid())
    }

    async fn bulk_insert(&self, docs: Vec<NewKnowledge>) -> Result<(), RagError> {
        // One transaction: a mid-batch failure rolls everything back.
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| RagError::Storage(e.to_string()))?;

        let now = Utc::now();
        for doc in docs {
            let embedding = Self::serialize_embedding(&doc.embedding)?;
            let metadata = serde_json::to_string(&doc.metadata)
                .map_err(|e| RagError::Storage(e.to_string()))?;

            sqlx::query(
                r#"
                INSERT INTO knowledge_base (content, embedding, metadata, source, category, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&doc.content)
            .bind(embedding)
            .bind(metadata)
            .bind(&doc.source)
            .bind(&doc.category)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| RagError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| RagError::Storage(e.to_string()))
    }

    async fn get_all(&self) -> Result<Vec<KnowledgeDocument>, RagError> {
        let rows = sqlx::query("SELECT * FROM knowledge_base ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RagError::Storage(e.to_string()))?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn get_all_with_embeddings(&self) -> Result<Vec<KnowledgeDocument>, RagError> {
        let rows = sqlx::query(
            "SELECT * FROM knowledge_base WHERE embedding IS NOT NULL ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RagError::Storage(e.to_string()))?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn get(&self, id: i64) -> Result<Option<KnowledgeDocument>, RagError> {
        let row = sqlx::query("SELECT * FROM knowledge_base WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| RagError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(row_to_document))
    }

    async fn get_by_category(&self, category: &str) -> Result<Vec<KnowledgeDocument>, RagError> {
        let rows = sqlx::query("SELECT * FROM knowledge_base WHERE category = ? ORDER BY id")
            .bind(category)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RagError::Storage(e.to_string()))?;

        Ok(rows.iter().map(row_to_document).collect())
    }

    async fn update(
        &self,
        id: i64,
        content: &str,
        embedding: Vec<f32>,
        category: &str,
    ) -> Result<(), RagError> {
        let embedding = Self::serialize_embedding(&embedding)?;

        sqlx::query(
            r#"
            UPDATE knowledge_base
            SET content = ?, embedding = ?, category = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(content)
        .bind(embedding)
        .bind(category)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| RagError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<(), RagError> {
        sqlx::query("DELETE FROM knowledge_base WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| RagError::Storage(e.to_string()))?;

        Ok(())
    }
}
