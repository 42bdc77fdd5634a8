use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::service::RagError;

/// A persisted knowledge base document.
///
/// The embedding is kept as the raw serialized JSON array from the store.
/// Parsing happens per document in the retrieval path so a corrupt
/// embedding degrades that document's score instead of failing the query.
#[derive(Debug, Clone)]
pub struct KnowledgeDocument {
    pub id: i64,
    pub content: String,
    pub embedding: Option<String>,
    pub category: String,
    pub source: String,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A document ready for insertion, embedding already computed.
#[derive(Debug, Clone)]
pub struct NewKnowledge {
    pub content: String,
    pub embedding: Vec<f32>,
    pub metadata: serde_json::Value,
    pub source: String,
    pub category: String,
}

/// One entry of a bulk-ingestion request, before embedding.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDocument {
    pub content: String,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
}

/// A retrieval result: one document scored against a query. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredDocument {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub similarity: f32,
}

/// Reference to a freshly inserted document, returned to the caller.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentRef {
    pub id: i64,
    pub content: String,
    pub category: String,
    pub source: String,
}

/// Knowledge base counts grouped by category and source.
/// Categories and sources with zero documents are simply absent.
#[derive(Debug, Clone, Serialize)]
pub struct KnowledgeStats {
    #[serde(rename = "totalDocuments")]
    pub total_documents: usize,
    #[serde(rename = "byCategory")]
    pub by_category: HashMap<String, usize>,
    #[serde(rename = "bySource")]
    pub by_source: HashMap<String, usize>,
}

/// Trait for persisting and querying knowledge base documents.
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// Insert a single document and return its ID.
    async fn add(&self, doc: NewKnowledge) -> Result<i64, RagError>;

    /// Insert a batch of documents atomically: either every document is
    /// persisted or none are.
    async fn bulk_insert(&self, docs: Vec<NewKnowledge>) -> Result<(), RagError>;

    /// All documents, embedded or not.
    async fn get_all(&self) -> Result<Vec<KnowledgeDocument>, RagError>;

    /// Only documents that have an embedding, in insertion order.
    async fn get_all_with_embeddings(&self) -> Result<Vec<KnowledgeDocument>, RagError>;

    async fn get(&self, id: i64) -> Result<Option<KnowledgeDocument>, RagError>;

    async fn get_by_category(&self, category: &str) -> Result<Vec<KnowledgeDocument>, RagError>;

    /// Replace a document's content, embedding and category.
    async fn update(
        &self,
        id: i64,
        content: &str,
        embedding: Vec<f32>,
        category: &str,
    ) -> Result<(), RagError>;

    async fn delete(&self, id: i64) -> Result<(), RagError>;
}
