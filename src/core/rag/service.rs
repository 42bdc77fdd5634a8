// RAG pipeline - core business logic for retrieval-augmented generation.
//
// This service handles:
// - Similarity retrieval over the knowledge base (embed, scan, rank)
// - Prompt augmentation and response generation
// - Knowledge base maintenance (single/bulk ingestion, update, delete)
//
// NO transport or SQL dependencies here - just pure domain logic over the
// ModelProvider and KnowledgeStore ports.

use super::knowledge::{
    BulkDocument, DocumentRef, KnowledgeStats, KnowledgeStore, NewKnowledge, ScoredDocument,
};
use super::prompt::build_prompt;
use super::provider::{ModelError, ModelHealth, ModelProvider};
use super::similarity::cosine_similarity;
use futures::future::try_join_all;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum RagError {
    #[error("Model gateway error: {0}")]
    Upstream(#[from] ModelError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

// ============================================================================
// CONFIGURATION
// ============================================================================

const DEFAULT_TOP_K: usize = 5;
const DEFAULT_EMBEDDING_MODEL: &str = "mistral-embed";
const DEFAULT_GENERATION_MODEL: &str = "mistral";

const GENERATION_TEMPERATURE: f32 = 0.7;
const GENERATION_MAX_TOKENS: u32 = 500;

/// Effective configuration for the pipeline, fixed at service construction.
/// The `with_*` builders return a new configuration rather than mutating
/// shared defaults, so services stay freely shareable behind `Arc`.
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub top_k: usize,
    pub embedding_model: String,
    pub generation_model: String,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
        }
    }
}

impl RagConfig {
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_generation_model(mut self, model: impl Into<String>) -> Self {
        self.generation_model = model.into();
        self
    }
}

/// Result of a pipeline run, returned to the boundary layer as-is.
#[derive(Debug, Clone, Serialize)]
pub struct QueryOutcome {
    pub response: String,
    #[serde(rename = "relevantDocuments")]
    pub relevant_documents: Vec<ScoredDocument>,
    #[serde(rename = "usedRAG")]
    pub used_rag: bool,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct RagService<P: ModelProvider, S: KnowledgeStore> {
    provider: P,
    store: S,
    config: RagConfig,
}

impl<P: ModelProvider, S: KnowledgeStore> RagService<P, S> {
    pub fn new(provider: P, store: S, config: RagConfig) -> Self {
        Self {
            provider,
            store,
            config,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Retrieve the documents most similar to `query`, best first.
    ///
    /// The corpus is scanned linearly; a document whose stored embedding
    /// cannot be parsed stays in the ranking with similarity 0 (fail-open)
    /// so the result set never shrinks because of one corrupt row.
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: Option<usize>,
    ) -> Result<Vec<ScoredDocument>, RagError> {
        let query_embedding = self
            .provider
            .embed(query, &self.config.embedding_model)
            .await?;

        let documents = self.store.get_all_with_embeddings().await?;
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<ScoredDocument> = documents
            .into_iter()
            .map(|doc| {
                let similarity = match doc.embedding.as_deref() {
                    Some(raw) => match serde_json::from_str::<Vec<f32>>(raw) {
                        Ok(embedding) => cosine_similarity(&query_embedding, &embedding),
                        Err(err) => {
                            tracing::warn!(
                                "Unparseable embedding for document {}: {}",
                                doc.id,
                                err
                            );
                            0.0
                        }
                    },
                    None => {
                        tracing::warn!("Document {} has no embedding", doc.id);
                        0.0
                    }
                };

                ScoredDocument {
                    id: doc.id,
                    content: doc.content,
                    category: doc.category,
                    similarity,
                }
            })
            .collect();

        // sort_by is stable: ties keep store order, so retrieval is
        // deterministic across runs.
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        scored.truncate(top_k.unwrap_or(self.config.top_k).max(1));

        Ok(scored)
    }

    /// Run the full pipeline: retrieve supporting documents, compose the
    /// augmented prompt, generate a response. With `use_rag = false` the
    /// query goes straight to generation and no embedding call is made.
    pub async fn process_query(&self, query: &str, use_rag: bool) -> Result<QueryOutcome, RagError> {
        if use_rag {
            let relevant_documents = self.retrieve(query, None).await?;
            let prompt = build_prompt(query, &relevant_documents);
            let response = self
                .provider
                .generate(
                    &prompt,
                    &self.config.generation_model,
                    GENERATION_TEMPERATURE,
                    GENERATION_MAX_TOKENS,
                )
                .await?;

            Ok(QueryOutcome {
                response,
                relevant_documents,
                used_rag: true,
            })
        } else {
            let response = self
                .provider
                .generate(
                    query,
                    &self.config.generation_model,
                    GENERATION_TEMPERATURE,
                    GENERATION_MAX_TOKENS,
                )
                .await?;

            Ok(QueryOutcome {
                response,
                relevant_documents: Vec::new(),
                used_rag: false,
            })
        }
    }

    /// Embed and persist a single document. The embedding round-trip happens
    /// before the write, so an upstream failure leaves the store untouched.
    pub async fn add_document(
        &self,
        content: &str,
        metadata: serde_json::Value,
        source: &str,
        category: &str,
    ) -> Result<DocumentRef, RagError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(RagError::Validation(
                "Document content cannot be empty".to_string(),
            ));
        }

        let embedding = self
            .provider
            .embed(content, &self.config.embedding_model)
            .await?;

        let id = self
            .store
            .add(NewKnowledge {
                content: content.to_string(),
                embedding,
                metadata,
                source: source.to_string(),
                category: category.to_string(),
            })
            .await?;

        Ok(DocumentRef {
            id,
            content: content.to_string(),
            category: category.to_string(),
            source: source.to_string(),
        })
    }

    /// Embed and persist a batch of documents. Embeddings are fanned out
    /// concurrently; if any call fails the whole batch fails and nothing is
    /// written. Returns the number of documents inserted.
    pub async fn bulk_add(&self, documents: Vec<BulkDocument>) -> Result<usize, RagError> {
        if documents.is_empty() {
            return Err(RagError::Validation(
                "Documents array required and cannot be empty".to_string(),
            ));
        }
        for doc in &documents {
            if doc.content.trim().is_empty() {
                return Err(RagError::Validation(
                    "Each document must have non-empty content".to_string(),
                ));
            }
        }

        let embeddings = try_join_all(
            documents
                .iter()
                .map(|doc| self.provider.embed(doc.content.trim(), &self.config.embedding_model)),
        )
        .await?;

        let count = documents.len();
        let items = documents
            .into_iter()
            .zip(embeddings)
            .map(|(doc, embedding)| NewKnowledge {
                content: doc.content.trim().to_string(),
                embedding,
                metadata: doc.metadata.unwrap_or_else(|| serde_json::json!({})),
                source: doc.source.unwrap_or_else(|| "bulk".to_string()),
                category: doc.category.unwrap_or_else(|| "general".to_string()),
            })
            .collect();

        self.store.bulk_insert(items).await?;

        Ok(count)
    }

    /// Replace a document's content, regenerating its embedding first.
    /// Persisting new content against the old embedding would silently
    /// corrupt future retrieval, so the two always change together.
    pub async fn update_document(
        &self,
        id: i64,
        content: &str,
        category: &str,
    ) -> Result<(), RagError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(RagError::Validation(
                "Document content cannot be empty".to_string(),
            ));
        }

        let embedding = self
            .provider
            .embed(content, &self.config.embedding_model)
            .await?;

        self.store.update(id, content, embedding, category).await
    }

    pub async fn delete_document(&self, id: i64) -> Result<(), RagError> {
        self.store.delete(id).await
    }

    pub async fn list_documents(&self) -> Result<Vec<super::knowledge::KnowledgeDocument>, RagError> {
        self.store.get_all().await
    }

    pub async fn get_document(
        &self,
        id: i64,
    ) -> Result<Option<super::knowledge::KnowledgeDocument>, RagError> {
        self.store.get(id).await
    }

    pub async fn documents_by_category(
        &self,
        category: &str,
    ) -> Result<Vec<super::knowledge::KnowledgeDocument>, RagError> {
        self.store.get_by_category(category).await
    }

    /// Knowledge base counts grouped by category and by source.
    pub async fn stats(&self) -> Result<KnowledgeStats, RagError> {
        let documents = self.store.get_all().await?;

        let mut by_category: HashMap<String, usize> = HashMap::new();
        let mut by_source: HashMap<String, usize> = HashMap::new();
        for doc in &documents {
            *by_category.entry(doc.category.clone()).or_insert(0) += 1;
            *by_source.entry(doc.source.clone()).or_insert(0) += 1;
        }

        Ok(KnowledgeStats {
            total_documents: documents.len(),
            by_category,
            by_source,
        })
    }

    /// Health of the model server backing this pipeline. Never fails;
    /// an unreachable server is reported as a degraded status.
    pub async fn model_health(&self) -> ModelHealth {
        self.provider.health_check().await
    }
}

// ============================================================================
// TESTS
// ============================================================================
