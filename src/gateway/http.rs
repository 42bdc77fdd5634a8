// HTTP surface for the RAG pipeline and knowledge base administration.
//
// Mirrors the boundary the chat widget and admin dashboard consume:
// public query/retrieve/health endpoints plus admin-gated knowledge CRUD.
// Admin gating here is a shared-token header check; real user
// authentication belongs to the fronting layer.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::core::chat::ChatRouter;
use crate::core::rag::{
    BulkDocument, KnowledgeDocument, KnowledgeStats, QueryOutcome, RagError, RagService,
};
use crate::gateway::ws;
use crate::infra::chat::SqliteChatStore;
use crate::infra::ollama::OllamaClient;
use crate::infra::rag::SqliteKnowledgeStore;

pub type Rag = RagService<OllamaClient, SqliteKnowledgeStore>;
pub type Chat = ChatRouter<SqliteChatStore>;

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub rag: Arc<Rag>,
    pub chat: Arc<Chat>,
    pub admin_token: Option<String>,
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/rag/query", axum::routing::post(handle_query))
        .route("/api/rag/retrieve", axum::routing::post(handle_retrieve))
        .route("/api/rag/health", get(handle_health))
        .route(
            "/api/rag/knowledge",
            get(handle_list_knowledge).post(handle_add_knowledge),
        )
        .route(
            "/api/rag/knowledge/bulk",
            axum::routing::post(handle_bulk_add),
        )
        .route(
            "/api/rag/knowledge/category/{category}",
            get(handle_knowledge_by_category),
        )
        .route(
            "/api/rag/knowledge/{id}",
            get(handle_get_knowledge)
                .put(handle_update_knowledge)
                .delete(handle_delete_knowledge),
        )
        .route("/api/rag/stats", get(handle_stats))
        .route("/ws", get(ws::ws_handler))
        .layer(cors)
        .with_state(state)
}

// ============ Error responses ============

/// Error body sent to clients: a short label plus the underlying message.
#[derive(Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

pub struct ApiError {
    status: StatusCode,
    error: String,
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.error,
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(error: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::BAD_REQUEST,
        error: error.into(),
        message: None,
    }
}

fn not_found(error: impl Into<String>) -> ApiError {
    ApiError {
        status: StatusCode::NOT_FOUND,
        error: error.into(),
        message: None,
    }
}

fn unauthorized() -> ApiError {
    ApiError {
        status: StatusCode::UNAUTHORIZED,
        error: "Admin access required".to_string(),
        message: None,
    }
}

/// Translate a core error into an HTTP response, keeping the boundary
/// label separate from the underlying cause.
fn rag_error(label: &str, err: RagError) -> ApiError {
    let status = match err {
        RagError::Validation(_) => StatusCode::BAD_REQUEST,
        RagError::Upstream(_) | RagError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    ApiError {
        status,
        error: label.to_string(),
        message: Some(err.to_string()),
    }
}

fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let configured = state.admin_token.as_deref().ok_or_else(unauthorized)?;
    let presented = headers
        .get("x-admin-token")
        .and_then(|value| value.to_str().ok());
    if presented == Some(configured) {
        Ok(())
    } else {
        Err(unauthorized())
    }
}

// ============ Request/response bodies ============

fn default_true() -> bool {
    true
}

#[derive(Deserialize)]
struct QueryRequest {
    query: String,
    #[serde(rename = "useRAG", default = "default_true")]
    use_rag: bool,
}

#[derive(Deserialize)]
struct RetrieveRequest {
    query: String,
    #[serde(rename = "topK", default)]
    top_k: Option<usize>,
}

#[derive(Deserialize)]
struct AddKnowledgeRequest {
    content: String,
    #[serde(default)]
    metadata: Option<serde_json::Value>,
    #[serde(default)]
    source: Option<String>,
    #[serde(default)]
    category: Option<String>,
}

#[derive(Deserialize)]
struct BulkAddRequest {
    documents: Vec<BulkDocument>,
}

#[derive(Deserialize)]
struct UpdateKnowledgeRequest {
    content: String,
    #[serde(default)]
    category: Option<String>,
}

/// Document view returned by the listing endpoints: embeddings stay
/// server-side.
#[derive(Serialize)]
struct KnowledgeSummary {
    id: i64,
    content: String,
    category: String,
    source: String,
    created_at: String,
    updated_at: String,
}

impl From<KnowledgeDocument> for KnowledgeSummary {
    fn from(doc: KnowledgeDocument) -> Self {
        Self {
            id: doc.id,
            content: doc.content,
            category: doc.category,
            source: doc.source,
            created_at: doc.created_at.to_rfc3339(),
            updated_at: doc.updated_at.to_rfc3339(),
        }
    }
}

// ============ Handlers ============

async fn handle_query(
    State(state): State<AppState>,
    Json(body): Json<QueryRequest>,
) -> Result<Json<QueryOutcome>, ApiError> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(bad_request("Query cannot be empty"));
    }

    let outcome = state
        .rag
        .process_query(query, body.use_rag)
        .await
        .map_err(|e| rag_error("Failed to process query", e))?;

    Ok(Json(outcome))
}

async fn handle_retrieve(
    State(state): State<AppState>,
    Json(body): Json<RetrieveRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let query = body.query.trim();
    if query.is_empty() {
        return Err(bad_request("Query cannot be empty"));
    }

    let results = state
        .rag
        .retrieve(query, body.top_k)
        .await
        .map_err(|e| rag_error("Failed to retrieve documents", e))?;

    Ok(Json(json!({
        "query": query,
        "results": results,
    })))
}

async fn handle_health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let model_health = state.rag.model_health().await;

    let (kb_status, document_count) = match state.rag.stats().await {
        Ok(stats) => ("ok", stats.total_documents),
        Err(err) => {
            tracing::warn!("Knowledge base health check failed: {}", err);
            ("error", 0)
        }
    };

    Json(json!({
        "status": "ok",
        "ollama": model_health,
        "knowledgeBase": {
            "status": kb_status,
            "documentCount": document_count,
        },
    }))
}

async fn handle_add_knowledge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<AddKnowledgeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;

    let doc = state
        .rag
        .add_document(
            &body.content,
            body.metadata.unwrap_or_else(|| json!({})),
            body.source.as_deref().unwrap_or("manual"),
            body.category.as_deref().unwrap_or("general"),
        )
        .await
        .map_err(|e| rag_error("Failed to add knowledge", e))?;

    Ok(Json(json!({
        "success": true,
        "data": doc,
    })))
}

async fn handle_bulk_add(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<BulkAddRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;

    let count = state
        .rag
        .bulk_add(body.documents)
        .await
        .map_err(|e| rag_error("Failed to bulk add knowledge", e))?;

    Ok(Json(json!({
        "success": true,
        "data": { "count": count },
    })))
}

async fn handle_list_knowledge(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<KnowledgeSummary>>, ApiError> {
    require_admin(&state, &headers)?;

    let documents = state
        .rag
        .list_documents()
        .await
        .map_err(|e| rag_error("Database error", e))?;

    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

async fn handle_knowledge_by_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(category): Path<String>,
) -> Result<Json<Vec<KnowledgeSummary>>, ApiError> {
    require_admin(&state, &headers)?;

    let documents = state
        .rag
        .documents_by_category(&category)
        .await
        .map_err(|e| rag_error("Database error", e))?;

    Ok(Json(documents.into_iter().map(Into::into).collect()))
}

async fn handle_get_knowledge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<KnowledgeSummary>, ApiError> {
    require_admin(&state, &headers)?;

    let document = state
        .rag
        .get_document(id)
        .await
        .map_err(|e| rag_error("Database error", e))?
        .ok_or_else(|| not_found("Document not found"))?;

    Ok(Json(document.into()))
}

async fn handle_update_knowledge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(body): Json<UpdateKnowledgeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;

    state
        .rag
        .update_document(id, &body.content, body.category.as_deref().unwrap_or("general"))
        .await
        .map_err(|e| rag_error("Failed to update knowledge", e))?;

    Ok(Json(json!({
        "success": true,
        "message": "Knowledge updated successfully",
    })))
}

async fn handle_delete_knowledge(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&state, &headers)?;

    state
        .rag
        .delete_document(id)
        .await
        .map_err(|e| rag_error("Failed to delete knowledge", e))?;

    Ok(Json(json!({
        "success": true,
        "message": "Knowledge deleted successfully",
    })))
}

async fn handle_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<KnowledgeStats>, ApiError> {
    require_admin(&state, &headers)?;

    let stats = state
        .rag
        .stats()
        .await
        .map_err(|e| rag_error("Failed to get stats", e))?;

    Ok(Json(stats))
}
