// This is the entry point of the live-chat server.
//
// **Architecture Overview:**
// - `core/` = Business logic (transport-agnostic)
// - `infra/` = Implementations of core traits (SQLite, Ollama)
// - `gateway/` = HTTP and WebSocket adapters
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Bind the HTTP/WebSocket server

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with a handful of mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "gateway/gateway_layer.rs"]
mod gateway;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::chat::ChatRouter;
use crate::core::rag::{RagConfig, RagService};
use crate::gateway::AppState;
use crate::infra::chat::SqliteChatStore;
use crate::infra::ollama::OllamaClient;
use crate::infra::rag::SqliteKnowledgeStore;
use std::sync::Arc;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_PORT: u16 = 3001;

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // Keep runtime databases in a dedicated folder so the repo root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).expect("Failed to create data directory for SQLite files");
    let db_path = std::env::var("DATABASE_PATH").unwrap_or_else(|_| format!("{}/livechat.db", data_dir));

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    // Single pool shared by the knowledge and chat stores.
    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", db_path))
        .await
        .expect("Failed to connect to SQLite database");

    let knowledge_store = SqliteKnowledgeStore::new(pool.clone());
    knowledge_store
        .migrate()
        .await
        .expect("Failed to migrate knowledge base schema");

    let chat_store = SqliteChatStore::new(pool);
    chat_store
        .migrate()
        .await
        .expect("Failed to migrate chat schema");

    // Ollama-backed model provider
    let ollama_url =
        std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
    let provider = OllamaClient::new(&ollama_url).expect("Failed to create Ollama client");

    let mut rag_config = RagConfig::default();
    if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
        rag_config = rag_config.with_embedding_model(model);
    }
    if let Ok(model) = std::env::var("GENERATION_MODEL") {
        rag_config = rag_config.with_generation_model(model);
    }
    if let Some(top_k) = std::env::var("RAG_TOP_K")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
    {
        rag_config = rag_config.with_top_k(top_k);
    }

    let rag_service = Arc::new(RagService::new(provider, knowledge_store, rag_config));
    let chat_router = Arc::new(ChatRouter::new(chat_store));

    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    if admin_token.is_none() {
        tracing::warn!("ADMIN_TOKEN not set; knowledge admin endpoints are disabled");
    }

    let state = AppState {
        rag: rag_service,
        chat: chat_router,
        admin_token,
    };

    // ========================================================================
    // SERVER SETUP
    // ========================================================================

    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(DEFAULT_PORT);
    let bind_addr =
        std::env::var("BIND_ADDR").unwrap_or_else(|_| format!("0.0.0.0:{}", port));

    let app = gateway::http::router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .expect("Failed to bind server address");
    tracing::info!("Live chat server listening on {}", bind_addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
