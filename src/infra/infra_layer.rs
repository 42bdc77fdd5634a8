// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "ai/ollama_client.rs"]
pub mod ollama;

#[path = "rag/knowledge_store.rs"]
pub mod rag;

#[path = "chat/chat_store.rs"]
pub mod chat;
