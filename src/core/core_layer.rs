// The core module contains all business logic.
// Each feature gets its own submodule.

#[path = "rag/mod.rs"]
pub mod rag;

#[path = "chat/mod.rs"]
pub mod chat;
