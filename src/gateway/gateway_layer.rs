// Gateway layer - transport adapters for the core services.
//
// This layer is THIN: it translates HTTP requests and WebSocket frames into
// core service calls and core results back into wire responses. No business
// logic lives here.

#[path = "http.rs"]
pub mod http;

#[path = "ws.rs"]
pub mod ws;

pub use http::AppState;
