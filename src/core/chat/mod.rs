pub mod chat_models;
pub mod chat_router;

pub use chat_models::{
    ChatError, ChatStore, ChatUser, ClientEvent, EventSink, MessageEvent, NewMessage, NewUser,
    OnlineUser, ServerEvent,
};
pub use chat_router::ChatRouter;
