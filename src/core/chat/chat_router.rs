// Realtime session router - core logic for the live chat channel.
//
// Tracks connected visitor and operator sessions, routes chat messages and
// presence events between them, and keeps operators informed about
// conversations they are not currently viewing. Transport-agnostic: each
// connection is just an id plus an EventSink.
//
// Each connection's events arrive sequentially from its own socket task, so
// per-connection handling is linearizable; the DashMaps serialize the
// cross-connection fan-out.

use super::chat_models::{
    ChatStore, ClientEvent, EventSink, MessageEvent, NewMessage, NewUser, OnlineUser, ServerEvent,
};
use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;

const DEFAULT_VISITOR_NAME: &str = "Website Visitor";
const UNKNOWN_SENDER_NAME: &str = "Unknown User";

struct VisitorSession {
    user_id: String,
    conversation_id: String,
    sink: Arc<dyn EventSink>,
}

struct OperatorSession {
    #[allow(dead_code)]
    user_id: String,
    sink: Arc<dyn EventSink>,
    /// Conversations this operator has explicitly scoped into.
    joined: HashSet<String>,
}

pub struct ChatRouter<S: ChatStore> {
    store: S,
    visitors: DashMap<String, VisitorSession>,
    operators: DashMap<String, OperatorSession>,
}

impl<S: ChatStore> ChatRouter<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            visitors: DashMap::new(),
            operators: DashMap::new(),
        }
    }

    /// Dispatch one inbound event from a connected client.
    pub async fn handle_event(
        &self,
        connection_id: &str,
        sink: &Arc<dyn EventSink>,
        event: ClientEvent,
    ) {
        match event {
            ClientEvent::JoinChat {
                user_id,
                conversation_id,
                is_admin,
                user_name,
                user_email,
            } => {
                if is_admin {
                    self.join_operator(connection_id, sink.clone(), user_id).await;
                } else {
                    let Some(conversation_id) = conversation_id else {
                        sink.send(ServerEvent::Error {
                            message: "Missing conversation_id".to_string(),
                        });
                        return;
                    };
                    self.join_visitor(
                        connection_id,
                        sink.clone(),
                        user_id,
                        conversation_id,
                        user_name,
                        user_email,
                    )
                    .await;
                }
            }
            ClientEvent::SendMessage {
                conversation_id,
                sender_id,
                message,
                message_type,
            } => {
                self.handle_send_message(sink, conversation_id, sender_id, message, message_type)
                    .await;
            }
            ClientEvent::TypingStart {
                conversation_id,
                user_name,
            } => {
                let event = ServerEvent::UserTyping {
                    user_name,
                    conversation_id: conversation_id.clone(),
                };
                self.broadcast_to_conversation(&conversation_id, Some(connection_id), event);
            }
            ClientEvent::TypingStop { conversation_id } => {
                let event = ServerEvent::UserStopTyping {
                    conversation_id: conversation_id.clone(),
                };
                self.broadcast_to_conversation(&conversation_id, Some(connection_id), event);
            }
            ClientEvent::MessageRead { message_id } => {
                if let Err(err) = self.store.update_message_status(message_id, "read").await {
                    tracing::warn!("Failed to update status of message {}: {}", message_id, err);
                }
            }
            ClientEvent::AdminJoinConversation { conversation_id } => {
                if let Some(mut operator) = self.operators.get_mut(connection_id) {
                    operator.joined.insert(conversation_id);
                }
            }
            ClientEvent::AdminLeaveConversation { conversation_id } => {
                if let Some(mut operator) = self.operators.get_mut(connection_id) {
                    operator.joined.remove(&conversation_id);
                }
            }
        }
    }

    async fn join_visitor(
        &self,
        connection_id: &str,
        sink: Arc<dyn EventSink>,
        user_id: String,
        conversation_id: String,
        user_name: Option<String>,
        user_email: Option<String>,
    ) {
        // Provision a user record for first-time widget visitors.
        match self.store.get_user_by_id(&user_id).await {
            Ok(None) => {
                let user = NewUser {
                    id: user_id.clone(),
                    name: user_name.unwrap_or_else(|| DEFAULT_VISITOR_NAME.to_string()),
                    email: user_email,
                    is_admin: false,
                };
                if let Err(err) = self.store.create_user(user).await {
                    tracing::error!("Failed to create visitor user {}: {}", user_id, err);
                }
            }
            Ok(Some(_)) => {}
            Err(err) => tracing::error!("Failed to look up user {}: {}", user_id, err),
        }

        if let Err(err) = self.store.create_conversation(&conversation_id, &user_id).await {
            tracing::error!("Failed to create conversation {}: {}", conversation_id, err);
        }

        self.visitors.insert(
            connection_id.to_string(),
            VisitorSession {
                user_id: user_id.clone(),
                conversation_id: conversation_id.clone(),
                sink,
            },
        );
        tracing::info!("User {} joined conversation {}", user_id, conversation_id);

        self.notify_operators(ServerEvent::UserOnline {
            user_id,
            conversation_id,
        });
        self.mark_session(connection_id, true).await;
    }

    async fn join_operator(&self, connection_id: &str, sink: Arc<dyn EventSink>, user_id: String) {
        // The joining operator immediately gets a snapshot of who is online.
        sink.send(ServerEvent::OnlineUsers(self.online_visitors()));

        self.operators.insert(
            connection_id.to_string(),
            OperatorSession {
                user_id: user_id.clone(),
                sink,
                joined: HashSet::new(),
            },
        );
        tracing::info!("Operator {} joined", user_id);

        self.mark_session(connection_id, true).await;
    }

    async fn handle_send_message(
        &self,
        sink: &Arc<dyn EventSink>,
        conversation_id: String,
        sender_id: String,
        message: String,
        message_type: String,
    ) {
        let message = message.trim().to_string();
        if conversation_id.is_empty() || sender_id.is_empty() || message.is_empty() {
            sink.send(ServerEvent::Error {
                message: "Missing required fields".to_string(),
            });
            return;
        }

        let message_id = match self
            .store
            .create_message(NewMessage {
                conversation_id: conversation_id.clone(),
                sender_id: sender_id.clone(),
                message: message.clone(),
                message_type: message_type.clone(),
            })
            .await
        {
            Ok(id) => id,
            Err(err) => {
                tracing::error!("Failed to save message: {}", err);
                sink.send(ServerEvent::Error {
                    message: "Failed to send message".to_string(),
                });
                return;
            }
        };

        // Resolve the sender's display identity; an unknown sender is still
        // delivered, attributed to a placeholder non-operator identity.
        let sender = match self.store.get_user_by_id(&sender_id).await {
            Ok(user) => user,
            Err(err) => {
                tracing::error!("Failed to look up sender {}: {}", sender_id, err);
                None
            }
        };
        let (sender_name, sender_is_admin) = sender
            .map(|user| (user.name, user.is_admin))
            .unwrap_or_else(|| (UNKNOWN_SENDER_NAME.to_string(), false));

        let event = MessageEvent {
            id: message_id,
            conversation_id: conversation_id.clone(),
            sender_id,
            message,
            message_type,
            sender_name,
            is_admin: sender_is_admin,
            created_at: Utc::now().to_rfc3339(),
            status: "sent".to_string(),
        };

        // Room delivery: the conversation's visitors (sender included) plus
        // operators scoped into it.
        self.broadcast_to_conversation(&conversation_id, None, ServerEvent::NewMessage(event.clone()));

        // Visitor messages also reach operators who are NOT scoped into the
        // conversation, exactly once, with a dashboard refresh hint.
        if !sender_is_admin {
            for operator in self.operators.iter() {
                if !operator.joined.contains(&conversation_id) {
                    operator.sink.send(ServerEvent::NewMessage(event.clone()));
                    operator.sink.send(ServerEvent::ConversationUpdated {
                        conversation_id: conversation_id.clone(),
                    });
                }
            }
        }

        tracing::info!("Message sent in conversation {}", conversation_id);
    }

    /// Remove the connection from whichever registry holds it. A departing
    /// visitor is announced to all operators.
    pub async fn handle_disconnect(&self, connection_id: &str) {
        if let Some((_, visitor)) = self.visitors.remove(connection_id) {
            self.notify_operators(ServerEvent::UserOffline {
                user_id: visitor.user_id,
            });
        }
        self.operators.remove(connection_id);

        self.mark_session(connection_id, false).await;
    }

    pub fn online_visitor_count(&self) -> usize {
        self.visitors.len()
    }

    pub fn operator_count(&self) -> usize {
        self.operators.len()
    }

    fn online_visitors(&self) -> Vec<OnlineUser> {
        self.visitors
            .iter()
            .map(|visitor| OnlineUser {
                user_id: visitor.user_id.clone(),
                conversation_id: visitor.conversation_id.clone(),
            })
            .collect()
    }

    fn notify_operators(&self, event: ServerEvent) {
        for operator in self.operators.iter() {
            operator.sink.send(event.clone());
        }
    }

    fn broadcast_to_conversation(
        &self,
        conversation_id: &str,
        exclude_connection: Option<&str>,
        event: ServerEvent,
    ) {
        for visitor in self.visitors.iter() {
            if visitor.conversation_id == conversation_id
                && exclude_connection != Some(visitor.key().as_str())
            {
                visitor.sink.send(event.clone());
            }
        }
        for operator in self.operators.iter() {
            if operator.joined.contains(conversation_id)
                && exclude_connection != Some(operator.key().as_str())
            {
                operator.sink.send(event.clone());
            }
        }
    }

    async fn mark_session(&self, connection_id: &str, is_online: bool) {
        if let Err(err) = self.store.update_session_status(connection_id, is_online).await {
            tracing::error!("Failed to update session status: {}", err);
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chat::chat_models::{ChatError, ChatUser};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Sink that records everything sent to it.
    struct RecordingSink {
        events: Mutex<Vec<ServerEvent>>,
    }

    impl RecordingSink {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
            })
        }

        fn events(&self) -> Vec<ServerEvent> {
            self.events.lock().unwrap().clone()
        }

        fn count_new_messages(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, ServerEvent::NewMessage(_)))
                .count()
        }

        fn count_conversation_updates(&self) -> usize {
            self.events()
                .iter()
                .filter(|e| matches!(e, ServerEvent::ConversationUpdated { .. }))
                .count()
        }
    }

    impl EventSink for RecordingSink {
        fn send(&self, event: ServerEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    fn as_sink(sink: &Arc<RecordingSink>) -> Arc<dyn EventSink> {
        sink.clone() as Arc<dyn EventSink>
    }

    #[derive(Default)]
    struct MockChatStore {
        users: Mutex<HashMap<String, ChatUser>>,
        conversations: Mutex<Vec<(String, String)>>,
        messages: Mutex<Vec<NewMessage>>,
        statuses: Mutex<Vec<(i64, String)>>,
        fail_message_create: bool,
    }

    impl MockChatStore {
        fn with_user(self, id: &str, name: &str, is_admin: bool) -> Self {
            self.users.lock().unwrap().insert(
                id.to_string(),
                ChatUser {
                    id: id.to_string(),
                    name: name.to_string(),
                    email: None,
                    is_admin,
                },
            );
            self
        }
    }

    #[async_trait]
    impl ChatStore for MockChatStore {
        async fn create_user(&self, user: NewUser) -> Result<(), ChatError> {
            self.users.lock().unwrap().entry(user.id.clone()).or_insert(ChatUser {
                id: user.id,
                name: user.name,
                email: user.email,
                is_admin: user.is_admin,
            });
            Ok(())
        }

        async fn get_user_by_id(&self, id: &str) -> Result<Option<ChatUser>, ChatError> {
            Ok(self.users.lock().unwrap().get(id).cloned())
        }

        async fn create_conversation(&self, id: &str, user_id: &str) -> Result<(), ChatError> {
            let mut conversations = self.conversations.lock().unwrap();
            if !conversations.iter().any(|(cid, _)| cid == id) {
                conversations.push((id.to_string(), user_id.to_string()));
            }
            Ok(())
        }

        async fn create_message(&self, message: NewMessage) -> Result<i64, ChatError> {
            if self.fail_message_create {
                return Err(ChatError::Storage("disk full".to_string()));
            }
            let mut messages = self.messages.lock().unwrap();
            messages.push(message);
            Ok(messages.len() as i64)
        }

        async fn update_message_status(
            &self,
            message_id: i64,
            status: &str,
        ) -> Result<(), ChatError> {
            self.statuses.lock().unwrap().push((message_id, status.to_string()));
            Ok(())
        }

        async fn update_session_status(
            &self,
            _connection_id: &str,
            _is_online: bool,
        ) -> Result<(), ChatError> {
            Ok(())
        }
    }

    fn visitor_join(user_id: &str, conversation_id: &str) -> ClientEvent {
        ClientEvent::JoinChat {
            user_id: user_id.to_string(),
            conversation_id: Some(conversation_id.to_string()),
            is_admin: false,
            user_name: None,
            user_email: None,
        }
    }

    fn operator_join(user_id: &str) -> ClientEvent {
        ClientEvent::JoinChat {
            user_id: user_id.to_string(),
            conversation_id: None,
            is_admin: true,
            user_name: None,
            user_email: None,
        }
    }

    fn send_message(conversation_id: &str, sender_id: &str, message: &str) -> ClientEvent {
        ClientEvent::SendMessage {
            conversation_id: conversation_id.to_string(),
            sender_id: sender_id.to_string(),
            message: message.to_string(),
            message_type: "text".to_string(),
        }
    }

    #[tokio::test]
    async fn test_operator_join_receives_empty_online_users() {
        let router = ChatRouter::new(MockChatStore::default());
        let sink = RecordingSink::new();

        router.handle_event("op-1", &as_sink(&sink), operator_join("admin")).await;

        assert_eq!(sink.events(), vec![ServerEvent::OnlineUsers(vec![])]);
        assert_eq!(router.operator_count(), 1);
    }

    #[tokio::test]
    async fn test_visitor_join_notifies_operators_and_updates_snapshot() {
        let router = ChatRouter::new(MockChatStore::default());
        let op_sink = RecordingSink::new();
        router.handle_event("op-1", &as_sink(&op_sink), operator_join("admin")).await;

        let visitor_sink = RecordingSink::new();
        router
            .handle_event("v-1", &as_sink(&visitor_sink), visitor_join("u1", "c1"))
            .await;

        assert!(op_sink.events().contains(&ServerEvent::UserOnline {
            user_id: "u1".to_string(),
            conversation_id: "c1".to_string(),
        }));

        // A second operator joining now sees one online visitor.
        let late_sink = RecordingSink::new();
        router.handle_event("op-2", &as_sink(&late_sink), operator_join("admin2")).await;
        assert_eq!(
            late_sink.events(),
            vec![ServerEvent::OnlineUsers(vec![OnlineUser {
                user_id: "u1".to_string(),
                conversation_id: "c1".to_string(),
            }])]
        );
        assert_eq!(router.online_visitor_count(), 1);
    }

    #[tokio::test]
    async fn test_visitor_join_provisions_placeholder_user_and_conversation() {
        let store = MockChatStore::default();
        let router = ChatRouter::new(store);
        let sink = RecordingSink::new();

        router.handle_event("v-1", &as_sink(&sink), visitor_join("u1", "c1")).await;

        let users = router.store.users.lock().unwrap();
        assert_eq!(users["u1"].name, "Website Visitor");
        assert!(!users["u1"].is_admin);
        drop(users);

        let conversations = router.store.conversations.lock().unwrap();
        assert_eq!(conversations.as_slice(), &[("c1".to_string(), "u1".to_string())]);
    }

    #[tokio::test]
    async fn test_visitor_join_keeps_existing_user() {
        let store = MockChatStore::default().with_user("u1", "Ada", false);
        let router = ChatRouter::new(store);
        let sink = RecordingSink::new();

        router.handle_event("v-1", &as_sink(&sink), visitor_join("u1", "c1")).await;

        assert_eq!(router.store.users.lock().unwrap()["u1"].name, "Ada");
    }

    #[tokio::test]
    async fn test_message_delivered_once_per_operator() {
        // Two operators, one scoped into the conversation: the scoped one is
        // served by room delivery, the unscoped one by admin fan-out, and
        // neither sees the message twice.
        let store = MockChatStore::default().with_user("u1", "Ada", false);
        let router = ChatRouter::new(store);

        let scoped = RecordingSink::new();
        router.handle_event("op-1", &as_sink(&scoped), operator_join("a1")).await;
        router
            .handle_event(
                "op-1",
                &as_sink(&scoped),
                ClientEvent::AdminJoinConversation {
                    conversation_id: "conversation_42".to_string(),
                },
            )
            .await;

        let unscoped = RecordingSink::new();
        router.handle_event("op-2", &as_sink(&unscoped), operator_join("a2")).await;

        let visitor = RecordingSink::new();
        router
            .handle_event("v-1", &as_sink(&visitor), visitor_join("u1", "conversation_42"))
            .await;

        router
            .handle_event(
                "v-1",
                &as_sink(&visitor),
                send_message("conversation_42", "u1", "hello"),
            )
            .await;

        assert_eq!(scoped.count_new_messages(), 1);
        assert_eq!(scoped.count_conversation_updates(), 0);
        assert_eq!(unscoped.count_new_messages(), 1);
        assert_eq!(unscoped.count_conversation_updates(), 1);
        assert_eq!(visitor.count_new_messages(), 1);
    }

    #[tokio::test]
    async fn test_operator_message_skips_admin_fanout() {
        let store = MockChatStore::default()
            .with_user("u1", "Ada", false)
            .with_user("a1", "Support", true);
        let router = ChatRouter::new(store);

        let scoped = RecordingSink::new();
        router.handle_event("op-1", &as_sink(&scoped), operator_join("a1")).await;
        router
            .handle_event(
                "op-1",
                &as_sink(&scoped),
                ClientEvent::AdminJoinConversation {
                    conversation_id: "c1".to_string(),
                },
            )
            .await;

        let idle = RecordingSink::new();
        router.handle_event("op-2", &as_sink(&idle), operator_join("a2")).await;

        let visitor = RecordingSink::new();
        router.handle_event("v-1", &as_sink(&visitor), visitor_join("u1", "c1")).await;

        router
            .handle_event("op-1", &as_sink(&scoped), send_message("c1", "a1", "how can I help?"))
            .await;

        // The visitor and the scoped operator get the message; the idle
        // operator hears nothing about an operator-sent message.
        assert_eq!(visitor.count_new_messages(), 1);
        assert_eq!(scoped.count_new_messages(), 1);
        assert_eq!(idle.count_new_messages(), 0);
        assert_eq!(idle.count_conversation_updates(), 0);

        match visitor.events().iter().find(|e| matches!(e, ServerEvent::NewMessage(_))) {
            Some(ServerEvent::NewMessage(event)) => {
                assert_eq!(event.sender_name, "Support");
                assert!(event.is_admin);
                assert_eq!(event.status, "sent");
            }
            _ => panic!("visitor did not receive the message"),
        }
    }

    #[tokio::test]
    async fn test_send_message_validates_required_fields() {
        let router = ChatRouter::new(MockChatStore::default());
        let sink = RecordingSink::new();

        router
            .handle_event("v-1", &as_sink(&sink), send_message("c1", "u1", "   "))
            .await;

        assert_eq!(
            sink.events(),
            vec![ServerEvent::Error {
                message: "Missing required fields".to_string(),
            }]
        );
        assert!(router.store.messages.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_message_storage_failure_reports_error() {
        let store = MockChatStore {
            fail_message_create: true,
            ..Default::default()
        };
        let router = ChatRouter::new(store);
        let sink = RecordingSink::new();

        router.handle_event("v-1", &as_sink(&sink), send_message("c1", "u1", "hi")).await;

        assert_eq!(
            sink.events(),
            vec![ServerEvent::Error {
                message: "Failed to send message".to_string(),
            }]
        );
    }

    #[tokio::test]
    async fn test_unknown_sender_gets_placeholder_identity() {
        let router = ChatRouter::new(MockChatStore::default());

        let visitor = RecordingSink::new();
        router.handle_event("v-1", &as_sink(&visitor), visitor_join("u1", "c1")).await;

        // u2 never joined and has no user record.
        router
            .handle_event("v-1", &as_sink(&visitor), send_message("c1", "u2", "hello?"))
            .await;

        match visitor.events().iter().find(|e| matches!(e, ServerEvent::NewMessage(_))) {
            Some(ServerEvent::NewMessage(event)) => {
                assert_eq!(event.sender_name, "Unknown User");
                assert!(!event.is_admin);
            }
            _ => panic!("message was not delivered"),
        }
    }

    #[tokio::test]
    async fn test_typing_events_scoped_to_conversation_excluding_sender() {
        let router = ChatRouter::new(MockChatStore::default());

        let typist = RecordingSink::new();
        router.handle_event("v-1", &as_sink(&typist), visitor_join("u1", "c1")).await;

        let same_room = RecordingSink::new();
        router.handle_event("v-2", &as_sink(&same_room), visitor_join("u2", "c1")).await;

        let other_room = RecordingSink::new();
        router.handle_event("v-3", &as_sink(&other_room), visitor_join("u3", "c2")).await;

        router
            .handle_event(
                "v-1",
                &as_sink(&typist),
                ClientEvent::TypingStart {
                    conversation_id: "c1".to_string(),
                    user_name: Some("Ada".to_string()),
                },
            )
            .await;

        assert!(same_room.events().contains(&ServerEvent::UserTyping {
            user_name: Some("Ada".to_string()),
            conversation_id: "c1".to_string(),
        }));
        assert!(!typist.events().iter().any(|e| matches!(e, ServerEvent::UserTyping { .. })));
        assert!(!other_room.events().iter().any(|e| matches!(e, ServerEvent::UserTyping { .. })));
    }

    #[tokio::test]
    async fn test_message_read_updates_store() {
        let router = ChatRouter::new(MockChatStore::default());
        let sink = RecordingSink::new();

        router
            .handle_event("v-1", &as_sink(&sink), ClientEvent::MessageRead { message_id: 7 })
            .await;

        assert_eq!(
            router.store.statuses.lock().unwrap().as_slice(),
            &[(7, "read".to_string())]
        );
        // No acknowledgment is sent back.
        assert!(sink.events().is_empty());
    }

    #[tokio::test]
    async fn test_disconnect_visitor_notifies_operators() {
        let router = ChatRouter::new(MockChatStore::default());

        let op_sink = RecordingSink::new();
        router.handle_event("op-1", &as_sink(&op_sink), operator_join("admin")).await;

        let visitor = RecordingSink::new();
        router.handle_event("v-1", &as_sink(&visitor), visitor_join("u1", "c1")).await;
        assert_eq!(router.online_visitor_count(), 1);

        router.handle_disconnect("v-1").await;

        assert!(op_sink.events().contains(&ServerEvent::UserOffline {
            user_id: "u1".to_string(),
        }));
        assert_eq!(router.online_visitor_count(), 0);
    }

    #[tokio::test]
    async fn test_disconnect_operator_is_silent() {
        let router = ChatRouter::new(MockChatStore::default());

        let op_sink = RecordingSink::new();
        router.handle_event("op-1", &as_sink(&op_sink), operator_join("admin")).await;

        let other = RecordingSink::new();
        router.handle_event("op-2", &as_sink(&other), operator_join("admin2")).await;

        router.handle_disconnect("op-1").await;

        assert_eq!(router.operator_count(), 1);
        assert!(!other.events().iter().any(|e| matches!(e, ServerEvent::UserOffline { .. })));
    }

    #[tokio::test]
    async fn test_operator_can_leave_conversation_scope() {
        let store = MockChatStore::default().with_user("u1", "Ada", false);
        let router = ChatRouter::new(store);

        let op_sink = RecordingSink::new();
        router.handle_event("op-1", &as_sink(&op_sink), operator_join("a1")).await;
        router
            .handle_event(
                "op-1",
                &as_sink(&op_sink),
                ClientEvent::AdminJoinConversation {
                    conversation_id: "c1".to_string(),
                },
            )
            .await;
        router
            .handle_event(
                "op-1",
                &as_sink(&op_sink),
                ClientEvent::AdminLeaveConversation {
                    conversation_id: "c1".to_string(),
                },
            )
            .await;

        let visitor = RecordingSink::new();
        router.handle_event("v-1", &as_sink(&visitor), visitor_join("u1", "c1")).await;
        router
            .handle_event("v-1", &as_sink(&visitor), send_message("c1", "u1", "anyone there?"))
            .await;

        // After leaving the scope the operator is served by admin fan-out
        // again: one message plus the conversation_updated hint.
        assert_eq!(op_sink.count_new_messages(), 1);
        assert_eq!(op_sink.count_conversation_updates(), 1);
    }
}
