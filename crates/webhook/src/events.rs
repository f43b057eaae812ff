use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use feishu_core::errors::PlatformError;
use feishu_core::platform::{
    MessageSender, MessageTarget, OutgoingMessage, PermissionGranter, PermissionLevel,
    PermissionMember,
};
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

pub const MESSAGE_RECEIVED_EVENT: &str = "im.message.receive_v1";
/// Permission events arrive under several versioned names sharing this stem.
pub const PERMISSION_EVENT_MARKER: &str = "drive.file.permission";
pub const UNKNOWN_EVENT_TYPE: &str = "unknown";
pub const DEFAULT_FILE_TYPE: &str = "docx";
pub const PERMISSION_GRANTED_NOTICE: &str =
    "You have been granted view access to the document. Click the link to visit.";
const LOGGED_TEXT_CHARS: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageReceived,
    PermissionRequest,
    Unrecognized,
}

impl EventKind {
    /// Kinds that must have a handler before the router accepts traffic.
    pub const ROUTABLE: [EventKind; 2] = [Self::MessageReceived, Self::PermissionRequest];

    pub fn classify(event_type: &str) -> Self {
        if event_type == MESSAGE_RECEIVED_EVENT {
            Self::MessageReceived
        } else if event_type.contains(PERMISSION_EVENT_MARKER) {
            Self::PermissionRequest
        } else {
            Self::Unrecognized
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MessageReceived => "message_received",
            Self::PermissionRequest => "permission_request",
            Self::Unrecognized => "unrecognized",
        }
    }
}

/// `header.event_type` (v2 schema), then `event.type` (v1), then `"unknown"`.
pub fn event_type_of(payload: &Value) -> String {
    fn non_empty(value: Option<&Value>) -> Option<&str> {
        value.and_then(Value::as_str).filter(|event_type| !event_type.is_empty())
    }

    non_empty(payload.pointer("/header/event_type"))
        .or_else(|| non_empty(payload.pointer("/event/type")))
        .unwrap_or(UNKNOWN_EVENT_TYPE)
        .to_owned()
}

/// A decoded push that passed signature verification.
#[derive(Clone, Debug, PartialEq)]
pub struct VerifiedEvent {
    pub event_type: String,
    pub kind: EventKind,
    pub payload: Value,
}

impl VerifiedEvent {
    pub fn from_payload(payload: Value) -> Self {
        let event_type = event_type_of(&payload);
        let kind = EventKind::classify(&event_type);
        Self { event_type, kind, payload }
    }
}

fn str_at<'a>(payload: &'a Value, pointer: &str) -> &'a str {
    payload.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageReceivedEvent {
    pub chat_id: String,
    pub message_id: String,
    pub sender_open_id: String,
    pub message_type: String,
    pub text: String,
}

impl MessageReceivedEvent {
    pub fn from_payload(payload: &Value) -> Self {
        Self {
            chat_id: str_at(payload, "/event/message/chat_id").to_owned(),
            message_id: str_at(payload, "/event/message/message_id").to_owned(),
            sender_open_id: str_at(payload, "/event/sender/sender_id/open_id").to_owned(),
            message_type: str_at(payload, "/event/message/message_type").to_owned(),
            text: message_text(str_at(payload, "/event/message/content")),
        }
    }
}

/// `content` is itself JSON, e.g. `{"text":"@_user_1 hello"}`. Anything
/// undecodable yields empty text.
fn message_text(content: &str) -> String {
    serde_json::from_str::<Value>(content)
        .ok()
        .and_then(|content| content.get("text").and_then(Value::as_str).map(str::trim).map(str::to_owned))
        .unwrap_or_default()
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PermissionRequestEvent {
    pub file_token: String,
    pub file_type: String,
    pub requester_open_id: String,
}

impl PermissionRequestEvent {
    /// `None` when the file token or requester is missing.
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let file_token = str_at(payload, "/event/file_token");
        let requester_open_id = str_at(payload, "/event/operator/open_id");
        if file_token.is_empty() || requester_open_id.is_empty() {
            return None;
        }

        let file_type = match str_at(payload, "/event/file_type") {
            "" => DEFAULT_FILE_TYPE,
            file_type => file_type,
        };
        Some(Self {
            file_token: file_token.to_owned(),
            file_type: file_type.to_owned(),
            requester_open_id: requester_open_id.to_owned(),
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl EventContext {
    pub fn generate() -> Self {
        Self { correlation_id: Uuid::new_v4().to_string() }
    }
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("permission grant failed: {0}")]
    Grant(#[source] PlatformError),
    #[error("requester notification failed: {0}")]
    Notify(#[source] PlatformError),
    #[error("inbound message handler failure: {0}")]
    InboundMessage(String),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
    #[error("no handler registered for event kinds: {0:?}")]
    MissingHandlers(Vec<EventKind>),
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_kind(&self) -> EventKind;
    async fn handle(
        &self,
        event: &VerifiedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_kind(), Arc::new(handler));
    }

    pub async fn dispatch(
        &self,
        event: &VerifiedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        let Some(handler) = self.handlers.get(&event.kind) else {
            return Ok(HandlerResult::Ignored);
        };

        handler.handle(event, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Fails if a routable kind has no handler.
    pub fn validate(&self) -> Result<(), DispatchError> {
        let missing: Vec<EventKind> = EventKind::ROUTABLE
            .into_iter()
            .filter(|kind| !self.handlers.contains_key(kind))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(DispatchError::MissingHandlers(missing))
        }
    }
}

pub fn default_dispatcher(
    granter: Arc<dyn PermissionGranter>,
    sender: Arc<dyn MessageSender>,
) -> EventDispatcher {
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageReceivedHandler::new(LoggingMessageService));
    dispatcher.register(PermissionRequestHandler::new(granter, sender));
    dispatcher
}

#[async_trait]
pub trait InboundMessageService: Send + Sync {
    async fn handle_message(
        &self,
        message: &MessageReceivedEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError>;
}

pub struct MessageReceivedHandler<S> {
    service: S,
}

impl<S> MessageReceivedHandler<S>
where
    S: InboundMessageService,
{
    pub fn new(service: S) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<S> EventHandler for MessageReceivedHandler<S>
where
    S: InboundMessageService + 'static,
{
    fn event_kind(&self) -> EventKind {
        EventKind::MessageReceived
    }

    async fn handle(
        &self,
        event: &VerifiedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let message = MessageReceivedEvent::from_payload(&event.payload);
        self.service.handle_message(&message, ctx).await?;
        Ok(HandlerResult::Processed)
    }
}

/// Records inbound messages without acting on them.
pub struct LoggingMessageService;

#[async_trait]
impl InboundMessageService for LoggingMessageService {
    async fn handle_message(
        &self,
        message: &MessageReceivedEvent,
        ctx: &EventContext,
    ) -> Result<(), EventHandlerError> {
        let preview: String = message.text.chars().take(LOGGED_TEXT_CHARS).collect();
        info!(
            event_name = "webhook.message.received",
            correlation_id = %ctx.correlation_id,
            chat_id = %message.chat_id,
            message_id = %message.message_id,
            sender = %message.sender_open_id,
            text = %preview,
            "received message"
        );
        Ok(())
    }
}

/// Grants `view` to whoever asked for access, then tells them by DM.
pub struct PermissionRequestHandler {
    granter: Arc<dyn PermissionGranter>,
    sender: Arc<dyn MessageSender>,
}

impl PermissionRequestHandler {
    pub fn new(granter: Arc<dyn PermissionGranter>, sender: Arc<dyn MessageSender>) -> Self {
        Self { granter, sender }
    }
}

#[async_trait]
impl EventHandler for PermissionRequestHandler {
    fn event_kind(&self) -> EventKind {
        EventKind::PermissionRequest
    }

    async fn handle(
        &self,
        event: &VerifiedEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let Some(request) = PermissionRequestEvent::from_payload(&event.payload) else {
            warn!(
                event_name = "webhook.permission.missing_fields",
                correlation_id = %ctx.correlation_id,
                event_type = %event.event_type,
                "permission event missing file_token or operator open_id"
            );
            return Ok(HandlerResult::Ignored);
        };

        info!(
            event_name = "webhook.permission.requested",
            correlation_id = %ctx.correlation_id,
            file_token = %request.file_token,
            requester = %request.requester_open_id,
            "processing permission request"
        );

        let member = PermissionMember::User(request.requester_open_id.clone());
        self.granter
            .grant_permission(&request.file_token, &request.file_type, &member, PermissionLevel::View)
            .await
            .map_err(EventHandlerError::Grant)?;

        self.sender
            .send_message(
                &MessageTarget::open_id(request.requester_open_id.clone()),
                &OutgoingMessage::text(PERMISSION_GRANTED_NOTICE),
            )
            .await
            .map_err(EventHandlerError::Notify)?;

        info!(
            event_name = "webhook.permission.granted",
            correlation_id = %ctx.correlation_id,
            requester = %request.requester_open_id,
            "permission granted and requester notified"
        );
        Ok(HandlerResult::Processed)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use feishu_core::errors::PlatformError;
    use feishu_core::platform::{
        MessageSender, MessageTarget, OutgoingMessage, PermissionGranter, PermissionLevel,
        PermissionMember, ReceiveIdType,
    };
    use serde_json::{json, Value};

    use super::{
        default_dispatcher, event_type_of, DispatchError, EventContext, EventDispatcher,
        EventHandlerError, EventKind, HandlerResult, MessageReceivedEvent, VerifiedEvent,
        PERMISSION_GRANTED_NOTICE,
    };

    /// Records grant and notify calls in order.
    #[derive(Default)]
    pub(crate) struct FakePlatform {
        pub calls: Mutex<Vec<String>>,
        pub fail_grant: bool,
    }

    impl FakePlatform {
        pub fn calls(&self) -> Vec<String> {
            self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
        }

        fn record(&self, call: String) {
            if let Ok(mut calls) = self.calls.lock() {
                calls.push(call);
            }
        }
    }

    #[async_trait]
    impl PermissionGranter for FakePlatform {
        async fn grant_permission(
            &self,
            file_token: &str,
            file_type: &str,
            member: &PermissionMember,
            level: PermissionLevel,
        ) -> Result<Value, PlatformError> {
            self.record(format!(
                "grant {file_token} {file_type} {} {} {level}",
                member.member_type(),
                member.member_id()
            ));
            if self.fail_grant {
                return Err(PlatformError::Api {
                    path: "/members".to_owned(),
                    code: 1063002,
                    msg: "permission denied".to_owned(),
                });
            }
            Ok(json!({}))
        }
    }

    #[async_trait]
    impl MessageSender for FakePlatform {
        async fn send_message(
            &self,
            target: &MessageTarget,
            message: &OutgoingMessage,
        ) -> Result<String, PlatformError> {
            assert_eq!(target.id_type, ReceiveIdType::OpenId);
            self.record(format!("notify {} {}", target.id, message.content));
            Ok("om_1".to_owned())
        }
    }

    pub(crate) fn dispatcher_with(platform: &Arc<FakePlatform>) -> EventDispatcher {
        default_dispatcher(platform.clone(), platform.clone())
    }

    fn permission_event(event: Value) -> VerifiedEvent {
        VerifiedEvent::from_payload(json!({
            "header": { "event_type": "drive.file.permission_member_applied_v1" },
            "event": event
        }))
    }

    #[test]
    fn classification_is_exact_for_messages_and_substring_for_permissions() {
        assert_eq!(EventKind::classify("im.message.receive_v1"), EventKind::MessageReceived);
        assert_eq!(EventKind::classify("im.message.receive_v2"), EventKind::Unrecognized);
        assert_eq!(
            EventKind::classify("drive.file.permission_member_applied_v1"),
            EventKind::PermissionRequest
        );
        assert_eq!(EventKind::classify("unknown"), EventKind::Unrecognized);
    }

    #[test]
    fn event_type_falls_back_from_header_to_event_to_unknown() {
        assert_eq!(event_type_of(&json!({ "header": { "event_type": "a" } })), "a");
        assert_eq!(
            event_type_of(&json!({ "header": { "event_type": "" }, "event": { "type": "b" } })),
            "b"
        );
        assert_eq!(event_type_of(&json!({ "event": {} })), "unknown");
        assert_eq!(event_type_of(&json!({ "header": 5 })), "unknown");
    }

    #[test]
    fn message_fields_are_extracted_and_text_trimmed() {
        let message = MessageReceivedEvent::from_payload(&json!({
            "event": {
                "sender": { "sender_id": { "open_id": "ou_sender" } },
                "message": {
                    "chat_id": "oc_1",
                    "message_id": "om_1",
                    "message_type": "text",
                    "content": "{\"text\":\"  hello bot  \"}"
                }
            }
        }));

        assert_eq!(message.chat_id, "oc_1");
        assert_eq!(message.message_id, "om_1");
        assert_eq!(message.sender_open_id, "ou_sender");
        assert_eq!(message.text, "hello bot");
    }

    #[test]
    fn undecodable_message_content_yields_empty_text() {
        let message = MessageReceivedEvent::from_payload(&json!({
            "event": { "message": { "content": "not json" } }
        }));
        assert_eq!(message.text, "");
        assert_eq!(message.chat_id, "");
    }

    #[tokio::test]
    async fn permission_request_grants_view_then_notifies() {
        let platform = Arc::new(FakePlatform::default());
        let dispatcher = dispatcher_with(&platform);
        let event = permission_event(json!({
            "file_token": "doxA",
            "operator": { "open_id": "ou_req" }
        }));

        let result = dispatcher.dispatch(&event, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Processed);
        let calls = platform.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], "grant doxA docx openid ou_req view");
        assert!(calls[1].starts_with("notify ou_req "));
        assert!(calls[1].contains(PERMISSION_GRANTED_NOTICE));
    }

    #[tokio::test]
    async fn permission_request_without_requester_is_ignored() {
        let platform = Arc::new(FakePlatform::default());
        let dispatcher = dispatcher_with(&platform);
        let event = permission_event(json!({ "file_token": "doxA", "file_type": "sheet" }));

        let result = dispatcher.dispatch(&event, &EventContext::default()).await.expect("dispatch");

        assert_eq!(result, HandlerResult::Ignored);
        assert!(platform.calls().is_empty());
    }

    #[tokio::test]
    async fn failed_grant_skips_notification() {
        let platform = Arc::new(FakePlatform { fail_grant: true, ..FakePlatform::default() });
        let dispatcher = dispatcher_with(&platform);
        let event = permission_event(json!({
            "file_token": "doxA",
            "file_type": "sheet",
            "operator": { "open_id": "ou_req" }
        }));

        let error = dispatcher.dispatch(&event, &EventContext::default()).await;

        assert!(matches!(error, Err(DispatchError::Handler(EventHandlerError::Grant(_)))));
        assert_eq!(platform.calls(), vec!["grant doxA sheet openid ou_req view".to_owned()]);
    }

    #[tokio::test]
    async fn unrecognized_events_are_ignored() {
        let platform = Arc::new(FakePlatform::default());
        let event = VerifiedEvent::from_payload(json!({ "header": { "event_type": "x.y" } }));

        let result =
            dispatcher_with(&platform).dispatch(&event, &EventContext::default()).await.expect("ok");

        assert_eq!(result, HandlerResult::Ignored);
    }

    #[test]
    fn default_dispatcher_covers_every_routable_kind() {
        let platform = Arc::new(FakePlatform::default());
        let dispatcher = dispatcher_with(&platform);
        assert_eq!(dispatcher.handler_count(), 2);
        assert_eq!(dispatcher.validate(), Ok(()));
    }

    #[test]
    fn empty_dispatcher_reports_missing_handlers() {
        assert_eq!(
            EventDispatcher::new().validate(),
            Err(DispatchError::MissingHandlers(vec![
                EventKind::MessageReceived,
                EventKind::PermissionRequest
            ]))
        );
    }

    #[test]
    fn generated_contexts_are_unique() {
        assert_ne!(EventContext::generate(), EventContext::generate());
    }
}
