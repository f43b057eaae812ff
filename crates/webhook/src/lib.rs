//! Inbound platform events: signature verification and routing to handlers.
//!
//! Transport-agnostic: the HTTP surface lives in `feishu-server`, which feeds
//! raw headers and body into [`EventIngress::process`].

pub mod events;
pub mod ingress;
pub mod verify;

pub use events::{
    default_dispatcher, DispatchError, EventContext, EventDispatcher, EventHandler,
    EventHandlerError, EventKind, HandlerResult, InboundMessageService, LoggingMessageService,
    MessageReceivedEvent, MessageReceivedHandler, PermissionRequestEvent,
    PermissionRequestHandler, VerifiedEvent,
};
pub use ingress::{EventIngress, InboundRequest, IngressOutcome, IngressRejection};
pub use verify::{verify, NONCE_HEADER, SIGNATURE_HEADER, TIMESTAMP_HEADER};
