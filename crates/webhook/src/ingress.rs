//! Per-request event routing: verify, decode, handshake, classify, dispatch.
//! An optional verification token gate sits between handshake and classify.

use std::sync::Arc;

use feishu_core::errors::FailureClass;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::events::{EventContext, EventDispatcher, EventKind, HandlerResult, VerifiedEvent};
use crate::verify::{constant_time_eq, verify};

/// Raw push as received. Missing headers are passed as empty strings.
#[derive(Clone, Copy, Debug)]
pub struct InboundRequest<'a> {
    pub timestamp: &'a str,
    pub nonce: &'a str,
    pub signature: &'a str,
    pub body: &'a [u8],
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum IngressRejection {
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Invalid JSON")]
    MalformedBody,
}

impl IngressRejection {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Unauthorized => FailureClass::Authentication,
            Self::MalformedBody => FailureClass::MalformedInput,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum IngressOutcome {
    /// URL verification handshake; the value is echoed back.
    Challenge(Value),
    Accepted {
        correlation_id: String,
        event_type: String,
        kind: EventKind,
        /// `None` when the handler failed; the failure is logged only.
        result: Option<HandlerResult>,
    },
}

impl IngressOutcome {
    pub fn response_body(&self) -> Value {
        match self {
            Self::Challenge(challenge) => json!({ "challenge": challenge }),
            Self::Accepted { .. } => json!({ "code": 0 }),
        }
    }
}

pub struct EventIngress {
    signing_secret: Option<SecretString>,
    verification_token: Option<SecretString>,
    dispatcher: Arc<EventDispatcher>,
}

fn non_empty(secret: Option<SecretString>) -> Option<SecretString> {
    secret.filter(|secret| !secret.expose_secret().is_empty())
}

/// `header.token` in v2 event envelopes, top-level `token` in v1 events and
/// url verification requests.
fn payload_token(payload: &Value) -> Option<&str> {
    payload
        .pointer("/header/token")
        .or_else(|| payload.get("token"))
        .and_then(Value::as_str)
}

impl EventIngress {
    pub fn new(signing_secret: Option<SecretString>, dispatcher: EventDispatcher) -> Self {
        Self {
            signing_secret: non_empty(signing_secret),
            verification_token: None,
            dispatcher: Arc::new(dispatcher),
        }
    }

    /// Additionally require event payloads to carry a matching verification
    /// token. The url verification challenge is always answered first.
    pub fn with_verification_token(mut self, token: Option<SecretString>) -> Self {
        self.verification_token = non_empty(token);
        self
    }

    /// True when pushes are accepted without a signature check.
    pub fn open_mode(&self) -> bool {
        self.signing_secret.is_none()
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub async fn process(
        &self,
        request: InboundRequest<'_>,
    ) -> Result<IngressOutcome, IngressRejection> {
        let secret = self.signing_secret.as_ref().map(|secret| secret.expose_secret());
        if !verify(request.timestamp, request.nonce, secret, request.body, request.signature) {
            warn!(
                event_name = "webhook.signature.rejected",
                timestamp = request.timestamp,
                "signature verification failed, rejecting request"
            );
            return Err(IngressRejection::Unauthorized);
        }

        let payload = match serde_json::from_slice::<Value>(request.body) {
            Ok(payload @ Value::Object(_)) => payload,
            Ok(_) | Err(_) => {
                warn!(event_name = "webhook.body.malformed", "rejecting non-object JSON body");
                return Err(IngressRejection::MalformedBody);
            }
        };

        if let Some(challenge) = payload.get("challenge") {
            info!(event_name = "webhook.challenge", "answering url verification challenge");
            return Ok(IngressOutcome::Challenge(challenge.clone()));
        }

        if let Some(expected) = &self.verification_token {
            let supplied = payload_token(&payload).unwrap_or_default();
            if !constant_time_eq(expected.expose_secret().as_bytes(), supplied.as_bytes()) {
                warn!(
                    event_name = "webhook.token.rejected",
                    "verification token mismatch, rejecting request"
                );
                return Err(IngressRejection::Unauthorized);
            }
        }

        let ctx = EventContext::generate();
        let event = VerifiedEvent::from_payload(payload);
        info!(
            event_name = "webhook.event.received",
            correlation_id = %ctx.correlation_id,
            event_type = %event.event_type,
            kind = event.kind.as_str(),
            "received platform event"
        );

        let result = if event.kind == EventKind::Unrecognized {
            debug!(
                correlation_id = %ctx.correlation_id,
                event_type = %event.event_type,
                "unhandled event type"
            );
            Some(HandlerResult::Ignored)
        } else {
            match self.dispatcher.dispatch(&event, &ctx).await {
                Ok(result) => Some(result),
                Err(dispatch_error) => {
                    error!(
                        event_name = "webhook.event.handler_failed",
                        correlation_id = %ctx.correlation_id,
                        event_type = %event.event_type,
                        error = %dispatch_error,
                        "event handler failed"
                    );
                    None
                }
            }
        };

        Ok(IngressOutcome::Accepted {
            correlation_id: ctx.correlation_id,
            event_type: event.event_type,
            kind: event.kind,
            result,
        })
    }
}
