use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use feishu_webhook::EventIngress;
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    ingress: Arc<EventIngress>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub event_router: HealthCheck,
    pub signature_verification: HealthCheck,
    pub checked_at: String,
}

pub fn router(ingress: Arc<EventIngress>) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { ingress })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let event_router = router_check(&state.ingress);
    let ready = event_router.status == "ready";

    let signature_verification = if state.ingress.open_mode() {
        HealthCheck { status: "disabled", detail: "no encrypt key configured".to_string() }
    } else {
        HealthCheck { status: "ready", detail: "sha256 signatures enforced".to_string() }
    };

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "feishu-server runtime initialized".to_string(),
        },
        event_router,
        signature_verification,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

fn router_check(ingress: &EventIngress) -> HealthCheck {
    let dispatcher = ingress.dispatcher();
    match dispatcher.validate() {
        Ok(()) => HealthCheck {
            status: "ready",
            detail: format!("{} event handlers registered", dispatcher.handler_count()),
        },
        Err(error) => HealthCheck { status: "degraded", detail: error.to_string() },
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::{extract::State, http::StatusCode, Json};
    use feishu_core::errors::PlatformError;
    use feishu_core::platform::{
        MessageSender, MessageTarget, OutgoingMessage, PermissionGranter, PermissionLevel,
        PermissionMember,
    };
    use feishu_webhook::{default_dispatcher, EventDispatcher, EventIngress};
    use serde_json::{json, Value};

    use crate::health::{health, HealthState};

    struct NullPlatform;

    #[async_trait]
    impl PermissionGranter for NullPlatform {
        async fn grant_permission(
            &self,
            _file_token: &str,
            _file_type: &str,
            _member: &PermissionMember,
            _level: PermissionLevel,
        ) -> Result<Value, PlatformError> {
            Ok(json!({}))
        }
    }

    #[async_trait]
    impl MessageSender for NullPlatform {
        async fn send_message(
            &self,
            _target: &MessageTarget,
            _message: &OutgoingMessage,
        ) -> Result<String, PlatformError> {
            Ok("om_0".to_string())
        }
    }

    #[tokio::test]
    async fn health_is_ready_with_complete_dispatcher() {
        let platform = Arc::new(NullPlatform);
        let ingress = EventIngress::new(
            Some("enc-key".to_string().into()),
            default_dispatcher(platform.clone(), platform),
        );

        let (status, Json(payload)) = health(State(HealthState { ingress: Arc::new(ingress) })).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.status, "ready");
        assert_eq!(payload.event_router.detail, "2 event handlers registered");
        assert_eq!(payload.signature_verification.status, "ready");
    }

    #[tokio::test]
    async fn health_is_degraded_without_handlers() {
        let ingress = EventIngress::new(None, EventDispatcher::new());

        let (status, Json(payload)) = health(State(HealthState { ingress: Arc::new(ingress) })).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.signature_verification.status, "disabled");
        assert_eq!(payload.service.status, "ready");
    }
}
