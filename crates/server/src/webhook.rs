use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use feishu_webhook::{
    EventIngress, InboundRequest, IngressRejection, NONCE_HEADER, SIGNATURE_HEADER,
    TIMESTAMP_HEADER,
};

pub const WEBHOOK_PATH: &str = "/webhook/feishu";

#[derive(Clone)]
pub struct WebhookState {
    ingress: Arc<EventIngress>,
}

pub fn router(ingress: Arc<EventIngress>) -> Router {
    Router::new().route(WEBHOOK_PATH, post(receive_event)).with_state(WebhookState { ingress })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|value| value.to_str().ok()).unwrap_or_default()
}

pub async fn receive_event(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = InboundRequest {
        timestamp: header_str(&headers, TIMESTAMP_HEADER),
        nonce: header_str(&headers, NONCE_HEADER),
        signature: header_str(&headers, SIGNATURE_HEADER),
        body: &body,
    };

    match state.ingress.process(request).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome.response_body())).into_response(),
        Err(rejection) => {
            let status = match rejection {
                IngressRejection::Unauthorized => StatusCode::UNAUTHORIZED,
                IngressRejection::MalformedBody => StatusCode::BAD_REQUEST,
            };
            (status, rejection.to_string()).into_response()
        }
    }
}
