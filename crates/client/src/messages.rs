use async_trait::async_trait;
use feishu_core::errors::PlatformError;
use feishu_core::platform::{MessageSender, MessageTarget, OutgoingMessage};
use serde_json::{json, Value};
use tracing::info;

use crate::http::{data_of, FeishuClient};

const MESSAGES_PATH: &str = "/open-apis/im/v1/messages";

fn message_id(path: &str, data: &Value) -> Result<String, PlatformError> {
    data.get("message_id").and_then(Value::as_str).map(str::to_string).ok_or_else(|| {
        PlatformError::Decode {
            path: path.to_string(),
            message: "response data has no `message_id`".to_string(),
        }
    })
}

impl FeishuClient {
    /// Returns the `data` object of the created message.
    pub async fn post_message(
        &self,
        target: &MessageTarget,
        message: &OutgoingMessage,
    ) -> Result<Value, PlatformError> {
        let body = json!({
            "receive_id": target.id,
            "msg_type": message.msg_type.as_str(),
            "content": message.content
        });
        let query = [("receive_id_type", target.id_type.as_str())];
        let data = data_of(self.post(MESSAGES_PATH, &query, &body).await?);
        info!(
            receive_id_type = target.id_type.as_str(),
            message_id = ?data.get("message_id"),
            "message sent"
        );
        Ok(data)
    }

    /// Sends an interactive card; see [`OutgoingMessage::card`].
    pub async fn send_card_message(
        &self,
        target: &MessageTarget,
        card: &Value,
    ) -> Result<Value, PlatformError> {
        self.post_message(target, &OutgoingMessage::card(card)).await
    }

    pub async fn reply_message(
        &self,
        message_id: &str,
        message: &OutgoingMessage,
    ) -> Result<Value, PlatformError> {
        let path = format!("{MESSAGES_PATH}/{message_id}/reply");
        let body = json!({ "msg_type": message.msg_type.as_str(), "content": message.content });
        let data = data_of(self.post(&path, &[], &body).await?);
        info!(reply_to = message_id, message_id = ?data.get("message_id"), "reply sent");
        Ok(data)
    }
}

#[async_trait]
impl MessageSender for FeishuClient {
    async fn send_message(
        &self,
        target: &MessageTarget,
        message: &OutgoingMessage,
    ) -> Result<String, PlatformError> {
        let data = self.post_message(target, message).await?;
        message_id(MESSAGES_PATH, &data)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use feishu_core::errors::PlatformError;
    use feishu_core::platform::{MessageSender, MessageTarget, OutgoingMessage};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::http::FeishuClient;
    use crate::token::StaticToken;

    fn client(server: &MockServer) -> FeishuClient {
        FeishuClient::new(reqwest::Client::new(), server.uri(), Arc::new(StaticToken::new("t-test")))
    }

    #[tokio::test]
    async fn send_message_posts_receive_id_type_and_returns_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/im/v1/messages"))
            .and(query_param("receive_id_type", "open_id"))
            .and(body_json(json!({
                "receive_id": "ou_1",
                "msg_type": "text",
                "content": "{\"text\":\"hi\"}"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "code": 0, "data": { "message_id": "om_1" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let message_id = client(&server)
            .send_message(&MessageTarget::open_id("ou_1"), &OutgoingMessage::text("hi"))
            .await
            .expect("sent");

        assert_eq!(message_id, "om_1");
    }

    #[tokio::test]
    async fn reply_goes_to_the_thread_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/im/v1/messages/om_parent/reply"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "code": 0, "data": { "message_id": "om_child" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let data = client(&server)
            .reply_message("om_parent", &OutgoingMessage::text("ack"))
            .await
            .expect("replied");

        assert_eq!(data["message_id"], "om_child");
    }

    #[tokio::test]
    async fn card_is_sent_as_interactive_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/im/v1/messages"))
            .and(query_param("receive_id_type", "chat_id"))
            .and(body_json(json!({
                "receive_id": "oc_1",
                "msg_type": "interactive",
                "content": "{\"elements\":[]}"
            })))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "code": 0, "data": { "message_id": "om_card" } })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let data = client(&server)
            .send_card_message(&MessageTarget::chat("oc_1"), &json!({ "elements": [] }))
            .await
            .expect("sent");

        assert_eq!(data["message_id"], "om_card");
    }

    #[tokio::test]
    async fn missing_message_id_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/open-apis/im/v1/messages"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "data": {} })))
            .mount(&server)
            .await;

        let error = client(&server)
            .send_message(&MessageTarget::chat("oc_1"), &OutgoingMessage::text("hi"))
            .await
            .expect_err("no id");

        assert!(matches!(error, PlatformError::Decode { .. }));
    }
}
