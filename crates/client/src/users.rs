use feishu_core::errors::PlatformError;
use serde_json::{json, Value};
use tracing::info;

use crate::http::{data_of, FeishuClient};

const MEMBERS_PAGE_SIZE: &str = "100";

fn str_field<'a>(item: &'a Value, key: &str) -> &'a str {
    item.get(key).and_then(Value::as_str).unwrap_or_default()
}

impl FeishuClient {
    /// Every member of a group chat as `{"name", "open_id", "user_id"}`,
    /// following `page_token` until the platform reports no more pages.
    pub async fn chat_members(&self, chat_id: &str) -> Result<Vec<Value>, PlatformError> {
        let path = format!("/open-apis/im/v1/chats/{chat_id}/members");
        let mut members = Vec::new();
        let mut page_token = String::new();

        loop {
            let data = {
                let mut query =
                    vec![("member_id_type", "open_id"), ("page_size", MEMBERS_PAGE_SIZE)];
                if !page_token.is_empty() {
                    query.push(("page_token", page_token.as_str()));
                }
                data_of(self.get(&path, &query).await?)
            };
            let items =
                data.get("items").and_then(Value::as_array).map(Vec::as_slice).unwrap_or_default();
            members.extend(items.iter().map(|item| {
                json!({
                    "name": str_field(item, "name"),
                    "open_id": str_field(item, "member_id"),
                    "user_id": str_field(item, "user_id"),
                })
            }));

            let has_more = data.get("has_more").and_then(Value::as_bool).unwrap_or(false);
            page_token = str_field(&data, "page_token").to_string();
            if !has_more || page_token.is_empty() {
                break;
            }
        }

        info!(chat_id, member_count = members.len(), "chat members fetched");
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use wiremock::matchers::{method, path, query_param, query_param_is_missing};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::http::FeishuClient;
    use crate::token::StaticToken;

    fn client(server: &MockServer) -> FeishuClient {
        FeishuClient::new(reqwest::Client::new(), server.uri(), Arc::new(StaticToken::new("t-test")))
    }

    fn ok(data: serde_json::Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({ "code": 0, "msg": "success", "data": data }))
    }

    #[tokio::test]
    async fn members_are_collected_across_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/open-apis/im/v1/chats/oc_team/members"))
            .and(query_param("member_id_type", "open_id"))
            .and(query_param_is_missing("page_token"))
            .respond_with(ok(json!({
                "items": [{ "name": "Alice", "member_id": "ou_a" }],
                "has_more": true,
                "page_token": "p2"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/open-apis/im/v1/chats/oc_team/members"))
            .and(query_param("page_token", "p2"))
            .respond_with(ok(json!({
                "items": [{ "name": "Bob", "member_id": "ou_b", "user_id": "u_b" }],
                "has_more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let members = client(&server).chat_members("oc_team").await.expect("members");

        assert_eq!(
            members,
            vec![
                json!({ "name": "Alice", "open_id": "ou_a", "user_id": "" }),
                json!({ "name": "Bob", "open_id": "ou_b", "user_id": "u_b" }),
            ]
        );
    }

    #[tokio::test]
    async fn has_more_without_token_stops_paging() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/open-apis/im/v1/chats/oc_x/members"))
            .respond_with(ok(json!({ "items": [], "has_more": true, "page_token": "" })))
            .expect(1)
            .mount(&server)
            .await;

        let members = client(&server).chat_members("oc_x").await.expect("members");

        assert!(members.is_empty());
    }
}
