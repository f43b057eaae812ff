use std::sync::Arc;
use std::time::Duration;

use feishu_core::config::FeishuConfig;
use feishu_core::errors::PlatformError;
use feishu_core::platform::AccessTokenSource;
use reqwest::multipart::Form;
use reqwest::{Method, Response};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use tracing::debug;

use crate::token::TenantTokenCache;

/// Authenticated REST client for the open platform.
///
/// Every call goes through [`decode_envelope`], so callers only ever see the
/// `{"code": 0, ...}` envelope of a successful request.
#[derive(Clone)]
pub struct FeishuClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn AccessTokenSource>,
}

impl FeishuClient {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, tokens }
    }

    /// Builds the HTTP client and a tenant token cache from configuration.
    pub fn from_config(config: &FeishuConfig) -> Result<Self, PlatformError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|error| PlatformError::Transport {
                path: config.base_url.clone(),
                message: format!("failed to build http client: {error}"),
            })?;

        let tokens = TenantTokenCache::new(
            http.clone(),
            config.base_url.clone(),
            config.app_id.clone(),
            config.app_secret.clone(),
        );
        Ok(Self::new(http, config.base_url.clone(), Arc::new(tokens)))
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) async fn get(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Value, PlatformError> {
        self.send(Method::GET, path, query, None).await
    }

    pub(crate) async fn post(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, PlatformError> {
        self.send(Method::POST, path, query, Some(body)).await
    }

    pub(crate) async fn patch(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: &Value,
    ) -> Result<Value, PlatformError> {
        self.send(Method::PATCH, path, query, Some(body)).await
    }

    /// `multipart/form-data` POST, used by drive uploads.
    pub(crate) async fn post_form(&self, path: &str, form: Form) -> Result<Value, PlatformError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}{path}", self.base_url);

        debug!(method = "POST", path, "uploading to platform api");
        let response = self
            .http
            .post(&url)
            .bearer_auth(token.expose_secret())
            .multipart(form)
            .send()
            .await
            .map_err(|error| transport(path, &error))?;

        read_envelope(path, response).await
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, PlatformError> {
        let token = self.tokens.access_token().await?;
        let url = format!("{}{path}", self.base_url);

        debug!(method = %method, path, "calling platform api");
        let mut request =
            self.http.request(method, &url).bearer_auth(token.expose_secret()).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|error| transport(path, &error))?;

        read_envelope(path, response).await
    }
}

pub(crate) fn transport(path: &str, error: &reqwest::Error) -> PlatformError {
    PlatformError::Transport { path: path.to_string(), message: error.to_string() }
}

pub(crate) async fn read_envelope(path: &str, response: Response) -> Result<Value, PlatformError> {
    let status = response.status().as_u16();
    let body = response.bytes().await.map_err(|error| transport(path, &error))?;
    decode_envelope(path, status, &body)
}

/// The body is decoded before the status is looked at, so platform error
/// codes survive HTTP 4xx/5xx responses.
pub fn decode_envelope(path: &str, status: u16, body: &[u8]) -> Result<Value, PlatformError> {
    let envelope: Value = serde_json::from_slice(body).map_err(|_| PlatformError::Transport {
        path: path.to_string(),
        message: format!("HTTP {status}, non-JSON body"),
    })?;

    let Some(code) = envelope.get("code").and_then(Value::as_i64) else {
        return Err(PlatformError::Decode {
            path: path.to_string(),
            message: format!("HTTP {status}, envelope has no numeric `code`"),
        });
    };

    if code != 0 {
        let msg = envelope.get("msg").and_then(Value::as_str).unwrap_or_default().to_string();
        return Err(PlatformError::Api { path: path.to_string(), code, msg });
    }

    if status >= 400 {
        return Err(PlatformError::Transport {
            path: path.to_string(),
            message: format!("HTTP {status}, body={envelope}"),
        });
    }

    Ok(envelope)
}

/// `data` member of an envelope, or an empty object.
pub(crate) fn data_of(envelope: Value) -> Value {
    match envelope {
        Value::Object(mut map) => map.remove("data").unwrap_or_else(|| json!({})),
        _ => json!({}),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{data_of, decode_envelope};
    use feishu_core::errors::PlatformError;

    #[test]
    fn success_envelope_is_returned_whole() {
        let envelope = decode_envelope("/p", 200, br#"{"code":0,"msg":"ok","data":{"a":1}}"#)
            .expect("envelope should decode");
        assert_eq!(envelope["data"]["a"], 1);
        assert_eq!(data_of(envelope), json!({ "a": 1 }));
    }

    #[test]
    fn platform_code_wins_over_http_status() {
        let error = decode_envelope("/p", 400, br#"{"code":1770001,"msg":"invalid param"}"#)
            .expect_err("non-zero code is an error");
        assert_eq!(
            error,
            PlatformError::Api {
                path: "/p".to_string(),
                code: 1770001,
                msg: "invalid param".to_string()
            }
        );
    }

    #[test]
    fn non_json_body_names_the_status() {
        let error = decode_envelope("/p", 502, b"<html>bad gateway</html>")
            .expect_err("html body is an error");
        assert!(error.to_string().contains("HTTP 502"));
    }

    #[test]
    fn zero_code_with_error_status_is_transport_failure() {
        let error =
            decode_envelope("/p", 500, br#"{"code":0}"#).expect_err("5xx is still an error");
        assert!(matches!(error, PlatformError::Transport { .. }));
    }

    #[test]
    fn missing_data_becomes_empty_object() {
        assert_eq!(data_of(json!({ "code": 0 })), json!({}));
    }
}
