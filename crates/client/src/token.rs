use std::time::Duration;

use async_trait::async_trait;
use feishu_core::errors::PlatformError;
use feishu_core::platform::AccessTokenSource;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

use crate::http::{read_envelope, transport};

pub const TOKEN_PATH: &str = "/open-apis/auth/v3/tenant_access_token/internal";
/// Tokens are replaced this long before the platform expires them.
pub const REFRESH_SKEW: Duration = Duration::from_secs(300);
pub const DEFAULT_TOKEN_LIFETIME_SECS: u64 = 7200;

struct CachedToken {
    value: SecretString,
    refresh_at: Instant,
}

/// Tenant access token for app identity, fetched lazily and shared by all
/// requests of one client.
pub struct TenantTokenCache {
    http: reqwest::Client,
    base_url: String,
    app_id: String,
    app_secret: SecretString,
    cached: RwLock<Option<CachedToken>>,
}

impl TenantTokenCache {
    pub fn new(
        http: reqwest::Client,
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: SecretString,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url, app_id: app_id.into(), app_secret, cached: RwLock::new(None) }
    }

    fn fresh(cached: &Option<CachedToken>) -> Option<SecretString> {
        cached.as_ref().filter(|token| Instant::now() < token.refresh_at).map(|token| token.value.clone())
    }

    async fn fetch(&self) -> Result<CachedToken, PlatformError> {
        let url = format!("{}{TOKEN_PATH}", self.base_url);
        let body = json!({ "app_id": self.app_id, "app_secret": self.app_secret.expose_secret() });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|error| transport(TOKEN_PATH, &error))?;
        let envelope = read_envelope(TOKEN_PATH, response)
            .await
            .map_err(|error| PlatformError::Credentials(error.to_string()))?;

        let token = envelope
            .get("tenant_access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                PlatformError::Credentials(
                    "token response did not include tenant_access_token".to_string(),
                )
            })?;
        let lifetime = envelope
            .get("expire")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_TOKEN_LIFETIME_SECS);

        debug!(app_id = %self.app_id, expires_in_secs = lifetime, "tenant access token refreshed");
        Ok(CachedToken {
            value: SecretString::from(token.to_string()),
            refresh_at: Instant::now() + Duration::from_secs(lifetime).saturating_sub(REFRESH_SKEW),
        })
    }
}

#[async_trait]
impl AccessTokenSource for TenantTokenCache {
    async fn access_token(&self) -> Result<SecretString, PlatformError> {
        if let Some(token) = Self::fresh(&*self.cached.read().await) {
            return Ok(token);
        }

        let mut cached = self.cached.write().await;
        // another task may have refreshed while we waited for the lock
        if let Some(token) = Self::fresh(&cached) {
            return Ok(token);
        }

        let token = self.fetch().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }
}

/// Fixed token, for tests and for callers that manage tokens themselves.
pub struct StaticToken(SecretString);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(SecretString::from(token.into()))
    }
}

#[async_trait]
impl AccessTokenSource for StaticToken {
    async fn access_token(&self) -> Result<SecretString, PlatformError> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{TenantTokenCache, TOKEN_PATH};
    use feishu_core::errors::PlatformError;
    use feishu_core::platform::AccessTokenSource;

    fn cache(server: &MockServer) -> TenantTokenCache {
        TenantTokenCache::new(
            reqwest::Client::new(),
            server.uri(),
            "cli_test",
            "app-secret".to_string().into(),
        )
    }

    #[tokio::test]
    async fn token_is_fetched_once_and_reused() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .and(body_json(json!({ "app_id": "cli_test", "app_secret": "app-secret" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "msg": "ok",
                "tenant_access_token": "t-cached",
                "expire": 7200
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = cache(&server);
        let first = tokens.access_token().await.expect("first token");
        let second = tokens.access_token().await.expect("second token");

        assert_eq!(first.expose_secret(), "t-cached");
        assert_eq!(second.expose_secret(), "t-cached");
    }

    #[tokio::test]
    async fn token_inside_refresh_window_is_refetched() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 0,
                "tenant_access_token": "t-short",
                "expire": 120
            })))
            .expect(2)
            .mount(&server)
            .await;

        let tokens = cache(&server);
        tokens.access_token().await.expect("first token");
        tokens.access_token().await.expect("second token");
    }

    #[tokio::test]
    async fn rejected_credentials_surface_as_credential_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TOKEN_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "code": 10014, "msg": "app secret invalid" })),
            )
            .mount(&server)
            .await;

        let error = cache(&server).access_token().await.expect_err("bad secret");

        assert!(matches!(error, PlatformError::Credentials(ref message) if message.contains("10014")));
    }
}
