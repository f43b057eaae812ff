use std::sync::Arc;

use feishu_client::FeishuClient;
use feishu_core::config::{AppConfig, ConfigError, LoadOptions};
use feishu_core::errors::PlatformError;
use feishu_webhook::{default_dispatcher, DispatchError, EventIngress};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub client: Arc<FeishuClient>,
    pub ingress: Arc<EventIngress>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("platform client setup failed: {0}")]
    Client(#[source] PlatformError),
    #[error("event router is incomplete: {0}")]
    Dispatcher(#[source] DispatchError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config)
}

pub fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let client = Arc::new(FeishuClient::from_config(&config.feishu).map_err(BootstrapError::Client)?);
    let dispatcher = default_dispatcher(client.clone(), client.clone());
    dispatcher.validate().map_err(BootstrapError::Dispatcher)?;
    info!(
        event_name = "system.bootstrap.dispatcher_ready",
        correlation_id = "bootstrap",
        handler_count = dispatcher.handler_count(),
        "event handlers registered"
    );

    let ingress = EventIngress::new(config.webhook.encrypt_key.clone(), dispatcher)
        .with_verification_token(config.webhook.verification_token.clone());
    if !config.webhook.verification_enabled() {
        warn!(
            event_name = "system.bootstrap.open_mode",
            correlation_id = "bootstrap",
            "no encrypt key configured; webhook signatures will NOT be verified"
        );
    }

    Ok(Application { config, client, ingress: Arc::new(ingress) })
}

#[cfg(test)]
mod tests {
    use feishu_core::config::{ConfigOverrides, LoadOptions};

    use crate::bootstrap::bootstrap;

    fn valid_overrides(encrypt_key: Option<&str>) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                app_id: Some("cli_a1b2c3".to_string()),
                app_secret: Some("app-secret".to_string()),
                encrypt_key: encrypt_key.map(str::to_string),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[test]
    fn bootstrap_fails_fast_with_placeholder_credentials() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                app_id: Some("cli_xxxxxxxx".to_string()),
                app_secret: Some("xxxxxxxx".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });

        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("feishu.app_id"));
    }

    #[test]
    fn bootstrap_wires_a_complete_router() {
        let app = bootstrap(valid_overrides(Some("enc-key"))).expect("bootstrap should succeed");

        assert!(!app.ingress.open_mode());
        assert_eq!(app.ingress.dispatcher().handler_count(), 2);
        assert_eq!(app.client.base_url(), "https://open.feishu.cn");
    }

    #[test]
    fn blank_encrypt_key_runs_in_open_mode() {
        let app = bootstrap(valid_overrides(Some(""))).expect("bootstrap should succeed");

        assert!(app.ingress.open_mode());
    }
}
