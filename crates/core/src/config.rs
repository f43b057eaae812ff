use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::docx::submit::{BatchPolicy, DEFAULT_BATCH_LIMIT};

pub const DEFAULT_BASE_URL: &str = "https://open.feishu.cn";
const CONFIG_FILE_NAME: &str = "feishu-bridge.toml";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub feishu: FeishuConfig,
    pub webhook: WebhookConfig,
    pub docs: DocsConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct FeishuConfig {
    pub app_id: String,
    pub app_secret: SecretString,
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    /// Signing secret for inbound events. `None` disables verification.
    pub encrypt_key: Option<SecretString>,
    pub verification_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct DocsConfig {
    pub batch_size: usize,
    pub pacing_ms: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub app_id: Option<String>,
    pub app_secret: Option<String>,
    pub base_url: Option<String>,
    pub encrypt_key: Option<String>,
    pub server_port: Option<u16>,
    pub log_level: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            feishu: FeishuConfig {
                app_id: String::new(),
                app_secret: String::new().into(),
                base_url: DEFAULT_BASE_URL.to_string(),
                timeout_secs: 30,
            },
            webhook: WebhookConfig { encrypt_key: None, verification_token: None },
            docs: DocsConfig { batch_size: DEFAULT_BATCH_LIMIT, pacing_ms: 400 },
            server: ServerConfig {
                bind_address: "0.0.0.0".to_string(),
                port: 8000,
                graceful_shutdown_secs: 15,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

/// Empty strings from files or env mean "unset" for optional secrets.
fn optional_secret(value: String) -> Option<SecretString> {
    (!value.trim().is_empty()).then(|| secret_value(value))
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl WebhookConfig {
    pub fn signing_secret(&self) -> Option<&str> {
        self.encrypt_key.as_ref().map(|key| key.expose_secret())
    }

    pub fn verification_enabled(&self) -> bool {
        self.signing_secret().is_some_and(|key| !key.is_empty())
    }
}

impl DocsConfig {
    pub fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy::new(self.batch_size, Duration::from_millis(self.pacing_ms))
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(feishu) = patch.feishu {
            if let Some(app_id) = feishu.app_id {
                self.feishu.app_id = app_id;
            }
            if let Some(app_secret_value) = feishu.app_secret {
                self.feishu.app_secret = secret_value(app_secret_value);
            }
            if let Some(base_url) = feishu.base_url {
                self.feishu.base_url = base_url;
            }
            if let Some(timeout_secs) = feishu.timeout_secs {
                self.feishu.timeout_secs = timeout_secs;
            }
        }

        if let Some(webhook) = patch.webhook {
            if let Some(encrypt_key) = webhook.encrypt_key {
                self.webhook.encrypt_key = optional_secret(encrypt_key);
            }
            if let Some(verification_token) = webhook.verification_token {
                self.webhook.verification_token = optional_secret(verification_token);
            }
        }

        if let Some(docs) = patch.docs {
            if let Some(batch_size) = docs.batch_size {
                self.docs.batch_size = batch_size;
            }
            if let Some(pacing_ms) = docs.pacing_ms {
                self.docs.pacing_ms = pacing_ms;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("FEISHU_APP_ID") {
            self.feishu.app_id = value;
        }
        if let Some(value) = read_env("FEISHU_APP_SECRET") {
            self.feishu.app_secret = secret_value(value);
        }
        if let Some(value) = read_env("FEISHU_BASE_URL") {
            self.feishu.base_url = value;
        }
        if let Some(value) = read_env("FEISHU_TIMEOUT_SECS") {
            self.feishu.timeout_secs = parse_u64("FEISHU_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("FEISHU_ENCRYPT_KEY") {
            self.webhook.encrypt_key = optional_secret(value);
        }
        if let Some(value) = read_env("FEISHU_VERIFICATION_TOKEN") {
            self.webhook.verification_token = optional_secret(value);
        }

        if let Some(value) = read_env("FEISHU_DOCS_BATCH_SIZE") {
            self.docs.batch_size = parse_usize("FEISHU_DOCS_BATCH_SIZE", &value)?;
        }
        if let Some(value) = read_env("FEISHU_DOCS_PACING_MS") {
            self.docs.pacing_ms = parse_u64("FEISHU_DOCS_PACING_MS", &value)?;
        }

        if let Some(value) = read_env("FEISHU_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("FEISHU_SERVER_PORT") {
            self.server.port = parse_u16("FEISHU_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("FEISHU_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("FEISHU_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        let log_level = read_env("FEISHU_LOG_LEVEL").or_else(|| read_env("LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        if let Some(value) = read_env("FEISHU_LOG_FORMAT") {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(app_id) = overrides.app_id {
            self.feishu.app_id = app_id;
        }
        if let Some(app_secret) = overrides.app_secret {
            self.feishu.app_secret = secret_value(app_secret);
        }
        if let Some(base_url) = overrides.base_url {
            self.feishu.base_url = base_url;
        }
        if let Some(encrypt_key) = overrides.encrypt_key {
            self.webhook.encrypt_key = optional_secret(encrypt_key);
        }
        if let Some(port) = overrides.server_port {
            self.server.port = port;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_feishu(&self.feishu)?;
        validate_docs(&self.docs)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from(CONFIG_FILE_NAME), Path::new("config").join(CONFIG_FILE_NAME)]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_feishu(feishu: &FeishuConfig) -> Result<(), ConfigError> {
    let app_id = feishu.app_id.trim();
    if app_id.is_empty() || app_id.starts_with("cli_xxx") {
        return Err(ConfigError::Validation(
            "feishu.app_id is required. Get it from https://open.feishu.cn/app > Your App > Credentials & Basic Info".to_string(),
        ));
    }

    let app_secret = feishu.app_secret.expose_secret().trim();
    if app_secret.is_empty() || app_secret.starts_with("xxx") {
        return Err(ConfigError::Validation(
            "feishu.app_secret is required and must not be the template placeholder".to_string(),
        ));
    }

    let base_url = feishu.base_url.trim();
    if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
        return Err(ConfigError::Validation(
            "feishu.base_url must start with http:// or https://".to_string(),
        ));
    }

    if feishu.timeout_secs == 0 || feishu.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "feishu.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_docs(docs: &DocsConfig) -> Result<(), ConfigError> {
    if docs.batch_size == 0 || docs.batch_size > DEFAULT_BATCH_LIMIT {
        return Err(ConfigError::Validation(format!(
            "docs.batch_size must be in range 1..={DEFAULT_BATCH_LIMIT}"
        )));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_usize(key: &str, value: &str) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    feishu: Option<FeishuPatch>,
    webhook: Option<WebhookPatch>,
    docs: Option<DocsPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct FeishuPatch {
    app_id: Option<String>,
    app_secret: Option<String>,
    base_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WebhookPatch {
    encrypt_key: Option<String>,
    verification_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DocsPatch {
    batch_size: Option<usize>,
    pacing_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
