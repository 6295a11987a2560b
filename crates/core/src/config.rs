use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub approval: ApprovalConfig,
    pub delivery: DeliveryConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ApprovalConfig {
    pub environment: Environment,
    pub signing_secret: Option<SecretString>,
    pub token_validity_days: i64,
    pub reminder_threshold_days: i64,
    pub rejection_reason_max_chars: usize,
}

#[derive(Clone, Debug)]
pub struct DeliveryConfig {
    pub api_key: Option<SecretString>,
    pub sender: String,
    pub base_url: String,
    pub portal_base_url: String,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
    pub reminder_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Production,
    Development,
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
    pub database_url: Option<String>,
    pub environment: Option<Environment>,
    pub signing_secret: Option<String>,
    pub delivery_api_key: Option<String>,
    pub portal_base_url: Option<String>,
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
            database: DatabaseConfig {
                url: "sqlite://printshop.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            approval: ApprovalConfig {
                environment: Environment::Development,
                signing_secret: None,
                token_validity_days: 7,
                reminder_threshold_days: 5,
                rejection_reason_max_chars: 500,
            },
            delivery: DeliveryConfig {
                api_key: None,
                sender: "quotes@printshop.local".to_string(),
                base_url: "https://api.sendgrid.com".to_string(),
                portal_base_url: "http://localhost:8080".to_string(),
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                health_check_port: 8081,
                graceful_shutdown_secs: 15,
                reminder_interval_secs: 3600,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for Environment {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" => Ok(Self::Development),
            other => Err(ConfigError::Validation(format!(
                "unsupported environment `{other}` (expected production|development)"
            ))),
        }
    }
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

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("printshop.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(approval) = patch.approval {
            if let Some(environment) = approval.environment {
                self.approval.environment = environment;
            }
            if let Some(signing_secret) = approval.signing_secret {
                self.approval.signing_secret = Some(secret_value(signing_secret));
            }
            if let Some(token_validity_days) = approval.token_validity_days {
                self.approval.token_validity_days = token_validity_days;
            }
            if let Some(reminder_threshold_days) = approval.reminder_threshold_days {
                self.approval.reminder_threshold_days = reminder_threshold_days;
            }
            if let Some(rejection_reason_max_chars) = approval.rejection_reason_max_chars {
                self.approval.rejection_reason_max_chars = rejection_reason_max_chars;
            }
        }

        if let Some(delivery) = patch.delivery {
            if let Some(api_key) = delivery.api_key {
                self.delivery.api_key = Some(secret_value(api_key));
            }
            if let Some(sender) = delivery.sender {
                self.delivery.sender = sender;
            }
            if let Some(base_url) = delivery.base_url {
                self.delivery.base_url = base_url;
            }
            if let Some(portal_base_url) = delivery.portal_base_url {
                self.delivery.portal_base_url = portal_base_url;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
            if let Some(reminder_interval_secs) = server.reminder_interval_secs {
                self.server.reminder_interval_secs = reminder_interval_secs;
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
        if let Some(value) = read_env("PRINTSHOP_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PRINTSHOP_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PRINTSHOP_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PRINTSHOP_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PRINTSHOP_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PRINTSHOP_ENVIRONMENT") {
            self.approval.environment = value.parse()?;
        }
        if let Some(value) = read_env("PRINTSHOP_SIGNING_SECRET") {
            self.approval.signing_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("PRINTSHOP_TOKEN_VALIDITY_DAYS") {
            self.approval.token_validity_days =
                parse_i64("PRINTSHOP_TOKEN_VALIDITY_DAYS", &value)?;
        }
        if let Some(value) = read_env("PRINTSHOP_REMINDER_THRESHOLD_DAYS") {
            self.approval.reminder_threshold_days =
                parse_i64("PRINTSHOP_REMINDER_THRESHOLD_DAYS", &value)?;
        }

        if let Some(value) = read_env("PRINTSHOP_DELIVERY_API_KEY") {
            self.delivery.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PRINTSHOP_DELIVERY_SENDER") {
            self.delivery.sender = value;
        }
        if let Some(value) = read_env("PRINTSHOP_DELIVERY_BASE_URL") {
            self.delivery.base_url = value;
        }
        if let Some(value) = read_env("PRINTSHOP_PORTAL_BASE_URL") {
            self.delivery.portal_base_url = value;
        }

        if let Some(value) = read_env("PRINTSHOP_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PRINTSHOP_SERVER_PORT") {
            self.server.port = parse_u16("PRINTSHOP_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PRINTSHOP_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("PRINTSHOP_SERVER_HEALTH_CHECK_PORT", &value)?;
        }
        if let Some(value) = read_env("PRINTSHOP_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("PRINTSHOP_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }
        if let Some(value) = read_env("PRINTSHOP_SERVER_REMINDER_INTERVAL_SECS") {
            self.server.reminder_interval_secs =
                parse_u64("PRINTSHOP_SERVER_REMINDER_INTERVAL_SECS", &value)?;
        }

        let log_level =
            read_env("PRINTSHOP_LOGGING_LEVEL").or_else(|| read_env("PRINTSHOP_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PRINTSHOP_LOGGING_FORMAT").or_else(|| read_env("PRINTSHOP_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(environment) = overrides.environment {
            self.approval.environment = environment;
        }
        if let Some(signing_secret) = overrides.signing_secret {
            self.approval.signing_secret = Some(secret_value(signing_secret));
        }
        if let Some(delivery_api_key) = overrides.delivery_api_key {
            self.delivery.api_key = Some(secret_value(delivery_api_key));
        }
        if let Some(portal_base_url) = overrides.portal_base_url {
            self.delivery.portal_base_url = portal_base_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_approval(&self.approval)?;
        validate_delivery(&self.delivery, self.approval.environment)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("printshop.toml"), PathBuf::from("config/printshop.toml")]
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

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_approval(approval: &ApprovalConfig) -> Result<(), ConfigError> {
    if approval.environment == Environment::Production {
        let missing = approval
            .signing_secret
            .as_ref()
            .map(|secret| secret.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "approval.signing_secret is required when approval.environment = production"
                    .to_string(),
            ));
        }
    }

    if !(1..=90).contains(&approval.token_validity_days) {
        return Err(ConfigError::Validation(
            "approval.token_validity_days must be in range 1..=90".to_string(),
        ));
    }

    if approval.reminder_threshold_days < 1 {
        return Err(ConfigError::Validation(
            "approval.reminder_threshold_days must be at least 1".to_string(),
        ));
    }

    if approval.reminder_threshold_days >= approval.token_validity_days {
        return Err(ConfigError::Validation(
            "approval.reminder_threshold_days must be shorter than approval.token_validity_days"
                .to_string(),
        ));
    }

    if approval.rejection_reason_max_chars == 0 {
        return Err(ConfigError::Validation(
            "approval.rejection_reason_max_chars must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_delivery(delivery: &DeliveryConfig, environment: Environment) -> Result<(), ConfigError> {
    if environment == Environment::Production {
        let missing = delivery
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if missing {
            return Err(ConfigError::Validation(
                "delivery.api_key is required when approval.environment = production".to_string(),
            ));
        }
    }

    if delivery.sender.trim().is_empty() || !delivery.sender.contains('@') {
        return Err(ConfigError::Validation(
            "delivery.sender must be an email address".to_string(),
        ));
    }

    for (field, url) in
        [("delivery.base_url", &delivery.base_url), ("delivery.portal_base_url", &delivery.portal_base_url)]
    {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "{field} must start with http:// or https://"
            )));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.health_check_port == 0 || server.health_check_port == server.port {
        return Err(ConfigError::Validation(
            "server.health_check_port must be non-zero and distinct from server.port".to_string(),
        ));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    if server.reminder_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "server.reminder_interval_secs must be greater than zero".to_string(),
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

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
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

fn parse_i64(key: &str, value: &str) -> Result<i64, ConfigError> {
    value.parse::<i64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    approval: Option<ApprovalPatch>,
    delivery: Option<DeliveryPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ApprovalPatch {
    environment: Option<Environment>,
    signing_secret: Option<String>,
    token_validity_days: Option<i64>,
    reminder_threshold_days: Option<i64>,
    rejection_reason_max_chars: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct DeliveryPatch {
    api_key: Option<String>,
    sender: Option<String>,
    base_url: Option<String>,
    portal_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
    reminder_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
