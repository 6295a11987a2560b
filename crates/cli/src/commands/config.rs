use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use printshop_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let signing_secret = config
        .approval
        .signing_secret
        .as_ref()
        .map(|secret| redact(secret.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());
    let api_key = config
        .delivery
        .api_key
        .as_ref()
        .map(|secret| redact(secret.expose_secret()))
        .unwrap_or_else(|| "<unset>".to_string());

    let lines = vec![
        "effective config (source precedence: env > file > default):".to_string(),
        render_line("database.url", &config.database.url, source("database.url", "PRINTSHOP_DATABASE_URL")),
        render_line(
            "database.max_connections",
            &config.database.max_connections.to_string(),
            source("database.max_connections", "PRINTSHOP_DATABASE_MAX_CONNECTIONS"),
        ),
        render_line(
            "database.timeout_secs",
            &config.database.timeout_secs.to_string(),
            source("database.timeout_secs", "PRINTSHOP_DATABASE_TIMEOUT_SECS"),
        ),
        render_line(
            "approval.environment",
            &format!("{:?}", config.approval.environment),
            source("approval.environment", "PRINTSHOP_ENVIRONMENT"),
        ),
        render_line(
            "approval.signing_secret",
            &signing_secret,
            source("approval.signing_secret", "PRINTSHOP_SIGNING_SECRET"),
        ),
        render_line(
            "approval.token_validity_days",
            &config.approval.token_validity_days.to_string(),
            source("approval.token_validity_days", "PRINTSHOP_TOKEN_VALIDITY_DAYS"),
        ),
        render_line(
            "approval.reminder_threshold_days",
            &config.approval.reminder_threshold_days.to_string(),
            source("approval.reminder_threshold_days", "PRINTSHOP_REMINDER_THRESHOLD_DAYS"),
        ),
        render_line(
            "delivery.api_key",
            &api_key,
            source("delivery.api_key", "PRINTSHOP_DELIVERY_API_KEY"),
        ),
        render_line(
            "delivery.sender",
            &config.delivery.sender,
            source("delivery.sender", "PRINTSHOP_DELIVERY_SENDER"),
        ),
        render_line(
            "delivery.base_url",
            &config.delivery.base_url,
            source("delivery.base_url", "PRINTSHOP_DELIVERY_BASE_URL"),
        ),
        render_line(
            "delivery.portal_base_url",
            &config.delivery.portal_base_url,
            source("delivery.portal_base_url", "PRINTSHOP_PORTAL_BASE_URL"),
        ),
        render_line(
            "server.bind_address",
            &config.server.bind_address,
            source("server.bind_address", "PRINTSHOP_SERVER_BIND_ADDRESS"),
        ),
        render_line(
            "server.port",
            &config.server.port.to_string(),
            source("server.port", "PRINTSHOP_SERVER_PORT"),
        ),
        render_line(
            "server.health_check_port",
            &config.server.health_check_port.to_string(),
            source("server.health_check_port", "PRINTSHOP_SERVER_HEALTH_CHECK_PORT"),
        ),
        render_line(
            "server.graceful_shutdown_secs",
            &config.server.graceful_shutdown_secs.to_string(),
            source("server.graceful_shutdown_secs", "PRINTSHOP_SERVER_GRACEFUL_SHUTDOWN_SECS"),
        ),
        render_line(
            "server.reminder_interval_secs",
            &config.server.reminder_interval_secs.to_string(),
            source("server.reminder_interval_secs", "PRINTSHOP_SERVER_REMINDER_INTERVAL_SECS"),
        ),
        render_line(
            "logging.level",
            &config.logging.level,
            source("logging.level", "PRINTSHOP_LOGGING_LEVEL"),
        ),
        render_line(
            "logging.format",
            &format!("{:?}", config.logging.format),
            source("logging.format", "PRINTSHOP_LOGGING_FORMAT"),
        ),
    ];

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("printshop.toml"), PathBuf::from("config/printshop.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact(secret: &str) -> String {
    let trimmed = secret.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('.') {
        return format!("{prefix}.***");
    }

    "<redacted>".to_string()
}
