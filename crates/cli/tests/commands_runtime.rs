use std::env;
use std::sync::{Mutex, OnceLock};

use printshop_cli::commands::{migrate, remind, seed};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("PRINTSHOP_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_invalid_database_url() {
    with_env(&[("PRINTSHOP_DATABASE_URL", "postgres://nope")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_demo_quotes() {
    with_env(&[("PRINTSHOP_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().expect("message");
        assert!(message.contains("3 demo quotes"), "unexpected message: {message}");
    });
}

#[test]
fn remind_fails_without_a_delivery_api_key() {
    with_env(&[("PRINTSHOP_DATABASE_URL", "sqlite::memory:")], || {
        let result = remind::run();
        assert_eq!(result.exit_code, 2, "expected delivery config failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "remind");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "delivery_config");
    });
}

#[test]
fn remind_reports_an_empty_sweep_on_a_fresh_database() {
    with_env(
        &[
            ("PRINTSHOP_DATABASE_URL", "sqlite::memory:"),
            ("PRINTSHOP_DELIVERY_API_KEY", "SG.test-key"),
        ],
        || {
            let result = remind::run();
            assert_eq!(result.exit_code, 0, "expected successful remind run");

            let payload = parse_payload(&result.output);
            assert_eq!(payload["command"], "remind");
            assert_eq!(payload["status"], "ok");
            let message = payload["message"].as_str().expect("message");
            assert!(message.contains("scanned 0"), "unexpected message: {message}");
        },
    );
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "PRINTSHOP_DATABASE_URL",
        "PRINTSHOP_DATABASE_MAX_CONNECTIONS",
        "PRINTSHOP_DATABASE_TIMEOUT_SECS",
        "PRINTSHOP_ENVIRONMENT",
        "PRINTSHOP_SIGNING_SECRET",
        "PRINTSHOP_TOKEN_VALIDITY_DAYS",
        "PRINTSHOP_REMINDER_THRESHOLD_DAYS",
        "PRINTSHOP_DELIVERY_API_KEY",
        "PRINTSHOP_DELIVERY_SENDER",
        "PRINTSHOP_DELIVERY_BASE_URL",
        "PRINTSHOP_PORTAL_BASE_URL",
        "PRINTSHOP_SERVER_BIND_ADDRESS",
        "PRINTSHOP_SERVER_PORT",
        "PRINTSHOP_SERVER_HEALTH_CHECK_PORT",
        "PRINTSHOP_SERVER_GRACEFUL_SHUTDOWN_SECS",
        "PRINTSHOP_SERVER_REMINDER_INTERVAL_SECS",
        "PRINTSHOP_LOGGING_LEVEL",
        "PRINTSHOP_LOGGING_FORMAT",
        "PRINTSHOP_LOG_LEVEL",
        "PRINTSHOP_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
