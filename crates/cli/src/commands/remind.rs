use std::sync::Arc;

use chrono::Utc;

use crate::commands::CommandResult;
use printshop_core::config::{AppConfig, LoadOptions};
use printshop_core::{ApprovalPolicy, QuoteStore, ReminderScheduler, TokenCodec};
use printshop_db::{connect_from_config, migrations, SqlQuoteStore};
use printshop_delivery::SendGridGateway;

/// Runs one reminder sweep against the configured database and delivery
/// provider. Intended for cron-style operation next to the server's own loop.
pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "remind",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let codec = match TokenCodec::from_config(&config.approval) {
        Ok(codec) => codec,
        Err(error) => {
            return CommandResult::failure(
                "remind",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let gateway = match SendGridGateway::from_config(&config.delivery) {
        Ok(gateway) => Arc::new(gateway),
        Err(error) => {
            return CommandResult::failure(
                "remind",
                "delivery_config",
                format!("delivery gateway unavailable: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "remind",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let result = runtime.block_on(async {
        let pool = connect_from_config(&config.database)
            .await
            .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        let scheduler = ReminderScheduler::new(
            Arc::new(SqlQuoteStore::new(pool.clone())) as Arc<dyn QuoteStore>,
            gateway,
            codec,
            ApprovalPolicy::from_config(&config),
        );
        let run = scheduler
            .run_once(Utc::now())
            .await
            .map_err(|error| ("reminder_sweep", error.to_string(), 5u8))?;

        pool.close().await;
        Ok::<_, (&'static str, String, u8)>(run)
    });

    match result {
        Ok(run) => CommandResult::success(
            "remind",
            format!(
                "scanned {} due quotes, reminded {}, skipped {}",
                run.scanned, run.reminded, run.skipped
            ),
        ),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure("remind", error_class, message, exit_code)
        }
    }
}
