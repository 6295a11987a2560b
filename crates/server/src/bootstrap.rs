use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use printshop_core::config::{AppConfig, ConfigError, LoadOptions};
use printshop_core::gateway::{DeliveryGateway, GatewayError, QuoteEmail, TemplateKind};
use printshop_core::{ApprovalPolicy, ApprovalService, ReminderScheduler, TokenCodec};
use printshop_db::{connect_from_config, migrations, DbPool, SqlQuoteStore};
use printshop_delivery::SendGridGateway;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub service: Arc<ApprovalService>,
    pub scheduler: Arc<ReminderScheduler>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("delivery gateway setup failed: {0}")]
    Delivery(#[from] GatewayError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "system.bootstrap.start", "starting application bootstrap");

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "system.bootstrap.migrations_applied", "database migrations applied");

    let codec = TokenCodec::from_config(&config.approval)?;
    let policy = ApprovalPolicy::from_config(&config);
    let store = Arc::new(SqlQuoteStore::new(db_pool.clone()));
    let gateway = delivery_gateway(&config)?;

    let service = Arc::new(ApprovalService::new(
        store.clone() as Arc<dyn printshop_core::QuoteStore>,
        gateway.clone(),
        codec.clone(),
        policy.clone(),
    ));
    let scheduler = Arc::new(ReminderScheduler::new(
        store as Arc<dyn printshop_core::QuoteStore>,
        gateway,
        codec,
        policy,
    ));

    Ok(Application { config, db_pool, service, scheduler })
}

fn delivery_gateway(config: &AppConfig) -> Result<Arc<dyn DeliveryGateway>, BootstrapError> {
    if config.delivery.api_key.is_some() {
        return Ok(Arc::new(SendGridGateway::from_config(&config.delivery)?));
    }

    // Config validation guarantees an api key in production, so this branch
    // only serves local development.
    info!(
        event_name = "system.bootstrap.delivery_log_only",
        "no delivery api key configured; outbound email will only be logged"
    );
    Ok(Arc::new(LogOnlyGateway::default()))
}

/// Development stand-in that logs each send instead of calling a provider.
#[derive(Debug, Default)]
struct LogOnlyGateway {
    counter: AtomicU64,
}

#[async_trait]
impl DeliveryGateway for LogOnlyGateway {
    async fn send(
        &self,
        template: TemplateKind,
        recipient: &str,
        email: &QuoteEmail,
    ) -> Result<String, GatewayError> {
        let message_id = format!("local-msg-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        info!(
            event_name = "delivery.log_only.send",
            ?template,
            recipient,
            quote_id = %email.quote_id,
            message_id = %message_id,
            approve_url = %email.approve_url,
            "log-only delivery"
        );
        Ok(message_id)
    }
}

#[cfg(test)]
mod tests {
    use printshop_core::config::{ConfigOverrides, Environment, LoadOptions};

    use super::bootstrap;

    #[tokio::test]
    async fn bootstrap_fails_fast_without_a_production_signing_secret() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:".to_string()),
                environment: Some(Environment::Production),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().expect("error").to_string();
        assert!(message.contains("signing_secret"));
    }

    #[tokio::test]
    async fn bootstrap_applies_migrations_and_wires_the_service() {
        let app = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite::memory:?cache=shared".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await
        .expect("development bootstrap should succeed");

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('quote', 'quote_line')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema check");
        assert_eq!(table_count, 2);

        app.db_pool.close().await;
    }
}
