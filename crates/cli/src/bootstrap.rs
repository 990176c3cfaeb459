use std::sync::Arc;

use registrar_core::config::{AppConfig, ConfigError, NotificationSink};
use registrar_core::execution::ExecutionHandlerRegistry;
use registrar_core::notify::{NoopNotificationHook, NotificationHook, TracingNotificationHook};
use registrar_core::schema::StaticFormSchemaValidator;
use registrar_core::services::{ServiceDependencies, WorkflowServices};
use registrar_db::{connect_with_settings, migrations, DbPool, SqlRequestStore};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub services: WorkflowServices,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

impl BootstrapError {
    /// `(error_class, exit_code)` reported by commands.
    pub fn classify(&self) -> (&'static str, u8) {
        match self {
            Self::Config(_) => ("config_validation", 2),
            Self::DatabaseConnect(_) => ("db_connectivity", 4),
            Self::Migration(_) => ("migration", 5),
        }
    }
}

/// Connects, brings the schema up to date and wires the workflow services.
pub async fn bootstrap(config: AppConfig) -> Result<Application, BootstrapError> {
    let registry = config.workflow_registry()?;

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "system.bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;

    let hook: Arc<dyn NotificationHook> = match config.notifications.sink {
        NotificationSink::Log => Arc::new(TracingNotificationHook),
        NotificationSink::None => Arc::new(NoopNotificationHook),
    };

    let services = WorkflowServices::new(ServiceDependencies {
        registry: Arc::new(registry),
        validator: Arc::new(StaticFormSchemaValidator::builtin()),
        store: Arc::new(SqlRequestStore::new(db_pool.clone())),
        hook,
        handlers: Arc::new(ExecutionHandlerRegistry::with_summary_handlers()),
        claim_timeout: config.execution.claim_timeout(),
    });
    info!(
        event_name = "system.bootstrap.ready",
        notification_sink = ?config.notifications.sink,
        "workflow services ready"
    );

    Ok(Application { config, db_pool, services })
}
