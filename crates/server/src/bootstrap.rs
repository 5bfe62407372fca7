use std::sync::Arc;

use libdesk_agent::{AgentRuntime, AgentSettings, OpenAiCompatibleClient, ToolExecutor};
use libdesk_core::config::{AppConfig, ConfigError, LoadOptions};
use libdesk_db::{connect_from_config, migrations, DbPool, Repositories};
use thiserror::Error;
use tracing::info;

use crate::api::ApiState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub repositories: Repositories,
    pub agent: Arc<AgentRuntime>,
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState {
            repositories: self.repositories.clone(),
            agent: self.agent.clone(),
            low_stock_threshold: self.config.inventory.low_stock_threshold,
        }
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("language model client setup failed: {0:#}")]
    LlmClient(anyhow::Error),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool =
        connect_from_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let llm = OpenAiCompatibleClient::from_config(&config.llm).map_err(BootstrapError::LlmClient)?;
    info!(
        event_name = "system.bootstrap.llm_configured",
        correlation_id = "bootstrap",
        provider = config.llm.provider.as_str(),
        model = %config.llm.model,
        endpoint = %llm.endpoint(),
        "language model client configured"
    );

    let repositories = Repositories::sql(db_pool.clone());
    let agent = AgentRuntime::new(
        Arc::new(llm),
        ToolExecutor::new(repositories.clone(), config.inventory.low_stock_threshold),
        repositories.conversations.clone(),
        AgentSettings::from(&config.agent),
    );

    Ok(Application { config, db_pool, repositories, agent: Arc::new(agent) })
}
