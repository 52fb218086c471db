use std::sync::Arc;

use deskbot_chat::replies::RenderError;
use deskbot_chat::{
    default_dispatcher, BotRunner, ChatTransport, DialogRuntime, ReconnectPolicy, ReplyRenderer,
    ReplySettings,
};
use deskbot_core::config::{AppConfig, ConfigError};
use deskbot_core::domain::ticket::TicketSubmitter;
use deskbot_db::{connect_with_settings, migrations, DbPool, FsAttachmentStore, SqlSessionRepository};
use thiserror::Error;
use tracing::info;

use crate::console::console_transport;
use crate::health::HealthState;
use crate::mail::{LoggingTicketSubmitter, MailRelaySubmitter, RelaySettings};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub runner: BotRunner,
}

impl Application {
    pub fn health_state(&self) -> HealthState {
        HealthState::new(self.db_pool.clone(), self.config.storage.attachments_dir.clone())
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
    #[error("attachment staging directory could not be created: {0}")]
    Staging(#[source] std::io::Error),
    #[error("reply templates failed to compile: {0}")]
    Replies(#[source] RenderError),
    #[error("mail template failed to compile: {0}")]
    MailTemplate(#[source] tera::Error),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    let transport =
        Arc::new(console_transport(config.bot.bot_id.clone(), config.bot.host.clone()));
    bootstrap_with_transport(config, transport).await
}

pub async fn bootstrap_with_transport(
    config: AppConfig,
    transport: Arc<dyn ChatTransport>,
) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        app_name = %config.bot.app_name,
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
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

    tokio::fs::create_dir_all(&config.storage.attachments_dir)
        .await
        .map_err(BootstrapError::Staging)?;

    let submitter: Arc<dyn TicketSubmitter> = match RelaySettings::from_config(&config) {
        Some(settings) => {
            info!(
                event_name = "system.bootstrap.mail_relay",
                correlation_id = "bootstrap",
                relay_url = %settings.relay_url,
                "tickets will be posted to the mail relay"
            );
            Arc::new(MailRelaySubmitter::new(settings).map_err(BootstrapError::MailTemplate)?)
        }
        None => {
            info!(
                event_name = "system.bootstrap.mail_relay",
                correlation_id = "bootstrap",
                "no mail relay configured; tickets will only be logged"
            );
            Arc::new(LoggingTicketSubmitter)
        }
    };

    let replies = Arc::new(
        ReplyRenderer::new(ReplySettings::from_config(&config)).map_err(BootstrapError::Replies)?,
    );
    let runtime = DialogRuntime::new(
        Arc::new(SqlSessionRepository::new(db_pool.clone())),
        Arc::new(FsAttachmentStore::new(
            config.storage.attachments_dir.clone(),
            config.limits.attachment_limits(),
        )),
        submitter,
        replies,
    );

    let runner =
        BotRunner::new(transport, default_dispatcher(Arc::new(runtime)), ReconnectPolicy::default());

    Ok(Application { config, db_pool, runner })
}
