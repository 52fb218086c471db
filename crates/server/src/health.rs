use std::path::PathBuf;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use deskbot_db::DbPool;
use serde::Serialize;
use tracing::{error, info};

const READY: &str = "ready";
const DEGRADED: &str = "degraded";

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
    attachments_dir: PathBuf,
}

impl HealthState {
    pub fn new(db_pool: DbPool, attachments_dir: impl Into<PathBuf>) -> Self {
        Self { db_pool, attachments_dir: attachments_dir.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

impl HealthCheck {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: READY, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: DEGRADED, detail: detail.into() }
    }

    fn is_ready(&self) -> bool {
        self.status == READY
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub attachments: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn spawn(bind_address: &str, port: u16, state: HealthState) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        bind_address = %address,
        "health endpoint started"
    );

    tokio::spawn(async move {
        if let Err(error) = axum::serve(listener, router(state)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                error = %error,
                "health endpoint server terminated unexpectedly"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let attachments = attachments_check(&state.attachments_dir).await;
    let ready = database.is_ready() && attachments.is_ready();

    let payload = HealthResponse {
        status: if ready { READY } else { DEGRADED },
        service: HealthCheck::ready("deskbot-server runtime initialized"),
        database,
        attachments,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match deskbot_db::ping(pool).await {
        Ok(()) => HealthCheck::ready("session database query succeeded"),
        Err(error) => HealthCheck::degraded(format!("session database query failed: {error}")),
    }
}

async fn attachments_check(dir: &std::path::Path) -> HealthCheck {
    match tokio::fs::metadata(dir).await {
        Ok(metadata) if metadata.is_dir() => {
            HealthCheck::ready(format!("staging directory {} available", dir.display()))
        }
        Ok(_) => HealthCheck::degraded(format!("{} is not a directory", dir.display())),
        Err(error) => HealthCheck::degraded(format!(
            "staging directory {} unavailable: {error}",
            dir.display()
        )),
    }
}
