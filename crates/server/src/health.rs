use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use libdesk_db::{migrations, DbPool};
use serde::Serialize;

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    Ready,
    Degraded,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Probe {
    pub status: Readiness,
    pub detail: String,
}

impl Probe {
    fn ready(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Ready, detail: detail.into() }
    }

    fn degraded(detail: impl Into<String>) -> Self {
        Self { status: Readiness::Degraded, detail: detail.into() }
    }
}

/// `/health` body: database reachability plus whether the schema is current.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthReport {
    pub status: Readiness,
    pub database: Probe,
    pub schema: Probe,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthReport>) {
    let (database, schema) = match libdesk_db::ping(&state.db_pool).await {
        Ok(()) => (Probe::ready("database query succeeded"), schema_probe(&state.db_pool).await),
        Err(error) => (
            Probe::degraded(format!("database query failed: {error}")),
            Probe::degraded("skipped: database unreachable"),
        ),
    };

    let ready = database.status == Readiness::Ready && schema.status == Readiness::Ready;
    let report = HealthReport {
        status: if ready { Readiness::Ready } else { Readiness::Degraded },
        database,
        schema,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(report))
}

async fn schema_probe(pool: &DbPool) -> Probe {
    match migrations::pending_count(pool).await {
        Ok(0) => Probe::ready("all migrations applied"),
        Ok(pending) => Probe::degraded(format!("{pending} migration(s) pending")),
        Err(error) => Probe::degraded(format!("migration status unavailable: {error}")),
    }
}
