use crate::config::Config;
use actix_web::{HttpResponse, rt::time::timeout, web};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;
use sqlx::MySqlPool;
use std::time::{Duration, Instant};
use tracing::warn;
use utoipa::ToSchema;

static STARTED: Lazy<Instant> = Lazy::new(Instant::now);

const PING_TIMEOUT: Duration = Duration::from_secs(3);

/// Pins the uptime origin; call once at startup.
pub fn mark_started() {
    Lazy::force(&STARTED);
}

fn uptime_secs() -> f64 {
    STARTED.elapsed().as_secs_f64()
}

async fn ping(pool: &MySqlPool) -> Result<(), String> {
    match timeout(PING_TIMEOUT, sqlx::query("SELECT 1").execute(pool)).await {
        Ok(Ok(_)) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("database ping timed out".to_string()),
    }
}

#[derive(Serialize, ToSchema)]
pub struct DatabaseStatus {
    #[schema(example = "connected")]
    pub status: String,
    pub connected: bool,
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub message: String,
    #[schema(example = "healthy")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub environment: String,
    pub version: String,
    /// Seconds since startup
    pub uptime: f64,
    pub database: DatabaseStatus,
}

#[derive(Serialize, ToSchema)]
pub struct ReadyResponse {
    #[schema(example = "ready")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct LiveResponse {
    #[schema(example = "alive")]
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub uptime: f64,
}

/// Service and database health
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Database reachable", body = HealthResponse),
        (status = 503, description = "Database unreachable", body = HealthResponse)
    ),
    tag = "Health"
)]
pub async fn health(pool: web::Data<MySqlPool>, config: web::Data<Config>) -> HttpResponse {
    let db = ping(pool.get_ref()).await;
    if let Err(e) = &db {
        warn!(error = %e, "Health check: database unreachable");
    }

    let connected = db.is_ok();
    let body = HealthResponse {
        message: "College administration API is running".to_string(),
        status: if connected { "healthy" } else { "unhealthy" }.to_string(),
        timestamp: Utc::now(),
        environment: config.environment.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: uptime_secs(),
        database: DatabaseStatus {
            status: if connected { "connected" } else { "disconnected" }.to_string(),
            connected,
        },
    };

    if connected {
        HttpResponse::Ok().json(body)
    } else {
        HttpResponse::ServiceUnavailable().json(body)
    }
}

/// Readiness probe
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Ready to serve", body = ReadyResponse),
        (status = 503, description = "Database not reachable", body = ReadyResponse)
    ),
    tag = "Health"
)]
pub async fn ready(pool: web::Data<MySqlPool>) -> HttpResponse {
    match ping(pool.get_ref()).await {
        Ok(()) => HttpResponse::Ok().json(ReadyResponse {
            status: "ready".to_string(),
            reason: None,
        }),
        Err(reason) => HttpResponse::ServiceUnavailable().json(ReadyResponse {
            status: "not ready".to_string(),
            reason: Some(reason),
        }),
    }
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/api/live",
    responses(
        (status = 200, description = "Process is alive", body = LiveResponse)
    ),
    tag = "Health"
)]
pub async fn live() -> HttpResponse {
    HttpResponse::Ok().json(LiveResponse {
        status: "alive".to_string(),
        timestamp: Utc::now(),
        uptime: uptime_secs(),
    })
}
