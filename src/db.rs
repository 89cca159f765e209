use actix_web::rt::time::sleep;
use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::auth::password::hash_password;
use crate::config::{Config, SeedAdmin};
use crate::model::admin::AdminRole;
use crate::utils::identity_filter;

const SETUP_RETRY_INTERVAL: Duration = Duration::from_secs(5);
/// One hour of retries before the background setup gives up.
const SETUP_RETRY_ATTEMPTS: u32 = 720;

fn pool_options(config: &Config) -> MySqlPoolOptions {
    MySqlPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
}

/// Connects and migrates. When the database is down the server still starts
/// on a lazy pool, the health endpoints report the outage, and a background
/// task runs the migrations and the seed once the database answers.
pub async fn init_db(config: &Config) -> Result<MySqlPool> {
    match pool_options(config).connect(&config.database_url).await {
        Ok(pool) => {
            info!("Connected to database");
            prepare_database(&pool, config.seed_admin.as_ref()).await?;
            Ok(pool)
        }
        Err(e) => {
            warn!(error = %e, "Database unreachable, starting without a connection");
            let pool = pool_options(config)
                .connect_lazy(&config.database_url)
                .context("invalid DATABASE_URL")?;

            actix_web::rt::spawn(prepare_when_reachable(
                pool.clone(),
                config.seed_admin.clone(),
            ));
            Ok(pool)
        }
    }
}

/// Applies pending migrations, then seeds the first super admin if configured.
pub async fn prepare_database(pool: &MySqlPool, seed: Option<&SeedAdmin>) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("running database migrations")?;
    info!("Database migrations applied");

    if let Some(seed) = seed {
        if let Err(e) = seed_super_admin(pool, seed).await {
            error!(error = ?e, "Failed to seed super admin");
        }
    }
    Ok(())
}

/// Pings until the database answers or the attempts run out.
pub async fn wait_for_database(pool: &MySqlPool, interval: Duration, attempts: u32) -> bool {
    for attempt in 1..=attempts {
        match sqlx::query("SELECT 1").execute(pool).await {
            Ok(_) => return true,
            Err(e) => debug!(attempt, error = %e, "Database still unreachable"),
        }
        if attempt < attempts {
            sleep(interval).await;
        }
    }
    false
}

async fn prepare_when_reachable(pool: MySqlPool, seed: Option<SeedAdmin>) {
    if !wait_for_database(&pool, SETUP_RETRY_INTERVAL, SETUP_RETRY_ATTEMPTS).await {
        error!("Database never became reachable, migrations not applied");
        return;
    }

    info!("Database reachable, running deferred setup");
    if let Err(e) = prepare_database(&pool, seed.as_ref()).await {
        error!(error = ?e, "Deferred database setup failed");
        return;
    }

    if let Err(e) = identity_filter::warmup_identity_filter(&pool, 100).await {
        warn!(error = ?e, "Failed to warm up identity filter");
    }
}

/// Creates the first super admin when the admins table is empty.
pub async fn seed_super_admin(pool: &MySqlPool, seed: &SeedAdmin) -> Result<bool> {
    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM admins")
        .fetch_one(pool)
        .await?;

    if existing > 0 {
        return Ok(false);
    }

    let hashed = hash_password(&seed.password)
        .map_err(|e| anyhow::anyhow!("hashing seed password: {e}"))?;

    sqlx::query(
        r#"
        INSERT INTO admins (username, email, password, full_name, role)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(seed.username.trim())
    .bind(seed.email.trim().to_lowercase())
    .bind(&hashed)
    .bind("Super Administrator")
    .bind(AdminRole::SuperAdmin.as_ref())
    .execute(pool)
    .await?;

    info!(username = %seed.username, "Seeded super admin");
    Ok(true)
}
