use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use dotenvy::dotenv;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub server_addr: String,
    pub token_ttl: usize,
    pub db_max_connections: u32,

    // Rate limiting
    pub rate_login_per_min: u32,
    pub rate_api_per_min: u32,

    pub api_prefix: String,
    pub environment: String,
    pub log_dir: String,
    pub log_level: String,

    /// First super admin, created on startup when the admins table is empty
    pub seed_admin: Option<SeedAdmin>,
}

#[derive(Clone)]
pub struct SeedAdmin {
    pub username: String,
    pub email: String,
    pub password: String,
}

fn required(key: &str) -> Result<String> {
    env::var(key).with_context(|| format!("{key} must be set"))
}

fn or_default<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} has an invalid value: {raw}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let seed_admin = match (
            env::var("SEED_ADMIN_USERNAME"),
            env::var("SEED_ADMIN_EMAIL"),
            env::var("SEED_ADMIN_PASSWORD"),
        ) {
            (Ok(username), Ok(email), Ok(password)) => Some(SeedAdmin {
                username,
                email,
                password,
            }),
            _ => None,
        };

        Ok(Self {
            server_addr: required("SERVER_ADDR")?,
            database_url: required("DATABASE_URL")?,
            jwt_secret: required("JWT_SECRET")?,
            token_ttl: or_default("JWT_EXPIRE_SECS", 604_800)?, // default 7 days
            db_max_connections: or_default("DB_MAX_CONNECTIONS", 10)?,

            rate_login_per_min: or_default("RATE_LOGIN_PER_MIN", 60)?,
            rate_api_per_min: or_default("RATE_API_PER_MIN", 1000)?,

            api_prefix: env::var("API_PREFIX").unwrap_or_else(|_| "/api".to_string()),
            environment: env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            log_dir: env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_string()),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            seed_admin,
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

#[cfg(test)]
impl Config {
    /// Config used by handler tests; never reads the environment.
    pub fn for_tests() -> Self {
        Self {
            database_url: "mysql://root@127.0.0.1:1/college_admin_test".to_string(),
            jwt_secret: "test-secret".to_string(),
            server_addr: "127.0.0.1:0".to_string(),
            token_ttl: 3600,
            db_max_connections: 1,
            rate_login_per_min: 600,
            rate_api_per_min: 600,
            api_prefix: "/api".to_string(),
            environment: "test".to_string(),
            log_dir: "logs".to_string(),
            log_level: "debug".to_string(),
            seed_admin: None,
        }
    }
}
