//! Helpers for tests that run against a real MySQL schema.
//!
//! Those tests read `TEST_DATABASE_URL` and skip themselves when it is unset,
//! so the unit suite still runs on machines without a database.

use actix_web::{
    App, Error,
    body::MessageBody,
    dev::{Service, ServiceFactory, ServiceRequest, ServiceResponse},
    http::StatusCode,
    test,
    web::Data,
};
use serde_json::Value;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;
use std::net::SocketAddr;
use uuid::Uuid;

use crate::auth::{jwt::generate_token, password::hash_password};
use crate::config::Config;
use crate::db::prepare_database;
use crate::model::admin::{Admin, AdminRole};
use crate::routes;
use crate::utils::admin_cache;

/// Migrated pool, or `None` when no test database is configured.
pub async fn pool() -> Option<MySqlPool> {
    let Ok(url) = std::env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping database test");
        return None;
    };

    let pool = MySqlPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect to TEST_DATABASE_URL");
    prepare_database(&pool, None)
        .await
        .expect("migrate test database");
    Some(pool)
}

/// The full router over `pool`, the same stack `main` serves.
pub fn app(
    pool: MySqlPool,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse<impl MessageBody>,
        Error = Error,
        InitError = (),
    >,
> {
    let config = Config::for_tests();
    App::new()
        .app_data(Data::new(pool))
        .app_data(Data::new(config.clone()))
        .configure(move |cfg| routes::configure(cfg, &config))
}

/// Source address for the rate limiter's key extractor.
pub fn peer() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 40_001))
}

pub fn unique(prefix: &str) -> String {
    format!("{prefix}{}", &Uuid::new_v4().to_string()[..8])
}

pub fn bearer(admin: &Admin) -> String {
    let config = Config::for_tests();
    let token = generate_token(admin, &config.jwt_secret, config.token_ttl).expect("token");
    format!("Bearer {token}")
}

/// Inserts an active admin with every module permission.
pub async fn insert_admin(pool: &MySqlPool, role: AdminRole, password: &str) -> Admin {
    let username = unique("desk");
    let result = sqlx::query(
        "INSERT INTO admins (username, email, password, full_name, role) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&username)
    .bind(format!("{username}@college.edu"))
    .bind(hash_password(password).expect("hash"))
    .bind("Front Desk")
    .bind(role.as_ref())
    .execute(pool)
    .await
    .expect("insert admin");

    admin_cache::load_admin(pool, result.last_insert_id())
        .await
        .expect("load admin")
        .expect("admin exists")
}

/// Sends `req` and decodes the JSON body.
pub async fn call<S, R, B>(app: &S, req: R) -> (StatusCode, Value)
where
    S: Service<R, Response = ServiceResponse<B>, Error = Error>,
    B: MessageBody,
{
    let resp = test::call_service(app, req).await;
    let status = resp.status();
    (status, test::read_body_json(resp).await)
}
