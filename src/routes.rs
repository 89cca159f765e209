use crate::{
    api::{admin, employee, finance, health, library, student},
    auth::{handlers, middleware::auth_middleware},
    config::Config,
};
use actix_governor::{
    Governor, GovernorConfigBuilder, PeerIpKeyExtractor, governor::middleware::NoOpMiddleware,
};
use actix_web::{
    Error, HttpRequest, HttpResponse, error::InternalError, middleware::from_fn, web,
};
use serde_json::json;
use std::sync::Arc;
use tracing::debug;

const JSON_LIMIT: usize = 10 * 1024 * 1024;

fn build_limiter(requests_per_min: u32) -> Governor<PeerIpKeyExtractor, NoOpMiddleware> {
    let requests_per_min = requests_per_min.max(1);
    let per_ms = (60_000 / u64::from(requests_per_min)).max(1);
    let cfg = GovernorConfigBuilder::default()
        .per_millisecond(per_ms)
        .burst_size(requests_per_min)
        .key_extractor(PeerIpKeyExtractor)
        .finish()
        .unwrap_or_default();
    Governor::new(&cfg)
}

fn bad_request<E>(err: E, message: String) -> Error
where
    E: std::fmt::Debug + std::fmt::Display + 'static,
{
    debug!(error = %err, "Rejected malformed request");
    InternalError::from_response(err, HttpResponse::BadRequest().json(json!({ "message": message })))
        .into()
}

fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(JSON_LIMIT)
        .error_handler(|err, _req| {
            let message = err.to_string();
            bad_request(err, message)
        })
}

fn query_config() -> web::QueryConfig {
    web::QueryConfig::default().error_handler(|err, _req| {
        let message = err.to_string();
        bad_request(err, message)
    })
}

fn path_config() -> web::PathConfig {
    web::PathConfig::default().error_handler(|err, _req| bad_request(err, "Invalid id".to_string()))
}

pub async fn route_not_found(req: HttpRequest) -> HttpResponse {
    debug!(method = %req.method(), path = %req.path(), "No route matched");
    HttpResponse::NotFound().json(json!({ "message": "Route not found" }))
}

pub fn configure(cfg: &mut web::ServiceConfig, config: &Config) {
    let login_limiter = Arc::new(build_limiter(config.rate_login_per_min));
    let api_limiter = Arc::new(build_limiter(config.rate_api_per_min));

    cfg.app_data(json_config())
        .app_data(query_config())
        .app_data(path_config());

    cfg.service(
        web::scope(&config.api_prefix)
            // Public
            .route("/health", web::get().to(health::health))
            .route("/ready", web::get().to(health::ready))
            .route("/live", web::get().to(health::live))
            .service(
                web::resource("/auth/login")
                    .wrap(login_limiter)
                    .route(web::post().to(handlers::login)),
            )
            // Protected; the limiter runs before token verification
            .service(
                web::scope("/auth")
                    .wrap(from_fn(auth_middleware))
                    .wrap(api_limiter.clone())
                    .route("/register", web::post().to(handlers::register))
                    .service(
                        web::resource("/profile")
                            .route(web::get().to(handlers::get_profile))
                            .route(web::put().to(handlers::update_profile)),
                    )
                    .route("/change-password", web::put().to(handlers::change_password))
                    .route("/verify", web::get().to(handlers::verify)),
            )
            .service(
                web::scope("/admins")
                    .wrap(from_fn(auth_middleware))
                    .wrap(api_limiter.clone())
                    .route("", web::get().to(admin::list_admins))
                    .route("/{id}", web::patch().to(admin::update_admin)),
            )
            .service(
                web::scope("/students")
                    .wrap(from_fn(auth_middleware))
                    .wrap(api_limiter.clone())
                    .service(
                        web::resource("")
                            .route(web::get().to(student::list_students))
                            .route(web::post().to(student::create_student)),
                    )
                    // before /{id}
                    .route("/stats/overview", web::get().to(student::student_stats))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(student::get_student))
                            .route(web::put().to(student::update_student))
                            .route(web::delete().to(student::delete_student)),
                    ),
            )
            .service(
                web::scope("/employees")
                    .wrap(from_fn(auth_middleware))
                    .wrap(api_limiter.clone())
                    .service(
                        web::resource("")
                            .route(web::get().to(employee::list_employees))
                            .route(web::post().to(employee::create_employee)),
                    )
                    .route("/stats/overview", web::get().to(employee::employee_stats))
                    .service(
                        web::resource("/{id}")
                            .route(web::get().to(employee::get_employee))
                            .route(web::put().to(employee::update_employee))
                            .route(web::delete().to(employee::delete_employee)),
                    ),
            )
            .service(
                web::scope("/finance")
                    .wrap(from_fn(auth_middleware))
                    .wrap(api_limiter.clone())
                    .service(
                        web::resource("/transactions")
                            .route(web::get().to(finance::list_transactions))
                            .route(web::post().to(finance::create_transaction)),
                    )
                    .service(
                        web::resource("/transactions/{id}")
                            .route(web::get().to(finance::get_transaction))
                            .route(web::put().to(finance::update_transaction))
                            .route(web::delete().to(finance::delete_transaction)),
                    )
                    .route(
                        "/transactions/{id}/status",
                        web::patch().to(finance::update_transaction_status),
                    )
                    .route("/reports/overview", web::get().to(finance::finance_report)),
            )
            .service(
                web::scope("/library")
                    .wrap(from_fn(auth_middleware))
                    .wrap(api_limiter)
                    .service(
                        web::resource("/books")
                            .route(web::get().to(library::list_books))
                            .route(web::post().to(library::create_book)),
                    )
                    .service(
                        web::resource("/books/{id}")
                            .route(web::get().to(library::get_book))
                            .route(web::put().to(library::update_book))
                            .route(web::delete().to(library::delete_book)),
                    )
                    .service(
                        web::resource("/borrows")
                            .route(web::get().to(library::list_borrows))
                            .route(web::post().to(library::issue_book)),
                    )
                    .route("/borrows/{id}/return", web::patch().to(library::return_book))
                    .route("/borrows/{id}/renew", web::patch().to(library::renew_book))
                    .route("/overdue", web::get().to(library::overdue_books))
                    .route("/stats/overview", web::get().to(library::library_stats)),
            )
            .default_service(web::to(route_not_found)),
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::generate_token;
    use crate::model::admin::{Admin, AdminRole, Permissions};
    use crate::utils::admin_cache;
    use actix_web::{App, dev::ServiceResponse, http::StatusCode, test, web::Data};
    use chrono::Utc;
    use serde_json::Value;
    use sqlx::mysql::MySqlPoolOptions;
    use std::time::Duration;

    const PEER: &str = "127.0.0.1:40000";

    fn cached_admin(id: u64, role: AdminRole, permissions: Permissions, is_active: bool) -> Admin {
        Admin {
            id,
            username: format!("routes{id}"),
            email: format!("routes{id}@college.edu"),
            full_name: "Route Tester".into(),
            role,
            permissions,
            is_active,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    macro_rules! app {
        () => {{
            let config = Config::for_tests();
            let pool = MySqlPoolOptions::new()
                .acquire_timeout(Duration::from_millis(300))
                .connect_lazy(&config.database_url)
                .expect("lazy pool");

            test::init_service(
                App::new()
                    .app_data(Data::new(pool))
                    .app_data(Data::new(config.clone()))
                    .configure(|cfg| configure(cfg, &config)),
            )
            .await
        }};
    }

    async fn body(resp: ServiceResponse) -> Value {
        test::read_body_json(resp).await
    }

    fn bearer_for(admin: &Admin) -> String {
        let config = Config::for_tests();
        let token = generate_token(admin, &config.jwt_secret, config.token_ttl).unwrap();
        format!("Bearer {token}")
    }

    #[actix_web::test]
    async fn protected_route_without_token_is_401() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/students")
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(resp).await["message"], "Access denied. No token provided.");
    }

    #[actix_web::test]
    async fn garbage_token_is_401() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/library/books")
            .insert_header(("Authorization", "Bearer not.a.token"))
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(resp).await["message"], "Invalid token.");
    }

    #[actix_web::test]
    async fn deactivated_admin_token_is_401() {
        let admin = cached_admin(9101, AdminRole::Admin, Permissions::default(), false);
        admin_cache::put(admin.clone()).await;

        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/auth/profile")
            .insert_header(("Authorization", bearer_for(&admin)))
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(body(resp).await["message"], "Account is deactivated.");
    }

    #[actix_web::test]
    async fn active_admin_reads_own_profile() {
        let admin = cached_admin(9102, AdminRole::Admin, Permissions::default(), true);
        admin_cache::put(admin.clone()).await;

        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/auth/profile")
            .insert_header(("Authorization", bearer_for(&admin)))
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        let value = body(resp).await;
        assert_eq!(value["admin"]["username"], "routes9102");
        assert!(value["admin"].get("password").is_none());
    }

    #[actix_web::test]
    async fn missing_module_permission_is_403() {
        let permissions = Permissions {
            finance: false,
            ..Permissions::default()
        };
        let admin = cached_admin(9103, AdminRole::Admin, permissions, true);
        admin_cache::put(admin.clone()).await;

        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/finance/transactions")
            .insert_header(("Authorization", bearer_for(&admin)))
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            body(resp).await["message"],
            "Access denied. You don't have permission to access finance module."
        );
    }

    #[actix_web::test]
    async fn register_requires_super_admin() {
        let admin = cached_admin(9104, AdminRole::Admin, Permissions::default(), true);
        admin_cache::put(admin.clone()).await;

        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/auth/register")
            .insert_header(("Authorization", bearer_for(&admin)))
            .peer_addr(PEER.parse().unwrap())
            .set_json(json!({
                "username": "newdesk",
                "email": "newdesk@college.edu",
                "password": "secret99",
                "fullName": "New Desk"
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[actix_web::test]
    async fn non_numeric_id_is_400() {
        let admin = cached_admin(9105, AdminRole::SuperAdmin, Permissions::default(), true);
        admin_cache::put(admin.clone()).await;

        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/students/abc")
            .insert_header(("Authorization", bearer_for(&admin)))
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body(resp).await["message"], "Invalid id");
    }

    #[actix_web::test]
    async fn malformed_return_body_is_400_not_a_zero_fine() {
        let admin = cached_admin(9106, AdminRole::Admin, Permissions::default(), true);
        admin_cache::put(admin.clone()).await;

        let app = app!();
        let req = test::TestRequest::patch()
            .uri("/api/library/borrows/1/return")
            .insert_header(("Authorization", bearer_for(&admin)))
            .insert_header(("Content-Type", "application/json"))
            .peer_addr(PEER.parse().unwrap())
            .set_payload(r#"{"fine":"25"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let message = body(resp).await["message"].as_str().unwrap_or_default().to_string();
        assert!(message.starts_with("Json deserialize error"), "{message}");
    }

    #[actix_web::test]
    async fn malformed_login_body_is_400() {
        let app = app!();
        let req = test::TestRequest::post()
            .uri("/api/auth/login")
            .insert_header(("Content-Type", "application/json"))
            .peer_addr(PEER.parse().unwrap())
            .set_payload("{not json")
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(body(resp).await["message"].is_string());
    }

    #[actix_web::test]
    async fn unknown_route_is_404() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/timetable")
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(body(resp).await["message"], "Route not found");
    }

    #[actix_web::test]
    async fn live_is_always_200() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/live")
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body(resp).await["status"], "alive");
    }

    #[actix_web::test]
    async fn ready_without_database_is_503() {
        let app = app!();
        let req = test::TestRequest::get()
            .uri("/api/ready")
            .peer_addr(PEER.parse().unwrap())
            .to_request();
        let resp = test::call_service(&app, req).await;

        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body(resp).await["status"], "not ready");
    }
}
