use crate::{
    auth::{
        auth::AuthAdmin,
        jwt::generate_token,
        password::{hash_password, verify_password},
    },
    config::Config,
    error::{AppError, AppResult, is_duplicate_key},
    model::admin::{Admin, AdminRow, SELECT_ADMIN},
    models::{
        AdminEnvelope, AdminMessage, AuthResponse, ChangePasswordRequest, LoginRequest,
        MessageResponse, RegisterRequest, TokenAdmin, UpdateProfileRequest, VerifyResponse,
    },
    utils::{
        admin_cache, identity_filter,
        db_utils::{UpdateSet, execute_update},
    },
};
use actix_web::{HttpResponse, web};
use chrono::Utc;
use sqlx::MySqlPool;
use tracing::{debug, error, info, instrument};

const DUPLICATE_ADMIN: &str = "Admin with this email or username already exists";

/// true  => username and email both AVAILABLE
/// false => at least one is TAKEN
pub async fn is_identity_available(
    username: &str,
    email: &str,
    pool: &MySqlPool,
) -> AppResult<bool> {
    // Cuckoo filter gives a fast negative; a hit may be a false positive.
    if !identity_filter::might_exist(username) && !identity_filter::might_exist(email) {
        return Ok(true);
    }

    let taken = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM admins WHERE username = ? OR email = ?",
    )
    .bind(username)
    .bind(email)
    .fetch_one(pool)
    .await
    .map_err(|e| AppError::from_db("Error registering admin", e))?;

    Ok(taken == 0)
}

async fn reload_admin(pool: &MySqlPool, admin_id: u64) -> AppResult<Admin> {
    admin_cache::invalidate(admin_id).await;
    admin_cache::load_admin(pool, admin_id)
        .await
        .map_err(|e| AppError::from_db("Error loading admin", e))?
        .ok_or_else(|| AppError::NotFound("Admin not found".into()))
}

/// Register admin (super admin only)
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Admin registered", body = AuthResponse),
        (status = 400, description = "Validation failed or admin already exists", body = MessageResponse),
        (status = 403, description = "Caller is not a super admin", body = MessageResponse)
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn register(
    auth: AuthAdmin,
    body: web::Json<RegisterRequest>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    auth.require_super_admin()?;
    let body = body.into_inner().normalize()?;

    if !is_identity_available(&body.username, &body.email, pool.get_ref()).await? {
        return Err(AppError::Duplicate(DUPLICATE_ADMIN.into()));
    }

    let hashed = hash_password(&body.password)?;

    let result = sqlx::query(
        r#"
        INSERT INTO admins
        (username, email, password, full_name, role,
         perm_students, perm_employees, perm_finance, perm_library)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&body.username)
    .bind(&body.email)
    .bind(&hashed)
    .bind(&body.full_name)
    .bind(body.role.as_ref())
    .bind(body.permissions.students)
    .bind(body.permissions.employees)
    .bind(body.permissions.finance)
    .bind(body.permissions.library)
    .execute(pool.get_ref())
    .await
    .map_err(|e| {
        if is_duplicate_key(&e) {
            AppError::Duplicate(DUPLICATE_ADMIN.into())
        } else {
            AppError::from_db("Error registering admin", e)
        }
    })?;

    identity_filter::insert(&body.username);
    identity_filter::insert(&body.email);

    let admin = reload_admin(pool.get_ref(), result.last_insert_id()).await?;
    let token = generate_token(&admin, &config.jwt_secret, config.token_ttl)?;

    info!(admin_id = admin.id, created_by = auth.id(), "Admin registered");

    Ok(HttpResponse::Created().json(AuthResponse {
        message: "Admin registered successfully".into(),
        token,
        admin: (&admin).into(),
    }))
}

/// Login with username or email
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or deactivated account", body = MessageResponse)
    ),
    tag = "Auth"
)]
#[instrument(
    name = "auth_login",
    skip(pool, config, body),
    fields(username = %body.username)
)]
pub async fn login(
    body: web::Json<LoginRequest>,
    pool: web::Data<MySqlPool>,
    config: web::Data<Config>,
) -> AppResult<HttpResponse> {
    info!("Login request received");

    // 1. Basic validation
    let username = body.username.trim();
    if username.is_empty() || body.password.is_empty() {
        info!("Validation failed: empty username or password");
        return Err(AppError::Validation(
            "username and password are required".into(),
        ));
    }

    // 2. Fetch admin by username or email
    debug!("Fetching admin from database");

    let row = sqlx::query_as::<_, AdminRow>(&format!(
        "{SELECT_ADMIN} WHERE username = ? OR email = ? LIMIT 1"
    ))
    .bind(username)
    .bind(username.to_lowercase())
    .fetch_optional(pool.get_ref())
    .await
    .map_err(|e| AppError::from_db("Error during login", e))?;

    let Some(row) = row else {
        info!("Invalid credentials: admin not found");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    };
    debug!(admin_id = row.id, "Admin found");

    // 3. Deactivated accounts never get a token
    if !row.is_active {
        info!(admin_id = row.id, "Login refused: account deactivated");
        return Err(AppError::Unauthorized("Account is deactivated".into()));
    }

    // 4. Verify password
    debug!("Verifying password");

    if !verify_password(&body.password, &row.password)? {
        info!("Invalid credentials: password mismatch");
        return Err(AppError::Unauthorized("Invalid credentials".into()));
    }

    // 5. Update last_login (non-fatal)
    let mut admin = row.into_admin();

    if let Err(e) = sqlx::query("UPDATE admins SET last_login = ? WHERE id = ?")
        .bind(Utc::now())
        .bind(admin.id)
        .execute(pool.get_ref())
        .await
    {
        error!(error = %e, "Failed to update last_login");
    } else {
        admin.last_login = Some(Utc::now());
    }
    admin_cache::put(admin.clone()).await;

    // 6. Generate token
    debug!("Generating token");
    let token = generate_token(&admin, &config.jwt_secret, config.token_ttl)?;

    info!(admin_id = admin.id, "Login successful");

    Ok(HttpResponse::Ok().json(AuthResponse {
        message: "Login successful".into(),
        token,
        admin: (&admin).into(),
    }))
}

/// Current admin profile
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Profile of the token's admin", body = AdminEnvelope),
        (status = 401, description = "Missing or invalid token", body = MessageResponse)
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn get_profile(auth: AuthAdmin) -> AppResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(AdminEnvelope {
        admin: (&auth.admin).into(),
    }))
}

/// Update full name and/or email
#[utoipa::path(
    put,
    path = "/api/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = AdminMessage),
        (status = 400, description = "Validation failed or email in use", body = MessageResponse)
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    auth: AuthAdmin,
    body: web::Json<UpdateProfileRequest>,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    let body = body.into_inner().normalize()?;
    let admin_id = auth.id();

    if let Some(email) = &body.email {
        let taken = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM admins WHERE email = ? AND id <> ?",
        )
        .bind(email)
        .bind(admin_id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error updating profile", e))?;

        if taken > 0 {
            return Err(AppError::Duplicate(DUPLICATE_ADMIN.into()));
        }
    }

    let mut set = UpdateSet::new("admins");
    set.set_opt("full_name", body.full_name.clone())
        .set_opt("email", body.email.clone());

    if let Some(update) = set.build("id", admin_id) {
        execute_update(pool.get_ref(), update)
            .await
            .map_err(|e| AppError::from_db("Error updating profile", e))?;
    }

    if let Some(email) = &body.email {
        if *email != auth.admin.email {
            identity_filter::remove(&auth.admin.email);
            identity_filter::insert(email);
        }
    }

    let admin = reload_admin(pool.get_ref(), admin_id).await?;

    Ok(HttpResponse::Ok().json(AdminMessage {
        message: "Profile updated successfully".into(),
        admin: (&admin).into(),
    }))
}

/// Change own password
#[utoipa::path(
    put,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed", body = MessageResponse),
        (status = 400, description = "Current password is incorrect", body = MessageResponse)
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    auth: AuthAdmin,
    body: web::Json<ChangePasswordRequest>,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    body.validate()?;

    let stored = sqlx::query_scalar::<_, String>("SELECT password FROM admins WHERE id = ?")
        .bind(auth.id())
        .fetch_optional(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error changing password", e))?
        .ok_or_else(|| AppError::NotFound("Admin not found".into()))?;

    if !verify_password(&body.current_password, &stored)? {
        return Err(AppError::BadRequest("Current password is incorrect".into()));
    }

    let hashed = hash_password(&body.new_password)?;

    sqlx::query("UPDATE admins SET password = ? WHERE id = ?")
        .bind(&hashed)
        .bind(auth.id())
        .execute(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error changing password", e))?;

    info!(admin_id = auth.id(), "Password changed");

    Ok(HttpResponse::Ok().json(MessageResponse::new("Password changed successfully")))
}

/// Check that a token is still valid
#[utoipa::path(
    get,
    path = "/api/auth/verify",
    responses(
        (status = 200, description = "Token is valid", body = VerifyResponse),
        (status = 401, description = "Missing or invalid token", body = MessageResponse)
    ),
    tag = "Auth",
    security(("bearer_auth" = []))
)]
pub async fn verify(auth: AuthAdmin) -> AppResult<HttpResponse> {
    let admin = auth.admin;
    Ok(HttpResponse::Ok().json(VerifyResponse {
        valid: true,
        admin: TokenAdmin {
            id: admin.id,
            username: admin.username,
            role: admin.role,
            permissions: admin.permissions,
        },
    }))
}

#[cfg(test)]
mod tests {
    use crate::model::admin::AdminRole;
    use crate::testing;
    use actix_web::{http::StatusCode, test};
    use serde_json::json;

    #[actix_web::test]
    async fn deactivation_revokes_an_issued_token() {
        let Some(pool) = testing::pool().await else {
            return;
        };
        let desk = testing::insert_admin(&pool, AdminRole::Admin, "front-desk-1").await;
        let root = testing::insert_admin(&pool, AdminRole::SuperAdmin, "root-desk-1").await;
        let app = test::init_service(testing::app(pool)).await;

        let (status, login) = testing::call(
            &app,
            test::TestRequest::post()
                .uri("/api/auth/login")
                .peer_addr(testing::peer())
                .set_json(json!({ "username": desk.email, "password": "front-desk-1" }))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(login["admin"].get("password").is_none());
        let token = format!("Bearer {}", login["token"].as_str().unwrap());

        let profile = || {
            test::TestRequest::get()
                .uri("/api/auth/profile")
                .insert_header(("Authorization", token.clone()))
                .peer_addr(testing::peer())
                .to_request()
        };

        let (status, body) = testing::call(&app, profile()).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["admin"]["username"], desk.username.as_str());
        assert!(body["admin"]["lastLogin"].is_string());

        let (status, _) = testing::call(
            &app,
            test::TestRequest::patch()
                .uri(&format!("/api/admins/{}", desk.id))
                .insert_header(("Authorization", testing::bearer(&root)))
                .peer_addr(testing::peer())
                .set_json(json!({ "isActive": false }))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = testing::call(&app, profile()).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["message"], "Account is deactivated.");

        let (status, _) = testing::call(
            &app,
            test::TestRequest::post()
                .uri("/api/auth/login")
                .peer_addr(testing::peer())
                .set_json(json!({ "username": desk.username, "password": "front-desk-1" }))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
