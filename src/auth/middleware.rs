use crate::auth::jwt::verify_token;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::model::admin::Admin;
use crate::utils::admin_cache;
use actix_web::middleware::Next;
use actix_web::{
    Error, HttpMessage, ResponseError,
    body::BoxBody,
    dev::{ServiceRequest, ServiceResponse},
    web::Data,
};
use sqlx::MySqlPool;
use tracing::{debug, error};

fn reject(req: ServiceRequest, err: AppError) -> Result<ServiceResponse<BoxBody>, Error> {
    Ok(req.into_response(err.error_response()))
}

/// A token is only as good as the admin behind it.
pub fn authorize(admin: Option<Admin>) -> AppResult<Admin> {
    match admin {
        None => Err(AppError::Unauthorized(
            "Invalid token. Admin not found.".into(),
        )),
        Some(admin) if !admin.is_active => {
            Err(AppError::Unauthorized("Account is deactivated.".into()))
        }
        Some(admin) => Ok(admin),
    }
}

pub fn bearer_token(header: Option<&str>) -> Option<&str> {
    header
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

pub async fn auth_middleware(
    req: ServiceRequest,
    next: Next<BoxBody>,
) -> Result<ServiceResponse<BoxBody>, Error> {
    let config = req
        .app_data::<Data<Config>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("App config missing"))?
        .clone();
    let pool = req
        .app_data::<Data<MySqlPool>>()
        .ok_or_else(|| actix_web::error::ErrorInternalServerError("Database pool missing"))?
        .clone();

    let header = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok());

    let Some(token) = bearer_token(header) else {
        return reject(
            req,
            AppError::Unauthorized("Access denied. No token provided.".into()),
        );
    };

    let claims = match verify_token(token, &config.jwt_secret) {
        Ok(c) => c,
        Err(e) => {
            debug!(error = %e, "Rejected bearer token");
            return reject(req, AppError::Unauthorized("Invalid token.".into()));
        }
    };

    let admin = match admin_cache::load_admin(pool.get_ref(), claims.id).await {
        Ok(admin) => admin,
        Err(e) => {
            error!(error = %e, admin_id = claims.id, "Failed to load admin for token");
            return reject(req, AppError::Unauthorized("Invalid token.".into()));
        }
    };

    match authorize(admin) {
        Ok(admin) => {
            req.extensions_mut().insert(admin);
            next.call(req).await
        }
        Err(e) => reject(req, e),
    }
}
