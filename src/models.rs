use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::model::admin::{AdminResponse, AdminRole, Permissions};
use crate::model::common::{normalize_email, require_text};

const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
    /// Admin username
    pub sub: String,
    pub id: u64,
    pub role: AdminRole,
    pub iat: usize,
    pub exp: usize,
    pub jti: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or email
    #[schema(example = "superadmin")]
    pub username: String,
    #[schema(example = "changeme123")]
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[schema(example = "librarian")]
    pub username: String,
    #[schema(example = "librarian@college.edu")]
    pub email: String,
    pub password: String,
    #[schema(example = "Asha Menon")]
    pub full_name: String,
    #[serde(default)]
    pub role: AdminRole,
    #[serde(default)]
    pub permissions: Permissions,
}

impl RegisterRequest {
    pub fn normalize(mut self) -> AppResult<Self> {
        self.username = require_text("username", &self.username)?;
        if self.username.len() < 3 {
            return Err(AppError::Validation(
                "username must be at least 3 characters".into(),
            ));
        }
        self.email = normalize_email(&self.email)?;
        self.full_name = require_text("fullName", &self.full_name)?;
        check_password("password", &self.password)?;
        Ok(self)
    }
}

#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

impl UpdateProfileRequest {
    pub fn normalize(mut self) -> AppResult<Self> {
        if let Some(v) = self.full_name.take() {
            self.full_name = Some(require_text("fullName", &v)?);
        }
        if let Some(v) = self.email.take() {
            self.email = Some(normalize_email(&v)?);
        }
        Ok(self)
    }
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> AppResult<()> {
        if self.current_password.is_empty() {
            return Err(AppError::Validation("currentPassword is required".into()));
        }
        check_password("newPassword", &self.new_password)
    }
}

/// Role, permission and activation changes made by a super admin.
#[derive(Deserialize, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAdminRequest {
    pub role: Option<AdminRole>,
    pub permissions: Option<Permissions>,
    pub is_active: Option<bool>,
}

fn check_password(field: &str, password: &str) -> AppResult<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "{field} must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    #[schema(example = "Login successful")]
    pub message: String,
    pub token: String,
    pub admin: AdminResponse,
}

#[derive(Serialize, ToSchema)]
pub struct AdminEnvelope {
    pub admin: AdminResponse,
}

#[derive(Serialize, ToSchema)]
pub struct AdminMessage {
    pub message: String,
    pub admin: AdminResponse,
}

#[derive(Serialize, ToSchema)]
pub struct TokenAdmin {
    pub id: u64,
    pub username: String,
    pub role: AdminRole,
    pub permissions: Permissions,
}

#[derive(Serialize, ToSchema)]
pub struct VerifyResponse {
    pub valid: bool,
    pub admin: TokenAdmin,
}

#[derive(Serialize, ToSchema)]
pub struct AdminListResponse {
    pub admins: Vec<AdminResponse>,
}

#[derive(Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Deleted successfully")]
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn register_defaults_role_and_permissions() {
        let body: RegisterRequest = serde_json::from_value(json!({
            "username": " bursar ",
            "email": "Bursar@College.edu",
            "password": "secret99",
            "fullName": "R. Iyer"
        }))
        .unwrap();
        let body = body.normalize().unwrap();

        assert_eq!(body.username, "bursar");
        assert_eq!(body.email, "bursar@college.edu");
        assert_eq!(body.role, AdminRole::Admin);
        assert_eq!(body.permissions, Permissions::default());
    }

    #[test]
    fn register_rejects_short_password() {
        let body: RegisterRequest = serde_json::from_value(json!({
            "username": "bursar",
            "email": "bursar@college.edu",
            "password": "123",
            "fullName": "R. Iyer"
        }))
        .unwrap();
        assert!(matches!(body.normalize(), Err(AppError::Validation(_))));
    }

    #[test]
    fn change_password_requires_current() {
        let body = ChangePasswordRequest {
            current_password: String::new(),
            new_password: "longenough".into(),
        };
        assert!(body.validate().is_err());
    }
}
