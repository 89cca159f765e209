//! Application error type and its HTTP mapping.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use once_cell::sync::OnceCell;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// Whether 500 responses echo the underlying error. Set once at startup.
static EXPOSE_INTERNAL_ERRORS: OnceCell<bool> = OnceCell::new();

pub fn expose_internal_errors(expose: bool) {
    let _ = EXPOSE_INTERNAL_ERRORS.set(expose);
}

fn internal_errors_exposed() -> bool {
    *EXPOSE_INTERNAL_ERRORS.get().unwrap_or(&false)
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("{0}")]
    Duplicate(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{context}")]
    Internal { context: String, detail: String },
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn internal(context: impl Into<String>, detail: impl ToString) -> Self {
        AppError::Internal {
            context: context.into(),
            detail: detail.to_string(),
        }
    }

    /// Wraps a database error, turning unique-key violations into a 400.
    pub fn from_db(context: &str, err: sqlx::Error) -> Self {
        if is_duplicate_key(&err) {
            return AppError::Duplicate("Duplicate value for a unique field".to_string());
        }
        error!(error = %err, "{context}");
        AppError::internal(context, err)
    }
}

/// MySQL error 1062. Foreign-key failures share SQLSTATE 23000 and are not duplicates.
pub fn is_duplicate_key(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::BadRequest(_) | AppError::Duplicate(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let body = match self {
            AppError::Internal { context, detail } => {
                if internal_errors_exposed() {
                    json!({ "message": context, "error": detail })
                } else {
                    json!({ "message": context })
                }
            }
            other => json!({ "message": other.to_string() }),
        };
        HttpResponse::build(self.status_code()).json(body)
    }
}

impl From<jsonwebtoken::errors::Error> for AppError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        AppError::internal("Error issuing token", err)
    }
}

impl From<argon2::password_hash::Error> for AppError {
    fn from(err: argon2::password_hash::Error) -> Self {
        AppError::internal("Error hashing password", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use rstest::rstest;
    use serde_json::Value;

    #[rstest]
    #[case(AppError::Validation("bad year".into()), StatusCode::BAD_REQUEST)]
    #[case(AppError::Duplicate("dup".into()), StatusCode::BAD_REQUEST)]
    #[case(AppError::Unauthorized("no".into()), StatusCode::UNAUTHORIZED)]
    #[case(AppError::Forbidden("no".into()), StatusCode::FORBIDDEN)]
    #[case(AppError::NotFound("Student not found".into()), StatusCode::NOT_FOUND)]
    #[case(AppError::internal("boom", "db down"), StatusCode::INTERNAL_SERVER_ERROR)]
    fn maps_variants_to_status(#[case] err: AppError, #[case] expected: StatusCode) {
        assert_eq!(err.status_code(), expected);
    }

    #[actix_web::test]
    async fn message_body_carries_error_text() {
        let response = AppError::NotFound("Book not found".into()).error_response();
        let bytes = to_bytes(response.into_body()).await.expect("body");
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["message"], "Book not found");
    }

    #[actix_web::test]
    async fn internal_error_hides_source_by_default() {
        let response = AppError::internal("Error fetching students", "socket closed").error_response();
        let bytes = to_bytes(response.into_body()).await.expect("body");
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["message"], "Error fetching students");
        assert!(value.get("error").is_none());
    }
}
