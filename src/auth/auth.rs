use actix_web::{FromRequest, HttpMessage, HttpRequest, dev::Payload};
use futures::future::{Ready, ready};

use crate::error::AppError;
use crate::model::admin::{Admin, Module};

/// The admin attached to the request by `auth_middleware`.
pub struct AuthAdmin {
    pub admin: Admin,
}

impl FromRequest for AuthAdmin {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let admin = req.extensions().get::<Admin>().cloned();

        ready(match admin {
            Some(admin) => Ok(AuthAdmin { admin }),
            None => Err(AppError::Unauthorized("Access denied. No token provided.".into()).into()),
        })
    }
}

impl AuthAdmin {
    pub fn id(&self) -> u64 {
        self.admin.id
    }

    pub fn require_permission(&self, module: Module) -> Result<(), AppError> {
        if self.admin.can_access(module) {
            Ok(())
        } else {
            Err(AppError::Forbidden(format!(
                "Access denied. You don't have permission to access {module} module."
            )))
        }
    }

    pub fn require_super_admin(&self) -> Result<(), AppError> {
        if self.admin.is_super_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Access denied. Insufficient privileges.".into(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::admin::{AdminRole, Permissions};
    use actix_web::test::TestRequest;
    use chrono::Utc;

    fn auth(role: AdminRole, finance: bool) -> AuthAdmin {
        AuthAdmin {
            admin: Admin {
                id: 3,
                username: "accounts".into(),
                email: "accounts@college.edu".into(),
                full_name: "Accounts Desk".into(),
                role,
                permissions: Permissions {
                    finance,
                    ..Permissions::default()
                },
                is_active: true,
                last_login: None,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn missing_permission_names_the_module() {
        let err = auth(AdminRole::Admin, false)
            .require_permission(Module::Finance)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Access denied. You don't have permission to access finance module."
        );
    }

    #[test]
    fn only_super_admin_passes_role_check() {
        assert!(auth(AdminRole::Admin, true).require_super_admin().is_err());
        assert!(auth(AdminRole::SuperAdmin, false).require_super_admin().is_ok());
    }

    #[actix_web::test]
    async fn extractor_reads_admin_from_extensions() {
        let req = TestRequest::default().to_http_request();
        assert!(AuthAdmin::extract(&req).await.is_err());

        req.extensions_mut().insert(auth(AdminRole::Admin, true).admin);
        let extracted = AuthAdmin::extract(&req).await.unwrap();
        assert_eq!(extracted.id(), 3);
    }
}
