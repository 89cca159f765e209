use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use utoipa::ToSchema;

/// Functional areas gated by the admin permission map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Module {
    Students,
    Employees,
    Finance,
    Library,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, AsRefStr, EnumString, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AdminRole {
    #[default]
    Admin,
    SuperAdmin,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct Permissions {
    pub students: bool,
    pub employees: bool,
    pub finance: bool,
    pub library: bool,
}

impl Default for Permissions {
    fn default() -> Self {
        Self {
            students: true,
            employees: true,
            finance: true,
            library: true,
        }
    }
}

impl Permissions {
    pub fn allows(&self, module: Module) -> bool {
        match module {
            Module::Students => self.students,
            Module::Employees => self.employees,
            Module::Finance => self.finance,
            Module::Library => self.library,
        }
    }
}

pub const SELECT_ADMIN: &str = "SELECT id, username, email, password, full_name, role, \
     perm_students, perm_employees, perm_finance, perm_library, is_active, last_login, \
     created_at FROM admins";

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AdminRow {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: String,
    pub role: String,
    pub perm_students: bool,
    pub perm_employees: bool,
    pub perm_finance: bool,
    pub perm_library: bool,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Admin record as the rest of the service sees it; never carries the hash.
#[derive(Debug, Clone, PartialEq)]
pub struct Admin {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: AdminRole,
    pub permissions: Permissions,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl AdminRow {
    pub fn permissions(&self) -> Permissions {
        Permissions {
            students: self.perm_students,
            employees: self.perm_employees,
            finance: self.perm_finance,
            library: self.perm_library,
        }
    }

    /// Unknown role strings fall back to the least privileged role.
    pub fn into_admin(self) -> Admin {
        Admin {
            role: self.role.parse().unwrap_or_default(),
            permissions: self.permissions(),
            id: self.id,
            username: self.username,
            email: self.email,
            full_name: self.full_name,
            is_active: self.is_active,
            last_login: self.last_login,
            created_at: self.created_at,
        }
    }
}

impl Admin {
    pub fn is_super_admin(&self) -> bool {
        self.role == AdminRole::SuperAdmin
    }

    /// Super admins bypass the permission map.
    pub fn can_access(&self, module: Module) -> bool {
        self.is_super_admin() || self.permissions.allows(module)
    }
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub id: u64,
    pub username: String,
    pub email: String,
    pub full_name: String,
    pub role: AdminRole,
    pub permissions: Permissions,
    pub is_active: bool,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<&Admin> for AdminResponse {
    fn from(admin: &Admin) -> Self {
        Self {
            id: admin.id,
            username: admin.username.clone(),
            email: admin.email.clone(),
            full_name: admin.full_name.clone(),
            role: admin.role,
            permissions: admin.permissions,
            is_active: admin.is_active,
            last_login: admin.last_login,
            created_at: admin.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn admin(role: AdminRole, permissions: Permissions) -> Admin {
        Admin {
            id: 1,
            username: "clerk".into(),
            email: "clerk@college.edu".into(),
            full_name: "Front Office".into(),
            role,
            permissions,
            is_active: true,
            last_login: None,
            created_at: Utc::now(),
        }
    }

    #[rstest]
    #[case(Module::Students, true)]
    #[case(Module::Employees, false)]
    #[case(Module::Finance, false)]
    #[case(Module::Library, true)]
    fn admin_access_follows_permission_map(#[case] module: Module, #[case] expected: bool) {
        let perms = Permissions {
            students: true,
            employees: false,
            finance: false,
            library: true,
        };
        assert_eq!(admin(AdminRole::Admin, perms).can_access(module), expected);
    }

    #[rstest]
    #[case(Module::Students)]
    #[case(Module::Employees)]
    #[case(Module::Finance)]
    #[case(Module::Library)]
    fn super_admin_bypasses_permission_map(#[case] module: Module) {
        let none = Permissions {
            students: false,
            employees: false,
            finance: false,
            library: false,
        };
        assert!(admin(AdminRole::SuperAdmin, none).can_access(module));
    }

    #[test]
    fn role_uses_snake_case_strings() {
        assert_eq!(AdminRole::SuperAdmin.as_ref(), "super_admin");
        assert_eq!("admin".parse::<AdminRole>().unwrap(), AdminRole::Admin);
        assert_eq!(
            serde_json::to_value(AdminRole::SuperAdmin).unwrap(),
            serde_json::json!("super_admin")
        );
    }

    #[test]
    fn permissions_default_to_all_modules() {
        let perms: Permissions = serde_json::from_str(r#"{"finance": false}"#).unwrap();
        assert!(perms.students && perms.employees && perms.library);
        assert!(!perms.finance);
    }

    #[test]
    fn module_names_are_lowercase() {
        assert_eq!(Module::Finance.to_string(), "finance");
    }
}
