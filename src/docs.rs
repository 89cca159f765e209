use crate::api::{
    employee::{EmployeeEnvelope, EmployeeListResponse, EmployeeMessage, EmployeeStats, SalaryStats},
    finance::{
        CategoryTotal, FinanceReport, FinanceSummary, MonthlyTotal, TransactionEnvelope,
        TransactionListResponse, TransactionMessage,
    },
    health::{DatabaseStatus, HealthResponse, LiveResponse, ReadyResponse},
    library::{
        BookEnvelope, BookListResponse, BookMessage, BorrowListResponse, BorrowMessage,
        LibraryStats, OverdueResponse,
    },
    student::{StudentEnvelope, StudentListResponse, StudentMessage, StudentStats, YearBucket},
};
use crate::model::{
    admin::{AdminResponse, AdminRole, Permissions},
    common::{Address, ContactPerson, CountBucket, Gender},
    employee::{
        CreateEmployee, Department, Employee, EmployeeStatus, EmployeeType, Experience,
        PreviousOrganization, Qualification, Salary, SalaryPatch, UpdateEmployee,
    },
    library::{
        AdminSummary, Book, BookCategory, BookStatus, BookSummary, BorrowRecord, BorrowStatus,
        BorrowerType, CreateBook, IssueBook, RenewBook, ReturnBook, ShelfLocation, UpdateBook,
    },
    student::{
        AcademicInfo, AcademicInfoPatch, CreateStudent, Course, FeeStatus, FeeStatusPatch,
        Student, StudentStatus, UpdateStudent,
    },
    transaction::{
        Attachment, CreateTransaction, EntityType, PaymentMethod, Transaction,
        TransactionCategory, TransactionStatus, TransactionType, UpdateTransaction,
        UpdateTransactionStatus,
    },
};
use crate::models::{
    AdminEnvelope, AdminListResponse, AdminMessage, AuthResponse, ChangePasswordRequest,
    LoginRequest, MessageResponse, RegisterRequest, TokenAdmin, UpdateAdminRequest,
    UpdateProfileRequest, VerifyResponse,
};
use utoipa::Modify;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{OpenApi, openapi};

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi
            .components
            .get_or_insert_with(openapi::Components::default);

        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .description(Some("Token returned by POST /api/auth/login"))
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    modifiers(&BearerAuth),
    info(
        title = "College Administration API",
        version = "1.0.0",
        description = r#"
## College Administration System

REST backend for the administrative office of an engineering college.

### Modules
- **Students**: enrollment records, fee status, academic progress
- **Employees**: teaching and non-teaching staff, salary with derived net pay
- **Finance**: income and expense transactions, approval, yearly reports
- **Library**: catalogue, issue, return and renewal of books

### Security
Every module sits behind **JWT Bearer authentication**. Each admin carries a
permission flag per module; `super_admin` bypasses them and alone may register
or manage other admins.

### Response Format
- camelCase JSON
- List endpoints return `{ <items>, totalPages, currentPage, total }`
- Errors return `{ message }`
"#,
    ),
    paths(
        crate::api::health::health,
        crate::api::health::ready,
        crate::api::health::live,

        crate::auth::handlers::register,
        crate::auth::handlers::login,
        crate::auth::handlers::get_profile,
        crate::auth::handlers::update_profile,
        crate::auth::handlers::change_password,
        crate::auth::handlers::verify,

        crate::api::admin::list_admins,
        crate::api::admin::update_admin,

        crate::api::student::list_students,
        crate::api::student::get_student,
        crate::api::student::create_student,
        crate::api::student::update_student,
        crate::api::student::delete_student,
        crate::api::student::student_stats,

        crate::api::employee::list_employees,
        crate::api::employee::get_employee,
        crate::api::employee::create_employee,
        crate::api::employee::update_employee,
        crate::api::employee::delete_employee,
        crate::api::employee::employee_stats,

        crate::api::finance::list_transactions,
        crate::api::finance::get_transaction,
        crate::api::finance::create_transaction,
        crate::api::finance::update_transaction,
        crate::api::finance::delete_transaction,
        crate::api::finance::update_transaction_status,
        crate::api::finance::finance_report,

        crate::api::library::list_books,
        crate::api::library::get_book,
        crate::api::library::create_book,
        crate::api::library::update_book,
        crate::api::library::delete_book,
        crate::api::library::list_borrows,
        crate::api::library::issue_book,
        crate::api::library::return_book,
        crate::api::library::renew_book,
        crate::api::library::overdue_books,
        crate::api::library::library_stats
    ),
    components(
        schemas(
            MessageResponse,
            HealthResponse,
            DatabaseStatus,
            ReadyResponse,
            LiveResponse,

            LoginRequest,
            RegisterRequest,
            UpdateProfileRequest,
            ChangePasswordRequest,
            UpdateAdminRequest,
            AuthResponse,
            AdminEnvelope,
            AdminMessage,
            AdminListResponse,
            AdminResponse,
            AdminRole,
            Permissions,
            TokenAdmin,
            VerifyResponse,

            Gender,
            Address,
            ContactPerson,
            CountBucket,

            Course,
            StudentStatus,
            AcademicInfo,
            AcademicInfoPatch,
            FeeStatus,
            FeeStatusPatch,
            Student,
            CreateStudent,
            UpdateStudent,
            StudentListResponse,
            StudentEnvelope,
            StudentMessage,
            StudentStats,
            YearBucket,

            Department,
            EmployeeType,
            EmployeeStatus,
            Salary,
            SalaryPatch,
            Qualification,
            PreviousOrganization,
            Experience,
            Employee,
            CreateEmployee,
            UpdateEmployee,
            EmployeeListResponse,
            EmployeeEnvelope,
            EmployeeMessage,
            EmployeeStats,
            SalaryStats,

            TransactionType,
            TransactionCategory,
            PaymentMethod,
            EntityType,
            TransactionStatus,
            Attachment,
            Transaction,
            CreateTransaction,
            UpdateTransaction,
            UpdateTransactionStatus,
            TransactionListResponse,
            TransactionEnvelope,
            TransactionMessage,
            FinanceSummary,
            CategoryTotal,
            MonthlyTotal,
            FinanceReport,

            BookCategory,
            BookStatus,
            BorrowerType,
            BorrowStatus,
            ShelfLocation,
            Book,
            CreateBook,
            UpdateBook,
            BookSummary,
            AdminSummary,
            BorrowRecord,
            IssueBook,
            ReturnBook,
            RenewBook,
            BookListResponse,
            BookEnvelope,
            BookMessage,
            BorrowListResponse,
            BorrowMessage,
            OverdueResponse,
            LibraryStats
        )
    ),
    tags(
        (name = "Health", description = "Health, readiness and liveness probes"),
        (name = "Auth", description = "Admin login, profile and registration"),
        (name = "Admins", description = "Admin role and permission management"),
        (name = "Students", description = "Student records"),
        (name = "Employees", description = "Employee records"),
        (name = "Finance", description = "Financial transactions and reports"),
        (name = "Library", description = "Books and borrow records"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_lists_every_module() {
        let doc = ApiDoc::openapi();
        let paths = &doc.paths.paths;

        for path in [
            "/api/health",
            "/api/auth/login",
            "/api/admins/{id}",
            "/api/students/stats/overview",
            "/api/employees/{id}",
            "/api/finance/reports/overview",
            "/api/library/borrows/{id}/renew",
        ] {
            assert!(paths.contains_key(path), "missing {path}");
        }
    }

    #[test]
    fn bearer_scheme_is_registered() {
        let doc = ApiDoc::openapi();
        let components = doc.components.expect("components");
        assert!(components.security_schemes.contains_key("bearer_auth"));
    }
}
