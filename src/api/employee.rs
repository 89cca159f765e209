use crate::{
    auth::auth::AuthAdmin,
    error::{AppError, AppResult, is_duplicate_key},
    model::{
        admin::Module,
        common::CountBucket,
        employee::{CreateEmployee, Employee, EmployeeRow, NET_SALARY_SQL, UpdateEmployee},
    },
    models::MessageResponse,
    utils::{
        db_utils::{Filter, SqlValue, UpdateSet, execute_update, fetch_page},
        pagination::Page,
    },
};
use actix_web::{HttpResponse, web};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, types::Json};
use tracing::info;
use utoipa::{IntoParams, ToSchema};

const DUPLICATE_EMPLOYEE: &str = "Employee with this ID or email already exists";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct EmployeeQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Matches names, employee ID, email or designation
    pub search: Option<String>,
    pub department: Option<String>,
    pub employee_type: Option<String>,
    /// Defaults to `Active`; pass an empty value to list every status
    pub status: Option<String>,
}

impl EmployeeQuery {
    pub fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        filter
            .search(
                &["first_name", "last_name", "employee_id", "email", "designation"],
                self.search.as_deref(),
            )
            .eq_opt("department", self.department.as_deref())
            .eq_opt("employee_type", self.employee_type.as_deref())
            .eq_opt("status", Some(self.status.as_deref().unwrap_or("Active")));
        filter
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeListResponse {
    pub employees: Vec<Employee>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeEnvelope {
    pub employee: Employee,
}

#[derive(Serialize, ToSchema)]
pub struct EmployeeMessage {
    pub message: String,
    pub employee: Employee,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct SalaryStats {
    pub total_salary: Option<f64>,
    pub avg_salary: Option<f64>,
    pub min_salary: Option<f64>,
    pub max_salary: Option<f64>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeStats {
    pub total_employees: i64,
    pub department_stats: Vec<CountBucket>,
    pub type_stats: Vec<CountBucket>,
    pub salary_stats: SalaryStats,
}

async fn fetch_employee(pool: &MySqlPool, id: u64) -> AppResult<Option<Employee>> {
    let row = sqlx::query_as::<_, EmployeeRow>("SELECT * FROM employees WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::from_db("Error fetching employee", e))?;
    Ok(row.map(Employee::from))
}

fn duplicate_or(context: &str, e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Duplicate(DUPLICATE_EMPLOYEE.into())
    } else {
        AppError::from_db(context, e)
    }
}

/// List employees
#[utoipa::path(
    get,
    path = "/api/employees",
    params(EmployeeQuery),
    responses(
        (status = 200, description = "Paginated employee list", body = EmployeeListResponse),
        (status = 403, description = "No employees permission", body = MessageResponse)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn list_employees(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    query: web::Query<EmployeeQuery>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Employees)?;

    let page = Page::from_query(query.page, query.limit);
    let (rows, total) = fetch_page::<EmployeeRow>(
        pool.get_ref(),
        "SELECT * FROM employees",
        "SELECT COUNT(*) FROM employees",
        &query.filter(),
        "created_at DESC, id DESC",
        page,
    )
    .await
    .map_err(|e| AppError::from_db("Error fetching employees", e))?;

    Ok(HttpResponse::Ok().json(EmployeeListResponse {
        employees: rows.into_iter().map(Employee::from).collect(),
        total_pages: page.total_pages(total),
        current_page: page.page,
        total,
    }))
}

/// Get employee by ID
#[utoipa::path(
    get,
    path = "/api/employees/{id}",
    params(("id", Path, description = "Employee record ID")),
    responses(
        (status = 200, description = "Employee found", body = EmployeeEnvelope),
        (status = 404, description = "Employee not found", body = MessageResponse)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn get_employee(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Employees)?;

    let employee = fetch_employee(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Employee not found".into()))?;

    Ok(HttpResponse::Ok().json(EmployeeEnvelope { employee }))
}

/// Create employee
#[utoipa::path(
    post,
    path = "/api/employees",
    request_body = CreateEmployee,
    responses(
        (status = 201, description = "Employee created", body = EmployeeMessage),
        (status = 400, description = "Validation failed or duplicate employee", body = MessageResponse)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn create_employee(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateEmployee>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Employees)?;
    let body = body.into_inner().normalize()?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM employees WHERE employee_id = ? OR email = ?",
    )
    .bind(&body.employee_id)
    .bind(&body.email)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| AppError::from_db("Error creating employee", e))?;

    if existing > 0 {
        return Err(AppError::Duplicate(DUPLICATE_EMPLOYEE.into()));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO employees
        (employee_id, first_name, last_name, email, phone, date_of_birth, gender, address,
         department, designation, employee_type, joining_date,
         basic_salary, allowances, deductions, net_salary,
         qualifications, experience_years, previous_organizations, emergency_contact,
         status, profile_image)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&body.employee_id)
    .bind(&body.first_name)
    .bind(&body.last_name)
    .bind(&body.email)
    .bind(&body.phone)
    .bind(body.date_of_birth)
    .bind(body.gender.as_ref())
    .bind(Json(&body.address))
    .bind(body.department.as_ref())
    .bind(&body.designation)
    .bind(body.employee_type.as_ref())
    .bind(body.joining_date)
    .bind(body.salary.basic)
    .bind(body.salary.allowances)
    .bind(body.salary.deductions)
    .bind(body.salary.net_salary)
    .bind(Json(&body.qualifications))
    .bind(body.experience.total_years)
    .bind(Json(&body.experience.previous_organizations))
    .bind(Json(&body.emergency_contact))
    .bind(body.status.as_ref())
    .bind(&body.profile_image)
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_or("Error creating employee", e))?;

    let employee = fetch_employee(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or_else(|| AppError::internal("Error creating employee", "inserted row not found"))?;

    info!(id = employee.id, employee_id = %employee.employee_id, created_by = auth.id(), "Employee created");

    Ok(HttpResponse::Created().json(EmployeeMessage {
        message: "Employee created successfully".into(),
        employee,
    }))
}

fn employee_update(body: UpdateEmployee) -> UpdateSet {
    let mut set = UpdateSet::new("employees");
    set.set_opt("employee_id", body.employee_id)
        .set_opt("first_name", body.first_name)
        .set_opt("last_name", body.last_name)
        .set_opt("email", body.email)
        .set_opt("phone", body.phone)
        .set_opt("date_of_birth", body.date_of_birth)
        .set_opt("gender", body.gender.map(|g| g.as_ref().to_string()))
        .set_opt("address", body.address.as_ref().map(SqlValue::json))
        .set_opt("department", body.department.map(|d| d.as_ref().to_string()))
        .set_opt("designation", body.designation)
        .set_opt("employee_type", body.employee_type.map(|t| t.as_ref().to_string()))
        .set_opt("joining_date", body.joining_date)
        .set_opt("qualifications", body.qualifications.as_ref().map(SqlValue::json))
        .set_opt("emergency_contact", body.emergency_contact.as_ref().map(SqlValue::json))
        .set_opt("status", body.status.map(|s| s.as_ref().to_string()))
        .set_opt("profile_image", body.profile_image);

    if let Some(salary) = body.salary {
        set.set_opt("basic_salary", salary.basic)
            .set_opt("allowances", salary.allowances)
            .set_opt("deductions", salary.deductions);
    }
    if let Some(experience) = body.experience {
        set.set("experience_years", experience.total_years)
            .set("previous_organizations", SqlValue::json(&experience.previous_organizations));
    }

    set.derive(NET_SALARY_SQL);
    set
}

/// Update employee
#[utoipa::path(
    put,
    path = "/api/employees/{id}",
    params(("id", Path, description = "Employee record ID")),
    request_body = UpdateEmployee,
    responses(
        (status = 200, description = "Employee updated", body = EmployeeMessage),
        (status = 400, description = "Validation failed", body = MessageResponse),
        (status = 404, description = "Employee not found", body = MessageResponse)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn update_employee(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateEmployee>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Employees)?;
    let id = path.into_inner();
    let body = body.into_inner().normalize()?;

    if body.employee_id.is_some() || body.email.is_some() {
        let clash = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM employees WHERE (employee_id = ? OR email = ?) AND id <> ?",
        )
        .bind(&body.employee_id)
        .bind(&body.email)
        .bind(id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error updating employee", e))?;

        if clash > 0 {
            return Err(AppError::Duplicate(DUPLICATE_EMPLOYEE.into()));
        }
    }

    if let Some(update) = employee_update(body).build("id", id) {
        execute_update(pool.get_ref(), update)
            .await
            .map_err(|e| duplicate_or("Error updating employee", e))?;
    }

    let employee = fetch_employee(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::NotFound("Employee not found".into()))?;

    Ok(HttpResponse::Ok().json(EmployeeMessage {
        message: "Employee updated successfully".into(),
        employee,
    }))
}

/// Delete employee
#[utoipa::path(
    delete,
    path = "/api/employees/{id}",
    params(("id", Path, description = "Employee record ID")),
    responses(
        (status = 200, description = "Employee deleted", body = MessageResponse),
        (status = 404, description = "Employee not found", body = MessageResponse)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn delete_employee(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Employees)?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM employees WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error deleting employee", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Employee not found".into()));
    }

    info!(id, deleted_by = auth.id(), "Employee deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Employee deleted successfully")))
}

/// Employee statistics over active employees
#[utoipa::path(
    get,
    path = "/api/employees/stats/overview",
    responses(
        (status = 200, description = "Employee statistics", body = EmployeeStats)
    ),
    tag = "Employees",
    security(("bearer_auth" = []))
)]
pub async fn employee_stats(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Employees)?;
    let pool = pool.get_ref();
    let db_err = |e| AppError::from_db("Error fetching employee statistics", e);

    let total_employees =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM employees WHERE status = 'Active'")
            .fetch_one(pool)
            .await
            .map_err(db_err)?;

    let department_stats = sqlx::query_as::<_, CountBucket>(
        r#"
        SELECT department AS id, COUNT(*) AS count
        FROM employees
        WHERE status = 'Active'
        GROUP BY department
        ORDER BY count DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let type_stats = sqlx::query_as::<_, CountBucket>(
        r#"
        SELECT employee_type AS id, COUNT(*) AS count
        FROM employees
        WHERE status = 'Active'
        GROUP BY employee_type
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let salary_stats = sqlx::query_as::<_, SalaryStats>(
        r#"
        SELECT SUM(net_salary) AS total_salary,
               AVG(net_salary) AS avg_salary,
               MIN(net_salary) AS min_salary,
               MAX(net_salary) AS max_salary
        FROM employees
        WHERE status = 'Active'
        "#,
    )
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    Ok(HttpResponse::Ok().json(EmployeeStats {
        total_employees,
        department_stats,
        type_stats,
        salary_stats,
    }))
}
