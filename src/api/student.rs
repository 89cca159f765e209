use crate::{
    auth::auth::AuthAdmin,
    error::{AppError, AppResult, is_duplicate_key},
    model::{
        admin::Module,
        common::CountBucket,
        student::{CreateStudent, PENDING_AMOUNT_SQL, Student, StudentRow, UpdateStudent},
    },
    models::MessageResponse,
    utils::{
        db_utils::{Filter, SqlValue, UpdateSet, execute_update, fetch_page},
        pagination::Page,
    },
};
use actix_web::{HttpResponse, web};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, types::Json};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const DUPLICATE_STUDENT: &str = "Student with this ID or email already exists";

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct StudentQuery {
    /// Page number (default 1)
    pub page: Option<u32>,
    /// Items per page (default 10, max 100)
    pub limit: Option<u32>,
    /// Matches first name, last name, student ID or email
    pub search: Option<String>,
    pub course: Option<String>,
    /// 1 to 4
    pub year: Option<String>,
    /// Defaults to `Active`; pass an empty value to list every status
    pub status: Option<String>,
}

impl StudentQuery {
    pub fn filter(&self) -> AppResult<Filter> {
        let mut filter = Filter::new();
        filter
            .search(
                &["first_name", "last_name", "student_id", "email"],
                self.search.as_deref(),
            )
            .eq_opt("course", self.course.as_deref());

        if let Some(year) = self.year.as_deref().map(str::trim).filter(|y| !y.is_empty()) {
            let year: u8 = year
                .parse()
                .map_err(|_| AppError::Validation("year must be a number".into()))?;
            filter.eq("year", year);
        }

        filter.eq_opt("status", Some(self.status.as_deref().unwrap_or("Active")));
        Ok(filter)
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentListResponse {
    pub students: Vec<Student>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct StudentEnvelope {
    pub student: Student,
}

#[derive(Serialize, ToSchema)]
pub struct StudentMessage {
    pub message: String,
    pub student: Student,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct YearBucket {
    #[serde(rename = "_id")]
    pub id: i64,
    pub count: i64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StudentStats {
    pub total_students: i64,
    pub total_graduated: i64,
    pub course_stats: Vec<CountBucket>,
    pub year_stats: Vec<YearBucket>,
}

async fn fetch_student(pool: &MySqlPool, id: u64) -> AppResult<Option<Student>> {
    let row = sqlx::query_as::<_, StudentRow>("SELECT * FROM students WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::from_db("Error fetching student", e))?;
    Ok(row.map(Student::from))
}

fn duplicate_or(context: &str, e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Duplicate(DUPLICATE_STUDENT.into())
    } else {
        AppError::from_db(context, e)
    }
}

/// List students
#[utoipa::path(
    get,
    path = "/api/students",
    params(StudentQuery),
    responses(
        (status = 200, description = "Paginated student list", body = StudentListResponse),
        (status = 403, description = "No students permission", body = MessageResponse)
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn list_students(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    query: web::Query<StudentQuery>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Students)?;

    let page = Page::from_query(query.page, query.limit);
    let filter = query.filter()?;

    let (rows, total) = fetch_page::<StudentRow>(
        pool.get_ref(),
        "SELECT * FROM students",
        "SELECT COUNT(*) FROM students",
        &filter,
        "created_at DESC, id DESC",
        page,
    )
    .await
    .map_err(|e| AppError::from_db("Error fetching students", e))?;

    Ok(HttpResponse::Ok().json(StudentListResponse {
        students: rows.into_iter().map(Student::from).collect(),
        total_pages: page.total_pages(total),
        current_page: page.page,
        total,
    }))
}

/// Get student by ID
#[utoipa::path(
    get,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student record ID")),
    responses(
        (status = 200, description = "Student found", body = StudentEnvelope),
        (status = 404, description = "Student not found", body = MessageResponse)
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn get_student(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Students)?;

    let student = fetch_student(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".into()))?;

    Ok(HttpResponse::Ok().json(StudentEnvelope { student }))
}

/// Create student
#[utoipa::path(
    post,
    path = "/api/students",
    request_body = CreateStudent,
    responses(
        (status = 201, description = "Student created", body = StudentMessage),
        (status = 400, description = "Validation failed or duplicate student", body = MessageResponse)
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn create_student(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateStudent>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Students)?;
    let body = body.into_inner().normalize()?;

    let existing = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM students WHERE student_id = ? OR email = ?",
    )
    .bind(&body.student_id)
    .bind(&body.email)
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| AppError::from_db("Error creating student", e))?;

    if existing > 0 {
        return Err(AppError::Duplicate(DUPLICATE_STUDENT.into()));
    }

    let enrollment_date = body
        .enrollment_date
        .unwrap_or_else(|| Utc::now().date_naive());

    let result = sqlx::query(
        r#"
        INSERT INTO students
        (student_id, first_name, last_name, email, phone, date_of_birth, gender, address,
         course, year, semester, enrollment_date, guardian_info,
         cgpa, total_credits, attendance_percentage,
         total_fee, paid_amount, pending_amount, last_payment_date,
         status, profile_image)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&body.student_id)
    .bind(&body.first_name)
    .bind(&body.last_name)
    .bind(&body.email)
    .bind(&body.phone)
    .bind(body.date_of_birth)
    .bind(body.gender.as_ref())
    .bind(Json(&body.address))
    .bind(body.course.as_ref())
    .bind(body.year)
    .bind(body.semester)
    .bind(enrollment_date)
    .bind(Json(&body.guardian_info))
    .bind(body.academic_info.cgpa)
    .bind(body.academic_info.total_credits)
    .bind(body.academic_info.attendance_percentage)
    .bind(body.fee_status.total_fee)
    .bind(body.fee_status.paid_amount)
    .bind(body.fee_status.pending_amount)
    .bind(body.fee_status.last_payment_date)
    .bind(body.status.as_ref())
    .bind(&body.profile_image)
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_or("Error creating student", e))?;

    let student = fetch_student(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or_else(|| AppError::internal("Error creating student", "inserted row not found"))?;

    info!(id = student.id, student_id = %student.student_id, created_by = auth.id(), "Student created");

    Ok(HttpResponse::Created().json(StudentMessage {
        message: "Student created successfully".into(),
        student,
    }))
}

fn student_update(body: UpdateStudent) -> UpdateSet {
    let mut set = UpdateSet::new("students");
    set.set_opt("student_id", body.student_id)
        .set_opt("first_name", body.first_name)
        .set_opt("last_name", body.last_name)
        .set_opt("email", body.email)
        .set_opt("phone", body.phone)
        .set_opt("date_of_birth", body.date_of_birth)
        .set_opt("gender", body.gender.map(|g| g.as_ref().to_string()))
        .set_opt("address", body.address.as_ref().map(SqlValue::json))
        .set_opt("course", body.course.map(|c| c.as_ref().to_string()))
        .set_opt("year", body.year)
        .set_opt("semester", body.semester)
        .set_opt("enrollment_date", body.enrollment_date)
        .set_opt("guardian_info", body.guardian_info.as_ref().map(SqlValue::json))
        .set_opt("status", body.status.map(|s| s.as_ref().to_string()))
        .set_opt("profile_image", body.profile_image);

    if let Some(info) = body.academic_info {
        set.set_opt("cgpa", info.cgpa)
            .set_opt("total_credits", info.total_credits)
            .set_opt("attendance_percentage", info.attendance_percentage);
    }
    if let Some(fee) = body.fee_status {
        set.set_opt("total_fee", fee.total_fee)
            .set_opt("paid_amount", fee.paid_amount)
            .set_opt("last_payment_date", fee.last_payment_date);
    }

    set.derive(PENDING_AMOUNT_SQL);
    set
}

/// Update student
#[utoipa::path(
    put,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student record ID")),
    request_body = UpdateStudent,
    responses(
        (status = 200, description = "Student updated", body = StudentMessage),
        (status = 400, description = "Validation failed", body = MessageResponse),
        (status = 404, description = "Student not found", body = MessageResponse)
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn update_student(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateStudent>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Students)?;
    let id = path.into_inner();
    let body = body.into_inner().normalize()?;

    if body.student_id.is_some() || body.email.is_some() {
        let clash = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM students WHERE (student_id = ? OR email = ?) AND id <> ?",
        )
        .bind(&body.student_id)
        .bind(&body.email)
        .bind(id)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error updating student", e))?;

        if clash > 0 {
            return Err(AppError::Duplicate(DUPLICATE_STUDENT.into()));
        }
    }

    if let Some(update) = student_update(body).build("id", id) {
        debug!(sql = %update.sql, id, "Updating student");
        execute_update(pool.get_ref(), update)
            .await
            .map_err(|e| duplicate_or("Error updating student", e))?;
    }

    let student = fetch_student(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::NotFound("Student not found".into()))?;

    Ok(HttpResponse::Ok().json(StudentMessage {
        message: "Student updated successfully".into(),
        student,
    }))
}

/// Delete student
#[utoipa::path(
    delete,
    path = "/api/students/{id}",
    params(("id", Path, description = "Student record ID")),
    responses(
        (status = 200, description = "Student deleted", body = MessageResponse),
        (status = 404, description = "Student not found", body = MessageResponse)
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn delete_student(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Students)?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM students WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error deleting student", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Student not found".into()));
    }

    info!(id, deleted_by = auth.id(), "Student deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Student deleted successfully")))
}

/// Student statistics over active students
#[utoipa::path(
    get,
    path = "/api/students/stats/overview",
    responses(
        (status = 200, description = "Student statistics", body = StudentStats)
    ),
    tag = "Students",
    security(("bearer_auth" = []))
)]
pub async fn student_stats(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Students)?;
    let pool = pool.get_ref();
    let db_err = |e| AppError::from_db("Error fetching student statistics", e);

    let count_status = |status: &'static str| {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM students WHERE status = ?")
            .bind(status)
            .fetch_one(pool)
    };

    let total_students = count_status("Active").await.map_err(db_err)?;
    let total_graduated = count_status("Graduated").await.map_err(db_err)?;

    let course_stats = sqlx::query_as::<_, CountBucket>(
        r#"
        SELECT course AS id, COUNT(*) AS count
        FROM students
        WHERE status = 'Active'
        GROUP BY course
        ORDER BY count DESC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let year_stats = sqlx::query_as::<_, YearBucket>(
        r#"
        SELECT CAST(year AS SIGNED) AS id, COUNT(*) AS count
        FROM students
        WHERE status = 'Active'
        GROUP BY year
        ORDER BY year ASC
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok(HttpResponse::Ok().json(StudentStats {
        total_students,
        total_graduated,
        course_stats,
        year_stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::admin::AdminRole;
    use crate::testing;
    use actix_web::{http::StatusCode, test as actix_test};
    use rstest::rstest;
    use serde_json::json;

    fn query(year: Option<&str>, status: Option<&str>) -> StudentQuery {
        StudentQuery {
            year: year.map(String::from),
            status: status.map(String::from),
            ..StudentQuery::default()
        }
    }

    #[rstest]
    #[case(None, "WHERE status = ?")]
    #[case(Some(""), "")]
    #[case(Some("Graduated"), "WHERE status = ?")]
    fn status_defaults_to_active_and_empty_disables_it(
        #[case] status: Option<&str>,
        #[case] expected: &str,
    ) {
        let filter = query(None, status).filter().unwrap();
        assert_eq!(filter.where_clause(), expected);
    }

    #[::core::prelude::v1::test]
    fn default_status_binds_active() {
        let filter = query(None, None).filter().unwrap();
        assert_eq!(filter.values(), &[SqlValue::String("Active".into())]);
    }

    #[::core::prelude::v1::test]
    fn blank_year_is_ignored_and_bad_year_rejected() {
        assert_eq!(
            query(Some(" "), Some("")).filter().unwrap().where_clause(),
            ""
        );
        assert!(query(Some("second"), None).filter().is_err());
    }

    #[::core::prelude::v1::test]
    fn update_always_recomputes_pending_fee() {
        let body: UpdateStudent = serde_json::from_value(serde_json::json!({
            "feeStatus": { "paidAmount": 5000.0 }
        }))
        .unwrap();
        let update = student_update(body).build("id", 4).unwrap();

        assert_eq!(
            update.sql,
            format!("UPDATE students SET paid_amount = ?, {PENDING_AMOUNT_SQL} WHERE id = ?")
        );
        assert_eq!(update.values, vec![SqlValue::F64(5000.0), SqlValue::U64(4)]);
    }

    #[actix_web::test]
    async fn created_student_reads_back_unchanged() {
        let Some(pool) = testing::pool().await else {
            return;
        };
        let registrar = testing::insert_admin(&pool, AdminRole::Admin, "roll-call-1").await;
        let auth = ("Authorization", testing::bearer(&registrar));
        let app = actix_test::init_service(testing::app(pool)).await;

        let student_id = testing::unique("CS");
        let (status, created) = testing::call(
            &app,
            actix_test::TestRequest::post()
                .uri("/api/students")
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(json!({
                    "studentId": student_id,
                    "firstName": " Asha ",
                    "lastName": "Rao",
                    "email": format!("{student_id}@College.edu"),
                    "phone": "+919800000000",
                    "dateOfBirth": "2005-04-12",
                    "gender": "Female",
                    "address": { "city": "Pune", "state": "MH" },
                    "course": "Computer Science",
                    "year": 2,
                    "semester": 3,
                    "guardianInfo": { "name": "Ravi Rao", "relationship": "Father" },
                    "academicInfo": { "cgpa": 8.4, "totalCredits": 48 },
                    "feeStatus": { "totalFee": 90000.0, "paidAmount": 30000.0 }
                }))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["student"]["id"].as_u64().unwrap();

        let (status, fetched) = testing::call(
            &app,
            actix_test::TestRequest::get()
                .uri(&format!("/api/students/{id}"))
                .insert_header(auth)
                .peer_addr(testing::peer())
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let student = &fetched["student"];
        assert_eq!(student, &created["student"]);
        assert_eq!(student["studentId"], student_id.as_str());
        assert_eq!(student["firstName"], "Asha");
        assert_eq!(student["fullName"], "Asha Rao");
        assert_eq!(student["email"], format!("{}@college.edu", student_id.to_lowercase()));
        assert_eq!(student["address"]["city"], "Pune");
        assert_eq!(student["academicInfo"]["cgpa"], 8.4);
        assert_eq!(student["feeStatus"]["pendingAmount"], 60000.0);
        assert_eq!(student["status"], "Active");
    }
}
