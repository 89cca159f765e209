use crate::{
    auth::auth::AuthAdmin,
    error::{AppError, AppResult},
    model::{
        admin::Module,
        transaction::{
            CreateTransaction, Transaction, TransactionRow, UpdateTransaction,
            UpdateTransactionStatus, generate_transaction_id,
        },
    },
    models::MessageResponse,
    utils::{
        db_utils::{Filter, SqlValue, UpdateSet, execute_update, fetch_page},
        pagination::Page,
    },
};
use actix_web::{HttpResponse, web};
use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{MySqlPool, types::Json};
use tracing::{debug, info};
use utoipa::{IntoParams, ToSchema};

const SELECT_TRANSACTION: &str = r#"
    SELECT t.id, t.transaction_id, t.type, t.category, t.amount, t.description, t.date,
           t.payment_method, t.reference_number, t.related_entity, t.entity_type,
           t.approved_by, a.full_name AS approved_by_name, a.username AS approved_by_username,
           t.status, t.attachments, t.academic_year, t.created_at, t.updated_at
    FROM transactions t
    LEFT JOIN admins a ON a.id = t.approved_by"#;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct TransactionQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
    pub academic_year: Option<String>,
    /// Applied only together with `endDate`
    pub start_date: Option<NaiveDate>,
    /// Inclusive
    pub end_date: Option<NaiveDate>,
}

impl TransactionQuery {
    pub fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        filter
            .eq_opt("t.type", self.kind.as_deref())
            .eq_opt("t.category", self.category.as_deref())
            .eq_opt("t.status", self.status.as_deref())
            .eq_opt("t.academic_year", self.academic_year.as_deref());

        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            filter.between("t.date", start, end);
        }
        filter
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct ReportQuery {
    /// Defaults to the current calendar year
    pub academic_year: Option<String>,
}

impl ReportQuery {
    pub fn academic_year(&self) -> String {
        self.academic_year
            .as_deref()
            .map(str::trim)
            .filter(|y| !y.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Utc::now().year().to_string())
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListResponse {
    pub transactions: Vec<Transaction>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct TransactionEnvelope {
    pub transaction: Transaction,
}

#[derive(Serialize, ToSchema)]
pub struct TransactionMessage {
    pub message: String,
    pub transaction: Transaction,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinanceSummary {
    pub total_income: f64,
    pub total_expense: f64,
    pub net_balance: f64,
    pub pending_transactions: i64,
}

impl FinanceSummary {
    pub fn new(total_income: f64, total_expense: f64, pending_transactions: i64) -> Self {
        Self {
            total_income,
            total_expense,
            net_balance: total_income - total_expense,
            pending_transactions,
        }
    }
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct CategoryTotal {
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub category: String,
    pub total: f64,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema, sqlx::FromRow)]
pub struct MonthlyTotal {
    pub year: i64,
    pub month: i64,
    #[serde(rename = "type")]
    #[sqlx(rename = "type")]
    pub kind: String,
    pub total: f64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct FinanceReport {
    pub summary: FinanceSummary,
    pub category_breakdown: Vec<CategoryTotal>,
    pub monthly_trends: Vec<MonthlyTotal>,
    pub academic_year: String,
}

async fn fetch_transaction(pool: &MySqlPool, id: u64) -> AppResult<Transaction> {
    sqlx::query_as::<_, TransactionRow>(&format!("{SELECT_TRANSACTION} WHERE t.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::from_db("Error fetching transaction", e))?
        .map(Transaction::from)
        .ok_or_else(|| AppError::NotFound("Transaction not found".into()))
}

/// List transactions
#[utoipa::path(
    get,
    path = "/api/finance/transactions",
    params(TransactionQuery),
    responses(
        (status = 200, description = "Paginated transactions, latest date first", body = TransactionListResponse),
        (status = 403, description = "No finance permission", body = MessageResponse)
    ),
    tag = "Finance",
    security(("bearer_auth" = []))
)]
pub async fn list_transactions(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    query: web::Query<TransactionQuery>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Finance)?;

    let page = Page::from_query(query.page, query.limit);
    let (rows, total) = fetch_page::<TransactionRow>(
        pool.get_ref(),
        SELECT_TRANSACTION,
        "SELECT COUNT(*) FROM transactions t",
        &query.filter(),
        "t.date DESC, t.id DESC",
        page,
    )
    .await
    .map_err(|e| AppError::from_db("Error fetching transactions", e))?;

    Ok(HttpResponse::Ok().json(TransactionListResponse {
        transactions: rows.into_iter().map(Transaction::from).collect(),
        total_pages: page.total_pages(total),
        current_page: page.page,
        total,
    }))
}

/// Get transaction by ID
#[utoipa::path(
    get,
    path = "/api/finance/transactions/{id}",
    params(("id", Path, description = "Transaction record ID")),
    responses(
        (status = 200, description = "Transaction found", body = TransactionEnvelope),
        (status = 404, description = "Transaction not found", body = MessageResponse)
    ),
    tag = "Finance",
    security(("bearer_auth" = []))
)]
pub async fn get_transaction(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Finance)?;
    let transaction = fetch_transaction(pool.get_ref(), path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(TransactionEnvelope { transaction }))
}

/// Record a transaction
#[utoipa::path(
    post,
    path = "/api/finance/transactions",
    request_body = CreateTransaction,
    responses(
        (status = 201, description = "Transaction created", body = TransactionMessage),
        (status = 400, description = "Validation failed", body = MessageResponse)
    ),
    tag = "Finance",
    security(("bearer_auth" = []))
)]
pub async fn create_transaction(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateTransaction>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Finance)?;
    let body = body.into_inner().normalize()?;

    let now = Utc::now();
    let transaction_id = generate_transaction_id(now);

    let result = sqlx::query(
        r#"
        INSERT INTO transactions
        (transaction_id, type, category, amount, description, date, payment_method,
         reference_number, related_entity, entity_type, approved_by, status,
         attachments, academic_year)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&transaction_id)
    .bind(body.kind.as_ref())
    .bind(body.category.as_ref())
    .bind(body.amount)
    .bind(&body.description)
    .bind(body.date.unwrap_or_else(|| now.date_naive()))
    .bind(body.payment_method.as_ref())
    .bind(&body.reference_number)
    .bind(&body.related_entity)
    .bind(body.entity_type.map(|t| t.as_ref().to_string()))
    .bind(auth.id())
    .bind(body.status.as_ref())
    .bind(Json(&body.attachments))
    .bind(&body.academic_year)
    .execute(pool.get_ref())
    .await
    .map_err(|e| AppError::from_db("Error creating transaction", e))?;

    let transaction = fetch_transaction(pool.get_ref(), result.last_insert_id()).await?;

    info!(
        id = transaction.id,
        transaction_id = %transaction.transaction_id,
        amount = transaction.amount,
        created_by = auth.id(),
        "Transaction created"
    );

    Ok(HttpResponse::Created().json(TransactionMessage {
        message: "Transaction created successfully".into(),
        transaction,
    }))
}

fn transaction_update(body: UpdateTransaction) -> UpdateSet {
    let mut set = UpdateSet::new("transactions");
    set.set_opt("type", body.kind.map(|k| k.as_ref().to_string()))
        .set_opt("category", body.category.map(|c| c.as_ref().to_string()))
        .set_opt("amount", body.amount)
        .set_opt("description", body.description)
        .set_opt("date", body.date)
        .set_opt("payment_method", body.payment_method.map(|m| m.as_ref().to_string()))
        .set_opt("reference_number", body.reference_number)
        .set_opt("related_entity", body.related_entity)
        .set_opt("entity_type", body.entity_type.map(|t| t.as_ref().to_string()))
        .set_opt("status", body.status.map(|s| s.as_ref().to_string()))
        .set_opt("attachments", body.attachments.as_ref().map(SqlValue::json))
        .set_opt("academic_year", body.academic_year);
    set
}

/// Update transaction
#[utoipa::path(
    put,
    path = "/api/finance/transactions/{id}",
    params(("id", Path, description = "Transaction record ID")),
    request_body = UpdateTransaction,
    responses(
        (status = 200, description = "Transaction updated", body = TransactionMessage),
        (status = 400, description = "Validation failed", body = MessageResponse),
        (status = 404, description = "Transaction not found", body = MessageResponse)
    ),
    tag = "Finance",
    security(("bearer_auth" = []))
)]
pub async fn update_transaction(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateTransaction>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Finance)?;
    let id = path.into_inner();
    let body = body.into_inner().normalize()?;

    if let Some(update) = transaction_update(body).build("id", id) {
        debug!(sql = %update.sql, id, "Updating transaction");
        execute_update(pool.get_ref(), update)
            .await
            .map_err(|e| AppError::from_db("Error updating transaction", e))?;
    }

    let transaction = fetch_transaction(pool.get_ref(), id).await?;

    Ok(HttpResponse::Ok().json(TransactionMessage {
        message: "Transaction updated successfully".into(),
        transaction,
    }))
}

/// Delete transaction
#[utoipa::path(
    delete,
    path = "/api/finance/transactions/{id}",
    params(("id", Path, description = "Transaction record ID")),
    responses(
        (status = 200, description = "Transaction deleted", body = MessageResponse),
        (status = 404, description = "Transaction not found", body = MessageResponse)
    ),
    tag = "Finance",
    security(("bearer_auth" = []))
)]
pub async fn delete_transaction(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Finance)?;
    let id = path.into_inner();

    let result = sqlx::query("DELETE FROM transactions WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error deleting transaction", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Transaction not found".into()));
    }

    info!(id, deleted_by = auth.id(), "Transaction deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Transaction deleted successfully")))
}

/// Approve, reject or complete a transaction
#[utoipa::path(
    patch,
    path = "/api/finance/transactions/{id}/status",
    params(("id", Path, description = "Transaction record ID")),
    request_body = UpdateTransactionStatus,
    responses(
        (status = 200, description = "Status changed", body = TransactionMessage),
        (status = 400, description = "Invalid status", body = MessageResponse),
        (status = 404, description = "Transaction not found", body = MessageResponse)
    ),
    tag = "Finance",
    security(("bearer_auth" = []))
)]
pub async fn update_transaction_status(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateTransactionStatus>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Finance)?;
    let id = path.into_inner();
    let status = body.decision()?;

    // MySQL reports zero affected rows for a no-op update.
    fetch_transaction(pool.get_ref(), id).await?;

    sqlx::query("UPDATE transactions SET status = ?, approved_by = ? WHERE id = ?")
        .bind(status.as_ref())
        .bind(auth.id())
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error updating transaction status", e))?;

    let transaction = fetch_transaction(pool.get_ref(), id).await?;
    info!(id, status = status.as_ref(), approved_by = auth.id(), "Transaction status changed");

    Ok(HttpResponse::Ok().json(TransactionMessage {
        message: status_message(status.as_ref()),
        transaction,
    }))
}

fn status_message(status: &str) -> String {
    format!("Transaction {} successfully", status.to_lowercase())
}

/// Income, expense and trend report for one academic year
#[utoipa::path(
    get,
    path = "/api/finance/reports/overview",
    params(ReportQuery),
    responses(
        (status = 200, description = "Financial report over completed transactions", body = FinanceReport)
    ),
    tag = "Finance",
    security(("bearer_auth" = []))
)]
pub async fn finance_report(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    query: web::Query<ReportQuery>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Finance)?;
    let pool = pool.get_ref();
    let academic_year = query.academic_year();
    let db_err = |e| AppError::from_db("Error generating financial reports", e);

    let completed_total = |kind: &'static str| {
        sqlx::query_scalar::<_, f64>(
            r#"
            SELECT COALESCE(SUM(amount), 0)
            FROM transactions
            WHERE type = ? AND status = 'Completed' AND academic_year = ?
            "#,
        )
        .bind(kind)
        .bind(academic_year.clone())
        .fetch_one(pool)
    };

    let total_income = completed_total("Income").await.map_err(db_err)?;
    let total_expense = completed_total("Expense").await.map_err(db_err)?;

    let category_breakdown = sqlx::query_as::<_, CategoryTotal>(
        r#"
        SELECT type, category, SUM(amount) AS total, COUNT(*) AS count
        FROM transactions
        WHERE status = 'Completed' AND academic_year = ?
        GROUP BY type, category
        ORDER BY total DESC
        "#,
    )
    .bind(&academic_year)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let monthly_trends = sqlx::query_as::<_, MonthlyTotal>(
        r#"
        SELECT CAST(YEAR(date) AS SIGNED) AS year, CAST(MONTH(date) AS SIGNED) AS month,
               type, SUM(amount) AS total
        FROM transactions
        WHERE status = 'Completed' AND academic_year = ?
        GROUP BY year, month, type
        ORDER BY year ASC, month ASC
        "#,
    )
    .bind(&academic_year)
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let pending_transactions = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM transactions WHERE status = 'Pending' AND academic_year = ?",
    )
    .bind(&academic_year)
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    Ok(HttpResponse::Ok().json(FinanceReport {
        summary: FinanceSummary::new(total_income, total_expense, pending_transactions),
        category_breakdown,
        monthly_trends,
        academic_year,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn date_range_needs_both_ends() {
        let start = NaiveDate::from_ymd_opt(2026, 1, 1);
        let end = NaiveDate::from_ymd_opt(2026, 3, 31);

        let only_start = TransactionQuery {
            start_date: start,
            ..TransactionQuery::default()
        };
        assert_eq!(only_start.filter().where_clause(), "");

        let both = TransactionQuery {
            kind: Some("Income".into()),
            start_date: start,
            end_date: end,
            ..TransactionQuery::default()
        };
        let filter = both.filter();
        assert_eq!(
            filter.where_clause(),
            "WHERE t.type = ? AND t.date BETWEEN ? AND ?"
        );
        assert_eq!(filter.values().len(), 3);
    }

    #[test]
    fn query_reads_type_key() {
        let query: TransactionQuery =
            serde_json::from_value(json!({ "type": "Expense", "academicYear": "2025" })).unwrap();
        assert_eq!(query.kind.as_deref(), Some("Expense"));
        assert_eq!(query.academic_year.as_deref(), Some("2025"));
    }

    #[test]
    fn report_year_defaults_to_current_year() {
        let blank = ReportQuery {
            academic_year: Some("  ".into()),
        };
        assert_eq!(blank.academic_year(), Utc::now().year().to_string());

        let given = ReportQuery {
            academic_year: Some("2024".into()),
        };
        assert_eq!(given.academic_year(), "2024");
    }

    #[test]
    fn summary_nets_income_against_expense() {
        let summary = FinanceSummary::new(1000.0, 250.5, 3);
        assert_eq!(summary.net_balance, 749.5);
        assert_eq!(summary.pending_transactions, 3);
    }

    #[test]
    fn status_message_lowercases_status() {
        assert_eq!(status_message("Approved"), "Transaction approved successfully");
        assert_eq!(status_message("Completed"), "Transaction completed successfully");
    }

    #[test]
    fn update_writes_type_and_attachments() {
        let body: UpdateTransaction = serde_json::from_value(json!({
            "type": "Income",
            "attachments": [{ "fileName": "receipt.pdf" }]
        }))
        .unwrap();
        let update = transaction_update(body).build("id", 4).unwrap();

        assert_eq!(
            update.sql,
            "UPDATE transactions SET type = ?, attachments = ? WHERE id = ?"
        );
        assert_eq!(update.values[0], SqlValue::String("Income".into()));
        assert!(matches!(update.values[1], SqlValue::Json(_)));
    }
}
