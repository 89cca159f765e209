use chrono::{DateTime, NaiveDate, Utc};
use sqlx::mysql::{MySql, MySqlArguments};
use sqlx::query::{Query, QueryAs, QueryScalar};
use sqlx::types::Json;
use sqlx::MySqlPool;
use sqlx::mysql::MySqlRow;
use tracing::debug;

use crate::utils::pagination::Page;

/// ===============================
/// SQL bindable value enum
/// ===============================
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    String(String),
    I64(i64),
    U64(u64),
    F64(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Json(serde_json::Value),
    Null,
}

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        SqlValue::String(v)
    }
}

impl From<&str> for SqlValue {
    fn from(v: &str) -> Self {
        SqlValue::String(v.to_string())
    }
}

impl From<u64> for SqlValue {
    fn from(v: u64) -> Self {
        SqlValue::U64(v)
    }
}

impl From<u32> for SqlValue {
    fn from(v: u32) -> Self {
        SqlValue::U64(v.into())
    }
}

impl From<u8> for SqlValue {
    fn from(v: u8) -> Self {
        SqlValue::U64(v.into())
    }
}

impl From<i64> for SqlValue {
    fn from(v: i64) -> Self {
        SqlValue::I64(v)
    }
}

impl From<i32> for SqlValue {
    fn from(v: i32) -> Self {
        SqlValue::I64(v.into())
    }
}

impl From<f64> for SqlValue {
    fn from(v: f64) -> Self {
        SqlValue::F64(v)
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        SqlValue::Bool(v)
    }
}

impl From<NaiveDate> for SqlValue {
    fn from(v: NaiveDate) -> Self {
        SqlValue::Date(v)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(v: DateTime<Utc>) -> Self {
        SqlValue::DateTime(v)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(SqlValue::Null)
    }
}

impl SqlValue {
    /// Serializes a nested record into a JSON column value.
    pub fn json<T: serde::Serialize>(value: &T) -> Self {
        serde_json::to_value(value)
            .map(SqlValue::Json)
            .unwrap_or(SqlValue::Null)
    }
}

/// Binds [`SqlValue`]s onto any of sqlx's MySQL query kinds.
pub trait BindSql: Sized {
    fn bind_value(self, value: SqlValue) -> Self;

    fn bind_all(self, values: &[SqlValue]) -> Self {
        values
            .iter()
            .cloned()
            .fold(self, |query, value| query.bind_value(value))
    }
}

macro_rules! bind_sql_value {
    ($query:expr, $value:expr) => {
        match $value {
            SqlValue::String(v) => $query.bind(v),
            SqlValue::I64(v) => $query.bind(v),
            SqlValue::U64(v) => $query.bind(v),
            SqlValue::F64(v) => $query.bind(v),
            SqlValue::Bool(v) => $query.bind(v),
            SqlValue::Date(v) => $query.bind(v),
            SqlValue::DateTime(v) => $query.bind(v),
            SqlValue::Json(v) => $query.bind(Json(v)),
            SqlValue::Null => $query.bind(None::<String>),
        }
    };
}

impl<'q> BindSql for Query<'q, MySql, MySqlArguments> {
    fn bind_value(self, value: SqlValue) -> Self {
        bind_sql_value!(self, value)
    }
}

impl<'q, O> BindSql for QueryAs<'q, MySql, O, MySqlArguments> {
    fn bind_value(self, value: SqlValue) -> Self {
        bind_sql_value!(self, value)
    }
}

impl<'q, O> BindSql for QueryScalar<'q, MySql, O, MySqlArguments> {
    fn bind_value(self, value: SqlValue) -> Self {
        bind_sql_value!(self, value)
    }
}

/// ===============================
/// WHERE clause builder for list endpoints
/// ===============================
#[derive(Debug, Default)]
pub struct Filter {
    conditions: Vec<String>,
    values: Vec<SqlValue>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn eq(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.conditions.push(format!("{column} = ?"));
        self.values.push(value.into());
        self
    }

    /// Adds `column = value` only when the value is present and not blank.
    pub fn eq_opt(&mut self, column: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
            self.eq(column, v);
        }
        self
    }

    /// Case-insensitive substring match over any of `columns`.
    pub fn search(&mut self, columns: &[&str], term: Option<&str>) -> &mut Self {
        let Some(term) = term.map(str::trim).filter(|t| !t.is_empty()) else {
            return self;
        };
        if columns.is_empty() {
            return self;
        }

        let like = format!("%{}%", escape_like(&term.to_lowercase()));
        let clause = columns
            .iter()
            .map(|c| format!("LOWER({c}) LIKE ?"))
            .collect::<Vec<_>>()
            .join(" OR ");
        self.conditions.push(format!("({clause})"));
        for _ in columns {
            self.values.push(SqlValue::String(like.clone()));
        }
        self
    }

    pub fn between(
        &mut self,
        column: &str,
        from: impl Into<SqlValue>,
        to: impl Into<SqlValue>,
    ) -> &mut Self {
        self.conditions.push(format!("{column} BETWEEN ? AND ?"));
        self.values.push(from.into());
        self.values.push(to.into());
        self
    }

    pub fn where_clause(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", self.conditions.join(" AND "))
        }
    }

    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }
}

fn escape_like(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for ch in term.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// ===============================
/// SQL update container
/// ===============================
#[derive(Debug)]
pub struct SqlUpdate {
    pub sql: String,
    pub values: Vec<SqlValue>,
}

/// ===============================
/// Build dynamic UPDATE SQL from the fields a caller actually sent
/// ===============================
#[derive(Debug)]
pub struct UpdateSet {
    table: &'static str,
    assignments: Vec<String>,
    values: Vec<SqlValue>,
    derived: Vec<&'static str>,
}

impl UpdateSet {
    pub fn new(table: &'static str) -> Self {
        Self {
            table,
            assignments: Vec::new(),
            values: Vec::new(),
            derived: Vec::new(),
        }
    }

    pub fn set(&mut self, column: &'static str, value: impl Into<SqlValue>) -> &mut Self {
        self.assignments.push(format!("{column} = ?"));
        self.values.push(value.into());
        self
    }

    pub fn set_opt<T: Into<SqlValue>>(&mut self, column: &'static str, value: Option<T>) -> &mut Self {
        if let Some(v) = value {
            self.set(column, v);
        }
        self
    }

    /// Assignment recomputed from other columns. MySQL evaluates single-table
    /// assignments left to right, so these always run after the plain ones.
    pub fn derive(&mut self, assignment: &'static str) -> &mut Self {
        self.derived.push(assignment);
        self
    }

    /// `None` when no column was touched.
    pub fn build(self, id_column: &str, id: u64) -> Option<SqlUpdate> {
        if self.assignments.is_empty() {
            return None;
        }

        let set_clause = self
            .assignments
            .iter()
            .map(String::as_str)
            .chain(self.derived.iter().copied())
            .collect::<Vec<_>>()
            .join(", ");

        let sql = format!("UPDATE {} SET {} WHERE {} = ?", self.table, set_clause, id_column);

        let mut values = self.values;
        values.push(SqlValue::U64(id));

        Some(SqlUpdate { sql, values })
    }
}

/// ===============================
/// Execute the update
/// ===============================
pub async fn execute_update<'c, E>(executor: E, update: SqlUpdate) -> Result<u64, sqlx::Error>
where
    E: sqlx::Executor<'c, Database = MySql>,
{
    let result = sqlx::query(&update.sql)
        .bind_all(&update.values)
        .execute(executor)
        .await?;
    Ok(result.rows_affected())
}

/// ===============================
/// Count + page fetch for list endpoints
/// ===============================
pub async fn fetch_page<T>(
    pool: &MySqlPool,
    select_sql: &str,
    count_sql: &str,
    filter: &Filter,
    order_by: &str,
    page: Page,
) -> Result<(Vec<T>, i64), sqlx::Error>
where
    T: for<'r> sqlx::FromRow<'r, MySqlRow> + Send + Unpin,
{
    let where_clause = filter.where_clause();

    let count_sql = format!("{count_sql} {where_clause}");
    debug!(sql = %count_sql, bindings = ?filter.values(), "Counting rows");

    let total = sqlx::query_scalar::<_, i64>(&count_sql)
        .bind_all(filter.values())
        .fetch_one(pool)
        .await?;

    let data_sql = format!("{select_sql} {where_clause} ORDER BY {order_by} LIMIT ? OFFSET ?");
    debug!(sql = %data_sql, page = page.page, limit = page.limit, "Fetching rows");

    let rows = sqlx::query_as::<_, T>(&data_sql)
        .bind_all(filter.values())
        .bind(u64::from(page.limit))
        .bind(page.offset())
        .fetch_all(pool)
        .await?;

    Ok((rows, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_filter_has_no_where_clause() {
        let filter = Filter::new();
        assert_eq!(filter.where_clause(), "");
        assert!(filter.values().is_empty());
    }

    #[test]
    fn filter_joins_conditions_in_order() {
        let mut filter = Filter::new();
        filter
            .eq_opt("course", Some("Civil"))
            .eq_opt("status", Some("  "))
            .eq("year", 2u8)
            .search(&["first_name", "email"], Some("Ann"));

        assert_eq!(
            filter.where_clause(),
            "WHERE course = ? AND year = ? AND (LOWER(first_name) LIKE ? OR LOWER(email) LIKE ?)"
        );
        assert_eq!(
            filter.values(),
            &[
                SqlValue::String("Civil".into()),
                SqlValue::U64(2),
                SqlValue::String("%ann%".into()),
                SqlValue::String("%ann%".into()),
            ]
        );
    }

    #[test]
    fn search_escapes_like_wildcards() {
        let mut filter = Filter::new();
        filter.search(&["title"], Some("100%_done"));
        assert_eq!(filter.values(), &[SqlValue::String("%100\\%\\_done%".into())]);
    }

    #[test]
    fn update_set_appends_derived_columns_last() {
        let mut update = UpdateSet::new("employees");
        update
            .set("basic_salary", 5000.0)
            .set_opt::<f64>("allowances", None)
            .derive("net_salary = basic_salary + allowances - deductions");

        let built = update.build("id", 7).expect("one column set");
        assert_eq!(
            built.sql,
            "UPDATE employees SET basic_salary = ?, net_salary = basic_salary + allowances - deductions WHERE id = ?"
        );
        assert_eq!(built.values, vec![SqlValue::F64(5000.0), SqlValue::U64(7)]);
    }

    #[test]
    fn update_set_without_fields_builds_nothing() {
        let mut update = UpdateSet::new("books");
        update.derive("status = status");
        assert!(update.build("id", 1).is_none());
    }
}
