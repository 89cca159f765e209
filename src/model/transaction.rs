use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::model::common::{check_non_negative, require_text};
use crate::model::library::AdminSummary;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum TransactionType {
    Income,
    Expense,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum TransactionCategory {
    #[serde(rename = "Student Fees")]
    #[strum(serialize = "Student Fees")]
    StudentFees,
    Salary,
    Infrastructure,
    Equipment,
    Utilities,
    Maintenance,
    Library,
    Laboratory,
    Events,
    Scholarships,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum PaymentMethod {
    Cash,
    #[serde(rename = "Bank Transfer")]
    #[strum(serialize = "Bank Transfer")]
    BankTransfer,
    Check,
    Online,
    Card,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum EntityType {
    Student,
    Employee,
    Vendor,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum TransactionStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
    Completed,
}

impl TransactionStatus {
    /// Statuses an approver may move a transaction into.
    pub fn is_decision(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Attachment {
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_type: Option<String>,
}

/// `TXN<unix millis><three digits>`.
pub fn generate_transaction_id(now: DateTime<Utc>) -> String {
    let suffix = uuid::Uuid::new_v4().as_u128() % 1000;
    format!("TXN{}{:03}", now.timestamp_millis(), suffix)
}

#[derive(Debug, sqlx::FromRow)]
pub struct TransactionRow {
    pub id: u64,
    pub transaction_id: String,
    #[sqlx(rename = "type")]
    pub kind: String,
    pub category: String,
    pub amount: f64,
    pub description: String,
    pub date: NaiveDate,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub related_entity: Option<String>,
    pub entity_type: Option<String>,
    pub approved_by: Option<u64>,
    pub approved_by_name: Option<String>,
    pub approved_by_username: Option<String>,
    pub status: String,
    pub attachments: Json<Vec<Attachment>>,
    pub academic_year: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: u64,
    #[schema(example = "TXN1760601600000042")]
    pub transaction_id: String,
    #[serde(rename = "type")]
    #[schema(example = "Income")]
    pub kind: String,
    #[schema(example = "Student Fees")]
    pub category: String,
    pub amount: f64,
    pub description: String,
    pub date: NaiveDate,
    pub payment_method: String,
    pub reference_number: Option<String>,
    pub related_entity: Option<String>,
    pub entity_type: Option<String>,
    pub approved_by: Option<AdminSummary>,
    #[schema(example = "Pending")]
    pub status: String,
    pub attachments: Vec<Attachment>,
    #[schema(example = "2026")]
    pub academic_year: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<TransactionRow> for Transaction {
    fn from(row: TransactionRow) -> Self {
        Self {
            id: row.id,
            transaction_id: row.transaction_id,
            kind: row.kind,
            category: row.category,
            amount: row.amount,
            description: row.description,
            date: row.date,
            payment_method: row.payment_method,
            reference_number: row.reference_number,
            related_entity: row.related_entity,
            entity_type: row.entity_type,
            approved_by: row.approved_by.map(|id| AdminSummary {
                id,
                full_name: row.approved_by_name,
                username: row.approved_by_username,
            }),
            status: row.status,
            attachments: row.attachments.0,
            academic_year: row.academic_year,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransaction {
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: TransactionCategory,
    #[schema(example = 45000.0)]
    pub amount: f64,
    #[schema(example = "Semester fee - CS2024001")]
    pub description: String,
    pub date: Option<NaiveDate>,
    pub payment_method: PaymentMethod,
    pub reference_number: Option<String>,
    pub related_entity: Option<String>,
    pub entity_type: Option<EntityType>,
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    #[schema(example = "2026")]
    pub academic_year: String,
}

impl CreateTransaction {
    pub fn normalize(mut self) -> AppResult<Self> {
        check_non_negative("amount", self.amount)?;
        self.description = require_text("description", &self.description)?;
        self.academic_year = require_text("academicYear", &self.academic_year)?;
        self.reference_number = trim_opt(self.reference_number);
        self.related_entity = trim_opt(self.related_entity);
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTransaction {
    #[serde(rename = "type")]
    pub kind: Option<TransactionType>,
    pub category: Option<TransactionCategory>,
    pub amount: Option<f64>,
    pub description: Option<String>,
    pub date: Option<NaiveDate>,
    pub payment_method: Option<PaymentMethod>,
    pub reference_number: Option<String>,
    pub related_entity: Option<String>,
    pub entity_type: Option<EntityType>,
    pub status: Option<TransactionStatus>,
    pub attachments: Option<Vec<Attachment>>,
    pub academic_year: Option<String>,
}

impl UpdateTransaction {
    pub fn normalize(mut self) -> AppResult<Self> {
        if let Some(amount) = self.amount {
            check_non_negative("amount", amount)?;
        }
        if let Some(v) = self.description.take() {
            self.description = Some(require_text("description", &v)?);
        }
        if let Some(v) = self.academic_year.take() {
            self.academic_year = Some(require_text("academicYear", &v)?);
        }
        self.reference_number = trim_opt(self.reference_number);
        self.related_entity = trim_opt(self.related_entity);
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateTransactionStatus {
    #[schema(example = "Approved")]
    pub status: String,
}

impl UpdateTransactionStatus {
    /// Only Approved, Rejected and Completed are accepted.
    pub fn decision(&self) -> AppResult<TransactionStatus> {
        self.status
            .parse::<TransactionStatus>()
            .ok()
            .filter(TransactionStatus::is_decision)
            .ok_or_else(|| AppError::BadRequest("Invalid status".into()))
    }
}

fn trim_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
