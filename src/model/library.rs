use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use strum_macros::{AsRefStr, EnumString};
use utoipa::ToSchema;

use crate::error::{AppError, AppResult};
use crate::model::common::{check_non_negative, require_text};

/// Renewals allowed per borrow record.
pub const MAX_RENEWALS: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum BookCategory {
    #[serde(rename = "Computer Science")]
    #[strum(serialize = "Computer Science")]
    ComputerScience,
    #[serde(rename = "Mechanical Engineering")]
    #[strum(serialize = "Mechanical Engineering")]
    MechanicalEngineering,
    #[serde(rename = "Electrical Engineering")]
    #[strum(serialize = "Electrical Engineering")]
    ElectricalEngineering,
    #[serde(rename = "Civil Engineering")]
    #[strum(serialize = "Civil Engineering")]
    CivilEngineering,
    Electronics,
    #[serde(rename = "Chemical Engineering")]
    #[strum(serialize = "Chemical Engineering")]
    ChemicalEngineering,
    Mathematics,
    Physics,
    Chemistry,
    General,
    Reference,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum BookStatus {
    #[default]
    Available,
    #[serde(rename = "Out of Stock")]
    #[strum(serialize = "Out of Stock")]
    OutOfStock,
    Discontinued,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum BorrowerType {
    Student,
    Employee,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ToSchema, AsRefStr, EnumString)]
pub enum BorrowStatus {
    #[default]
    Borrowed,
    Returned,
    Overdue,
    Lost,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(default)]
pub struct ShelfLocation {
    pub shelf: Option<String>,
    pub rack: Option<String>,
    pub floor: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct BookRow {
    pub id: u64,
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub published_year: i32,
    pub category: String,
    pub language: String,
    pub total_copies: u32,
    pub available_copies: u32,
    pub price: f64,
    pub location: Json<ShelfLocation>,
    pub description: Option<String>,
    pub cover_image: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "978-0262033848")]
    pub isbn: String,
    #[schema(example = "Introduction to Algorithms")]
    pub title: String,
    pub author: String,
    pub publisher: String,
    pub published_year: i32,
    #[schema(example = "Computer Science")]
    pub category: String,
    pub language: String,
    pub total_copies: u32,
    pub available_copies: u32,
    pub price: f64,
    pub location: ShelfLocation,
    pub description: Option<String>,
    pub cover_image: String,
    #[schema(example = "Available")]
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BookRow> for Book {
    fn from(row: BookRow) -> Self {
        Self {
            id: row.id,
            isbn: row.isbn,
            title: row.title,
            author: row.author,
            publisher: row.publisher,
            published_year: row.published_year,
            category: row.category,
            language: row.language,
            total_copies: row.total_copies,
            available_copies: row.available_copies,
            price: row.price,
            location: row.location.0,
            description: row.description,
            cover_image: row.cover_image,
            status: row.status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn default_language() -> String {
    "English".to_string()
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateBook {
    #[schema(example = "978-0262033848")]
    pub isbn: String,
    pub title: String,
    pub author: String,
    pub publisher: String,
    #[schema(example = 2009)]
    pub published_year: i32,
    pub category: BookCategory,
    #[serde(default = "default_language")]
    pub language: String,
    #[schema(example = 5)]
    pub total_copies: u32,
    #[schema(example = 1250.0)]
    pub price: f64,
    #[serde(default)]
    pub location: ShelfLocation,
    pub description: Option<String>,
    #[serde(default)]
    pub cover_image: String,
    #[serde(default)]
    pub status: BookStatus,
}

impl CreateBook {
    pub fn normalize(mut self) -> AppResult<Self> {
        self.isbn = require_text("isbn", &self.isbn)?;
        self.title = require_text("title", &self.title)?;
        self.author = require_text("author", &self.author)?;
        self.publisher = require_text("publisher", &self.publisher)?;
        if self.total_copies < 1 {
            return Err(AppError::Validation("totalCopies must be at least 1".into()));
        }
        check_non_negative("price", self.price)?;
        self.description = self.description.map(|d| d.trim().to_string());
        Ok(self)
    }

    /// A new book starts with every copy on the shelf.
    pub fn available_copies(&self) -> u32 {
        self.total_copies
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBook {
    pub isbn: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub publisher: Option<String>,
    pub published_year: Option<i32>,
    pub category: Option<BookCategory>,
    pub language: Option<String>,
    pub total_copies: Option<u32>,
    pub available_copies: Option<u32>,
    pub price: Option<f64>,
    pub location: Option<ShelfLocation>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub status: Option<BookStatus>,
}

impl UpdateBook {
    pub fn normalize(mut self) -> AppResult<Self> {
        if let Some(v) = self.isbn.take() {
            self.isbn = Some(require_text("isbn", &v)?);
        }
        if let Some(v) = self.title.take() {
            self.title = Some(require_text("title", &v)?);
        }
        if let Some(v) = self.author.take() {
            self.author = Some(require_text("author", &v)?);
        }
        if let Some(v) = self.publisher.take() {
            self.publisher = Some(require_text("publisher", &v)?);
        }
        if let Some(price) = self.price {
            check_non_negative("price", price)?;
        }
        if self.total_copies == Some(0) {
            return Err(AppError::Validation("totalCopies must be at least 1".into()));
        }
        Ok(self)
    }

    /// Checks the copy counters the update would leave behind. `on_loan` is
    /// the number of open borrow records for the book.
    pub fn check_copies(
        &self,
        current_total: u32,
        current_available: u32,
        on_loan: u32,
    ) -> AppResult<()> {
        let total = self.total_copies.unwrap_or(current_total);
        let available = self.available_copies.unwrap_or(current_available);
        if total < on_loan {
            return Err(AppError::Validation(format!(
                "totalCopies cannot be less than the {on_loan} copies currently on loan"
            )));
        }
        if available > total {
            return Err(AppError::Validation(
                "availableCopies cannot exceed totalCopies".into(),
            ));
        }
        Ok(())
    }

    pub fn touches_copies(&self) -> bool {
        self.total_copies.is_some() || self.available_copies.is_some()
    }
}

/// Borrow record joined with the book summary and the issuing admin.
#[derive(Debug, sqlx::FromRow)]
pub struct BorrowRecordRow {
    pub id: u64,
    pub book_id: Option<u64>,
    pub book_title: Option<String>,
    pub book_author: Option<String>,
    pub book_isbn: Option<String>,
    pub borrower_id: String,
    pub borrower_type: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub return_date: Option<DateTime<Utc>>,
    pub status: String,
    pub fine: f64,
    pub renewal_count: u8,
    pub notes: Option<String>,
    pub issued_by: Option<u64>,
    pub issued_by_name: Option<String>,
    pub issued_by_username: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookSummary {
    pub id: u64,
    pub title: Option<String>,
    pub author: Option<String>,
    pub isbn: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AdminSummary {
    pub id: u64,
    pub full_name: Option<String>,
    pub username: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowRecord {
    pub id: u64,
    /// `None` once the book has been deleted
    pub book: Option<BookSummary>,
    pub borrower_id: String,
    #[schema(example = "Student")]
    pub borrower_type: String,
    pub borrow_date: DateTime<Utc>,
    pub due_date: NaiveDate,
    pub return_date: Option<DateTime<Utc>>,
    #[schema(example = "Borrowed")]
    pub status: String,
    pub fine: f64,
    pub renewal_count: u8,
    pub notes: Option<String>,
    pub issued_by: Option<AdminSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<BorrowRecordRow> for BorrowRecord {
    fn from(row: BorrowRecordRow) -> Self {
        Self {
            id: row.id,
            book: row.book_id.map(|id| BookSummary {
                id,
                title: row.book_title,
                author: row.book_author,
                isbn: row.book_isbn,
            }),
            borrower_id: row.borrower_id,
            borrower_type: row.borrower_type,
            borrow_date: row.borrow_date,
            due_date: row.due_date,
            return_date: row.return_date,
            status: row.status,
            fine: row.fine,
            renewal_count: row.renewal_count,
            notes: row.notes,
            issued_by: row.issued_by.map(|id| AdminSummary {
                id,
                full_name: row.issued_by_name,
                username: row.issued_by_username,
            }),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Columns the borrow state rules look at.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct BorrowState {
    pub id: u64,
    pub book_id: Option<u64>,
    pub status: String,
    pub due_date: NaiveDate,
    pub renewal_count: u8,
}

impl BorrowState {
    fn ensure_borrowed(&self) -> AppResult<()> {
        if self.status != BorrowStatus::Borrowed.as_ref() {
            return Err(AppError::BadRequest("Book is not currently borrowed".into()));
        }
        Ok(())
    }

    /// Marks the record returned; the caller puts one copy back on the shelf.
    pub fn mark_returned(&mut self) -> AppResult<()> {
        self.ensure_borrowed()?;
        self.status = BorrowStatus::Returned.as_ref().to_string();
        Ok(())
    }

    /// Extends the due date. Leaves the record untouched on any rejection.
    pub fn renew(&mut self, new_due_date: NaiveDate, today: NaiveDate) -> AppResult<()> {
        self.ensure_borrowed()?;
        if self.renewal_count >= MAX_RENEWALS {
            return Err(AppError::BadRequest("Maximum renewal limit reached".into()));
        }
        if new_due_date < today {
            return Err(AppError::Validation("newDueDate cannot be in the past".into()));
        }
        if new_due_date < self.due_date {
            return Err(AppError::Validation(
                "newDueDate cannot be earlier than the current due date".into(),
            ));
        }
        self.due_date = new_due_date;
        self.renewal_count += 1;
        Ok(())
    }
}

/// Copies left on the shelf must cover a new loan.
pub fn ensure_copy_available(available_copies: u32) -> AppResult<()> {
    if available_copies == 0 {
        return Err(AppError::BadRequest("No copies available".into()));
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct IssueBook {
    #[schema(example = 1)]
    pub book_id: u64,
    #[schema(example = "CS2024001")]
    pub borrower_id: String,
    pub borrower_type: BorrowerType,
    #[schema(example = "2026-11-01")]
    pub due_date: NaiveDate,
}

impl IssueBook {
    pub fn normalize(mut self, today: NaiveDate) -> AppResult<Self> {
        self.borrower_id = require_text("borrowerId", &self.borrower_id)?;
        if self.due_date < today {
            return Err(AppError::Validation("dueDate cannot be in the past".into()));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct ReturnBook {
    pub fine: f64,
    pub notes: String,
}

impl ReturnBook {
    /// The body is optional; an empty one means no fine and no notes.
    pub fn from_body(body: &[u8]) -> AppResult<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::default());
        }
        serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Json deserialize error: {e}")))
    }

    pub fn normalize(mut self) -> AppResult<Self> {
        check_non_negative("fine", self.fine)?;
        self.notes = self.notes.trim().to_string();
        Ok(self)
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RenewBook {
    #[schema(example = "2026-12-01")]
    pub new_due_date: NaiveDate,
}
