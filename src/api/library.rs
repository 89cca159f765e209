use crate::{
    auth::auth::AuthAdmin,
    error::{AppError, AppResult, is_duplicate_key},
    model::{
        admin::Module,
        common::CountBucket,
        library::{
            Book, BookRow, BorrowRecord, BorrowRecordRow, BorrowState, BorrowStatus, CreateBook,
            IssueBook, RenewBook, ReturnBook, UpdateBook, ensure_copy_available,
        },
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
use sqlx::{MySqlConnection, MySqlPool, types::Json};
use tracing::{debug, info, warn};
use utoipa::{IntoParams, ToSchema};

const DUPLICATE_BOOK: &str = "Book with this ISBN already exists";

const SELECT_BORROW: &str = r#"
    SELECT br.id, br.book_id,
           b.title AS book_title, b.author AS book_author, b.isbn AS book_isbn,
           br.borrower_id, br.borrower_type, br.borrow_date, br.due_date, br.return_date,
           br.status, br.fine, br.renewal_count, br.notes, br.issued_by,
           a.full_name AS issued_by_name, a.username AS issued_by_username,
           br.created_at, br.updated_at
    FROM borrow_records br
    LEFT JOIN books b ON b.id = br.book_id
    LEFT JOIN admins a ON a.id = br.issued_by"#;

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BookQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Matches title, author, ISBN or publisher
    pub search: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

impl BookQuery {
    pub fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        filter
            .search(&["title", "author", "isbn", "publisher"], self.search.as_deref())
            .eq_opt("category", self.category.as_deref())
            .eq_opt("status", self.status.as_deref());
        filter
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct BorrowQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub borrower_id: Option<String>,
    pub borrower_type: Option<String>,
}

impl BorrowQuery {
    pub fn filter(&self) -> Filter {
        let mut filter = Filter::new();
        filter
            .eq_opt("br.status", self.status.as_deref())
            .eq_opt("br.borrower_id", self.borrower_id.as_deref())
            .eq_opt("br.borrower_type", self.borrower_type.as_deref());
        filter
    }
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookListResponse {
    pub books: Vec<Book>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
pub struct BookEnvelope {
    pub book: Book,
}

#[derive(Serialize, ToSchema)]
pub struct BookMessage {
    pub message: String,
    pub book: Book,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowListResponse {
    pub borrows: Vec<BorrowRecord>,
    pub total_pages: i64,
    pub current_page: u32,
    pub total: i64,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BorrowMessage {
    pub message: String,
    pub borrow_record: BorrowRecord,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OverdueResponse {
    pub overdue_books: Vec<BorrowRecord>,
}

#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LibraryStats {
    pub total_books: i64,
    /// Sum of available copies across all titles
    pub available_books: i64,
    pub borrowed_books: i64,
    pub overdue_books: i64,
    pub category_stats: Vec<CountBucket>,
    pub borrow_stats: Vec<CountBucket>,
}

async fn fetch_book(pool: &MySqlPool, id: u64) -> AppResult<Option<Book>> {
    let row = sqlx::query_as::<_, BookRow>("SELECT * FROM books WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::from_db("Error fetching book", e))?;
    Ok(row.map(Book::from))
}

async fn fetch_borrow(pool: &MySqlPool, id: u64) -> AppResult<BorrowRecord> {
    sqlx::query_as::<_, BorrowRecordRow>(&format!("{SELECT_BORROW} WHERE br.id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::from_db("Error fetching borrow record", e))?
        .map(BorrowRecord::from)
        .ok_or_else(|| AppError::NotFound("Borrow record not found".into()))
}

/// Locks the record for the rest of the transaction.
async fn lock_borrow(conn: &mut MySqlConnection, id: u64, context: &str) -> AppResult<BorrowState> {
    sqlx::query_as::<_, BorrowState>(
        "SELECT id, book_id, status, due_date, renewal_count FROM borrow_records WHERE id = ? FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(conn)
    .await
    .map_err(|e| AppError::from_db(context, e))?
    .ok_or_else(|| AppError::NotFound("Borrow record not found".into()))
}

fn duplicate_or(context: &str, e: sqlx::Error) -> AppError {
    if is_duplicate_key(&e) {
        AppError::Duplicate(DUPLICATE_BOOK.into())
    } else {
        AppError::from_db(context, e)
    }
}

/// List books
#[utoipa::path(
    get,
    path = "/api/library/books",
    params(BookQuery),
    responses(
        (status = 200, description = "Paginated book list", body = BookListResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn list_books(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    query: web::Query<BookQuery>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;

    let page = Page::from_query(query.page, query.limit);
    let (rows, total) = fetch_page::<BookRow>(
        pool.get_ref(),
        "SELECT * FROM books",
        "SELECT COUNT(*) FROM books",
        &query.filter(),
        "created_at DESC, id DESC",
        page,
    )
    .await
    .map_err(|e| AppError::from_db("Error fetching books", e))?;

    Ok(HttpResponse::Ok().json(BookListResponse {
        books: rows.into_iter().map(Book::from).collect(),
        total_pages: page.total_pages(total),
        current_page: page.page,
        total,
    }))
}

/// Get book by ID
#[utoipa::path(
    get,
    path = "/api/library/books/{id}",
    params(("id", Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book found", body = BookEnvelope),
        (status = 404, description = "Book not found", body = MessageResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn get_book(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;

    let book = fetch_book(pool.get_ref(), path.into_inner())
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".into()))?;

    Ok(HttpResponse::Ok().json(BookEnvelope { book }))
}

/// Add book
#[utoipa::path(
    post,
    path = "/api/library/books",
    request_body = CreateBook,
    responses(
        (status = 201, description = "Book added", body = BookMessage),
        (status = 400, description = "Validation failed or duplicate ISBN", body = MessageResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn create_book(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    body: web::Json<CreateBook>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;
    let body = body.into_inner().normalize()?;

    let existing = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books WHERE isbn = ?")
        .bind(&body.isbn)
        .fetch_one(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error adding book", e))?;

    if existing > 0 {
        return Err(AppError::Duplicate(DUPLICATE_BOOK.into()));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO books
        (isbn, title, author, publisher, published_year, category, language,
         total_copies, available_copies, price, location, description, cover_image, status)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&body.isbn)
    .bind(&body.title)
    .bind(&body.author)
    .bind(&body.publisher)
    .bind(body.published_year)
    .bind(body.category.as_ref())
    .bind(&body.language)
    .bind(body.total_copies)
    .bind(body.available_copies())
    .bind(body.price)
    .bind(Json(&body.location))
    .bind(&body.description)
    .bind(&body.cover_image)
    .bind(body.status.as_ref())
    .execute(pool.get_ref())
    .await
    .map_err(|e| duplicate_or("Error adding book", e))?;

    let book = fetch_book(pool.get_ref(), result.last_insert_id())
        .await?
        .ok_or_else(|| AppError::internal("Error adding book", "inserted row not found"))?;

    info!(id = book.id, isbn = %book.isbn, created_by = auth.id(), "Book added");

    Ok(HttpResponse::Created().json(BookMessage {
        message: "Book added successfully".into(),
        book,
    }))
}

fn book_update(body: UpdateBook) -> UpdateSet {
    let mut set = UpdateSet::new("books");
    set.set_opt("isbn", body.isbn)
        .set_opt("title", body.title)
        .set_opt("author", body.author)
        .set_opt("publisher", body.publisher)
        .set_opt("published_year", body.published_year)
        .set_opt("category", body.category.map(|c| c.as_ref().to_string()))
        .set_opt("language", body.language)
        .set_opt("total_copies", body.total_copies)
        .set_opt("available_copies", body.available_copies)
        .set_opt("price", body.price)
        .set_opt("location", body.location.as_ref().map(SqlValue::json))
        .set_opt("description", body.description)
        .set_opt("cover_image", body.cover_image)
        .set_opt("status", body.status.map(|s| s.as_ref().to_string()));
    set
}

/// Update book
#[utoipa::path(
    put,
    path = "/api/library/books/{id}",
    params(("id", Path, description = "Book ID")),
    request_body = UpdateBook,
    responses(
        (status = 200, description = "Book updated", body = BookMessage),
        (status = 400, description = "Validation failed", body = MessageResponse),
        (status = 404, description = "Book not found", body = MessageResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn update_book(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<UpdateBook>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;
    let id = path.into_inner();
    let body = body.into_inner().normalize()?;

    let db_err = |e| AppError::from_db("Error updating book", e);

    let mut tx = pool.begin().await.map_err(db_err)?;

    // Issue and return lock the same row, so the counters below stay current.
    let (current_total, current_available) = sqlx::query_as::<_, (u32, u32)>(
        "SELECT total_copies, available_copies FROM books WHERE id = ? FOR UPDATE",
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_err)?
    .ok_or_else(|| AppError::NotFound("Book not found".into()))?;

    if body.touches_copies() {
        let on_loan = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM borrow_records WHERE book_id = ? AND status = ?",
        )
        .bind(id)
        .bind(BorrowStatus::Borrowed.as_ref())
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        body.check_copies(
            current_total,
            current_available,
            u32::try_from(on_loan).unwrap_or(u32::MAX),
        )?;
    }

    if let Some(isbn) = &body.isbn {
        let clash = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM books WHERE isbn = ? AND id <> ?",
        )
        .bind(isbn)
        .bind(id)
        .fetch_one(&mut *tx)
        .await
        .map_err(db_err)?;

        if clash > 0 {
            return Err(AppError::Duplicate(DUPLICATE_BOOK.into()));
        }
    }

    if let Some(update) = book_update(body).build("id", id) {
        execute_update(&mut *tx, update)
            .await
            .map_err(|e| duplicate_or("Error updating book", e))?;
    }

    tx.commit().await.map_err(db_err)?;

    let book = fetch_book(pool.get_ref(), id)
        .await?
        .ok_or_else(|| AppError::NotFound("Book not found".into()))?;

    Ok(HttpResponse::Ok().json(BookMessage {
        message: "Book updated successfully".into(),
        book,
    }))
}

/// Delete book
#[utoipa::path(
    delete,
    path = "/api/library/books/{id}",
    params(("id", Path, description = "Book ID")),
    responses(
        (status = 200, description = "Book deleted", body = MessageResponse),
        (status = 400, description = "Book has active borrows", body = MessageResponse),
        (status = 404, description = "Book not found", body = MessageResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn delete_book(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;
    let id = path.into_inner();

    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM borrow_records WHERE book_id = ? AND status = ?",
    )
    .bind(id)
    .bind(BorrowStatus::Borrowed.as_ref())
    .fetch_one(pool.get_ref())
    .await
    .map_err(|e| AppError::from_db("Error deleting book", e))?;

    if active > 0 {
        return Err(AppError::BadRequest(
            "Cannot delete book with active borrows".into(),
        ));
    }

    let result = sqlx::query("DELETE FROM books WHERE id = ?")
        .bind(id)
        .execute(pool.get_ref())
        .await
        .map_err(|e| AppError::from_db("Error deleting book", e))?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Book not found".into()));
    }

    info!(id, deleted_by = auth.id(), "Book deleted");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Book deleted successfully")))
}

/// List borrow records
#[utoipa::path(
    get,
    path = "/api/library/borrows",
    params(BorrowQuery),
    responses(
        (status = 200, description = "Paginated borrow records", body = BorrowListResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn list_borrows(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    query: web::Query<BorrowQuery>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;

    let page = Page::from_query(query.page, query.limit);
    let (rows, total) = fetch_page::<BorrowRecordRow>(
        pool.get_ref(),
        SELECT_BORROW,
        "SELECT COUNT(*) FROM borrow_records br",
        &query.filter(),
        "br.created_at DESC, br.id DESC",
        page,
    )
    .await
    .map_err(|e| AppError::from_db("Error fetching borrow records", e))?;

    Ok(HttpResponse::Ok().json(BorrowListResponse {
        borrows: rows.into_iter().map(BorrowRecord::from).collect(),
        total_pages: page.total_pages(total),
        current_page: page.page,
        total,
    }))
}

/// Issue a book
#[utoipa::path(
    post,
    path = "/api/library/borrows",
    request_body = IssueBook,
    responses(
        (status = 201, description = "Book issued", body = BorrowMessage),
        (status = 400, description = "No copies available or borrower already has the book", body = MessageResponse),
        (status = 404, description = "Book not found", body = MessageResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn issue_book(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    body: web::Json<IssueBook>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;
    let body = body.into_inner().normalize(Utc::now().date_naive())?;
    let db_err = |e| AppError::from_db("Error issuing book", e);

    let mut tx = pool.begin().await.map_err(db_err)?;

    let available = sqlx::query_scalar::<_, u32>(
        "SELECT available_copies FROM books WHERE id = ? FOR UPDATE",
    )
    .bind(body.book_id)
    .fetch_optional(&mut *tx)
    .await
    .map_err(db_err)?
    .ok_or_else(|| AppError::NotFound("Book not found".into()))?;

    ensure_copy_available(available)?;

    let holding = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM borrow_records WHERE book_id = ? AND borrower_id = ? AND status = ?",
    )
    .bind(body.book_id)
    .bind(&body.borrower_id)
    .bind(BorrowStatus::Borrowed.as_ref())
    .fetch_one(&mut *tx)
    .await
    .map_err(db_err)?;

    if holding > 0 {
        return Err(AppError::BadRequest("Borrower already has this book".into()));
    }

    let taken = sqlx::query(
        "UPDATE books SET available_copies = available_copies - 1 WHERE id = ? AND available_copies > 0",
    )
    .bind(body.book_id)
    .execute(&mut *tx)
    .await
    .map_err(db_err)?;

    if taken.rows_affected() == 0 {
        return Err(AppError::BadRequest("No copies available".into()));
    }

    let result = sqlx::query(
        r#"
        INSERT INTO borrow_records
        (book_id, borrower_id, borrower_type, borrow_date, due_date, status, issued_by)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(body.book_id)
    .bind(&body.borrower_id)
    .bind(body.borrower_type.as_ref())
    .bind(Utc::now())
    .bind(body.due_date)
    .bind(BorrowStatus::Borrowed.as_ref())
    .bind(auth.id())
    .execute(&mut *tx)
    .await
    .map_err(db_err)?;

    tx.commit().await.map_err(db_err)?;

    let borrow_record = fetch_borrow(pool.get_ref(), result.last_insert_id()).await?;
    info!(
        borrow_id = borrow_record.id,
        book_id = body.book_id,
        borrower_id = %body.borrower_id,
        issued_by = auth.id(),
        "Book issued"
    );

    Ok(HttpResponse::Created().json(BorrowMessage {
        message: "Book issued successfully".into(),
        borrow_record,
    }))
}

/// Return a borrowed book
#[utoipa::path(
    patch,
    path = "/api/library/borrows/{id}/return",
    params(("id", Path, description = "Borrow record ID")),
    request_body = ReturnBook,
    responses(
        (status = 200, description = "Book returned", body = BorrowMessage),
        (status = 400, description = "Book is not currently borrowed", body = MessageResponse),
        (status = 404, description = "Borrow record not found", body = MessageResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn return_book(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Bytes,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;
    let id = path.into_inner();
    let body = ReturnBook::from_body(&body)?.normalize()?;
    let db_err = |e| AppError::from_db("Error returning book", e);

    let mut tx = pool.begin().await.map_err(db_err)?;

    let mut state = lock_borrow(&mut *tx, id, "Error returning book").await?;
    state.mark_returned()?;

    sqlx::query(
        "UPDATE borrow_records SET status = ?, return_date = ?, fine = ?, notes = ? WHERE id = ?",
    )
    .bind(&state.status)
    .bind(Utc::now())
    .bind(body.fine)
    .bind(&body.notes)
    .bind(id)
    .execute(&mut *tx)
    .await
    .map_err(db_err)?;

    if let Some(book_id) = state.book_id {
        let restocked = sqlx::query(
            "UPDATE books SET available_copies = available_copies + 1 \
             WHERE id = ? AND available_copies < total_copies",
        )
        .bind(book_id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        if restocked.rows_affected() == 0 {
            warn!(borrow_id = id, book_id, "Shelf already full, copy counter left unchanged");
        }
    }

    tx.commit().await.map_err(db_err)?;

    let borrow_record = fetch_borrow(pool.get_ref(), id).await?;
    info!(borrow_id = id, book_id = ?state.book_id, fine = body.fine, "Book returned");

    Ok(HttpResponse::Ok().json(BorrowMessage {
        message: "Book returned successfully".into(),
        borrow_record,
    }))
}

/// Renew a borrowed book
#[utoipa::path(
    patch,
    path = "/api/library/borrows/{id}/renew",
    params(("id", Path, description = "Borrow record ID")),
    request_body = RenewBook,
    responses(
        (status = 200, description = "Book renewed", body = BorrowMessage),
        (status = 400, description = "Not borrowed or renewal limit reached", body = MessageResponse),
        (status = 404, description = "Borrow record not found", body = MessageResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn renew_book(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
    path: web::Path<u64>,
    body: web::Json<RenewBook>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;
    let id = path.into_inner();
    let db_err = |e| AppError::from_db("Error renewing book", e);

    let mut tx = pool.begin().await.map_err(db_err)?;

    let mut state = lock_borrow(&mut *tx, id, "Error renewing book").await?;
    state.renew(body.new_due_date, Utc::now().date_naive())?;

    sqlx::query("UPDATE borrow_records SET due_date = ?, renewal_count = ? WHERE id = ?")
        .bind(state.due_date)
        .bind(state.renewal_count)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

    tx.commit().await.map_err(db_err)?;

    debug!(borrow_id = id, renewal_count = state.renewal_count, "Book renewed");
    let borrow_record = fetch_borrow(pool.get_ref(), id).await?;

    Ok(HttpResponse::Ok().json(BorrowMessage {
        message: "Book renewed successfully".into(),
        borrow_record,
    }))
}

/// Borrowed books past their due date
#[utoipa::path(
    get,
    path = "/api/library/overdue",
    responses(
        (status = 200, description = "Overdue borrow records, earliest due first", body = OverdueResponse)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn overdue_books(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;

    let rows = sqlx::query_as::<_, BorrowRecordRow>(&format!(
        "{SELECT_BORROW} WHERE br.status = ? AND br.due_date < CURDATE() ORDER BY br.due_date ASC"
    ))
    .bind(BorrowStatus::Borrowed.as_ref())
    .fetch_all(pool.get_ref())
    .await
    .map_err(|e| AppError::from_db("Error fetching overdue books", e))?;

    Ok(HttpResponse::Ok().json(OverdueResponse {
        overdue_books: rows.into_iter().map(BorrowRecord::from).collect(),
    }))
}

/// Library statistics
#[utoipa::path(
    get,
    path = "/api/library/stats/overview",
    responses(
        (status = 200, description = "Library statistics", body = LibraryStats)
    ),
    tag = "Library",
    security(("bearer_auth" = []))
)]
pub async fn library_stats(
    auth: AuthAdmin,
    pool: web::Data<MySqlPool>,
) -> AppResult<HttpResponse> {
    auth.require_permission(Module::Library)?;
    let pool = pool.get_ref();
    let db_err = |e| AppError::from_db("Error fetching library statistics", e);

    let total_books = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM books")
        .fetch_one(pool)
        .await
        .map_err(db_err)?;

    let available_books = sqlx::query_scalar::<_, i64>(
        "SELECT CAST(COALESCE(SUM(available_copies), 0) AS SIGNED) FROM books",
    )
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    let borrowed_books =
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM borrow_records WHERE status = 'Borrowed'")
            .fetch_one(pool)
            .await
            .map_err(db_err)?;

    let overdue_books = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM borrow_records WHERE status = 'Borrowed' AND due_date < CURDATE()",
    )
    .fetch_one(pool)
    .await
    .map_err(db_err)?;

    let category_stats = sqlx::query_as::<_, CountBucket>(
        "SELECT category AS id, COUNT(*) AS count FROM books GROUP BY category ORDER BY count DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    let borrow_stats = sqlx::query_as::<_, CountBucket>(
        r#"
        SELECT borrower_type AS id, COUNT(*) AS count
        FROM borrow_records
        WHERE status = 'Borrowed'
        GROUP BY borrower_type
        "#,
    )
    .fetch_all(pool)
    .await
    .map_err(db_err)?;

    Ok(HttpResponse::Ok().json(LibraryStats {
        total_books,
        available_books,
        borrowed_books,
        overdue_books,
        category_stats,
        borrow_stats,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::admin::AdminRole;
    use crate::testing;
    use actix_web::{http::StatusCode, test};
    use chrono::Duration;
    use serde_json::{Value, json};

    #[::core::prelude::v1::test]
    fn borrow_filters_use_joined_alias() {
        let query = BorrowQuery {
            status: Some("Borrowed".into()),
            borrower_type: Some("Employee".into()),
            ..BorrowQuery::default()
        };
        assert_eq!(
            query.filter().where_clause(),
            "WHERE br.status = ? AND br.borrower_type = ?"
        );
    }

    #[::core::prelude::v1::test]
    fn book_list_has_no_default_status() {
        assert_eq!(BookQuery::default().filter().where_clause(), "");
    }

    #[::core::prelude::v1::test]
    fn book_update_sets_only_sent_columns() {
        let body = UpdateBook {
            available_copies: Some(3),
            price: Some(99.5),
            ..UpdateBook::default()
        };
        let update = book_update(body).build("id", 2).unwrap();

        assert_eq!(
            update.sql,
            "UPDATE books SET available_copies = ?, price = ? WHERE id = ?"
        );
        assert_eq!(
            update.values,
            vec![SqlValue::U64(3), SqlValue::F64(99.5), SqlValue::U64(2)]
        );
    }

    fn book_payload(total_copies: u32) -> Value {
        json!({
            "isbn": testing::unique("978-"),
            "title": "Engineering Mechanics",
            "author": "Timoshenko",
            "publisher": "McGraw-Hill",
            "publishedYear": 1990,
            "category": "Mechanical Engineering",
            "totalCopies": total_copies,
            "price": 640.0
        })
    }

    fn issue_payload(book_id: u64, borrower_id: &str) -> Value {
        json!({
            "bookId": book_id,
            "borrowerId": borrower_id,
            "borrowerType": "Student",
            "dueDate": (Utc::now().date_naive() + Duration::days(14)).to_string()
        })
    }

    async fn available(pool: &MySqlPool, book_id: u64) -> u32 {
        sqlx::query_scalar::<_, u32>("SELECT available_copies FROM books WHERE id = ?")
            .bind(book_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[actix_web::test]
    async fn issue_and_return_move_the_shelf_counter_by_one() {
        let Some(pool) = testing::pool().await else {
            return;
        };
        let librarian = testing::insert_admin(&pool, AdminRole::Admin, "shelf-key-1").await;
        let auth = ("Authorization", testing::bearer(&librarian));
        let app = test::init_service(testing::app(pool.clone())).await;

        let (status, created) = testing::call(
            &app,
            test::TestRequest::post()
                .uri("/api/library/books")
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(book_payload(1))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created["book"]["availableCopies"], 1);
        let book_id = created["book"]["id"].as_u64().unwrap();

        let (status, issued) = testing::call(
            &app,
            test::TestRequest::post()
                .uri("/api/library/borrows")
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(issue_payload(book_id, "ME2024001"))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(issued["borrowRecord"]["status"], "Borrowed");
        assert_eq!(issued["borrowRecord"]["issuedBy"]["id"], librarian.id);
        let borrow_id = issued["borrowRecord"]["id"].as_u64().unwrap();
        assert_eq!(available(&pool, book_id).await, 0);

        let (status, refused) = testing::call(
            &app,
            test::TestRequest::post()
                .uri("/api/library/borrows")
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(issue_payload(book_id, "ME2024002"))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(refused["message"], "No copies available");
        assert_eq!(available(&pool, book_id).await, 0);

        let orphan = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM borrow_records WHERE book_id = ? AND borrower_id = ?",
        )
        .bind(book_id)
        .bind("ME2024002")
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(orphan, 0);

        let new_due = Utc::now().date_naive() + Duration::days(21);
        let (status, renewed) = testing::call(
            &app,
            test::TestRequest::patch()
                .uri(&format!("/api/library/borrows/{borrow_id}/renew"))
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(json!({ "newDueDate": new_due.to_string() }))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(renewed["borrowRecord"]["renewalCount"], 1);
        assert_eq!(renewed["borrowRecord"]["dueDate"], new_due.to_string());

        let (status, returned) = testing::call(
            &app,
            test::TestRequest::patch()
                .uri(&format!("/api/library/borrows/{borrow_id}/return"))
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(json!({ "fine": 5.0, "notes": " spine torn " }))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(returned["borrowRecord"]["status"], "Returned");
        assert_eq!(returned["borrowRecord"]["fine"], 5.0);
        assert_eq!(returned["borrowRecord"]["notes"], "spine torn");
        assert_eq!(available(&pool, book_id).await, 1);

        let (status, _) = testing::call(
            &app,
            test::TestRequest::patch()
                .uri(&format!("/api/library/borrows/{borrow_id}/return"))
                .insert_header(auth)
                .peer_addr(testing::peer())
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(available(&pool, book_id).await, 1);
    }

    #[actix_web::test]
    async fn shrinking_stock_respects_copies_on_loan() {
        let Some(pool) = testing::pool().await else {
            return;
        };
        let librarian = testing::insert_admin(&pool, AdminRole::Admin, "shelf-key-2").await;
        let auth = ("Authorization", testing::bearer(&librarian));
        let app = test::init_service(testing::app(pool.clone())).await;

        let (_, created) = testing::call(
            &app,
            test::TestRequest::post()
                .uri("/api/library/books")
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(book_payload(3))
                .to_request(),
        )
        .await;
        let book_id = created["book"]["id"].as_u64().unwrap();

        let mut borrow_ids = Vec::new();
        for borrower in ["CE2024001", "CE2024002"] {
            let (status, issued) = testing::call(
                &app,
                test::TestRequest::post()
                    .uri("/api/library/borrows")
                    .insert_header(auth.clone())
                    .peer_addr(testing::peer())
                    .set_json(issue_payload(book_id, borrower))
                    .to_request(),
            )
            .await;
            assert_eq!(status, StatusCode::CREATED);
            borrow_ids.push(issued["borrowRecord"]["id"].as_u64().unwrap());
        }

        let (status, refused) = testing::call(
            &app,
            test::TestRequest::put()
                .uri(&format!("/api/library/books/{book_id}"))
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(json!({ "totalCopies": 1 }))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            refused["message"],
            "totalCopies cannot be less than the 2 copies currently on loan"
        );

        let (status, _) = testing::call(
            &app,
            test::TestRequest::put()
                .uri(&format!("/api/library/books/{book_id}"))
                .insert_header(auth.clone())
                .peer_addr(testing::peer())
                .set_json(json!({ "totalCopies": 2 }))
                .to_request(),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        for borrow_id in borrow_ids {
            let (status, _) = testing::call(
                &app,
                test::TestRequest::patch()
                    .uri(&format!("/api/library/borrows/{borrow_id}/return"))
                    .insert_header(auth.clone())
                    .peer_addr(testing::peer())
                    .to_request(),
            )
            .await;
            assert_eq!(status, StatusCode::OK);
        }

        let (total, available) = sqlx::query_as::<_, (u32, u32)>(
            "SELECT total_copies, available_copies FROM books WHERE id = ?",
        )
        .bind(book_id)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!((total, available), (2, 2));
    }
}
