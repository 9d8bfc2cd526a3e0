//! HTTP handlers for `/books/`.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, OriginalUri, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use libris_db::{RecordId, Repository, StoreError, Window};
use libris_http::{AppError, LimitOffset, Page, PageLinks, QueryParams};
use libris_kernel::settings::PaginationSettings;
use serde_json::Value;

use super::filters::BookFilter;
use super::models::Book;
use super::validation::{self, Mode};

/// Shared state handed to every books handler.
#[derive(Clone)]
pub struct BooksState {
    pub store: Arc<dyn Repository<Book>>,
    pub pagination: PaginationSettings,
    pub public_url: Option<String>,
}

pub fn router(state: BooksState) -> Router {
    Router::new()
        .route("/books/", get(list_books).post(create_book))
        .route(
            "/books/{id}/",
            get(retrieve_book)
                .put(update_book)
                .patch(partial_update_book)
                .delete(destroy_book),
        )
        .route("/books/health", get(health_check))
        .with_state(state)
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "books module is healthy"
}

async fn list_books(
    State(state): State<BooksState>,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    Query(query): Query<QueryParams>,
) -> Result<Json<Page<Book>>, AppError> {
    let filter = BookFilter::from_query(&query)?;
    let window = LimitOffset::from_query(&query, &state.pagination);

    let slice = state
        .store
        .query(filter.conditions(), Window::new(window.offset, window.limit))
        .await
        .map_err(store_error)?;

    let links = PageLinks::for_request(state.public_url.as_deref(), &headers, uri.path(), query)
        .map_err(|err| AppError::Internal(err.into()))?;

    tracing::debug!(
        filters = filter.conditions().len(),
        limit = window.limit,
        offset = window.offset,
        count = slice.total,
        "books listed"
    );
    Ok(Json(window.into_page(slice.total, slice.rows, &links)))
}

async fn retrieve_book(
    State(state): State<BooksState>,
    Path(id): Path<String>,
) -> Result<Json<Book>, AppError> {
    let book = fetch(&state, &id).await?;
    Ok(Json(book))
}

async fn create_book(
    State(state): State<BooksState>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<(StatusCode, Json<Book>), AppError> {
    let Json(payload) = payload?;
    let changes = validation::validate(&payload, Mode::Create, state.store.as_ref(), None).await?;

    let mut book = Book::default();
    changes.apply_to(&mut book);
    let book = state.store.insert(book).await.map_err(store_error)?;

    tracing::info!(book_id = book.id, isbn = %book.isbn, "book created");
    Ok((StatusCode::CREATED, Json(book)))
}

async fn update_book(
    State(state): State<BooksState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let existing = fetch(&state, &id).await?;
    let Json(payload) = payload?;
    let changes = validation::validate(
        &payload,
        Mode::FullUpdate,
        state.store.as_ref(),
        Some(existing.id),
    )
    .await?;

    let mut book = Book {
        id: existing.id,
        ..Book::default()
    };
    changes.apply_to(&mut book);
    let book = state.store.replace(book).await.map_err(store_error)?;

    tracing::info!(book_id = book.id, "book replaced");
    Ok(Json(book))
}

async fn partial_update_book(
    State(state): State<BooksState>,
    Path(id): Path<String>,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<Book>, AppError> {
    let mut book = fetch(&state, &id).await?;
    let Json(payload) = payload?;
    let changes = validation::validate(
        &payload,
        Mode::PartialUpdate,
        state.store.as_ref(),
        Some(book.id),
    )
    .await?;

    changes.apply_to(&mut book);
    let book = state.store.replace(book).await.map_err(store_error)?;

    tracing::info!(book_id = book.id, "book updated");
    Ok(Json(book))
}

async fn destroy_book(
    State(state): State<BooksState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let id = parse_id(&id)?;
    state.store.delete(id).await.map_err(store_error)?;

    tracing::info!(book_id = id, "book deleted");
    Ok(StatusCode::NO_CONTENT)
}

async fn fetch(state: &BooksState, raw_id: &str) -> Result<Book, AppError> {
    let id = parse_id(raw_id)?;
    state
        .store
        .get(id)
        .await
        .map_err(store_error)?
        .ok_or_else(not_found)
}

/// Ids that are not integers cannot name a book.
fn parse_id(raw_id: &str) -> Result<RecordId, AppError> {
    raw_id.parse().map_err(|_| not_found())
}

fn not_found() -> AppError {
    AppError::not_found("No Book matches the given query.")
}

fn store_error(err: StoreError) -> AppError {
    match err {
        StoreError::NotFound { .. } => not_found(),
        StoreError::UniqueViolation { field: "isbn", .. } => {
            AppError::field("isbn", validation::duplicate_isbn())
        }
        other => AppError::Internal(other.into()),
    }
}
