use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    Json,
};
use axum_macros::debug_handler;
use microservice_utils::{
    jwt::extractor::ForwardedCredential,
    server::response::{into_success, ApiError, AxumResult},
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::json_body;
use crate::{
    backend::ClientMode,
    context::AppContext,
    models::{
        book::{BookQuery, NewBook, DEFAULT_LIMIT, DEFAULT_PAGE},
        param::{non_empty, BookListParams},
    },
};

fn positive(name: &str, value: Option<&String>, default: u32) -> Result<u32, ApiError> {
    let Some(raw) = non_empty(value) else {
        return Ok(default);
    };
    match raw.parse::<u32>() {
        Ok(n) if n >= 1 => Ok(n),
        _ => Err(ApiError::bad_request(format!("Invalid {name}"))
            .with_details(format!("{name} must be a positive integer, got `{raw}`"))),
    }
}

/// Validates the raw catalog query; empty filters are ignored.
pub fn book_query(params: &BookListParams) -> Result<BookQuery, ApiError> {
    Ok(BookQuery {
        genre: non_empty(params.genre.as_ref()).map(ToOwned::to_owned),
        search: non_empty(params.search.as_ref()).map(ToOwned::to_owned),
        page: positive("page", params.page.as_ref(), DEFAULT_PAGE)?,
        limit: positive("limit", params.limit.as_ref(), DEFAULT_LIMIT)?,
    })
}

// API
#[debug_handler]
pub async fn list_books(
    Extension(ctx): Extension<Arc<AppContext>>,
    Query(params): Query<BookListParams>,
) -> AxumResult<Json<Value>> {
    let query = book_query(&params)?;
    tracing::debug!(?query, "listing books");

    let backend = ctx.connect(ClientMode::anonymous())?;
    let page = backend.list_books(&query).await.map_err(|e| {
        ApiError::internal(e.to_string()).with_details("Failed to fetch books from the database")
    })?;

    Ok(into_success(json!({
        "books": page.books,
        "total": page.total,
        "page": query.page,
        "limit": query.limit,
        "hasMore": query.has_more(page.total),
    })))
}

#[debug_handler]
pub async fn create_book(
    Extension(ctx): Extension<Arc<AppContext>>,
    credential: ForwardedCredential,
    body: Result<Json<NewBook>, JsonRejection>,
) -> AxumResult<Json<Value>> {
    let book = json_body(body)?;
    if book.title.trim().is_empty() || book.author.trim().is_empty() {
        return Err(ApiError::bad_request("Title and author are required").into());
    }

    let backend = ctx.connect(ClientMode::forwarded(credential))?;
    let book = backend.insert_book(&book).await.map_err(|e| {
        ApiError::internal(e.to_string()).with_details("Failed to create book in the database")
    })?;
    tracing::info!(book_id = %book.id, "book created");

    Ok(into_success(json!({ "book": book })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(page: Option<&str>, limit: Option<&str>) -> BookListParams {
        BookListParams {
            genre: Some("  ".to_owned()),
            search: Some("dune".to_owned()),
            page: page.map(ToOwned::to_owned),
            limit: limit.map(ToOwned::to_owned),
        }
    }

    #[test]
    fn defaults_apply_when_absent() {
        let query = book_query(&params(None, Some(""))).unwrap();
        assert_eq!(query.page, DEFAULT_PAGE);
        assert_eq!(query.limit, DEFAULT_LIMIT);
        assert_eq!(query.genre, None);
        assert_eq!(query.search.as_deref(), Some("dune"));
    }

    #[test]
    fn non_positive_numbers_are_rejected() {
        for (page, limit) in [("0", "9"), ("1", "-2"), ("x", "9"), ("1", "1.5")] {
            let err = book_query(&params(Some(page), Some(limit))).unwrap_err();
            assert_eq!(err.status, axum::http::StatusCode::BAD_REQUEST);
        }
        assert!(book_query(&params(Some("3"), Some("9"))).is_ok());
    }
}
