use axum::{
    extract::{rejection::JsonRejection, Extension},
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
        book_request::{NewBookRequest, STATUS_PENDING},
        param::{non_empty, BookRequestBody},
    },
};

/// Files a suggestion for a book missing from the catalog.
#[debug_handler]
pub async fn request_book(
    Extension(ctx): Extension<Arc<AppContext>>,
    credential: ForwardedCredential,
    body: Result<Json<BookRequestBody>, JsonRejection>,
) -> AxumResult<Json<Value>> {
    let body = json_body(body)?;
    let (Some(book_name), Some(author)) = (
        non_empty(body.book_name.as_ref()),
        non_empty(body.author.as_ref()),
    ) else {
        return Err(ApiError::bad_request("Book name and author are required").into());
    };

    let signed_in = credential.bearer().is_some();
    let backend = ctx.connect(ClientMode::forwarded(credential))?;
    let user = if signed_in {
        Some(backend.current_user().await?)
    } else {
        None
    };

    let user_email = non_empty(body.email.as_ref())
        .map(ToOwned::to_owned)
        .or_else(|| user.as_ref().and_then(|u| u.email.clone()))
        .ok_or_else(|| ApiError::bad_request("Email is required"))?;

    let request = backend
        .insert_book_request(&NewBookRequest {
            book_name: book_name.to_owned(),
            author: author.to_owned(),
            edition: non_empty(body.edition.as_ref()).map(ToOwned::to_owned),
            additional_notes: non_empty(body.additional_notes.as_ref()).map(ToOwned::to_owned),
            status: STATUS_PENDING.to_owned(),
            user_email,
            user_id: user.map(|u| u.id),
        })
        .await
        .map_err(|e| {
            ApiError::internal("Failed to submit book request").with_details(e.to_string())
        })?;
    tracing::info!(book_name, author, "book requested");

    Ok(into_success(json!({ "request": request })))
}
