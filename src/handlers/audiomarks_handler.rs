use axum::{
    extract::{rejection::JsonRejection, Extension, Query},
    Json,
};
use axum_macros::debug_handler;
use microservice_utils::{
    jwt::extractor::{BearerToken, ForwardedCredential},
    server::response::{into_success, ApiError, AxumResult},
};
use serde_json::{json, Value};
use std::sync::Arc;

use super::json_body;
use crate::{
    backend::ClientMode,
    context::AppContext,
    models::{
        audiomark::{AudiomarkFilter, NewAudiomark},
        param::{non_empty, AudiomarkListParams, CreateAudiomarkBody, OptionalId, UpdateNoteBody},
    },
};

fn require_id(params: &OptionalId) -> Result<&str, ApiError> {
    non_empty(params.id.as_ref())
        .ok_or_else(|| ApiError::bad_request("Audiomark ID is required"))
}

// API
#[debug_handler]
pub async fn list_audiomarks(
    Extension(ctx): Extension<Arc<AppContext>>,
    credential: ForwardedCredential,
    Query(params): Query<AudiomarkListParams>,
) -> AxumResult<Json<Value>> {
    let user_id = non_empty(params.user_id.as_ref())
        .ok_or_else(|| ApiError::bad_request("User ID is required"))?;
    let filter = AudiomarkFilter {
        user_id: user_id.to_owned(),
        book_id: non_empty(params.book_id.as_ref()).map(ToOwned::to_owned),
    };

    let backend = ctx.connect(ClientMode::forwarded(credential))?;
    let audiomarks = backend.list_audiomarks(&filter).await?;
    tracing::debug!(user_id, count = audiomarks.len(), "listed audiomarks");

    Ok(into_success(json!({ "audiomarks": audiomarks })))
}

/// Creates an audiomark for the bearer's own account.
///
/// The supplied `userId` must match the subject of the bearer session.
#[debug_handler]
pub async fn create_audiomark(
    Extension(ctx): Extension<Arc<AppContext>>,
    BearerToken(token): BearerToken,
    body: Result<Json<CreateAudiomarkBody>, JsonRejection>,
) -> AxumResult<Json<Value>> {
    let body = json_body(body)?;
    let (Some(user_id), Some(book_id)) = (
        non_empty(body.user_id.as_ref()),
        non_empty(body.book_id.as_ref()),
    ) else {
        return Err(ApiError::bad_request("User ID and book ID are required").into());
    };
    let timestamp = match body.timestamp {
        Some(t) if t.is_finite() && t >= 0.0 => t,
        _ => {
            return Err(ApiError::bad_request("Timestamp must be a non-negative number").into())
        }
    };

    let backend = ctx.connect(ClientMode::bearer(token))?;
    let user = backend.current_user().await?;
    if user.id != user_id {
        tracing::warn!(subject = %user.id, user_id, "audiomark for another account refused");
        return Err(ApiError::forbidden("Cannot create audiomarks for another user").into());
    }

    let audiomark = backend
        .insert_audiomark(&NewAudiomark {
            user_id: user_id.to_owned(),
            book_id: book_id.to_owned(),
            timestamp,
            note: body.note.unwrap_or_default(),
        })
        .await?;
    tracing::info!(audiomark_id = %audiomark.id, user_id, "audiomark created");

    Ok(into_success(json!({ "audiomark": audiomark })))
}

#[debug_handler]
pub async fn delete_audiomark(
    Extension(ctx): Extension<Arc<AppContext>>,
    Query(params): Query<OptionalId>,
    BearerToken(token): BearerToken,
) -> AxumResult<Json<Value>> {
    let id = require_id(&params)?;

    let backend = ctx.connect(ClientMode::bearer(token))?;
    backend.delete_audiomark(id).await?;
    tracing::info!(audiomark_id = id, "audiomark deleted");

    Ok(into_success(json!({})))
}

#[debug_handler]
pub async fn update_audiomark(
    Extension(ctx): Extension<Arc<AppContext>>,
    Query(params): Query<OptionalId>,
    BearerToken(token): BearerToken,
    body: Result<Json<UpdateNoteBody>, JsonRejection>,
) -> AxumResult<Json<Value>> {
    let id = require_id(&params)?;
    let body = json_body(body)?;
    let note =
        non_empty(body.note.as_ref()).ok_or_else(|| ApiError::bad_request("Note is required"))?;

    let backend = ctx.connect(ClientMode::bearer(token))?;
    let audiomark = backend
        .update_audiomark_note(id, note)
        .await?
        .ok_or_else(|| ApiError::not_found("Audiomark not found"))?;

    Ok(into_success(json!({ "audiomark": audiomark })))
}
