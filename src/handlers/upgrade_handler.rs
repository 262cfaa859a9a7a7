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
        param::{non_empty, UpgradeBody},
        user::Tier,
    },
};

/// Moves an account to the premium tier. No payment is taken.
#[debug_handler]
pub async fn upgrade(
    Extension(ctx): Extension<Arc<AppContext>>,
    credential: ForwardedCredential,
    body: Result<Json<UpgradeBody>, JsonRejection>,
) -> AxumResult<Json<Value>> {
    let body = json_body(body)?;
    let user_id = non_empty(body.user_id.as_ref())
        .ok_or_else(|| ApiError::bad_request("User ID is required"))?;

    let backend = ctx.connect(ClientMode::forwarded(credential))?;
    let profile = backend
        .set_tier(user_id, Tier::Premium)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    tracing::info!(user_id, "account upgraded");

    Ok(into_success(json!({
        "message": "Account upgraded to premium successfully",
        "user": profile,
    })))
}
