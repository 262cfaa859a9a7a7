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
    backend::{BackendError, ClientMode},
    context::AppContext,
    models::{
        param::{non_empty, AuthBody},
        user::{NewProfile, SignUp, Tier},
    },
};

pub const PROFILE_NOT_FOUND: &str = "PROFILE_NOT_FOUND";
pub const REGISTERED_MESSAGE: &str =
    "Registration successful. Please check your email to confirm your account.";
const EMAIL_NOT_CONFIRMED: &str = "Email not confirmed";
const CONFIRM_DETAILS: &str = "Please check your email for a confirmation link. \
    Click the link to confirm your email address before logging in.";

fn missing_fields() -> ApiError {
    ApiError::bad_request("Missing required fields")
        .with_details("Action, email, and password are required")
}

struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

fn credentials(body: &AuthBody) -> Result<Credentials<'_>, ApiError> {
    match (non_empty(body.email.as_ref()), body.password.as_deref()) {
        (Some(email), Some(password)) if !password.is_empty() => {
            Ok(Credentials { email, password })
        }
        _ => Err(missing_fields()),
    }
}

// API
#[debug_handler]
pub async fn auth(
    Extension(ctx): Extension<Arc<AppContext>>,
    credential: ForwardedCredential,
    body: Result<Json<AuthBody>, JsonRejection>,
) -> AxumResult<Json<Value>> {
    let body = json_body(body)?;
    let action = non_empty(body.action.as_ref()).ok_or_else(missing_fields)?;
    match action {
        "register" => register(&ctx, &body).await,
        "login" => login(&ctx, &body).await,
        "logout" => logout(&ctx, credential).await,
        other => {
            tracing::debug!(action = other, "unsupported auth action");
            Err(ApiError::bad_request("Invalid action")
                .with_details("The provided action is not supported")
                .into())
        }
    }
}

/// Creates the auth identity, then the profile row through the service
/// handle. A failed profile insert deletes the identity again; a crash
/// between the two steps leaves the identity without a profile.
async fn register(ctx: &AppContext, body: &AuthBody) -> AxumResult<Json<Value>> {
    let Credentials { email, password } = credentials(body)?;
    let name = non_empty(body.name.as_ref()).ok_or_else(|| {
        ApiError::bad_request("Missing required field")
            .with_details("Name is required for registration")
    })?;
    let tier = match non_empty(body.tier.as_ref()) {
        Some(tier) => tier
            .parse::<Tier>()
            .map_err(|e| ApiError::bad_request("Invalid tier").with_details(e))?,
        None => Tier::Free,
    };

    let admin = ctx.connect(ClientMode::Service).map_err(|e| {
        tracing::error!(error = %e, "service handle unavailable");
        ApiError::internal("Server configuration error").with_details(
            "Service role key is not properly configured. Set SUPABASE_SERVICE_ROLE_KEY.",
        )
    })?;

    tracing::info!(email, %tier, "registering account");
    let backend = ctx.connect(ClientMode::anonymous())?;
    let user = backend
        .sign_up(&SignUp {
            email: email.to_owned(),
            password: password.to_owned(),
            name: name.to_owned(),
            tier,
            redirect_to: ctx.config.callback_url(),
        })
        .await
        .map_err(|e| {
            let mut error = ApiError::bad_request(e.to_string())
                .with_details(format!("Failed to create user account: {e}"));
            if let Some(code) = e.code() {
                error = error.with_code(code);
            }
            error
        })?;

    let profile = NewProfile {
        id: user.id.clone(),
        email: email.to_owned(),
        name: name.to_owned(),
        tier,
    };
    if let Err(e) = admin.insert_profile(&profile).await {
        tracing::warn!(
            user_id = %user.id,
            error = %e.describe(),
            "profile insert failed, removing identity"
        );
        if let Err(cleanup) = admin.delete_user(&user.id).await {
            tracing::error!(user_id = %user.id, error = %cleanup, "orphaned auth identity");
        }
        let mut error = ApiError::internal("Profile creation failed")
            .with_details(format!("Failed to create user profile: {}", e.describe()));
        if let Some(code) = e.code() {
            error = error.with_code(code);
        }
        return Err(error.into());
    }

    Ok(into_success(json!({
        "user": user,
        "message": REGISTERED_MESSAGE,
    })))
}

async fn login(ctx: &AppContext, body: &AuthBody) -> AxumResult<Json<Value>> {
    let Credentials { email, password } = credentials(body)?;

    let backend = ctx.connect(ClientMode::anonymous())?;
    let session = backend
        .sign_in_with_password(email, password)
        .await
        .map_err(|e| {
            tracing::debug!(email, error = %e, "sign in refused");
            if e.to_string() == EMAIL_NOT_CONFIRMED || e.code() == Some("email_not_confirmed") {
                ApiError::unauthorized("Please confirm your email").with_details(CONFIRM_DETAILS)
            } else {
                ApiError::unauthorized("Login failed").with_details(e.to_string())
            }
        })?;

    let profile = ctx
        .connect(ClientMode::bearer(&session.access_token))?
        .fetch_profile(&session.user.id)
        .await
        .map_err(|e| match e {
            e if e.is_row_not_found() => ApiError::not_found("Account not found")
                .with_details("Please register first")
                .with_code(PROFILE_NOT_FOUND),
            e => ApiError::internal("Profile fetch failed").with_details(e.to_string()),
        })?;
    tracing::info!(user_id = %session.user.id, "signed in");

    Ok(into_success(json!({
        "user": session.user,
        "profile": profile,
        "access_token": session.access_token,
        "refresh_token": session.refresh_token,
    })))
}

async fn logout(ctx: &AppContext, credential: ForwardedCredential) -> AxumResult<Json<Value>> {
    let backend = ctx.connect(ClientMode::forwarded(credential))?;
    backend.sign_out().await.map_err(|e| match e {
        BackendError::Unauthorized(message) => {
            ApiError::unauthorized("Logout failed").with_details(message)
        }
        e => ApiError::internal("Logout failed").with_details(e.to_string()),
    })?;
    Ok(into_success(json!({})))
}
