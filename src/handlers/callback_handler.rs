use axum::{
    extract::{Extension, Query},
    response::Redirect,
};
use axum_macros::debug_handler;
use std::sync::Arc;

use crate::{
    backend::ClientMode,
    context::AppContext,
    models::param::{non_empty, CallbackParams},
};

/// Landing page of the confirmation e-mail: exchanges the one-time code for a
/// session, then sends the browser home, or to the login page on failure.
#[debug_handler]
pub async fn auth_callback(
    Extension(ctx): Extension<Arc<AppContext>>,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let site = &ctx.config.site_url;
    if let Some(code) = non_empty(params.code.as_ref()) {
        let exchanged = match ctx.connect(ClientMode::anonymous()) {
            Ok(backend) => backend.exchange_code_for_session(code, None).await,
            Err(e) => Err(e),
        };
        match exchanged {
            Ok(session) => {
                tracing::info!(user_id = %session.user.id, "e-mail confirmed");
                return Redirect::temporary(&format!("{site}/"));
            }
            Err(e) => tracing::warn!(error = %e, "code exchange failed"),
        }
    }
    Redirect::temporary(&format!("{site}/login"))
}
