use axum::{
    extract::{rejection::JsonRejection, Extension},
    Json,
};
use axum_macros::debug_handler;
use microservice_utils::server::response::{into_success, ApiError, AxumResult};
use serde_json::{json, Value};
use std::{path::Path, sync::Arc};
use uuid::Uuid;

use super::json_body;
use crate::{
    context::AppContext,
    models::param::{non_empty, GenerateVoiceBody, HostedTtsBody},
    utils::hosted_tts::{self, DEFAULT_LANG},
};

fn generation_failed(details: impl Into<String>) -> ApiError {
    ApiError::internal("Failed to generate voice").with_details(details)
}

/// Removes partial output so it is never served.
async fn discard(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "cannot remove partial output"),
    }
}

/// Synthesizes the text into the generated directory and returns its public URL.
///
/// Generated files are kept indefinitely.
#[debug_handler]
pub async fn generate_voice(
    Extension(ctx): Extension<Arc<AppContext>>,
    body: Result<Json<GenerateVoiceBody>, JsonRejection>,
) -> AxumResult<Json<Value>> {
    let body = json_body(body)?;
    let text =
        non_empty(body.text.as_ref()).ok_or_else(|| ApiError::bad_request("Text is required"))?;
    tracing::debug!(chars = text.chars().count(), "generating voice");

    let dir = &ctx.config.generated_dir;
    tokio::fs::create_dir_all(dir).await.map_err(|e| {
        tracing::error!(dir = %dir.display(), error = %e, "cannot create output directory");
        generation_failed("Failed to create output directory")
    })?;

    let file_name = format!("{}.{}", Uuid::new_v4(), ctx.synthesizer.extension());
    let path = dir.join(&file_name);
    if let Err(e) = ctx.synthesizer.synthesize(text, &path).await {
        discard(&path).await;
        return Err(generation_failed(format!("Failed to generate audio file: {e:#}")).into());
    }

    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.len() > 0 => {}
        Ok(_) => {
            discard(&path).await;
            return Err(generation_failed("Generated file is empty").into());
        }
        Err(e) => {
            discard(&path).await;
            let details = format!("Failed to verify generated audio file: {e}");
            return Err(generation_failed(details).into());
        }
    }

    let audio_url = ctx.config.generated_url(&file_name);
    tracing::info!(%audio_url, "voice generated");
    Ok(into_success(json!({ "audioUrl": audio_url })))
}

/// Returns the hosted synthesis URL for the text; nothing is fetched.
#[debug_handler]
pub async fn hosted_tts(
    body: Result<Json<HostedTtsBody>, JsonRejection>,
) -> AxumResult<Json<Value>> {
    let body = json_body(body)?;
    let text =
        non_empty(body.text.as_ref()).ok_or_else(|| ApiError::bad_request("No text provided"))?;
    let lang = non_empty(body.lang.as_ref()).unwrap_or(DEFAULT_LANG);

    let url = hosted_tts::audio_url(text, lang, body.slow.unwrap_or(false))
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(into_success(json!({ "url": url.as_str() })))
}
