use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Extension, Multipart, Query,
    },
    Json,
};
use axum_macros::debug_handler;
use chrono::Utc;
use microservice_utils::{
    jwt::extractor::ForwardedCredential,
    server::response::{into_success, ApiError, AxumResult},
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::{
    backend::{ClientMode, VOICE_SAMPLES_BUCKET},
    context::AppContext,
    models::{
        cloned_voice::NewClonedVoice,
        param::{non_empty, OptionalUserId},
    },
};

/// Largest accepted voice sample upload.
pub const MAX_SAMPLE_BYTES: usize = 25 * 1024 * 1024;
pub const PROCESSED_MESSAGE: &str = "Voice cloning processed successfully";
const DEFAULT_CONTENT_TYPE: &str = "audio/wav";

#[derive(Default)]
struct CloneForm {
    user_id: Option<String>,
    model: Option<String>,
    audio: Option<(String, Vec<u8>)>,
}

fn invalid_form(error: MultipartError) -> ApiError {
    ApiError::bad_request("Invalid form data").with_details(error.body_text())
}

async fn read_form(mut multipart: Multipart) -> Result<CloneForm, ApiError> {
    let mut form = CloneForm::default();
    while let Some(field) = multipart.next_field().await.map_err(invalid_form)? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "userId" => form.user_id = Some(field.text().await.map_err(invalid_form)?),
            "model" => form.model = Some(field.text().await.map_err(invalid_form)?),
            "audioFile" => {
                let content_type = field
                    .content_type()
                    .unwrap_or(DEFAULT_CONTENT_TYPE)
                    .to_owned();
                let bytes = field.bytes().await.map_err(invalid_form)?;
                if !bytes.is_empty() {
                    form.audio = Some((content_type, bytes.to_vec()));
                }
            }
            _ => {}
        }
    }
    Ok(form)
}

/// Name of the stored sample: the user id and the upload time in milliseconds.
pub fn sample_name(user_id: &str, millis: i64) -> String {
    format!("{user_id}-{millis}.wav")
}

// API
#[debug_handler]
pub async fn clone_voice(
    Extension(ctx): Extension<Arc<AppContext>>,
    credential: ForwardedCredential,
    multipart: Result<Multipart, MultipartRejection>,
) -> AxumResult<Json<Value>> {
    let multipart = multipart.map_err(|rejection| {
        ApiError::bad_request("Invalid form data").with_details(rejection.body_text())
    })?;
    let form = read_form(multipart).await?;
    let (Some(user_id), Some(model), Some((content_type, bytes))) = (
        non_empty(form.user_id.as_ref()),
        non_empty(form.model.as_ref()),
        form.audio,
    ) else {
        return Err(ApiError::bad_request("User ID, model, and audio file are required").into());
    };

    let backend = ctx.connect(ClientMode::forwarded(credential))?;
    let name = sample_name(user_id, Utc::now().timestamp_millis());
    tracing::info!(
        user_id,
        model,
        bytes = bytes.len(),
        object = %name,
        "uploading voice sample"
    );
    backend
        .upload_object(VOICE_SAMPLES_BUCKET, &name, &content_type, bytes)
        .await?;
    let voice_url = backend.public_url(VOICE_SAMPLES_BUCKET, &name);

    // Stands in for model processing; nothing is trained.
    tokio::time::sleep(ctx.config.clone_delay).await;

    let voice = backend
        .insert_cloned_voice(&NewClonedVoice {
            user_id: user_id.to_owned(),
            model: model.to_owned(),
            voice_url,
        })
        .await?;

    Ok(into_success(json!({
        "message": PROCESSED_MESSAGE,
        "voiceId": voice.id,
    })))
}

#[debug_handler]
pub async fn latest_voice(
    Extension(ctx): Extension<Arc<AppContext>>,
    credential: ForwardedCredential,
    Query(params): Query<OptionalUserId>,
) -> AxumResult<Json<Value>> {
    let user_id = non_empty(params.user_id.as_ref())
        .ok_or_else(|| ApiError::bad_request("User ID is required"))?;

    let backend = ctx.connect(ClientMode::forwarded(credential))?;
    let voice = backend.latest_cloned_voice(user_id).await?;

    Ok(into_success(json!({
        "hasClonedVoice": voice.is_some(),
        "voice": voice,
    })))
}
