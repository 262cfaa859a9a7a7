use axum::{extract::rejection::JsonRejection, Json};
use microservice_utils::server::response::ApiError;

pub mod audiomarks_handler;
pub mod auth_handler;
pub mod book_request_handler;
pub mod books_handler;
pub mod callback_handler;
pub mod tts_handler;
pub mod upgrade_handler;
pub mod voice_cloning_handler;

/// Unwraps a JSON body, reporting malformed input through the envelope.
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(|rejection| {
        ApiError::bad_request("Invalid request body").with_details(rejection.body_text())
    })
}
