use axum::response::{IntoResponse, Response};
use axum_macros::debug_handler;

use crate::server::response::ApiError;

// Handler 404 - Not Found
#[debug_handler]
pub async fn error_404() -> Response {
    ApiError::not_found("Not Found").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[tokio::test]
    async fn unknown_routes_answer_with_json_envelope() {
        let response = error_404().await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not Found");
    }
}
