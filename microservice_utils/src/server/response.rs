use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::Value;

/// Error returned from handlers.
///
/// Wraps any `anyhow::Error`; when the wrapped error is an [`ApiError`] its
/// status and fields are used, everything else is reported as a 500 carrying
/// the error message.
#[derive(Debug)]
pub struct ResponseError(pub anyhow::Error);

impl From<anyhow::Error> for ResponseError {
    fn from(error: anyhow::Error) -> Self {
        Self(error)
    }
}

impl From<ApiError> for ResponseError {
    fn from(error: ApiError) -> Self {
        Self(anyhow::Error::new(error))
    }
}

impl IntoResponse for ResponseError {
    fn into_response(self) -> axum::response::Response {
        match self.0.downcast::<ApiError>() {
            Ok(error) => error.into_response(),
            Err(error) => ApiError::internal(format!("{error:#}")).into_response(),
        }
    }
}

pub type AxumResult<T> = Result<T, ResponseError>;

/// A failure reported to the caller as `{success: false, error, details?, code?}`.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("{error}")]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<String>,
    pub code: Option<String>,
}

impl ApiError {
    pub fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            error: error.into(),
            details: None,
            code: None,
        }
    }

    pub fn bad_request(error: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, error)
    }

    pub fn unauthorized(error: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, error)
    }

    pub fn forbidden(error: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, error)
    }

    pub fn not_found(error: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, error)
    }

    pub fn internal(error: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, error)
    }

    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut body = serde_json::json!({
            "success": false,
            "error": self.error,
        });
        if let Some(details) = &self.details {
            body["details"] = Value::String(details.clone());
        }
        if let Some(code) = &self.code {
            body["code"] = Value::String(code.clone());
        }
        body
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        if self.status.is_server_error() {
            tracing::error!(status = %self.status, error = %self.error, details = ?self.details);
        } else {
            tracing::debug!(status = %self.status, error = %self.error, details = ?self.details);
        }
        (self.status, Json(self.to_json())).into_response()
    }
}

/// Marks a JSON object payload as successful.
///
/// Non-object payloads are wrapped under `result`.
pub fn into_success(body: Value) -> Json<Value> {
    let value = match body {
        Value::Object(mut map) => {
            map.insert("success".to_owned(), Value::Bool(true));
            Value::Object(map)
        }
        other => serde_json::json!({
            "success": true,
            "result": other,
        }),
    };
    Json(value)
}
