use axum::http::StatusCode;
use microservice_utils::server::response::{ApiError, ResponseError};
use serde::Deserialize;

/// Error code the row API returns when a single row was requested but none matched.
pub const ROW_NOT_FOUND: &str = "PGRST116";

#[derive(thiserror::Error, Debug)]
pub enum BackendError {
    /// The service answered with an error body.
    #[error("{message}")]
    Api {
        status: u16,
        code: Option<String>,
        message: String,
        details: Option<String>,
        hint: Option<String>,
    },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Configuration(String),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("failed to decode service response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl BackendError {
    pub fn api(status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Api {
            status,
            code: Some(code.into()),
            message: message.into(),
            details: None,
            hint: None,
        }
    }

    pub fn row_not_found() -> Self {
        Self::Api {
            status: 406,
            code: Some(ROW_NOT_FOUND.to_owned()),
            message: "JSON object requested, multiple (or no) rows returned".to_owned(),
            details: Some("The result contains 0 rows".to_owned()),
            hint: None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_row_not_found(&self) -> bool {
        self.code() == Some(ROW_NOT_FOUND)
    }

    /// Message with the service hint appended, if any.
    pub fn describe(&self) -> String {
        match self {
            Self::Api {
                message,
                hint: Some(hint),
                ..
            } => format!("{message} ({hint})"),
            other => other.to_string(),
        }
    }

    /// Builds an error from a non-success response body.
    ///
    /// Row, auth and storage endpoints each shape their error bodies
    /// differently; all of them are folded into [`BackendError::Api`].
    pub fn from_body(status: u16, body: &str) -> Self {
        #[derive(Deserialize, Default)]
        #[serde(default)]
        struct Body {
            code: Option<serde_json::Value>,
            error_code: Option<String>,
            message: Option<String>,
            msg: Option<String>,
            error: Option<String>,
            error_description: Option<String>,
            details: Option<String>,
            hint: Option<String>,
        }

        let parsed: Body = serde_json::from_str(body).unwrap_or_default();
        let code = parsed
            .error_code
            .or_else(|| match parsed.code {
                Some(serde_json::Value::String(code)) => Some(code),
                _ => None,
            })
            .or_else(|| parsed.error.clone());
        let message = parsed
            .msg
            .or(parsed.error_description)
            .or(parsed.message)
            .or(parsed.error)
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("request failed with status {status}")
                } else {
                    body.trim().to_owned()
                }
            });
        Self::Api {
            status,
            code,
            message,
            details: parsed.details,
            hint: parsed.hint,
        }
    }
}

impl From<BackendError> for ResponseError {
    fn from(error: BackendError) -> Self {
        let api = match &error {
            BackendError::Unauthorized(message) => ApiError::unauthorized(message.clone()),
            BackendError::Api {
                details: Some(details),
                ..
            } => ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, error.to_string())
                .with_details(details.clone()),
            _ => ApiError::internal(error.to_string()),
        };
        api.into()
    }
}
