use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, TypedHeader},
    http::{header::COOKIE, request::Parts},
};
use headers::{authorization::Bearer, Authorization};
use std::convert::Infallible;

use crate::server::response::ApiError;

/// Credential the caller sent along with the request, forwarded as-is to
/// the backing service.
///
/// A bearer token wins over cookies when both are present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForwardedCredential {
    Bearer(String),
    Cookie(String),
    Anonymous,
}

impl ForwardedCredential {
    pub fn bearer(&self) -> Option<&str> {
        match self {
            Self::Bearer(token) => Some(token),
            _ => None,
        }
    }
}

async fn bearer_from_parts(parts: &mut Parts) -> Option<String> {
    let TypedHeader(Authorization(bearer)) =
        TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, &())
            .await
            .ok()?;
    let token = bearer.token().trim();
    (!token.is_empty()).then(|| token.to_owned())
}

#[async_trait]
impl<S> FromRequestParts<S> for ForwardedCredential
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(token) = bearer_from_parts(parts).await {
            return Ok(Self::Bearer(token));
        }
        let cookies = parts
            .headers
            .get(COOKIE)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty());
        Ok(match cookies {
            Some(cookies) => Self::Cookie(cookies.to_owned()),
            None => Self::Anonymous,
        })
    }
}

/// A bearer token that must be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        bearer_from_parts(parts).await.map(Self).ok_or_else(|| {
            ApiError::unauthorized("Authorization required")
                .with_details("A bearer access token must be supplied")
        })
    }
}
