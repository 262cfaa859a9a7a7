//! Handles to the managed data/auth/storage service.
//!
//! Callers pick a [`ClientMode`] matching their execution context and obtain a
//! [`Backend`] from a [`ClientFactory`]. The elevated [`ClientMode::Service`]
//! bypasses row-level policies; only trusted server paths may request it, and
//! nothing in this module checks who is asking.

use async_trait::async_trait;
use microservice_utils::jwt::extractor::ForwardedCredential;
use std::sync::Arc;

use crate::models::{
    audiomark::{Audiomark, AudiomarkFilter, NewAudiomark},
    book::{Book, BookPage, BookQuery, NewBook},
    book_request::{BookRequest, NewBookRequest},
    cloned_voice::{ClonedVoice, NewClonedVoice},
    user::{AuthUser, NewProfile, Profile, Session, SignUp, Tier},
};

pub mod error;
pub mod memory;
pub mod supabase;

pub use error::BackendError;

pub const VOICE_SAMPLES_BUCKET: &str = "voice-samples";

/// Credential forwarded from an incoming request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Cookie(String),
    Bearer(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientMode {
    /// Anonymous key; signing in persists the session on the handle.
    Browser,
    /// Anonymous key plus the caller's credential on every request.
    Server(Option<Credential>),
    /// Service credential, bypasses row-level authorization.
    Service,
}

impl ClientMode {
    pub fn forwarded(credential: ForwardedCredential) -> Self {
        Self::Server(match credential {
            ForwardedCredential::Bearer(token) => Some(Credential::Bearer(token)),
            ForwardedCredential::Cookie(cookies) => Some(Credential::Cookie(cookies)),
            ForwardedCredential::Anonymous => None,
        })
    }

    pub fn bearer(token: impl Into<String>) -> Self {
        Self::Server(Some(Credential::Bearer(token.into())))
    }

    pub fn anonymous() -> Self {
        Self::Server(None)
    }

    pub fn bearer_token(&self) -> Option<&str> {
        match self {
            Self::Server(Some(Credential::Bearer(token))) => Some(token),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Browser => "browser",
            Self::Server(None) => "server",
            Self::Server(Some(Credential::Cookie(_))) => "server+cookie",
            Self::Server(Some(Credential::Bearer(_))) => "server+bearer",
            Self::Service => "service",
        }
    }
}

pub trait ClientFactory: Send + Sync {
    fn connect(&self, mode: ClientMode) -> Result<Arc<dyn Backend>, BackendError>;
}

#[async_trait]
pub trait Backend: Send + Sync {
    // Auth
    async fn sign_up(&self, request: &SignUp) -> Result<AuthUser, BackendError>;
    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError>;
    /// Invalidates the handle's session; a handle without one is a no-op.
    async fn sign_out(&self) -> Result<(), BackendError>;
    async fn current_user(&self) -> Result<AuthUser, BackendError>;
    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, BackendError>;
    /// Service mode only.
    async fn delete_user(&self, user_id: &str) -> Result<(), BackendError>;

    // Rows
    async fn list_books(&self, query: &BookQuery) -> Result<BookPage, BackendError>;
    async fn insert_book(&self, book: &NewBook) -> Result<Book, BackendError>;
    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, BackendError>;
    /// Fails with a row-not-found error when no profile exists.
    async fn fetch_profile(&self, user_id: &str) -> Result<Profile, BackendError>;
    async fn set_tier(&self, user_id: &str, tier: Tier) -> Result<Vec<Profile>, BackendError>;
    /// Newest first, with the book summary joined.
    async fn list_audiomarks(
        &self,
        filter: &AudiomarkFilter,
    ) -> Result<Vec<Audiomark>, BackendError>;
    async fn insert_audiomark(&self, audiomark: &NewAudiomark)
        -> Result<Audiomark, BackendError>;
    async fn delete_audiomark(&self, id: &str) -> Result<(), BackendError>;
    async fn update_audiomark_note(
        &self,
        id: &str,
        note: &str,
    ) -> Result<Option<Audiomark>, BackendError>;
    async fn insert_cloned_voice(
        &self,
        voice: &NewClonedVoice,
    ) -> Result<ClonedVoice, BackendError>;
    async fn latest_cloned_voice(
        &self,
        user_id: &str,
    ) -> Result<Option<ClonedVoice>, BackendError>;
    async fn insert_book_request(
        &self,
        request: &NewBookRequest,
    ) -> Result<BookRequest, BackendError>;

    // Object storage
    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError>;
    fn public_url(&self, bucket: &str, name: &str) -> String;
}

/// A service key must look like a JWT: `eyJ` prefix and three segments.
pub fn is_valid_service_key(key: &str) -> bool {
    key.starts_with("eyJ") && key.split('.').count() == 3
}
