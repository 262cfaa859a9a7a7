//! HTTP client for a hosted Supabase project: GoTrue for auth, PostgREST for
//! rows and the storage API for objects.

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::{header::HeaderMap, Method, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use super::{is_valid_service_key, Backend, BackendError, ClientFactory, ClientMode, Credential};
use crate::models::{
    audiomark::{Audiomark, AudiomarkFilter, NewAudiomark},
    book::{Book, BookPage, BookQuery, NewBook},
    book_request::{BookRequest, NewBookRequest},
    cloned_voice::{ClonedVoice, NewClonedVoice},
    user::{AuthUser, NewProfile, Profile, Session, SignUp, Tier},
};

const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";
const RETURN_REPRESENTATION: &str = "return=representation";

#[derive(Debug, Clone)]
pub struct SupabaseFactory {
    http: reqwest::Client,
    url: String,
    anon_key: String,
    service_key: Option<String>,
}

impl SupabaseFactory {
    pub fn new(url: &str, anon_key: String, service_key: Option<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.trim_end_matches('/').to_owned(),
            anon_key,
            service_key,
        }
    }
}

impl ClientFactory for SupabaseFactory {
    fn connect(&self, mode: ClientMode) -> Result<Arc<dyn Backend>, BackendError> {
        let api_key = match &mode {
            ClientMode::Service => {
                let key = self.service_key.as_ref().ok_or_else(|| {
                    BackendError::Configuration(
                        "SUPABASE_SERVICE_ROLE_KEY is not set in environment variables".to_owned(),
                    )
                })?;
                if !is_valid_service_key(key) {
                    return Err(BackendError::Configuration(
                        "Invalid SUPABASE_SERVICE_ROLE_KEY format".to_owned(),
                    ));
                }
                key.clone()
            }
            ClientMode::Browser | ClientMode::Server(_) => self.anon_key.clone(),
        };
        let persisted = matches!(mode, ClientMode::Browser).then(|| Mutex::new(None));
        Ok(Arc::new(SupabaseClient {
            http: self.http.clone(),
            url: self.url.clone(),
            api_key,
            mode,
            persisted,
        }))
    }
}

#[derive(Debug)]
struct PersistedSession {
    session: Session,
    expires_at: Option<Instant>,
}

pub struct SupabaseClient {
    http: reqwest::Client,
    url: String,
    api_key: String,
    mode: ClientMode,
    /// Only browser handles keep a session between calls.
    persisted: Option<Mutex<Option<PersistedSession>>>,
}

impl SupabaseClient {
    fn persisted_token(&self) -> Option<String> {
        let slot = self.persisted.as_ref()?.lock();
        slot.as_ref().map(|p| p.session.access_token.clone())
    }

    fn persisted_refresh(&self) -> Option<String> {
        let slot = self.persisted.as_ref()?.lock();
        slot.as_ref()
            .filter(|p| p.expires_at.map_or(false, |at| at <= Instant::now()))
            .map(|p| p.session.refresh_token.clone())
    }

    fn persist(&self, session: &Session) {
        if let Some(slot) = &self.persisted {
            *slot.lock() = Some(PersistedSession {
                session: session.clone(),
                expires_at: session
                    .expires_in
                    .and_then(|secs| u64::try_from(secs).ok())
                    .map(|secs| Instant::now() + Duration::from_secs(secs)),
            });
        }
    }

    fn forget(&self) {
        if let Some(slot) = &self.persisted {
            *slot.lock() = None;
        }
    }

    fn session_token(&self) -> Option<String> {
        self.persisted_token()
            .or_else(|| self.mode.bearer_token().map(ToOwned::to_owned))
    }

    /// Attaches key, authorization and forwarded cookies.
    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let token = self.session_token().unwrap_or_else(|| self.api_key.clone());
        let builder = builder.header("apikey", &self.api_key).bearer_auth(token);
        match &self.mode {
            ClientMode::Server(Some(Credential::Cookie(cookies))) => {
                builder.header(reqwest::header::COOKIE, cookies)
            }
            _ => builder,
        }
    }

    fn rest(&self, method: Method, table: &str) -> RequestBuilder {
        self.authorize(
            self.http
                .request(method, format!("{}/rest/v1/{}", self.url, table)),
        )
    }

    fn auth(&self, method: Method, path: &str) -> RequestBuilder {
        self.authorize(
            self.http
                .request(method, format!("{}/auth/v1/{}", self.url, path)),
        )
    }

    /// Browser handles renew an expired persisted session before use.
    async fn refresh_if_expired(&self) -> Result<(), BackendError> {
        let Some(refresh_token) = self.persisted_refresh() else {
            return Ok(());
        };
        tracing::debug!("refreshing persisted session");
        let response = self
            .http
            .post(format!("{}/auth/v1/token", self.url))
            .query(&[("grant_type", "refresh_token")])
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .send()
            .await?;
        let session: Session = decode(response).await?.0;
        self.persist(&session);
        Ok(())
    }

    async fn send<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<(T, HeaderMap), BackendError> {
        self.refresh_if_expired().await?;
        decode(builder.send().await?).await
    }

    async fn send_empty(&self, builder: RequestBuilder) -> Result<(), BackendError> {
        self.refresh_if_expired().await?;
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().await?;
        Err(BackendError::from_body(status.as_u16(), &body))
    }

    async fn insert_one<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        table: &str,
        row: &B,
    ) -> Result<T, BackendError> {
        let builder = self
            .rest(Method::POST, table)
            .header("Prefer", RETURN_REPRESENTATION)
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT)
            .json(row);
        Ok(self.send(builder).await?.0)
    }

    async fn session_grant(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<Session, BackendError> {
        let builder = self
            .auth(Method::POST, "token")
            .query(&[("grant_type", grant_type)])
            .json(&body);
        let (session, _): (Session, _) = self.send(builder).await?;
        self.persist(&session);
        Ok(session)
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<(T, HeaderMap), BackendError> {
    let status = response.status();
    let headers = response.headers().clone();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(BackendError::from_body(status.as_u16(), &body));
    }
    Ok((serde_json::from_str(&body)?, headers))
}

/// Total row count from a `Content-Range: 0-8/20` header.
fn content_range_total(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::CONTENT_RANGE)?
        .to_str()
        .ok()?
        .rsplit('/')
        .next()?
        .parse()
        .ok()
}

/// Double-quoted filter value, escaping the characters the row API reserves.
fn quoted(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}

fn search_filter(term: &str) -> String {
    let pattern = quoted(&format!("*{term}*"));
    format!("(title.ilike.{pattern},author.ilike.{pattern},description.ilike.{pattern})")
}

fn eq(value: &str) -> String {
    format!("eq.{}", quoted(value))
}

#[async_trait]
impl Backend for SupabaseClient {
    async fn sign_up(&self, request: &SignUp) -> Result<AuthUser, BackendError> {
        let builder = self
            .auth(Method::POST, "signup")
            .query(&[("redirect_to", request.redirect_to.as_str())])
            .json(&serde_json::json!({
                "email": request.email,
                "password": request.password,
                "data": {
                    "name": request.name,
                    "tier": request.tier,
                },
            }));
        let (mut body, _): (serde_json::Value, _) = self.send(builder).await?;
        // With auto-confirm the service answers with a full session.
        let user = match body.get_mut("user") {
            Some(user) if user.is_object() => user.take(),
            _ => body,
        };
        Ok(serde_json::from_value(user)?)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        self.session_grant(
            "password",
            serde_json::json!({ "email": email, "password": password }),
        )
        .await
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        if self.session_token().is_none() {
            return Ok(());
        }
        self.send_empty(self.auth(Method::POST, "logout")).await?;
        self.forget();
        Ok(())
    }

    async fn current_user(&self) -> Result<AuthUser, BackendError> {
        if self.session_token().is_none() {
            return Err(BackendError::Unauthorized("No session".to_owned()));
        }
        match self.send(self.auth(Method::GET, "user")).await {
            Ok((user, _)) => Ok(user),
            Err(BackendError::Api {
                status: 401 | 403,
                message,
                ..
            }) => Err(BackendError::Unauthorized(message)),
            Err(e) => Err(e),
        }
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        code_verifier: Option<&str>,
    ) -> Result<Session, BackendError> {
        self.session_grant(
            "pkce",
            serde_json::json!({
                "auth_code": code,
                "code_verifier": code_verifier.unwrap_or_default(),
            }),
        )
        .await
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), BackendError> {
        if self.mode != ClientMode::Service {
            return Err(BackendError::Configuration(
                "deleting users requires the service credential".to_owned(),
            ));
        }
        self.send_empty(self.auth(Method::DELETE, &format!("admin/users/{user_id}")))
            .await
    }

    async fn list_books(&self, query: &BookQuery) -> Result<BookPage, BackendError> {
        let mut params = vec![
            ("select".to_owned(), "*".to_owned()),
            ("order".to_owned(), "created_at.desc".to_owned()),
            ("offset".to_owned(), query.offset().to_string()),
            ("limit".to_owned(), query.limit.to_string()),
        ];
        if let Some(genre) = &query.genre {
            params.push(("genre".to_owned(), eq(genre)));
        }
        if let Some(search) = &query.search {
            params.push(("or".to_owned(), search_filter(search)));
        }
        let builder = self
            .rest(Method::GET, "books")
            .query(&params)
            .header("Prefer", "count=exact");
        let (books, headers): (Vec<Book>, _) = self.send(builder).await?;
        let total = content_range_total(&headers).unwrap_or(books.len() as u64);
        Ok(BookPage { books, total })
    }

    async fn insert_book(&self, book: &NewBook) -> Result<Book, BackendError> {
        self.insert_one("books", book).await
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, BackendError> {
        self.insert_one("users", profile).await
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Profile, BackendError> {
        let builder = self
            .rest(Method::GET, "users")
            .query(&[("select", "*".to_owned()), ("id", eq(user_id))])
            .header(reqwest::header::ACCEPT, SINGLE_OBJECT);
        Ok(self.send(builder).await?.0)
    }

    async fn set_tier(&self, user_id: &str, tier: Tier) -> Result<Vec<Profile>, BackendError> {
        let builder = self
            .rest(Method::PATCH, "users")
            .query(&[("id", eq(user_id))])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&serde_json::json!({ "tier": tier }));
        Ok(self.send(builder).await?.0)
    }

    async fn list_audiomarks(
        &self,
        filter: &AudiomarkFilter,
    ) -> Result<Vec<Audiomark>, BackendError> {
        let mut params = vec![
            ("select", "*,books(title,author,cover_url)".to_owned()),
            ("user_id", eq(&filter.user_id)),
            ("order", "created_at.desc".to_owned()),
        ];
        if let Some(book_id) = &filter.book_id {
            params.push(("book_id", eq(book_id)));
        }
        let builder = self.rest(Method::GET, "audiomarks").query(&params);
        Ok(self.send(builder).await?.0)
    }

    async fn insert_audiomark(
        &self,
        audiomark: &NewAudiomark,
    ) -> Result<Audiomark, BackendError> {
        self.insert_one("audiomarks", audiomark).await
    }

    async fn delete_audiomark(&self, id: &str) -> Result<(), BackendError> {
        let builder = self
            .rest(Method::DELETE, "audiomarks")
            .query(&[("id", eq(id))]);
        self.send_empty(builder).await
    }

    async fn update_audiomark_note(
        &self,
        id: &str,
        note: &str,
    ) -> Result<Option<Audiomark>, BackendError> {
        let builder = self
            .rest(Method::PATCH, "audiomarks")
            .query(&[("id", eq(id))])
            .header("Prefer", RETURN_REPRESENTATION)
            .json(&serde_json::json!({ "note": note }));
        let (rows, _): (Vec<Audiomark>, _) = self.send(builder).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_cloned_voice(
        &self,
        voice: &NewClonedVoice,
    ) -> Result<ClonedVoice, BackendError> {
        self.insert_one("cloned_voices", voice).await
    }

    async fn latest_cloned_voice(
        &self,
        user_id: &str,
    ) -> Result<Option<ClonedVoice>, BackendError> {
        let builder = self.rest(Method::GET, "cloned_voices").query(&[
            ("select", "*".to_owned()),
            ("user_id", eq(user_id)),
            ("order", "created_at.desc".to_owned()),
            ("limit", "1".to_owned()),
        ]);
        let (rows, _): (Vec<ClonedVoice>, _) = self.send(builder).await?;
        Ok(rows.into_iter().next())
    }

    async fn insert_book_request(
        &self,
        request: &NewBookRequest,
    ) -> Result<BookRequest, BackendError> {
        self.insert_one("book_requests", request).await
    }

    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError> {
        let builder = self
            .authorize(
                self.http
                    .post(format!("{}/storage/v1/object/{bucket}/{name}", self.url)),
            )
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(bytes);
        self.send_empty(builder).await
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{name}", self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn total_is_read_from_content_range() {
        let mut headers = HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_RANGE,
            HeaderValue::from_static("0-8/20"),
        );
        assert_eq!(content_range_total(&headers), Some(20));
        headers.insert(
            reqwest::header::CONTENT_RANGE,
            HeaderValue::from_static("*/0"),
        );
        assert_eq!(content_range_total(&headers), Some(0));
    }

    #[test]
    fn search_terms_are_quoted() {
        assert_eq!(
            search_filter("a,b"),
            r#"(title.ilike."*a,b*",author.ilike."*a,b*",description.ilike."*a,b*")"#
        );
        assert_eq!(eq(r#"say "hi""#), r#"eq."say \"hi\"""#);
    }

    #[test]
    fn service_mode_requires_a_valid_key() {
        let factory = SupabaseFactory::new("https://example.supabase.co/", "anon".to_owned(), None);
        assert!(matches!(
            factory.connect(ClientMode::Service),
            Err(BackendError::Configuration(_))
        ));
        let factory = SupabaseFactory::new(
            "https://example.supabase.co",
            "anon".to_owned(),
            Some("not-a-jwt".to_owned()),
        );
        assert!(factory.connect(ClientMode::Service).is_err());
        assert!(factory.connect(ClientMode::anonymous()).is_ok());
    }

    #[test]
    fn public_urls_point_at_the_public_object_path() {
        let factory = SupabaseFactory::new("https://example.supabase.co/", "anon".to_owned(), None);
        let client = factory.connect(ClientMode::Browser).unwrap();
        assert_eq!(
            client.public_url("voice-samples", "u1-1.wav"),
            "https://example.supabase.co/storage/v1/object/public/voice-samples/u1-1.wav"
        );
    }
}
