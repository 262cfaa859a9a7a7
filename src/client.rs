//! Typed HTTP client for the service's JSON routes.
//!
//! Every call unwraps the `{success, ...}` envelope: successful payloads are
//! decoded into the route's response type, failures surface as
//! [`ClientError::Api`] with the server's `error`, `details` and `code`.

use reqwest::{header::LOCATION, multipart, redirect, Method, RequestBuilder, StatusCode};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::{json, Value};
use url::Url;

use crate::models::{
    audiomark::{Audiomark, NewAudiomark},
    book::{Book, BookQuery, NewBook},
    book_request::BookRequest,
    cloned_voice::ClonedVoice,
    user::{AuthUser, Profile, Tier},
};

#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("{status}: {error}")]
    Api {
        status: StatusCode,
        error: String,
        details: Option<String>,
        code: Option<String>,
    },
    #[error("not signed in")]
    SignedOut,
    #[error("unexpected response: {0}")]
    Unexpected(String),
    #[error(transparent)]
    Url(#[from] url::ParseError),
    #[error(transparent)]
    Decode(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl ClientError {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::Transport(e) => e.status(),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct Failure {
    error: String,
    #[serde(default)]
    details: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookListing {
    pub books: Vec<Book>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub has_more: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Registration {
    pub user: AuthUser,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Login {
    pub user: AuthUser,
    pub profile: Profile,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneOutcome {
    pub message: String,
    pub voice_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestVoice {
    voice: Option<ClonedVoice>,
}

/// Book suggestion as typed into the request form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookSuggestion {
    pub book_name: String,
    pub author: String,
    pub edition: Option<String>,
    pub additional_notes: Option<String>,
    pub email: Option<String>,
}

pub struct AurisClient {
    http: reqwest::Client,
    base: Url,
    access_token: Option<String>,
}

impl AurisClient {
    pub fn new(base: &str) -> Result<Self, ClientError> {
        // The confirmation callback answers with a redirect the caller inspects.
        let http = reqwest::Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            base: Url::parse(base)?,
            access_token: None,
        })
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn set_access_token(&mut self, token: Option<String>) {
        self.access_token = token;
    }

    fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, ClientError> {
        let builder = self.http.request(method, self.base.join(path)?);
        Ok(match &self.access_token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        let body: Value = response.json().await?;
        if !status.is_success() || body.get("success") != Some(&Value::Bool(true)) {
            let Failure {
                error,
                details,
                code,
            } = serde_json::from_value(body).unwrap_or_else(|_| Failure {
                error: status.to_string(),
                details: None,
                code: None,
            });
            tracing::debug!(%status, %error, "request failed");
            return Err(ClientError::Api {
                status,
                error,
                details,
                code,
            });
        }
        Ok(serde_json::from_value(body)?)
    }

    pub async fn list_books(&self, query: &BookQuery) -> Result<BookListing, ClientError> {
        let mut params = vec![
            ("page", query.page.to_string()),
            ("limit", query.limit.to_string()),
        ];
        if let Some(genre) = &query.genre {
            params.push(("genre", genre.clone()));
        }
        if let Some(search) = &query.search {
            params.push(("search", search.clone()));
        }
        self.send(self.request(Method::GET, "/api/books")?.query(&params))
            .await
    }

    pub async fn create_book(&self, book: &NewBook) -> Result<Book, ClientError> {
        #[derive(Deserialize)]
        struct Created {
            book: Book,
        }
        let created: Created = self
            .send(self.request(Method::POST, "/api/books")?.json(book))
            .await?;
        Ok(created.book)
    }

    /// Registers an account; the profile is created server-side.
    pub async fn register(
        &self,
        email: &str,
        password: &str,
        name: &str,
        tier: Option<Tier>,
    ) -> Result<Registration, ClientError> {
        let mut body = json!({
            "action": "register",
            "email": email,
            "password": password,
            "name": name,
        });
        if let Some(tier) = tier {
            body["tier"] = Value::String(tier.as_str().to_owned());
        }
        self.send(self.request(Method::POST, "/api/auth")?.json(&body))
            .await
    }

    /// Signs in and keeps the access token for later calls.
    pub async fn login(&mut self, email: &str, password: &str) -> Result<Login, ClientError> {
        let body = json!({
            "action": "login",
            "email": email,
            "password": password,
        });
        let login: Login = self
            .send(self.request(Method::POST, "/api/auth")?.json(&body))
            .await?;
        self.access_token = Some(login.access_token.clone());
        Ok(login)
    }

    pub async fn logout(&mut self) -> Result<(), ClientError> {
        if self.access_token.is_none() {
            return Err(ClientError::SignedOut);
        }
        let body = json!({ "action": "logout" });
        let _: Value = self
            .send(self.request(Method::POST, "/api/auth")?.json(&body))
            .await?;
        self.access_token = None;
        Ok(())
    }

    pub async fn upgrade(&self, user_id: &str) -> Result<Profile, ClientError> {
        #[derive(Deserialize)]
        struct Upgraded {
            user: Profile,
        }
        let upgraded: Upgraded = self
            .send(
                self.request(Method::POST, "/api/upgrade")?
                    .json(&json!({ "userId": user_id })),
            )
            .await?;
        Ok(upgraded.user)
    }

    pub async fn list_audiomarks(
        &self,
        user_id: &str,
        book_id: Option<&str>,
    ) -> Result<Vec<Audiomark>, ClientError> {
        #[derive(Deserialize)]
        struct Listing {
            audiomarks: Vec<Audiomark>,
        }
        let mut params = vec![("userId", user_id)];
        if let Some(book_id) = book_id {
            params.push(("bookId", book_id));
        }
        let listing: Listing = self
            .send(self.request(Method::GET, "/api/audiomarks")?.query(&params))
            .await?;
        Ok(listing.audiomarks)
    }

    pub async fn create_audiomark(&self, draft: &NewAudiomark) -> Result<Audiomark, ClientError> {
        let body = json!({
            "userId": draft.user_id,
            "bookId": draft.book_id,
            "timestamp": draft.timestamp,
            "note": draft.note,
        });
        self.audiomark(self.request(Method::POST, "/api/audiomarks")?.json(&body))
            .await
    }

    pub async fn update_audiomark(&self, id: &str, note: &str) -> Result<Audiomark, ClientError> {
        self.audiomark(
            self.request(Method::PATCH, "/api/audiomarks")?
                .query(&[("id", id)])
                .json(&json!({ "note": note })),
        )
        .await
    }

    pub async fn delete_audiomark(&self, id: &str) -> Result<(), ClientError> {
        let _: Value = self
            .send(
                self.request(Method::DELETE, "/api/audiomarks")?
                    .query(&[("id", id)]),
            )
            .await?;
        Ok(())
    }

    async fn audiomark(&self, builder: RequestBuilder) -> Result<Audiomark, ClientError> {
        #[derive(Deserialize)]
        struct Single {
            audiomark: Audiomark,
        }
        let single: Single = self.send(builder).await?;
        Ok(single.audiomark)
    }

    pub async fn clone_voice(
        &self,
        user_id: &str,
        model: &str,
        file_name: &str,
        sample: Vec<u8>,
    ) -> Result<CloneOutcome, ClientError> {
        let audio = multipart::Part::bytes(sample)
            .file_name(file_name.to_owned())
            .mime_str("audio/wav")?;
        let form = multipart::Form::new()
            .text("userId", user_id.to_owned())
            .text("model", model.to_owned())
            .part("audioFile", audio);
        self.send(self.request(Method::POST, "/api/voice-cloning")?.multipart(form))
            .await
    }

    pub async fn latest_voice(&self, user_id: &str) -> Result<Option<ClonedVoice>, ClientError> {
        let latest: LatestVoice = self
            .send(
                self.request(Method::GET, "/api/voice-cloning")?
                    .query(&[("userId", user_id)]),
            )
            .await?;
        Ok(latest.voice)
    }

    /// Synthesizes `text` on the server; returns the public audio URL.
    pub async fn generate_voice(&self, text: &str) -> Result<String, ClientError> {
        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Generated {
            audio_url: String,
        }
        let generated: Generated = self
            .send(
                self.request(Method::POST, "/api/generate-voice")?
                    .json(&json!({ "text": text })),
            )
            .await?;
        Ok(generated.audio_url)
    }

    pub async fn hosted_tts(
        &self,
        text: &str,
        lang: Option<&str>,
        slow: bool,
    ) -> Result<String, ClientError> {
        #[derive(Deserialize)]
        struct Hosted {
            url: String,
        }
        let mut body = json!({ "text": text, "slow": slow });
        if let Some(lang) = lang {
            body["lang"] = Value::String(lang.to_owned());
        }
        let hosted: Hosted = self
            .send(self.request(Method::POST, "/api/tts")?.json(&body))
            .await?;
        Ok(hosted.url)
    }

    pub async fn request_book(&self, suggestion: &BookSuggestion) -> Result<BookRequest, ClientError> {
        #[derive(Deserialize)]
        struct Submitted {
            request: BookRequest,
        }
        let body = json!({
            "bookName": suggestion.book_name,
            "author": suggestion.author,
            "edition": suggestion.edition,
            "additionalNotes": suggestion.additional_notes,
            "email": suggestion.email,
        });
        let submitted: Submitted = self
            .send(self.request(Method::POST, "/api/book-requests")?.json(&body))
            .await?;
        Ok(submitted.request)
    }

    /// Follows an e-mail confirmation link; returns where the server redirects.
    pub async fn confirm_email(&self, code: &str) -> Result<String, ClientError> {
        let response = self
            .request(Method::GET, "/auth/callback")?
            .query(&[("code", code)])
            .send()
            .await?;
        if !response.status().is_redirection() {
            return Err(ClientError::Unexpected(format!(
                "callback answered {}",
                response.status()
            )));
        }
        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned)
            .ok_or_else(|| ClientError::Unexpected("redirect without location".to_owned()))
    }

    /// Downloads generated audio from an absolute or site-relative URL.
    pub async fn fetch_audio(&self, audio_url: &str) -> Result<Vec<u8>, ClientError> {
        let url = self.base.join(audio_url)?;
        let response = self.http.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_paths_join_onto_the_base() {
        let client = AurisClient::new("http://localhost:3000/").unwrap();
        let request = client
            .request(Method::GET, "/api/books")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.url().as_str(), "http://localhost:3000/api/books");
        assert!(request.headers().get("authorization").is_none());
    }

    #[test]
    fn tokens_are_sent_as_bearer() {
        let mut client = AurisClient::new("http://localhost:3000").unwrap();
        client.set_access_token(Some("abc".to_owned()));
        let request = client
            .request(Method::DELETE, "/api/audiomarks")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(request.headers()["authorization"], "Bearer abc");
    }

    #[test]
    fn api_errors_expose_status_and_code() {
        let error = ClientError::Api {
            status: StatusCode::NOT_FOUND,
            error: "Account not found".to_owned(),
            details: Some("Please register first".to_owned()),
            code: Some("PROFILE_NOT_FOUND".to_owned()),
        };
        assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(error.code(), Some("PROFILE_NOT_FOUND"));
        assert_eq!(error.to_string(), "404 Not Found: Account not found");
    }
}
