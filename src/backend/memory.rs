//! In-process stand-in for the managed service.
//!
//! Mirrors the observable rules of the hosted project closely enough for
//! local runs and for the test suite: unique e-mails, JWT sessions, the
//! row-not-found code on single-row reads, profile inserts restricted to the
//! service credential, and audiomark writes scoped to the bearer's subject.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use microservice_utils::jwt::auth::{create_token, decode_token, Claims};
use parking_lot::Mutex;
use serde_json::json;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use uuid::Uuid;

use super::{Backend, BackendError, ClientFactory, ClientMode};
use crate::models::{
    audiomark::{Audiomark, AudiomarkFilter, NewAudiomark},
    book::{Book, BookPage, BookQuery, BookSummary, NewBook},
    book_request::{BookRequest, NewBookRequest},
    cloned_voice::{ClonedVoice, NewClonedVoice},
    user::{AuthUser, NewProfile, Profile, Session, SignUp, Tier},
};

const RLS_VIOLATION: &str = "42501";

#[derive(Debug, Clone)]
struct Identity {
    id: String,
    email: String,
    password: String,
    metadata: serde_json::Value,
    confirmed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl Identity {
    fn to_user(&self) -> AuthUser {
        AuthUser {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            email_confirmed_at: self.confirmed_at,
            created_at: Some(self.created_at),
            user_metadata: self.metadata.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    identities: Vec<Identity>,
    sessions: HashSet<String>,
    auth_codes: HashMap<String, String>,
    profiles: Vec<Profile>,
    books: Vec<Book>,
    audiomarks: Vec<Audiomark>,
    cloned_voices: Vec<ClonedVoice>,
    book_requests: Vec<BookRequest>,
    objects: HashMap<String, StoredObject>,
    reject_profile_inserts: bool,
    require_email_confirmation: bool,
}

impl MemoryStore {
    pub fn seed_book(&mut self, book: NewBook) -> Book {
        let row = book_row(Uuid::new_v4().to_string(), book);
        self.books.push(row.clone());
        row
    }

    /// Inserts a book under a caller-chosen id.
    pub fn seed_book_with_id(&mut self, id: &str, book: NewBook) -> Book {
        let row = book_row(id.to_owned(), book);
        self.books.push(row.clone());
        row
    }

    pub fn seed_profile(&mut self, profile: NewProfile) -> Profile {
        let row = Profile {
            id: profile.id,
            email: profile.email,
            name: profile.name,
            tier: profile.tier,
            created_at: Some(Utc::now()),
        };
        self.profiles.push(row.clone());
        row
    }

    /// Makes every subsequent profile insert fail.
    pub fn reject_profile_inserts(&mut self, reject: bool) {
        self.reject_profile_inserts = reject;
    }

    /// New identities must confirm their e-mail before signing in.
    pub fn require_email_confirmation(&mut self, require: bool) {
        self.require_email_confirmation = require;
    }

    /// Marks an identity confirmed, as following the e-mail link would.
    pub fn confirm_email(&mut self, email: &str) -> bool {
        match self.identities.iter_mut().find(|i| i.email == email) {
            Some(identity) => {
                identity.confirmed_at = Some(Utc::now());
                true
            }
            None => false,
        }
    }

    /// The confirmation code issued for an e-mail address, if any.
    pub fn pending_auth_code(&self, email: &str) -> Option<String> {
        let identity = self.identities.iter().find(|i| i.email == email)?;
        self.auth_codes
            .iter()
            .find(|(_, user_id)| **user_id == identity.id)
            .map(|(code, _)| code.clone())
    }

    pub fn identity_count(&self) -> usize {
        self.identities.len()
    }

    pub fn profile(&self, user_id: &str) -> Option<&Profile> {
        self.profiles.iter().find(|p| p.id == user_id)
    }

    pub fn profile_count(&self) -> usize {
        self.profiles.len()
    }

    pub fn book_requests(&self) -> &[BookRequest] {
        &self.book_requests
    }

    pub fn object(&self, bucket: &str, name: &str) -> Option<&StoredObject> {
        self.objects.get(&format!("{bucket}/{name}"))
    }

    pub fn seed_demo_catalog(&mut self) {
        let demo = [
            ("Pride and Prejudice", "Jane Austen", "Fiction", "It is a truth universally acknowledged, that a single man in possession of a good fortune, must be in want of a wife."),
            ("The Time Machine", "H. G. Wells", "Science Fiction", "The Time Traveller, for so it will be convenient to speak of him, was expounding a recondite matter to us."),
            ("The Hound of the Baskervilles", "Arthur Conan Doyle", "Mystery", "Mr. Sherlock Holmes, who was usually very late in the mornings, was seated at the breakfast table."),
            ("Meditations", "Marcus Aurelius", "Self-Help", "Begin the morning by saying to thyself, I shall meet with the busy-body, the ungrateful, arrogant, deceitful, envious, unsocial."),
        ];
        for (title, author, genre, content) in demo {
            self.seed_book(NewBook {
                title: title.to_owned(),
                author: author.to_owned(),
                description: Some(format!("{title} by {author}")),
                genre: Some(genre.to_owned()),
                rating: Some(4.5),
                book_content: Some(content.to_owned()),
                ..NewBook::default()
            });
        }
    }
}

fn book_row(id: String, book: NewBook) -> Book {
    Book {
        id,
        title: book.title,
        author: book.author,
        description: book.description,
        cover_url: book.cover_url,
        audio_url: book.audio_url,
        duration: book.duration,
        rating: book.rating,
        genre: book.genre,
        book_content: book.book_content,
        user_id: book.user_id,
        created_at: Some(Utc::now()),
    }
}

/// Newest first; rows created within the same instant keep reverse insertion order.
fn newest_first<T>(rows: &mut [(usize, T)], created_at: impl Fn(&T) -> DateTime<Utc>) {
    rows.sort_by(|(ia, a), (ib, b)| created_at(b).cmp(&created_at(a)).then(ib.cmp(ia)));
}

#[derive(Clone)]
pub struct MemoryFactory {
    store: Arc<Mutex<MemoryStore>>,
    secret: Arc<[u8]>,
    public_base: String,
}

impl MemoryFactory {
    pub fn new(secret: &[u8], public_base: &str) -> Self {
        Self {
            store: Arc::new(Mutex::new(MemoryStore::default())),
            secret: Arc::from(secret),
            public_base: public_base.trim_end_matches('/').to_owned(),
        }
    }

    pub fn store(&self) -> Arc<Mutex<MemoryStore>> {
        Arc::clone(&self.store)
    }
}

impl ClientFactory for MemoryFactory {
    fn connect(&self, mode: ClientMode) -> Result<Arc<dyn Backend>, BackendError> {
        Ok(Arc::new(MemoryClient {
            store: Arc::clone(&self.store),
            secret: Arc::clone(&self.secret),
            public_base: self.public_base.clone(),
            mode,
            persisted: Mutex::new(None),
        }))
    }
}

pub struct MemoryClient {
    store: Arc<Mutex<MemoryStore>>,
    secret: Arc<[u8]>,
    public_base: String,
    mode: ClientMode,
    persisted: Mutex<Option<Session>>,
}

impl MemoryClient {
    fn token(&self) -> Option<String> {
        self.persisted
            .lock()
            .as_ref()
            .map(|s| s.access_token.clone())
            .or_else(|| self.mode.bearer_token().map(ToOwned::to_owned))
    }

    fn claims(&self) -> Result<Option<Claims>, BackendError> {
        let Some(token) = self.token() else {
            return Ok(None);
        };
        let claims = decode_token(&token, &self.secret)
            .map_err(|e| BackendError::Unauthorized(e.to_string()))?;
        if !self.store.lock().sessions.contains(&claims.session_id) {
            return Err(BackendError::Unauthorized("Session not found".to_owned()));
        }
        Ok(Some(claims))
    }

    /// Subject allowed to write owner-scoped rows; `None` means unrestricted.
    fn writer(&self) -> Result<Option<String>, BackendError> {
        if self.mode == ClientMode::Service {
            return Ok(None);
        }
        match self.claims()? {
            Some(claims) => Ok(Some(claims.sub)),
            None => Err(BackendError::Unauthorized("JWT required".to_owned())),
        }
    }

    fn open_session(&self, identity: &Identity) -> Result<Session, BackendError> {
        let session_id = Uuid::new_v4().to_string();
        let token = create_token(&identity.id, &identity.email, &session_id, &self.secret)
            .map_err(|e| BackendError::Configuration(e.to_string()))?;
        self.store.lock().sessions.insert(session_id);
        let session = Session {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_in: Some(token.expires_in),
            user: identity.to_user(),
        };
        if self.mode == ClientMode::Browser {
            *self.persisted.lock() = Some(session.clone());
        }
        Ok(session)
    }
}

fn rls_violation(table: &str) -> BackendError {
    BackendError::api(
        403,
        RLS_VIOLATION,
        format!("new row violates row-level security policy for table \"{table}\""),
    )
}

#[async_trait]
impl Backend for MemoryClient {
    async fn sign_up(&self, request: &SignUp) -> Result<AuthUser, BackendError> {
        let mut store = self.store.lock();
        if store.identities.iter().any(|i| i.email == request.email) {
            return Err(BackendError::api(
                422,
                "user_already_exists",
                "User already registered",
            ));
        }
        if request.password.len() < 6 {
            return Err(BackendError::api(
                422,
                "weak_password",
                "Password should be at least 6 characters.",
            ));
        }
        let now = Utc::now();
        let identity = Identity {
            id: Uuid::new_v4().to_string(),
            email: request.email.clone(),
            password: request.password.clone(),
            metadata: json!({ "name": request.name, "tier": request.tier }),
            confirmed_at: (!store.require_email_confirmation).then_some(now),
            created_at: now,
        };
        store
            .auth_codes
            .insert(Uuid::new_v4().to_string(), identity.id.clone());
        let user = identity.to_user();
        store.identities.push(identity);
        Ok(user)
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Session, BackendError> {
        let identity = {
            let store = self.store.lock();
            store
                .identities
                .iter()
                .find(|i| i.email == email && i.password == password)
                .cloned()
        };
        let identity = identity.ok_or_else(|| {
            BackendError::api(400, "invalid_credentials", "Invalid login credentials")
        })?;
        if identity.confirmed_at.is_none() {
            return Err(BackendError::api(
                400,
                "email_not_confirmed",
                "Email not confirmed",
            ));
        }
        self.open_session(&identity)
    }

    async fn sign_out(&self) -> Result<(), BackendError> {
        let Some(token) = self.token() else {
            return Ok(());
        };
        let claims = decode_token(&token, &self.secret)
            .map_err(|e| BackendError::Unauthorized(e.to_string()))?;
        self.store.lock().sessions.remove(&claims.session_id);
        *self.persisted.lock() = None;
        Ok(())
    }

    async fn current_user(&self) -> Result<AuthUser, BackendError> {
        let claims = self
            .claims()?
            .ok_or_else(|| BackendError::Unauthorized("No session".to_owned()))?;
        let store = self.store.lock();
        store
            .identities
            .iter()
            .find(|i| i.id == claims.sub)
            .map(Identity::to_user)
            .ok_or_else(|| BackendError::Unauthorized("User not found".to_owned()))
    }

    async fn exchange_code_for_session(
        &self,
        code: &str,
        _code_verifier: Option<&str>,
    ) -> Result<Session, BackendError> {
        let identity = {
            let mut store = self.store.lock();
            let user_id = store.auth_codes.remove(code);
            let identity = user_id
                .and_then(|id| store.identities.iter_mut().find(|i| i.id == id))
                .map(|identity| {
                    identity.confirmed_at.get_or_insert_with(Utc::now);
                    identity.clone()
                });
            identity
        };
        let identity = identity
            .ok_or_else(|| BackendError::api(400, "invalid_grant", "invalid flow state"))?;
        self.open_session(&identity)
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), BackendError> {
        if self.mode != ClientMode::Service {
            return Err(BackendError::Configuration(
                "deleting users requires the service credential".to_owned(),
            ));
        }
        let mut store = self.store.lock();
        let before = store.identities.len();
        store.identities.retain(|i| i.id != user_id);
        store.auth_codes.retain(|_, id| id != user_id);
        if store.identities.len() == before {
            return Err(BackendError::api(404, "user_not_found", "User not found"));
        }
        Ok(())
    }

    async fn list_books(&self, query: &BookQuery) -> Result<BookPage, BackendError> {
        let store = self.store.lock();
        let mut rows: Vec<(usize, &Book)> = store
            .books
            .iter()
            .enumerate()
            .filter(|(_, book)| query.matches(book))
            .collect();
        newest_first(&mut rows, |book| book.created_at.unwrap_or_default());
        let total = rows.len() as u64;
        let books = rows
            .into_iter()
            .skip(usize::try_from(query.offset()).unwrap_or(usize::MAX))
            .take(query.limit as usize)
            .map(|(_, book)| book.clone())
            .collect();
        Ok(BookPage { books, total })
    }

    async fn insert_book(&self, book: &NewBook) -> Result<Book, BackendError> {
        Ok(self.store.lock().seed_book(book.clone()))
    }

    async fn insert_profile(&self, profile: &NewProfile) -> Result<Profile, BackendError> {
        if self.mode != ClientMode::Service {
            return Err(rls_violation("users"));
        }
        let mut store = self.store.lock();
        if store.reject_profile_inserts {
            return Err(BackendError::Api {
                status: 500,
                code: Some("23514".to_owned()),
                message: "new row for relation \"users\" violates check constraint".to_owned(),
                details: None,
                hint: Some("profile inserts are disabled".to_owned()),
            });
        }
        if store.profiles.iter().any(|p| p.id == profile.id) {
            return Err(BackendError::api(
                409,
                "23505",
                "duplicate key value violates unique constraint \"users_pkey\"",
            ));
        }
        Ok(store.seed_profile(profile.clone()))
    }

    async fn fetch_profile(&self, user_id: &str) -> Result<Profile, BackendError> {
        self.store
            .lock()
            .profile(user_id)
            .cloned()
            .ok_or_else(BackendError::row_not_found)
    }

    async fn set_tier(&self, user_id: &str, tier: Tier) -> Result<Vec<Profile>, BackendError> {
        let mut store = self.store.lock();
        Ok(store
            .profiles
            .iter_mut()
            .filter(|p| p.id == user_id)
            .map(|p| {
                p.tier = tier;
                p.clone()
            })
            .collect())
    }

    async fn list_audiomarks(
        &self,
        filter: &AudiomarkFilter,
    ) -> Result<Vec<Audiomark>, BackendError> {
        let store = self.store.lock();
        let mut rows: Vec<(usize, &Audiomark)> = store
            .audiomarks
            .iter()
            .enumerate()
            .filter(|(_, mark)| mark.user_id == filter.user_id)
            .filter(|(_, mark)| filter.book_id.as_ref().map_or(true, |b| &mark.book_id == b))
            .collect();
        newest_first(&mut rows, |mark| mark.created_at);
        Ok(rows
            .into_iter()
            .map(|(_, mark)| {
                let mut mark = mark.clone();
                mark.books = store
                    .books
                    .iter()
                    .find(|b| b.id == mark.book_id)
                    .map(BookSummary::from);
                mark
            })
            .collect())
    }

    async fn insert_audiomark(
        &self,
        audiomark: &NewAudiomark,
    ) -> Result<Audiomark, BackendError> {
        if let Some(subject) = self.writer()? {
            if subject != audiomark.user_id {
                return Err(rls_violation("audiomarks"));
            }
        }
        let mut store = self.store.lock();
        if !store.books.iter().any(|b| b.id == audiomark.book_id) {
            return Err(BackendError::api(
                409,
                "23503",
                "insert or update on table \"audiomarks\" violates foreign key constraint \"audiomarks_book_id_fkey\"",
            ));
        }
        if store.profile(&audiomark.user_id).is_none() {
            return Err(BackendError::api(
                409,
                "23503",
                "insert or update on table \"audiomarks\" violates foreign key constraint \"audiomarks_user_id_fkey\"",
            ));
        }
        let row = Audiomark {
            id: Uuid::new_v4().to_string(),
            user_id: audiomark.user_id.clone(),
            book_id: audiomark.book_id.clone(),
            timestamp: audiomark.timestamp,
            note: audiomark.note.clone(),
            created_at: Utc::now(),
            books: None,
        };
        store.audiomarks.push(row.clone());
        Ok(row)
    }

    async fn delete_audiomark(&self, id: &str) -> Result<(), BackendError> {
        let subject = self.writer()?;
        self.store.lock().audiomarks.retain(|mark| {
            mark.id != id || subject.as_ref().map_or(false, |s| s != &mark.user_id)
        });
        Ok(())
    }

    async fn update_audiomark_note(
        &self,
        id: &str,
        note: &str,
    ) -> Result<Option<Audiomark>, BackendError> {
        let subject = self.writer()?;
        let mut store = self.store.lock();
        Ok(store
            .audiomarks
            .iter_mut()
            .find(|mark| mark.id == id && subject.as_ref().map_or(true, |s| s == &mark.user_id))
            .map(|mark| {
                mark.note = note.to_owned();
                mark.clone()
            }))
    }

    async fn insert_cloned_voice(
        &self,
        voice: &NewClonedVoice,
    ) -> Result<ClonedVoice, BackendError> {
        let row = ClonedVoice {
            id: Uuid::new_v4().to_string(),
            user_id: voice.user_id.clone(),
            model: voice.model.clone(),
            voice_url: voice.voice_url.clone(),
            created_at: Utc::now(),
        };
        self.store.lock().cloned_voices.push(row.clone());
        Ok(row)
    }

    async fn latest_cloned_voice(
        &self,
        user_id: &str,
    ) -> Result<Option<ClonedVoice>, BackendError> {
        let store = self.store.lock();
        let mut rows: Vec<(usize, &ClonedVoice)> = store
            .cloned_voices
            .iter()
            .enumerate()
            .filter(|(_, voice)| voice.user_id == user_id)
            .collect();
        newest_first(&mut rows, |voice| voice.created_at);
        Ok(rows.first().map(|(_, voice)| (*voice).clone()))
    }

    async fn insert_book_request(
        &self,
        request: &NewBookRequest,
    ) -> Result<BookRequest, BackendError> {
        let row = BookRequest {
            id: Some(Uuid::new_v4().to_string()),
            book_name: request.book_name.clone(),
            author: request.author.clone(),
            edition: request.edition.clone(),
            additional_notes: request.additional_notes.clone(),
            status: request.status.clone(),
            user_email: request.user_email.clone(),
            user_id: request.user_id.clone(),
            created_at: Some(Utc::now()),
        };
        self.store.lock().book_requests.push(row.clone());
        Ok(row)
    }

    async fn upload_object(
        &self,
        bucket: &str,
        name: &str,
        content_type: &str,
        bytes: Vec<u8>,
    ) -> Result<(), BackendError> {
        let mut store = self.store.lock();
        let key = format!("{bucket}/{name}");
        if store.objects.contains_key(&key) {
            return Err(BackendError::api(409, "Duplicate", "The resource already exists"));
        }
        store.objects.insert(
            key,
            StoredObject {
                content_type: content_type.to_owned(),
                bytes,
            },
        );
        Ok(())
    }

    fn public_url(&self, bucket: &str, name: &str) -> String {
        format!("{}/storage/v1/object/public/{bucket}/{name}", self.public_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn factory() -> MemoryFactory {
        MemoryFactory::new(b"memory-test-secret", "http://localhost:3000")
    }

    fn sign_up_request(email: &str) -> SignUp {
        SignUp {
            email: email.to_owned(),
            password: "secret123".to_owned(),
            name: "Reader".to_owned(),
            tier: Tier::Free,
            redirect_to: "http://localhost:3000/auth/callback".to_owned(),
        }
    }

    #[tokio::test]
    async fn duplicate_emails_are_rejected() {
        let client = factory().connect(ClientMode::anonymous()).unwrap();
        client.sign_up(&sign_up_request("a@example.com")).await.unwrap();
        let err = client
            .sign_up(&sign_up_request("a@example.com"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "User already registered");
    }

    #[tokio::test]
    async fn profiles_need_the_service_mode() {
        let factory = factory();
        let profile = NewProfile {
            id: "u1".to_owned(),
            email: "a@example.com".to_owned(),
            name: "A".to_owned(),
            tier: Tier::Free,
        };
        let anon = factory.connect(ClientMode::anonymous()).unwrap();
        let err = anon.insert_profile(&profile).await.unwrap_err();
        assert_eq!(err.code(), Some(RLS_VIOLATION));
        let service = factory.connect(ClientMode::Service).unwrap();
        service.insert_profile(&profile).await.unwrap();
        assert!(anon.fetch_profile("u1").await.is_ok());
        assert!(anon.fetch_profile("u2").await.unwrap_err().is_row_not_found());
    }

    #[tokio::test]
    async fn browser_handles_persist_their_session() {
        let factory = factory();
        let browser = factory.connect(ClientMode::Browser).unwrap();
        let user = browser
            .sign_up(&sign_up_request("b@example.com"))
            .await
            .unwrap();
        browser
            .sign_in_with_password("b@example.com", "secret123")
            .await
            .unwrap();
        assert_eq!(browser.current_user().await.unwrap().id, user.id);
        browser.sign_out().await.unwrap();
        assert!(matches!(
            browser.current_user().await,
            Err(BackendError::Unauthorized(_))
        ));
    }

    #[tokio::test]
    async fn signed_out_tokens_stop_working() {
        let factory = factory();
        let anon = factory.connect(ClientMode::anonymous()).unwrap();
        anon.sign_up(&sign_up_request("c@example.com")).await.unwrap();
        let session = anon
            .sign_in_with_password("c@example.com", "secret123")
            .await
            .unwrap();
        let server = factory
            .connect(ClientMode::bearer(&session.access_token))
            .unwrap();
        assert!(server.current_user().await.is_ok());
        server.sign_out().await.unwrap();
        assert!(server.current_user().await.is_err());
    }

    #[tokio::test]
    async fn unconfirmed_identities_cannot_sign_in_until_the_code_is_exchanged() {
        let factory = factory();
        factory.store().lock().require_email_confirmation(true);
        let anon = factory.connect(ClientMode::anonymous()).unwrap();
        anon.sign_up(&sign_up_request("d@example.com")).await.unwrap();
        let err = anon
            .sign_in_with_password("d@example.com", "secret123")
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("email_not_confirmed"));

        let code = factory
            .store()
            .lock()
            .pending_auth_code("d@example.com")
            .unwrap();
        anon.exchange_code_for_session(&code, None).await.unwrap();
        assert!(anon
            .sign_in_with_password("d@example.com", "secret123")
            .await
            .is_ok());
        assert!(anon.exchange_code_for_session(&code, None).await.is_err());
    }

    #[tokio::test]
    async fn latest_clone_wins() {
        let client = factory().connect(ClientMode::anonymous()).unwrap();
        for model in ["XTTS", "Bark"] {
            client
                .insert_cloned_voice(&NewClonedVoice {
                    user_id: "u1".to_owned(),
                    model: model.to_owned(),
                    voice_url: format!("http://x/{model}.wav"),
                })
                .await
                .unwrap();
        }
        let latest = client.latest_cloned_voice("u1").await.unwrap().unwrap();
        assert_eq!(latest.model, "Bark");
        assert!(client.latest_cloned_voice("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn uploads_do_not_overwrite() {
        let factory = factory();
        let client = factory.connect(ClientMode::anonymous()).unwrap();
        client
            .upload_object("voice-samples", "a.wav", "audio/wav", vec![1, 2, 3])
            .await
            .unwrap();
        assert!(client
            .upload_object("voice-samples", "a.wav", "audio/wav", vec![4])
            .await
            .is_err());
        let store = factory.store();
        let store = store.lock();
        assert_eq!(store.object("voice-samples", "a.wav").unwrap().bytes, [1, 2, 3]);
    }
}
