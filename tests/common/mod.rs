#![allow(dead_code)]

use async_trait::async_trait;
use auris::{
    backend::memory::{MemoryFactory, MemoryStore},
    config::Config,
    context::AppContext,
    create_app,
    models::{book::NewBook, user::NewProfile, user::Tier},
    utils::synth::SpeechSynthesizer,
};
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::{path::Path, sync::Arc};
use tempfile::TempDir;
use tower::ServiceExt;

pub const PASSWORD: &str = "correct horse";
pub const FAKE_AUDIO: &[u8] = b"ID3\x04\x00fake mp3 frames";

/// Writes fixed bytes instead of calling a speech engine.
pub struct FakeSynthesizer;

#[async_trait]
impl SpeechSynthesizer for FakeSynthesizer {
    fn extension(&self) -> &'static str {
        "mp3"
    }

    async fn synthesize(&self, _text: &str, output: &Path) -> anyhow::Result<()> {
        tokio::fs::write(output, FAKE_AUDIO).await?;
        Ok(())
    }
}

/// Synthesizer that reports success without producing a file.
pub struct SilentSynthesizer;

#[async_trait]
impl SpeechSynthesizer for SilentSynthesizer {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(&self, _text: &str, output: &Path) -> anyhow::Result<()> {
        tokio::fs::write(output, b"").await?;
        Ok(())
    }
}

/// Synthesizer that writes part of a file and then fails.
pub struct BrokenSynthesizer;

#[async_trait]
impl SpeechSynthesizer for BrokenSynthesizer {
    fn extension(&self) -> &'static str {
        "wav"
    }

    async fn synthesize(&self, _text: &str, output: &Path) -> anyhow::Result<()> {
        tokio::fs::write(output, b"RIFF").await?;
        anyhow::bail!("espeak exited with exit status: 1")
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<Mutex<MemoryStore>>,
    pub ctx: Arc<AppContext>,
    pub generated: TempDir,
}

pub fn spawn() -> TestApp {
    spawn_with(Arc::new(FakeSynthesizer))
}

pub fn spawn_with(synthesizer: Arc<dyn SpeechSynthesizer>) -> TestApp {
    let generated = tempfile::tempdir().unwrap();
    let config = Config::memory(generated.path());
    let factory = MemoryFactory::new(b"test-secret", &config.public_base_url);
    let store = factory.store();
    let ctx = Arc::new(AppContext::new(config, Arc::new(factory), synthesizer));
    TestApp {
        router: create_app(Arc::clone(&ctx)),
        store,
        ctx,
        generated,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(request(Method::GET, uri, None, None)).await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(request(Method::POST, uri, Some(body), None)).await
    }

    pub fn seed_books(&self, genre: &str, count: usize) {
        let mut store = self.store.lock();
        for i in 0..count {
            store.seed_book(NewBook {
                title: format!("{genre} {i}"),
                author: format!("Author {i}"),
                genre: Some(genre.to_owned()),
                book_content: Some("Once upon a time there was a reader".to_owned()),
                ..NewBook::default()
            });
        }
    }

    pub fn seed_book(&self, id: &str, title: &str) {
        self.store.lock().seed_book_with_id(
            id,
            NewBook {
                title: title.to_owned(),
                author: "Frank Herbert".to_owned(),
                genre: Some("Science Fiction".to_owned()),
                book_content: Some("A beginning is the time for taking the most delicate care".to_owned()),
                ..NewBook::default()
            },
        );
    }

    /// Registers `email`, then logs in; returns the user id and access token.
    pub async fn sign_up(&self, email: &str) -> (String, String) {
        let (status, body) = self
            .post(
                "/api/auth",
                json!({
                    "action": "register",
                    "email": email,
                    "password": PASSWORD,
                    "name": "Reader",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let (status, body) = self
            .post(
                "/api/auth",
                json!({ "action": "login", "email": email, "password": PASSWORD }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        (
            body["user"]["id"].as_str().unwrap().to_owned(),
            body["access_token"].as_str().unwrap().to_owned(),
        )
    }

    pub fn seed_profile(&self, id: &str, email: &str) {
        self.store.lock().seed_profile(NewProfile {
            id: id.to_owned(),
            email: email.to_owned(),
            name: "Reader".to_owned(),
            tier: Tier::Free,
        });
    }
}

pub fn request(
    method: Method,
    uri: &str,
    body: Option<Value>,
    token: Option<&str>,
) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}
