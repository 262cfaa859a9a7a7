use axum::{
    extract::{DefaultBodyLimit, Extension},
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower::{limit::ConcurrencyLimitLayer, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::{DefaultMakeSpan, TraceLayer},
};

pub mod backend;
pub mod client;
pub mod config;
pub mod context;
pub mod handlers;
pub mod models;
pub mod ui;
pub mod utils;

use crate::context::AppContext;
use crate::handlers::{
    audiomarks_handler::{create_audiomark, delete_audiomark, list_audiomarks, update_audiomark},
    auth_handler::auth,
    book_request_handler::request_book,
    books_handler::{create_book, list_books},
    callback_handler::auth_callback,
    tts_handler::{generate_voice, hosted_tts},
    upgrade_handler::upgrade,
    voice_cloning_handler::{clone_voice, latest_voice, MAX_SAMPLE_BYTES},
};

use microservice_utils::server::error_404::error_404;

pub fn create_app(ctx: Arc<AppContext>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_credentials(false)
        .allow_headers(Any);

    // Limit concurrency for all routes, trace layer for all routes
    let middleware_stack = ServiceBuilder::new()
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(ConcurrencyLimitLayer::new(ctx.config.concurrency_limit))
        .layer(cors)
        .into_inner();

    let generated = ServeDir::new(&ctx.config.generated_dir);

    Router::new()
        .route("/api/books", get(list_books).post(create_book))
        .route(
            "/api/audiomarks",
            get(list_audiomarks)
                .post(create_audiomark)
                .delete(delete_audiomark)
                .patch(update_audiomark),
        )
        .route("/api/auth", post(auth))
        .route("/api/upgrade", post(upgrade))
        .route(
            "/api/voice-cloning",
            get(latest_voice)
                .post(clone_voice)
                .layer(DefaultBodyLimit::max(MAX_SAMPLE_BYTES)),
        )
        .route("/api/generate-voice", post(generate_voice))
        .route("/api/tts", post(hosted_tts))
        .route("/api/book-requests", post(request_book))
        .route("/auth/callback", get(auth_callback))
        .nest_service("/generated", generated)
        .fallback(error_404)
        .layer(Extension(ctx))
        .layer(middleware_stack)
}
