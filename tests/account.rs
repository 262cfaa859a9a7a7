mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

#[tokio::test]
async fn upgrade_sets_premium() {
    let app = common::spawn();
    let (user_id, _) = app.sign_up("a@example.com").await;

    let (status, body) = app.post("/api/upgrade", json!({ "userId": user_id })).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Account upgraded to premium successfully");
    assert_eq!(body["user"]["tier"], "premium");
    assert_eq!(app.store.lock().profile(&user_id).unwrap().tier.as_str(), "premium");
}

#[tokio::test]
async fn upgrade_of_unknown_user_is_not_found() {
    let app = common::spawn();
    let (status, body) = app.post("/api/upgrade", json!({ "userId": "ghost" })).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "User not found");

    let (status, body) = app.post("/api/upgrade", json!({})).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "User ID is required");
}

#[tokio::test]
async fn anonymous_book_requests_need_an_email() {
    let app = common::spawn();
    let (status, body) = app
        .post(
            "/api/book-requests",
            json!({ "bookName": "Middlemarch", "author": "George Eliot" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Email is required");

    let (status, body) = app
        .post(
            "/api/book-requests",
            json!({
                "bookName": "Middlemarch",
                "author": "George Eliot",
                "edition": "",
                "email": "reader@example.com",
            }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["request"]["status"], "pending");
    assert!(body["request"]["edition"].is_null());

    let store = app.store.lock();
    let requests = store.book_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].user_email, "reader@example.com");
    assert_eq!(requests[0].user_id, None);
}

#[tokio::test]
async fn signed_in_book_requests_use_the_session() {
    let app = common::spawn();
    let (user_id, token) = app.sign_up("a@example.com").await;

    let (status, body) = app
        .send(common::request(
            Method::POST,
            "/api/book-requests",
            Some(json!({ "bookName": "Ulysses", "author": "James Joyce" })),
            Some(&token),
        ))
        .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["request"]["user_email"], "a@example.com");
    assert_eq!(body["request"]["user_id"], user_id.as_str());
}

#[tokio::test]
async fn book_requests_need_name_and_author() {
    let app = common::spawn();
    let (status, body) = app
        .post("/api/book-requests", json!({ "bookName": "Ulysses" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Book name and author are required");
}

#[tokio::test]
async fn unknown_routes_are_json_404s() {
    let app = common::spawn();
    let (status, body) = app.get("/api/nope").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
}
