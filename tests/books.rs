mod common;

use axum::http::StatusCode;
use serde_json::json;

#[tokio::test]
async fn genre_pages_report_has_more() {
    let app = common::spawn();
    app.seed_books("Fiction", 20);
    app.seed_books("Mystery", 4);

    let (status, body) = app.get("/api/books?genre=Fiction&page=1&limit=9").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["books"].as_array().unwrap().len(), 9);
    assert_eq!(body["total"], 20);
    assert_eq!(body["hasMore"], true);

    let (_, body) = app.get("/api/books?genre=Fiction&page=3&limit=9").await;
    let books = body["books"].as_array().unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(body["page"], 3);
    assert_eq!(body["hasMore"], false);
    assert!(books.iter().all(|b| b["genre"] == "Fiction"));
}

#[tokio::test]
async fn newest_books_come_first() {
    let app = common::spawn();
    app.seed_books("History", 3);

    let (_, body) = app.get("/api/books").await;
    let titles: Vec<_> = body["books"]
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["title"].as_str().unwrap().to_owned())
        .collect();
    assert_eq!(titles, ["History 2", "History 1", "History 0"]);
    assert_eq!(body["page"], 1);
    assert_eq!(body["limit"], 9);
}

#[tokio::test]
async fn search_ignores_case_and_blank_filters() {
    let app = common::spawn();
    app.seed_book("dune", "Dune");
    app.seed_books("Fiction", 2);

    let (_, body) = app.get("/api/books?search=DUNE&genre=").await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["books"][0]["id"], "dune");

    let (_, body) = app.get("/api/books?search=herbert").await;
    assert_eq!(body["total"], 1);
}

#[tokio::test]
async fn bad_paging_is_rejected() {
    let app = common::spawn();
    let (status, body) = app.get("/api/books?page=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Invalid page");

    let (status, _) = app.get("/api/books?limit=lots").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn books_can_be_added() {
    let app = common::spawn();
    let (status, body) = app
        .post(
            "/api/books",
            json!({ "title": "Emma", "author": "Jane Austen", "genre": "Fiction" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["book"]["title"], "Emma");

    let (_, body) = app.get("/api/books?genre=Fiction").await;
    assert_eq!(body["total"], 1);

    let (status, body) = app.post("/api/books", json!({ "title": "Untitled" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Title and author are required");
}
