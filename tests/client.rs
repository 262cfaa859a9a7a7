mod common;

use auris::{
    client::{AurisClient, BookSuggestion},
    models::book::BookQuery,
    ui::{
        app::{Action, AppState, SignedInUser},
        audiomarks::AudiomarksView,
        catalog::CatalogState,
        player::PlaybackState,
    },
};
use axum::http::StatusCode;
use std::net::TcpListener;

async fn serve(app: &common::TestApp) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let server = axum::Server::from_tcp(listener)
        .unwrap()
        .serve(app.router.clone().into_make_service());
    tokio::spawn(server);
    format!("http://{addr}")
}

#[tokio::test]
async fn a_listening_session_end_to_end() {
    let app = common::spawn();
    app.seed_books("Fiction", 12);
    app.seed_book("dune", "Dune");
    let base = serve(&app).await;
    let mut client = AurisClient::new(&base).unwrap();

    let registration = client
        .register("reader@example.com", common::PASSWORD, "Reader", None)
        .await
        .unwrap();
    let login = client
        .login("reader@example.com", common::PASSWORD)
        .await
        .unwrap();
    assert_eq!(login.user.id, registration.user.id);
    assert!(client.access_token().is_some());

    let mut state = AppState::default();
    state.dispatch(Action::SignedIn(SignedInUser {
        id: login.user.id.clone(),
        email: login.profile.email.clone(),
        name: login.profile.name.clone(),
        tier: login.profile.tier,
        access_token: login.access_token.clone(),
    }));

    // Browse the catalog page by page.
    let mut catalog = CatalogState::default();
    let query = catalog.toggle_genre("Fiction");
    let page = client.list_books(&query).await.unwrap();
    assert!(page.has_more);
    catalog.apply(&query, page.books, page.has_more);
    let query = catalog.load_more().unwrap();
    let page = client.list_books(&query).await.unwrap();
    catalog.apply(&query, page.books, page.has_more);
    assert_eq!(catalog.books().len(), 12);
    assert!(!catalog.has_more());

    // Open a book, synthesize it and save a mark while paused.
    let dune = client
        .list_books(&BookQuery {
            search: Some("dune".to_owned()),
            ..BookQuery::default()
        })
        .await
        .unwrap()
        .books
        .remove(0);
    state.dispatch(Action::SelectBook(dune));
    let player = state.player_mut().unwrap();
    let text = player.begin_tts().unwrap();
    let audio_url = client.generate_voice(&text).await.unwrap();
    player.tts_finished(Ok(audio_url.clone())).unwrap();
    assert_eq!(player.state(), PlaybackState::Ready);
    // Generated URLs carry the configured public base, not the test listener.
    let served = audio_url.trim_start_matches("http://localhost:3000");
    assert_eq!(client.fetch_audio(served).await.unwrap(), common::FAKE_AUDIO);

    player.loaded_metadata(30.0);
    player.toggle_play().unwrap();
    player.time_update(2.5);
    player.toggle_play().unwrap();
    let draft = player.audiomark_draft().unwrap();
    assert_eq!(draft.note, "for taking the most delicate care");
    let mark = client.create_audiomark(&draft).await.unwrap();
    assert_eq!(mark.timestamp, 2.5);

    // Edit and remove it from the audiomarks page.
    let mut view = AudiomarksView::default();
    view.load(client.list_audiomarks(&login.user.id, None).await.unwrap());
    assert!(view.begin_edit(&mark.id));
    view.edit_note("delicate care");
    let (id, note) = view.commit_edit().unwrap();
    view.apply_update(client.update_audiomark(&id, &note).await.unwrap());
    assert_eq!(view.all()[0].note, "delicate care");
    client.delete_audiomark(&id).await.unwrap();
    view.remove(&id);
    assert!(client
        .list_audiomarks(&login.user.id, Some("dune"))
        .await
        .unwrap()
        .is_empty());

    // Clone a voice and upgrade.
    let outcome = client
        .clone_voice(&login.user.id, "XTTS", "sample.wav", b"RIFF".to_vec())
        .await
        .unwrap();
    let voice = client.latest_voice(&login.user.id).await.unwrap().unwrap();
    assert_eq!(voice.id, outcome.voice_id);
    state.dispatch(Action::ClonedVoiceGenerated);
    let profile = client.upgrade(&login.user.id).await.unwrap();
    assert_eq!(profile.tier.as_str(), "premium");
    state.dispatch(Action::Upgraded);
    assert_eq!(state.player().unwrap().available_models()[0], "Bark");

    let request = client
        .request_book(&BookSuggestion {
            book_name: "Ulysses".to_owned(),
            author: "James Joyce".to_owned(),
            ..BookSuggestion::default()
        })
        .await
        .unwrap();
    assert_eq!(request.user_email, "reader@example.com");

    let url = client.hosted_tts("hello", None, false).await.unwrap();
    assert!(url.contains("client=tw-ob"));

    client.logout().await.unwrap();
    state.dispatch(Action::SignedOut);
    assert!(state.user().is_none());
}

#[tokio::test]
async fn failures_carry_the_envelope() {
    let app = common::spawn();
    let base = serve(&app).await;
    let mut client = AurisClient::new(&base).unwrap();

    let error = client
        .login("ghost@example.com", common::PASSWORD)
        .await
        .unwrap_err();
    assert_eq!(error.status(), Some(StatusCode::UNAUTHORIZED));

    let error = client.upgrade("ghost").await.unwrap_err();
    assert_eq!(error.status(), Some(StatusCode::NOT_FOUND));
    assert!(client.logout().await.is_err());
}

#[tokio::test]
async fn confirmation_redirects_are_reported() {
    let app = common::spawn();
    app.store.lock().require_email_confirmation(true);
    let base = serve(&app).await;
    let client = AurisClient::new(&base).unwrap();
    client
        .register("new@example.com", common::PASSWORD, "New", None)
        .await
        .unwrap();
    let code = app.store.lock().pending_auth_code("new@example.com").unwrap();

    assert_eq!(
        client.confirm_email(&code).await.unwrap(),
        "http://localhost:3000/"
    );
    assert_eq!(
        client.confirm_email("bogus").await.unwrap(),
        "http://localhost:3000/login"
    );
}
