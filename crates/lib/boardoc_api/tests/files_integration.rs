//! Integration tests: board document listing, creation and conversion.

mod common;

use axum::http::StatusCode;
use common::{FakePlatform, TEMPLATES_URL, TestApp, get, json_body, post_json, spawn_docserver};
use serde_json::json;

const BOARD: &str = "board-1";

#[tokio::test]
async fn documents_are_listed_page_by_page() {
    let app = TestApp::builder()
        .platform(FakePlatform::default().documents(&["Plan.docx", "Budget.xlsx", "Deck.pptx"]))
        .build();
    app.grant().await;
    app.configure_board(BOARD).await;

    let resp = app
        .send(get(&format!("/api/files?bid={BOARD}"), Some(&app.session())))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let first = json_body(resp).await;
    let titles: Vec<_> = first["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["data"]["title"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(titles, ["Plan.docx", "Budget.xlsx"]);
    assert_eq!(first["data"][0]["type"], "document");
    assert_eq!(first["data"][0]["data"]["documentUrl"], "https://files.example/0");
    let cursor = first["cursor"].as_str().unwrap();

    let resp = app
        .send(get(
            &format!("/api/files?bid={BOARD}&cursor={cursor}"),
            Some(&app.session()),
        ))
        .await;
    let last = json_body(resp).await;
    assert_eq!(last["data"].as_array().unwrap().len(), 1);
    assert_eq!(last["data"][0]["data"]["title"], "Deck.pptx");
    assert!(last.get("cursor").is_none());
}

#[tokio::test]
async fn listing_without_board_id_is_bad_request() {
    let app = TestApp::builder().build();
    app.grant().await;
    let resp = app.send(get("/api/files", Some(&app.session()))).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn listing_without_grant_is_token_missing() {
    let app = TestApp::builder().build();
    app.configure_board(BOARD).await;
    let resp = app
        .send(get(&format!("/api/files?bid={BOARD}"), Some(&app.session())))
        .await;
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(resp).await["error"], "token_missing");
}

#[tokio::test]
async fn listing_unconfigured_board_is_a_conflict() {
    let app = TestApp::builder().build();
    app.grant().await;
    let resp = app
        .send(get(&format!("/api/files?bid={BOARD}"), Some(&app.session())))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
    assert_eq!(json_body(resp).await["error"], "settings_not_configured");
}

#[tokio::test]
async fn unreadable_settings_are_bad_request() {
    let app = TestApp::builder().broken_settings().build();
    app.grant().await;
    let resp = app
        .send(get(&format!("/api/files?bid={BOARD}"), Some(&app.session())))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(!json_body(resp).await["message"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn blank_document_is_created_from_template() {
    let app = TestApp::builder().build();
    app.grant().await;
    app.configure_board(BOARD).await;

    let body = json!({"boardId": BOARD, "name": "Q3/Q4 plan", "type": "XLSX"});
    let resp = app
        .send(post_json("/api/files/create", &app.session(), body))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["id"], "doc-new");
    assert_eq!(json["name"], "Q3:Q4 plan.xlsx");
    assert_eq!(json["type"], "document");
    assert_eq!(json["links"]["self"], format!("{TEMPLATES_URL}/new.xlsx"));

    let created = app.platform.created.lock().unwrap().clone();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].title, "Q3:Q4 plan.xlsx");
}

#[tokio::test]
async fn unsupported_document_type_is_rejected() {
    let app = TestApp::builder().build();
    app.grant().await;
    app.configure_board(BOARD).await;

    for body in [
        json!({"boardId": BOARD, "name": "Notes", "type": "txt"}),
        json!({"boardId": BOARD, "name": "  ", "type": "docx"}),
    ] {
        let resp = app
            .send(post_json("/api/files/create", &app.session(), body))
            .await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
    assert!(app.platform.created.lock().unwrap().is_empty());
}

#[tokio::test]
async fn creation_on_unconfigured_board_is_a_conflict() {
    let app = TestApp::builder().build();
    app.grant().await;

    let body = json!({"boardId": BOARD, "name": "Plan", "type": "docx"});
    let resp = app
        .send(post_json("/api/files/create", &app.session(), body))
        .await;
    assert_eq!(resp.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn document_is_converted_by_the_boards_server() {
    let app = TestApp::builder().build();
    app.grant().await;
    let address = spawn_docserver().await;
    app.configure_board_at(BOARD, &address).await;

    let resp = app
        .send(get(
            &format!("/api/files/convert?bid={BOARD}&fid=item-7&outputtype=PDF"),
            Some(&app.session()),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let json = json_body(resp).await;
    assert_eq!(json["endConvert"], true);
    assert_eq!(json["percent"], 100);
    assert_eq!(json["fileType"], "pdf");
    assert_eq!(
        json["fileUrl"],
        format!("https://ds.example/cache/{BOARD}_item-7.pdf")
    );
}

#[tokio::test]
async fn converting_to_the_same_type_is_rejected() {
    let app = TestApp::builder().build();
    app.grant().await;
    let address = spawn_docserver().await;
    app.configure_board_at(BOARD, &address).await;

    // The fake platform's documents are spreadsheets.
    let resp = app
        .send(get(
            &format!("/api/files/convert?bid={BOARD}&fid=item-7&outputtype=xlsx"),
            Some(&app.session()),
        ))
        .await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}
