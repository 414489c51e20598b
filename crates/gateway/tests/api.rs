//! End-to-end tests of the HTTP surface over in-memory SQLite and mock model
//! gateways

use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
    Router,
};
use docqa_common::{
    completion::MockCompleter,
    config::AppConfig,
    embeddings::MockEmbedder,
    test_support::{build_pdf, memory_pool},
};
use docqa_gateway::{create_router, AppState};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const BOUNDARY: &str = "docqa-test-boundary";

async fn test_app() -> Router {
    let state = AppState::new(
        Arc::new(AppConfig::default()),
        memory_pool().await,
        Arc::new(MockEmbedder::new(256)),
        Arc::new(MockCompleter::new()),
    );
    create_router(state)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn upload(filename: &str, content_type: &str, bytes: &[u8]) -> Request<Body> {
    let mut body = format!(
        "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"new_file\"; filename=\"{filename}\"\r\nContent-Type: {content_type}\r\n\r\n"
    )
    .into_bytes();
    body.extend_from_slice(bytes);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri("/v1/document/ingest")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn ingest_sample(app: &Router) -> i64 {
    let pdf = build_pdf(&[
        "Orders ship within two business days",
        "Refund window is thirty days from delivery",
    ]);
    let (status, body) = send(app, upload("store-policy.pdf", "application/pdf", &pdf)).await;
    assert_eq!(status, StatusCode::OK);
    body["details"]["id"].as_i64().unwrap()
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = test_app().await;

    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "docqa");

    let (status, body) = send(&app, get("/ready")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"]["status"], "up");

    // No recorder installed
    let (status, _) = send(&app, get("/metrics")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_documents_empty() {
    let app = test_app().await;

    let (status, body) = send(&app, get("/v1/document/")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Retrieved documents information successfully.");
    assert_eq!(body["details"], json!([]));
}

#[tokio::test]
async fn test_ingest_document() {
    let app = test_app().await;
    let pdf = build_pdf(&["Orders ship within two business days", "Refunds take a week"]);

    let (status, body) = send(&app, upload("store-policy.pdf", "application/pdf", &pdf)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Document ingested successfully.");

    let details = &body["details"];
    assert_eq!(details["id"], 1);
    assert_eq!(details["filename"], "store-policy.pdf");
    assert_eq!(details["metadata_info"]["pages"], 2);
    assert!(details["metadata_info"]["size"].as_str().unwrap().ends_with(" KB"));
    assert_eq!(details["metadata_info"]["md5"].as_str().unwrap().len(), 32);
    assert!(details["usage"].as_u64().unwrap() > 0);

    let (_, body) = send(&app, get("/v1/document/")).await;
    let documents = body["details"].as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["status"], "COMPLETED");
    assert_eq!(documents[0]["embedding_model"], "text-embedding-3-small");
    assert_eq!(documents[0]["is_deleted"], false);
}

#[tokio::test]
async fn test_ingest_rejects_non_pdf() {
    let app = test_app().await;
    let pdf = build_pdf(&["Some text"]);

    let (status, body) = send(&app, upload("store-policy.pdf", "application/json", &pdf)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Only PDF file is accepted.");

    // Nothing was stored
    let (_, body) = send(&app, get("/v1/document/")).await;
    assert_eq!(body["details"], json!([]));
}

#[tokio::test]
async fn test_ingest_rejects_unreadable_pdf() {
    let app = test_app().await;

    let (status, body) = send(&app, upload("broken.pdf", "application/pdf", b"not a pdf")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["code"], "PDF_PARSE_ERROR");
}

#[tokio::test]
async fn test_list_documents_pagination() {
    let app = test_app().await;
    for _ in 0..3 {
        ingest_sample(&app).await;
    }

    let (_, body) = send(&app, get("/v1/document/?skip=1&limit=1")).await;
    let documents = body["details"].as_array().unwrap();
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0]["id"], 2);

    let (_, body) = send(&app, get("/v1/document/")).await;
    assert_eq!(body["details"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn test_create_session_validation() {
    let app = test_app().await;

    let (status, body) = send(&app, post_json("/v1/session/", json!({"document_id": 1}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "name field required");

    let (status, body) = send(&app, post_json("/v1/session/", json!({"name": "Support"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "document_id field required");

    let (status, body) = send(
        &app,
        post_json("/v1/session/", json!({"name": "", "document_id": 1})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["field"], "name");
}

#[tokio::test]
async fn test_create_session_unknown_document() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        post_json("/v1/session/", json!({"name": "Support", "document_id": 100})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Document with ID 100 not found");
}

#[tokio::test]
async fn test_ask_unknown_session() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        post_json("/v1/session/100", json!({"question": "What is the refund window?"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "Session not found.");
}

#[tokio::test]
async fn test_ask_validation() {
    let app = test_app().await;

    let (status, body) = send(&app, post_json("/v1/session/1", json!({"max_tokens": 100}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "question field required");

    let (status, _) = send(
        &app,
        post_json("/v1/session/1", json!({"question": "Hi", "model": "gpt-5"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(
        &app,
        post_json("/v1/session/1", json!({"question": "Hi", "max_tokens": 0})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["details"]["field"], "max_tokens");
}

#[tokio::test]
async fn test_question_answering_flow() {
    let app = test_app().await;
    let document_id = ingest_sample(&app).await;

    let (status, body) = send(
        &app,
        post_json(
            "/v1/session/",
            json!({
                "name": "Support",
                "document_id": document_id,
                "system_message": "You are a helpful assistant."
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Session created successfully.");
    assert_eq!(body["details"]["session_id"], 1);

    let (status, body) = send(
        &app,
        post_json(
            "/v1/session/1",
            json!({"question": "What is the refund window?", "model": "gpt-4"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Question answered successfully.");

    let details = &body["details"];
    assert_eq!(details["session_id"], 1);
    assert_eq!(details["question"], "What is the refund window?");
    assert!(details["answer"]
        .as_str()
        .unwrap()
        .starts_with("According to the document:"));
    assert_eq!(details["metadata_info"]["model"], "gpt-4");
    assert_eq!(details["metadata_info"]["chat_completion_id"], "chatcmpl-mock-1");
    assert!(details["metadata_info"]["usage"].as_u64().unwrap() > 0);
    assert_eq!(details["chat_id"], 1);

    let (status, body) = send(&app, get("/v1/session/1/chats")).await;
    assert_eq!(status, StatusCode::OK);
    let turns = body["details"].as_array().unwrap();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0]["question"], "What is the refund window?");
}

#[tokio::test]
async fn test_delete_document() {
    let app = test_app().await;
    let document_id = ingest_sample(&app).await;
    let (status, _) = send(
        &app,
        post_json("/v1/session/", json!({"name": "Support", "document_id": document_id})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let request = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/v1/document/{document_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["details"]["is_deleted"], true);

    let (_, body) = send(&app, get("/v1/document/")).await;
    assert_eq!(body["details"], json!([]));

    let (status, _) = send(
        &app,
        post_json("/v1/session/", json!({"name": "Support", "document_id": document_id})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    // sessions opened before the delete stop answering
    let (status, _) = send(
        &app,
        post_json("/v1/session/1", json!({"question": "What is the refund window?"})),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = send(&app, get("/v1/session/1/chats")).await;
    assert_eq!(body["details"], json!([]));

    let request = Request::builder()
        .method(Method::DELETE)
        .uri(format!("/v1/document/{document_id}"))
        .body(Body::empty())
        .unwrap();
    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
