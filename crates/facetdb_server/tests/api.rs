//! End-to-end tests driving the router in-process.

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use facetdb_core::{Config, Engine};
use facetdb_server::{router, AppState, ServerConfig};
use facetdb_testkit::{seed, team_entity, TEAM};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

const BOUNDARY: &str = "facetdb-test-boundary";

struct TestApp {
    app: Router,
    dir: TempDir,
}

impl TestApp {
    fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    fn with_config(config: ServerConfig) -> Self {
        let dir = TempDir::new().unwrap();
        let engine = Engine::open(Config::new().data_dir(dir.path()), [team_entity()]).unwrap();
        seed(&engine);
        let app = router(AppState::new(Arc::new(engine), config));
        Self { app, dir }
    }

    /// Maps an attachment URL to its file in the data directory.
    fn blob_path(&self, url: &str) -> PathBuf {
        let relative = url.trim_start_matches("/attachments/");
        relative
            .split('/')
            .fold(self.dir.path().join("attachments"), |path, s| path.join(s))
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(request(Method::GET, uri, None)).await
    }
}

fn request(method: Method, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn multipart(uri: &str, field: &str, file_name: &str, content_type: &str, data: &[u8]) -> Request<Body> {
    let mut body = Vec::new();
    body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"{field}\"; filename=\"{file_name}\"\r\n")
            .as_bytes(),
    );
    body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn team_lifecycle() {
    let app = TestApp::new();

    let (status, body) = app.get("/team/collection").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"]["numFound"], 18);
    assert_eq!(body["response"]["docs"].as_array().unwrap().len(), 18);

    let (_, schema) = app.get("/team/schema").await;
    assert_eq!(schema.as_array().unwrap().len(), 16);

    let (_, settings) = app.get("/team/settings").await;
    assert_eq!(settings["entity"], "team");
    assert_eq!(settings["title"], "Our team");
    assert_eq!(settings["itemType"], "member");

    let (status, pane) = app.get("/team/pane.json").await;
    assert_eq!(status, StatusCode::OK);
    assert!(pane.is_object());

    let (_, facets) = app.get("/team/ufacets").await;
    assert_eq!(facets["team"].as_array().unwrap().len(), 7);
    assert_eq!(facets["team"][0], "Technology");

    let (_, found) = app.get("/team/property/team/Technology").await;
    assert_eq!(found.as_array().unwrap().len(), 6);

    // Upload, then create a member referencing the picture.
    let jpeg = b"\xFF\xD8\xFF\xE0fake-jpeg";
    let (status, uploaded) = app
        .send(multipart("/team/picture", "picture", "picture.jpg", "image/jpeg", jpeg))
        .await;
    assert_eq!(status, StatusCode::OK);
    let pic = uploaded[0]["url"].as_str().unwrap().to_string();
    assert!(pic.starts_with("/attachments/team/"));
    assert!(app.blob_path(&pic).is_file());

    let mut item = json!({
        "name": "John",
        "lastname": "Doe",
        "email": "john.doe@example.com",
        "startDate": "2024-05-01T10:00:00.000Z",
        "pic": pic,
    });
    let (status, created) = app
        .send(request(Method::POST, "/team/collection", Some(item.clone())))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(created["name"], "John");
    assert_eq!(created["lastname"], "Doe");
    assert_eq!(created["email"], "john.doe@example.com");
    let id = created["id"].as_str().unwrap().to_string();
    assert!(!id.is_empty());

    // Full replace.
    item["id"] = json!(id);
    item["name"] = json!("Jon");
    item["team"] = json!(["team"]);
    item["role"] = json!(["role"]);
    let (status, replaced) = app
        .send(request(Method::PUT, &format!("/team/collection/{id}"), Some(item)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(replaced["name"], "Jon");
    assert_eq!(replaced["lastname"], "Doe");
    assert!(replaced.get("team").is_some());
    assert!(replaced.get("role").is_some());

    // Single properties.
    let (status, patched) = app
        .send(request(Method::PUT, &format!("/team/{id}/property/name/John"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(patched[0]["name"], "John");
    assert_eq!(patched[0]["email"], "john.doe@example.com");
    assert!(patched[0].get("role").is_some());

    let (status, trimmed) = app
        .send(request(Method::DELETE, &format!("/team/{id}/property/role/role"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(trimmed[0].get("role").is_none());
    assert!(trimmed[0].get("team").is_some());

    let (status, fetched) = app.get(&format!("/team/collection/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "John");
    assert!(fetched.get("role").is_none());

    // Deleting the member removes its picture.
    let (status, _) = app
        .send(request(Method::DELETE, &format!("/team/collection/{id}"), None))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(!app.blob_path(&pic).exists());

    let (status, body) = app.get(&format!("/team/collection/{id}")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");
    let (_, body) = app.get("/team/collection").await;
    assert_eq!(body["response"]["numFound"], 18);
}

#[tokio::test]
async fn attachment_is_served_with_its_content_type() {
    let app = TestApp::new();
    let (_, uploaded) = app
        .send(multipart("/team/picture", "picture", "me.png", "image/png", b"png-bytes"))
        .await;
    let url = uploaded[0]["url"].as_str().unwrap();
    assert_eq!(uploaded[0]["contentType"], "image/png");
    assert_eq!(uploaded[0]["size"], 9);

    let response = app
        .app
        .clone()
        .oneshot(request(Method::GET, url, None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"png-bytes");

    let (status, _) = app.get("/attachments/team/missing.png").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn attach_to_existing_document_replaces_picture() {
    let app = TestApp::new();
    let (_, list) = app.get("/team/collection").await;
    let id = list["response"]["docs"][0]["id"].as_str().unwrap().to_string();
    let uri = format!("/team/collection/{id}/picture");

    let (status, first) = app
        .send(multipart(&uri, "picture", "a.jpg", "image/jpeg", b"first"))
        .await;
    assert_eq!(status, StatusCode::OK);
    let first_url = first["attachment"]["url"].as_str().unwrap().to_string();
    assert_eq!(first["document"]["pic"], first_url.as_str());

    let (_, second) = app
        .send(multipart(&uri, "picture", "b.jpg", "image/jpeg", b"second"))
        .await;
    let second_url = second["attachment"]["url"].as_str().unwrap().to_string();
    assert!(!app.blob_path(&first_url).exists());
    assert!(app.blob_path(&second_url).is_file());

    let (status, _) = app
        .send(multipart(
            "/team/collection/00000000-0000-4000-8000-000000000000/picture",
            "picture",
            "c.jpg",
            "image/jpeg",
            b"third",
        ))
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn client_errors_map_to_statuses() {
    let app = TestApp::new();

    let (status, body) = app.get("/ghost/collection").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "unknown_entity");

    let (status, body) = app.get("/team/collection/not-a-uuid").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["kind"], "not_found");

    let (status, body) = app
        .send(request(
            Method::POST,
            "/team/collection",
            Some(json!({ "name": "X", "shoeSize": 44 })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "field");

    let (status, body) = app
        .send(request(
            Method::POST,
            "/team/collection",
            Some(json!({ "name": ["not", "a", "string"] })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "field");

    let malformed = Request::builder()
        .method(Method::POST)
        .uri("/team/collection")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"name\": "))
        .unwrap();
    let (status, body) = app.send(malformed).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");

    let (status, _) = app
        .send(request(Method::POST, "/team/collection", Some(json!([1, 2]))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app
        .send(multipart("/team/picture", "avatar", "a.jpg", "image/jpeg", b"x"))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "invalid_request");

    let (status, _) = app
        .send(request(Method::POST, "/team/picture", Some(json!({}))))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = app.get("/team/property/shoeSize/44").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "field");
}

#[tokio::test]
async fn mismatched_body_id_is_rejected() {
    let app = TestApp::new();
    let (_, list) = app.get("/team/collection").await;
    let docs = list["response"]["docs"].as_array().unwrap();
    let id = docs[0]["id"].as_str().unwrap();
    let other = docs[1]["id"].as_str().unwrap();

    let (status, body) = app
        .send(request(
            Method::PUT,
            &format!("/team/collection/{id}"),
            Some(json!({ "id": other, "name": "Nope" })),
        ))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["kind"], "field");

    let (_, unchanged) = app.get(&format!("/team/collection/{id}")).await;
    assert_eq!(unchanged["name"], docs[0]["name"]);
}

#[tokio::test]
async fn oversized_body_is_rejected() {
    let app = TestApp::with_config(ServerConfig::default().with_max_body_bytes(256));
    let big = json!({ "name": "x".repeat(1024) });

    let (status, body) = app
        .send(request(Method::POST, "/team/collection", Some(big)))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body["kind"], "payload_too_large");

    let (status, _) = app
        .send(multipart("/team/picture", "picture", "big.jpg", "image/jpeg", &[0u8; 4096]))
        .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn facets_with_counts() {
    let app = TestApp::new();

    let (status, all) = app.get("/team/facets").await;
    assert_eq!(status, StatusCode::OK);
    assert!(all.get("team").is_some());
    assert!(all.get("location").is_some());

    let (_, team) = app.get("/team/facets?field=team").await;
    assert_eq!(team["team"][0], json!({ "value": "Technology", "count": 6 }));
    let total: u64 = team["team"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["count"].as_u64().unwrap())
        .sum();
    assert_eq!(total, 18);

    let (status, _) = app.get("/team/facets?field=name").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_entities() {
    let app = TestApp::new();
    let (status, body) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["entities"], json!([TEAM]));
    assert_eq!(body["stats"]["writes"], 18);
}
