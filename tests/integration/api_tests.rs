//! API integration tests
//!
//! Each test starts the full router on an ephemeral port over the in-memory
//! store and talks to it with a real HTTP client.

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

use book_lending_server::{
    api,
    clock::SystemClock,
    config::{AppConfig, StorageBackend},
    repository,
    services::Services,
    AppState,
};

struct TestServer {
    base_url: String,
    client: Client,
}

impl TestServer {
    async fn start() -> Self {
        let mut config = AppConfig::default();
        config.database.backend = StorageBackend::Memory;

        let store = repository::connect(&config.database)
            .await
            .expect("Failed to create store");
        let services = Services::new(store, Arc::new(SystemClock), &config);
        let app = api::router(AppState {
            services: Arc::new(services),
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("No local address");
        tokio::spawn(async move {
            axum::serve(listener, app).await.expect("Server error");
        });

        Self {
            base_url: format!("http://{}/api/v1", addr),
            client: Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register a user and return a bearer token for it
    async fn login_as(&self, username: &str) -> String {
        let password = "a long enough password";

        let response = self
            .client
            .post(self.url("/register"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to send register request");
        assert_eq!(response.status(), StatusCode::CREATED);

        let response = self
            .client
            .post(self.url("/login"))
            .json(&json!({ "username": username, "password": password }))
            .send()
            .await
            .expect("Failed to send login request");
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = response.json().await.expect("Failed to parse login response");
        body["token"].as_str().expect("No token in response").to_string()
    }

    async fn post(&self, token: &str, path: &str, body: Option<Value>) -> (StatusCode, Value) {
        let mut request = self.client.post(self.url(path)).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await.expect("Failed to send request");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn get(&self, token: &str, path: &str) -> (StatusCode, Value) {
        let response = self
            .client
            .get(self.url(path))
            .bearer_auth(token)
            .send()
            .await
            .expect("Failed to send request");
        let status = response.status();
        (status, response.json().await.unwrap_or(Value::Null))
    }

    async fn create_book(&self, token: &str, title: &str) -> String {
        let (status, body) = self
            .post(
                token,
                "/books",
                Some(json!({ "title": title, "author": "Iain M. Banks" })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["id"].as_str().expect("No book id").to_string()
    }
}

#[tokio::test]
async fn test_health_and_readiness() {
    let server = TestServer::start().await;

    let response = server
        .client
        .get(server.url("/health"))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");

    let response = server
        .client
        .get(server.url("/ready"))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_register_and_login() {
    let server = TestServer::start().await;
    let token = server.login_as("alice").await;
    assert!(!token.is_empty());

    // Same username again
    let response = server
        .client
        .post(server.url("/register"))
        .json(&json!({ "username": "alice", "password": "another password" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "Conflict");
}

#[tokio::test]
async fn test_login_invalid_credentials() {
    let server = TestServer::start().await;
    server.login_as("bob").await;

    let response = server
        .client
        .post(server.url("/login"))
        .json(&json!({ "username": "bob", "password": "wrong password" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_routes_require_token() {
    let server = TestServer::start().await;

    let response = server
        .client
        .post(server.url("/books"))
        .json(&json!({ "title": "Excession", "author": "Iain M. Banks" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["error"], "Unauthenticated");

    let (status, _) = server.get("garbage", "/books/not-checked").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_book_crud() {
    let server = TestServer::start().await;
    let token = server.login_as("librarian").await;
    let book_id = server.create_book(&token, "Use of Weapons").await;

    let (status, body) = server.get(&token, &format!("/books/{}", book_id)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Use of Weapons");
    assert_eq!(body["status"], "available");
    assert!(body["borrower_id"].is_null());

    let response = server
        .client
        .put(server.url(&format!("/books/{}", book_id)))
        .bearer_auth(&token)
        .json(&json!({ "title": "The Player of Games" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["title"], "The Player of Games");
    assert_eq!(body["author"], "Iain M. Banks");

    let response = server
        .client
        .delete(server.url(&format!("/books/{}", book_id)))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let (status, body) = server.get(&token, &format!("/books/{}", book_id)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_update_cannot_change_lending_state() {
    let server = TestServer::start().await;
    let token = server.login_as("sneaky").await;
    let book_id = server.create_book(&token, "Matter").await;

    let response = server
        .client
        .put(server.url(&format!("/books/{}", book_id)))
        .bearer_auth(&token)
        .json(&json!({ "author": "I. M. Banks", "status": "borrowed" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["author"], "I. M. Banks");
    assert_eq!(body["status"], "available");

    // Only lending fields: nothing to update
    let response = server
        .client
        .put(server.url(&format!("/books/{}", book_id)))
        .bearer_auth(&token)
        .json(&json!({ "status": "overdue" }))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_borrow_and_return_lifecycle() {
    let server = TestServer::start().await;
    let token = server.login_as("reader").await;
    let book_id = server.create_book(&token, "Surface Detail").await;

    let (status, record) = server
        .post(&token, &format!("/borrowed-books/borrow/{}", book_id), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(record["book_id"], book_id.as_str());
    assert!(record["borrowed_at"].is_string());
    assert!(record["returned_at"].is_null());
    let record_id = record["id"].as_str().expect("No record id").to_string();

    let (_, book) = server.get(&token, &format!("/books/{}", book_id)).await;
    assert_eq!(book["status"], "borrowed");
    assert_eq!(book["borrower_id"], record["user_id"]);

    let (status, fetched) = server
        .get(&token, &format!("/borrowed-books/{}", record_id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["id"], record_id.as_str());

    let (status, closed) = server
        .post(&token, &format!("/borrowed-books/return/{}", record_id), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(closed["returned_at"].is_string());

    let (_, book) = server.get(&token, &format!("/books/{}", book_id)).await;
    assert_eq!(book["status"], "available");
    assert!(book["borrower_id"].is_null());

    let (status, body) = server
        .post(&token, &format!("/borrowed-books/return/{}", record_id), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn test_second_borrow_is_rejected() {
    let server = TestServer::start().await;
    let first = server.login_as("first").await;
    let second = server.login_as("second").await;
    let book_id = server.create_book(&first, "Inversions").await;

    let (status, _) = server
        .post(&first, &format!("/borrowed-books/borrow/{}", book_id), None)
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = server
        .post(&second, &format!("/borrowed-books/borrow/{}", book_id), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "NotAvailable");
}

#[tokio::test]
async fn test_malformed_ids_are_invalid_arguments() {
    let server = TestServer::start().await;
    let token = server.login_as("typo").await;

    for path in [
        "/books/not-a-uuid",
        "/borrowed-books/12345",
        "/users/nope",
    ] {
        let (status, body) = server.get(&token, path).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{}", path);
        assert_eq!(body["error"], "InvalidArgument", "{}", path);
    }

    let (status, _) = server
        .post(&token, "/borrowed-books/borrow/not-a-uuid", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_openapi_document_is_served() {
    let server = TestServer::start().await;
    let url = server.base_url.replace("/api/v1", "/api-docs/openapi.json");

    let response = server.client.get(url).send().await.expect("Failed to send request");
    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["paths"]["/books/{id}"].is_object());
}
