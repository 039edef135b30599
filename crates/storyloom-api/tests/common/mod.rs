//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use storyloom_core::clock::Clock;
use storyloom_core::generator::Generator;
use storyloom_queue::{TaskOutcome, TaskQueue};
use storyloom_session::SessionEngine;
use storyloom_test_support::{FixedClock, InMemorySessionStore, ScriptStep, ScriptedGenerator};
use tokio::sync::mpsc;
use tower::ServiceExt;

use storyloom_api::routes;
use storyloom_api::state::AppState;

/// Fixed timestamp used across all integration tests.
fn fixed_clock() -> Arc<dyn Clock> {
    Arc::new(FixedClock(
        chrono::TimeZone::with_ymd_and_hms(&chrono::Utc, 2026, 1, 15, 10, 0, 0).unwrap(),
    ))
}

/// The application plus handles the tests inspect.
pub struct TestApp {
    /// Full router, built the same way as in `main.rs`.
    pub router: Router,
    /// Shared state behind the router.
    pub state: AppState,
    /// Scripted generator shared by the engine and the queue.
    pub generator: Arc<ScriptedGenerator>,
    /// Store the engine persists to.
    pub store: Arc<InMemorySessionStore>,
    /// Settled queue items.
    pub outcomes: mpsc::UnboundedReceiver<TaskOutcome>,
}

/// Build the full app router over a scripted generator and an in-memory store.
pub fn build_test_app(steps: Vec<ScriptStep>) -> TestApp {
    build_test_app_with_store(steps, Arc::new(InMemorySessionStore::new()))
}

/// Build the full app router over a pre-populated store.
pub fn build_test_app_with_store(
    steps: Vec<ScriptStep>,
    store: Arc<InMemorySessionStore>,
) -> TestApp {
    let generator = Arc::new(ScriptedGenerator::new(steps));
    let shared: Arc<dyn Generator> = generator.clone();
    let engine = Arc::new(SessionEngine::new(
        Arc::clone(&shared),
        fixed_clock(),
        store.clone(),
    ));
    let (queue, outcomes) = TaskQueue::new(shared);
    let state = AppState::new(engine, queue);

    TestApp {
        router: routes::app_router().with_state(state.clone()),
        state,
        generator,
        store,
        outcomes,
    }
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();

    send(app, request).await
}

/// Send a body-less request and return the response.
pub async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    call(app, "GET", uri).await
}

/// Send a raw text body and return the response.
pub async fn post_text(app: Router, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/yaml")
        .body(Body::from(body))
        .unwrap();

    send(app, request).await
}

/// Send a GET request and return the raw text body.
pub async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let request = Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();

    (status, String::from_utf8(body_bytes.to_vec()).unwrap())
}
