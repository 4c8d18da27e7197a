mod support;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Method, Request, StatusCode, header},
};
use cinescore_back::routes;
use serde_json::{Value, json};
use support::TestApp;
use tower::ServiceExt;

async fn send(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .expect("request");

    let response = app.clone().oneshot(request).await.expect("response");
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body");
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn identity(app: &Router) -> String {
    let (status, body) = send(app, Method::POST, "/identity", None, None).await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().expect("token").to_owned()
}

#[tokio::test]
async fn host_creates_and_players_join_over_http() {
    let test_app = TestApp::new().await;
    let app = routes::build_router(test_app.state.clone());

    let host = identity(&app).await;
    let (status, body) = send(&app, Method::POST, "/sessions", Some(&host), None).await;
    assert_eq!(status, StatusCode::OK);
    let code = body["code"].as_str().expect("code").to_owned();
    assert_eq!(code.len(), 4);

    let player = identity(&app).await;
    let (status, body) = send(
        &app,
        Method::POST,
        &format!("/sessions/{code}/join"),
        Some(&player),
        Some(json!({"display_name": "Ada"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "lobby");
    assert_eq!(body["players"][0]["display_name"], "Ada");

    let (status, body) = send(&app, Method::GET, &format!("/sessions/{code}"), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["players"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn intents_need_a_known_identity() {
    let test_app = TestApp::new().await;
    let app = routes::build_router(test_app.state.clone());

    let (status, _) = send(&app, Method::POST, "/sessions", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, Method::POST, "/sessions", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let test_app = TestApp::new().await;
    let app = routes::build_router(test_app.state.clone());
    let host = identity(&app).await;
    let (_, body) = send(&app, Method::POST, "/sessions", Some(&host), None).await;
    let code = body["code"].as_str().expect("code").to_owned();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/sessions/{code}/join"),
        Some(&host),
        Some(json!({"display_name": "   "})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, Method::GET, "/sessions/ZZZZ", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn sessions_are_unavailable_without_a_store() {
    let test_app = TestApp::builder().without_store().build().await;
    let app = routes::build_router(test_app.state.clone());
    let host = identity(&app).await;

    let (status, _) = send(&app, Method::POST, "/sessions", Some(&host), None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, body) = send(&app, Method::GET, "/healthcheck", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
}

#[tokio::test]
async fn refreshed_token_keeps_the_identity() {
    let test_app = TestApp::new().await;
    let app = routes::build_router(test_app.state.clone());

    let (_, issued) = send(&app, Method::POST, "/identity", None, None).await;
    let token = issued["token"].as_str().expect("token");
    assert!(issued["expires_in"].as_u64().expect("expiry") > 0);

    let (status, refreshed) = send(&app, Method::POST, "/identity/refresh", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(refreshed["player_id"], issued["player_id"]);

    let (status, body) = send(&app, Method::POST, "/identity/refresh", Some("forged"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "unauthorized");
}
