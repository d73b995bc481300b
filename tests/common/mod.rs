#![allow(dead_code)]

use std::env;
use std::sync::{Arc, Once};

use assessment_backend::{database::MemoryStore, middleware::auth::Claims, routes, AppState};
use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::Value as JsonValue;
use tower::ServiceExt;

pub const JWT_SECRET: &str = "test_secret_key";

static INIT: Once = Once::new();

pub fn init() {
    INIT.call_once(|| {
        env::set_var("SERVER_ADDRESS", "127.0.0.1:0");
        env::set_var("DATABASE_URL", "memory://");
        env::set_var("JWT_SECRET", JWT_SECRET);
        env::set_var("ADMIN_RPS", "1000");
        env::set_var("PUBLIC_RPS", "1000");
        assessment_backend::config::init_config().expect("init config");
    });
}

pub fn app() -> Router {
    init();
    routes::router(AppState::new(Arc::new(MemoryStore::new())))
}

pub fn token_for(role: &str) -> String {
    let claims = Claims {
        sub: format!("{}-user", role),
        exp: (chrono::Utc::now().timestamp() + 3600) as usize,
        role: Some(role.to_string()),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("encode jwt")
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
    let json = if bytes.is_empty() {
        JsonValue::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null)
    };
    (status, json)
}

pub async fn admin(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let token = token_for("hr");
    send(app, method, uri, Some(&token), body).await
}

pub fn as_f64(value: &JsonValue) -> f64 {
    value.as_f64().expect("numeric field")
}

pub fn approx(actual: &JsonValue, expected: f64) {
    let actual = as_f64(actual);
    assert!(
        (actual - expected).abs() < 1e-9,
        "expected {}, got {}",
        expected,
        actual
    );
}
