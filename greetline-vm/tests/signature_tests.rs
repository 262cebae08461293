//! Webhook signature enforcement

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
    Router,
};
use greetline_common::config::GreetlineConfig;
use greetline_common::db::{init_database, SqliteGreetingStore, TrackData};
use greetline_vm::telephony::{compute_signature, CallPlacer, TelephonyError};
use greetline_vm::track_finder::{TrackLookupError, TrackParams, TrackSearch};
use greetline_vm::{build_router, AppState};
use tempfile::TempDir;
use tower::util::ServiceExt;

const BASE_URL: &str = "https://greet.example.com";
const AUTH_TOKEN: &str = "webhook-secret";

struct NoSearch;

#[async_trait]
impl TrackSearch for NoSearch {
    async fn search(&self, _: &TrackParams) -> Result<Vec<TrackData>, TrackLookupError> {
        Ok(vec![])
    }
}

struct NoCalls;

#[async_trait]
impl CallPlacer for NoCalls {
    async fn place_call(&self, _: &str, _: &str, _: &str, _: &str) -> Result<String, TelephonyError> {
        Err(TelephonyError::Network("disabled".to_string()))
    }
}

async fn setup(validate: bool) -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = init_database(&dir.path().join("greetline.db")).await.unwrap();

    let mut config = GreetlineConfig::default();
    config.server.public_base_url = format!("{}/", BASE_URL);
    config.phone.real_phone_number = "+15550002222".to_string();
    config.phone.service_phone_number = "+15550009999".to_string();
    config.twilio.auth_token = AUTH_TOKEN.to_string();
    config.twilio.validate_signatures = validate;

    let state = AppState::new(
        config,
        Arc::new(SqliteGreetingStore::new(pool)),
        Arc::new(NoSearch),
        Arc::new(NoCalls),
    );
    (build_router(state), dir)
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn signed_request(uri: &str, params: &[(String, String)], signature: Option<&str>) -> Request<Body> {
    let body = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params)
        .finish();
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded");
    if let Some(signature) = signature {
        builder = builder.header("X-Twilio-Signature", signature);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn test_valid_signature_accepted() {
    let (app, _dir) = setup(true).await;
    let params = pairs(&[("From", "+15550001111"), ("Body", "GREET")]);
    let signature =
        compute_signature(AUTH_TOKEN, &format!("{}/receive-message", BASE_URL), &params).unwrap();

    let response = app
        .oneshot(signed_request("/receive-message", &params, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_signature_covers_query_string() {
    let (app, _dir) = setup(true).await;
    let params = pairs(&[("CallSid", "CA1"), ("To", "+15550001111")]);
    let uri = "/set-greeting-track?track_params=%7B%22genre%22%3A%22rock%22%7D";
    let signature = compute_signature(AUTH_TOKEN, &format!("{}{}", BASE_URL, uri), &params).unwrap();

    let response = app
        .clone()
        .oneshot(signed_request(uri, &params, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // Same signature, different query
    let response = app
        .oneshot(signed_request("/set-greeting-track", &params, Some(&signature)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_tampered_body_rejected() {
    let (app, _dir) = setup(true).await;
    let signed = pairs(&[("CallSid", "CA1"), ("Digits", "2")]);
    let signature =
        compute_signature(AUTH_TOKEN, &format!("{}/handle-key", BASE_URL), &signed).unwrap();

    let sent = pairs(&[("CallSid", "CA1"), ("Digits", "1")]);
    let response = app
        .oneshot(signed_request("/handle-key", &sent, Some(&signature)))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_missing_signature_rejected() {
    let (app, _dir) = setup(true).await;
    let params = pairs(&[("From", "+15550001111"), ("Body", "GREET")]);

    let response = app
        .oneshot(signed_request("/receive-message", &params, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_health_needs_no_signature() {
    let (app, _dir) = setup(true).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_validation_disabled_accepts_unsigned() {
    let (app, _dir) = setup(false).await;
    let params = pairs(&[("From", "+15550001111"), ("Body", "GREET")]);

    let response = app
        .oneshot(signed_request("/receive-message", &params, None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}
