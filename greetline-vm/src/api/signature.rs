//! Webhook signature middleware
//!
//! Rejects provider webhooks whose `X-Twilio-Signature` does not match the
//! HMAC of the public request URL and form body. Disabled when
//! `twilio.validate_signatures` is false.

use axum::{
    body::Body,
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::warn;
use url::form_urlencoded;

use crate::telephony::verify_signature;
use crate::AppState;

pub const SIGNATURE_HEADER: &str = "X-Twilio-Signature";

/// Webhook bodies are small form posts
const MAX_WEBHOOK_BODY: usize = 64 * 1024;

pub async fn signature_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, SignatureError> {
    if !state.config.twilio.validate_signatures {
        return Ok(next.run(request).await);
    }

    let (parts, body) = request.into_parts();
    let body_bytes = axum::body::to_bytes(body, MAX_WEBHOOK_BODY)
        .await
        .map_err(|e| SignatureError::UnreadableBody(e.to_string()))?;

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(SignatureError::Missing)?;

    // The provider signs the URL it was given, which is built from the public base
    let url = format!(
        "{}{}",
        state.config.server.public_base_url.trim_end_matches('/'),
        parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/")
    );
    let params: Vec<(String, String)> = form_urlencoded::parse(&body_bytes).into_owned().collect();

    if !verify_signature(&state.config.twilio.auth_token, &url, &params, signature) {
        warn!(url = %url, "Webhook signature mismatch");
        return Err(SignatureError::Mismatch);
    }

    let request = Request::from_parts(parts, Body::from(body_bytes));
    Ok(next.run(request).await)
}

#[derive(Debug)]
pub enum SignatureError {
    Missing,
    Mismatch,
    UnreadableBody(String),
}

impl IntoResponse for SignatureError {
    fn into_response(self) -> Response {
        match self {
            SignatureError::Missing => {
                (StatusCode::FORBIDDEN, "Missing webhook signature").into_response()
            }
            SignatureError::Mismatch => {
                (StatusCode::FORBIDDEN, "Invalid webhook signature").into_response()
            }
            SignatureError::UnreadableBody(msg) => {
                (StatusCode::BAD_REQUEST, format!("Unreadable body: {}", msg)).into_response()
            }
        }
    }
}
