//! Provider webhook handlers
//!
//! Every handler answers with call or message instructions, never an error
//! status; domain failures are spoken or texted back.

use axum::{
    extract::{Query, State},
    Form,
};
use serde::Deserialize;

use crate::twiml::TwimlResponse;
use crate::{flow, sms, voice, AppState};

#[derive(Debug, Deserialize)]
pub struct MessageForm {
    #[serde(rename = "From")]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct FlowEntryQuery {
    pub track_params: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct FlowEntryForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "To")]
    pub to: String,
}

#[derive(Debug, Deserialize)]
pub struct KeyPressForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "Digits")]
    pub digits: String,
}

#[derive(Debug, Deserialize)]
pub struct CallStatusForm {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "CallStatus")]
    pub call_status: String,
}

/// POST /receive-voice
pub async fn receive_voice(State(state): State<AppState>) -> TwimlResponse {
    voice::respond_to_inbound_call(&state).await
}

/// POST /receive-message
pub async fn receive_message(
    State(state): State<AppState>,
    Form(form): Form<MessageForm>,
) -> TwimlResponse {
    sms::handle_sms(&state, &form.from, &form.body).await
}

/// POST /set-greeting-track
pub async fn set_greeting_track(
    State(state): State<AppState>,
    Query(query): Query<FlowEntryQuery>,
    Form(form): Form<FlowEntryForm>,
) -> TwimlResponse {
    flow::announce_and_offer(
        &state,
        &form.call_sid,
        &form.to,
        query.track_params.as_deref(),
    )
    .await
}

/// POST /handle-key
pub async fn handle_key(
    State(state): State<AppState>,
    Form(form): Form<KeyPressForm>,
) -> TwimlResponse {
    flow::handle_key(&state, &form.call_sid, &form.digits).await
}

/// POST /call-status
pub async fn call_status(
    State(state): State<AppState>,
    Form(form): Form<CallStatusForm>,
) -> TwimlResponse {
    flow::handle_call_status(&state, &form.call_sid, &form.call_status).await;
    TwimlResponse::new()
}
