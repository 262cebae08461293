//! Confirmation flow on the outbound call
//!
//! The flow entry announces a candidate track and gathers one digit; the key
//! handler accepts it (1), asks for another (2), or repeats the offer.
//! State between webhooks lives in the [`FlowSessionStore`](crate::session::FlowSessionStore).

use greetline_common::db::confirm_greeting_track;
use tracing::{debug, error, info, warn};

use crate::links::{decode_track_params, flow_entry_url, handle_key_url};
use crate::sms::NO_MATCHES_MESSAGE;
use crate::twiml::TwimlResponse;
use crate::AppState;

pub const INTRO_MESSAGE: &str = "You requested a song with the following parameters.";
pub const CONFIRMED_MESSAGE: &str = "Your voicemail greeting has been set successfully. Goodbye.";
pub const FLOW_UNAVAILABLE_MESSAGE: &str =
    "Sorry, this request could not be found. Please send your text message again. Goodbye.";
pub const FLOW_EXPIRED_MESSAGE: &str =
    "Sorry, this request has expired. Please send your text message again. Goodbye.";
pub const STORAGE_FAILURE_MESSAGE: &str =
    "Sorry, your voicemail greeting could not be saved. Please try again later. Goodbye.";

/// Call statuses after which the provider sends no further webhooks
const TERMINAL_CALL_STATUSES: &[&str] = &["completed", "busy", "failed", "no-answer", "canceled"];

fn track_announcement(title: &str, artist: &str) -> String {
    format!("This song by {} is called {}", artist, title)
}

fn acceptance_prompt(title: &str, artist: &str) -> String {
    format!(
        "To accept {} by {} as your voicemail song, press 1. Press 2 to hear another song.",
        title, artist
    )
}

fn invalid_option_message(digits: &str) -> String {
    format!("{} is an invalid option. Please try again.", digits)
}

/// Flow entry: announce a candidate track and gather the owner's choice
///
/// `encoded_params` is the JSON query value present only on the first visit
/// of a call. Later visits (after "2" or an invalid key) reuse the filters
/// stored in the session and skip the parameter read-back.
pub async fn announce_and_offer(
    state: &AppState,
    call_sid: &str,
    to: &str,
    encoded_params: Option<&str>,
) -> TwimlResponse {
    let mut resp = TwimlResponse::new();

    let existing = state.sessions.get(call_sid).await;
    let first_visit = existing.is_none();
    let params = match existing {
        Some(session) => session.track_params,
        None => match encoded_params.and_then(decode_track_params) {
            Some(params) => state.sessions.begin(call_sid, params).await.track_params,
            None => {
                warn!(call_sid = %call_sid, "Flow entry without session or track parameters");
                resp.say(FLOW_UNAVAILABLE_MESSAGE);
                resp.hangup();
                return resp;
            }
        },
    };

    let owner = to.to_string();
    state
        .sessions
        .update(call_sid, move |session| session.msg_from = Some(owner))
        .await;

    let track = match state.track_finder.fetch_track(&params).await {
        Ok(Some(track)) => track,
        Ok(None) => {
            state.sessions.remove(call_sid).await;
            resp.say(NO_MATCHES_MESSAGE);
            resp.hangup();
            return resp;
        }
        Err(e) => {
            info!(call_sid = %call_sid, error = %e, "Track search failed during call");
            state.sessions.remove(call_sid).await;
            resp.say(e.user_message());
            resp.hangup();
            return resp;
        }
    };

    let offered = track.clone();
    state
        .sessions
        .update(call_sid, move |session| session.track_data = Some(offered))
        .await;

    debug!(call_sid = %call_sid, first_visit, title = %track.title, "Offering track");

    if first_visit {
        resp.say(INTRO_MESSAGE);
        for (key, value) in &params {
            resp.say(format!("{}={}", key, value));
            resp.pause();
        }
    }

    resp.say(track_announcement(&track.title, &track.artist));
    resp.play(track.url.as_str());

    let prompt = acceptance_prompt(&track.title, &track.artist);
    resp.gather(1, handle_key_url(&state.config.server.public_base_url), |g| {
        g.say(prompt);
    });

    resp
}

/// Key handler: act on the digit the owner pressed
pub async fn handle_key(state: &AppState, call_sid: &str, digits: &str) -> TwimlResponse {
    let mut resp = TwimlResponse::new();
    let base_url = &state.config.server.public_base_url;

    match digits {
        "1" => {
            let session = state.sessions.get(call_sid).await;
            let owner = session.as_ref().and_then(|s| s.msg_from.clone());
            let offered = session.and_then(|s| s.track_data);

            let Some(track_data) = offered else {
                warn!(call_sid = %call_sid, "Acceptance without an offered track");
                resp.say(FLOW_EXPIRED_MESSAGE);
                resp.hangup();
                return resp;
            };

            let phone = &state.config.phone.service_phone_number;
            match confirm_greeting_track(state.store.as_ref(), phone, &track_data).await {
                Ok((greeting, track)) => {
                    info!(
                        call_sid = %call_sid,
                        owner = ?owner,
                        greeting_id = greeting.id,
                        track_id = track.id,
                        "Greeting track accepted"
                    );
                    state.sessions.remove(call_sid).await;
                    resp.say(CONFIRMED_MESSAGE);
                }
                Err(e) => {
                    error!(call_sid = %call_sid, error = %e, "Failed to store greeting track");
                    resp.say(STORAGE_FAILURE_MESSAGE);
                }
            }
        }
        "2" => {
            resp.redirect(flow_entry_url(base_url, None));
        }
        other => {
            resp.say(invalid_option_message(other));
            resp.redirect(flow_entry_url(base_url, None));
        }
    }

    resp
}

/// Status callback: drop the session once the call can send nothing more
pub async fn handle_call_status(state: &AppState, call_sid: &str, call_status: &str) {
    if TERMINAL_CALL_STATUSES.contains(&call_status) {
        if state.sessions.remove(call_sid).await.is_some() {
            debug!(call_sid = %call_sid, status = %call_status, "Call ended mid-flow");
        }
    } else {
        debug!(call_sid = %call_sid, status = %call_status, "Call status update");
    }
}
