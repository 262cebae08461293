//! Inbound-call response: forward to the real phone, then greeting and voicemail

use greetline_common::config::GreetlineConfig;
use greetline_common::db::Track;
use tracing::{debug, warn};

use crate::twiml::TwimlResponse;
use crate::AppState;

/// Build the call instructions for the given greeting track
///
/// Always dials the real phone first and always ends by recording. Without a
/// greeting the "no song" messages are used; with one, the track plays
/// between the "pre song" and "post song" messages.
pub fn build_voice_response(config: &GreetlineConfig, greeting_track: Option<&Track>) -> TwimlResponse {
    let mut resp = TwimlResponse::new();
    resp.dial(
        config.phone.real_phone_number.as_str(),
        config.phone.real_phone_timeout,
    );

    match greeting_track {
        None => {
            for message in &config.messages.no_song {
                resp.say_or_play(message);
            }
        }
        Some(track) => {
            for message in &config.messages.pre_song {
                resp.say_or_play(message);
            }
            resp.play(track.url.as_str());
            for message in &config.messages.post_song {
                resp.say_or_play(message);
            }
        }
    }

    resp.record();
    resp
}

/// Look up the service line's greeting and build the response
///
/// A storage failure is treated like a missing greeting so the caller still
/// reaches voicemail.
pub async fn respond_to_inbound_call(state: &AppState) -> TwimlResponse {
    let phone = &state.config.phone.service_phone_number;
    let track = match state.store.current_greeting_track(phone).await {
        Ok(track) => track,
        Err(e) => {
            warn!(error = %e, phone = %phone, "Greeting lookup failed; using no-song messages");
            None
        }
    };

    debug!(has_greeting = track.is_some(), "Answering inbound call");
    build_voice_response(&state.config, track.as_ref())
}
