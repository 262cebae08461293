//! SMS command interpreter
//!
//! Owners text `GREET set key:value ...` to the service number. Parsing is a
//! pure function; [`handle_sms`] then searches for a track and places the
//! confirmation call.

use tracing::{debug, error, info};

use crate::links::{call_status_url, flow_entry_url};
use crate::track_finder::TrackParams;
use crate::twiml::TwimlResponse;
use crate::AppState;

/// Actions understood after the command prefix
pub const ALLOWED_ACTIONS: &[&str] = &["set"];

pub const NO_MATCHES_MESSAGE: &str = "No tracks match the parameters given";
pub const CALL_PLACED_MESSAGE: &str = "You should receive a call shortly";
pub const CALL_FAILED_MESSAGE: &str = "An error occurred while calling you back, please try again later";

/// Outcome of interpreting one message body
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SmsCommand {
    /// Not addressed to the service; answer with an empty reply
    Ignore,
    /// Answer with this text and do nothing else
    Reply(String),
    /// Search with these filters and call the sender back
    Set(TrackParams),
}

fn allowed_actions_text() -> String {
    format!("Allowed actions: {}", ALLOWED_ACTIONS.join(", "))
}

/// Split off the first whitespace-delimited token; the remainder is trimmed
/// and `None` when empty
fn split_first_token(text: &str) -> Option<(&str, Option<&str>)> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    match text.find(char::is_whitespace) {
        Some(idx) => {
            let rest = text[idx..].trim();
            Some((&text[..idx], (!rest.is_empty()).then_some(rest)))
        }
        None => Some((text, None)),
    }
}

/// Interpret an SMS body against the configured command prefix
///
/// The prefix match ignores case; action names do not.
pub fn parse_command(body: &str, prefix: &str) -> SmsCommand {
    let Some((leading, rest)) = split_first_token(body) else {
        return SmsCommand::Ignore;
    };

    if leading.to_lowercase() != prefix.to_lowercase() {
        return SmsCommand::Ignore;
    }

    let Some(rest) = rest else {
        return SmsCommand::Reply(allowed_actions_text());
    };

    // `rest` is trimmed and non-empty, so a first token exists
    let Some((action, args)) = split_first_token(rest) else {
        return SmsCommand::Reply(allowed_actions_text());
    };

    let Some(args) = args else {
        return SmsCommand::Reply(format!("No arguments provided for action '{}'", action));
    };

    if !ALLOWED_ACTIONS.contains(&action) {
        return SmsCommand::Reply(format!(
            "Unrecognized action '{}'. {}",
            action,
            allowed_actions_text()
        ));
    }

    parse_set_arguments(args)
}

/// `key:value` tokens; underscores in values stand for spaces and the last
/// occurrence of a key wins
fn parse_set_arguments(args: &str) -> SmsCommand {
    let mut params = TrackParams::new();

    for token in args.split_whitespace() {
        let mut parts = token.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(key), Some(value), None) if !key.is_empty() => {
                params.insert(key.to_string(), value.replace('_', " "));
            }
            _ => {
                return SmsCommand::Reply(format!(
                    "Invalid argument '{}'; arguments must look like key:value",
                    token
                ));
            }
        }
    }

    SmsCommand::Set(params)
}

/// Full SMS handling: parse, search, and place the confirmation call
pub async fn handle_sms(state: &AppState, from: &str, body: &str) -> TwimlResponse {
    let mut resp = TwimlResponse::new();

    let params = match parse_command(body, &state.config.sms.command_prefix) {
        SmsCommand::Ignore => {
            debug!(from = %from, "Ignoring SMS without command prefix");
            return resp;
        }
        SmsCommand::Reply(text) => {
            resp.message(text);
            return resp;
        }
        SmsCommand::Set(params) => params,
    };

    debug!(from = %from, ?params, "Greeting track requested");

    // Search once up front so bad filters are reported by text, not by call
    match state.track_finder.fetch_track(&params).await {
        Err(e) => {
            info!(from = %from, error = %e, "Track search failed for SMS request");
            resp.message(e.user_message());
            return resp;
        }
        Ok(None) => {
            resp.message(NO_MATCHES_MESSAGE);
            return resp;
        }
        Ok(Some(_)) => {}
    }

    let base_url = &state.config.server.public_base_url;
    let result = state
        .call_placer
        .place_call(
            from,
            &state.config.phone.service_phone_number,
            &flow_entry_url(base_url, Some(&params)),
            &call_status_url(base_url),
        )
        .await;

    match result {
        Ok(call_sid) => {
            info!(call_sid = %call_sid, to = %from, "Confirmation call requested");
            resp.message(CALL_PLACED_MESSAGE);
        }
        Err(e) => {
            error!(to = %from, error = %e, "Failed to place confirmation call");
            resp.message(CALL_FAILED_MESSAGE);
        }
    }

    resp
}
