//! Absolute callback URLs handed to the telephony provider

use url::form_urlencoded;

use crate::track_finder::TrackParams;

pub const FLOW_ENTRY_PATH: &str = "/set-greeting-track";
pub const HANDLE_KEY_PATH: &str = "/handle-key";
pub const CALL_STATUS_PATH: &str = "/call-status";

/// Query parameter carrying the JSON-encoded search filters
pub const TRACK_PARAMS_QUERY: &str = "track_params";

fn absolute(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Confirmation-flow entry; the first visit carries the search filters
pub fn flow_entry_url(base_url: &str, track_params: Option<&TrackParams>) -> String {
    let url = absolute(base_url, FLOW_ENTRY_PATH);
    match track_params {
        Some(params) => {
            // A BTreeMap of strings always serializes
            let json = serde_json::to_string(params).unwrap_or_else(|_| "{}".to_string());
            let query = form_urlencoded::Serializer::new(String::new())
                .append_pair(TRACK_PARAMS_QUERY, &json)
                .finish();
            format!("{}?{}", url, query)
        }
        None => url,
    }
}

pub fn handle_key_url(base_url: &str) -> String {
    absolute(base_url, HANDLE_KEY_PATH)
}

pub fn call_status_url(base_url: &str) -> String {
    absolute(base_url, CALL_STATUS_PATH)
}

/// Recover search filters embedded by [`flow_entry_url`]
pub fn decode_track_params(encoded: &str) -> Option<TrackParams> {
    serde_json::from_str(encoded).ok()
}
