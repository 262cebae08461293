//! Telephony provider client (Twilio REST API) and webhook signatures

use async_trait::async_trait;
use base64::Engine;
use greetline_common::config::TwilioConfig;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha1::Sha1;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum TelephonyError {
    #[error("Network error: {0}")]
    Network(String),

    /// Provider rejected the request
    #[error("Provider error {status}: {body}")]
    Provider { status: u16, body: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Outbound call placement seam
#[async_trait]
pub trait CallPlacer: Send + Sync {
    /// Place a call from `from` to `to`; the provider fetches instructions
    /// from `url` once answered. Returns the provider's call identifier.
    async fn place_call(
        &self,
        to: &str,
        from: &str,
        url: &str,
        status_callback: &str,
    ) -> Result<String, TelephonyError>;
}

#[derive(Debug, Deserialize)]
struct CallResource {
    sid: String,
}

/// Twilio REST client
pub struct TwilioClient {
    http_client: reqwest::Client,
    config: TwilioConfig,
}

impl TwilioClient {
    pub fn new(config: TwilioConfig) -> Result<Self, TelephonyError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| TelephonyError::Network(e.to_string()))?;

        Ok(Self { http_client, config })
    }

    fn calls_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Calls.json",
            self.config.api_base_url.trim_end_matches('/'),
            self.config.account_sid
        )
    }
}

#[async_trait]
impl CallPlacer for TwilioClient {
    async fn place_call(
        &self,
        to: &str,
        from: &str,
        url: &str,
        status_callback: &str,
    ) -> Result<String, TelephonyError> {
        let params = [
            ("To", to),
            ("From", from),
            ("Url", url),
            ("Method", "POST"),
            ("StatusCallback", status_callback),
            ("StatusCallbackMethod", "POST"),
        ];

        debug!(to = %to, from = %from, url = %url, "Placing outbound call");

        let response = self
            .http_client
            .post(self.calls_url())
            .basic_auth(&self.config.account_sid, Some(&self.config.auth_token))
            .form(&params)
            .send()
            .await
            .map_err(|e| TelephonyError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Provider {
                status: status.as_u16(),
                body,
            });
        }

        let call: CallResource = response
            .json()
            .await
            .map_err(|e| TelephonyError::Parse(e.to_string()))?;

        info!(call_sid = %call.sid, to = %to, "Outbound call placed");
        Ok(call.sid)
    }
}

/// Request URL followed by each POST parameter name and value, sorted by name
fn signed_payload(url: &str, params: &[(String, String)]) -> String {
    let mut sorted: Vec<&(String, String)> = params.iter().collect();
    sorted.sort();

    let mut data = url.to_string();
    for (key, value) in sorted {
        data.push_str(key);
        data.push_str(value);
    }
    data
}

/// Expected `X-Twilio-Signature` for a webhook delivery
///
/// Base64 HMAC-SHA1 of the signed payload, keyed with the auth token.
pub fn compute_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
) -> Option<String> {
    let mut mac = Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()).ok()?;
    mac.update(signed_payload(url, params).as_bytes());
    Some(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Check a delivered `X-Twilio-Signature` value; anything that is not valid
/// base64 is rejected
pub fn verify_signature(
    auth_token: &str,
    url: &str,
    params: &[(String, String)],
    signature: &str,
) -> bool {
    let Ok(provided) = base64::engine::general_purpose::STANDARD.decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha1>::new_from_slice(auth_token.as_bytes()) else {
        return false;
    };
    mac.update(signed_payload(url, params).as_bytes());
    mac.verify_slice(&provided).is_ok()
}
