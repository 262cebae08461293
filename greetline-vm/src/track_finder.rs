//! Track Finder: picks a candidate greeting track from the music-search provider
//!
//! The provider is queried with the owner's filters verbatim, restricted to
//! songs with preview audio in the configured catalog. One candidate is chosen
//! uniformly at random, so repeating a search may offer a different track.

use async_trait::async_trait;
use greetline_common::config::SearchConfig;
use greetline_common::db::TrackData;
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Search filters keyed by provider parameter name
pub type TrackParams = BTreeMap<String, String>;

/// Provider status code for a rejected parameter
const INVALID_PARAMETER_CODE: i64 = 5;

/// Parameters the client sets itself; owners may not override them
const RESERVED_PARAMS: &[&str] = &["api_key", "format", "results", "bucket", "limit"];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TrackLookupError {
    /// The provider did not recognize a search filter
    #[error("Received unknown track parameter: {0}")]
    UnknownParameter(String),

    /// Network, HTTP or decode failure talking to the provider
    #[error("Track search unavailable: {0}")]
    Unavailable(String),
}

impl TrackLookupError {
    /// Text safe to send back to the phone owner
    pub fn user_message(&self) -> String {
        match self {
            TrackLookupError::UnknownParameter(_) => self.to_string(),
            TrackLookupError::Unavailable(_) => {
                "Track search is unavailable right now, please try again later".to_string()
            }
        }
    }
}

/// Music-search provider seam
#[async_trait]
pub trait TrackSearch: Send + Sync {
    /// Every candidate matching `params` that has playable preview audio
    async fn search(&self, params: &TrackParams) -> Result<Vec<TrackData>, TrackLookupError>;
}

/// Chooses one track among the provider's candidates
#[derive(Clone)]
pub struct TrackFinder {
    search: Arc<dyn TrackSearch>,
}

impl TrackFinder {
    pub fn new(search: Arc<dyn TrackSearch>) -> Self {
        Self { search }
    }

    /// `Ok(None)` means nothing matched, which is not an error
    pub async fn fetch_track(
        &self,
        params: &TrackParams,
    ) -> Result<Option<TrackData>, TrackLookupError> {
        let candidates = self.search.search(params).await?;
        debug!(candidates = candidates.len(), "Track search finished");

        Ok(candidates.choose(&mut rand::thread_rng()).cloned())
    }
}

// Provider wire format

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    response: SearchBody,
}

#[derive(Debug, Deserialize)]
struct SearchBody {
    status: ProviderStatus,
    #[serde(default)]
    songs: Vec<SongResult>,
}

#[derive(Debug, Deserialize)]
struct ProviderStatus {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct SongResult {
    title: String,
    artist_name: String,
    #[serde(default)]
    tracks: Vec<CatalogTrack>,
}

#[derive(Debug, Deserialize)]
struct CatalogTrack {
    #[serde(default)]
    catalog: Option<String>,
    #[serde(default)]
    preview_url: Option<String>,
}

/// Echo Nest style song-search client
pub struct EchoNestClient {
    http_client: reqwest::Client,
    config: SearchConfig,
}

impl EchoNestClient {
    pub fn new(config: SearchConfig) -> Result<Self, TrackLookupError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TrackLookupError::Unavailable(e.without_url().to_string()))?;

        Ok(Self { http_client, config })
    }

    fn search_url(&self) -> String {
        format!("{}/song/search", self.config.base_url.trim_end_matches('/'))
    }

    fn query_pairs(&self, params: &TrackParams) -> Vec<(String, String)> {
        let mut pairs = vec![
            ("api_key".to_string(), self.config.api_key.clone()),
            ("format".to_string(), "json".to_string()),
            ("results".to_string(), self.config.song_results.to_string()),
            ("bucket".to_string(), format!("id:{}", self.config.catalog)),
            ("bucket".to_string(), "tracks".to_string()),
            ("limit".to_string(), "true".to_string()),
        ];
        pairs.extend(params.iter().map(|(k, v)| (k.clone(), v.clone())));
        pairs
    }

    fn candidates(&self, songs: Vec<SongResult>) -> Vec<TrackData> {
        songs
            .into_iter()
            .filter_map(|song| {
                let preview = song.tracks.into_iter().find_map(|track| {
                    let in_catalog = track
                        .catalog
                        .as_deref()
                        .map_or(true, |c| c == self.config.catalog);
                    track.preview_url.filter(|url| in_catalog && !url.is_empty())
                })?;
                Some(TrackData {
                    title: song.title,
                    artist: song.artist_name,
                    url: preview,
                })
            })
            .collect()
    }
}

/// Transport failure with the request URL removed; the query carries the API key
fn unavailable(e: reqwest::Error) -> TrackLookupError {
    TrackLookupError::Unavailable(e.without_url().to_string())
}

fn quoted_word(message: &str) -> Option<&str> {
    ['"', '\''].into_iter().find_map(|quote| {
        let mut parts = message.split(quote);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(_), Some(quoted), Some(_)) if !quoted.is_empty() => Some(quoted),
            _ => None,
        }
    })
}

/// Name the filter a provider complaint refers to
///
/// Tried in order: the token before ` - ` when it is a submitted key, the
/// first quoted word, a submitted key appearing as a whole word, and finally
/// the raw message.
fn offending_parameter(message: &str, params: &TrackParams) -> String {
    if let Some((lead, _)) = message.split_once(" - ") {
        let lead = lead.trim();
        if params.contains_key(lead) {
            return lead.to_string();
        }
    }

    if let Some(quoted) = quoted_word(message) {
        return quoted.to_string();
    }

    let mentioned = message
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .find(|word| params.contains_key(*word));
    if let Some(key) = mentioned {
        return key.to_string();
    }

    message.to_string()
}

#[async_trait]
impl TrackSearch for EchoNestClient {
    async fn search(&self, params: &TrackParams) -> Result<Vec<TrackData>, TrackLookupError> {
        if let Some(key) = params.keys().find(|key| RESERVED_PARAMS.contains(&key.as_str())) {
            return Err(TrackLookupError::UnknownParameter(key.clone()));
        }

        debug!(url = %self.search_url(), ?params, "Querying song search");

        let response = self
            .http_client
            .get(self.search_url())
            .query(&self.query_pairs(params))
            .send()
            .await
            .map_err(unavailable)?;

        let http_status = response.status();
        let body = response
            .text()
            .await
            .map_err(unavailable)?;

        // Rejected parameters arrive as an error status with a JSON body,
        // so decode before looking at the HTTP status
        let envelope: SearchEnvelope = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(e) if http_status.is_success() => {
                return Err(TrackLookupError::Unavailable(format!(
                    "unexpected response body: {}",
                    e
                )));
            }
            Err(_) => {
                return Err(TrackLookupError::Unavailable(format!(
                    "HTTP {}",
                    http_status.as_u16()
                )));
            }
        };

        let status = envelope.response.status;
        match status.code {
            0 => Ok(self.candidates(envelope.response.songs)),
            INVALID_PARAMETER_CODE => {
                let name = offending_parameter(&status.message, params);
                warn!(parameter = %name, message = %status.message, "Search parameter rejected");
                Err(TrackLookupError::UnknownParameter(name))
            }
            code => Err(TrackLookupError::Unavailable(format!(
                "provider status {}: {}",
                code, status.message
            ))),
        }
    }
}
