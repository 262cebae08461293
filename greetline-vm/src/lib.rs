//! greetline-vm library: SMS-configured voicemail greeting service
//!
//! Owners text a search command to the service number, get called back,
//! audition candidate tracks and pick one. Inbound calls are forwarded to
//! the owner's real phone and fall back to the chosen greeting plus voicemail.

use std::sync::Arc;

use axum::Router;
use greetline_common::config::GreetlineConfig;
use greetline_common::db::{GreetingStore, SqliteGreetingStore};
use sqlx::SqlitePool;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod error;
pub mod flow;
pub mod links;
pub mod session;
pub mod sms;
pub mod telephony;
pub mod track_finder;
pub mod twiml;
pub mod voice;

use session::FlowSessionStore;
use telephony::{CallPlacer, TwilioClient};
use track_finder::{EchoNestClient, TrackFinder, TrackSearch};

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<GreetlineConfig>,
    pub store: Arc<dyn GreetingStore>,
    pub track_finder: TrackFinder,
    pub call_placer: Arc<dyn CallPlacer>,
    pub sessions: FlowSessionStore,
}

impl AppState {
    pub fn new(
        config: GreetlineConfig,
        store: Arc<dyn GreetingStore>,
        track_search: Arc<dyn TrackSearch>,
        call_placer: Arc<dyn CallPlacer>,
    ) -> Self {
        let sessions = FlowSessionStore::new(config.server.session_ttl_secs);
        Self {
            config: Arc::new(config),
            store,
            track_finder: TrackFinder::new(track_search),
            call_placer,
            sessions,
        }
    }

    /// State backed by SQLite and the real search and telephony providers
    pub fn with_live_providers(config: GreetlineConfig, pool: SqlitePool) -> anyhow::Result<Self> {
        let track_search = EchoNestClient::new(config.search.clone())?;
        let call_placer = TwilioClient::new(config.twilio.clone())?;

        Ok(Self::new(
            config,
            Arc::new(SqliteGreetingStore::new(pool)),
            Arc::new(track_search),
            Arc::new(call_placer),
        ))
    }
}

/// Build application router
///
/// Provider webhooks sit behind signature validation; the health and
/// `/api/*` routes do not.
pub fn build_router(state: AppState) -> Router {
    use axum::middleware;
    use axum::routing::{get, post};

    let webhooks = Router::new()
        .route("/receive-voice", post(api::receive_voice))
        .route("/receive-message", post(api::receive_message))
        .route(links::FLOW_ENTRY_PATH, post(api::set_greeting_track))
        .route(links::HANDLE_KEY_PATH, post(api::handle_key))
        .route(links::CALL_STATUS_PATH, post(api::call_status))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::signature_middleware,
        ));

    let public = Router::new()
        .route("/api/buildinfo", get(api::get_build_info))
        .route("/api/greeting", get(api::get_greeting))
        .merge(api::health_routes());

    Router::new()
        .merge(webhooks)
        .merge(public)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
