//! Flow-session store
//!
//! Correlates the webhooks of one confirmation call. Entries are keyed by the
//! provider's call identifier, created when the call reaches the flow entry,
//! removed when the flow completes or the call ends, and otherwise dropped
//! once idle longer than the configured TTL. Expiry is lazy: every access
//! prunes stale entries, so no background task is needed.

use chrono::{DateTime, Duration, Utc};
use greetline_common::db::TrackData;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::track_finder::TrackParams;

/// Per-call correlation state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowSession {
    /// Search filters, fixed for the whole flow
    pub track_params: TrackParams,
    /// Candidate currently offered to the caller
    pub track_data: Option<TrackData>,
    /// Number the confirmation call was placed to
    pub msg_from: Option<String>,
    pub last_seen: DateTime<Utc>,
}

#[derive(Clone)]
pub struct FlowSessionStore {
    sessions: Arc<RwLock<HashMap<String, FlowSession>>>,
    ttl: Duration,
}

impl FlowSessionStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            ttl: Duration::seconds(
                i64::try_from(ttl_secs).unwrap_or(i64::MAX).min(i64::MAX / 1000),
            ),
        }
    }

    pub async fn get(&self, call_sid: &str) -> Option<FlowSession> {
        self.get_at(call_sid, Utc::now()).await
    }

    /// Start a flow for `call_sid`, replacing any previous state
    pub async fn begin(&self, call_sid: &str, track_params: TrackParams) -> FlowSession {
        self.begin_at(call_sid, track_params, Utc::now()).await
    }

    /// Mutate an existing session; `None` if it does not exist (or expired)
    pub async fn update<F>(&self, call_sid: &str, f: F) -> Option<FlowSession>
    where
        F: FnOnce(&mut FlowSession),
    {
        self.update_at(call_sid, f, Utc::now()).await
    }

    pub async fn remove(&self, call_sid: &str) -> Option<FlowSession> {
        let removed = self.sessions.write().await.remove(call_sid);
        if removed.is_some() {
            debug!(call_sid = %call_sid, "Flow session removed");
        }
        removed
    }

    /// Number of live sessions
    pub async fn len(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        self.prune(&mut sessions, Utc::now());
        sessions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn get_at(&self, call_sid: &str, now: DateTime<Utc>) -> Option<FlowSession> {
        let mut sessions = self.sessions.write().await;
        self.prune(&mut sessions, now);
        sessions.get(call_sid).cloned()
    }

    async fn begin_at(
        &self,
        call_sid: &str,
        track_params: TrackParams,
        now: DateTime<Utc>,
    ) -> FlowSession {
        let session = FlowSession {
            track_params,
            track_data: None,
            msg_from: None,
            last_seen: now,
        };

        let mut sessions = self.sessions.write().await;
        self.prune(&mut sessions, now);
        sessions.insert(call_sid.to_string(), session.clone());
        debug!(call_sid = %call_sid, live = sessions.len(), "Flow session started");
        session
    }

    async fn update_at<F>(&self, call_sid: &str, f: F, now: DateTime<Utc>) -> Option<FlowSession>
    where
        F: FnOnce(&mut FlowSession),
    {
        let mut sessions = self.sessions.write().await;
        self.prune(&mut sessions, now);
        let session = sessions.get_mut(call_sid)?;
        f(session);
        session.last_seen = now;
        Some(session.clone())
    }

    fn prune(&self, sessions: &mut HashMap<String, FlowSession>, now: DateTime<Utc>) {
        let before = sessions.len();
        sessions.retain(|_, session| now - session.last_seen <= self.ttl);
        let expired = before - sessions.len();
        if expired > 0 {
            debug!(expired, "Expired idle flow sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TrackParams {
        TrackParams::from([("genre".to_string(), "rock".to_string())])
    }

    #[tokio::test]
    async fn test_begin_then_get() {
        let store = FlowSessionStore::new(60);
        store.begin("CA1", params()).await;

        let session = store.get("CA1").await.expect("session should exist");
        assert_eq!(session.track_params, params());
        assert!(session.track_data.is_none());
        assert!(session.msg_from.is_none());
        assert!(store.get("CA2").await.is_none());
    }

    #[tokio::test]
    async fn test_update_mutates_existing_only() {
        let store = FlowSessionStore::new(60);
        store.begin("CA1", params()).await;

        let updated = store
            .update("CA1", |s| s.msg_from = Some("+15550001111".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.msg_from.as_deref(), Some("+15550001111"));
        assert_eq!(
            store.get("CA1").await.unwrap().msg_from.as_deref(),
            Some("+15550001111")
        );

        assert!(store.update("missing", |s| s.msg_from = None).await.is_none());
    }

    #[tokio::test]
    async fn test_sessions_are_isolated_per_call() {
        let store = FlowSessionStore::new(60);
        store.begin("CA1", params()).await;
        store
            .begin("CA2", TrackParams::from([("mood".to_string(), "happy".to_string())]))
            .await;

        assert_eq!(store.get("CA1").await.unwrap().track_params, params());
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = FlowSessionStore::new(60);
        store.begin("CA1", params()).await;

        assert!(store.remove("CA1").await.is_some());
        assert!(store.remove("CA1").await.is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_idle_sessions_expire() {
        let store = FlowSessionStore::new(60);
        let start = Utc::now();
        store.begin_at("CA1", params(), start).await;

        assert!(store.get_at("CA1", start + Duration::seconds(59)).await.is_some());
        assert!(store.get_at("CA1", start + Duration::seconds(61)).await.is_none());
    }

    #[tokio::test]
    async fn test_update_refreshes_idle_timer() {
        let store = FlowSessionStore::new(60);
        let start = Utc::now();
        store.begin_at("CA1", params(), start).await;

        store
            .update_at("CA1", |_| {}, start + Duration::seconds(50))
            .await
            .unwrap();

        assert!(store.get_at("CA1", start + Duration::seconds(100)).await.is_some());
    }
}
