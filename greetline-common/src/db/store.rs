//! Greeting store: the narrow storage interface used by the webhook handlers
//!
//! Any engine implementing [`GreetingStore`] can back the service; the
//! shipped implementation is [`SqliteGreetingStore`].

use async_trait::async_trait;
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::models::{Greeting, Track, TrackData};
use crate::{Error, Result};

/// Storage operations over the tracks and greetings tables
#[async_trait]
pub trait GreetingStore: Send + Sync {
    async fn find_track_by_url(&self, url: &str) -> Result<Option<Track>>;

    /// Fails with [`Error::InvalidInput`] if the url is already stored
    async fn insert_track(&self, data: &TrackData) -> Result<Track>;

    async fn find_greeting_by_phone(&self, phone: &str) -> Result<Option<Greeting>>;

    /// Fails with [`Error::InvalidInput`] if the phone already has a greeting
    async fn insert_greeting(&self, phone: &str, track_id: i64) -> Result<Greeting>;

    async fn update_greeting_track(&self, greeting_id: i64, track_id: i64) -> Result<()>;

    /// Track currently assigned to a phone line, if any
    async fn current_greeting_track(&self, phone: &str) -> Result<Option<Track>>;
}

/// Persist a confirmed track as the greeting for `phone`
///
/// Reuses an existing track row with the same url, and reassigns an existing
/// greeting instead of inserting a second one for the same phone.
pub async fn confirm_greeting_track(
    store: &dyn GreetingStore,
    phone: &str,
    data: &TrackData,
) -> Result<(Greeting, Track)> {
    let track = match store.find_track_by_url(&data.url).await? {
        Some(track) => {
            debug!(track_id = track.id, url = %track.url, "Reusing stored track");
            track
        }
        None => store.insert_track(data).await?,
    };

    let greeting = match store.find_greeting_by_phone(phone).await? {
        Some(mut greeting) => {
            store.update_greeting_track(greeting.id, track.id).await?;
            greeting.track_id = Some(track.id);
            greeting
        }
        None => store.insert_greeting(phone, track.id).await?,
    };

    info!(
        phone = %phone,
        track_id = track.id,
        title = %track.title,
        artist = %track.artist,
        "Greeting track set"
    );

    Ok((greeting, track))
}

/// SQLite-backed greeting store
#[derive(Clone)]
pub struct SqliteGreetingStore {
    pool: SqlitePool,
}

impl SqliteGreetingStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn map_unique_violation(err: sqlx::Error, what: String) -> Error {
    match err.as_database_error() {
        Some(db_err) if db_err.is_unique_violation() => Error::InvalidInput(what),
        _ => Error::Database(err),
    }
}

#[async_trait]
impl GreetingStore for SqliteGreetingStore {
    async fn find_track_by_url(&self, url: &str) -> Result<Option<Track>> {
        let track = sqlx::query_as::<_, Track>(
            "SELECT id, title, artist, url FROM tracks WHERE url = ?",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        Ok(track)
    }

    async fn insert_track(&self, data: &TrackData) -> Result<Track> {
        let track = sqlx::query_as::<_, Track>(
            r#"
            INSERT INTO tracks (title, artist, url)
            VALUES (?, ?, ?)
            RETURNING id, title, artist, url
            "#,
        )
        .bind(&data.title)
        .bind(&data.artist)
        .bind(&data.url)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("track url already stored: {}", data.url)))?;

        debug!(track_id = track.id, url = %track.url, "Inserted track");
        Ok(track)
    }

    async fn find_greeting_by_phone(&self, phone: &str) -> Result<Option<Greeting>> {
        let greeting = sqlx::query_as::<_, Greeting>(
            "SELECT id, phone, track_id FROM greetings WHERE phone = ?",
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(greeting)
    }

    async fn insert_greeting(&self, phone: &str, track_id: i64) -> Result<Greeting> {
        let greeting = sqlx::query_as::<_, Greeting>(
            r#"
            INSERT INTO greetings (phone, track_id)
            VALUES (?, ?)
            RETURNING id, phone, track_id
            "#,
        )
        .bind(phone)
        .bind(track_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("greeting already exists for {}", phone)))?;

        debug!(greeting_id = greeting.id, phone = %phone, "Inserted greeting");
        Ok(greeting)
    }

    async fn update_greeting_track(&self, greeting_id: i64, track_id: i64) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE greetings
            SET track_id = ?, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(track_id)
        .bind(greeting_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("greeting {}", greeting_id)));
        }

        Ok(())
    }

    async fn current_greeting_track(&self, phone: &str) -> Result<Option<Track>> {
        let track = sqlx::query_as::<_, Track>(
            r#"
            SELECT t.id, t.title, t.artist, t.url
            FROM greetings g
            JOIN tracks t ON g.track_id = t.id
            WHERE g.phone = ?
            "#,
        )
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;

        Ok(track)
    }
}
