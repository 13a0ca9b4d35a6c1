//! Availability cache: busy intervals per credential and window, stored
//! through the `Database` trait.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use super::provider::{BusyInterval, CalendarProvider};
use crate::error::{CalendarError, DatabaseError};
use crate::store::{CalendarCacheEntry, Credential, Database, SelectedCalendar};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CacheKey<'a> {
    time_min: String,
    time_max: String,
    items: Vec<CacheKeyItem<'a>>,
}

#[derive(Serialize)]
struct CacheKeyItem<'a> {
    id: &'a str,
}

/// Canonical cache key for a window and a set of calendars.
///
/// Calendar ids are sorted and deduplicated so the same set always maps to
/// the same key regardless of selection order.
pub fn cache_key(
    date_from: DateTime<Utc>,
    date_to: DateTime<Utc>,
    calendars: &[SelectedCalendar],
) -> String {
    let mut ids: Vec<&str> = calendars.iter().map(|c| c.external_id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    let key = CacheKey {
        time_min: date_from.to_rfc3339(),
        time_max: date_to.to_rfc3339(),
        items: ids.into_iter().map(|id| CacheKeyItem { id }).collect(),
    };
    // Serializing a struct of strings cannot fail.
    serde_json::to_string(&key).unwrap_or_default()
}

/// Refreshes and reads cached availability windows.
pub struct AvailabilityCache {
    db: Arc<dyn Database>,
    provider: Arc<dyn CalendarProvider>,
    ttl: Duration,
}

impl AvailabilityCache {
    pub fn new(db: Arc<dyn Database>, provider: Arc<dyn CalendarProvider>, ttl: Duration) -> Self {
        Self { db, provider, ttl }
    }

    /// Fetch busy intervals from the provider and store them under the
    /// window's key. Repeating the call with the same inputs rewrites the
    /// same row with the same value. Rows for any other window of the same
    /// credential are removed, so a credential holds at most one row.
    pub async fn fetch_availability_and_set_cache(
        &self,
        credential: &Credential,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        selected_calendars: &[SelectedCalendar],
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let calendars = dedup_calendars(selected_calendars);
        let key = cache_key(date_from, date_to, &calendars);

        let mut busy = self
            .provider
            .fetch_availability(credential, date_from, date_to, &calendars)
            .await?;
        busy.sort();
        busy.dedup();

        let value = serde_json::to_value(&busy)
            .map_err(|e| DatabaseError::Serialization(format!("busy intervals: {e}")))?;
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::days(30));
        let now = Utc::now();

        self.db
            .upsert_calendar_cache(&CalendarCacheEntry {
                credential_id: credential.id,
                key: key.clone(),
                value,
                expires_at: now + ttl,
            })
            .await?;

        // Earlier windows for this credential are superseded by this one.
        if let Err(e) = self.db.prune_calendar_cache(credential.id, &key, now).await {
            warn!(credential_id = credential.id, error = %e, "Availability cache prune failed");
        }

        info!(
            credential_id = credential.id,
            provider = self.provider.name(),
            calendars = calendars.len(),
            intervals = busy.len(),
            "Availability cache refreshed"
        );
        Ok(busy)
    }

    /// Cached busy intervals for the window, if an unexpired entry exists.
    pub async fn get_cached(
        &self,
        credential_id: i64,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        selected_calendars: &[SelectedCalendar],
    ) -> Result<Option<Vec<BusyInterval>>, CalendarError> {
        let key = cache_key(date_from, date_to, selected_calendars);
        let Some(entry) = self.db.get_calendar_cache(credential_id, &key).await? else {
            debug!(credential_id, "Availability cache miss");
            return Ok(None);
        };
        let busy = serde_json::from_value(entry.value)
            .map_err(|e| DatabaseError::Serialization(format!("busy intervals: {e}")))?;
        Ok(Some(busy))
    }
}

fn dedup_calendars(calendars: &[SelectedCalendar]) -> Vec<SelectedCalendar> {
    let mut out: Vec<SelectedCalendar> = calendars.to_vec();
    out.sort_by(|a, b| a.external_id.cmp(&b.external_id));
    out.dedup_by(|a, b| a.external_id == b.external_id);
    out
}
