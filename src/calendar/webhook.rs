//! Calendar push-notification webhook.
//!
//! The provider calls this endpoint whenever a watched calendar changes.
//! A valid notification refreshes the cached availability window for the
//! subscription's credential. Refresh failures are logged and the
//! notification is still acknowledged; the provider redelivers on its own
//! schedule. Channels are not renewed here.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;
use tracing::{debug, error, info, warn};

use super::cache::AvailabilityCache;
use super::window::availability_window;
use crate::error::NotificationError;
use crate::store::Database;

/// Header carrying the shared secret set when the channel was created.
pub const CHANNEL_TOKEN_HEADER: &str = "x-goog-channel-token";
/// Header carrying the provider's channel id.
pub const CHANNEL_ID_HEADER: &str = "x-goog-channel-id";

/// Handles calendar change notifications.
pub struct CalendarWebhook {
    db: Arc<dyn Database>,
    cache: Arc<AvailabilityCache>,
    token: Option<SecretString>,
}

impl CalendarWebhook {
    pub fn new(
        db: Arc<dyn Database>,
        cache: Arc<AvailabilityCache>,
        token: Option<SecretString>,
    ) -> Self {
        Self { db, cache, token }
    }

    fn token_matches(&self, channel_token: Option<&str>) -> bool {
        match (&self.token, channel_token) {
            (Some(expected), Some(given)) => {
                expected.expose_secret().as_bytes().ct_eq(given.as_bytes()).into()
            }
            _ => false,
        }
    }

    /// Process one notification received at `now`.
    pub async fn on_notification(
        &self,
        channel_token: Option<&str>,
        channel_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), NotificationError> {
        if !self.token_matches(channel_token) {
            return Err(NotificationError::Forbidden);
        }

        let channel_id = channel_id.map(str::trim).unwrap_or_default();
        let not_found = || NotificationError::SubscriptionNotFound {
            channel_id: channel_id.to_string(),
        };
        if channel_id.is_empty() {
            return Err(not_found());
        }

        let subscription = self
            .db
            .get_subscription_by_channel(channel_id)
            .await?
            .ok_or_else(not_found)?;

        let credential_missing = || NotificationError::CredentialNotFound {
            channel_id: channel_id.to_string(),
        };
        let credential_id = subscription.credential_id.ok_or_else(credential_missing)?;
        let credential = self
            .db
            .get_credential(credential_id)
            .await?
            .ok_or_else(credential_missing)?;

        let selected = match self.db.list_selected_calendars(credential.id).await {
            Ok(selected) => selected,
            Err(e) => {
                warn!(credential_id, error = %e, "Could not load selected calendars; skipping refresh");
                return Ok(());
            }
        };
        if selected.is_empty() {
            debug!(credential_id, "No selected calendars; nothing to refresh");
            return Ok(());
        }

        let (date_from, date_to) = availability_window(now);
        if let Err(e) = self
            .cache
            .fetch_availability_and_set_cache(&credential, date_from, date_to, &selected)
            .await
        {
            warn!(credential_id, channel_id, error = %e, "Availability refresh failed");
        }

        Ok(())
    }
}

impl IntoResponse for NotificationError {
    fn into_response(self) -> Response {
        let status = match &self {
            NotificationError::Forbidden => StatusCode::FORBIDDEN,
            NotificationError::SubscriptionNotFound { .. }
            | NotificationError::CredentialNotFound { .. } => StatusCode::NOT_FOUND,
            NotificationError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({"message": self.to_string()}))).into_response()
    }
}

/// Build the webhook route.
pub fn webhook_routes(webhook: Arc<CalendarWebhook>) -> Router {
    Router::new()
        .route(
            "/api/integrations/googlecalendar/webhook",
            post(handle_notification),
        )
        .with_state(webhook)
}

/// POST /api/integrations/googlecalendar/webhook
async fn handle_notification(
    State(webhook): State<Arc<CalendarWebhook>>,
    headers: HeaderMap,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let channel_id = header(CHANNEL_ID_HEADER);

    match webhook
        .on_notification(header(CHANNEL_TOKEN_HEADER), channel_id, Utc::now())
        .await
    {
        Ok(()) => {
            info!(channel_id = channel_id.unwrap_or_default(), "Calendar notification handled");
            Json(serde_json::json!({"message": "ok"})).into_response()
        }
        Err(e) => {
            match &e {
                NotificationError::Database(_) => error!(error = %e, "Calendar notification failed"),
                _ => warn!(error = %e, "Calendar notification rejected"),
            }
            e.into_response()
        }
    }
}
