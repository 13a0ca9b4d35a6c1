//! Calendar provider client — fetches busy intervals for selected calendars.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::CalendarError;
use crate::store::{Credential, SelectedCalendar};

const GOOGLE_FREEBUSY_URL: &str = "https://www.googleapis.com/calendar/v3/freeBusy";

/// A busy span on one of the user's calendars.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BusyInterval {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Source of availability data for a credential.
#[async_trait]
pub trait CalendarProvider: Send + Sync {
    /// Provider name for logs and errors.
    fn name(&self) -> &str;

    /// Busy intervals across `calendars` between `date_from` and `date_to`.
    async fn fetch_availability(
        &self,
        credential: &Credential,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        calendars: &[SelectedCalendar],
    ) -> Result<Vec<BusyInterval>, CalendarError>;
}

/// Google Calendar FreeBusy client.
pub struct GoogleCalendarProvider {
    client: reqwest::Client,
    endpoint: String,
    timeout: Duration,
}

impl GoogleCalendarProvider {
    pub fn new(timeout: Duration) -> Result<Self, CalendarError> {
        Self::with_endpoint(GOOGLE_FREEBUSY_URL, timeout)
    }

    /// Point the client at a different FreeBusy endpoint.
    pub fn with_endpoint(endpoint: &str, timeout: Duration) -> Result<Self, CalendarError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CalendarError::RequestFailed {
                provider: "google".to_string(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            timeout,
        })
    }

    fn access_token(credential: &Credential) -> Result<&str, CalendarError> {
        credential
            .key
            .get("access_token")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .ok_or(CalendarError::InvalidCredential {
                credential_id: credential.id,
            })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct FreeBusyRequest<'a> {
    time_min: String,
    time_max: String,
    items: Vec<FreeBusyItem<'a>>,
}

#[derive(Serialize)]
struct FreeBusyItem<'a> {
    id: &'a str,
}

#[derive(Deserialize)]
struct FreeBusyResponse {
    #[serde(default)]
    calendars: HashMap<String, FreeBusyCalendar>,
}

#[derive(Deserialize)]
struct FreeBusyCalendar {
    #[serde(default)]
    busy: Vec<BusyInterval>,
    #[serde(default)]
    errors: Vec<serde_json::Value>,
}

#[async_trait]
impl CalendarProvider for GoogleCalendarProvider {
    fn name(&self) -> &str {
        "google"
    }

    async fn fetch_availability(
        &self,
        credential: &Credential,
        date_from: DateTime<Utc>,
        date_to: DateTime<Utc>,
        calendars: &[SelectedCalendar],
    ) -> Result<Vec<BusyInterval>, CalendarError> {
        let token = Self::access_token(credential)?;
        let body = FreeBusyRequest {
            time_min: date_from.to_rfc3339(),
            time_max: date_to.to_rfc3339(),
            items: calendars
                .iter()
                .map(|c| FreeBusyItem {
                    id: c.external_id.as_str(),
                })
                .collect(),
        };

        let resp = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CalendarError::Timeout {
                        provider: self.name().to_string(),
                        timeout: self.timeout,
                    }
                } else {
                    CalendarError::RequestFailed {
                        provider: self.name().to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CalendarError::RequestFailed {
                provider: self.name().to_string(),
                reason: format!("{status}: {text}"),
            });
        }

        let parsed: FreeBusyResponse =
            resp.json().await.map_err(|e| CalendarError::InvalidResponse {
                provider: self.name().to_string(),
                reason: e.to_string(),
            })?;

        let mut busy = Vec::new();
        for (calendar_id, calendar) in parsed.calendars {
            if !calendar.errors.is_empty() {
                warn!(
                    credential_id = credential.id,
                    calendar = %calendar_id,
                    errors = calendar.errors.len(),
                    "FreeBusy reported calendar errors"
                );
            }
            busy.extend(calendar.busy);
        }
        debug!(credential_id = credential.id, intervals = busy.len(), "FreeBusy fetched");
        Ok(busy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(key: serde_json::Value) -> Credential {
        Credential {
            id: 5,
            kind: "google_calendar".into(),
            app_slug: "google-calendar".into(),
            user_id: Some(1),
            team_id: None,
            key,
        }
    }

    #[test]
    fn access_token_is_required() {
        let ok = credential(serde_json::json!({"access_token": "abc"}));
        assert_eq!(GoogleCalendarProvider::access_token(&ok).unwrap(), "abc");

        for key in [serde_json::json!({}), serde_json::json!({"access_token": ""})] {
            let err = GoogleCalendarProvider::access_token(&credential(key)).unwrap_err();
            assert!(matches!(err, CalendarError::InvalidCredential { credential_id: 5 }));
        }
    }

    #[test]
    fn freebusy_request_shape() {
        let from = DateTime::parse_from_rfc3339("2026-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let body = FreeBusyRequest {
            time_min: from.to_rfc3339(),
            time_max: from.to_rfc3339(),
            items: vec![FreeBusyItem { id: "primary" }],
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["items"][0]["id"], "primary");
        assert!(json.get("timeMin").is_some());
    }

    #[test]
    fn freebusy_response_parses_busy_blocks() {
        let raw = r#"{
            "kind": "calendar#freeBusy",
            "calendars": {
                "primary": {
                    "busy": [{"start": "2026-03-02T10:00:00Z", "end": "2026-03-02T11:00:00Z"}]
                },
                "missing@example.com": {"errors": [{"reason": "notFound"}]}
            }
        }"#;
        let parsed: FreeBusyResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.calendars["primary"].busy.len(), 1);
        assert_eq!(parsed.calendars["missing@example.com"].errors.len(), 1);
    }

    #[tokio::test]
    async fn missing_token_fails_before_any_request() {
        // Unroutable endpoint: the call must fail on the credential first.
        let provider =
            GoogleCalendarProvider::with_endpoint("http://127.0.0.1:9/freeBusy", Duration::from_secs(1))
                .unwrap();
        let now = Utc::now();
        let err = provider
            .fetch_availability(&credential(serde_json::json!({})), now, now, &[])
            .await
            .unwrap_err();
        assert!(matches!(err, CalendarError::InvalidCredential { .. }));
    }
}
