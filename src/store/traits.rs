//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;

/// A user account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i64,
    pub name: String,
    pub email: String,
}

/// A team the user may belong to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Team {
    pub id: i64,
    pub name: String,
    pub slug: String,
    pub logo_url: Option<String>,
}

/// Role of a user within a team.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MembershipRole {
    Member,
    Admin,
    Owner,
}

impl MembershipRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
            Self::Owner => "owner",
        }
    }
}

impl std::str::FromStr for MembershipRole {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            "owner" => Ok(Self::Owner),
            other => Err(DatabaseError::Serialization(format!(
                "unknown membership role: {other}"
            ))),
        }
    }
}

/// A user's membership in a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub user_id: i64,
    pub team_id: i64,
    pub accepted: bool,
    pub role: MembershipRole,
}

/// An installable app from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct App {
    pub slug: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub enabled: bool,
    /// Whether installing requires an OAuth authorization round-trip.
    pub is_oauth: bool,
}

/// A bookable event type, owned by a user or by a team.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventType {
    pub id: i64,
    pub title: String,
    pub slug: String,
    pub length_minutes: i64,
    pub position: i64,
    pub user_id: Option<i64>,
    pub team_id: Option<i64>,
}

/// A stored authorization linking a user or team to an external provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub id: i64,
    /// Provider integration type, e.g. `google_calendar`.
    pub kind: String,
    pub app_slug: String,
    pub user_id: Option<i64>,
    pub team_id: Option<i64>,
    /// Provider-specific key material (tokens).
    pub key: serde_json::Value,
}

/// A calendar the user opted into for availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedCalendar {
    pub user_id: i64,
    pub credential_id: Option<i64>,
    pub integration: String,
    pub external_id: String,
}

/// A provider push-notification subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarSubscription {
    pub id: i64,
    pub channel_id: String,
    pub credential_id: Option<i64>,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A cached availability window for one credential.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCacheEntry {
    pub credential_id: i64,
    pub key: String,
    pub value: serde_json::Value,
    pub expires_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering wizard and calendar records.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users & teams ───────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError>;

    async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError>;

    async fn insert_team(&self, team: &Team) -> Result<(), DatabaseError>;

    async fn insert_membership(&self, membership: &Membership) -> Result<(), DatabaseError>;

    /// Teams the user has an accepted membership in, ordered by id.
    async fn list_accepted_teams(&self, user_id: i64) -> Result<Vec<Team>, DatabaseError>;

    // ── Apps ────────────────────────────────────────────────────────

    async fn insert_app(&self, app: &App) -> Result<(), DatabaseError>;

    async fn get_app(&self, slug: &str) -> Result<Option<App>, DatabaseError>;

    // ── Event types ─────────────────────────────────────────────────

    async fn insert_event_type(&self, event_type: &EventType) -> Result<(), DatabaseError>;

    /// Event types owned by the user directly (no team), highest position first.
    async fn list_user_event_types(&self, user_id: i64) -> Result<Vec<EventType>, DatabaseError>;

    /// Event types owned by the team, highest position first.
    async fn list_team_event_types(&self, team_id: i64) -> Result<Vec<EventType>, DatabaseError>;

    // ── Credentials ─────────────────────────────────────────────────

    async fn insert_credential(&self, credential: &Credential) -> Result<(), DatabaseError>;

    async fn get_credential(&self, id: i64) -> Result<Option<Credential>, DatabaseError>;

    /// Existing installations of an app, for the user and for the given teams.
    async fn list_app_credentials(
        &self,
        app_slug: &str,
        user_id: i64,
        team_ids: &[i64],
    ) -> Result<Vec<Credential>, DatabaseError>;

    // ── Calendars ───────────────────────────────────────────────────

    async fn insert_selected_calendar(
        &self,
        calendar: &SelectedCalendar,
    ) -> Result<(), DatabaseError>;

    /// Calendars selected through the given credential.
    async fn list_selected_calendars(
        &self,
        credential_id: i64,
    ) -> Result<Vec<SelectedCalendar>, DatabaseError>;

    async fn insert_subscription(
        &self,
        subscription: &CalendarSubscription,
    ) -> Result<(), DatabaseError>;

    async fn get_subscription_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<CalendarSubscription>, DatabaseError>;

    /// Insert or replace the cache row for `(credential_id, key)`.
    async fn upsert_calendar_cache(&self, entry: &CalendarCacheEntry) -> Result<(), DatabaseError>;

    /// Unexpired cache row for `(credential_id, key)`.
    async fn get_calendar_cache(
        &self,
        credential_id: i64,
        key: &str,
    ) -> Result<Option<CalendarCacheEntry>, DatabaseError>;

    /// Drop every cache row for the credential except `keep_key`, and
    /// `keep_key` too once it has expired at `now`. Returns rows removed.
    async fn prune_calendar_cache(
        &self,
        credential_id: i64,
        keep_key: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, DatabaseError>;

    /// Number of cache rows held for a credential, expired or not.
    async fn count_calendar_cache(&self, credential_id: i64) -> Result<usize, DatabaseError>;
}
