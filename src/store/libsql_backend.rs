//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    App, CalendarCacheEntry, CalendarSubscription, Credential, Database, EventType, Membership,
    SelectedCalendar, Team, User,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.init_schema().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Fixed-width UTC timestamp, so stored values compare correctly as text.
fn sql_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

/// Convert `Option<i64>` to libsql Value.
fn opt_int(v: Option<i64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Integer(v),
        None => libsql::Value::Null,
    }
}

fn row_to_user(row: &libsql::Row) -> Result<User, libsql::Error> {
    Ok(User {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
    })
}

fn row_to_team(row: &libsql::Row) -> Result<Team, libsql::Error> {
    Ok(Team {
        id: row.get(0)?,
        name: row.get(1)?,
        slug: row.get(2)?,
        logo_url: row.get(3).ok(),
    })
}

fn row_to_app(row: &libsql::Row) -> Result<App, libsql::Error> {
    let enabled: i64 = row.get(3)?;
    let is_oauth: i64 = row.get(4)?;
    Ok(App {
        slug: row.get(0)?,
        name: row.get(1)?,
        logo_url: row.get(2).ok(),
        enabled: enabled != 0,
        is_oauth: is_oauth != 0,
    })
}

fn row_to_event_type(row: &libsql::Row) -> Result<EventType, libsql::Error> {
    Ok(EventType {
        id: row.get(0)?,
        title: row.get(1)?,
        slug: row.get(2)?,
        length_minutes: row.get(3)?,
        position: row.get(4)?,
        user_id: row.get(5).ok(),
        team_id: row.get(6).ok(),
    })
}

fn row_to_credential(row: &libsql::Row) -> Result<Credential, libsql::Error> {
    let key_str: String = row.get(5)?;
    Ok(Credential {
        id: row.get(0)?,
        kind: row.get(1)?,
        app_slug: row.get(2)?,
        user_id: row.get(3).ok(),
        team_id: row.get(4).ok(),
        key: serde_json::from_str(&key_str).unwrap_or_else(|_| serde_json::json!({})),
    })
}

fn row_to_selected_calendar(row: &libsql::Row) -> Result<SelectedCalendar, libsql::Error> {
    Ok(SelectedCalendar {
        user_id: row.get(0)?,
        credential_id: row.get(1).ok(),
        integration: row.get(2)?,
        external_id: row.get(3)?,
    })
}

fn row_to_subscription(row: &libsql::Row) -> Result<CalendarSubscription, libsql::Error> {
    let expires_str: Option<String> = row.get(3).ok();
    Ok(CalendarSubscription {
        id: row.get(0)?,
        channel_id: row.get(1)?,
        credential_id: row.get(2).ok(),
        expires_at: expires_str.as_deref().map(parse_datetime),
    })
}

fn row_to_cache_entry(row: &libsql::Row) -> Result<CalendarCacheEntry, libsql::Error> {
    let value_str: String = row.get(2)?;
    let expires_str: String = row.get(3)?;
    Ok(CalendarCacheEntry {
        credential_id: row.get(0)?,
        key: row.get(1)?,
        value: serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null),
        expires_at: parse_datetime(&expires_str),
    })
}

/// Collect all rows of a query through `map`, skipping rows that fail to parse.
async fn collect_rows<T>(
    mut rows: libsql::Rows,
    op: &str,
    map: fn(&libsql::Row) -> Result<T, libsql::Error>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    loop {
        match rows.next().await {
            Ok(Some(row)) => match map(&row) {
                Ok(item) => out.push(item),
                Err(e) => tracing::warn!(op, "Skipping row: {e}"),
            },
            Ok(None) => break,
            Err(e) => return Err(DatabaseError::Query(format!("{op}: {e}"))),
        }
    }
    Ok(out)
}

/// Read the first row of a query through `map`.
async fn first_row<T>(
    mut rows: libsql::Rows,
    op: &str,
    map: fn(&libsql::Row) -> Result<T, libsql::Error>,
) -> Result<Option<T>, DatabaseError> {
    match rows.next().await {
        Ok(Some(row)) => map(&row)
            .map(Some)
            .map_err(|e| DatabaseError::Query(format!("{op} row parse: {e}"))),
        Ok(None) => Ok(None),
        Err(e) => Err(DatabaseError::Query(format!("{op}: {e}"))),
    }
}

// ── Trait implementation ────────────────────────────────────────────

const TEAM_COLUMNS: &str = "t.id, t.name, t.slug, t.logo_url";

const EVENT_TYPE_COLUMNS: &str = "id, title, slug, length_minutes, position, user_id, team_id";

const CREDENTIAL_COLUMNS: &str = "id, kind, app_slug, user_id, team_id, key";

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Users & teams ───────────────────────────────────────────────

    async fn insert_user(&self, user: &User) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (id, name, email) VALUES (?1, ?2, ?3)",
                params![user.id, user.name.clone(), user.email.clone()],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_user: {e}")))?;
        debug!(user_id = user.id, "User inserted");
        Ok(())
    }

    async fn get_user(&self, id: i64) -> Result<Option<User>, DatabaseError> {
        let rows = self
            .conn()
            .query("SELECT id, name, email FROM users WHERE id = ?1", params![id])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;
        first_row(rows, "get_user", row_to_user).await
    }

    async fn insert_team(&self, team: &Team) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO teams (id, name, slug, logo_url) VALUES (?1, ?2, ?3, ?4)",
                params![
                    team.id,
                    team.name.clone(),
                    team.slug.clone(),
                    opt_text(team.logo_url.as_deref())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_team: {e}")))?;
        Ok(())
    }

    async fn insert_membership(&self, membership: &Membership) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO memberships (user_id, team_id, accepted, role) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (user_id, team_id) DO UPDATE SET accepted = ?3, role = ?4",
                params![
                    membership.user_id,
                    membership.team_id,
                    i64::from(membership.accepted),
                    membership.role.as_str()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_membership: {e}")))?;
        Ok(())
    }

    async fn list_accepted_teams(&self, user_id: i64) -> Result<Vec<Team>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {TEAM_COLUMNS} FROM teams t
                     JOIN memberships m ON m.team_id = t.id
                     WHERE m.user_id = ?1 AND m.accepted = 1
                     ORDER BY t.id ASC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_accepted_teams: {e}")))?;
        collect_rows(rows, "list_accepted_teams", row_to_team).await
    }

    // ── Apps ────────────────────────────────────────────────────────

    async fn insert_app(&self, app: &App) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO apps (slug, name, logo_url, enabled, is_oauth) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    app.slug.clone(),
                    app.name.clone(),
                    opt_text(app.logo_url.as_deref()),
                    i64::from(app.enabled),
                    i64::from(app.is_oauth)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_app: {e}")))?;
        Ok(())
    }

    async fn get_app(&self, slug: &str) -> Result<Option<App>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "SELECT slug, name, logo_url, enabled, is_oauth FROM apps WHERE slug = ?1",
                params![slug],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_app: {e}")))?;
        first_row(rows, "get_app", row_to_app).await
    }

    // ── Event types ─────────────────────────────────────────────────

    async fn insert_event_type(&self, event_type: &EventType) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!("INSERT INTO event_types ({EVENT_TYPE_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"),
                params![
                    event_type.id,
                    event_type.title.clone(),
                    event_type.slug.clone(),
                    event_type.length_minutes,
                    event_type.position,
                    opt_int(event_type.user_id),
                    opt_int(event_type.team_id)
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_event_type: {e}")))?;
        Ok(())
    }

    async fn list_user_event_types(&self, user_id: i64) -> Result<Vec<EventType>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EVENT_TYPE_COLUMNS} FROM event_types
                     WHERE user_id = ?1 AND team_id IS NULL
                     ORDER BY position DESC, id ASC"
                ),
                params![user_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_user_event_types: {e}")))?;
        collect_rows(rows, "list_user_event_types", row_to_event_type).await
    }

    async fn list_team_event_types(&self, team_id: i64) -> Result<Vec<EventType>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {EVENT_TYPE_COLUMNS} FROM event_types
                     WHERE team_id = ?1
                     ORDER BY position DESC, id ASC"
                ),
                params![team_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_team_event_types: {e}")))?;
        collect_rows(rows, "list_team_event_types", row_to_event_type).await
    }

    // ── Credentials ─────────────────────────────────────────────────

    async fn insert_credential(&self, credential: &Credential) -> Result<(), DatabaseError> {
        let key = serde_json::to_string(&credential.key)
            .map_err(|e| DatabaseError::Serialization(format!("credential key: {e}")))?;
        self.conn()
            .execute(
                &format!("INSERT INTO credentials ({CREDENTIAL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)"),
                params![
                    credential.id,
                    credential.kind.clone(),
                    credential.app_slug.clone(),
                    opt_int(credential.user_id),
                    opt_int(credential.team_id),
                    key
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_credential: {e}")))?;
        debug!(credential_id = credential.id, kind = %credential.kind, "Credential inserted");
        Ok(())
    }

    async fn get_credential(&self, id: i64) -> Result<Option<Credential>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                &format!("SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE id = ?1"),
                params![id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_credential: {e}")))?;
        first_row(rows, "get_credential", row_to_credential).await
    }

    async fn list_app_credentials(
        &self,
        app_slug: &str,
        user_id: i64,
        team_ids: &[i64],
    ) -> Result<Vec<Credential>, DatabaseError> {
        let mut sql = format!(
            "SELECT {CREDENTIAL_COLUMNS} FROM credentials WHERE app_slug = ?1 AND (user_id = ?2"
        );
        let mut values = vec![
            libsql::Value::Text(app_slug.to_string()),
            libsql::Value::Integer(user_id),
        ];
        if !team_ids.is_empty() {
            let placeholders: Vec<String> =
                (0..team_ids.len()).map(|i| format!("?{}", i + 3)).collect();
            sql.push_str(&format!(" OR team_id IN ({})", placeholders.join(", ")));
            values.extend(team_ids.iter().map(|&id| libsql::Value::Integer(id)));
        }
        sql.push_str(") ORDER BY id");

        let rows = self
            .conn()
            .query(&sql, values)
            .await
            .map_err(|e| DatabaseError::Query(format!("list_app_credentials: {e}")))?;
        collect_rows(rows, "list_app_credentials", row_to_credential).await
    }

    // ── Calendars ───────────────────────────────────────────────────

    async fn insert_selected_calendar(
        &self,
        calendar: &SelectedCalendar,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO selected_calendars (user_id, credential_id, integration, external_id)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    calendar.user_id,
                    opt_int(calendar.credential_id),
                    calendar.integration.clone(),
                    calendar.external_id.clone()
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_selected_calendar: {e}")))?;
        Ok(())
    }

    async fn list_selected_calendars(
        &self,
        credential_id: i64,
    ) -> Result<Vec<SelectedCalendar>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "SELECT user_id, credential_id, integration, external_id FROM selected_calendars
                 WHERE credential_id = ?1 ORDER BY external_id",
                params![credential_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_selected_calendars: {e}")))?;
        collect_rows(rows, "list_selected_calendars", row_to_selected_calendar).await
    }

    async fn insert_subscription(
        &self,
        subscription: &CalendarSubscription,
    ) -> Result<(), DatabaseError> {
        let expires_at = subscription.expires_at.map(|t| t.to_rfc3339());
        self.conn()
            .execute(
                "INSERT INTO calendar_subscriptions (id, channel_id, credential_id, expires_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    subscription.id,
                    subscription.channel_id.clone(),
                    opt_int(subscription.credential_id),
                    opt_text(expires_at.as_deref())
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_subscription: {e}")))?;
        Ok(())
    }

    async fn get_subscription_by_channel(
        &self,
        channel_id: &str,
    ) -> Result<Option<CalendarSubscription>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "SELECT id, channel_id, credential_id, expires_at FROM calendar_subscriptions
                 WHERE channel_id = ?1",
                params![channel_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_subscription_by_channel: {e}")))?;
        first_row(rows, "get_subscription_by_channel", row_to_subscription).await
    }

    async fn upsert_calendar_cache(&self, entry: &CalendarCacheEntry) -> Result<(), DatabaseError> {
        let value = serde_json::to_string(&entry.value)
            .map_err(|e| DatabaseError::Serialization(format!("calendar cache value: {e}")))?;
        let now = sql_timestamp(Utc::now());
        self.conn()
            .execute(
                "INSERT INTO calendar_cache (credential_id, key, value, expires_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (credential_id, key) DO UPDATE SET value = ?3, expires_at = ?4, updated_at = ?5",
                params![
                    entry.credential_id,
                    entry.key.clone(),
                    value,
                    sql_timestamp(entry.expires_at),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_calendar_cache: {e}")))?;
        debug!(credential_id = entry.credential_id, "Calendar cache upserted");
        Ok(())
    }

    async fn get_calendar_cache(
        &self,
        credential_id: i64,
        key: &str,
    ) -> Result<Option<CalendarCacheEntry>, DatabaseError> {
        let rows = self
            .conn()
            .query(
                "SELECT credential_id, key, value, expires_at FROM calendar_cache
                 WHERE credential_id = ?1 AND key = ?2",
                params![credential_id, key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_calendar_cache: {e}")))?;
        let entry = first_row(rows, "get_calendar_cache", row_to_cache_entry).await?;
        Ok(entry.filter(|e| e.expires_at > Utc::now()))
    }

    async fn prune_calendar_cache(
        &self,
        credential_id: i64,
        keep_key: &str,
        now: DateTime<Utc>,
    ) -> Result<usize, DatabaseError> {
        let removed = self
            .conn()
            .execute(
                "DELETE FROM calendar_cache
                 WHERE credential_id = ?1 AND (key != ?2 OR expires_at <= ?3)",
                params![credential_id, keep_key, sql_timestamp(now)],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("prune_calendar_cache: {e}")))?;
        if removed > 0 {
            debug!(credential_id, removed, "Calendar cache pruned");
        }
        Ok(removed as usize)
    }

    async fn count_calendar_cache(&self, credential_id: i64) -> Result<usize, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT COUNT(*) FROM calendar_cache WHERE credential_id = ?1",
                params![credential_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("count_calendar_cache: {e}")))?;
        match rows.next().await {
            Ok(Some(row)) => {
                let count: i64 = row.get(0).unwrap_or(0);
                Ok(count as usize)
            }
            Ok(None) => Ok(0),
            Err(e) => Err(DatabaseError::Query(format!("count_calendar_cache: {e}"))),
        }
    }
}
