//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "accounts_and_apps",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS teams (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                slug TEXT NOT NULL UNIQUE,
                logo_url TEXT
            );

            CREATE TABLE IF NOT EXISTS memberships (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                team_id INTEGER NOT NULL REFERENCES teams(id) ON DELETE CASCADE,
                accepted INTEGER NOT NULL DEFAULT 0,
                role TEXT NOT NULL DEFAULT 'member',
                PRIMARY KEY (user_id, team_id)
            );
            CREATE INDEX IF NOT EXISTS idx_memberships_user ON memberships(user_id);

            CREATE TABLE IF NOT EXISTS apps (
                slug TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                logo_url TEXT,
                enabled INTEGER NOT NULL DEFAULT 1,
                is_oauth INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS event_types (
                id INTEGER PRIMARY KEY,
                title TEXT NOT NULL,
                slug TEXT NOT NULL,
                length_minutes INTEGER NOT NULL,
                position INTEGER NOT NULL DEFAULT 0,
                user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
                team_id INTEGER REFERENCES teams(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_event_types_user ON event_types(user_id);
            CREATE INDEX IF NOT EXISTS idx_event_types_team ON event_types(team_id);

            CREATE TABLE IF NOT EXISTS credentials (
                id INTEGER PRIMARY KEY,
                kind TEXT NOT NULL,
                app_slug TEXT NOT NULL,
                user_id INTEGER REFERENCES users(id) ON DELETE CASCADE,
                team_id INTEGER REFERENCES teams(id) ON DELETE CASCADE,
                key TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_credentials_app ON credentials(app_slug);
        "#,
    },
    Migration {
        version: 2,
        name: "calendar_subscriptions",
        sql: r#"
            CREATE TABLE IF NOT EXISTS selected_calendars (
                user_id INTEGER NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                credential_id INTEGER REFERENCES credentials(id) ON DELETE CASCADE,
                integration TEXT NOT NULL,
                external_id TEXT NOT NULL,
                PRIMARY KEY (user_id, integration, external_id)
            );
            CREATE INDEX IF NOT EXISTS idx_selected_calendars_credential
                ON selected_calendars(credential_id);

            CREATE TABLE IF NOT EXISTS calendar_subscriptions (
                id INTEGER PRIMARY KEY,
                channel_id TEXT NOT NULL UNIQUE,
                credential_id INTEGER REFERENCES credentials(id) ON DELETE SET NULL,
                expires_at TEXT
            );

            CREATE TABLE IF NOT EXISTS calendar_cache (
                credential_id INTEGER NOT NULL REFERENCES credentials(id) ON DELETE CASCADE,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                expires_at TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (credential_id, key)
            );
        "#,
    },
];

/// Run all pending migrations against the given connection.
///
/// Creates the `_migrations` table if it doesn't exist.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::debug!(version, "Database migrations complete");

    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
