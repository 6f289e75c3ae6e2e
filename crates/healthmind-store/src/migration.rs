//! Schema migration system.
//!
//! Migrations are stored as static SQL strings keyed by version number.
//! The current version is tracked in a `_migrations` table so migrations
//! are idempotent and only run once.

use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::error::{StoreError, StoreResult};

/// A single migration definition.
struct Migration {
    /// Monotonically increasing version number (1, 2, 3, ...).
    version: u32,
    /// Human-readable description.
    description: &'static str,
    /// Raw SQL to execute. May contain multiple statements separated by `;`.
    sql: &'static str,
}

/// All migrations in order. Add new migrations to the end of this array.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "chat sessions and messages",
        sql: r#"
            CREATE TABLE chat_session (
                id               TEXT PRIMARY KEY,
                owner            TEXT NOT NULL,
                title            TEXT,
                created_at       INTEGER NOT NULL,
                last_activity_at INTEGER NOT NULL
            );
            CREATE INDEX idx_chat_session_owner ON chat_session(owner);

            CREATE TABLE chat_message (
                id           INTEGER PRIMARY KEY AUTOINCREMENT,
                session_id   TEXT NOT NULL REFERENCES chat_session(id) ON DELETE CASCADE,
                role         TEXT NOT NULL CHECK(role IN ('user','assistant','system','tool')),
                content      TEXT NOT NULL,
                metadata     TEXT,
                created_at   INTEGER NOT NULL
            );
            CREATE INDEX idx_chat_message_session_created ON chat_message(session_id, created_at);
        "#,
    },
    Migration {
        version: 2,
        description: "medical documents, lab results, symptom entries",
        sql: r#"
            CREATE TABLE medical_document (
                id             TEXT PRIMARY KEY,
                owner          TEXT NOT NULL,
                title          TEXT NOT NULL,
                document_type  TEXT NOT NULL CHECK(document_type IN ('lab_report','prescription','imaging','other')),
                file_path      TEXT NOT NULL,
                file_type      TEXT NOT NULL,
                raw_text       TEXT,
                parsed_data    TEXT,
                document_date  INTEGER,
                status         TEXT NOT NULL CHECK(status IN ('uploading','parsing','parsed','extracting','completed','failed')),
                created_at     INTEGER NOT NULL
            );
            CREATE INDEX idx_medical_document_owner_status ON medical_document(owner, status);

            CREATE TABLE lab_result (
                id              TEXT PRIMARY KEY,
                owner           TEXT NOT NULL,
                document_id     TEXT REFERENCES medical_document(id) ON DELETE SET NULL,
                test_name       TEXT NOT NULL,
                test_code       TEXT,
                value           REAL NOT NULL,
                unit            TEXT NOT NULL,
                reference_min   REAL,
                reference_max   REAL,
                status          TEXT CHECK(status IN ('normal','high','low','critical') OR status IS NULL),
                recorded_at     INTEGER NOT NULL,
                created_at      INTEGER NOT NULL
            );
            CREATE INDEX idx_lab_result_owner_test_recorded ON lab_result(owner, test_name, recorded_at);
            -- Dedup key when a standardized test_code is present.
            CREATE UNIQUE INDEX uq_lab_result_code ON lab_result(owner, test_code, recorded_at)
                WHERE test_code IS NOT NULL;
            -- Fallback dedup key when test_code is absent.
            CREATE UNIQUE INDEX uq_lab_result_name ON lab_result(owner, test_name, recorded_at)
                WHERE test_code IS NULL;

            CREATE TABLE symptom_entry (
                id                TEXT PRIMARY KEY,
                owner             TEXT NOT NULL,
                symptom_type      TEXT NOT NULL,
                severity          INTEGER NOT NULL CHECK(severity BETWEEN 0 AND 10),
                notes             TEXT,
                recorded_at       INTEGER NOT NULL,
                duration_minutes  INTEGER,
                triggers          TEXT,
                created_at        INTEGER NOT NULL
            );
            CREATE INDEX idx_symptom_entry_owner_type_recorded ON symptom_entry(owner, symptom_type, recorded_at);
        "#,
    },
    Migration {
        version: 3,
        description: "document ingestion job queue and single-writer-per-session guard",
        sql: r#"
            CREATE TABLE document_ingestion_job (
                id           TEXT PRIMARY KEY,
                document_id  TEXT NOT NULL REFERENCES medical_document(id) ON DELETE CASCADE,
                status       TEXT NOT NULL CHECK(status IN ('queued','running','completed','failed')),
                attempts     INTEGER NOT NULL DEFAULT 0,
                created_at   INTEGER NOT NULL,
                updated_at   INTEGER NOT NULL
            );
            CREATE INDEX idx_ingestion_job_status ON document_ingestion_job(status, created_at);

            CREATE TABLE active_streams (
                session_id TEXT PRIMARY KEY,
                started_at INTEGER NOT NULL
            );
        "#,
    },
    Migration {
        version: 4,
        description: "read-only wearable time series (populated by an external sync process)",
        sql: r#"
            CREATE TABLE wearable_series (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                owner       TEXT NOT NULL,
                series_type TEXT NOT NULL,
                recorded_at INTEGER NOT NULL,
                value       REAL NOT NULL,
                unit        TEXT NOT NULL
            );
            CREATE INDEX idx_wearable_series_owner_type_recorded
                ON wearable_series(owner, series_type, recorded_at);
        "#,
    },
];

// ── public API ───────────────────────────────────────────────────────

/// Run all pending migrations against `conn`.
///
/// This is a **synchronous** function — call it from `spawn_blocking`.
pub fn run_all(conn: &Connection) -> StoreResult<()> {
    ensure_migrations_table(conn)?;

    let current = current_version(conn)?;
    let pending: Vec<&Migration> = MIGRATIONS.iter().filter(|m| m.version > current).collect();

    if pending.is_empty() {
        debug!(current_version = current, "database schema is up to date");
        return Ok(());
    }

    info!(
        current_version = current,
        pending = pending.len(),
        "running pending migrations"
    );

    for migration in pending {
        apply(conn, migration)?;
    }

    info!(
        new_version = MIGRATIONS.last().map(|m| m.version).unwrap_or(0),
        "all migrations applied"
    );
    Ok(())
}

/// Return the latest applied migration version, or 0 if none.
pub fn current_version(conn: &Connection) -> StoreResult<u32> {
    let version: u32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM _migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::Migration {
            version: 0,
            message: format!("failed to read current version: {e}"),
        })?;
    Ok(version)
}

fn ensure_migrations_table(conn: &Connection) -> StoreResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version     INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at  INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn apply(conn: &Connection, migration: &Migration) -> StoreResult<()> {
    debug!(version = migration.version, description = migration.description, "applying migration");

    conn.execute_batch(migration.sql).map_err(|e| {
        warn!(version = migration.version, error = %e, "migration failed");
        StoreError::Migration {
            version: migration.version,
            message: e.to_string(),
        }
    })?;

    conn.execute(
        "INSERT INTO _migrations (version, description, applied_at) VALUES (?1, ?2, strftime('%s','now'))",
        rusqlite::params![migration.version, migration.description],
    )?;

    Ok(())
}
