//! SQL schema for the SQLite history store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One row per reconciliation run.
CREATE TABLE IF NOT EXISTS schedule_versions (
    version_id  INTEGER PRIMARY KEY AUTOINCREMENT,
    label       TEXT NOT NULL,
    valid_from  TEXT NOT NULL,   -- RFC 3339 UTC, fixed microsecond width
    valid_to    TEXT NOT NULL    -- 9999-12-31T23:59:59 while open
);

-- The incoming batch. Replaced wholesale before each run.
CREATE TABLE IF NOT EXISTS staging_event_sessions (
    staging_id            INTEGER PRIMARY KEY AUTOINCREMENT,
    venue_id              INTEGER,
    sport_id              INTEGER,
    day_id                INTEGER,
    event_date            TEXT,
    event_type            TEXT,
    start_time            TEXT,
    date_start            TEXT,
    end_time              TEXT,
    date_end              TEXT,
    gross_seats           INTEGER,
    seat_kill             REAL,
    est_ticket_sold       REAL,
    net_seats             INTEGER,
    est_sold_seats        INTEGER,
    workforce_count       INTEGER,
    additional_attributes TEXT     -- JSON or NULL
);

-- Fact rows. Never deleted; closing a row only flips is_current and valid_to.
CREATE TABLE IF NOT EXISTS event_sessions (
    record_id             TEXT PRIMARY KEY,
    fingerprint           TEXT NOT NULL,
    schedule_version_id   INTEGER NOT NULL REFERENCES schedule_versions(version_id),
    current_version_id    INTEGER NOT NULL REFERENCES schedule_versions(version_id),
    version_lineage       TEXT NOT NULL,   -- JSON array of version ids
    venue_id              INTEGER NOT NULL,
    sport_id              INTEGER NOT NULL,
    day_id                INTEGER NOT NULL,
    event_date            TEXT NOT NULL,
    event_type            TEXT NOT NULL,
    start_time            TEXT NOT NULL,
    date_start            TEXT,
    end_time              TEXT,
    date_end              TEXT,
    gross_seats           INTEGER,
    seat_kill             REAL,
    est_ticket_sold       REAL,
    net_seats             INTEGER,
    est_sold_seats        INTEGER,
    workforce_count       INTEGER,
    additional_attributes TEXT,
    valid_from            TEXT NOT NULL,
    valid_to              TEXT NOT NULL,
    is_current            INTEGER NOT NULL CHECK (is_current IN (0, 1))
);

-- At most one current row per lineage.
CREATE UNIQUE INDEX IF NOT EXISTS event_sessions_current_idx
    ON event_sessions(fingerprint) WHERE is_current = 1;
CREATE INDEX IF NOT EXISTS event_sessions_fingerprint_idx
    ON event_sessions(fingerprint);
CREATE INDEX IF NOT EXISTS event_sessions_valid_idx
    ON event_sessions(valid_from, valid_to);

-- Append-only change log. audit_seq preserves write order.
CREATE TABLE IF NOT EXISTS event_audit (
    audit_seq           INTEGER PRIMARY KEY AUTOINCREMENT,
    audit_id            TEXT NOT NULL UNIQUE,
    record_id           TEXT REFERENCES event_sessions(record_id),
    fingerprint         TEXT NOT NULL,
    schedule_version_id INTEGER NOT NULL REFERENCES schedule_versions(version_id),
    change_kind         TEXT NOT NULL CHECK (change_kind IN ('INSERT', 'UPDATE', 'DELETE')),
    changed_fields      TEXT,   -- JSON object or NULL
    previous_values     TEXT,   -- JSON object or NULL
    recorded_at         TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS event_audit_version_idx
    ON event_audit(schedule_version_id);

PRAGMA user_version = 1;
";
