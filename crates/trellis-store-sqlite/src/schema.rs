//! SQL schema for the Trellis SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

-- One row per (kind, from, target). Edges are inserted and deleted, never
-- updated.
CREATE TABLE IF NOT EXISTS edges (
    edge_id     INTEGER PRIMARY KEY,
    kind        TEXT    NOT NULL,
    from_id     INTEGER NOT NULL,
    target_type TEXT    NOT NULL,
    target_id   INTEGER NOT NULL,
    created_at  TEXT    NOT NULL,   -- RFC 3339 UTC, fixed precision
    UNIQUE (kind, from_id, target_type, target_id)
);

CREATE INDEX IF NOT EXISTS edges_reverse_idx ON edges(kind, target_type, target_id);
CREATE INDEX IF NOT EXISTS edges_created_idx ON edges(created_at);

-- Events are strictly append-only.
CREATE TABLE IF NOT EXISTS events (
    event_id    INTEGER PRIMARY KEY AUTOINCREMENT,
    actor_id    INTEGER NOT NULL,
    verb        TEXT    NOT NULL,
    target_type TEXT,
    target_id   INTEGER,
    created_at  TEXT    NOT NULL,
    CHECK ((target_type IS NULL) = (target_id IS NULL))
);

CREATE INDEX IF NOT EXISTS events_dedup_idx
    ON events(actor_id, verb, target_type, target_id, created_at);
CREATE INDEX IF NOT EXISTS events_created_idx ON events(created_at);

CREATE TRIGGER IF NOT EXISTS events_no_update
BEFORE UPDATE ON events
BEGIN
    SELECT RAISE(ABORT, 'events are append-only');
END;

PRAGMA user_version = 1;
";

/// Most recent matching event inside the window, for a targeted action.
pub const DEDUP_WITH_TARGET: &str = "
SELECT event_id, actor_id, verb, target_type, target_id, created_at
FROM events
WHERE actor_id = ?1 AND verb = ?2
  AND target_type = ?3 AND target_id = ?4
  AND created_at >= ?5
ORDER BY event_id DESC
LIMIT 1";

/// Most recent matching event inside the window, for an untargeted action.
pub const DEDUP_WITHOUT_TARGET: &str = "
SELECT event_id, actor_id, verb, target_type, target_id, created_at
FROM events
WHERE actor_id = ?1 AND verb = ?2
  AND target_type IS NULL
  AND created_at >= ?3
ORDER BY event_id DESC
LIMIT 1";

pub const EVENT_COLUMNS: &str =
  "event_id, actor_id, verb, target_type, target_id, created_at";
