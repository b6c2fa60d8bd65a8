//! SQL schema for the Mailroom SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- One table for every entity kind; fields are opaque JSON.
CREATE TABLE IF NOT EXISTS entities (
    kind         TEXT    NOT NULL,   -- 'contact' | 'user' | 'tag' | ...
    entity_id    TEXT    NOT NULL,
    revision     INTEGER NOT NULL DEFAULT 0,
    date_insert  TEXT    NOT NULL,   -- RFC 3339 UTC
    date_update  TEXT    NOT NULL,   -- RFC 3339 UTC
    fields_json  TEXT    NOT NULL DEFAULT '{}',
    PRIMARY KEY (kind, entity_id)
);

-- Ordered by the primary key so bulk scans can page by keyset.
CREATE TABLE IF NOT EXISTS remote_identities (
    user_id          TEXT NOT NULL,
    identifier       TEXT NOT NULL,
    protocol         TEXT NOT NULL,
    display_name     TEXT,
    credentials_json TEXT NOT NULL DEFAULT '{}',
    infos_json       TEXT NOT NULL DEFAULT '{}',
    status           TEXT NOT NULL DEFAULT 'active',
    last_check       TEXT,
    date_insert      TEXT NOT NULL,
    date_update      TEXT NOT NULL,
    PRIMARY KEY (user_id, identifier),
    CHECK (length(trim(identifier)) > 0),
    CHECK (length(trim(protocol)) > 0)
);

CREATE TABLE IF NOT EXISTS local_identities (
    user_id      TEXT NOT NULL,
    identifier   TEXT NOT NULL,
    protocol     TEXT NOT NULL DEFAULT 'email',
    display_name TEXT,
    status       TEXT NOT NULL DEFAULT 'active',
    date_insert  TEXT NOT NULL,
    PRIMARY KEY (user_id, identifier)
);

CREATE INDEX IF NOT EXISTS entities_insert_idx ON entities(kind, date_insert);

PRAGMA user_version = 1;
";
