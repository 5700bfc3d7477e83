use rusqlite::Connection;

use crate::error::Result;

/// Initialise the platform-metadata table in the control-plane database.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS platforms (
            id              TEXT NOT NULL PRIMARY KEY,
            guild_id        TEXT NOT NULL,
            name            TEXT,
            disconnected_at TEXT               -- ISO-8601; NULL while connected
        ) STRICT;
        ",
    )?;
    Ok(())
}

/// Initialise the per-tenant schema (one database file per guild).
///
/// The ingestion pipeline that fills these tables is a separate service;
/// herald only reads them, but tests and fresh deployments need the schema.
pub fn init_tenant_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS channels (
            channel_id TEXT NOT NULL PRIMARY KEY,
            name       TEXT NOT NULL
        ) STRICT;

        CREATE TABLE IF NOT EXISTS members (
            discord_id TEXT NOT NULL PRIMARY KEY,
            username   TEXT NOT NULL,
            joined_at  TEXT
        ) STRICT;

        CREATE TABLE IF NOT EXISTS member_roles (
            role_id    TEXT NOT NULL,
            discord_id TEXT NOT NULL,
            PRIMARY KEY (role_id, discord_id)
        ) STRICT;

        -- Engagement snapshots: one row per (snapshot date, category, member).
        -- Cohort resolution only reads the most recent date.
        CREATE TABLE IF NOT EXISTS member_activity (
            date       TEXT NOT NULL,
            category   TEXT NOT NULL,
            discord_id TEXT NOT NULL,
            PRIMARY KEY (date, category, discord_id)
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_member_roles_role
            ON member_roles (role_id);
        CREATE INDEX IF NOT EXISTS idx_member_activity_date
            ON member_activity (date, category);
        ",
    )?;
    Ok(())
}
