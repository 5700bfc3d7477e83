use rusqlite::Connection;

use crate::error::Result;

/// Initialise the announcements schema in `conn`.
///
/// Safe to call on every startup — uses `IF NOT EXISTS` throughout.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS announcements (
            id           TEXT    NOT NULL PRIMARY KEY,
            community_id TEXT    NOT NULL,
            draft        INTEGER NOT NULL DEFAULT 0,
            scheduled_at TEXT,               -- ISO-8601 or NULL
            job_id       TEXT,               -- live trigger id or NULL
            data         TEXT    NOT NULL,   -- JSON array of targets
            created_at   TEXT    NOT NULL,
            updated_at   TEXT    NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_announcements_community
            ON announcements (community_id, created_at DESC);
        ",
    )?;
    Ok(())
}
