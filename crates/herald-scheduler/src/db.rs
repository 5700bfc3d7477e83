use rusqlite::Connection;

use crate::error::Result;

/// Initialise the trigger-queue schema in `conn`.
///
/// Creates the `triggers` table (idempotent) and an index on
/// `(status, fire_at)` so the polling query stays efficient.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS triggers (
            id              TEXT NOT NULL PRIMARY KEY,
            announcement_id TEXT NOT NULL,
            fire_at         TEXT NOT NULL,   -- ISO-8601
            status          TEXT NOT NULL DEFAULT 'pending',
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        ) STRICT;

        -- Efficient polling: SELECT … WHERE status='pending' AND fire_at <= ?
        CREATE INDEX IF NOT EXISTS idx_triggers_due ON triggers (status, fire_at);
        CREATE INDEX IF NOT EXISTS idx_triggers_announcement
            ON triggers (announcement_id);
        ",
    )?;
    Ok(())
}
