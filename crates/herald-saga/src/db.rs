use rusqlite::Connection;

use crate::error::Result;

/// Initialise the saga-log schema in `conn`.
///
/// `step` is duplicated out of the JSON payload so operators can query
/// stuck or failed sagas without parsing `state`.
pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS sagas (
            id              TEXT NOT NULL PRIMARY KEY,
            announcement_id TEXT NOT NULL,
            step            TEXT NOT NULL,
            state           TEXT NOT NULL,   -- JSON-encoded SagaState
            created_at      TEXT NOT NULL,
            updated_at      TEXT NOT NULL
        ) STRICT;

        CREATE INDEX IF NOT EXISTS idx_sagas_announcement
            ON sagas (announcement_id);
        CREATE INDEX IF NOT EXISTS idx_sagas_step ON sagas (step);
        ",
    )?;
    Ok(())
}
