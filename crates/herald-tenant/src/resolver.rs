use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use herald_core::PlatformId;
use rusqlite::{Connection, OpenFlags};
use tracing::{debug, instrument};

use crate::error::{Result, TenantError};

/// An open, call-scoped handle on one tenant's datastore.
///
/// The underlying `Connection` is closed when the handle drops, so every
/// exit path (including `?` on an audience-query error) releases it.
/// Handles are never shared across concurrent sagas.
#[derive(Debug)]
pub struct TenantHandle {
    platform: PlatformId,
    guild_id: String,
    conn: Connection,
}

impl TenantHandle {
    pub fn platform(&self) -> &PlatformId {
        &self.platform
    }

    /// The chat platform's own id for this tenant (used in deep links).
    pub fn guild_id(&self) -> &str {
        &self.guild_id
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// Maps platform ids to tenant datastore handles.
///
/// Each `resolve` call opens a fresh connection on the tenant's own file, so
/// one tenant's slow datastore never blocks another tenant's resolution —
/// only the short metadata lookup shares the control-plane lock.
pub struct TenantResolver {
    control: Arc<Mutex<Connection>>,
    tenant_root: PathBuf,
}

impl TenantResolver {
    pub fn new(control: Arc<Mutex<Connection>>, tenant_root: impl Into<PathBuf>) -> Self {
        Self {
            control,
            tenant_root: tenant_root.into(),
        }
    }

    /// Resolve `platform` to an open [`TenantHandle`].
    ///
    /// Fails with [`TenantError::TenantUnavailable`] when the platform has no
    /// connected metadata row or its database file cannot be opened. The file
    /// is opened without `CREATE` — a missing tenant db is an availability
    /// problem, not something to paper over with an empty database.
    #[instrument(skip(self), fields(platform = %platform))]
    pub fn resolve(&self, platform: &PlatformId) -> Result<TenantHandle> {
        let guild_id: String = {
            let db = self.control.lock().unwrap();
            db.query_row(
                "SELECT guild_id FROM platforms
                 WHERE id = ?1 AND disconnected_at IS NULL",
                [platform.as_str()],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => TenantError::TenantUnavailable {
                    platform: platform.to_string(),
                    reason: "no connected platform metadata".into(),
                },
                other => TenantError::Database(other),
            })?
        };

        let path = self.tenant_root.join(format!("{guild_id}.db"));
        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| TenantError::TenantUnavailable {
            platform: platform.to_string(),
            reason: format!("cannot open tenant db {}: {e}", path.display()),
        })?;

        debug!(guild_id = %guild_id, "tenant handle opened");
        Ok(TenantHandle {
            platform: platform.clone(),
            guild_id,
            conn,
        })
    }

    /// Register (or re-register) a platform's metadata row. Used by the
    /// connection-management layer and by tests.
    pub fn register_platform(
        &self,
        platform: &PlatformId,
        guild_id: &str,
        name: Option<&str>,
    ) -> Result<()> {
        let db = self.control.lock().unwrap();
        db.execute(
            "INSERT INTO platforms (id, guild_id, name, disconnected_at)
             VALUES (?1, ?2, ?3, NULL)
             ON CONFLICT(id) DO UPDATE
                SET guild_id = ?2, name = ?3, disconnected_at = NULL",
            rusqlite::params![platform.as_str(), guild_id, name],
        )?;
        Ok(())
    }

    /// Mark a platform disconnected; subsequent `resolve` calls fail.
    pub fn disconnect_platform(&self, platform: &PlatformId) -> Result<()> {
        let db = self.control.lock().unwrap();
        db.execute(
            "UPDATE platforms SET disconnected_at = ?1 WHERE id = ?2",
            rusqlite::params![Utc::now().to_rfc3339(), platform.as_str()],
        )?;
        Ok(())
    }
}
