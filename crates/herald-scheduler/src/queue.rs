//! Trigger rows and their queue operations over a borrowed `Connection`.

use chrono::{DateTime, Utc};
use herald_core::AnnouncementId;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, SchedulerError};

/// Lifecycle state of a queue trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerStatus {
    /// Waiting for its fire_at time.
    Pending,
    /// Consumed by the engine; orchestration was invoked.
    Fired,
    /// Cancelled before firing.
    Revoked,
}

impl std::fmt::Display for TriggerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TriggerStatus::Pending => "pending",
            TriggerStatus::Fired => "fired",
            TriggerStatus::Revoked => "revoked",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TriggerStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TriggerStatus::Pending),
            "fired" => Ok(TriggerStatus::Fired),
            "revoked" => Ok(TriggerStatus::Revoked),
            other => Err(format!("unknown trigger status: {other}")),
        }
    }
}

/// A persisted trigger record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trigger {
    /// UUID v4 string — this is what announcements store as `job_id`.
    pub id: String,
    pub announcement_id: AnnouncementId,
    /// ISO-8601 instant the trigger fires at.
    pub fire_at: String,
    pub status: TriggerStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Register a new pending trigger; returns its id.
pub fn register(
    conn: &Connection,
    announcement_id: &AnnouncementId,
    fire_at: DateTime<Utc>,
) -> Result<String> {
    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    conn.execute(
        "INSERT INTO triggers (id, announcement_id, fire_at, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, 'pending', ?4, ?4)",
        rusqlite::params![id, announcement_id.as_str(), fire_at.to_rfc3339(), now],
    )?;
    Ok(id)
}

/// Revoke a live trigger. Errors when no pending trigger carries `job_id` —
/// a revoke of an unknown or already-consumed trigger is a state bug.
pub fn revoke(conn: &Connection, job_id: &str) -> Result<()> {
    let now = Utc::now().to_rfc3339();
    let n = conn.execute(
        "UPDATE triggers SET status = 'revoked', updated_at = ?1
         WHERE id = ?2 AND status = 'pending'",
        rusqlite::params![now, job_id],
    )?;
    if n == 0 {
        return Err(SchedulerError::TriggerNotFound {
            job_id: job_id.to_string(),
        });
    }
    Ok(())
}

/// Number of pending triggers referencing one announcement. The scheduling
/// API keeps this at most 1.
pub fn live_count(conn: &Connection, announcement_id: &AnnouncementId) -> Result<u32> {
    let count = conn.query_row(
        "SELECT COUNT(*) FROM triggers
         WHERE announcement_id = ?1 AND status = 'pending'",
        [announcement_id.as_str()],
        |row| row.get(0),
    )?;
    Ok(count)
}

/// Pending triggers whose fire_at has arrived, oldest first.
pub fn due(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<(String, AnnouncementId)>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, announcement_id FROM triggers
         WHERE status = 'pending' AND fire_at <= ?1
         ORDER BY fire_at",
    )?;
    let rows = stmt
        .query_map([now.to_rfc3339()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?.into()))
        })?
        .collect::<rusqlite::Result<Vec<(String, AnnouncementId)>>>()?;
    Ok(rows)
}

/// Mark a trigger consumed.
pub fn mark_fired(conn: &Connection, trigger_id: &str) -> Result<()> {
    conn.execute(
        "UPDATE triggers SET status = 'fired', updated_at = ?1 WHERE id = ?2",
        rusqlite::params![Utc::now().to_rfc3339(), trigger_id],
    )?;
    Ok(())
}

/// Load one trigger, mostly for inspection and tests.
pub fn get(conn: &Connection, trigger_id: &str) -> Result<Option<Trigger>> {
    let mut stmt = conn.prepare_cached(
        "SELECT id, announcement_id, fire_at, status, created_at, updated_at
         FROM triggers WHERE id = ?1",
    )?;
    match stmt.query_row([trigger_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
            row.get::<_, String>(5)?,
        ))
    }) {
        Ok((id, announcement_id, fire_at, status, created_at, updated_at)) => {
            let status: TriggerStatus = status
                .parse()
                .map_err(|e: String| rusqlite::Error::InvalidParameterName(e))?;
            Ok(Some(Trigger {
                id,
                announcement_id: announcement_id.into(),
                fire_at,
                status,
                created_at,
                updated_at,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}
