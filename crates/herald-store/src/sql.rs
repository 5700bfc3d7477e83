//! Row-level operations over a borrowed `Connection`.
//!
//! These run equally well inside a caller-owned transaction (the scheduler
//! wraps them together with trigger registration) or under the
//! [`AnnouncementStore`](crate::store::AnnouncementStore) mutex.

use chrono::Utc;
use herald_core::AnnouncementId;
use rusqlite::{Connection, Row};
use tracing::warn;

use crate::error::Result;
use crate::types::{Announcement, AnnouncementPatch, AnnouncementTarget};

const COLUMNS: &str =
    "id, community_id, draft, scheduled_at, job_id, data, created_at, updated_at";

pub fn insert(conn: &Connection, announcement: &Announcement) -> Result<()> {
    let data_json = serde_json::to_string(&announcement.data)?;
    conn.execute(
        "INSERT INTO announcements
         (id, community_id, draft, scheduled_at, job_id, data, created_at, updated_at)
         VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
        rusqlite::params![
            announcement.id.as_str(),
            announcement.community_id,
            announcement.draft as i64,
            announcement.scheduled_at.map(|dt| dt.to_rfc3339()),
            announcement.job_id,
            data_json,
            announcement.created_at,
            announcement.updated_at,
        ],
    )?;
    Ok(())
}

pub fn get(conn: &Connection, id: &AnnouncementId) -> Result<Option<Announcement>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM announcements WHERE id = ?1"
    ))?;
    match stmt.query_row([id.as_str()], row_to_announcement) {
        Ok(a) => Ok(Some(a?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read-modify-write under the caller's lock/transaction. Returns the
/// updated record, or `None` when the id does not exist.
pub fn update(
    conn: &Connection,
    id: &AnnouncementId,
    patch: &AnnouncementPatch,
) -> Result<Option<Announcement>> {
    let Some(mut announcement) = get(conn, id)? else {
        return Ok(None);
    };

    if let Some(draft) = patch.draft {
        announcement.draft = draft;
    }
    if let Some(scheduled_at) = patch.scheduled_at {
        announcement.scheduled_at = scheduled_at;
    }
    if let Some(ref job_id) = patch.job_id {
        announcement.job_id = job_id.clone();
    }
    if let Some(ref data) = patch.data {
        announcement.data = data.clone();
    }
    announcement.updated_at = Utc::now().to_rfc3339();

    let data_json = serde_json::to_string(&announcement.data)?;
    conn.execute(
        "UPDATE announcements
         SET community_id=?1, draft=?2, scheduled_at=?3, job_id=?4, data=?5, updated_at=?6
         WHERE id=?7",
        rusqlite::params![
            announcement.community_id,
            announcement.draft as i64,
            announcement.scheduled_at.map(|dt| dt.to_rfc3339()),
            announcement.job_id,
            data_json,
            announcement.updated_at,
            announcement.id.as_str(),
        ],
    )?;
    Ok(Some(announcement))
}

/// Delete the record, returning it so callers can inspect the `job_id` that
/// may still reference a live trigger.
pub fn delete(conn: &Connection, id: &AnnouncementId) -> Result<Option<Announcement>> {
    let existing = get(conn, id)?;
    if existing.is_some() {
        conn.execute("DELETE FROM announcements WHERE id = ?1", [id.as_str()])?;
    }
    Ok(existing)
}

pub fn list_for_community(conn: &Connection, community_id: &str) -> Result<Vec<Announcement>> {
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT {COLUMNS} FROM announcements
         WHERE community_id = ?1 ORDER BY created_at DESC"
    ))?;
    let mut rows = Vec::new();
    for row in stmt.query_map([community_id], row_to_announcement)? {
        match row? {
            Ok(a) => rows.push(a),
            // Display listing: skip the unreadable row but leave a trace.
            Err(e) => warn!(%community_id, "skipping unreadable announcement row: {e}"),
        }
    }
    Ok(rows)
}

/// Map a row into an `Announcement`. The inner `Result` carries JSON / date
/// parse failures so rusqlite's own error type stays untouched.
fn row_to_announcement(row: &Row<'_>) -> rusqlite::Result<Result<Announcement>> {
    let id: String = row.get(0)?;
    let community_id: String = row.get(1)?;
    let draft: i64 = row.get(2)?;
    let scheduled_at: Option<String> = row.get(3)?;
    let job_id: Option<String> = row.get(4)?;
    let data_json: String = row.get(5)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(parse_announcement(
        id,
        community_id,
        draft != 0,
        scheduled_at,
        job_id,
        data_json,
        created_at,
        updated_at,
    ))
}

#[allow(clippy::too_many_arguments)]
fn parse_announcement(
    id: String,
    community_id: String,
    draft: bool,
    scheduled_at: Option<String>,
    job_id: Option<String>,
    data_json: String,
    created_at: String,
    updated_at: String,
) -> Result<Announcement> {
    let data: Vec<AnnouncementTarget> = serde_json::from_str(&data_json)?;
    let scheduled_at = scheduled_at
        .map(|s| {
            chrono::DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    crate::error::StoreError::Serialization(serde::de::Error::custom(e))
                })
        })
        .transpose()?;

    Ok(Announcement {
        id: id.into(),
        community_id,
        draft,
        scheduled_at,
        job_id,
        data,
        created_at,
        updated_at,
    })
}
