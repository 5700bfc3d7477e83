//! Read-only recipient queries against one tenant's datastore.
//!
//! All functions accept empty input and return empty output — an audience
//! that matches nobody is valid, the dispatch step just becomes a no-op.
//! Role and cohort resolution return raw discord ids; profile lookup (when
//! needed at all) happens downstream.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::resolver::TenantHandle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub channel_id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberInfo {
    pub discord_id: String,
    pub username: String,
}

/// Look up channel metadata for the given ids. Unknown ids are skipped.
pub fn resolve_channels(handle: &TenantHandle, channel_ids: &[String]) -> Result<Vec<ChannelInfo>> {
    if channel_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = handle
        .conn()
        .prepare_cached("SELECT channel_id, name FROM channels WHERE channel_id = ?1")?;
    let mut out = Vec::with_capacity(channel_ids.len());
    for id in channel_ids {
        let row = stmt.query_row([id], |row| {
            Ok(ChannelInfo {
                channel_id: row.get(0)?,
                name: row.get(1)?,
            })
        });
        match row {
            Ok(info) => out.push(info),
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

/// Look up member profiles for the given discord ids. Unknown ids are skipped.
pub fn resolve_users(handle: &TenantHandle, user_ids: &[String]) -> Result<Vec<MemberInfo>> {
    if user_ids.is_empty() {
        return Ok(Vec::new());
    }
    let mut stmt = handle
        .conn()
        .prepare_cached("SELECT discord_id, username FROM members WHERE discord_id = ?1")?;
    let mut out = Vec::with_capacity(user_ids.len());
    for id in user_ids {
        let row = stmt.query_row([id], |row| {
            Ok(MemberInfo {
                discord_id: row.get(0)?,
                username: row.get(1)?,
            })
        });
        match row {
            Ok(info) => out.push(info),
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }
    }
    Ok(out)
}

/// Discord ids of every member holding any of the given roles.
pub fn resolve_roles(handle: &TenantHandle, role_ids: &[String]) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();
    if role_ids.is_empty() {
        return Ok(ids);
    }
    let mut stmt = handle
        .conn()
        .prepare_cached("SELECT discord_id FROM member_roles WHERE role_id = ?1")?;
    for role in role_ids {
        let rows = stmt.query_map([role], |row| row.get::<_, String>(0))?;
        for id in rows {
            ids.insert(id?);
        }
    }
    Ok(ids)
}

/// Discord ids of every member in any of the given engagement categories,
/// read from the latest activity snapshot only.
pub fn resolve_cohorts(handle: &TenantHandle, cohorts: &[String]) -> Result<HashSet<String>> {
    let mut ids = HashSet::new();
    if cohorts.is_empty() {
        return Ok(ids);
    }

    // Latest snapshot date; no snapshots means no cohort members.
    let latest: Option<String> = handle
        .conn()
        .query_row("SELECT MAX(date) FROM member_activity", [], |row| row.get(0))?;
    let Some(latest) = latest else {
        return Ok(ids);
    };

    let mut stmt = handle.conn().prepare_cached(
        "SELECT discord_id FROM member_activity WHERE date = ?1 AND category = ?2",
    )?;
    for cohort in cohorts {
        let rows = stmt.query_map([&latest, cohort], |row| row.get::<_, String>(0))?;
        for id in rows {
            ids.insert(id?);
        }
    }
    Ok(ids)
}
