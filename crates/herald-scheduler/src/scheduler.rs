//! Request-facing scheduling operations.
//!
//! Every operation that touches both the announcement record and the trigger
//! queue runs inside one SQLite transaction on the shared control-plane
//! connection. Rollback on any failure is automatic (dropping an uncommitted
//! `Transaction` rolls back), so a half-applied schedule never survives.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use herald_core::AnnouncementId;
use herald_store::{sql, Announcement, AnnouncementPatch, AnnouncementStore, NewAnnouncement};
use rusqlite::Connection;
use tracing::{info, instrument};

use crate::error::{Result, SchedulerError};
use crate::queue;

pub struct Scheduler {
    db: Arc<Mutex<Connection>>,
}

impl Scheduler {
    /// Wrap the shared (already `init_db`-initialised) control-plane
    /// connection. Clone the same `Arc` into [`AnnouncementStore`] so both
    /// layers see one serialised view of the database.
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Create a scheduled announcement: insert the record, register its
    /// trigger, and persist the `job_id` — atomically.
    #[instrument(skip(self, new), fields(community = %new.community_id))]
    pub fn schedule_create(&self, new: NewAnnouncement) -> Result<Announcement> {
        if new.draft {
            return Err(SchedulerError::DraftNotSchedulable);
        }
        let announcement = AnnouncementStore::build(new);
        let fire_at = require_future(&announcement.id, announcement.scheduled_at)?;

        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        sql::insert(&tx, &announcement)?;
        let job_id = queue::register(&tx, &announcement.id, fire_at)?;
        let updated = sql::update(
            &tx,
            &announcement.id,
            &AnnouncementPatch {
                job_id: Some(Some(job_id.clone())),
                ..Default::default()
            },
        )?
        .ok_or_else(|| SchedulerError::AnnouncementNotFound {
            id: announcement.id.to_string(),
        })?;
        tx.commit()?;

        info!(announcement_id = %updated.id, %job_id, fire_at = %fire_at, "announcement scheduled");
        Ok(updated)
    }

    /// Apply `patch`; when it carries a new `scheduled_at`, revoke the old
    /// trigger (if any) and register a replacement in the same transaction,
    /// so at most one live trigger ever references the announcement.
    #[instrument(skip(self, patch), fields(announcement_id = %id))]
    pub fn schedule_update(
        &self,
        id: &AnnouncementId,
        patch: AnnouncementPatch,
    ) -> Result<Announcement> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let existing = sql::get(&tx, id)?.ok_or_else(|| SchedulerError::AnnouncementNotFound {
            id: id.to_string(),
        })?;

        let mut patch = patch;
        match patch.scheduled_at {
            Some(Some(new_at)) => {
                // Drafts never carry a trigger; a reschedule must un-draft in
                // the same patch or fail.
                if patch.draft.unwrap_or(existing.draft) {
                    return Err(SchedulerError::DraftNotSchedulable);
                }
                let fire_at = require_future(id, Some(new_at))?;
                if let Some(ref old_job) = existing.job_id {
                    queue::revoke(&tx, old_job)?;
                }
                let job_id = queue::register(&tx, id, fire_at)?;
                info!(announcement_id = %id, %job_id, "trigger replaced");
                patch.job_id = Some(Some(job_id));
            }
            Some(None) => {
                // Clearing the schedule goes through `schedule_remove`; a
                // null reschedule here is a caller bug.
                return Err(SchedulerError::MissingScheduledAt { id: id.to_string() });
            }
            None => {}
        }

        let updated =
            sql::update(&tx, id, &patch)?.ok_or_else(|| SchedulerError::AnnouncementNotFound {
                id: id.to_string(),
            })?;
        tx.commit()?;
        Ok(updated)
    }

    /// Clear the announcement's `job_id` and revoke its queue trigger.
    /// Fails with `JobAssociationMissing` when no job is registered — by
    /// design not idempotent, since that signals inconsistent state upstream.
    #[instrument(skip(self, patch), fields(announcement_id = %id))]
    pub fn schedule_remove(
        &self,
        id: &AnnouncementId,
        patch: AnnouncementPatch,
    ) -> Result<Announcement> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let existing = sql::get(&tx, id)?.ok_or_else(|| SchedulerError::AnnouncementNotFound {
            id: id.to_string(),
        })?;
        let job_id = existing
            .job_id
            .ok_or_else(|| SchedulerError::JobAssociationMissing { id: id.to_string() })?;

        queue::revoke(&tx, &job_id)?;
        let mut patch = patch;
        patch.job_id = Some(None);
        let updated =
            sql::update(&tx, id, &patch)?.ok_or_else(|| SchedulerError::AnnouncementNotFound {
                id: id.to_string(),
            })?;
        tx.commit()?;

        info!(announcement_id = %id, %job_id, "trigger revoked, job cleared");
        Ok(updated)
    }

    /// Inverse of [`schedule_remove`](Self::schedule_remove): register a
    /// trigger for an announcement that currently has none. Fails with
    /// `JobAlreadyExists` when one is present.
    #[instrument(skip(self, patch), fields(announcement_id = %id))]
    pub fn schedule_add(
        &self,
        id: &AnnouncementId,
        patch: AnnouncementPatch,
    ) -> Result<Announcement> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let existing = sql::get(&tx, id)?.ok_or_else(|| SchedulerError::AnnouncementNotFound {
            id: id.to_string(),
        })?;
        if let Some(job_id) = existing.job_id {
            return Err(SchedulerError::JobAlreadyExists {
                id: id.to_string(),
                job_id,
            });
        }
        if patch.draft.unwrap_or(existing.draft) {
            return Err(SchedulerError::DraftNotSchedulable);
        }

        // New time from the patch when present, else the stored one.
        let scheduled_at = patch
            .scheduled_at
            .unwrap_or(existing.scheduled_at)
            .ok_or_else(|| SchedulerError::MissingScheduledAt { id: id.to_string() })?;
        let fire_at = require_future(id, Some(scheduled_at))?;

        let job_id = queue::register(&tx, id, fire_at)?;
        let mut patch = patch;
        patch.job_id = Some(Some(job_id.clone()));
        let updated =
            sql::update(&tx, id, &patch)?.ok_or_else(|| SchedulerError::AnnouncementNotFound {
                id: id.to_string(),
            })?;
        tx.commit()?;

        info!(announcement_id = %id, %job_id, "trigger added");
        Ok(updated)
    }

    /// Hard-delete the record, revoking its live trigger in the same
    /// transaction. Returns the removed record, or `None` for a missing id.
    #[instrument(skip(self), fields(announcement_id = %id))]
    pub fn delete(&self, id: &AnnouncementId) -> Result<Option<Announcement>> {
        let mut conn = self.db.lock().unwrap();
        let tx = conn.transaction()?;
        let Some(removed) = sql::delete(&tx, id)? else {
            return Ok(None);
        };
        if let Some(ref job_id) = removed.job_id {
            queue::revoke(&tx, job_id)?;
        }
        tx.commit()?;

        info!(announcement_id = %id, "announcement deleted");
        Ok(Some(removed))
    }

    /// Pending triggers referencing `id` (the invariant keeps this ≤ 1).
    pub fn live_trigger_count(&self, id: &AnnouncementId) -> Result<u32> {
        let conn = self.db.lock().unwrap();
        queue::live_count(&conn, id)
    }
}

fn require_future(
    id: &AnnouncementId,
    scheduled_at: Option<DateTime<Utc>>,
) -> Result<DateTime<Utc>> {
    let at = scheduled_at.ok_or_else(|| SchedulerError::MissingScheduledAt {
        id: id.to_string(),
    })?;
    if at <= Utc::now() {
        return Err(SchedulerError::ScheduleInPast {
            scheduled_at: at.to_rfc3339(),
        });
    }
    Ok(at)
}
