use std::sync::{Arc, Mutex};

use chrono::Utc;
use herald_core::AnnouncementId;
use rusqlite::Connection;
use tracing::{debug, instrument};

use crate::error::{Result, StoreError};
use crate::sql;
use crate::types::{Announcement, AnnouncementPatch, NewAnnouncement};

/// Thread-safe manager for persisted announcements.
///
/// Wraps the shared control-plane connection. The scheduler holds a clone of
/// the same `Arc` so its transactions cover both this table and the trigger
/// queue.
pub struct AnnouncementStore {
    db: Arc<Mutex<Connection>>,
}

impl AnnouncementStore {
    /// Wrap an already-open (and `init_db`-initialised) connection.
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Materialise a `NewAnnouncement` into a full record (id + timestamps
    /// assigned, no trigger yet).
    pub fn build(new: NewAnnouncement) -> Announcement {
        let now = Utc::now().to_rfc3339();
        Announcement {
            id: AnnouncementId::new(),
            community_id: new.community_id,
            draft: new.draft,
            scheduled_at: new.scheduled_at,
            job_id: None,
            data: new.data,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Persist a new announcement without registering any trigger.
    #[instrument(skip(self, new), fields(community = %new.community_id))]
    pub fn create(&self, new: NewAnnouncement) -> Result<Announcement> {
        let announcement = Self::build(new);
        let db = self.db.lock().unwrap();
        sql::insert(&db, &announcement)?;
        debug!(announcement_id = %announcement.id, "announcement created");
        Ok(announcement)
    }

    /// Persist a draft. Rejects input that claims not to be a draft — the
    /// scheduled path must go through the scheduler so a trigger exists.
    pub fn create_draft(&self, new: NewAnnouncement) -> Result<Announcement> {
        if !new.draft {
            return Err(StoreError::NotADraft);
        }
        self.create(new)
    }

    pub fn find_by_id(&self, id: &AnnouncementId) -> Result<Option<Announcement>> {
        let db = self.db.lock().unwrap();
        sql::get(&db, id)
    }

    /// Apply `patch` and return the updated record, or `None` for a missing id.
    #[instrument(skip(self, patch), fields(announcement_id = %id))]
    pub fn find_one_and_update(
        &self,
        id: &AnnouncementId,
        patch: &AnnouncementPatch,
    ) -> Result<Option<Announcement>> {
        let db = self.db.lock().unwrap();
        sql::update(&db, id, patch)
    }

    /// Delete the record. Trigger revocation is the scheduler's job — use
    /// `Scheduler::delete` unless the caller already knows `job_id` is null.
    pub fn remove(&self, id: &AnnouncementId) -> Result<Option<Announcement>> {
        let db = self.db.lock().unwrap();
        sql::delete(&db, id)
    }

    /// All announcements of one community, newest first.
    pub fn list(&self, community_id: &str) -> Result<Vec<Announcement>> {
        let db = self.db.lock().unwrap();
        sql::list_for_community(&db, community_id)
    }
}
