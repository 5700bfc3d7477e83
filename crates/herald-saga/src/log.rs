use std::sync::{Arc, Mutex};

use chrono::Utc;
use herald_core::AnnouncementId;
use rusqlite::Connection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{Result, SagaError};
use crate::types::{Saga, SagaState};

/// Thread-safe persistence for saga instances.
///
/// Lives in the control-plane database next to announcements and triggers.
pub struct SagaLog {
    db: Arc<Mutex<Connection>>,
}

impl SagaLog {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    /// Create a new saga at `Started` for one announcement target's dispatch.
    pub fn create(&self, announcement_id: &AnnouncementId) -> Result<Saga> {
        let now = Utc::now().to_rfc3339();
        let saga = Saga {
            id: Uuid::new_v4().to_string(),
            announcement_id: announcement_id.clone(),
            state: SagaState::Started,
            created_at: now.clone(),
            updated_at: now,
        };
        let state_json = serde_json::to_string(&saga.state)?;

        let db = self.db.lock().unwrap();
        db.execute(
            "INSERT INTO sagas (id, announcement_id, step, state, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            rusqlite::params![
                saga.id,
                saga.announcement_id.as_str(),
                saga.state.step_name(),
                state_json,
                saga.created_at,
            ],
        )?;
        debug!(saga_id = %saga.id, announcement_id = %announcement_id, "saga created");
        Ok(saga)
    }

    /// Advance `saga` to `next`, enforcing step order, and persist.
    pub fn advance(&self, saga: &mut Saga, next: SagaState) -> Result<()> {
        if !saga.state.can_advance_to(&next) {
            return Err(SagaError::IllegalTransition {
                from: saga.state.step_name().into(),
                to: next.step_name().into(),
            });
        }
        saga.state = next;
        saga.updated_at = Utc::now().to_rfc3339();
        self.persist(saga)
    }

    /// Move `saga` to `Failed`, recording the step it was in and the error.
    /// Inspectable afterwards; never retried automatically.
    pub fn fail(&self, saga: &mut Saga, error: impl Into<String>) -> Result<()> {
        let error = error.into();
        warn!(saga_id = %saga.id, step = saga.state.step_name(), %error, "saga failed");
        let failed = SagaState::Failed {
            step: saga.state.step_name().into(),
            error,
        };
        self.advance(saga, failed)
    }

    pub fn get(&self, id: &str) -> Result<Saga> {
        let db = self.db.lock().unwrap();
        let row = db.query_row(
            "SELECT id, announcement_id, state, created_at, updated_at
             FROM sagas WHERE id = ?1",
            [id],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, String>(4)?,
                ))
            },
        );
        match row {
            Ok((id, announcement_id, state_json, created_at, updated_at)) => Ok(Saga {
                id,
                announcement_id: announcement_id.into(),
                state: serde_json::from_str(&state_json)?,
                created_at,
                updated_at,
            }),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(SagaError::NotFound { id: id.to_string() })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// All sagas spawned for one announcement, oldest first.
    pub fn list_for_announcement(&self, announcement_id: &AnnouncementId) -> Result<Vec<Saga>> {
        let db = self.db.lock().unwrap();
        let mut stmt = db.prepare_cached(
            "SELECT id, announcement_id, state, created_at, updated_at
             FROM sagas WHERE announcement_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map([announcement_id.as_str()], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
            ))
        })?;
        // This is the audit record: an unreadable row is an error, not a gap.
        let mut sagas = Vec::new();
        for row in rows {
            let (id, announcement_id, state_json, created_at, updated_at) = row?;
            sagas.push(Saga {
                id,
                announcement_id: announcement_id.into(),
                state: serde_json::from_str(&state_json)?,
                created_at,
                updated_at,
            });
        }
        Ok(sagas)
    }

    fn persist(&self, saga: &Saga) -> Result<()> {
        let state_json = serde_json::to_string(&saga.state)?;
        let db = self.db.lock().unwrap();
        db.execute(
            "UPDATE sagas SET step = ?1, state = ?2, updated_at = ?3 WHERE id = ?4",
            rusqlite::params![saga.state.step_name(), state_json, saga.updated_at, saga.id],
        )?;
        Ok(())
    }
}
