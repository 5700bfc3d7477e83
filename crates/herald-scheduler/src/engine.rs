use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use herald_core::AnnouncementId;
use herald_store::{sql, AnnouncementPatch};
use rusqlite::Connection;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::queue;

/// Polls the trigger queue and forwards due announcement ids to the
/// orchestrator worker.
///
/// Firing is transactional: channel capacity is reserved first, then the
/// trigger flips to `fired` and the announcement's `job_id` is cleared in one
/// unit, and the id goes out on the reserved slot. A full channel leaves the
/// trigger pending so a later tick retries — a due trigger is never consumed
/// without a forwarded invocation. The consumer re-reads all state, so a
/// fired id whose announcement was deleted in the meantime is simply a no-op
/// downstream.
pub struct SchedulerEngine {
    db: Arc<Mutex<Connection>>,
    fired_tx: mpsc::Sender<AnnouncementId>,
    poll_interval: Duration,
}

impl SchedulerEngine {
    pub fn new(
        db: Arc<Mutex<Connection>>,
        fired_tx: mpsc::Sender<AnnouncementId>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            db,
            fired_tx,
            poll_interval,
        }
    }

    /// Main event loop. Polls until `shutdown` broadcasts `true`.
    ///
    /// Past-due pending triggers found after a restart fire on the first
    /// tick — a late announcement still goes out (at-least-once).
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval = ?self.poll_interval, "scheduler engine started");
        let mut interval = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick() {
                        error!("scheduler tick error: {e}");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("scheduler engine shutting down");
                        break;
                    }
                }
            }
        }
    }

    /// Process all triggers whose fire_at has arrived.
    pub fn tick(&self) -> Result<()> {
        let now = Utc::now();
        let forwards = {
            let mut conn = self.db.lock().unwrap();
            let tx = conn.transaction()?;
            let due = queue::due(&tx, now)?;
            let mut forwards = Vec::with_capacity(due.len());
            for (trigger_id, announcement_id) in due {
                // Reserve channel capacity before consuming the trigger. A
                // full (or closed) channel leaves it pending, and the next
                // tick retries; never blocks the loop.
                let Ok(permit) = self.fired_tx.try_reserve() else {
                    warn!(
                        announcement_id = %announcement_id,
                        "orchestrator channel full or closed — trigger stays pending"
                    );
                    break;
                };
                queue::mark_fired(&tx, &trigger_id)?;
                // The job is consumed: a fired trigger is never re-registered.
                sql::update(
                    &tx,
                    &announcement_id,
                    &AnnouncementPatch {
                        job_id: Some(None),
                        ..Default::default()
                    },
                )?;
                info!(announcement_id = %announcement_id, trigger_id = %trigger_id, "trigger fired");
                forwards.push((permit, announcement_id));
            }
            tx.commit()?;
            forwards
        };

        // An error before the commit drops the permits and releases the
        // reserved slots; the triggers roll back to pending.
        for (permit, announcement_id) in forwards {
            permit.send(announcement_id);
        }
        Ok(())
    }
}
