//! The saga orchestrator: turns a fired announcement id into delivered
//! messages, one saga per dispatchable target.
//!
//! Invoked with the announcement id only — all state is re-read from the
//! store, so edits (or a deletion) racing the fire instant are respected.
//! Orchestration errors are recorded on the saga and never re-raised to the
//! worker; the entrypoint only errors when the control-plane database itself
//! refuses the bookkeeping writes.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use herald_core::config::DispatchConfig;
use herald_core::{AnnouncementId, ChatClient, DispatchOutcome};
use herald_store::{Announcement, AnnouncementStore, AnnouncementTarget, TargetAudience};
use herald_tenant::{audience, TenantResolver};
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::compose;
use crate::error::{Result, SagaError};
use crate::log::SagaLog;
use crate::types::{
    ComposedMessage, DeliveryAddress, DeliveryOutcome, OutcomeRecord, Saga, SagaState,
    SafetyMessageRef,
};

pub struct Orchestrator {
    store: AnnouncementStore,
    sagas: SagaLog,
    tenants: TenantResolver,
    chat: Arc<dyn ChatClient>,
    cfg: DispatchConfig,
}

impl Orchestrator {
    pub fn new(
        store: AnnouncementStore,
        sagas: SagaLog,
        tenants: TenantResolver,
        chat: Arc<dyn ChatClient>,
        cfg: DispatchConfig,
    ) -> Self {
        Self {
            store,
            sagas,
            tenants,
            chat,
            cfg,
        }
    }

    /// Queue-triggered entrypoint.
    ///
    /// Re-checks the announcement before any audience work: a revocation that
    /// lost the race against the fire instant shows up here as a missing (or
    /// re-drafted) record, and the invocation exits without resolving anyone.
    #[instrument(skip(self), fields(announcement_id = %announcement_id))]
    pub async fn on_trigger(&self, announcement_id: &AnnouncementId) -> Result<()> {
        let Some(announcement) = self.store.find_by_id(announcement_id)? else {
            info!("announcement gone at fire time — nothing to dispatch");
            return Ok(());
        };
        if announcement.draft {
            info!("announcement re-drafted before fire time — nothing to dispatch");
            return Ok(());
        }
        // The engine clears job_id in the same transaction that consumes the
        // trigger, so a live job_id here means a reschedule slipped in between
        // the tick and this invocation. Defer to the new trigger.
        if announcement.job_id.is_some() {
            info!("announcement rescheduled before dispatch — deferring to the live trigger");
            return Ok(());
        }

        for target in &announcement.data {
            if !target.audience.is_dispatchable() {
                warn!(platform = %target.platform, "unclassified target skipped");
                continue;
            }
            let mut saga = self.sagas.create(announcement_id)?;
            if let Err(e) = self.run_target(&mut saga, &announcement, target).await {
                // Anything that escapes a step here is non-transient: the
                // per-unit retry loop already absorbed transient failures.
                self.sagas.fail(&mut saga, e.to_string())?;
            }
        }
        Ok(())
    }

    /// Resume a saga that was interrupted mid-dispatch (operator remediation
    /// after a crash). Recipients that already have a recorded outcome are
    /// skipped, keeping each send at-most-once per saga instance.
    pub async fn resume_dispatch(&self, saga_id: &str) -> Result<()> {
        let mut saga = self.sagas.get(saga_id)?;
        let messages = match &saga.state {
            SagaState::Dispatching { messages, .. } => messages.clone(),
            other => {
                return Err(SagaError::IllegalTransition {
                    from: other.step_name().into(),
                    to: "dispatching".into(),
                })
            }
        };
        let outcomes = self.dispatch_all(&mut saga, messages).await?;
        info!(saga_id = %saga.id, total = outcomes.len(), "resumed dispatch complete");
        self.sagas.advance(&mut saga, SagaState::Done { outcomes })?;
        Ok(())
    }

    /// Drive one target's saga from `Started` to a terminal state.
    async fn run_target(
        &self,
        saga: &mut Saga,
        announcement: &Announcement,
        target: &AnnouncementTarget,
    ) -> Result<()> {
        // Step 1: resolve the audience into concrete delivery addresses.
        let (deliveries, safety) = self.resolve_audience(target).await?;
        info!(
            saga_id = %saga.id,
            announcement_id = %announcement.id,
            deliveries = deliveries.len(),
            "audience resolved"
        );
        self.sagas.advance(
            saga,
            SagaState::AudienceResolved {
                deliveries: deliveries.clone(),
                safety: safety.clone(),
            },
        )?;

        // Step 2: render one message per address.
        let link = safety
            .as_ref()
            .map(|r| self.chat.message_link(&r.guild_id, &r.channel_id, &r.message_id));
        let messages: Vec<ComposedMessage> = deliveries
            .into_iter()
            .map(|address| {
                let text = match &address {
                    DeliveryAddress::Channel { .. } => target.template.clone(),
                    DeliveryAddress::User { discord_id } => compose::compose_private(
                        &target.template,
                        &self.chat.mention(discord_id),
                        link.as_deref(),
                    ),
                };
                ComposedMessage { address, text }
            })
            .collect();
        self.sagas.advance(
            saga,
            SagaState::MessagesComposed {
                messages: messages.clone(),
            },
        )?;

        // Step 3: dispatch, bounded concurrency, per-wave persistence.
        self.sagas.advance(
            saga,
            SagaState::Dispatching {
                messages: messages.clone(),
                outcomes: Vec::new(),
            },
        )?;
        let outcomes = self.dispatch_all(saga, messages).await?;

        // Step 4: the full per-recipient outcome list is on record — done.
        let delivered = outcomes.iter().filter(|o| o.is_delivered()).count();
        info!(
            saga_id = %saga.id,
            delivered,
            failed = outcomes.len() - delivered,
            "dispatch complete"
        );
        self.sagas.advance(saga, SagaState::Done { outcomes })?;
        Ok(())
    }

    /// Resolve one target into delivery addresses, posting the safety notice
    /// for private fan-outs that configured a safety channel.
    async fn resolve_audience(
        &self,
        target: &AnnouncementTarget,
    ) -> Result<(Vec<DeliveryAddress>, Option<SafetyMessageRef>)> {
        match &target.audience {
            TargetAudience::PublicFanout { channel_ids } => {
                // Each channel id is a direct delivery address; no tenant
                // query needed.
                let deliveries = channel_ids
                    .iter()
                    .map(|channel_id| DeliveryAddress::Channel {
                        channel_id: channel_id.clone(),
                    })
                    .collect();
                Ok((deliveries, None))
            }

            TargetAudience::PrivateFanout {
                user_ids,
                role_ids,
                cohorts,
                safety_channel_id,
            } => {
                // Handle is scoped to this block: dropped (and the tenant
                // connection closed) before any network send happens.
                let (recipients, guild_id) = {
                    let handle = self.tenants.resolve(&target.platform)?;
                    // Union of the three selector paths, deduplicated.
                    // BTreeSet keeps dispatch order stable for the audit log.
                    let mut ids: BTreeSet<String> = user_ids.iter().cloned().collect();
                    ids.extend(audience::resolve_roles(&handle, role_ids)?);
                    ids.extend(audience::resolve_cohorts(&handle, cohorts)?);
                    (ids, handle.guild_id().to_string())
                };

                let safety = match safety_channel_id {
                    Some(channel_id) if !recipients.is_empty() => {
                        self.post_safety_notice(&guild_id, channel_id).await?
                    }
                    _ => None,
                };

                let deliveries = recipients
                    .into_iter()
                    .map(|discord_id| DeliveryAddress::User { discord_id })
                    .collect();
                Ok((deliveries, safety))
            }

            TargetAudience::Unclassified => Ok((Vec::new(), None)),
        }
    }

    /// Post the verification notice and capture its platform ids for the
    /// deep link. A notice the platform rejects is unrecoverable for this
    /// saga: the DMs would go out unverifiable.
    async fn post_safety_notice(
        &self,
        guild_id: &str,
        channel_id: &str,
    ) -> Result<Option<SafetyMessageRef>> {
        let (outcome, _attempts) = self
            .send_with_retry(&DeliveryAddress::Channel {
                channel_id: channel_id.to_string(),
            }, compose::SAFETY_CHANNEL_NOTICE)
            .await;
        match outcome {
            DispatchOutcome::Delivered { message_id } => Ok(message_id.map(|message_id| {
                SafetyMessageRef {
                    guild_id: guild_id.to_string(),
                    channel_id: channel_id.to_string(),
                    message_id,
                }
            })),
            DispatchOutcome::Permanent { reason } | DispatchOutcome::Transient { reason } => {
                Err(SagaError::SafetyNotice { reason })
            }
        }
    }

    /// Dispatch every message, `max_in_flight` at a time, persisting the
    /// accumulated outcomes after each wave. Recipients that already have an
    /// outcome recorded (a resumed saga) are skipped.
    async fn dispatch_all(
        &self,
        saga: &mut Saga,
        messages: Vec<ComposedMessage>,
    ) -> Result<Vec<OutcomeRecord>> {
        let mut outcomes: Vec<OutcomeRecord> = match &saga.state {
            SagaState::Dispatching { outcomes, .. } => outcomes.clone(),
            _ => Vec::new(),
        };
        let pending: Vec<ComposedMessage> = messages
            .iter()
            .filter(|m| !outcomes.iter().any(|o| o.address == m.address))
            .cloned()
            .collect();

        for wave in pending.chunks(self.cfg.max_in_flight.max(1)) {
            let sends = wave.iter().map(|m| self.dispatch_unit(m));
            outcomes.extend(join_all(sends).await);
            self.sagas.advance(
                saga,
                SagaState::Dispatching {
                    messages: messages.clone(),
                    outcomes: outcomes.clone(),
                },
            )?;
        }
        Ok(outcomes)
    }

    /// Send one unit to terminal outcome. Transient failures retry with
    /// exponential backoff; at the attempt ceiling they are reclassified as
    /// permanent. A permanent failure is a recorded outcome, not an error.
    async fn dispatch_unit(&self, message: &ComposedMessage) -> OutcomeRecord {
        let (outcome, attempts) = self.send_with_retry(&message.address, &message.text).await;
        let outcome = match outcome {
            DispatchOutcome::Delivered { message_id } => DeliveryOutcome::Delivered { message_id },
            DispatchOutcome::Permanent { reason } => DeliveryOutcome::PermanentFailure { reason },
            DispatchOutcome::Transient { reason } => DeliveryOutcome::PermanentFailure {
                reason: format!("still transient after {attempts} attempts: {reason}"),
            },
        };
        OutcomeRecord {
            address: message.address.clone(),
            outcome,
            attempts,
        }
    }

    async fn send_with_retry(
        &self,
        address: &DeliveryAddress,
        text: &str,
    ) -> (DispatchOutcome, u32) {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let outcome = match address {
                DeliveryAddress::Channel { channel_id } => {
                    self.chat.send_channel_message(channel_id, text).await
                }
                DeliveryAddress::User { discord_id } => {
                    self.chat.send_direct_message(discord_id, text).await
                }
            };
            match outcome {
                DispatchOutcome::Transient { ref reason } if attempts < self.cfg.max_attempts => {
                    let delay = self
                        .cfg
                        .backoff_base_ms
                        .saturating_mul(1u64 << (attempts - 1).min(16));
                    warn!(?address, %reason, attempt = attempts, delay_ms = delay, "transient send failure, backing off");
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                }
                outcome => return (outcome, attempts),
            }
        }
    }
}

/// Worker entrypoint: consumes fired announcement ids and runs each
/// orchestration as its own task, so one large audience never delays the
/// next trigger.
pub async fn run_worker(
    orchestrator: Arc<Orchestrator>,
    mut fired_rx: mpsc::Receiver<AnnouncementId>,
) {
    while let Some(announcement_id) = fired_rx.recv().await {
        let orchestrator = orchestrator.clone();
        tokio::spawn(async move {
            if let Err(e) = orchestrator.on_trigger(&announcement_id).await {
                error!(announcement_id = %announcement_id, "orchestration bookkeeping failed: {e}");
            }
        });
    }
    info!("orchestrator worker exiting (channel closed)");
}
