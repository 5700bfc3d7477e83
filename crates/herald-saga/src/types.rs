use herald_core::AnnouncementId;
use serde::{Deserialize, Serialize};

/// Where one dispatch unit goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum DeliveryAddress {
    /// Public send into a channel.
    Channel { channel_id: String },
    /// Private send (direct message) to an external user id.
    User { discord_id: String },
}

/// A fully rendered message bound to its address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComposedMessage {
    pub address: DeliveryAddress,
    pub text: String,
}

/// Platform ids of the posted safety verification notice; the deep link in
/// every private message is built from these three.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SafetyMessageRef {
    pub guild_id: String,
    pub channel_id: String,
    pub message_id: String,
}

/// Terminal outcome of one dispatch unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum DeliveryOutcome {
    Delivered {
        #[serde(default)]
        message_id: Option<String>,
    },
    /// Recorded per recipient; never fails the saga.
    PermanentFailure { reason: String },
}

/// Audit record for one dispatch unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OutcomeRecord {
    pub address: DeliveryAddress,
    pub outcome: DeliveryOutcome,
    /// Send attempts made, including the final one.
    pub attempts: u32,
}

impl OutcomeRecord {
    pub fn is_delivered(&self) -> bool {
        matches!(self.outcome, DeliveryOutcome::Delivered { .. })
    }
}

/// The saga state machine. Each variant carries exactly the data its step
/// produced; unknown extra fields in persisted payloads are rejected on load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case", deny_unknown_fields)]
pub enum SagaState {
    Started,
    AudienceResolved {
        deliveries: Vec<DeliveryAddress>,
        #[serde(default)]
        safety: Option<SafetyMessageRef>,
    },
    MessagesComposed {
        messages: Vec<ComposedMessage>,
    },
    Dispatching {
        messages: Vec<ComposedMessage>,
        outcomes: Vec<OutcomeRecord>,
    },
    Done {
        outcomes: Vec<OutcomeRecord>,
    },
    Failed {
        /// Step the saga was in when the unrecoverable error hit.
        #[serde(rename = "failed_step")]
        step: String,
        error: String,
    },
}

impl SagaState {
    pub fn step_name(&self) -> &'static str {
        match self {
            SagaState::Started => "started",
            SagaState::AudienceResolved { .. } => "audience_resolved",
            SagaState::MessagesComposed { .. } => "messages_composed",
            SagaState::Dispatching { .. } => "dispatching",
            SagaState::Done { .. } => "done",
            SagaState::Failed { .. } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SagaState::Done { .. } | SagaState::Failed { .. })
    }

    /// Whether moving to `next` respects the step ordering. `Failed` is
    /// reachable from any non-terminal state; `Dispatching → Dispatching`
    /// persists per-wave progress.
    pub fn can_advance_to(&self, next: &SagaState) -> bool {
        use SagaState::*;
        match (self, next) {
            (_, Failed { .. }) => !self.is_terminal(),
            (Started, AudienceResolved { .. }) => true,
            (AudienceResolved { .. }, MessagesComposed { .. }) => true,
            (MessagesComposed { .. }, Dispatching { .. }) => true,
            (Dispatching { .. }, Dispatching { .. }) => true,
            (Dispatching { .. }, Done { .. }) => true,
            _ => false,
        }
    }
}

/// A persisted workflow instance, tied to one announcement target's dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Saga {
    /// UUID v4 string — primary key.
    pub id: String,
    pub announcement_id: AnnouncementId,
    pub state: SagaState,
    pub created_at: String,
    pub updated_at: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_step_order() {
        let started = SagaState::Started;
        let resolved = SagaState::AudienceResolved {
            deliveries: vec![],
            safety: None,
        };
        let composed = SagaState::MessagesComposed { messages: vec![] };
        let dispatching = SagaState::Dispatching {
            messages: vec![],
            outcomes: vec![],
        };
        let done = SagaState::Done { outcomes: vec![] };

        assert!(started.can_advance_to(&resolved));
        assert!(resolved.can_advance_to(&composed));
        assert!(composed.can_advance_to(&dispatching));
        assert!(dispatching.can_advance_to(&dispatching));
        assert!(dispatching.can_advance_to(&done));

        // No skipping, no going back.
        assert!(!started.can_advance_to(&composed));
        assert!(!done.can_advance_to(&dispatching));
        assert!(!resolved.can_advance_to(&started.clone()));
    }

    #[test]
    fn failed_is_reachable_from_non_terminal_only() {
        let failed = SagaState::Failed {
            step: "audience_resolved".into(),
            error: "boom".into(),
        };
        assert!(SagaState::Started.can_advance_to(&failed));
        assert!(!SagaState::Done { outcomes: vec![] }.can_advance_to(&failed));
        assert!(!failed.clone().can_advance_to(&failed));
    }

    #[test]
    fn state_json_rejects_unknown_fields() {
        let json = r#"{"step":"started","leftover":"data"}"#;
        assert!(serde_json::from_str::<SagaState>(json).is_err());
    }
}
