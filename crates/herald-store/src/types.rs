use chrono::{DateTime, Utc};
use herald_core::{AnnouncementId, PlatformId};
use serde::{Deserialize, Serialize};

/// Who one announcement target reaches, classified at construction time.
///
/// The classification is exclusive: a target is public (channel fan-out) or
/// private (per-user fan-out) or unclassified, never a mix. Unclassified
/// targets are kept for the operator to fix but are never dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case", deny_unknown_fields)]
pub enum TargetAudience {
    /// Post the rendered template into each listed channel.
    PublicFanout { channel_ids: Vec<String> },

    /// Direct-message every user reachable through the union of the three
    /// selectors. `safety_channel_id`, when set, names a channel that gets a
    /// verification notice whose deep link is appended to every DM.
    PrivateFanout {
        #[serde(default)]
        user_ids: Vec<String>,
        #[serde(default)]
        role_ids: Vec<String>,
        #[serde(default)]
        cohorts: Vec<String>,
        #[serde(default)]
        safety_channel_id: Option<String>,
    },

    /// No delivery selector at all — never dispatched.
    Unclassified,
}

impl TargetAudience {
    /// Classify a raw option set the way the request layer receives it.
    ///
    /// Channel ids win: a target carrying both channel ids and user selectors
    /// is public (the private selectors are ignored). A target carrying none
    /// of the selectors is unclassified.
    pub fn classify(
        channel_ids: Option<Vec<String>>,
        user_ids: Option<Vec<String>>,
        role_ids: Option<Vec<String>>,
        cohorts: Option<Vec<String>>,
        safety_channel_id: Option<String>,
    ) -> Self {
        if let Some(channel_ids) = channel_ids.filter(|c| !c.is_empty()) {
            return TargetAudience::PublicFanout { channel_ids };
        }

        let user_ids = user_ids.unwrap_or_default();
        let role_ids = role_ids.unwrap_or_default();
        let cohorts = cohorts.unwrap_or_default();

        if user_ids.is_empty() && role_ids.is_empty() && cohorts.is_empty() {
            return TargetAudience::Unclassified;
        }

        TargetAudience::PrivateFanout {
            user_ids,
            role_ids,
            cohorts,
            safety_channel_id,
        }
    }

    pub fn is_dispatchable(&self) -> bool {
        !matches!(self, TargetAudience::Unclassified)
    }
}

/// One platform-scoped delivery instruction inside an announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnouncementTarget {
    /// The connected platform this target goes out through.
    pub platform: PlatformId,
    /// Message template with named placeholders (`{{username}}`), resolved
    /// at send time.
    pub template: String,
    /// Audience classification.
    pub audience: TargetAudience,
}

/// A persisted announcement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Announcement {
    pub id: AnnouncementId,
    /// Owning community — announcements are always community-scoped.
    pub community_id: String,
    /// Drafts carry no trigger and are never scheduled.
    pub draft: bool,
    /// Required (and future-dated) for non-draft announcements.
    pub scheduled_at: Option<DateTime<Utc>>,
    /// Opaque id of the live trigger in the durable queue, present iff one
    /// is currently registered.
    pub job_id: Option<String>,
    /// Ordered delivery targets.
    pub data: Vec<AnnouncementTarget>,
    /// RFC3339 timestamp of record creation.
    pub created_at: String,
    /// RFC3339 timestamp of the last update.
    pub updated_at: String,
}

/// Input for creating an announcement; id and timestamps are assigned by
/// the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAnnouncement {
    pub community_id: String,
    pub draft: bool,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub data: Vec<AnnouncementTarget>,
}

/// Partial update applied by `find_one_and_update`. The double `Option` on
/// nullable columns distinguishes "leave alone" (`None`) from "set to null"
/// (`Some(None)`).
#[derive(Debug, Clone, Default)]
pub struct AnnouncementPatch {
    pub draft: Option<bool>,
    pub scheduled_at: Option<Option<DateTime<Utc>>>,
    pub job_id: Option<Option<String>>,
    pub data: Option<Vec<AnnouncementTarget>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_ids_classify_as_public() {
        let audience = TargetAudience::classify(
            Some(vec!["c1".into(), "c2".into()]),
            Some(vec!["u1".into()]), // ignored: channel ids win
            None,
            None,
            None,
        );
        assert_eq!(
            audience,
            TargetAudience::PublicFanout {
                channel_ids: vec!["c1".into(), "c2".into()]
            }
        );
    }

    #[test]
    fn user_selectors_classify_as_private() {
        let audience = TargetAudience::classify(
            None,
            None,
            Some(vec!["r1".into()]),
            Some(vec!["newly_active".into()]),
            Some("safety".into()),
        );
        match audience {
            TargetAudience::PrivateFanout {
                user_ids,
                role_ids,
                cohorts,
                safety_channel_id,
            } => {
                assert!(user_ids.is_empty());
                assert_eq!(role_ids, vec!["r1".to_string()]);
                assert_eq!(cohorts, vec!["newly_active".to_string()]);
                assert_eq!(safety_channel_id.as_deref(), Some("safety"));
            }
            other => panic!("expected private fan-out, got {other:?}"),
        }
    }

    #[test]
    fn no_selectors_is_unclassified() {
        let audience = TargetAudience::classify(None, None, None, None, None);
        assert_eq!(audience, TargetAudience::Unclassified);
        assert!(!audience.is_dispatchable());
    }

    #[test]
    fn empty_channel_list_falls_through_to_private() {
        let audience = TargetAudience::classify(
            Some(vec![]),
            Some(vec!["u1".into()]),
            None,
            None,
            None,
        );
        assert!(matches!(audience, TargetAudience::PrivateFanout { .. }));
    }

    #[test]
    fn audience_json_rejects_unknown_fields() {
        let json = r#"{"kind":"public_fanout","channel_ids":["c1"],"extra":true}"#;
        assert!(serde_json::from_str::<TargetAudience>(json).is_err());
    }
}
