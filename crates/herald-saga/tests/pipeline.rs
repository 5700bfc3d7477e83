//! Full-pipeline tests: schedule → fire → orchestrate → audit, with an
//! in-process chat client double.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use herald_core::config::DispatchConfig;
use herald_core::{AnnouncementId, ChatClient, DispatchOutcome, PlatformId};
use herald_saga::{DeliveryAddress, Orchestrator, SagaLog, SagaState};
use herald_store::types::{AnnouncementTarget, TargetAudience};
use herald_store::{AnnouncementPatch, AnnouncementStore, NewAnnouncement};
use herald_tenant::TenantResolver;
use rusqlite::Connection;

/// Records every send; scripted per-address failures.
#[derive(Default)]
struct MockChat {
    /// (kind, address, text) per send, in completion order.
    sent: Mutex<Vec<(String, String, String)>>,
    /// Addresses whose sends permanently fail.
    fail_permanent: HashSet<String>,
    /// Addresses that fail transiently exactly once, then succeed.
    transient_once: Mutex<HashSet<String>>,
    next_message_id: AtomicU64,
}

impl MockChat {
    fn new() -> Self {
        Self::default()
    }

    fn sends(&self) -> Vec<(String, String, String)> {
        self.sent.lock().unwrap().clone()
    }

    fn outcome_for(&self, kind: &str, address: &str, text: &str) -> DispatchOutcome {
        if self.fail_permanent.contains(address) {
            return DispatchOutcome::Permanent {
                reason: "cannot send messages to this user".into(),
            };
        }
        if self.transient_once.lock().unwrap().remove(address) {
            return DispatchOutcome::Transient {
                reason: "rate limited".into(),
            };
        }
        self.sent
            .lock()
            .unwrap()
            .push((kind.into(), address.into(), text.into()));
        let id = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        DispatchOutcome::Delivered {
            message_id: Some(format!("m{id}")),
        }
    }
}

#[async_trait]
impl ChatClient for MockChat {
    async fn send_channel_message(&self, channel_id: &str, text: &str) -> DispatchOutcome {
        self.outcome_for("channel", channel_id, text)
    }

    async fn send_direct_message(&self, user_id: &str, text: &str) -> DispatchOutcome {
        self.outcome_for("dm", user_id, text)
    }

    fn mention(&self, user_id: &str) -> String {
        format!("<@{user_id}>")
    }

    fn message_link(&self, guild_id: &str, channel_id: &str, message_id: &str) -> String {
        format!("https://discord.com/channels/{guild_id}/{channel_id}/{message_id}")
    }
}

struct Harness {
    _tenant_root: tempfile::TempDir,
    db: Arc<Mutex<Connection>>,
    store: AnnouncementStore,
    sagas: SagaLog,
    orchestrator: Orchestrator,
    chat: Arc<MockChat>,
}

fn harness(chat: MockChat) -> Harness {
    let conn = Connection::open_in_memory().unwrap();
    herald_store::db::init_db(&conn).unwrap();
    herald_tenant::db::init_db(&conn).unwrap();
    herald_saga::db::init_db(&conn).unwrap();
    herald_scheduler::db::init_db(&conn).unwrap();
    let db = Arc::new(Mutex::new(conn));

    let tenant_root = tempfile::tempdir().unwrap();
    let tenant = Connection::open(tenant_root.path().join("guild-1.db")).unwrap();
    herald_tenant::db::init_tenant_db(&tenant).unwrap();
    tenant
        .execute_batch(
            "
        INSERT INTO members (discord_id, username) VALUES
            ('u1','alice'), ('u2','bob'), ('u3','carol'), ('u4','dave'), ('u5','eve');
        INSERT INTO member_roles VALUES ('r1','u1'), ('r1','u2');
        INSERT INTO member_activity VALUES ('2024-02-01','newly_active','u2');
        ",
        )
        .unwrap();
    drop(tenant);

    let resolver = TenantResolver::new(db.clone(), tenant_root.path());
    resolver
        .register_platform(&PlatformId::from("p1"), "guild-1", None)
        .unwrap();

    let chat = Arc::new(chat);
    let orchestrator = Orchestrator::new(
        AnnouncementStore::new(db.clone()),
        SagaLog::new(db.clone()),
        TenantResolver::new(db.clone(), tenant_root.path()),
        chat.clone(),
        DispatchConfig {
            max_in_flight: 2,
            max_attempts: 3,
            backoff_base_ms: 1,
        },
    );

    Harness {
        _tenant_root: tenant_root,
        db: db.clone(),
        store: AnnouncementStore::new(db.clone()),
        sagas: SagaLog::new(db),
        orchestrator,
        chat,
    }
}

fn announcement_with(audience: TargetAudience) -> NewAnnouncement {
    NewAnnouncement {
        community_id: "community-1".into(),
        draft: false,
        scheduled_at: Some(Utc::now() + ChronoDuration::minutes(5)),
        data: vec![AnnouncementTarget {
            platform: "p1".into(),
            template: "Hello {{username}}, event tonight!".into(),
            audience,
        }],
    }
}

fn done_outcomes(h: &Harness, id: &AnnouncementId) -> Vec<herald_saga::OutcomeRecord> {
    let sagas = h.sagas.list_for_announcement(id).unwrap();
    assert_eq!(sagas.len(), 1, "expected exactly one saga");
    match &sagas[0].state {
        SagaState::Done { outcomes } => outcomes.clone(),
        other => panic!("saga not done: {other:?}"),
    }
}

#[tokio::test]
async fn public_fanout_sends_one_unit_per_channel() {
    let h = harness(MockChat::new());
    let a = h
        .store
        .create(announcement_with(TargetAudience::PublicFanout {
            channel_ids: vec!["c1".into(), "c2".into()],
        }))
        .unwrap();

    h.orchestrator.on_trigger(&a.id).await.unwrap();

    let sends = h.chat.sends();
    assert_eq!(sends.len(), 2);
    assert!(sends.iter().all(|(kind, _, _)| kind == "channel"));
    let channels: HashSet<_> = sends.iter().map(|(_, addr, _)| addr.clone()).collect();
    assert_eq!(channels, HashSet::from(["c1".to_string(), "c2".to_string()]));
    // Channel posts keep the template verbatim — no recipient to mention.
    assert!(sends[0].2.contains("{{username}}"));

    assert_eq!(done_outcomes(&h, &a.id).len(), 2);
}

#[tokio::test]
async fn private_fanout_unions_and_deduplicates_recipients() {
    let h = harness(MockChat::new());
    // u1 explicit; r1 -> {u1, u2}; cohort -> {u2}. Union is {u1, u2}.
    let a = h
        .store
        .create(announcement_with(TargetAudience::PrivateFanout {
            user_ids: vec!["u1".into()],
            role_ids: vec!["r1".into()],
            cohorts: vec!["newly_active".into()],
            safety_channel_id: None,
        }))
        .unwrap();

    h.orchestrator.on_trigger(&a.id).await.unwrap();

    let sends = h.chat.sends();
    assert!(sends.iter().all(|(kind, _, _)| kind == "dm"));
    let recipients: Vec<_> = sends.iter().map(|(_, addr, _)| addr.clone()).collect();
    assert_eq!(recipients.len(), 2, "duplicates must collapse: {recipients:?}");
    let unique: HashSet<_> = recipients.into_iter().collect();
    assert_eq!(unique, HashSet::from(["u1".to_string(), "u2".to_string()]));

    // Mention substitution happened per recipient.
    let u1_dm = h
        .chat
        .sends()
        .into_iter()
        .find(|(_, addr, _)| addr == "u1")
        .unwrap();
    assert!(u1_dm.2.contains("<@u1>"));
}

#[tokio::test]
async fn safety_notice_link_appears_in_every_dm() {
    let h = harness(MockChat::new());
    let a = h
        .store
        .create(announcement_with(TargetAudience::PrivateFanout {
            user_ids: vec!["u1".into(), "u2".into()],
            role_ids: vec![],
            cohorts: vec![],
            safety_channel_id: Some("safety-chan".into()),
        }))
        .unwrap();

    h.orchestrator.on_trigger(&a.id).await.unwrap();

    let sends = h.chat.sends();
    // First send is the notice itself, into the safety channel.
    assert_eq!(sends[0].0, "channel");
    assert_eq!(sends[0].1, "safety-chan");

    // The notice got message id m1; guild/channel/message appear in order.
    let link = "https://discord.com/channels/guild-1/safety-chan/m1";
    let dms: Vec<_> = sends.iter().filter(|(kind, _, _)| kind == "dm").collect();
    assert_eq!(dms.len(), 2);
    for (_, _, text) in dms {
        assert!(text.contains(link), "missing deep link in: {text}");
    }
}

#[tokio::test]
async fn one_permanent_failure_does_not_fail_the_saga() {
    let mut chat = MockChat::new();
    chat.fail_permanent.insert("u3".into());
    let h = harness(chat);
    let a = h
        .store
        .create(announcement_with(TargetAudience::PrivateFanout {
            user_ids: vec!["u1".into(), "u2".into(), "u3".into(), "u4".into(), "u5".into()],
            role_ids: vec![],
            cohorts: vec![],
            safety_channel_id: None,
        }))
        .unwrap();

    h.orchestrator.on_trigger(&a.id).await.unwrap();

    let outcomes = done_outcomes(&h, &a.id);
    assert_eq!(outcomes.len(), 5);
    assert_eq!(outcomes.iter().filter(|o| o.is_delivered()).count(), 4);
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_delivered()).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(
        failed[0].address,
        DeliveryAddress::User {
            discord_id: "u3".into()
        }
    );
}

#[tokio::test]
async fn transient_failures_are_retried_to_success() {
    let chat = MockChat::new();
    chat.transient_once.lock().unwrap().insert("u1".into());
    let h = harness(chat);
    let a = h
        .store
        .create(announcement_with(TargetAudience::PrivateFanout {
            user_ids: vec!["u1".into()],
            role_ids: vec![],
            cohorts: vec![],
            safety_channel_id: None,
        }))
        .unwrap();

    h.orchestrator.on_trigger(&a.id).await.unwrap();

    let outcomes = done_outcomes(&h, &a.id);
    assert_eq!(outcomes.len(), 1);
    assert!(outcomes[0].is_delivered());
    assert_eq!(outcomes[0].attempts, 2);
}

#[tokio::test]
async fn missing_or_drafted_announcement_exits_before_any_audience_work() {
    let h = harness(MockChat::new());

    // Deleted between fire and orchestration.
    h.orchestrator
        .on_trigger(&AnnouncementId::from("ghost"))
        .await
        .unwrap();
    assert!(h.chat.sends().is_empty());
    assert!(h
        .sagas
        .list_for_announcement(&AnnouncementId::from("ghost"))
        .unwrap()
        .is_empty());

    // Re-drafted before fire time.
    let mut input = announcement_with(TargetAudience::PublicFanout {
        channel_ids: vec!["c1".into()],
    });
    input.draft = true;
    input.scheduled_at = None;
    let a = h.store.create(input).unwrap();
    h.orchestrator.on_trigger(&a.id).await.unwrap();
    assert!(h.chat.sends().is_empty());
}

#[tokio::test]
async fn rescheduled_announcement_defers_to_the_live_trigger() {
    let h = harness(MockChat::new());
    let a = h
        .store
        .create(announcement_with(TargetAudience::PublicFanout {
            channel_ids: vec!["c1".into()],
        }))
        .unwrap();
    // A reschedule between the fire tick and orchestration leaves a fresh
    // job_id on the record.
    h.store
        .find_one_and_update(
            &a.id,
            &AnnouncementPatch {
                job_id: Some(Some("new-trigger".into())),
                ..Default::default()
            },
        )
        .unwrap();

    h.orchestrator.on_trigger(&a.id).await.unwrap();

    assert!(h.chat.sends().is_empty());
    assert!(h.sagas.list_for_announcement(&a.id).unwrap().is_empty());
}

#[tokio::test]
async fn unavailable_tenant_fails_the_saga_with_context() {
    let h = harness(MockChat::new());
    let mut input = announcement_with(TargetAudience::PrivateFanout {
        user_ids: vec!["u1".into()],
        role_ids: vec![],
        cohorts: vec![],
        safety_channel_id: None,
    });
    input.data[0].platform = "disconnected-platform".into();
    let a = h.store.create(input).unwrap();

    h.orchestrator.on_trigger(&a.id).await.unwrap();

    let sagas = h.sagas.list_for_announcement(&a.id).unwrap();
    assert_eq!(sagas.len(), 1);
    match &sagas[0].state {
        SagaState::Failed { step, error } => {
            assert_eq!(step, "started");
            assert!(error.contains("tenant unavailable"), "got: {error}");
        }
        other => panic!("expected failed saga, got {other:?}"),
    }
    assert!(h.chat.sends().is_empty());
}

#[tokio::test]
async fn resumed_saga_skips_already_dispatched_recipients() {
    use herald_saga::types::{ComposedMessage, DeliveryOutcome, OutcomeRecord};

    let h = harness(MockChat::new());
    let a = h
        .store
        .create(announcement_with(TargetAudience::PrivateFanout {
            user_ids: vec!["u1".into(), "u2".into()],
            role_ids: vec![],
            cohorts: vec![],
            safety_channel_id: None,
        }))
        .unwrap();

    // Simulate a saga that crashed after delivering to u1 only.
    let messages = vec![
        ComposedMessage {
            address: DeliveryAddress::User {
                discord_id: "u1".into(),
            },
            text: "Hello <@u1>".into(),
        },
        ComposedMessage {
            address: DeliveryAddress::User {
                discord_id: "u2".into(),
            },
            text: "Hello <@u2>".into(),
        },
    ];
    let mut saga = h.sagas.create(&a.id).unwrap();
    h.sagas
        .advance(
            &mut saga,
            SagaState::AudienceResolved {
                deliveries: messages.iter().map(|m| m.address.clone()).collect(),
                safety: None,
            },
        )
        .unwrap();
    h.sagas
        .advance(
            &mut saga,
            SagaState::MessagesComposed {
                messages: messages.clone(),
            },
        )
        .unwrap();
    h.sagas
        .advance(
            &mut saga,
            SagaState::Dispatching {
                messages,
                outcomes: vec![OutcomeRecord {
                    address: DeliveryAddress::User {
                        discord_id: "u1".into(),
                    },
                    outcome: DeliveryOutcome::Delivered {
                        message_id: Some("m0".into()),
                    },
                    attempts: 1,
                }],
            },
        )
        .unwrap();

    h.orchestrator.resume_dispatch(&saga.id).await.unwrap();

    // Only u2 was actually sent; the audit trail still covers both.
    let sends = h.chat.sends();
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].1, "u2");
    let outcomes = done_outcomes(&h, &a.id);
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|o| o.is_delivered()));
}

#[tokio::test]
async fn fired_trigger_flows_from_engine_to_delivery() {
    let h = harness(MockChat::new());
    let scheduler = herald_scheduler::Scheduler::new(h.db.clone());
    let (tx, mut rx) = tokio::sync::mpsc::channel(4);
    let engine = herald_scheduler::SchedulerEngine::new(
        h.db.clone(),
        tx,
        std::time::Duration::from_secs(1),
    );

    let a = scheduler
        .schedule_create(announcement_with(TargetAudience::PublicFanout {
            channel_ids: vec!["c1".into()],
        }))
        .unwrap();

    {
        let conn = h.db.lock().unwrap();
        conn.execute(
            "UPDATE triggers SET fire_at = '2000-01-01T00:00:00+00:00'",
            [],
        )
        .unwrap();
    }
    engine.tick().unwrap();
    let fired = rx.try_recv().unwrap();
    assert_eq!(fired, a.id);

    h.orchestrator.on_trigger(&fired).await.unwrap();
    assert_eq!(h.chat.sends().len(), 1);
    assert_eq!(done_outcomes(&h, &a.id).len(), 1);
}
