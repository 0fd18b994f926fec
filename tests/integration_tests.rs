//! Integration tests for the trust promotion engine
//!
//! These tests drive review, transition commits and recalculation end to end
//! against the in-memory store and recording collaborators.

use chrono::{Duration, Utc};
use std::sync::Arc;
use trust_promotion::services::memory::{
    InMemoryBadgeGranter, InMemoryStatistics, InMemoryTrustStore, QueuedMessage,
    RecordingEventBus, RecordingGroupMembership, RecordingMessageQueue, StaticTl3Evaluator,
};
use trust_promotion::{
    Actor, AuditAction, BadgeId, BadgeTrigger, ChangeOptions, JobMode, PromotionEngine,
    PromotionError, Recalculation, RequirementThresholds, TrustLevel, TrustLevelJob, TrustStore,
    User, UserPromoted, UserStat,
};

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    store: Arc<InMemoryTrustStore>,
    stats: Arc<InMemoryStatistics>,
    tl3: Arc<StaticTl3Evaluator>,
    events: Arc<RecordingEventBus>,
    groups: Arc<RecordingGroupMembership>,
    badges: Arc<InMemoryBadgeGranter>,
    messages: Arc<RecordingMessageQueue>,
    engine: PromotionEngine,
}

/// Engine wired to recording collaborators with default thresholds
async fn harness() -> Harness {
    let store = Arc::new(InMemoryTrustStore::new());
    let stats = Arc::new(InMemoryStatistics::new());
    let tl3 = Arc::new(StaticTl3Evaluator::new());
    let events = Arc::new(RecordingEventBus::new());
    let groups = Arc::new(RecordingGroupMembership::new());
    let badges = Arc::new(InMemoryBadgeGranter::with_defaults().await);
    let messages = Arc::new(RecordingMessageQueue::new());

    let engine = PromotionEngine::new(store.clone(), stats.clone(), tl3.clone())
        .with_thresholds(Arc::new(RequirementThresholds::default()))
        .with_event_bus(events.clone())
        .with_group_membership(groups.clone())
        .with_badge_granter(badges.clone())
        .with_message_queue(messages.clone());

    Harness {
        store,
        stats,
        tl3,
        events,
        groups,
        badges,
        messages,
        engine,
    }
}

/// Store a month-old user at the given level
async fn create_user(h: &Harness, id: i64, level: TrustLevel) -> User {
    let mut user = User::new(id, &format!("member{}", id), &format!("member{}@example.com", id));
    user.trust_level = level;
    user.created_at = Utc::now() - Duration::days(30);
    h.store.insert_user(user.clone()).await;
    user
}

/// Statistics exactly at the default level 1 thresholds
fn tl1_stat() -> UserStat {
    UserStat {
        topics_entered: 5,
        posts_read_count: 30,
        time_read: 10 * 60,
        ..Default::default()
    }
}

/// Statistics exactly at the default level 2 thresholds
fn tl2_stat() -> UserStat {
    UserStat {
        topics_entered: 20,
        posts_read_count: 100,
        time_read: 60 * 60,
        days_visited: 15,
        likes_received: 1,
        likes_given: 1,
        topic_reply_count: 3,
    }
}

// ============================================================================
// Review
// ============================================================================

mod review {
    use super::*;

    #[tokio::test]
    async fn test_new_user_with_no_activity_stays() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;

        assert!(!h.engine.review(Some(&mut user)).await.unwrap());
        assert_eq!(user.trust_level, TrustLevel::NewUser);
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
        assert!(h.events.events().await.is_empty());
    }

    #[tokio::test]
    async fn test_exact_tl1_thresholds_promote() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.stats.set(1, tl1_stat()).await;

        assert!(h.engine.review_tl0(&mut user).await.unwrap());
        assert_eq!(user.trust_level, TrustLevel::Basic);

        let records = h.store.audit_records(1).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, AuditAction::AutoTrustLevelChange);
        assert_eq!(records[0].previous_value, TrustLevel::NewUser);
        assert_eq!(records[0].new_value, TrustLevel::Basic);
    }

    #[tokio::test]
    async fn test_promotion_fans_out() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.stats.set(1, tl1_stat()).await;

        assert!(h.engine.review(Some(&mut user)).await.unwrap());

        assert_eq!(
            h.events.events().await,
            vec![UserPromoted {
                user_id: 1,
                new_trust_level: TrustLevel::Basic,
                old_trust_level: TrustLevel::NewUser,
            }]
        );
        assert_eq!(h.groups.changes().await, vec![(1, TrustLevel::Basic)]);
        assert_eq!(
            h.badges.queued().await,
            vec![(BadgeTrigger::TrustLevelChange, 1)]
        );
        assert_eq!(
            h.messages.messages().await,
            vec![(QueuedMessage::MemberWelcome, 1)]
        );
    }

    #[tokio::test]
    async fn test_no_welcome_when_badge_disabled_or_held() {
        let h = harness().await;
        h.badges.disable(BadgeId::BasicUser).await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.stats.set(1, tl1_stat()).await;
        assert!(h.engine.review(Some(&mut user)).await.unwrap());

        h.badges.enable(BadgeId::BasicUser).await;
        h.badges.grant(2, BadgeId::BasicUser).await;
        let mut other = create_user(&h, 2, TrustLevel::NewUser).await;
        h.stats.set(2, tl1_stat()).await;
        assert!(h.engine.review(Some(&mut other)).await.unwrap());

        assert!(h.messages.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_basic_user_promoted_to_member_with_message() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Basic).await;
        h.stats.set(1, tl2_stat()).await;

        assert!(h.engine.review(Some(&mut user)).await.unwrap());
        assert_eq!(user.trust_level, TrustLevel::Member);
        assert_eq!(
            h.messages.messages().await,
            vec![(QueuedMessage::Tl2Promotion, 1)]
        );
    }

    #[tokio::test]
    async fn test_review_promotes_one_level_at_a_time() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.stats.set(1, tl2_stat()).await;

        assert!(h.engine.review(Some(&mut user)).await.unwrap());
        assert_eq!(user.trust_level, TrustLevel::Basic);
        assert!(h.engine.review(Some(&mut user)).await.unwrap());
        assert_eq!(user.trust_level, TrustLevel::Member);
        assert!(!h.engine.review(Some(&mut user)).await.unwrap());
    }

    #[tokio::test]
    async fn test_locked_user_never_reviewed() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        user.manual_locked_trust_level = Some(TrustLevel::NewUser);
        h.stats.set(1, tl2_stat()).await;

        assert!(!h.engine.review(Some(&mut user)).await.unwrap());
        assert_eq!(user.trust_level, TrustLevel::NewUser);
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_member_review_does_not_consult_tl3() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Member).await;
        h.tl3.set_met(1, true).await;

        assert!(!h.engine.review(Some(&mut user)).await.unwrap());
        assert_eq!(h.tl3.calls(), 0);
    }

    #[tokio::test]
    async fn test_badge_queue_failure_keeps_promotion() {
        let h = harness().await;
        h.badges.set_queue_down(true);
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.stats.set(1, tl1_stat()).await;

        assert!(h.engine.review(Some(&mut user)).await.unwrap());
        let stored = h.store.find_user(1).await.unwrap().unwrap();
        assert_eq!(stored.trust_level, TrustLevel::Basic);
    }
}

// ============================================================================
// Transition Commit
// ============================================================================

mod change_trust_level {
    use super::*;

    #[tokio::test]
    async fn test_refuses_demotion_of_qualified_member() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Member).await;
        h.stats.set(1, tl2_stat()).await;

        let err = h
            .engine
            .change_trust_level(&mut user, TrustLevel::Basic, &ChangeOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, PromotionError::InvalidAccess(_)));
        assert_eq!(user.trust_level, TrustLevel::Member);
        let stored = h.store.find_user(1).await.unwrap().unwrap();
        assert_eq!(stored.trust_level, TrustLevel::Member);
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_demotion_allowed_when_no_longer_qualified() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Member).await;
        h.stats.set(1, tl1_stat()).await;

        assert!(h
            .engine
            .change_trust_level(&mut user, TrustLevel::Basic, &ChangeOptions::default())
            .await
            .unwrap());
        assert_eq!(user.trust_level, TrustLevel::Basic);
    }

    #[tokio::test]
    async fn test_demotion_checks_level_above_target() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Member).await;
        // Still meets level 1, so dropping to NewUser is refused
        h.stats.set(1, tl1_stat()).await;

        let err = h
            .engine
            .change_trust_level(&mut user, TrustLevel::NewUser, &ChangeOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_access_denied());
    }

    #[tokio::test]
    async fn test_staff_entry_only_with_admin() {
        let h = harness().await;
        let admin = Actor::new(99, "admin");
        let mut user = create_user(&h, 1, TrustLevel::Basic).await;

        h.engine
            .change_trust_level(&mut user, TrustLevel::Member, &ChangeOptions::logged_for(admin))
            .await
            .unwrap();
        h.engine
            .change_trust_level(&mut user, TrustLevel::Regular, &ChangeOptions::default())
            .await
            .unwrap();

        let records = h.store.audit_records(1).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0].action,
            AuditAction::ChangeTrustLevel { acting_user_id: 99 }
        );
        assert!(records[0].is_staff_action());
        assert_eq!(records[1].action, AuditAction::AutoTrustLevelChange);
    }

    #[tokio::test]
    async fn test_invalid_raw_level() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Basic).await;

        let err = h
            .engine
            .change_trust_level_to(&mut user, 5, &ChangeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PromotionError::InvalidTrustLevel(5)));
        assert_eq!(user.trust_level, TrustLevel::Basic);

        assert!(h
            .engine
            .change_trust_level_to(&mut user, 4, &ChangeOptions::default())
            .await
            .unwrap());
        assert_eq!(user.trust_level, TrustLevel::Leader);
    }

    #[tokio::test]
    async fn test_persistence_failure_leaves_no_trace() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.store.fail_next_commit();

        let err = h
            .engine
            .change_trust_level(&mut user, TrustLevel::Basic, &ChangeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PromotionError::Persistence(_)));

        assert_eq!(user.trust_level, TrustLevel::NewUser);
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
        assert!(h.events.events().await.is_empty());
        assert!(h.groups.changes().await.is_empty());
        assert!(h.badges.queued().await.is_empty());
    }

    #[tokio::test]
    async fn test_group_sync_failure_rolls_back_transition() {
        let h = harness().await;
        h.groups.set_down(true);
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;

        let err = h
            .engine
            .change_trust_level(&mut user, TrustLevel::Basic, &ChangeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PromotionError::Collaborator(_)));

        assert_eq!(user.trust_level, TrustLevel::NewUser);
        let stored = h.store.find_user(1).await.unwrap().unwrap();
        assert_eq!(stored.trust_level, TrustLevel::NewUser);
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
        assert!(h.badges.queued().await.is_empty());
    }

    #[tokio::test]
    async fn test_event_bus_failure_rolls_back_promotion() {
        let h = harness().await;
        h.events.set_down(true);
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.stats.set(1, tl1_stat()).await;

        assert!(h.engine.review(Some(&mut user)).await.is_err());

        assert_eq!(user.trust_level, TrustLevel::NewUser);
        let stored = h.store.find_user(1).await.unwrap().unwrap();
        assert_eq!(stored.trust_level, TrustLevel::NewUser);
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
        assert!(h.groups.changes().await.is_empty());
        assert!(h.messages.messages().await.is_empty());
    }

    #[tokio::test]
    async fn test_email_validation_bypassed_for_trust_saves() {
        let h = harness().await;
        let mut user = User::new(1, "legacy", "legacy-without-domain");
        h.store.insert_user(user.clone()).await;

        assert!(h
            .engine
            .change_trust_level(&mut user, TrustLevel::Basic, &ChangeOptions::default())
            .await
            .unwrap());
    }
}

// ============================================================================
// Recalculation
// ============================================================================

mod recalculate {
    use super::*;

    #[tokio::test]
    async fn test_cascades_through_levels() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.stats.set(1, tl2_stat()).await;
        h.tl3.set_met(1, true).await;

        let outcome = h.engine.recalculate(&mut user, None, false).await.unwrap();
        assert_eq!(
            outcome,
            Recalculation::Completed {
                level: TrustLevel::Regular,
                demoted: false
            }
        );

        let records = h.store.audit_records(1).await.unwrap();
        let steps: Vec<_> = records.iter().map(|r| (r.previous_value, r.new_value)).collect();
        assert_eq!(
            steps,
            vec![
                (TrustLevel::NewUser, TrustLevel::Basic),
                (TrustLevel::Basic, TrustLevel::Member),
                (TrustLevel::Member, TrustLevel::Regular),
            ]
        );
        assert_eq!(h.groups.changes().await.last(), Some(&(1, TrustLevel::Regular)));
    }

    #[tokio::test]
    async fn test_lost_tl3_demotes_with_audit() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Regular).await;
        user.group_granted_trust_level = Some(TrustLevel::Regular);
        h.store.insert_user(user.clone()).await;
        h.stats.set(1, tl2_stat()).await;
        h.tl3.set_lost(1, true).await;

        let outcome = h.engine.recalculate(&mut user, None, false).await.unwrap();
        assert_eq!(
            outcome,
            Recalculation::Completed {
                level: TrustLevel::Member,
                demoted: true
            }
        );
        let stored = h.store.find_user(1).await.unwrap().unwrap();
        assert_eq!(stored.trust_level, TrustLevel::Member);

        let records = h.store.audit_records(1).await.unwrap();
        let last = records.last().unwrap();
        assert_eq!(
            last.action,
            AuditAction::ChangeTrustLevel {
                acting_user_id: Actor::SYSTEM_ID
            }
        );
        assert_eq!(last.previous_value, TrustLevel::Regular);
        assert_eq!(last.new_value, TrustLevel::Member);
    }

    #[tokio::test]
    async fn test_tl3_demotion_attributed_to_admin() {
        let h = harness().await;
        let admin = Actor::new(42, "moderator");
        let mut user = create_user(&h, 1, TrustLevel::Regular).await;
        user.group_granted_trust_level = Some(TrustLevel::Regular);
        h.store.insert_user(user.clone()).await;
        h.tl3.set_lost(1, true).await;

        h.engine
            .recalculate(&mut user, Some(&admin), false)
            .await
            .unwrap();

        let records = h.store.audit_records(1).await.unwrap();
        assert_eq!(
            records.last().unwrap().action,
            AuditAction::ChangeTrustLevel { acting_user_id: 42 }
        );
    }

    #[tokio::test]
    async fn test_twice_is_idempotent() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        h.stats.set(1, tl1_stat()).await;

        h.engine.recalculate(&mut user, None, false).await.unwrap();
        let first_level = user.trust_level;
        let first_entries = h.store.audit_records(1).await.unwrap().len();

        h.engine.recalculate(&mut user, None, false).await.unwrap();
        assert_eq!(user.trust_level, first_level);
        assert_eq!(first_level, TrustLevel::Basic);
        assert_eq!(h.store.audit_records(1).await.unwrap().len(), first_entries);
    }

    #[tokio::test]
    async fn test_unqualified_member_is_reset_without_history() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Member).await;

        let outcome = h.engine.recalculate(&mut user, None, false).await.unwrap();
        assert_eq!(
            outcome,
            Recalculation::Completed {
                level: TrustLevel::NewUser,
                demoted: false
            }
        );
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_qualified_member_is_clamped() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Member).await;
        h.stats.set(1, tl2_stat()).await;

        h.engine.recalculate(&mut user, None, false).await.unwrap();
        assert_eq!(user.trust_level, TrustLevel::Member);
        let stored = h.store.find_user(1).await.unwrap().unwrap();
        assert_eq!(stored.trust_level, TrustLevel::Member);
    }

    #[tokio::test]
    async fn test_previous_level_as_floor() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::NewUser).await;
        user.previous_trust_level = Some(TrustLevel::Member);
        h.store.insert_user(user.clone()).await;

        let mut scratch = user.clone();
        h.engine.recalculate(&mut scratch, None, false).await.unwrap();
        assert_eq!(scratch.trust_level, TrustLevel::NewUser);

        h.engine.recalculate(&mut user, None, true).await.unwrap();
        assert_eq!(user.trust_level, TrustLevel::Member);
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_locked_user_not_cascaded() {
        let h = harness().await;
        let mut user = create_user(&h, 1, TrustLevel::Regular).await;
        user.manual_locked_trust_level = Some(TrustLevel::Regular);
        h.store.insert_user(user.clone()).await;
        h.tl3.set_lost(1, true).await;

        let outcome = h.engine.recalculate(&mut user, None, false).await.unwrap();
        assert_eq!(
            outcome,
            Recalculation::Locked {
                level: TrustLevel::Regular
            }
        );
        assert_eq!(user.trust_level, TrustLevel::Regular);
        assert!(h.store.audit_records(1).await.unwrap().is_empty());
    }
}

// ============================================================================
// Scheduled Job
// ============================================================================

mod job {
    use super::*;

    #[tokio::test]
    async fn test_recalculate_pass() {
        let h = harness().await;
        create_user(&h, 1, TrustLevel::NewUser).await;
        let mut regular = create_user(&h, 2, TrustLevel::Regular).await;
        regular.group_granted_trust_level = Some(TrustLevel::Regular);
        h.store.insert_user(regular).await;
        h.stats.set(1, tl1_stat()).await;
        h.tl3.set_lost(2, true).await;

        let Harness { store, engine, .. } = h;
        let summary = TrustLevelJob::new(Arc::new(engine), JobMode::Recalculate)
            .run_once()
            .await
            .unwrap();

        assert_eq!(summary.examined, 2);
        assert_eq!(summary.changed, 2);
        assert_eq!(
            store.find_user(1).await.unwrap().unwrap().trust_level,
            TrustLevel::Basic
        );
        assert_eq!(
            store.find_user(2).await.unwrap().unwrap().trust_level,
            TrustLevel::Member
        );
    }
}
