//! In-memory collaborators
//!
//! Used when PostgreSQL is disabled and throughout the test suite. Each
//! recording implementation keeps what it was asked to do so callers can
//! inspect it afterwards.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use crate::error::{PromotionError, Result};
use crate::services::{
    AuditRecord, BadgeGranter, BadgeId, BadgeTrigger, EventBus, GroupMembership, MessageQueue,
    StatisticsProvider, Tl3Evaluator, TransitionCommit, TransitionEffects, TrustStore,
    UserPromoted,
};
use crate::trust::{TrustLevel, User, UserStat};

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
struct StoreState {
    users: HashMap<i64, User>,
    audit: Vec<AuditRecord>,
}

/// User store with all-or-nothing commits under a single write lock
#[derive(Default)]
pub struct InMemoryTrustStore {
    state: Arc<RwLock<StoreState>>,
    fail_next_commit: AtomicBool,
}

impl InMemoryTrustStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: User) {
        let mut state = self.state.write().await;
        state.users.insert(user.id, user);
    }

    /// Make the next `commit_transition` fail before writing anything
    pub fn fail_next_commit(&self) {
        self.fail_next_commit.store(true, Ordering::SeqCst);
    }
}

fn validate_email(user: &User) -> Result<()> {
    if user.skip_email_validation || user.email_is_valid() {
        Ok(())
    } else {
        Err(PromotionError::Persistence(format!(
            "Email {} is invalid",
            user.email
        )))
    }
}

#[async_trait]
impl TrustStore for InMemoryTrustStore {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn user_ids(&self) -> Result<Vec<i64>> {
        let state = self.state.read().await;
        let mut ids: Vec<i64> = state.users.keys().copied().collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn update_trust_level_column(&self, user_id: i64, level: TrustLevel) -> Result<()> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&user_id)
            .ok_or_else(|| PromotionError::Persistence(format!("User {} not found", user_id)))?;
        user.trust_level = level;
        Ok(())
    }

    async fn commit_transition(
        &self,
        commit: &TransitionCommit,
        effects: &dyn TransitionEffects,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        if self.fail_next_commit.swap(false, Ordering::SeqCst) {
            return Err(PromotionError::Persistence(
                "Injected commit failure".to_string(),
            ));
        }

        if !state.users.contains_key(&commit.user.id) {
            return Err(PromotionError::Persistence(format!(
                "User {} not found",
                commit.user.id
            )));
        }
        validate_email(&commit.user)?;
        effects.apply(commit).await?;

        let mut stored = commit.user.clone();
        stored.skip_email_validation = false;
        stored.profile.bio_needs_recook = false;
        state.users.insert(stored.id, stored);
        state.audit.push(commit.audit.clone());

        debug!(user_id = commit.user.id, "Committed trust level transition");
        Ok(())
    }

    async fn audit_records(&self, user_id: i64) -> Result<Vec<AuditRecord>> {
        let state = self.state.read().await;
        Ok(state
            .audit
            .iter()
            .filter(|r| r.target_user_id == user_id)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Statistics and Level 3
// ============================================================================

#[derive(Default)]
pub struct InMemoryStatistics {
    stats: RwLock<HashMap<i64, UserStat>>,
}

impl InMemoryStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set(&self, user_id: i64, stat: UserStat) {
        self.stats.write().await.insert(user_id, stat);
    }
}

#[async_trait]
impl StatisticsProvider for InMemoryStatistics {
    async fn user_stat(&self, user: &User) -> anyhow::Result<UserStat> {
        Ok(self
            .stats
            .read()
            .await
            .get(&user.id)
            .cloned()
            .unwrap_or_default())
    }
}

/// Level 3 answers set per user; counts how often it was consulted
#[derive(Default)]
pub struct StaticTl3Evaluator {
    met: RwLock<HashSet<i64>>,
    lost: RwLock<HashSet<i64>>,
    calls: std::sync::atomic::AtomicUsize,
}

impl StaticTl3Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_met(&self, user_id: i64, met: bool) {
        let mut set = self.met.write().await;
        if met {
            set.insert(user_id);
        } else {
            set.remove(&user_id);
        }
    }

    pub async fn set_lost(&self, user_id: i64, lost: bool) {
        let mut set = self.lost.write().await;
        if lost {
            set.insert(user_id);
        } else {
            set.remove(&user_id);
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Tl3Evaluator for StaticTl3Evaluator {
    async fn requirements_met(&self, user: &User) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.met.read().await.contains(&user.id))
    }

    async fn requirements_lost(&self, user: &User) -> anyhow::Result<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.lost.read().await.contains(&user.id))
    }
}

// ============================================================================
// Fan-out
// ============================================================================

#[derive(Default)]
pub struct RecordingEventBus {
    events: RwLock<Vec<UserPromoted>>,
    down: AtomicBool,
}

impl RecordingEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `user_promoted` call fail
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub async fn events(&self) -> Vec<UserPromoted> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl EventBus for RecordingEventBus {
    async fn user_promoted(&self, event: UserPromoted) -> anyhow::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("Event bus unavailable");
        }
        self.events.write().await.push(event);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingGroupMembership {
    changes: RwLock<Vec<(i64, TrustLevel)>>,
    down: AtomicBool,
}

impl RecordingGroupMembership {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `user_trust_level_change` call fail
    pub fn set_down(&self, down: bool) {
        self.down.store(down, Ordering::SeqCst);
    }

    pub async fn changes(&self) -> Vec<(i64, TrustLevel)> {
        self.changes.read().await.clone()
    }
}

#[async_trait]
impl GroupMembership for RecordingGroupMembership {
    async fn user_trust_level_change(&self, user_id: i64, level: TrustLevel) -> anyhow::Result<()> {
        if self.down.load(Ordering::SeqCst) {
            anyhow::bail!("Group membership unavailable");
        }
        self.changes.write().await.push((user_id, level));
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBadgeGranter {
    enabled: RwLock<HashSet<BadgeId>>,
    granted: RwLock<HashSet<(i64, BadgeId)>>,
    queued: RwLock<Vec<(BadgeTrigger, i64)>>,
    queue_down: AtomicBool,
}

impl InMemoryBadgeGranter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Badge granter with every trust level badge enabled
    pub async fn with_defaults() -> Self {
        let granter = Self::new();
        for badge in [BadgeId::BasicUser, BadgeId::Member, BadgeId::Regular, BadgeId::Leader] {
            granter.enable(badge).await;
        }
        granter
    }

    pub async fn enable(&self, badge: BadgeId) {
        self.enabled.write().await.insert(badge);
    }

    pub async fn disable(&self, badge: BadgeId) {
        self.enabled.write().await.remove(&badge);
    }

    pub async fn grant(&self, user_id: i64, badge: BadgeId) {
        self.granted.write().await.insert((user_id, badge));
    }

    /// Make every `queue_badge_grant` call fail
    pub fn set_queue_down(&self, down: bool) {
        self.queue_down.store(down, Ordering::SeqCst);
    }

    pub async fn queued(&self) -> Vec<(BadgeTrigger, i64)> {
        self.queued.read().await.clone()
    }
}

#[async_trait]
impl BadgeGranter for InMemoryBadgeGranter {
    async fn badge_enabled(&self, badge: BadgeId) -> anyhow::Result<bool> {
        Ok(self.enabled.read().await.contains(&badge))
    }

    async fn user_has_badge(&self, user_id: i64, badge: BadgeId) -> anyhow::Result<bool> {
        Ok(self.granted.read().await.contains(&(user_id, badge)))
    }

    async fn queue_badge_grant(&self, trigger: BadgeTrigger, user_id: i64) -> anyhow::Result<()> {
        if self.queue_down.load(Ordering::SeqCst) {
            anyhow::bail!("Badge queue unavailable");
        }
        self.queued.write().await.push((trigger, user_id));
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueuedMessage {
    MemberWelcome,
    Tl2Promotion,
}

#[derive(Default)]
pub struct RecordingMessageQueue {
    messages: RwLock<Vec<(QueuedMessage, i64)>>,
}

impl RecordingMessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn messages(&self) -> Vec<(QueuedMessage, i64)> {
        self.messages.read().await.clone()
    }
}

#[async_trait]
impl MessageQueue for RecordingMessageQueue {
    async fn enqueue_member_welcome_message(&self, user_id: i64) -> anyhow::Result<()> {
        self.messages
            .write()
            .await
            .push((QueuedMessage::MemberWelcome, user_id));
        Ok(())
    }

    async fn enqueue_tl2_promotion_message(&self, user_id: i64) -> anyhow::Result<()> {
        self.messages
            .write()
            .await
            .push((QueuedMessage::Tl2Promotion, user_id));
        Ok(())
    }
}
