//! Collaborator Interfaces
//!
//! The promotion engine reads statistics and thresholds, persists transitions
//! and fans out notifications through these traits. In-memory implementations
//! live in [`memory`]; the Postgres store lives in `crate::database`.

pub mod bio;
pub mod calculator;
pub mod logged;
pub mod memory;
pub mod tl3;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::trust::{RequirementField, RequirementThresholds, TrustLevel, User, UserStat};

pub use bio::{BioRenderer, HtmlBioRenderer};
pub use calculator::DefaultTrustLevelCalculator;
pub use logged::{LoggedBadgeQueue, LoggedEventBus, LoggedGroupMembership, LoggedMessageQueue};
pub use tl3::StatisticsTl3Evaluator;

// ============================================================================
// Audit Records
// ============================================================================

/// Kind of trust level history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AuditAction {
    /// Staff action attributed to an administrator (or the system actor)
    ChangeTrustLevel { acting_user_id: i64 },
    /// Automatic promotion or demotion
    AutoTrustLevelChange,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::ChangeTrustLevel { .. } => "change_trust_level",
            AuditAction::AutoTrustLevelChange => "auto_trust_level_change",
        }
    }

    pub fn acting_user_id(&self) -> Option<i64> {
        match self {
            AuditAction::ChangeTrustLevel { acting_user_id } => Some(*acting_user_id),
            AuditAction::AutoTrustLevelChange => None,
        }
    }
}

/// Durable trust level history entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub target_user_id: i64,
    pub previous_value: TrustLevel,
    pub new_value: TrustLevel,
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    pub fn staff(acting_user_id: i64, target_user_id: i64, old: TrustLevel, new: TrustLevel) -> Self {
        Self {
            action: AuditAction::ChangeTrustLevel { acting_user_id },
            target_user_id,
            previous_value: old,
            new_value: new,
            created_at: Utc::now(),
        }
    }

    pub fn automatic(target_user_id: i64, old: TrustLevel, new: TrustLevel) -> Self {
        Self {
            action: AuditAction::AutoTrustLevelChange,
            target_user_id,
            previous_value: old,
            new_value: new,
            created_at: Utc::now(),
        }
    }

    pub fn is_staff_action(&self) -> bool {
        matches!(self.action, AuditAction::ChangeTrustLevel { .. })
    }
}

/// Writes staged for one atomic trust level change.
/// `user` already carries the new level and the re-rendered bio.
#[derive(Debug, Clone)]
pub struct TransitionCommit {
    pub user: User,
    pub audit: AuditRecord,
}

// ============================================================================
// Events and Queues
// ============================================================================

/// Domain event emitted after a committed transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPromoted {
    pub user_id: i64,
    pub new_trust_level: TrustLevel,
    pub old_trust_level: TrustLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeId {
    BasicUser,
    Member,
    Regular,
    Leader,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BadgeTrigger {
    TrustLevelChange,
}

// ============================================================================
// Traits
// ============================================================================

/// Notifications that belong to the transition itself. Run by the store
/// inside the commit; an error aborts the commit. Must not call back into
/// the store.
#[async_trait]
pub trait TransitionEffects: Send + Sync {
    async fn apply(&self, commit: &TransitionCommit) -> anyhow::Result<()>;
}

/// Persistence for users and trust level history.
/// `commit_transition` must apply the user save, profile save, audit record
/// and `effects` together or not at all.
#[async_trait]
pub trait TrustStore: Send + Sync {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>>;

    async fn user_ids(&self) -> Result<Vec<i64>>;

    /// Overwrite the stored level without validation or history
    async fn update_trust_level_column(&self, user_id: i64, level: TrustLevel) -> Result<()>;

    async fn commit_transition(
        &self,
        commit: &TransitionCommit,
        effects: &dyn TransitionEffects,
    ) -> Result<()>;

    async fn audit_records(&self, user_id: i64) -> Result<Vec<AuditRecord>>;
}

#[async_trait]
pub trait StatisticsProvider: Send + Sync {
    async fn user_stat(&self, user: &User) -> anyhow::Result<UserStat>;
}

pub trait ThresholdProvider: Send + Sync {
    fn thresholds(&self) -> RequirementThresholds;

    fn requirement(&self, level: TrustLevel, field: RequirementField) -> Option<u64> {
        self.thresholds().requirement(level, field)
    }
}

impl ThresholdProvider for RequirementThresholds {
    fn thresholds(&self) -> RequirementThresholds {
        self.clone()
    }
}

/// Level 3 qualification, computed elsewhere
#[async_trait]
pub trait Tl3Evaluator: Send + Sync {
    async fn requirements_met(&self, user: &User) -> anyhow::Result<bool>;

    async fn requirements_lost(&self, user: &User) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait TrustLevelCalculator: Send + Sync {
    async fn calculate(
        &self,
        user: &User,
        use_previous_trust_level: bool,
    ) -> anyhow::Result<Option<TrustLevel>>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn user_promoted(&self, event: UserPromoted) -> anyhow::Result<()>;
}

#[async_trait]
pub trait GroupMembership: Send + Sync {
    async fn user_trust_level_change(&self, user_id: i64, level: TrustLevel) -> anyhow::Result<()>;
}

#[async_trait]
pub trait BadgeGranter: Send + Sync {
    async fn badge_enabled(&self, badge: BadgeId) -> anyhow::Result<bool>;

    async fn user_has_badge(&self, user_id: i64, badge: BadgeId) -> anyhow::Result<bool>;

    /// Fire-and-forget; the grant runs on the badge worker
    async fn queue_badge_grant(&self, trigger: BadgeTrigger, user_id: i64) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    async fn enqueue_member_welcome_message(&self, user_id: i64) -> anyhow::Result<()>;

    async fn enqueue_tl2_promotion_message(&self, user_id: i64) -> anyhow::Result<()>;
}
