//! Promotion Engine - Trust Level Orchestrator
//!
//! Reviews users for promotion, commits audited transitions and re-derives
//! trust levels from scratch. Qualification predicates are pure functions of
//! the loaded statistics and thresholds; only the transition commit writes.
//!
//! ```text
//! review ──► review_tl0 ──► change_trust_level ──► TrustStore::commit_transition
//!        └─► review_tl1 ─┘          │                  └─► event, group sync (in commit)
//!                                   └─► badge queue (after commit)
//!
//! recalculate ──► calculator ──► raw overwrite ──► review_tl0/1/2 cascade
//!                                                 └─► tl3 loss demotion
//! ```

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{PromotionError, Result};
use crate::services::{
    AuditRecord, BadgeGranter, BadgeId, BadgeTrigger, BioRenderer, DefaultTrustLevelCalculator,
    EventBus, GroupMembership, HtmlBioRenderer, LoggedBadgeQueue, LoggedEventBus,
    LoggedGroupMembership, LoggedMessageQueue, MessageQueue, StatisticsProvider,
    ThresholdProvider, Tl3Evaluator, TransitionCommit, TransitionEffects, TrustLevelCalculator,
    TrustStore, UserPromoted,
};
use crate::trust::{Actor, Modifiers, RequirementThresholds, TrustLevel, User};

/// Options for an explicit trust level change
#[derive(Debug, Clone, Default)]
pub struct ChangeOptions {
    /// Attribute the change to this actor as a staff action
    pub log_action_for: Option<Actor>,
}

impl ChangeOptions {
    pub fn logged_for(actor: Actor) -> Self {
        Self {
            log_action_for: Some(actor),
        }
    }
}

/// How a recalculation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recalculation {
    /// Level overwritten, cascade skipped because of a manual lock
    Locked { level: TrustLevel },
    /// A recalculate modifier took over the cascade
    Overridden,
    /// Cascade ran; `demoted` when level 3 was lost
    Completed { level: TrustLevel, demoted: bool },
}

pub struct PromotionEngine {
    store: Arc<dyn TrustStore>,
    stats: Arc<dyn StatisticsProvider>,
    thresholds: Arc<dyn ThresholdProvider>,
    tl3: Arc<dyn Tl3Evaluator>,
    calculator: Arc<dyn TrustLevelCalculator>,
    events: Arc<dyn EventBus>,
    groups: Arc<dyn GroupMembership>,
    badges: Arc<dyn BadgeGranter>,
    messages: Arc<dyn MessageQueue>,
    bio: Arc<dyn BioRenderer>,
    modifiers: Modifiers,
}

impl PromotionEngine {
    /// Engine with default thresholds and log-only fan-out
    pub fn new(
        store: Arc<dyn TrustStore>,
        stats: Arc<dyn StatisticsProvider>,
        tl3: Arc<dyn Tl3Evaluator>,
    ) -> Self {
        Self {
            store,
            stats,
            thresholds: Arc::new(RequirementThresholds::default()),
            tl3,
            calculator: Arc::new(DefaultTrustLevelCalculator),
            events: Arc::new(LoggedEventBus),
            groups: Arc::new(LoggedGroupMembership),
            badges: Arc::new(LoggedBadgeQueue),
            messages: Arc::new(LoggedMessageQueue),
            bio: Arc::new(HtmlBioRenderer),
            modifiers: Modifiers::new(),
        }
    }

    pub fn with_thresholds(mut self, thresholds: Arc<dyn ThresholdProvider>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn with_calculator(mut self, calculator: Arc<dyn TrustLevelCalculator>) -> Self {
        self.calculator = calculator;
        self
    }

    pub fn with_event_bus(mut self, events: Arc<dyn EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn with_group_membership(mut self, groups: Arc<dyn GroupMembership>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_badge_granter(mut self, badges: Arc<dyn BadgeGranter>) -> Self {
        self.badges = badges;
        self
    }

    pub fn with_message_queue(mut self, messages: Arc<dyn MessageQueue>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_bio_renderer(mut self, bio: Arc<dyn BioRenderer>) -> Self {
        self.bio = bio;
        self
    }

    pub fn with_modifiers(mut self, modifiers: Modifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn store(&self) -> &Arc<dyn TrustStore> {
        &self.store
    }

    // Qualification

    pub async fn tl1_met(&self, user: &User) -> Result<bool> {
        let stat = self.stats.user_stat(user).await?;
        Ok(self.thresholds.thresholds().tl1_met(user, &stat, Utc::now()))
    }

    pub async fn tl2_met(&self, user: &User) -> Result<bool> {
        let stat = self.stats.user_stat(user).await?;
        Ok(self.thresholds.thresholds().tl2_met(user, &stat, Utc::now()))
    }

    pub async fn tl3_met(&self, user: &User) -> Result<bool> {
        Ok(self.tl3.requirements_met(user).await?)
    }

    pub async fn tl3_lost(&self, user: &User) -> Result<bool> {
        Ok(self.tl3.requirements_lost(user).await?)
    }

    /// Whether the user meets the requirements of `level`.
    /// `None` for levels with no automatic requirements (NewUser, Leader).
    pub async fn meets(&self, level: TrustLevel, user: &User) -> Result<Option<bool>> {
        let met = match level {
            TrustLevel::Basic => self.tl1_met(user).await?,
            TrustLevel::Member => self.tl2_met(user).await?,
            TrustLevel::Regular => self.tl3_met(user).await?,
            TrustLevel::NewUser | TrustLevel::Leader => return Ok(None),
        };
        Ok(Some(met))
    }

    /// False while the user still meets the requirements of their current level
    pub async fn can_downgrade_trust_level(&self, user: &User) -> Result<bool> {
        Ok(!self.meets(user.trust_level, user).await?.unwrap_or(false))
    }

    // Review

    /// Review a user for promotion out of their current level.
    /// Returns true if the user was promoted.
    pub async fn review(&self, user: Option<&mut User>) -> Result<bool> {
        if self.modifiers.overrides_review(user.as_deref()) {
            debug!(user_id = ?user.as_ref().map(|u| u.id), "Review overridden by modifier");
            return Ok(true);
        }

        let Some(user) = user else {
            return Ok(false);
        };

        if user.is_locked() {
            return Ok(false);
        }

        // Promotion beyond Member needs the level 3 queries; recalculate handles it.
        if user.trust_level >= TrustLevel::Member {
            return Ok(false);
        }

        match user.trust_level {
            TrustLevel::NewUser => self.review_tl0(user).await,
            TrustLevel::Basic => self.review_tl1(user).await,
            _ => Ok(false),
        }
    }

    pub async fn review_tl0(&self, user: &mut User) -> Result<bool> {
        if self.tl1_met(user).await?
            && self
                .change_trust_level(user, TrustLevel::Basic, &ChangeOptions::default())
                .await?
        {
            self.welcome_new_basic_user(user).await;
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn review_tl1(&self, user: &mut User) -> Result<bool> {
        if self.tl2_met(user).await?
            && self
                .change_trust_level(user, TrustLevel::Member, &ChangeOptions::default())
                .await?
        {
            if let Err(e) = self.messages.enqueue_tl2_promotion_message(user.id).await {
                warn!(user_id = user.id, error = %e, "Failed to enqueue tl2 promotion message");
            }
            return Ok(true);
        }
        Ok(false)
    }

    pub async fn review_tl2(&self, user: &mut User) -> Result<bool> {
        Ok(self.tl3_met(user).await?
            && self
                .change_trust_level(user, TrustLevel::Regular, &ChangeOptions::default())
                .await?)
    }

    async fn welcome_new_basic_user(&self, user: &User) {
        let eligible = async {
            Ok::<bool, anyhow::Error>(
                self.badges.badge_enabled(BadgeId::BasicUser).await?
                    && !self.badges.user_has_badge(user.id, BadgeId::BasicUser).await?,
            )
        }
        .await;

        match eligible {
            Ok(true) => {
                if let Err(e) = self.messages.enqueue_member_welcome_message(user.id).await {
                    warn!(user_id = user.id, error = %e, "Failed to enqueue welcome message");
                }
            }
            Ok(false) => {}
            Err(e) => warn!(user_id = user.id, error = %e, "Badge lookup failed, skipping welcome message"),
        }
    }

    // Transition

    /// Validate a raw level and change to it
    pub async fn change_trust_level_to(
        &self,
        user: &mut User,
        level: i32,
        opts: &ChangeOptions,
    ) -> Result<bool> {
        let level = TrustLevel::try_from(level)?;
        self.change_trust_level(user, level, opts).await
    }

    /// Move the user to `new_level`. The audit record, user and bio writes,
    /// the `user_promoted` event and the group sync form one store
    /// transaction. On failure `user` is left as it was.
    pub async fn change_trust_level(
        &self,
        user: &mut User,
        new_level: TrustLevel,
        opts: &ChangeOptions,
    ) -> Result<bool> {
        let old_level = user.trust_level;

        if new_level < old_level && !user.is_locked() {
            if let Some(next_up) = new_level.next() {
                if self.meets(next_up, user).await?.unwrap_or(false) {
                    warn!(
                        user_id = user.id,
                        old_level = %old_level,
                        new_level = %new_level,
                        "Refused demotion of user who still qualifies"
                    );
                    return Err(PromotionError::InvalidAccess(change_failed_explanation(
                        user, new_level, old_level,
                    )));
                }
            }
        }

        let audit = match &opts.log_action_for {
            Some(admin) => AuditRecord::staff(admin.id, user.id, old_level, new_level),
            None => AuditRecord::automatic(user.id, old_level, new_level),
        };

        let mut staged = user.clone();
        staged.trust_level = new_level;
        staged.profile.bio_raw_will_change();
        staged.skip_email_validation = true;
        if let Some(raw) = staged.profile.bio_raw.as_deref() {
            staged.profile.bio_cooked = Some(self.bio.cook(raw, new_level));
        }

        let commit = TransitionCommit {
            user: staged,
            audit,
        };
        let effects = TransitionNotifier {
            events: self.events.as_ref(),
            groups: self.groups.as_ref(),
        };
        self.store.commit_transition(&commit, &effects).await?;

        *user = commit.user;
        user.skip_email_validation = false;
        user.profile.bio_needs_recook = false;

        info!(
            user_id = user.id,
            old_level = %old_level,
            new_level = %new_level,
            by = ?opts.log_action_for.as_ref().map(|a| a.id),
            system = opts.log_action_for.as_ref().is_some_and(Actor::is_system),
            "Trust level changed"
        );

        if let Err(e) = self
            .badges
            .queue_badge_grant(BadgeTrigger::TrustLevelChange, user.id)
            .await
        {
            warn!(user_id = user.id, error = %e, "Failed to queue badge grant");
        }
        Ok(true)
    }

    // Recalculation

    /// Re-derive the user's trust level from scratch
    pub async fn recalculate(
        &self,
        user: &mut User,
        performed_by: Option<&Actor>,
        use_previous_trust_level: bool,
    ) -> Result<Recalculation> {
        let mut granted = self
            .calculator
            .calculate(user, use_previous_trust_level)
            .await?
            .unwrap_or(TrustLevel::NewUser);

        if granted < user.trust_level && !self.can_downgrade_trust_level(user).await? {
            granted = user.trust_level;
        }

        self.store.update_trust_level_column(user.id, granted).await?;
        user.trust_level = granted;

        if user.is_locked() {
            return Ok(Recalculation::Locked { level: granted });
        }

        if self.modifiers.overrides_recalculate(user, granted) {
            debug!(user_id = user.id, "Recalculation overridden by modifier");
            return Ok(Recalculation::Overridden);
        }

        if granted < TrustLevel::Basic {
            self.review_tl0(user).await?;
        }
        if granted < TrustLevel::Member {
            self.review_tl1(user).await?;
        }
        if granted < TrustLevel::Regular {
            self.review_tl2(user).await?;
        }

        self.groups
            .user_trust_level_change(user.id, user.trust_level)
            .await?;

        let mut demoted = false;
        if user.trust_level == TrustLevel::Regular && self.tl3_lost(user).await? {
            let actor = performed_by.cloned().unwrap_or_else(Actor::system);
            self.change_trust_level(user, TrustLevel::Member, &ChangeOptions::logged_for(actor))
                .await?;
            demoted = true;
        }

        Ok(Recalculation::Completed {
            level: user.trust_level,
            demoted,
        })
    }
}

/// Event and group sync run inside the store commit
struct TransitionNotifier<'a> {
    events: &'a dyn EventBus,
    groups: &'a dyn GroupMembership,
}

#[async_trait]
impl<'a> TransitionEffects for TransitionNotifier<'a> {
    async fn apply(&self, commit: &TransitionCommit) -> anyhow::Result<()> {
        let user_id = commit.user.id;
        self.events
            .user_promoted(UserPromoted {
                user_id,
                new_trust_level: commit.audit.new_value,
                old_trust_level: commit.audit.previous_value,
            })
            .await?;
        self.groups
            .user_trust_level_change(user_id, commit.audit.new_value)
            .await
    }
}

fn change_failed_explanation(user: &User, new_level: TrustLevel, current: TrustLevel) -> String {
    let name = user.display_name();
    format!(
        "You attempted to demote {name} to '{new_level}'. However their trust level is already \
         '{current}'. {name} will remain at '{current}' - if you wish to demote user lock trust \
         level first"
    )
}
