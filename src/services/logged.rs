//! Log-only collaborators
//!
//! Default fan-out for a standalone deployment with no event bus, group
//! subsystem, badge worker or mail queue attached. Each call is written to
//! the log and nothing is retained.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::services::{
    BadgeGranter, BadgeId, BadgeTrigger, EventBus, GroupMembership, MessageQueue, UserPromoted,
};
use crate::trust::TrustLevel;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggedEventBus;

#[async_trait]
impl EventBus for LoggedEventBus {
    async fn user_promoted(&self, event: UserPromoted) -> anyhow::Result<()> {
        info!(
            user_id = event.user_id,
            old_level = %event.old_trust_level,
            new_level = %event.new_trust_level,
            "user_promoted"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggedGroupMembership;

#[async_trait]
impl GroupMembership for LoggedGroupMembership {
    async fn user_trust_level_change(&self, user_id: i64, level: TrustLevel) -> anyhow::Result<()> {
        debug!(user_id, level = %level, "Group membership sync");
        Ok(())
    }
}

/// No badges configured: none are enabled or held, grants are only logged
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggedBadgeQueue;

#[async_trait]
impl BadgeGranter for LoggedBadgeQueue {
    async fn badge_enabled(&self, _badge: BadgeId) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn user_has_badge(&self, _user_id: i64, _badge: BadgeId) -> anyhow::Result<bool> {
        Ok(false)
    }

    async fn queue_badge_grant(&self, trigger: BadgeTrigger, user_id: i64) -> anyhow::Result<()> {
        debug!(user_id, trigger = ?trigger, "Badge grant queued");
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LoggedMessageQueue;

#[async_trait]
impl MessageQueue for LoggedMessageQueue {
    async fn enqueue_member_welcome_message(&self, user_id: i64) -> anyhow::Result<()> {
        info!(user_id, "Welcome message queued");
        Ok(())
    }

    async fn enqueue_tl2_promotion_message(&self, user_id: i64) -> anyhow::Result<()> {
        info!(user_id, "Member promotion message queued");
        Ok(())
    }
}
