//! User, profile and statistics snapshots read by the promotion engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trust::TrustLevel;

/// Forum account as seen by the promotion engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub name: Option<String>,
    pub email: String,

    pub trust_level: TrustLevel,

    /// Staff-set level; presence freezes automatic transitions
    pub manual_locked_trust_level: Option<TrustLevel>,

    /// Highest level granted through group membership
    pub group_granted_trust_level: Option<TrustLevel>,

    /// Level recorded before the last reset
    pub previous_trust_level: Option<TrustLevel>,

    pub created_at: DateTime<Utc>,

    /// Set for system-initiated saves that bypass email verification
    #[serde(skip)]
    pub skip_email_validation: bool,

    pub profile: UserProfile,
}

impl User {
    pub fn new(id: i64, username: &str, email: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
            name: None,
            email: email.to_string(),
            trust_level: TrustLevel::NewUser,
            manual_locked_trust_level: None,
            group_granted_trust_level: None,
            previous_trust_level: None,
            created_at: Utc::now(),
            skip_email_validation: false,
            profile: UserProfile::default(),
        }
    }

    pub fn is_locked(&self) -> bool {
        self.manual_locked_trust_level.is_some()
    }

    /// Display name, falling back to the username
    pub fn display_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }

    /// Minimal shape check applied on ordinary saves
    pub fn email_is_valid(&self) -> bool {
        self.email
            .split_once('@')
            .is_some_and(|(local, domain)| !local.is_empty() && domain.contains('.'))
    }

    /// Account age in whole seconds at `now`
    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.created_at).num_seconds()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub bio_raw: Option<String>,
    pub bio_cooked: Option<String>,

    /// Raw bio must be re-rendered on next save
    #[serde(skip)]
    pub bio_needs_recook: bool,
}

impl UserProfile {
    pub fn bio_raw_will_change(&mut self) {
        self.bio_needs_recook = true;
    }
}

/// Aggregated engagement counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStat {
    pub topics_entered: u64,
    pub posts_read_count: u64,
    /// Cumulative reading time in seconds
    pub time_read: u64,
    pub days_visited: u64,
    pub likes_received: u64,
    pub likes_given: u64,
    /// Distinct topics the user replied in, excluding their own
    pub topic_reply_count: u64,
}

impl UserStat {
    /// Whole minutes of reading time
    pub fn time_read_minutes(&self) -> u64 {
        self.time_read / 60
    }
}

/// Identity an audited change is attributed to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
    pub username: String,
}

impl Actor {
    pub const SYSTEM_ID: i64 = -1;

    pub fn new(id: i64, username: &str) -> Self {
        Self {
            id,
            username: username.to_string(),
        }
    }

    pub fn system() -> Self {
        Self::new(Self::SYSTEM_ID, "system")
    }

    pub fn is_system(&self) -> bool {
        self.id == Self::SYSTEM_ID
    }
}
