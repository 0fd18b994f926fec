//! Requirement Thresholds and Qualification Predicates
//!
//! Thresholds are inclusive: a counter equal to its threshold qualifies.
//! The account age check reuses `time_spent_mins` for both tiers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::trust::{TrustLevel, User, UserStat};

/// Thresholds for promotion out of NewUser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tl1Requirements {
    pub topics_entered: u64,
    pub read_posts: u64,
    pub time_spent_mins: u64,
}

impl Default for Tl1Requirements {
    fn default() -> Self {
        Self {
            topics_entered: 5,
            read_posts: 30,
            time_spent_mins: 10,
        }
    }
}

/// Thresholds for promotion out of Basic
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tl2Requirements {
    pub topics_entered: u64,
    pub read_posts: u64,
    pub time_spent_mins: u64,
    pub days_visited: u64,
    pub likes_received: u64,
    pub likes_given: u64,
    pub topic_reply_count: u64,
}

impl Default for Tl2Requirements {
    fn default() -> Self {
        Self {
            topics_entered: 20,
            read_posts: 100,
            time_spent_mins: 60,
            days_visited: 15,
            likes_received: 1,
            likes_given: 1,
            topic_reply_count: 3,
        }
    }
}

/// Lifetime activity thresholds for holding Regular.
/// A Regular loses the level once any counter drops below
/// `LOSS_RATIO` of its threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tl3Requirements {
    pub days_visited: u64,
    pub topics_entered: u64,
    pub read_posts: u64,
    pub topic_reply_count: u64,
    pub likes_given: u64,
    pub likes_received: u64,
}

impl Default for Tl3Requirements {
    fn default() -> Self {
        Self {
            days_visited: 50,
            topics_entered: 40,
            read_posts: 300,
            topic_reply_count: 10,
            likes_given: 30,
            likes_received: 20,
        }
    }
}

impl Tl3Requirements {
    pub const LOSS_RATIO: f64 = 0.9;

    fn pairs(&self, stat: &UserStat) -> [(u64, u64); 6] {
        [
            (stat.days_visited, self.days_visited),
            (stat.topics_entered, self.topics_entered),
            (stat.posts_read_count, self.read_posts),
            (stat.topic_reply_count, self.topic_reply_count),
            (stat.likes_given, self.likes_given),
            (stat.likes_received, self.likes_received),
        ]
    }

    pub fn met(&self, stat: &UserStat) -> bool {
        self.pairs(stat).iter().all(|(value, required)| value >= required)
    }

    pub fn lost(&self, stat: &UserStat) -> bool {
        self.pairs(stat)
            .iter()
            .any(|(value, required)| (*value as f64) < (*required as f64) * Self::LOSS_RATIO)
    }
}

/// Named requirement for `(level, field)` lookups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequirementField {
    TopicsEntered,
    ReadPosts,
    TimeSpentMins,
    DaysVisited,
    LikesReceived,
    LikesGiven,
    TopicReplyCount,
}

/// Per-level thresholds, immutable for the duration of one evaluation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementThresholds {
    pub tl1: Tl1Requirements,
    pub tl2: Tl2Requirements,
}

impl RequirementThresholds {
    /// Configured value for a field, `None` when the level has no such requirement.
    /// Level 3 requirements live in the level-3 evaluator and are never returned here.
    pub fn requirement(&self, level: TrustLevel, field: RequirementField) -> Option<u64> {
        use RequirementField::*;
        match (level, field) {
            (TrustLevel::Basic, TopicsEntered) => Some(self.tl1.topics_entered),
            (TrustLevel::Basic, ReadPosts) => Some(self.tl1.read_posts),
            (TrustLevel::Basic, TimeSpentMins) => Some(self.tl1.time_spent_mins),
            (TrustLevel::Member, TopicsEntered) => Some(self.tl2.topics_entered),
            (TrustLevel::Member, ReadPosts) => Some(self.tl2.read_posts),
            (TrustLevel::Member, TimeSpentMins) => Some(self.tl2.time_spent_mins),
            (TrustLevel::Member, DaysVisited) => Some(self.tl2.days_visited),
            (TrustLevel::Member, LikesReceived) => Some(self.tl2.likes_received),
            (TrustLevel::Member, LikesGiven) => Some(self.tl2.likes_given),
            (TrustLevel::Member, TopicReplyCount) => Some(self.tl2.topic_reply_count),
            _ => None,
        }
    }

    pub fn tl1_met(&self, user: &User, stat: &UserStat, now: DateTime<Utc>) -> bool {
        let req = &self.tl1;
        stat.topics_entered >= req.topics_entered
            && stat.posts_read_count >= req.read_posts
            && stat.time_read_minutes() >= req.time_spent_mins
            && account_old_enough(user, now, req.time_spent_mins)
    }

    pub fn tl2_met(&self, user: &User, stat: &UserStat, now: DateTime<Utc>) -> bool {
        let req = &self.tl2;
        stat.topics_entered >= req.topics_entered
            && stat.posts_read_count >= req.read_posts
            && stat.time_read_minutes() >= req.time_spent_mins
            && account_old_enough(user, now, req.time_spent_mins)
            && stat.days_visited >= req.days_visited
            && stat.likes_received >= req.likes_received
            && stat.likes_given >= req.likes_given
            && stat.topic_reply_count >= req.topic_reply_count
    }
}

fn account_old_enough(user: &User, now: DateTime<Utc>, minutes: u64) -> bool {
    let required = i64::try_from(minutes.saturating_mul(60)).unwrap_or(i64::MAX);
    user.age_seconds(now) >= required
}
