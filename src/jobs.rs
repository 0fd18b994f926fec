//! Scheduled trust level job
//!
//! Walks every user in the store and reviews or recalculates them one at a
//! time. A failure for one user is logged and counted, and the batch moves on.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::config::JobMode;
use crate::error::Result;
use crate::trust::{PromotionEngine, Recalculation};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobSummary {
    pub examined: usize,
    /// Users whose trust level differs after the pass
    pub changed: usize,
    pub unchanged: usize,
    /// Ids listed by the store but gone by the time they were loaded
    pub missing: usize,
    pub failed: usize,
}

pub struct TrustLevelJob {
    engine: Arc<PromotionEngine>,
    mode: JobMode,
    use_previous_trust_level: bool,
}

impl TrustLevelJob {
    pub fn new(engine: Arc<PromotionEngine>, mode: JobMode) -> Self {
        Self {
            engine,
            mode,
            use_previous_trust_level: false,
        }
    }

    pub fn with_previous_trust_level(mut self, use_previous: bool) -> Self {
        self.use_previous_trust_level = use_previous;
        self
    }

    /// One pass over all users
    pub async fn run_once(&self) -> Result<JobSummary> {
        let ids = self.engine.store().user_ids().await?;
        let mut summary = JobSummary::default();

        for user_id in ids {
            summary.examined += 1;
            match self.process(user_id).await {
                Ok(Some(true)) => summary.changed += 1,
                Ok(Some(false)) => summary.unchanged += 1,
                Ok(None) => summary.missing += 1,
                Err(e) => {
                    error!(user_id, error = %e, "Trust level job failed for user");
                    summary.failed += 1;
                }
            }
        }

        info!(
            examined = summary.examined,
            changed = summary.changed,
            failed = summary.failed,
            mode = ?self.mode,
            "Trust level job finished"
        );
        Ok(summary)
    }

    async fn process(&self, user_id: i64) -> Result<Option<bool>> {
        let Some(mut user) = self.engine.store().find_user(user_id).await? else {
            return Ok(None);
        };
        let before = user.trust_level;

        match self.mode {
            JobMode::Review => {
                self.engine.review(Some(&mut user)).await?;
            }
            JobMode::Recalculate => {
                let outcome = self
                    .engine
                    .recalculate(&mut user, None, self.use_previous_trust_level)
                    .await?;
                if outcome == Recalculation::Overridden {
                    debug!(user_id, "Recalculation handled by modifier");
                }
            }
        }

        Ok(Some(user.trust_level != before))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::memory::{InMemoryStatistics, InMemoryTrustStore, StaticTl3Evaluator};
    use crate::services::TrustStore;
    use crate::trust::{TrustLevel, User, UserStat};
    use chrono::{Duration, Utc};

    #[tokio::test]
    async fn test_review_pass_counts_changes() {
        let store = Arc::new(InMemoryTrustStore::new());
        let stats = Arc::new(InMemoryStatistics::new());

        for id in 1..=3 {
            let mut user = User::new(id, &format!("user{}", id), &format!("user{}@example.com", id));
            user.created_at = Utc::now() - Duration::days(2);
            store.insert_user(user).await;
        }
        stats
            .set(
                2,
                UserStat {
                    topics_entered: 5,
                    posts_read_count: 30,
                    time_read: 600,
                    ..Default::default()
                },
            )
            .await;

        let engine = Arc::new(PromotionEngine::new(
            store.clone(),
            stats,
            Arc::new(StaticTl3Evaluator::new()),
        ));
        let summary = TrustLevelJob::new(engine, JobMode::Review)
            .run_once()
            .await
            .unwrap();

        assert_eq!(summary.examined, 3);
        assert_eq!(summary.changed, 1);
        assert_eq!(summary.unchanged, 2);
        assert_eq!(summary.failed, 0);

        let promoted = store.find_user(2).await.unwrap().unwrap();
        assert_eq!(promoted.trust_level, TrustLevel::Basic);
    }

    #[tokio::test]
    async fn test_failure_does_not_abort_batch() {
        let store = Arc::new(InMemoryTrustStore::new());
        let stats = Arc::new(InMemoryStatistics::new());
        let tl1 = UserStat {
            topics_entered: 5,
            posts_read_count: 30,
            time_read: 600,
            ..Default::default()
        };

        for id in 1..=2 {
            let mut user = User::new(id, &format!("user{}", id), &format!("user{}@example.com", id));
            user.created_at = Utc::now() - Duration::days(2);
            store.insert_user(user).await;
            stats.set(id, tl1.clone()).await;
        }
        store.fail_next_commit();

        let engine = Arc::new(PromotionEngine::new(
            store.clone(),
            stats,
            Arc::new(StaticTl3Evaluator::new()),
        ));
        let summary = TrustLevelJob::new(engine, JobMode::Review)
            .run_once()
            .await
            .unwrap();

        assert_eq!(summary.failed, 1);
        assert_eq!(summary.changed, 1);
    }
}
