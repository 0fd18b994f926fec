//! Level 3 evaluation from lifetime statistics

use async_trait::async_trait;
use std::sync::Arc;

use crate::services::{StatisticsProvider, Tl3Evaluator};
use crate::trust::{Tl3Requirements, User};

pub struct StatisticsTl3Evaluator {
    stats: Arc<dyn StatisticsProvider>,
    requirements: Tl3Requirements,
}

impl StatisticsTl3Evaluator {
    pub fn new(stats: Arc<dyn StatisticsProvider>, requirements: Tl3Requirements) -> Self {
        Self {
            stats,
            requirements,
        }
    }
}

#[async_trait]
impl Tl3Evaluator for StatisticsTl3Evaluator {
    async fn requirements_met(&self, user: &User) -> anyhow::Result<bool> {
        let stat = self.stats.user_stat(user).await?;
        Ok(self.requirements.met(&stat))
    }

    async fn requirements_lost(&self, user: &User) -> anyhow::Result<bool> {
        let stat = self.stats.user_stat(user).await?;
        Ok(self.requirements.lost(&stat))
    }
}
