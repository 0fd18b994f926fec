//! Default trust level calculator
//!
//! The granted level is the highest of the manual lock, the group-granted
//! level and, in floor mode, the previously recorded level.

use async_trait::async_trait;

use crate::services::TrustLevelCalculator;
use crate::trust::{TrustLevel, User};

#[derive(Debug, Clone, Default)]
pub struct DefaultTrustLevelCalculator;

impl DefaultTrustLevelCalculator {
    pub fn granted(user: &User, use_previous_trust_level: bool) -> Option<TrustLevel> {
        let previous = if use_previous_trust_level {
            user.previous_trust_level
        } else {
            None
        };

        [
            user.manual_locked_trust_level,
            user.group_granted_trust_level,
            previous,
        ]
        .into_iter()
        .flatten()
        .max()
    }
}

#[async_trait]
impl TrustLevelCalculator for DefaultTrustLevelCalculator {
    async fn calculate(
        &self,
        user: &User,
        use_previous_trust_level: bool,
    ) -> anyhow::Result<Option<TrustLevel>> {
        Ok(Self::granted(user, use_previous_trust_level))
    }
}
