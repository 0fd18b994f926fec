//! Trust Level Enumeration
//!
//! Five ordered tiers. Automatic transitions only ever move between
//! NewUser, Basic, Member and Regular; Leader is granted by staff.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::PromotionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
pub enum TrustLevel {
    NewUser = 0,
    Basic = 1,
    Member = 2,
    Regular = 3,
    Leader = 4,
}

impl TrustLevel {
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// The next tier up, or `None` at Leader
    pub fn next(self) -> Option<TrustLevel> {
        TrustLevel::try_from(self.as_i32() + 1).ok()
    }
}

impl Default for TrustLevel {
    fn default() -> Self {
        TrustLevel::NewUser
    }
}

impl TryFrom<i32> for TrustLevel {
    type Error = PromotionError;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(TrustLevel::NewUser),
            1 => Ok(TrustLevel::Basic),
            2 => Ok(TrustLevel::Member),
            3 => Ok(TrustLevel::Regular),
            4 => Ok(TrustLevel::Leader),
            other => Err(PromotionError::InvalidTrustLevel(other)),
        }
    }
}

impl From<TrustLevel> for i32 {
    fn from(level: TrustLevel) -> Self {
        level.as_i32()
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_i32())
    }
}
