//! Trust Level Progression
//!
//! Decides when a user moves between trust levels and commits the change.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │ RequirementThresholds│────►│ PromotionEngine  │◄────│ Modifiers       │
//! │ (tl1 / tl2 checks)   │     │ (orchestrator)   │     │ (plugin hooks)  │
//! └──────────────────────┘     └────────┬─────────┘     └─────────────────┘
//!                                       │
//!                                       ▼
//!                               ┌──────────────────┐
//!                               │ TrustStore       │
//!                               │ (atomic commit + │
//!                               │  audit history)  │
//!                               └──────────────────┘
//! ```
//!
//! ## Level Model
//!
//! - NewUser → Basic → Member are reached through `review`
//! - Regular is reached and lost only through `recalculate`
//! - Leader is never granted automatically
//! - A manual lock freezes every automatic transition

mod level;
mod modifiers;
mod promotion;
mod requirements;
mod user;

pub use level::TrustLevel;
pub use modifiers::Modifiers;
pub use promotion::{ChangeOptions, PromotionEngine, Recalculation};
pub use requirements::{
    RequirementField, RequirementThresholds, Tl1Requirements, Tl2Requirements, Tl3Requirements,
};
pub use user::{Actor, User, UserProfile, UserStat};
