//! Trust Promotion
//!
//! Trust level engine for a forum: decides when users are promoted or lose a
//! level based on their engagement statistics, and commits audited
//! transitions.
//!
//! ## Module Structure
//!
//! ```text
//! src/
//! ├── lib.rs         - Crate root with re-exports
//! ├── main.rs        - Scheduled job entrypoint
//! ├── config.rs      - Configuration management
//! ├── error.rs       - Error taxonomy
//! ├── jobs.rs        - Batch review / recalculation pass
//! ├── trust/         - Trust level progression
//! │   ├── level.rs        - Trust level enumeration
//! │   ├── user.rs         - User, profile and statistics snapshots
//! │   ├── requirements.rs - Thresholds & qualification predicates
//! │   ├── modifiers.rs    - Plugin override points
//! │   └── promotion.rs    - Review, transition commit, recalculation
//! ├── services/      - Collaborator traits
//! │   ├── bio.rs        - Bio rendering
//! │   ├── calculator.rs - Granted trust level calculator
//! │   ├── logged.rs     - Log-only fan-out collaborators
//! │   ├── memory.rs     - In-memory implementations
//! │   └── tl3.rs        - Statistics-based level 3 evaluator
//! └── database/      - PostgreSQL persistence
//! ```

pub mod config;
pub mod database;
pub mod error;
pub mod jobs;
pub mod services;
pub mod trust;

// Re-export main types for convenience
pub use config::{JobMode, TrustConfig};
pub use database::{DatabasePool, UserRepository};
pub use error::{PromotionError, Result};
pub use jobs::{JobSummary, TrustLevelJob};
pub use services::{
    AuditAction, AuditRecord, BadgeGranter, BadgeId, BadgeTrigger, BioRenderer, EventBus,
    GroupMembership, MessageQueue, StatisticsProvider, StatisticsTl3Evaluator, ThresholdProvider,
    Tl3Evaluator, TransitionCommit, TransitionEffects, TrustLevelCalculator, TrustStore,
    UserPromoted,
};
pub use trust::{
    Actor, ChangeOptions, Modifiers, PromotionEngine, Recalculation, RequirementField,
    RequirementThresholds, Tl3Requirements, TrustLevel, User, UserProfile, UserStat,
};
