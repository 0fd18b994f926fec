use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use tracing::info;

use crate::trust::{RequirementThresholds, Tl1Requirements, Tl2Requirements, Tl3Requirements};

/// Configuration for the trust level service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Promotion thresholds
    pub requirements: RequirementThresholds,
    /// Level 3 thresholds for the statistics-based evaluator
    pub tl3_requirements: Tl3Requirements,
    /// Scheduled job configuration
    pub job: JobConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Emit span open/close events
    pub log_spans: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_spans: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// PostgreSQL connection string
    pub postgres_url: String,
    /// Enable PostgreSQL (if false, uses in-memory fallback)
    pub postgres_enabled: bool,
    /// Connection pool size
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            postgres_url: "postgresql://localhost:5432/forum".to_string(),
            postgres_enabled: false,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobMode {
    /// Lightweight per-level review
    Review,
    /// Full re-derivation including level 3
    Recalculate,
}

impl FromStr for JobMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "review" => Ok(JobMode::Review),
            "recalculate" => Ok(JobMode::Recalculate),
            other => Err(anyhow::anyhow!("Unknown job mode: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub mode: JobMode,
    /// Seconds between runs
    pub interval_secs: u64,
    /// Treat the previously recorded level as a floor when recalculating
    pub use_previous_trust_level: bool,
    /// Run a single pass and exit
    pub run_once: bool,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            mode: JobMode::Review,
            interval_secs: 15 * 60,
            use_previous_trust_level: false,
            run_once: false,
        }
    }
}

fn parse_var<T>(name: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    if let Ok(value) = env::var(name) {
        *target = value
            .parse()
            .with_context(|| format!("Invalid {} value", name))?;
    }
    Ok(())
}

impl TrustConfig {
    /// Load configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        // Logging configuration
        if let Ok(level) = env::var("TRUST_LOG_LEVEL") {
            config.logging.level = level;
        }
        parse_var("TRUST_LOG_SPANS", &mut config.logging.log_spans)?;

        // Database configuration
        if let Ok(url) = env::var("TRUST_POSTGRES_URL") {
            config.database.postgres_url = url;
        }
        parse_var("TRUST_POSTGRES_ENABLED", &mut config.database.postgres_enabled)?;
        parse_var("TRUST_POSTGRES_MAX_CONNECTIONS", &mut config.database.max_connections)?;

        // Requirement thresholds
        config.requirements.tl1 = Self::load_tl1()?;
        config.requirements.tl2 = Self::load_tl2()?;
        config.tl3_requirements = Self::load_tl3()?;

        // Job configuration
        if let Ok(mode) = env::var("TRUST_JOB_MODE") {
            config.job.mode = mode.parse()?;
        }
        parse_var("TRUST_JOB_INTERVAL_SECS", &mut config.job.interval_secs)?;
        parse_var(
            "TRUST_JOB_USE_PREVIOUS_TRUST_LEVEL",
            &mut config.job.use_previous_trust_level,
        )?;
        parse_var("TRUST_JOB_RUN_ONCE", &mut config.job.run_once)?;

        config.validate()?;

        info!(
            "Loaded trust configuration: mode={:?}, postgres_enabled={}",
            config.job.mode, config.database.postgres_enabled
        );

        Ok(config)
    }

    fn load_tl1() -> Result<Tl1Requirements> {
        let mut tl1 = Tl1Requirements::default();
        parse_var("TRUST_TL1_REQUIRES_TOPICS_ENTERED", &mut tl1.topics_entered)?;
        parse_var("TRUST_TL1_REQUIRES_READ_POSTS", &mut tl1.read_posts)?;
        parse_var("TRUST_TL1_REQUIRES_TIME_SPENT_MINS", &mut tl1.time_spent_mins)?;
        Ok(tl1)
    }

    fn load_tl2() -> Result<Tl2Requirements> {
        let mut tl2 = Tl2Requirements::default();
        parse_var("TRUST_TL2_REQUIRES_TOPICS_ENTERED", &mut tl2.topics_entered)?;
        parse_var("TRUST_TL2_REQUIRES_READ_POSTS", &mut tl2.read_posts)?;
        parse_var("TRUST_TL2_REQUIRES_TIME_SPENT_MINS", &mut tl2.time_spent_mins)?;
        parse_var("TRUST_TL2_REQUIRES_DAYS_VISITED", &mut tl2.days_visited)?;
        parse_var("TRUST_TL2_REQUIRES_LIKES_RECEIVED", &mut tl2.likes_received)?;
        parse_var("TRUST_TL2_REQUIRES_LIKES_GIVEN", &mut tl2.likes_given)?;
        parse_var("TRUST_TL2_REQUIRES_TOPIC_REPLY_COUNT", &mut tl2.topic_reply_count)?;
        Ok(tl2)
    }

    fn load_tl3() -> Result<Tl3Requirements> {
        let mut tl3 = Tl3Requirements::default();
        parse_var("TRUST_TL3_REQUIRES_DAYS_VISITED", &mut tl3.days_visited)?;
        parse_var("TRUST_TL3_REQUIRES_TOPICS_ENTERED", &mut tl3.topics_entered)?;
        parse_var("TRUST_TL3_REQUIRES_READ_POSTS", &mut tl3.read_posts)?;
        parse_var("TRUST_TL3_REQUIRES_TOPIC_REPLY_COUNT", &mut tl3.topic_reply_count)?;
        parse_var("TRUST_TL3_REQUIRES_LIKES_GIVEN", &mut tl3.likes_given)?;
        parse_var("TRUST_TL3_REQUIRES_LIKES_RECEIVED", &mut tl3.likes_received)?;
        Ok(tl3)
    }

    /// Validate configuration for consistency
    pub fn validate(&self) -> Result<()> {
        if self.job.interval_secs == 0 {
            return Err(anyhow::anyhow!("Job interval must be non-zero"));
        }

        if self.database.postgres_enabled {
            if self.database.postgres_url.is_empty() {
                return Err(anyhow::anyhow!(
                    "PostgreSQL is enabled but no connection string is set"
                ));
            }
            if self.database.max_connections == 0 {
                return Err(anyhow::anyhow!("PostgreSQL pool size must be non-zero"));
            }
        }

        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            other => return Err(anyhow::anyhow!("Unknown log level: {}", other)),
        }

        Ok(())
    }
}
