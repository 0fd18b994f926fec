use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{Level, error, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use trust_promotion::{
    DatabasePool, JobMode, PromotionEngine, StatisticsProvider, StatisticsTl3Evaluator,
    TrustConfig, TrustLevelJob, TrustStore,
    services::memory::{InMemoryStatistics, InMemoryTrustStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first - this validates thresholds and job settings
    let config = TrustConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        eprintln!("Please check TRUST_* environment variables.");
        e
    })?;

    init_logging(&config)?;

    info!("Starting trust level job");
    info!(
        "Thresholds: tl1 topics={} posts={} mins={}, tl2 topics={} posts={} mins={} days={}",
        config.requirements.tl1.topics_entered,
        config.requirements.tl1.read_posts,
        config.requirements.tl1.time_spent_mins,
        config.requirements.tl2.topics_entered,
        config.requirements.tl2.read_posts,
        config.requirements.tl2.time_spent_mins,
        config.requirements.tl2.days_visited,
    );

    let (store, stats): (Arc<dyn TrustStore>, Arc<dyn StatisticsProvider>) =
        if config.database.postgres_enabled {
            let db = DatabasePool::new(&config.database.postgres_url, config.database.max_connections)
                .await?;
            db.init_schema().await?;
            let users = Arc::new(db.users().clone());
            (
                users.clone() as Arc<dyn TrustStore>,
                users as Arc<dyn StatisticsProvider>,
            )
        } else {
            warn!("PostgreSQL disabled, using in-memory store (no users will be processed)");
            (
                Arc::new(InMemoryTrustStore::new()) as Arc<dyn TrustStore>,
                Arc::new(InMemoryStatistics::new()) as Arc<dyn StatisticsProvider>,
            )
        };

    let tl3 = Arc::new(StatisticsTl3Evaluator::new(
        stats.clone(),
        config.tl3_requirements.clone(),
    ));
    let engine = Arc::new(
        PromotionEngine::new(store, stats, tl3)
            .with_thresholds(Arc::new(config.requirements.clone())),
    );
    let job = TrustLevelJob::new(engine, config.job.mode)
        .with_previous_trust_level(config.job.use_previous_trust_level);

    if config.job.run_once {
        let summary = job.run_once().await?;
        info!("Single pass complete: {}", serde_json::to_string(&summary)?);
        return Ok(());
    }

    let mut interval = tokio::time::interval(Duration::from_secs(config.job.interval_secs));

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = job.run_once().await {
                    error!("Trust level job failed: {}", e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    Ok(())
}

/// Install the fmt subscriber and announce what this process will run
fn init_logging(config: &TrustConfig) -> Result<()> {
    let level: Level = config
        .logging
        .level
        .parse()
        .with_context(|| format!("Invalid log level {}", config.logging.level))?;
    let span_events = if config.logging.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(span_events)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    let mode = match config.job.mode {
        JobMode::Review => "review",
        JobMode::Recalculate => "recalculate",
    };
    if config.job.run_once {
        info!(mode, "Logging initialized, running a single pass");
    } else {
        info!(
            mode,
            interval_secs = config.job.interval_secs,
            "Logging initialized, running on an interval"
        );
    }
    Ok(())
}
