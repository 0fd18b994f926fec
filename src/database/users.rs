//! User Repository - Database operations for trust levels
//!
//! Handles persistence of users, profiles, engagement statistics and trust
//! level history. Transition commits run in one transaction holding the user
//! row lock, so concurrent evaluations of the same user serialize here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{PromotionError, Result};
use crate::services::{
    AuditAction, AuditRecord, StatisticsProvider, TransitionCommit, TransitionEffects, TrustStore,
};
use crate::trust::{TrustLevel, User, UserProfile, UserStat};

#[derive(Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Initialize trust tables and indexes
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing trust tables...");

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS trust.users (
                id BIGINT PRIMARY KEY,
                username VARCHAR(255) NOT NULL UNIQUE,
                name VARCHAR(255),
                email VARCHAR(513) NOT NULL,
                trust_level INTEGER NOT NULL DEFAULT 0,
                manual_locked_trust_level INTEGER,
                group_granted_trust_level INTEGER,
                previous_trust_level INTEGER,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW(),
                updated_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| PromotionError::Persistence(format!("Failed to create users table: {}", e)))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS trust.user_profiles (
                user_id BIGINT PRIMARY KEY REFERENCES trust.users(id),
                bio_raw TEXT,
                bio_cooked TEXT
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            PromotionError::Persistence(format!("Failed to create user_profiles table: {}", e))
        })?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS trust.user_stats (
                user_id BIGINT PRIMARY KEY REFERENCES trust.users(id),
                topics_entered BIGINT NOT NULL DEFAULT 0,
                posts_read_count BIGINT NOT NULL DEFAULT 0,
                time_read BIGINT NOT NULL DEFAULT 0,
                days_visited BIGINT NOT NULL DEFAULT 0,
                likes_received BIGINT NOT NULL DEFAULT 0,
                likes_given BIGINT NOT NULL DEFAULT 0,
                topic_reply_count BIGINT NOT NULL DEFAULT 0
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| PromotionError::Persistence(format!("Failed to create user_stats table: {}", e)))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS trust.topics (
                id BIGINT PRIMARY KEY,
                user_id BIGINT NOT NULL,
                archetype VARCHAR(50) NOT NULL DEFAULT 'regular'
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| PromotionError::Persistence(format!("Failed to create topics table: {}", e)))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS trust.posts (
                id BIGINT PRIMARY KEY,
                topic_id BIGINT NOT NULL REFERENCES trust.topics(id),
                user_id BIGINT NOT NULL,
                post_number INTEGER NOT NULL,
                deleted_at TIMESTAMP WITH TIME ZONE
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| PromotionError::Persistence(format!("Failed to create posts table: {}", e)))?;

        sqlx::query(r#"
            CREATE TABLE IF NOT EXISTS trust.user_histories (
                id BIGSERIAL PRIMARY KEY,
                action VARCHAR(50) NOT NULL,
                acting_user_id BIGINT,
                target_user_id BIGINT NOT NULL REFERENCES trust.users(id),
                previous_value INTEGER NOT NULL,
                new_value INTEGER NOT NULL,
                created_at TIMESTAMP WITH TIME ZONE NOT NULL DEFAULT NOW()
            )
        "#)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            PromotionError::Persistence(format!("Failed to create user_histories table: {}", e))
        })?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_user_histories_target ON trust.user_histories(target_user_id, created_at)")
            .execute(&self.pool)
            .await
            .map_err(|e| PromotionError::Persistence(format!("Failed to create user_histories index: {}", e)))?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_user ON trust.posts(user_id)")
            .execute(&self.pool)
            .await
            .map_err(|e| PromotionError::Persistence(format!("Failed to create posts index: {}", e)))?;

        info!("Trust tables initialized");
        Ok(())
    }

    /// Count distinct non-PM topics the user replied to, excluding their own,
    /// and store it on the stats row
    pub async fn calc_topic_reply_count(&self, user_id: i64) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(r#"
            SELECT COUNT(DISTINCT t.id)
            FROM trust.topics t
            INNER JOIN trust.posts p ON t.id = p.topic_id AND t.user_id <> p.user_id
            WHERE p.deleted_at IS NULL
              AND p.user_id = $1
              AND t.archetype <> 'private_message'
        "#)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| PromotionError::Persistence(format!("Failed to count topic replies: {}", e)))?;

        sqlx::query("UPDATE trust.user_stats SET topic_reply_count = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(count)
            .execute(&self.pool)
            .await
            .map_err(|e| PromotionError::Persistence(format!("Failed to store topic replies: {}", e)))?;

        Ok(count.max(0) as u64)
    }

    async fn load_stat(&self, user_id: i64) -> Result<UserStat> {
        let row = sqlx::query(r#"
            SELECT topics_entered, posts_read_count, time_read, days_visited,
                   likes_received, likes_given
            FROM trust.user_stats
            WHERE user_id = $1
        "#)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PromotionError::Persistence(format!("Failed to get user stats: {}", e)))?;

        let Some(row) = row else {
            return Ok(UserStat::default());
        };

        let counter = |column: &str| -> u64 { row.get::<i64, _>(column).max(0) as u64 };
        let mut stat = UserStat {
            topics_entered: counter("topics_entered"),
            posts_read_count: counter("posts_read_count"),
            time_read: counter("time_read"),
            days_visited: counter("days_visited"),
            likes_received: counter("likes_received"),
            likes_given: counter("likes_given"),
            topic_reply_count: 0,
        };
        stat.topic_reply_count = self.calc_topic_reply_count(user_id).await?;
        Ok(stat)
    }
}

fn level_column(row: &PgRow, column: &str) -> Result<Option<TrustLevel>> {
    let raw: Option<i32> = row.get(column);
    raw.map(TrustLevel::try_from).transpose()
}

fn user_from_row(row: &PgRow) -> Result<User> {
    let trust_level: i32 = row.get("trust_level");
    let created_at: DateTime<Utc> = row.get("created_at");

    Ok(User {
        id: row.get("id"),
        username: row.get("username"),
        name: row.get("name"),
        email: row.get("email"),
        trust_level: TrustLevel::try_from(trust_level)?,
        manual_locked_trust_level: level_column(row, "manual_locked_trust_level")?,
        group_granted_trust_level: level_column(row, "group_granted_trust_level")?,
        previous_trust_level: level_column(row, "previous_trust_level")?,
        created_at,
        skip_email_validation: false,
        profile: UserProfile {
            bio_raw: row.get("bio_raw"),
            bio_cooked: row.get("bio_cooked"),
            bio_needs_recook: false,
        },
    })
}

fn audit_from_row(row: &PgRow) -> Result<AuditRecord> {
    let action: String = row.get("action");
    let acting_user_id: Option<i64> = row.get("acting_user_id");
    let action = match (action.as_str(), acting_user_id) {
        ("change_trust_level", Some(acting_user_id)) => AuditAction::ChangeTrustLevel { acting_user_id },
        ("auto_trust_level_change", _) => AuditAction::AutoTrustLevelChange,
        (other, _) => {
            return Err(PromotionError::Persistence(format!(
                "Unknown history action {}",
                other
            )))
        }
    };

    Ok(AuditRecord {
        action,
        target_user_id: row.get("target_user_id"),
        previous_value: TrustLevel::try_from(row.get::<i32, _>("previous_value"))?,
        new_value: TrustLevel::try_from(row.get::<i32, _>("new_value"))?,
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl TrustStore for UserRepository {
    async fn find_user(&self, user_id: i64) -> Result<Option<User>> {
        let row = sqlx::query(r#"
            SELECT u.id, u.username, u.name, u.email, u.trust_level,
                   u.manual_locked_trust_level, u.group_granted_trust_level,
                   u.previous_trust_level, u.created_at, p.bio_raw, p.bio_cooked
            FROM trust.users u
            LEFT JOIN trust.user_profiles p ON p.user_id = u.id
            WHERE u.id = $1
        "#)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PromotionError::Persistence(format!("Failed to get user: {}", e)))?;

        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_ids(&self) -> Result<Vec<i64>> {
        sqlx::query_scalar("SELECT id FROM trust.users WHERE id > 0 ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PromotionError::Persistence(format!("Failed to list users: {}", e)))
    }

    async fn update_trust_level_column(&self, user_id: i64, level: TrustLevel) -> Result<()> {
        let result = sqlx::query("UPDATE trust.users SET trust_level = $2 WHERE id = $1")
            .bind(user_id)
            .bind(level.as_i32())
            .execute(&self.pool)
            .await
            .map_err(|e| PromotionError::Persistence(format!("Failed to update trust level: {}", e)))?;

        if result.rows_affected() == 0 {
            return Err(PromotionError::Persistence(format!("User {} not found", user_id)));
        }
        Ok(())
    }

    async fn commit_transition(
        &self,
        commit: &TransitionCommit,
        effects: &dyn TransitionEffects,
    ) -> Result<()> {
        let user = &commit.user;
        if !user.skip_email_validation && !user.email_is_valid() {
            return Err(PromotionError::Persistence(format!(
                "Email {} is invalid",
                user.email
            )));
        }

        let mut tx = self.pool.begin().await?;

        let locked: Option<i64> = sqlx::query_scalar("SELECT id FROM trust.users WHERE id = $1 FOR UPDATE")
            .bind(user.id)
            .fetch_optional(&mut *tx)
            .await?;
        if locked.is_none() {
            return Err(PromotionError::Persistence(format!("User {} not found", user.id)));
        }

        let audit = &commit.audit;
        sqlx::query(r#"
            INSERT INTO trust.user_histories
                (action, acting_user_id, target_user_id, previous_value, new_value, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
        "#)
        .bind(audit.action.as_str())
        .bind(audit.action.acting_user_id())
        .bind(audit.target_user_id)
        .bind(audit.previous_value.as_i32())
        .bind(audit.new_value.as_i32())
        .bind(audit.created_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE trust.users SET trust_level = $2, updated_at = NOW() WHERE id = $1")
            .bind(user.id)
            .bind(user.trust_level.as_i32())
            .execute(&mut *tx)
            .await?;

        sqlx::query(r#"
            INSERT INTO trust.user_profiles (user_id, bio_raw, bio_cooked)
            VALUES ($1, $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                bio_raw = EXCLUDED.bio_raw,
                bio_cooked = EXCLUDED.bio_cooked
        "#)
        .bind(user.id)
        .bind(&user.profile.bio_raw)
        .bind(&user.profile.bio_cooked)
        .execute(&mut *tx)
        .await?;

        // Dropping `tx` on error rolls back everything above
        effects.apply(commit).await?;

        tx.commit().await?;

        debug!(user_id = user.id, "Committed trust level transition");
        Ok(())
    }

    async fn audit_records(&self, user_id: i64) -> Result<Vec<AuditRecord>> {
        let rows = sqlx::query(r#"
            SELECT action, acting_user_id, target_user_id, previous_value, new_value, created_at
            FROM trust.user_histories
            WHERE target_user_id = $1
            ORDER BY created_at, id
        "#)
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PromotionError::Persistence(format!("Failed to get user history: {}", e)))?;

        rows.iter().map(audit_from_row).collect()
    }
}

#[async_trait]
impl StatisticsProvider for UserRepository {
    async fn user_stat(&self, user: &User) -> anyhow::Result<UserStat> {
        Ok(self.load_stat(user.id).await?)
    }
}
