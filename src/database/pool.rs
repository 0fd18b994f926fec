//! Database Connection Pool using sqlx

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use crate::database::users::UserRepository;
use crate::error::{PromotionError, Result};

pub struct DatabasePool {
    pool: PgPool,
    users: UserRepository,
}

impl DatabasePool {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(connection_string)
            .await
            .map_err(|e| {
                PromotionError::Persistence(format!("Failed to connect to PostgreSQL: {}", e))
            })?;

        info!("Connected to PostgreSQL");

        let users = UserRepository::new(pool.clone());

        Ok(Self { pool, users })
    }

    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema...");

        sqlx::query("CREATE SCHEMA IF NOT EXISTS trust")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                PromotionError::Persistence(format!("Failed to create trust schema: {}", e))
            })?;

        self.users.init_schema().await?;

        info!("Database schema initialized");
        Ok(())
    }

    pub fn users(&self) -> &UserRepository {
        &self.users
    }
}
