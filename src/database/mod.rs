//! PostgreSQL Database Module
//!
//! Provides the Postgres-backed trust store and statistics provider.

pub mod pool;
pub mod users;

pub use pool::DatabasePool;
pub use users::UserRepository;
