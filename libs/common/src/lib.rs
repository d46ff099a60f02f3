//! Shared plumbing for the Homeserve services
//!
//! PostgreSQL connectivity and migrations, the Redis handle used for
//! sessions, JWT issuing and validation, and tracing initialisation.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
//!
//! # async fn boot() -> anyhow::Result<()> {
//! let pool = init_pool(&DatabaseConfig::from_env()?).await?;
//! run_migrations(&pool).await?;
//! assert!(health_check(&pool).await?);
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod jwt;
pub mod telemetry;
