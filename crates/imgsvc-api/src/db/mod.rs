//! # Database Persistence Layer
//!
//! Postgres storage for the Variant Index via SQLx.
//!
//! The database is **optional**. When `DATABASE_URL` is set the service keeps
//! the Variant Index in Postgres so it survives restarts and is shared by
//! every replica. When absent, an in-memory index is used (development and
//! tests).
//!
//! Raw and formatted objects never go through this layer; they live in the
//! object stores.

pub mod variant_index;

use sqlx::postgres::{PgPool, PgPoolOptions};

pub use variant_index::PgVariantIndex;

/// Connect to `url` and run the embedded migrations.
pub async fn init_pool(url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(std::time::Duration::from_secs(5))
        .connect(url)
        .await?;

    tracing::info!("Connected to PostgreSQL");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("Database migrations applied");

    Ok(pool)
}
