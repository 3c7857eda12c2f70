//! Database layer
//!
//! SQLite storage for the records this service owns itself: API keys and
//! invitation shadow records. Everything else (users, workspaces,
//! memberships, webhook destinations) lives in the external providers.

pub mod api_key_repository;
pub mod invitation_repository;

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

use crate::config::DatabaseConfig;

pub use api_key_repository::ApiKeyRepository;
pub use invitation_repository::InvitationRepository;

/// Database connection pool type
pub type DbPool = Pool<Sqlite>;

/// Initialize the database connection pool and ensure the schema exists
pub async fn init_pool(config: &DatabaseConfig) -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str(&config.url)
        .with_context(|| format!("Invalid database URL: {}", config.url))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
        .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;

    Ok(pool)
}

/// Create tables and indexes if they do not exist yet
async fn init_schema(pool: &DbPool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            workspace_id TEXT NOT NULL,
            created_by TEXT NOT NULL,
            name TEXT NOT NULL,
            key_hash TEXT NOT NULL UNIQUE,
            preview TEXT NOT NULL,
            scopes TEXT NOT NULL,
            last_used_at TEXT,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create api_keys table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_api_keys_workspace ON api_keys(workspace_id)",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS invitations (
            id TEXT PRIMARY KEY,
            provider_id TEXT NOT NULL UNIQUE,
            workspace_id TEXT NOT NULL,
            invitee_email TEXT NOT NULL,
            role_name TEXT NOT NULL,
            invited_by TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create invitations table")?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_invitations_workspace ON invitations(workspace_id)",
    )
    .execute(pool)
    .await?;

    // One live invitation per address per workspace
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_invitations_pending_email
        ON invitations(workspace_id, invitee_email) WHERE status = 'pending'
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    init_pool(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections: 1,
        min_connections: 1,
        connect_timeout_secs: 5,
        idle_timeout_secs: 600,
    })
    .await
    .expect("Failed to initialize test database")
}
