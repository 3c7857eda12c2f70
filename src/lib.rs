//! Crewdeck library
//!
//! Multi-tenant workspace management API: workspaces, members,
//! invitations, API keys and webhook configuration over external identity
//! and webhook-delivery providers.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod db;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

pub use config::AppConfig;
pub use db::DbPool;
pub use utils::{AppError, AppResult};

use models::RoleTable;
use services::{CacheStore, DirectoryService, RelayClient, SessionResolver, SessionStore};

/// Application state shared across handlers
///
/// Every handle here is constructed by the process entry point and
/// injected; nothing is lazily initialized on first use.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: AppConfig,
    /// Database connection pool
    pub db: DbPool,
    /// Cache store (Redis or in-memory)
    pub cache: CacheStore,
    /// Cached identity reads
    pub directory: Arc<DirectoryService>,
    /// Webhook relay client
    pub relay: RelayClient,
    /// Static role table shared by all tenants
    pub roles: Arc<RoleTable>,
    /// Session-record storage
    pub sessions: SessionStore,
    /// Session resolver
    pub resolver: SessionResolver,
}
