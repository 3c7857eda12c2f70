//! Middleware components
//!
//! This module contains middleware for:
//! - Session authentication and permission checks
//! - API key authentication and scope checks
//! - Rate limiting

pub mod api_key;
pub mod auth;
pub mod rate_limit;

pub use api_key::{api_key_auth_middleware, check_scopes, hash_key, AuthedKey, KEY_PREFIX};
pub use auth::{check_permissions, session_auth_middleware};
pub use rate_limit::{auth_rate_limit_config, rate_limit_middleware, RateLimitState};
