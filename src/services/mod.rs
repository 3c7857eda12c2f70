//! Business logic services

pub mod cache;
pub mod directory;
pub mod identity;
pub mod relay;
pub mod session;

pub use cache::{CacheBackend, CacheStore, MemoryCache, RedisCache};
pub use directory::DirectoryService;
pub use identity::IdentityClient;
pub use relay::RelayClient;
pub use session::{SessionResolver, SessionStore};
