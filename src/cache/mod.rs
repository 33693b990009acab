//! Response cache for origin outcomes.
//!
//! - **Store**: key → outcome map with positive and negative TTLs
//! - **Liveness**: origin health consulted before an expired entry is evicted
//!
//! ## Configuration
//!
//! ```toml
//! cache = true
//! cache_ttl = 600
//! negative_cache_ttl = 60
//! ```

mod config;
mod liveness;
pub(crate) mod lock;
mod store;

pub use config::CacheConfig;
pub use liveness::{AlwaysHealthy, OriginHealth, StatusProbe};
pub use store::{CacheEntry, CacheStore};
