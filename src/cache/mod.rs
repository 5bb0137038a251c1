//! Multi-tier content cache
//!
//! Four ordered tiers (edge, application, durable, predictive) with
//! read-through promotion, cascade writes, pattern invalidation, and
//! single-flight deduplication of upstream generation.

pub mod invalidator;
pub mod key;
pub mod manager;
pub mod single_flight;
pub mod tier;

pub use invalidator::CacheInvalidator;
pub use key::{CacheKey, KeyPattern};
pub use manager::CacheTierManager;
pub use single_flight::SingleFlightCoordinator;
pub use tier::{CacheEntry, MemoryTier, TierBackend, TierLevel};
