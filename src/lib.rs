//! # tagcache
//!
//! In-process L1 cache for service backends, with event-driven invalidation.
//!
//! # The Basics
//!
//! The crate is built around two pieces:
//!
//! - [`MemoryCache`], a key/value store with per-entry TTL, a size bound with LRU, FIFO, or LFU eviction, tags, and
//!   glob-pattern invalidation. Expired entries are dropped on read and by a background sweeper.
//! - [`EventInvalidator`], which takes domain events, finds the [`InvalidationRule`]s registered for their types in an
//!   [`InvalidationRuleRegistry`], and runs them against the cache.
//!
//! Keys and tags are strings; values are anything `Clone + Send + Sync`. As an "L1" cache it doesn't support
//! distributed caching, nor does it persist anything.
//!
//! # Invalidation Rules
//!
//! A rule is bound to an event type pattern where `*` matches any sequence of characters, so `user.*` covers
//! `user.updated` and `user.deleted`. When an event matches, the rule drops:
//!
//! 1. the keys its key generator builds from the event payload;
//! 2. all entries carrying any of its tags;
//! 3. all entries whose keys match any of its glob patterns.
//!
//! Rules run in priority order, highest first. A rule may have a condition to decide whether it applies to a
//! particular event. Every executed rule reports an [`InvalidationResult`](rule::InvalidationResult); a rule that
//! fails, or whose callback panics, reports the failure without interrupting the others.
//!
//! ```ignore
//! let cache = MemoryCache::<Profile>::new(CacheConfig::builder().max_size(10_000).build()?)?;
//! let registry = Arc::new(InvalidationRuleRegistry::new());
//! registry.register(
//!     InvalidationRule::new("profile", "user.*")
//!         .with_keys(|event| Ok(vec![format!("profile:{}", event.data_str("/id").unwrap_or_default())]))
//!         .with_tags(["user-lists"])
//!         .with_priority(100),
//! )?;
//!
//! let invalidator = EventInvalidator::new(cache.clone(), registry);
//! invalidator.handle_event(&DomainEvent::new("user.updated", json!({"id": "42"}))).await;
//! ```

pub mod cache;
pub mod config;
pub(crate) mod entry;
pub mod error;
pub mod event;
pub mod invalidation;
pub mod pattern;
pub mod registry;
pub mod rule;
pub(crate) mod stats;
pub(crate) mod sweeper;
pub(crate) mod tag_index;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use cache::MemoryCache;
#[doc(inline)]
pub use invalidation::EventInvalidator;
#[doc(inline)]
pub use registry::InvalidationRuleRegistry;
#[doc(inline)]
pub use rule::InvalidationRule;
#[doc(inline)]
pub use traits::CacheInvalidator;

pub mod prelude {
    pub use crate::cache::MemoryCache;
    pub use crate::config::CacheConfig;
    pub use crate::config::EvictionStrategy;
    pub use crate::error::CacheError;
    pub use crate::error::RuleError;
    pub use crate::event::DomainEvent;
    pub use crate::invalidation::EventInvalidator;
    pub use crate::registry::InvalidationRuleRegistry;
    pub use crate::rule::InvalidationResult;
    pub use crate::rule::InvalidationRule;
    pub use crate::traits::CacheInvalidator;
    pub use crate::types::*;
}
