use async_trait::async_trait;

use crate::error::CacheError;

/// The invalidation operations [`EventInvalidator`](crate::invalidation::EventInvalidator) drives when an event
/// matches a rule.
#[async_trait]
pub trait CacheInvalidator: Send + Sync + 'static {
    /// Returns `true` if the key was there.
    async fn invalidate_key(&self, key: &str) -> bool;

    /// Returns the number of removed entries.
    async fn invalidate_tag(&self, tag: &str) -> usize;

    /// Returns the number of removed entries.
    async fn invalidate_pattern(&self, pattern: &str) -> Result<usize, CacheError>;

    async fn invalidate_keys(&self, keys: &[String]) -> usize {
        let mut removed = 0;
        for key in keys {
            if self.invalidate_key(key).await {
                removed += 1;
            }
        }
        removed
    }
}
