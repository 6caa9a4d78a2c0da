use crate::error::RuleError;
use crate::event::DomainEvent;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Produces the cache keys to drop for an event.
pub type KeyGenerator = Arc<dyn Fn(&DomainEvent) -> Result<Vec<String>, RuleError> + Send + Sync>;
/// Decides whether a rule applies to an event.
pub type RuleCondition = Arc<dyn Fn(&DomainEvent) -> Result<bool, RuleError> + Send + Sync>;

/// Maps domain events of a type to invalidation actions.
///
/// ```
/// use tagcache::rule::InvalidationRule;
///
/// let rule = InvalidationRule::new("user-profile", "user.*")
///     .with_keys(|event| Ok(vec![format!("user:{}", event.data_str("/id").unwrap_or_default())]))
///     .with_tags(["user-lists"])
///     .with_patterns(["repo:user:*"])
///     .with_priority(100);
/// assert!(rule.enabled);
/// ```
#[derive(Clone)]
pub struct InvalidationRule {
    pub id:            String,
    /// Event type; `*` matches any sequence of characters.
    pub event_type:    String,
    pub key_generator: Option<KeyGenerator>,
    pub tags:          Vec<String>,
    pub patterns:      Vec<String>,
    pub condition:     Option<RuleCondition>,
    pub enabled:       bool,
    /// Rules with higher priority are executed first.
    pub priority:      i32,
}

impl InvalidationRule {
    pub fn new<I: Into<String>, E: Into<String>>(id: I, event_type: E) -> Self {
        Self {
            id:            id.into(),
            event_type:    event_type.into(),
            key_generator: None,
            tags:          Vec::new(),
            patterns:      Vec::new(),
            condition:     None,
            enabled:       true,
            priority:      0,
        }
    }

    pub fn with_keys<F>(mut self, generator: F) -> Self
    where
        F: Fn(&DomainEvent) -> Result<Vec<String>, RuleError> + Send + Sync + 'static,
    {
        self.key_generator = Some(Arc::new(generator));
        self
    }

    pub fn with_tags<I, T>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn with_patterns<I, T>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn when<F>(mut self, condition: F) -> Self
    where
        F: Fn(&DomainEvent) -> Result<bool, RuleError> + Send + Sync + 'static,
    {
        self.condition = Some(Arc::new(condition));
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    /// A rule without keys, tags, and patterns does nothing but still reports a successful execution.
    pub fn has_actions(&self) -> bool {
        self.key_generator.is_some() || !self.tags.is_empty() || !self.patterns.is_empty()
    }
}

impl Debug for InvalidationRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvalidationRule")
            .field("id", &self.id)
            .field("event_type", &self.event_type)
            .field("key_generator", &self.key_generator.as_ref().map(|_| "<fn>"))
            .field("tags", &self.tags)
            .field("patterns", &self.patterns)
            .field("condition", &self.condition.as_ref().map(|_| "<fn>"))
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .finish()
    }
}

/// Outcome of a single rule executed for a single event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationResult {
    pub rule_id:          String,
    pub success:          bool,
    /// Keys from the key generator that were actually removed.
    pub keys_invalidated: usize,
    /// Tags processed, not the entries removed by them.
    pub tags_invalidated: usize,
    /// Patterns processed, not the entries removed by them.
    pub patterns_matched: usize,
    pub execution_time:   Duration,
    /// Set iff `success` is `false`.
    pub error:            Option<String>,
}

impl InvalidationResult {
    pub(crate) fn new<S: Into<String>>(rule_id: S) -> Self {
        Self {
            rule_id:          rule_id.into(),
            success:          true,
            keys_invalidated: 0,
            tags_invalidated: 0,
            patterns_matched: 0,
            execution_time:   Duration::ZERO,
            error:            None,
        }
    }

    pub(crate) fn fail(&mut self, error: &RuleError) {
        self.success = false;
        self.error = Some(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_builder() {
        let rule = InvalidationRule::new("r", "order.*")
            .with_tags(["a", "b"])
            .with_tags(vec!["c".to_string()])
            .with_patterns(["order:*"])
            .when(|event| Ok(event.data_str("/status") == Some("paid")))
            .with_priority(-5)
            .disabled();

        assert_eq!(rule.tags, vec!["a", "b", "c"]);
        assert_eq!(rule.patterns, vec!["order:*"]);
        assert_eq!(rule.priority, -5);
        assert!(!rule.enabled);
        assert!(rule.has_actions());

        let condition = rule.condition.as_ref().unwrap();
        assert_eq!(condition(&DomainEvent::new("order.paid", json!({"status": "paid"}))), Ok(true));
        assert_eq!(condition(&DomainEvent::new("order.paid", json!({}))), Ok(false));

        assert!(!InvalidationRule::new("noop", "x").has_actions());
        assert!(format!("{rule:?}").contains("<fn>"));
    }

    #[test]
    fn test_result_failure() {
        let mut result = InvalidationResult::new("r");
        assert!(result.success);
        assert!(result.error.is_none());
        result.fail(&RuleError::new("boom"));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
    }
}
