use crate::error::RuleError;
use crate::event::DomainEvent;
use crate::registry::check_condition;
use crate::registry::panic_message;
use crate::registry::InvalidationRuleRegistry;
use crate::rule::InvalidationResult;
use crate::rule::InvalidationRule;
use crate::rule_err;
use crate::traits::CacheInvalidator;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;
use tracing::instrument;
use tracing::trace;
use tracing::warn;

/// Applies the registered invalidation rules to domain events.
///
/// For every event the matching rules are executed one by one, highest priority first. A rule first drops the keys
/// produced by its key generator, then its tags, then its patterns. A failing rule gets a failed
/// [`InvalidationResult`] and doesn't affect the rules after it.
///
/// ```ignore
/// let registry = Arc::new(InvalidationRuleRegistry::new());
/// registry.register(
///     InvalidationRule::new("user-changed", "user.*")
///         .with_keys(|event| Ok(vec![format!("repo:user:{}", event.data_str("/id").unwrap_or_default())]))
///         .with_tags(["user-lists"]),
/// )?;
///
/// let invalidator = EventInvalidator::new(cache.clone(), registry);
/// let results = invalidator.handle_event(&DomainEvent::new("user.updated", json!({"id": "42"}))).await;
/// ```
pub struct EventInvalidator {
    target:   Arc<dyn CacheInvalidator>,
    registry: Arc<InvalidationRuleRegistry>,
}

impl EventInvalidator {
    pub fn new<C: CacheInvalidator>(target: Arc<C>, registry: Arc<InvalidationRuleRegistry>) -> Self {
        Self {
            target: target as Arc<dyn CacheInvalidator>,
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<InvalidationRuleRegistry> {
        &self.registry
    }

    /// One result per executed rule, in execution order. Rules whose condition is false are skipped and produce no
    /// result.
    #[instrument(level = "debug", skip_all, fields(event_type = %event.event_type))]
    pub async fn handle_event(&self, event: &DomainEvent) -> Vec<InvalidationResult> {
        let rules = self.registry.candidates(event);
        let mut results = Vec::with_capacity(rules.len());

        for rule in rules {
            let started = Instant::now();
            let mut result = InvalidationResult::new(rule.id.as_str());

            match check_condition(&rule, event) {
                Ok(false) => {
                    trace!(rule_id = %rule.id, "Condition not met, rule skipped");
                    continue;
                }
                Ok(true) => {
                    if let Err(err) = self.execute(&rule, event, &mut result).await {
                        result.fail(&err);
                    }
                }
                Err(err) => result.fail(&err),
            }

            result.execution_time = started.elapsed();

            if let Some(ref error) = result.error {
                warn!(rule_id = %rule.id, error = %error, "Invalidation rule failed");
            }
            else {
                debug!(
                    rule_id = %rule.id,
                    keys = result.keys_invalidated,
                    tags = result.tags_invalidated,
                    patterns = result.patterns_matched,
                    "Invalidation rule executed"
                );
            }

            results.push(result);
        }

        results
    }

    /// Events are handled one after another, each independently of the others. Results are concatenated.
    pub async fn handle_events(&self, events: &[DomainEvent]) -> Vec<InvalidationResult> {
        let mut results = Vec::new();
        for event in events {
            results.extend(self.handle_event(event).await);
        }
        results
    }

    // Counters in `result` are updated as the steps go so that a failure leaves the partial counts in place.
    async fn execute(
        &self,
        rule: &InvalidationRule,
        event: &DomainEvent,
        result: &mut InvalidationResult,
    ) -> Result<(), RuleError> {
        if let Some(ref generator) = rule.key_generator {
            let keys = catch_unwind(AssertUnwindSafe(|| generator(event)))
                .unwrap_or_else(|panic| Err(rule_err!("key generator panicked: {}", panic_message(&*panic))))?;
            result.keys_invalidated += self.target.invalidate_keys(&keys).await;
        }

        for tag in &rule.tags {
            self.target.invalidate_tag(tag).await;
            result.tags_invalidated += 1;
        }

        for pattern in &rule.patterns {
            self.target.invalidate_pattern(pattern).await?;
            result.patterns_matched += 1;
        }

        Ok(())
    }
}

impl std::fmt::Debug for EventInvalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventInvalidator")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CacheError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;

    // Records the calls instead of touching a real cache.
    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl CacheInvalidator for Recorder {
        async fn invalidate_key(&self, key: &str) -> bool {
            self.calls.lock().push(format!("key:{key}"));
            !key.starts_with("missing")
        }

        async fn invalidate_tag(&self, tag: &str) -> usize {
            self.calls.lock().push(format!("tag:{tag}"));
            3
        }

        async fn invalidate_pattern(&self, pattern: &str) -> Result<usize, CacheError> {
            if pattern.is_empty() {
                return Err(CacheError::invalid_pattern(pattern, "pattern is empty"));
            }
            self.calls.lock().push(format!("pattern:{pattern}"));
            Ok(1)
        }
    }

    fn setup(rules: Vec<InvalidationRule>) -> (Arc<Recorder>, EventInvalidator) {
        let recorder = Arc::new(Recorder::default());
        let registry = Arc::new(InvalidationRuleRegistry::new());
        registry.register_many(rules).unwrap();
        (Arc::clone(&recorder), EventInvalidator::new(recorder, registry))
    }

    #[tokio::test]
    async fn test_step_order_and_counts() {
        let (recorder, invalidator) = setup(vec![InvalidationRule::new("r", "user.updated")
            .with_keys(|_| Ok(vec!["user:1".into(), "missing:2".into()]))
            .with_tags(["users", "profiles"])
            .with_patterns(["repo:user:*"])]);

        let results = invalidator
            .handle_event(&DomainEvent::new("user.updated", json!({})))
            .await;

        assert_eq!(results.len(), 1);
        let result = &results[0];
        assert!(result.success);
        assert_eq!(result.keys_invalidated, 1);
        assert_eq!(result.tags_invalidated, 2);
        assert_eq!(result.patterns_matched, 1);
        assert!(result.error.is_none());

        assert_eq!(
            *recorder.calls.lock(),
            vec!["key:user:1", "key:missing:2", "tag:users", "tag:profiles", "pattern:repo:user:*"]
        );
    }

    #[tokio::test]
    async fn test_partial_counts_on_failure() {
        let (recorder, invalidator) = setup(vec![
            InvalidationRule::new("bad-pattern", "e")
                .with_keys(|_| Ok(vec!["k".into()]))
                .with_tags(["t"])
                .with_patterns(["p:*", "", "never:*"])
                .with_priority(10),
            InvalidationRule::new("after", "e").with_tags(["t2"]),
        ]);

        let results = invalidator.handle_event(&DomainEvent::new("e", json!(null))).await;
        assert_eq!(results.len(), 2);

        let failed = &results[0];
        assert_eq!(failed.rule_id, "bad-pattern");
        assert!(!failed.success);
        assert_eq!(failed.keys_invalidated, 1);
        assert_eq!(failed.tags_invalidated, 1);
        assert_eq!(failed.patterns_matched, 1);
        assert!(failed.error.as_deref().unwrap().contains("pattern is empty"));

        assert_eq!(results[1].rule_id, "after");
        assert!(results[1].success);
        assert!(!recorder.calls.lock().iter().any(|c| c == "pattern:never:*"));
    }

    #[tokio::test]
    async fn test_panicking_generator() {
        let (_recorder, invalidator) = setup(vec![
            InvalidationRule::new("panicky", "e")
                .with_keys(|_| panic!("generator exploded"))
                .with_priority(1),
            InvalidationRule::new("fine", "e").with_keys(|_| Ok(vec!["k".into()])),
        ]);

        let results = invalidator.handle_event(&DomainEvent::new("e", json!(null))).await;
        assert_eq!(results.len(), 2);
        assert!(!results[0].success);
        assert!(results[0].error.as_deref().unwrap().contains("generator exploded"));
        assert!(results[1].success);
        assert_eq!(results[1].keys_invalidated, 1);
    }

    #[tokio::test]
    async fn test_conditions() {
        let (recorder, invalidator) = setup(vec![
            InvalidationRule::new("skipped", "e")
                .with_tags(["never"])
                .when(|_| Ok(false)),
            InvalidationRule::new("failing", "e")
                .with_tags(["never"])
                .when(|_| Err("condition blew up".into())),
            InvalidationRule::new("noop", "e"),
        ]);

        let results = invalidator.handle_event(&DomainEvent::new("e", json!(null))).await;
        assert_eq!(results.len(), 2);

        assert_eq!(results[0].rule_id, "failing");
        assert!(!results[0].success);
        assert_eq!(results[0].error.as_deref(), Some("condition blew up"));
        assert_eq!(results[0].tags_invalidated, 0);

        assert_eq!(results[1].rule_id, "noop");
        assert!(results[1].success);
        assert_eq!(results[1].keys_invalidated + results[1].tags_invalidated + results[1].patterns_matched, 0);

        assert!(recorder.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_no_matching_rules() {
        let (recorder, invalidator) = setup(vec![InvalidationRule::new("r", "user.*").with_tags(["t"])]);
        assert!(invalidator
            .handle_event(&DomainEvent::new("order.created", json!(null)))
            .await
            .is_empty());
        assert!(recorder.calls.lock().is_empty());
    }
}
