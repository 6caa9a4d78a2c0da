use crate::error::CacheError;
use crate::error::RuleError;
use crate::event::DomainEvent;
use crate::pattern::GlobPattern;
use crate::rule::InvalidationRule;
use crate::rule_err;
use crate::types::RegisterOutcome;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::collections::HashSet;
use std::panic::catch_unwind;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::debug;
use tracing::warn;

struct RegisteredRule {
    rule:      Arc<InvalidationRule>,
    matcher:   GlobPattern,
    fragments: Vec<String>,
    // Registration order, used to keep equal-priority rules in the order they were registered.
    seq:       u64,
}

#[derive(Default)]
struct RegistryState {
    rules:      HashMap<String, RegisteredRule>,
    // Literal event-type fragment -> ids of rules whose event type contains it.
    fragments:  HashMap<String, HashSet<String>>,
    // Rules whose event type has no literal fragment at all, like "*".
    unanchored: HashSet<String>,
    next_seq:   u64,
}

impl RegistryState {
    fn index(&mut self, id: &str, fragments: &[String]) {
        if fragments.is_empty() {
            self.unanchored.insert(id.to_string());
        }
        for fragment in fragments {
            self.fragments
                .entry(fragment.clone())
                .or_default()
                .insert(id.to_string());
        }
    }

    fn unindex(&mut self, id: &str, fragments: &[String]) {
        if fragments.is_empty() {
            self.unanchored.remove(id);
        }
        for fragment in fragments {
            if let Some(ids) = self.fragments.get_mut(fragment) {
                ids.remove(id);
                if ids.is_empty() {
                    self.fragments.remove(fragment);
                }
            }
        }
    }

    // Rules whose every literal fragment occurs in the event type. This is a superset of the matching rules.
    fn candidates(&self, event_type: &str) -> HashSet<&str> {
        let mut ids = self.unanchored.iter().map(String::as_str).collect::<HashSet<_>>();
        for (fragment, rule_ids) in &self.fragments {
            if event_type.contains(fragment.as_str()) {
                ids.extend(rule_ids.iter().map(String::as_str));
            }
        }
        ids
    }

    fn sorted(&self, mut found: Vec<&RegisteredRule>) -> Vec<Arc<InvalidationRule>> {
        found.sort_by(|a, b| b.rule.priority.cmp(&a.rule.priority).then(a.seq.cmp(&b.seq)));
        found.into_iter().map(|r| Arc::clone(&r.rule)).collect()
    }
}

/// Evaluate a rule condition, turning a panic into an error.
pub(crate) fn check_condition(rule: &InvalidationRule, event: &DomainEvent) -> Result<bool, RuleError> {
    let Some(ref condition) = rule.condition
    else {
        return Ok(true);
    };
    catch_unwind(AssertUnwindSafe(|| condition(event)))
        .unwrap_or_else(|panic| Err(rule_err!("condition panicked: {}", panic_message(&*panic))))
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    }
    else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    }
    else {
        "unknown panic".to_string()
    }
}

/// Invalidation rules by their ids.
///
/// Matching doesn't scan all rules: every rule is indexed by the literal fragments of its event type pattern and only
/// the rules with all fragments present in the event type are checked against it.
#[derive(Default)]
pub struct InvalidationRuleRegistry {
    state: RwLock<RegistryState>,
}

impl InvalidationRuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule, overwriting one with the same id. The overwritten rule's position in the registration order is
    /// kept.
    ///
    /// Fails only if the event type is not a valid pattern.
    pub fn register(&self, rule: InvalidationRule) -> Result<RegisterOutcome, CacheError> {
        let matcher = GlobPattern::new(rule.event_type.as_str())?;
        let fragments = matcher.fragments();
        let id = rule.id.clone();

        let mut state = self.state.write();
        let (outcome, seq) = if let Some(old) = state.rules.remove(&id) {
            warn!(rule_id = %id, event_type = %rule.event_type, "Overwriting invalidation rule");
            state.unindex(&id, &old.fragments);
            (RegisterOutcome::Replaced, old.seq)
        }
        else {
            debug!(rule_id = %id, event_type = %rule.event_type, priority = rule.priority, "Registered invalidation rule");
            let seq = state.next_seq;
            state.next_seq += 1;
            (RegisterOutcome::Added, seq)
        };

        state.index(&id, &fragments);
        state.rules.insert(
            id,
            RegisteredRule {
                rule: Arc::new(rule),
                matcher,
                fragments,
                seq,
            },
        );

        Ok(outcome)
    }

    /// Register in the given order. Stops at the first invalid rule; those before it stay registered.
    pub fn register_many<I>(&self, rules: I) -> Result<Vec<RegisterOutcome>, CacheError>
    where
        I: IntoIterator<Item = InvalidationRule>,
    {
        rules.into_iter().map(|rule| self.register(rule)).collect()
    }

    /// Returns `false` if there was no such rule.
    pub fn unregister(&self, id: &str) -> bool {
        let mut state = self.state.write();
        let Some(old) = state.rules.remove(id)
        else {
            return false;
        };
        state.unindex(id, &old.fragments);
        debug!(rule_id = %id, "Unregistered invalidation rule");
        true
    }

    /// Enabled rules matching the event type, highest priority first, in registration order among equal priorities.
    /// Conditions are not evaluated.
    pub(crate) fn candidates(&self, event: &DomainEvent) -> Vec<Arc<InvalidationRule>> {
        let state = self.state.read();
        let found = state
            .candidates(&event.event_type)
            .into_iter()
            .filter_map(|id| state.rules.get(id))
            .filter(|r| r.rule.enabled && r.matcher.is_match(&event.event_type))
            .collect::<Vec<_>>();
        state.sorted(found)
    }

    /// Rules applicable to the event, in execution order. A rule whose condition fails is treated as not matching.
    pub fn match_event(&self, event: &DomainEvent) -> Vec<Arc<InvalidationRule>> {
        self.candidates(event)
            .into_iter()
            .filter(|rule| {
                check_condition(rule, event).unwrap_or_else(|err| {
                    warn!(rule_id = %rule.id, event_type = %event.event_type, %err, "Rule condition failed");
                    false
                })
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<InvalidationRule>> {
        self.state.read().rules.get(id).map(|r| Arc::clone(&r.rule))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.state.read().rules.contains_key(id)
    }

    /// All rules in registration order.
    pub fn all_rules(&self) -> Vec<Arc<InvalidationRule>> {
        let state = self.state.read();
        let mut rules = state.rules.values().collect::<Vec<_>>();
        rules.sort_by_key(|r| r.seq);
        rules.into_iter().map(|r| Arc::clone(&r.rule)).collect()
    }

    /// Enabled rules in registration order.
    pub fn enabled_rules(&self) -> Vec<Arc<InvalidationRule>> {
        self.all_rules().into_iter().filter(|r| r.enabled).collect()
    }

    /// Literal event-type fragments currently in the matching index, sorted.
    pub fn indexed_fragments(&self) -> Vec<String> {
        let mut fragments = self.state.read().fragments.keys().cloned().collect::<Vec<_>>();
        fragments.sort();
        fragments
    }

    pub fn len(&self) -> usize {
        self.state.read().rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().rules.is_empty()
    }

    pub fn clear(&self) {
        let mut state = self.state.write();
        state.rules.clear();
        state.fragments.clear();
        state.unanchored.clear();
        debug!("Invalidation rules cleared");
    }
}

impl std::fmt::Debug for InvalidationRuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("InvalidationRuleRegistry")
            .field("rules", &state.rules.len())
            .field("fragments", &state.fragments.len())
            .finish()
    }
}
