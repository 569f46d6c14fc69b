//! The rule set: load, priority-sort, and serve the active rule list.

use crate::types::Rule;
use std::sync::RwLock;

/// Holds the enabled, priority-sorted rule list.
///
/// `load_rules` replaces the whole list atomically. Loads are not meant to
/// race evaluation (callers serialize a load against in-flight
/// evaluations); the `RwLock` only protects the swap itself.
pub struct RuleSet {
    rules: RwLock<Vec<Rule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self {
            rules: RwLock::new(Vec::new()),
        }
    }

    pub fn with_rules(rules: Vec<Rule>) -> Self {
        let set = Self::new();
        set.load_rules(rules);
        set
    }

    /// Filters out disabled rules and stable-sorts the remainder by
    /// priority key (lower fires first).
    pub fn load_rules(&self, rules: Vec<Rule>) {
        let mut enabled: Vec<Rule> = rules.into_iter().filter(|r| r.enabled).collect();
        enabled.sort_by_key(|r| r.priority_key());
        let count = enabled.len();
        *self.rules.write().expect("rule set lock poisoned") = enabled;
        tracing::info!(rule_count = count, "rule set loaded");
    }

    pub fn rule_count(&self) -> usize {
        self.rules.read().expect("rule set lock poisoned").len()
    }

    /// Snapshot of the current priority-ordered rule list.
    pub fn snapshot(&self) -> Vec<Rule> {
        self.rules.read().expect("rule set lock poisoned").clone()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new()
    }
}
