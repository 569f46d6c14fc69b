//! Per-(conversation, rule) sliding-window threshold tracking.

use crate::types::{ConversationTuple, Rule};
use dashmap::DashMap;

struct Entry {
    count: u32,
    window_end: i64,
}

/// Tracks how many times a thresholded rule has matched within its rolling
/// window, per conversation tuple.
///
/// Implements the drain-and-restart algorithm from `SPEC_FULL.md` §4.3:
/// an entry is deleted the moment it fires, so the next qualifying match
/// starts a fresh window rather than sliding a count forward.
pub struct ThresholdTracker {
    entries: DashMap<(String, String), Entry>,
}

impl ThresholdTracker {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    /// Returns true iff `rule` should fire on this invocation for `tuple`.
    /// Rules without both `threshold` and `window` always fire (unthrottled).
    pub fn check(&self, rule: &Rule, tuple: &ConversationTuple, now_ms: i64) -> bool {
        let (Some(threshold), Some(window_secs)) = (rule.threshold, rule.window) else {
            return true;
        };
        let key = (tuple.key(), rule.id.clone());

        let expired = self
            .entries
            .get(&key)
            .map(|e| now_ms > e.window_end)
            .unwrap_or(true);

        if expired {
            self.entries.insert(
                key,
                Entry {
                    count: 1,
                    window_end: now_ms + (window_secs as i64) * 1000,
                },
            );
            return threshold == 1;
        }

        let fired = {
            let mut entry = self.entries.get_mut(&key).expect("checked above");
            entry.count += 1;
            entry.count >= threshold
        };
        if fired {
            self.entries.remove(&key);
        }
        fired
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}

impl Default for ThresholdTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Action, Category, RuleFlags, Severity};

    fn thresholded(threshold: u32, window: u64) -> Rule {
        Rule {
            id: "r1".into(),
            content: vec!["buy".into()],
            pcre: vec![],
            semantic: vec![],
            semantic_threshold: 0.85,
            flags: RuleFlags::default(),
            threshold: Some(threshold),
            window: Some(window),
            category: Category::Abuse,
            severity: Severity::Medium,
            action: Action::Block,
            enabled: true,
            nocase: true,
        }
    }

    fn unthrottled() -> Rule {
        let mut r = thresholded(3, 10);
        r.threshold = None;
        r.window = None;
        r
    }

    #[test]
    fn unthrottled_rules_always_fire() {
        let tracker = ThresholdTracker::new();
        let tuple = ConversationTuple::new("t", "c", None);
        let rule = unthrottled();
        assert!(tracker.check(&rule, &tuple, 0));
        assert!(tracker.check(&rule, &tuple, 1));
    }

    #[test]
    fn fires_on_nth_match_then_drains() {
        let tracker = ThresholdTracker::new();
        let tuple = ConversationTuple::new("t", "c", None);
        let rule = thresholded(3, 10);
        assert!(!tracker.check(&rule, &tuple, 0));
        assert!(!tracker.check(&rule, &tuple, 1000));
        assert!(tracker.check(&rule, &tuple, 2000));
        // window drained; a 4th match restarts rather than firing again
        assert!(!tracker.check(&rule, &tuple, 2500));
    }

    #[test]
    fn window_expiry_restarts_the_count() {
        let tracker = ThresholdTracker::new();
        let tuple = ConversationTuple::new("t", "c", None);
        let rule = thresholded(3, 10);
        assert!(!tracker.check(&rule, &tuple, 0));
        assert!(!tracker.check(&rule, &tuple, 1000));
        // past window_end (10_000ms) - restarts
        assert!(!tracker.check(&rule, &tuple, 11_000));
        assert!(!tracker.check(&rule, &tuple, 11_500));
        assert!(tracker.check(&rule, &tuple, 12_000));
    }

    #[test]
    fn tuples_are_isolated() {
        let tracker = ThresholdTracker::new();
        let rule = thresholded(2, 10);
        let a = ConversationTuple::new("t", "a", None);
        let b = ConversationTuple::new("t", "b", None);
        assert!(!tracker.check(&rule, &a, 0));
        assert!(!tracker.check(&rule, &b, 0));
        assert!(tracker.check(&rule, &a, 1));
        assert!(tracker.check(&rule, &b, 1));
    }

    #[test]
    fn threshold_of_one_fires_immediately() {
        let tracker = ThresholdTracker::new();
        let tuple = ConversationTuple::new("t", "c", None);
        let rule = thresholded(1, 10);
        assert!(tracker.check(&rule, &tuple, 0));
    }
}
