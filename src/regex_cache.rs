//! Compile-once-memoize regex cache shared across rule evaluation.

use dashmap::DashMap;
use regex::Regex;
use std::sync::Arc;

/// Compiles and memoizes patterns keyed by `(pattern, nocase)`.
///
/// `DashMap::entry` gives idempotent get-or-insert without a global lock,
/// so concurrent evaluations compiling the same pattern for the first time
/// don't race each other into double work.
pub struct RegexCache {
    compiled: DashMap<(String, bool), Arc<Regex>>,
}

impl RegexCache {
    pub fn new() -> Self {
        Self {
            compiled: DashMap::new(),
        }
    }

    /// Returns the compiled regex for `pattern`, compiling (and caching) on
    /// first use. `nocase` selects the `"gi"` vs `"g"` flag set from
    /// `SPEC_FULL.md` §4.2 by injecting a `(?i)` prefix.
    pub fn get(&self, pattern: &str, nocase: bool) -> Result<Arc<Regex>, regex::Error> {
        let key = (pattern.to_string(), nocase);
        if let Some(existing) = self.compiled.get(&key) {
            return Ok(existing.clone());
        }
        let source = if nocase {
            format!("(?i){pattern}")
        } else {
            pattern.to_string()
        };
        let compiled = Arc::new(Regex::new(&source)?);
        self.compiled.insert(key, compiled.clone());
        tracing::debug!(pattern, nocase, "regex compiled and cached");
        Ok(compiled)
    }

    pub fn len(&self) -> usize {
        self.compiled.len()
    }

    pub fn is_empty(&self) -> bool {
        self.compiled.is_empty()
    }

    pub fn clear(&self) {
        self.compiled.clear();
    }
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new()
    }
}
