//! The evaluator: staged matching, state hydration/mutation, and result
//! assembly. This is the engine's public surface (`SPEC_FULL.md` §6).

use crate::config::EngineConfig;
use crate::metrics;
use crate::regex_cache::RegexCache;
use crate::rules::RuleSet;
use crate::semantic::{NullSemanticMatcher, SemanticMatcher};
use crate::state_cache::StateCache;
use crate::state_provider::{NullStateProvider, StateProvider};
use crate::threshold::ThresholdTracker;
use crate::types::{
    Action, ConversationState, ConversationTuple, EvaluationContext, EvaluationResult,
    FlagAction, FlagHistoryEntry, Rule, Severity,
};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, serde::Serialize)]
pub struct EngineStats {
    pub rules_loaded: usize,
    pub cache_size: usize,
    pub regex_cache_size: usize,
}

/// Optional external collaborators supplied at construction
/// (`SPEC_FULL.md` §9: "single-use cross-cutting configuration ... passed
/// at construction"). Either may be omitted; the engine degrades gracefully.
#[derive(Default)]
pub struct EngineOptions {
    pub semantic_matcher: Option<Arc<dyn SemanticMatcher>>,
    pub state_provider: Option<Arc<dyn StateProvider>>,
    pub config: Option<EngineConfig>,
}

/// The message-inspection rules engine.
pub struct Engine {
    rule_set: RuleSet,
    regex_cache: RegexCache,
    threshold_tracker: ThresholdTracker,
    state_cache: Arc<StateCache>,
    semantic_matcher: Arc<dyn SemanticMatcher>,
    state_provider: Arc<dyn StateProvider>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(options: EngineOptions) -> Self {
        let config = options.config.unwrap_or_default();
        let state_provider = options
            .state_provider
            .unwrap_or_else(|| Arc::new(NullStateProvider));
        let semantic_matcher = options
            .semantic_matcher
            .unwrap_or_else(|| Arc::new(NullSemanticMatcher));
        let state_cache = Arc::new(StateCache::new(&config, state_provider.clone()));
        Self {
            rule_set: RuleSet::new(),
            regex_cache: RegexCache::new(),
            threshold_tracker: ThresholdTracker::new(),
            state_cache,
            semantic_matcher,
            state_provider,
            config,
        }
    }

    pub fn load_rules(&self, rules: Vec<Rule>) {
        self.rule_set.load_rules(rules);
    }

    pub fn rule_count(&self) -> usize {
        self.rule_set.rule_count()
    }

    /// Cache introspection for test harnesses (`SPEC_FULL.md` §10.5).
    pub fn debug_state(&self, tuple: &ConversationTuple) -> Option<ConversationState> {
        self.state_cache.get(tuple, now_ms())
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            rules_loaded: self.rule_set.rule_count(),
            cache_size: self.state_cache.len(),
            regex_cache_size: self.regex_cache.len(),
        }
    }

    /// Flushes any pending dirty writes and clears in-memory caches.
    pub async fn shutdown(&self) {
        self.state_cache.flush_writes().await;
        self.state_cache.clear();
        self.regex_cache.clear();
        self.threshold_tracker.clear();
    }

    async fn hydrate_state(
        &self,
        ctx: &EvaluationContext,
        tuple: &ConversationTuple,
        now_ms: i64,
    ) -> ConversationState {
        if let Some(state) = &ctx.state {
            return state.clone();
        }
        if let Some(cached) = self.state_cache.get(tuple, now_ms) {
            metrics::record_cache_hit();
            return cached;
        }
        metrics::record_cache_miss();
        match self
            .state_provider
            .get(&tuple.token_id, &tuple.conversation_id, tuple.account_id.as_deref())
            .await
        {
            Ok(Some(remote)) => {
                self.state_cache.set(tuple, remote.clone(), now_ms).await;
                remote
            }
            Ok(None) => self.synthesize_state(tuple, now_ms).await,
            Err(err) => {
                tracing::warn!(error = %err, "state provider read failed, synthesizing fresh state");
                self.synthesize_state(tuple, now_ms).await
            }
        }
    }

    async fn synthesize_state(&self, tuple: &ConversationTuple, now_ms: i64) -> ConversationState {
        let fresh = ConversationState::fresh(tuple, now_ms, self.config.synthesized_state_ttl_secs);
        self.state_cache.set(tuple, fresh.clone(), now_ms).await;
        fresh
    }

    fn mutate_state(&self, state: &ConversationState, rule: &Rule, now_ms: i64) -> ConversationState {
        let mut flags = state.flags.clone();
        let mut flag_history = state.flag_history.clone();
        for flag in &rule.flags.set {
            flags.insert(flag.clone(), true);
            flag_history.push(FlagHistoryEntry {
                flag: flag.clone(),
                action: FlagAction::Set,
                rule_id: rule.id.clone(),
                timestamp_ms: now_ms,
            });
        }
        for flag in &rule.flags.unset {
            flags.insert(flag.clone(), false);
            flag_history.push(FlagHistoryEntry {
                flag: flag.clone(),
                action: FlagAction::Unset,
                rule_id: rule.id.clone(),
                timestamp_ms: now_ms,
            });
        }
        ConversationState {
            id: state.id.clone(),
            flags,
            flag_history,
            expires_at: now_ms + (rule.ttl_secs() as i64) * 1000,
            created_at: state.created_at,
            updated_at: now_ms,
        }
    }

    /// Runs the full pipeline from `SPEC_FULL.md` §4.5 for one message.
    pub async fn evaluate(&self, ctx: EvaluationContext) -> Vec<EvaluationResult> {
        metrics::record_evaluation();
        let tuple = ctx.tuple();
        let now_ms = now_ms();
        let mut state = self.hydrate_state(&ctx, &tuple, now_ms).await;

        let rules = self.rule_set.snapshot();
        let mut results = Vec::new();

        for rule in rules {
            if !rule.flags.check.is_empty() && !state.passes_check(&rule.flags.check) {
                continue;
            }

            let rule_start = Instant::now();
            let elapsed_ms = |start: Instant| start.elapsed().as_secs_f64() * 1000.0;

            if !rule.content.is_empty() && !content_stage_matches(&rule, &ctx.message) {
                continue;
            }
            let mut matched_pattern = (!rule.content.is_empty()).then(|| rule.content.join(", "));

            if !rule.pcre.is_empty() {
                match pcre_stage_matches(&rule, &ctx.message, &self.regex_cache) {
                    Ok(Some(first_match)) => {
                        matched_pattern.get_or_insert(first_match);
                    }
                    Ok(None) => continue,
                    Err(err) => {
                        metrics::record_rule_skipped();
                        results.push(EvaluationResult::non_match(
                            &rule,
                            format!("regex compile error: {err}"),
                            elapsed_ms(rule_start),
                        ));
                        continue;
                    }
                }
            }

            let mut similarity = None;
            if !rule.semantic.is_empty() {
                match self
                    .semantic_matcher
                    .query_rules(&ctx.message, rule.semantic_threshold)
                    .await
                {
                    Ok(hits) => match hits.into_iter().find(|h| h.rule_id == rule.id) {
                        Some(hit) => {
                            similarity = Some(hit.similarity);
                            matched_pattern.get_or_insert_with(|| {
                                format!("semantic match ({:.1}%)", hit.similarity * 100.0)
                            });
                        }
                        None => {
                            metrics::record_rule_skipped();
                            continue;
                        }
                    },
                    Err(err) => {
                        tracing::warn!(rule = %rule.id, error = %err, "semantic backend error");
                        metrics::record_rule_skipped();
                        continue;
                    }
                }
            }

            let declared_a_stage =
                !rule.content.is_empty() || !rule.pcre.is_empty() || !rule.semantic.is_empty();
            if !declared_a_stage && !rule.has_flags_only() {
                // Inert: no stage passed (none declared) and not purely stateful.
                continue;
            }

            if !self.threshold_tracker.check(&rule, &tuple, now_ms) {
                metrics::record_rule_skipped();
                results.push(EvaluationResult::non_match(
                    &rule,
                    format!(
                        "Threshold not met ({} in {}s)",
                        rule.threshold.unwrap_or(0),
                        rule.window.unwrap_or(0)
                    ),
                    elapsed_ms(rule_start),
                ));
                continue;
            }

            state = self.mutate_state(&state, &rule, now_ms);
            self.state_cache.set(&tuple, state.clone(), now_ms).await;
            self.state_cache.mark_dirty(&tuple);

            metrics::record_rule_matched();
            let critical_block = rule.action == Action::Block && rule.severity == Severity::Critical;
            results.push(EvaluationResult {
                matched: true,
                action: Some(rule.action),
                state: Some(state.clone()),
                reason: None,
                eval_time_ms: elapsed_ms(rule_start),
                similarity,
                matched_pattern,
                rule: Some(rule),
            });

            if critical_block {
                break;
            }
        }

        metrics::set_cache_size(self.state_cache.len());
        metrics::set_regex_cache_size(self.regex_cache.len());

        for result in &results {
            if let Some(state) = &result.state {
                if let Err(err) = self.state_provider.save(state).await {
                    tracing::warn!(error = %err, "post-evaluation state save failed");
                }
            }
        }

        results
    }
}

fn normalize(s: &str) -> String {
    s.to_lowercase()
}

fn content_stage_matches(rule: &Rule, message: &str) -> bool {
    if rule.nocase {
        let normalized = normalize(message);
        rule.content
            .iter()
            .all(|kw| normalized.contains(&normalize(kw)))
    } else {
        rule.content.iter().all(|kw| message.contains(kw.as_str()))
    }
}

/// Returns `Ok(Some(first_match))` if every pcre pattern matches, `Ok(None)`
/// if any pattern fails to match, or `Err` if a pattern fails to compile.
fn pcre_stage_matches(
    rule: &Rule,
    message: &str,
    regex_cache: &RegexCache,
) -> Result<Option<String>, regex::Error> {
    let mut first_match = None;
    for pattern in &rule.pcre {
        let re = regex_cache.get(pattern, rule.nocase)?;
        match re.find(message) {
            Some(m) => {
                if first_match.is_none() {
                    first_match = Some(m.as_str().to_string());
                }
            }
            None => return Ok(None),
        }
    }
    Ok(first_match)
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
