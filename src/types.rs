//! Core data model: rules, conversation state, and evaluation I/O.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Threat classification attached to a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Injection,
    Exfiltration,
    Phishing,
    Abuse,
    Jailbreak,
    PolicyViolation,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Allow,
    Block,
    Flag,
    Alert,
    Sanitize,
    SetFlag,
    Pass,
}

impl Action {
    /// Weight used by the rule set's priority key; lower runs first.
    pub fn weight(self) -> u32 {
        match self {
            Action::Pass => 0,
            Action::SetFlag => 1,
            Action::Flag => 2,
            Action::Alert => 3,
            Action::Block => 4,
            Action::Allow | Action::Sanitize => 5,
        }
    }
}

/// Flag side effects and gate declared by a rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleFlags {
    #[serde(default)]
    pub set: Vec<String>,
    #[serde(default)]
    pub unset: Vec<String>,
    #[serde(default)]
    pub check: Vec<String>,
    /// State lifetime in seconds after this rule fires and mutates state.
    pub ttl: Option<u64>,
}

impl RuleFlags {
    fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty() && self.check.is_empty()
    }
}

fn default_nocase() -> bool {
    true
}

fn default_semantic_threshold() -> f32 {
    0.85
}

/// An immutable threat-detection rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    #[serde(default)]
    pub content: Vec<String>,
    #[serde(default)]
    pub pcre: Vec<String>,
    #[serde(default)]
    pub semantic: Vec<String>,
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f32,
    #[serde(default)]
    pub flags: RuleFlags,
    pub threshold: Option<u32>,
    pub window: Option<u64>,
    pub category: Category,
    pub severity: Severity,
    pub action: Action,
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_nocase")]
    pub nocase: bool,
}

fn default_true() -> bool {
    true
}

impl Rule {
    /// True iff this rule declares no content/pcre/semantic stage and is
    /// instead "purely stateful" per `SPEC_FULL.md` §3: eligible to match
    /// on its `flags.check` gate alone.
    pub fn has_flags_only(&self) -> bool {
        self.content.is_empty()
            && self.pcre.is_empty()
            && self.semantic.is_empty()
            && !self.flags.check.is_empty()
    }

    /// Priority key from `SPEC_FULL.md` §4.1: lower fires first.
    pub fn priority_key(&self) -> u32 {
        let action_weight = self.action.weight();
        let mut type_cost = 0u32;
        if !self.content.is_empty() {
            type_cost += 1;
        }
        if !self.pcre.is_empty() {
            type_cost += 2;
        }
        if !self.semantic.is_empty() {
            type_cost += 3;
        }
        if !self.flags.is_empty() {
            type_cost += 4;
        }
        action_weight * 10 + type_cost
    }

    pub fn ttl_secs(&self) -> u64 {
        self.flags.ttl.unwrap_or(86_400)
    }
}

/// One entry in a conversation's append-only flag mutation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlagHistoryEntry {
    pub flag: String,
    pub action: FlagAction,
    pub rule_id: String,
    pub timestamp_ms: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlagAction {
    Set,
    Unset,
}

/// Identifies a conversation for caching, threshold tracking, and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationTuple {
    pub token_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
}

impl ConversationTuple {
    pub fn new(
        token_id: impl Into<String>,
        conversation_id: impl Into<String>,
        account_id: Option<String>,
    ) -> Self {
        Self {
            token_id: token_id.into(),
            conversation_id: conversation_id.into(),
            account_id,
        }
    }

    /// Stable key format: `"{tokenId}:{conversationId}:{accountId|""}"`.
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.token_id,
            self.conversation_id,
            self.account_id.as_deref().unwrap_or("")
        )
    }
}

/// Per-tuple conversation state, cached in-process and optionally persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationState {
    pub id: String,
    #[serde(default)]
    pub flags: HashMap<String, bool>,
    #[serde(default)]
    pub flag_history: Vec<FlagHistoryEntry>,
    pub expires_at: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl ConversationState {
    pub fn fresh(tuple: &ConversationTuple, now_ms: i64, ttl_secs: u64) -> Self {
        Self {
            id: tuple.key(),
            flags: HashMap::new(),
            flag_history: Vec::new(),
            expires_at: now_ms + (ttl_secs as i64) * 1000,
            created_at: now_ms,
            updated_at: now_ms,
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn passes_check(&self, check: &[String]) -> bool {
        check.iter().all(|f| self.flag(f))
    }
}

/// Input to a single `Evaluator::evaluate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    pub token_id: String,
    pub conversation_id: String,
    #[serde(default)]
    pub account_id: Option<String>,
    pub message: String,
    /// Caller-supplied state, bypassing cache/provider lookup (used by test surfaces).
    #[serde(default)]
    pub state: Option<ConversationState>,
}

impl EvaluationContext {
    pub fn tuple(&self) -> ConversationTuple {
        ConversationTuple::new(
            self.token_id.clone(),
            self.conversation_id.clone(),
            self.account_id.clone(),
        )
    }
}

/// One result record emitted per rule that reached the threshold gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationResult {
    pub matched: bool,
    pub rule: Option<Rule>,
    pub action: Option<Action>,
    pub state: Option<ConversationState>,
    pub reason: Option<String>,
    pub eval_time_ms: f64,
    pub similarity: Option<f32>,
    pub matched_pattern: Option<String>,
}

impl EvaluationResult {
    pub fn non_match(rule: &Rule, reason: impl Into<String>, eval_time_ms: f64) -> Self {
        Self {
            matched: false,
            rule: Some(rule.clone()),
            action: None,
            state: None,
            reason: Some(reason.into()),
            eval_time_ms,
            similarity: None,
            matched_pattern: None,
        }
    }
}
