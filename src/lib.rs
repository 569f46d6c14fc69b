//! A staged message-inspection rules engine for security middleware.
//!
//! The library surface is [`Engine`]: construct it with optional external
//! collaborators (a [`semantic::SemanticMatcher`] and a
//! [`state_provider::StateProvider`]), load a rule set, and call
//! [`Engine::evaluate`] per inbound message. [`api`] wraps the engine in a
//! thin HTTP test/admin surface for exercising it out of process.

pub mod api;
pub mod config;
pub mod evaluator;
pub mod metrics;
pub mod regex_cache;
pub mod rules;
pub mod semantic;
pub mod state_cache;
pub mod state_provider;
pub mod threshold;
pub mod types;

pub use api::{app, app_with_metrics, AppState};
pub use config::EngineConfig;
pub use evaluator::{Engine, EngineOptions, EngineStats};
pub use semantic::{NullSemanticMatcher, SemanticHit, SemanticMatcher};
pub use state_provider::{NullStateProvider, StateProvider};
pub use types::{
    Action, Category, ConversationState, ConversationTuple, EvaluationContext, EvaluationResult,
    Rule, RuleFlags, Severity,
};
