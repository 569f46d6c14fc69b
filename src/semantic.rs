//! External semantic similarity backend, consumed by the evaluator.

use async_trait::async_trait;

/// A single rule-similarity hit returned by `query_rules`.
#[derive(Debug, Clone)]
pub struct SemanticHit {
    pub rule_id: String,
    pub similarity: f32,
}

/// Embeds text and finds near-neighbor rules by semantic similarity.
///
/// The engine does not implement embedding or vector storage itself (per
/// `SPEC_FULL.md` §1); this trait is the boundary to whatever backend does.
#[async_trait]
pub trait SemanticMatcher: Send + Sync {
    /// Optional: only needed if a caller wants raw embeddings. The core
    /// evaluator never calls this.
    async fn generate_embedding(&self, text: &str) -> anyhow::Result<Vec<f32>>;

    /// Returns every semantic exemplar (across all rules) whose similarity
    /// to `message` is at or above `threshold`.
    async fn query_rules(
        &self,
        message: &str,
        threshold: f32,
    ) -> anyhow::Result<Vec<SemanticHit>>;
}

/// Used when no semantic backend is configured. Per `SPEC_FULL.md` §7
/// ("operational" errors), an unconfigured matcher returns empty rather
/// than failing the evaluation.
#[derive(Debug, Default)]
pub struct NullSemanticMatcher;

#[async_trait]
impl SemanticMatcher for NullSemanticMatcher {
    async fn generate_embedding(&self, _text: &str) -> anyhow::Result<Vec<f32>> {
        Ok(Vec::new())
    }

    async fn query_rules(
        &self,
        _message: &str,
        _threshold: f32,
    ) -> anyhow::Result<Vec<SemanticHit>> {
        Ok(Vec::new())
    }
}
