//! External persistent state store, consumed by the state cache.

use crate::types::ConversationState;
use async_trait::async_trait;

/// Persists conversation state across processes. Both methods may fail;
/// per `SPEC_FULL.md` §7 failures are logged and non-fatal to evaluation.
#[async_trait]
pub trait StateProvider: Send + Sync {
    async fn get(
        &self,
        token_id: &str,
        conversation_id: &str,
        account_id: Option<&str>,
    ) -> anyhow::Result<Option<ConversationState>>;

    async fn save(&self, state: &ConversationState) -> anyhow::Result<()>;
}

/// No-op provider used when no external store is configured. All lookups
/// miss; saves are silently accepted.
#[derive(Debug, Default)]
pub struct NullStateProvider;

#[async_trait]
impl StateProvider for NullStateProvider {
    async fn get(
        &self,
        _token_id: &str,
        _conversation_id: &str,
        _account_id: Option<&str>,
    ) -> anyhow::Result<Option<ConversationState>> {
        Ok(None)
    }

    async fn save(&self, _state: &ConversationState) -> anyhow::Result<()> {
        Ok(())
    }
}
