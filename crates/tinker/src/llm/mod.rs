pub mod anthropic;
pub mod types;

use crate::llm::types::{CompletionRequest, CompletionResponse};

/// Trait for model providers.
///
/// One call per step of a turn. Implementors must be `Send + Sync` so a
/// runner can be shared behind an `Arc`.
pub trait LlmProvider: Send + Sync {
    fn complete(
        &self,
        request: CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, crate::error::Error>> + Send;
}
