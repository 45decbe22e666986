pub mod anthropic;
pub mod error;
pub mod json;

use crate::domain::change::SnapshotDiff;
use crate::domain::insight::ChangeExplanation;

/// Input for a change explanation. The diff is the only stock state the
/// model receives.
#[derive(Debug, Clone)]
pub struct ExplainInput {
    pub diff: SnapshotDiff,
}

#[derive(Debug, Clone)]
pub enum Provider {
    Anthropic,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Anthropic => "anthropic",
        }
    }
}

#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    fn provider(&self) -> Provider;

    async fn explain_change(&self, input: ExplainInput) -> anyhow::Result<ChangeExplanation>;
}
