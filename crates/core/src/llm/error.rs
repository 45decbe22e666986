use crate::llm::Provider;
use serde_json::Value;
use std::fmt;

/// Where in the explanation pipeline the failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplainStage {
    /// The provider rejected the request or returned a non-2xx status.
    Http,
    /// Output was still unparseable after the repair round.
    ParseAfterRepair,
}

impl ExplainStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExplainStage::Http => "http",
            ExplainStage::ParseAfterRepair => "parse_after_repair",
        }
    }
}

/// Explanation failure with enough context to persist a useful error row:
/// the symbol being explained, the pipeline stage, and whatever raw output
/// the provider gave us.
#[derive(Debug, Clone)]
pub struct LlmDiagnosticsError {
    pub provider: Provider,
    pub stage: ExplainStage,
    pub symbol: String,
    pub detail: String,
    pub raw_output: Option<String>,
    pub raw_response_json: Option<Value>,
}

impl fmt::Display for LlmDiagnosticsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLM explanation failed for {} (provider={}, stage={}): {}",
            self.symbol,
            self.provider.as_str(),
            self.stage.as_str(),
            self.detail
        )
    }
}

impl std::error::Error for LlmDiagnosticsError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_symbol_and_stage() {
        let err = LlmDiagnosticsError {
            provider: Provider::Anthropic,
            stage: ExplainStage::ParseAfterRepair,
            symbol: "NVDA".to_string(),
            detail: "missing closing brace".to_string(),
            raw_output: Some("{\"what_changed\": ...".to_string()),
            raw_response_json: None,
        };

        let rendered = err.to_string();
        assert!(rendered.contains("NVDA"));
        assert!(rendered.contains("parse_after_repair"));
        assert!(rendered.contains("anthropic"));
    }

    #[test]
    fn stage_names_are_stable() {
        assert_eq!(ExplainStage::Http.as_str(), "http");
        assert_eq!(
            ExplainStage::ParseAfterRepair.as_str(),
            "parse_after_repair"
        );
    }
}
