use crate::domain::insight::ChangeExplanation;
use anyhow::ensure;
use serde::{Deserialize, Serialize};

/// Wire contract for LLM explanation output, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmChangeExplanation {
    pub what_changed: String,
    pub why_it_matters: String,
    pub what_to_watch: String,
}

impl LlmChangeExplanation {
    pub fn validate_and_into_explanation(self) -> anyhow::Result<ChangeExplanation> {
        let what_changed = self.what_changed.trim().to_string();
        ensure!(!what_changed.is_empty(), "what_changed must be non-empty");

        let why_it_matters = self.why_it_matters.trim().to_string();
        ensure!(
            !why_it_matters.is_empty(),
            "why_it_matters must be non-empty"
        );

        let what_to_watch = self.what_to_watch.trim().to_string();
        ensure!(!what_to_watch.is_empty(), "what_to_watch must be non-empty");

        Ok(ChangeExplanation {
            what_changed,
            why_it_matters,
            what_to_watch,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contract(what: &str, why: &str, watch: &str) -> LlmChangeExplanation {
        LlmChangeExplanation {
            what_changed: what.to_string(),
            why_it_matters: why.to_string(),
            what_to_watch: watch.to_string(),
        }
    }

    #[test]
    fn trims_and_accepts_valid_output() {
        let out = contract("  trend flipped  ", "sentiment shift", "watch the 20d MA")
            .validate_and_into_explanation()
            .unwrap();
        assert_eq!(out.what_changed, "trend flipped");
    }

    #[test]
    fn rejects_blank_fields() {
        assert!(contract("", "why", "watch")
            .validate_and_into_explanation()
            .is_err());
        assert!(contract("what", "   ", "watch")
            .validate_and_into_explanation()
            .is_err());
        assert!(contract("what", "why", "\n")
            .validate_and_into_explanation()
            .is_err());
    }
}
