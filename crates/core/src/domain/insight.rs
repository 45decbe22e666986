use serde::{Deserialize, Serialize};

/// Validated LLM explanation of a detected change.
///
/// The model only ever sees pre-computed analysis results (the diff), never
/// raw price series or indicator internals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeExplanation {
    pub what_changed: String,
    pub why_it_matters: String,
    pub what_to_watch: String,
}
