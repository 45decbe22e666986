use crate::domain::contract::LlmChangeExplanation;
use crate::domain::insight::ChangeExplanation;
use anyhow::Context;

pub fn extract_json(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.starts_with("```") {
        // Remove Markdown fences (```json ... ``` or ``` ... ```).
        let mut inner = trimmed;
        if let Some(after_first) = inner.splitn(2, '\n').nth(1) {
            inner = after_first;
        }
        if let Some(end) = inner.rfind("```") {
            inner = &inner[..end];
        }
        return Some(inner.trim().to_string());
    }

    // Best-effort extraction: first '{' to last '}'.
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(trimmed[start..=end].trim().to_string())
}

pub fn parse_explanation(text: &str) -> anyhow::Result<ChangeExplanation> {
    let json_str = extract_json(text).unwrap_or_else(|| text.trim().to_string());
    let parsed = serde_json::from_str::<LlmChangeExplanation>(&json_str).with_context(|| {
        format!("LLM output is not valid JSON for explanation schema: {json_str}")
    })?;
    parsed.validate_and_into_explanation()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn valid_explanation_json() -> String {
        json!({
            "what_changed": "Trend flipped from up to down over the last week.",
            "why_it_matters": "A confirmed reversal often precedes further weakness.",
            "what_to_watch": "A close back above the 20-day average would invalidate it."
        })
        .to_string()
    }

    #[test]
    fn extract_json_handles_fenced_blocks() {
        let body = "{\"a\":1}";
        let fenced = format!("```json\n{body}\n```\n");
        assert_eq!(extract_json(&fenced), Some(body.to_string()));
    }

    #[test]
    fn extract_json_falls_back_to_braces() {
        let s = "prefix {\"a\":1} suffix";
        assert_eq!(extract_json(s), Some("{\"a\":1}".to_string()));
    }

    #[test]
    fn parse_explanation_accepts_valid_json() {
        let out = parse_explanation(&valid_explanation_json()).unwrap();
        assert!(out.what_changed.starts_with("Trend flipped"));
    }

    #[test]
    fn parse_explanation_accepts_fenced_output() {
        let fenced = format!("```json\n{}\n```", valid_explanation_json());
        assert!(parse_explanation(&fenced).is_ok());
    }

    #[test]
    fn parse_explanation_rejects_missing_keys() {
        let json = json!({"what_changed": "x"}).to_string();
        assert!(parse_explanation(&json).is_err());
    }

    #[test]
    fn parse_explanation_rejects_blank_fields() {
        let json = json!({
            "what_changed": "  ",
            "why_it_matters": "y",
            "what_to_watch": "z"
        })
        .to_string();
        assert!(parse_explanation(&json).is_err());
    }
}
