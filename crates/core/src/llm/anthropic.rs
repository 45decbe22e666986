use crate::config::Settings;
use crate::domain::contract::LlmChangeExplanation;
use crate::domain::insight::ChangeExplanation;
use crate::llm::error::{ExplainStage, LlmDiagnosticsError};
use crate::llm::json;
use crate::llm::{ExplainInput, LlmClient, Provider};
use anyhow::Context;
use reqwest::header::{HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_MODEL: &str = "claude-3-5-sonnet-latest";
const DEFAULT_MAX_TOKENS: u32 = 1024;
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const TOOL_NAME_EMIT_EXPLANATION: &str = "emit_explanation";

#[derive(Debug, Clone)]
pub struct AnthropicClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicClient {
    pub fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = settings.require_anthropic_api_key()?.to_string();
        let base_url =
            std::env::var("ANTHROPIC_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string());
        let model = std::env::var("ANTHROPIC_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let max_tokens = std::env::var("ANTHROPIC_MAX_TOKENS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_MAX_TOKENS);

        let timeout_secs = std::env::var("ANTHROPIC_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            http,
            api_key,
            base_url,
            model,
            max_tokens,
        })
    }

    async fn create_message(
        &self,
        symbol: &str,
        req: CreateMessageRequest,
    ) -> anyhow::Result<(serde_json::Value, CreateMessageResponse)> {
        let mut headers = HeaderMap::new();
        headers.insert("x-api-key", HeaderValue::from_str(&self.api_key)?);
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );

        let url = format!("{}/v1/messages", self.base_url.trim_end_matches('/'));
        let res = self
            .http
            .post(url)
            .headers(headers)
            .json(&req)
            .send()
            .await
            .context("Anthropic request failed")?;

        let status = res.status();
        let text = res
            .text()
            .await
            .context("failed to read Anthropic response body")?;
        if !status.is_success() {
            let raw_response_json = serde_json::from_str::<serde_json::Value>(&text).ok();
            return Err(LlmDiagnosticsError {
                provider: Provider::Anthropic,
                stage: ExplainStage::Http,
                symbol: symbol.to_string(),
                detail: format!("status={status}"),
                raw_output: Some(text),
                raw_response_json,
            }
            .into());
        }

        let raw_json = serde_json::from_str::<serde_json::Value>(&text)
            .with_context(|| format!("failed to parse Anthropic response JSON: {text}"))?;
        let parsed = serde_json::from_value::<CreateMessageResponse>(raw_json.clone())
            .context("failed to decode Anthropic response into CreateMessageResponse")?;
        Ok((raw_json, parsed))
    }

    fn tools() -> Vec<Tool> {
        // Strict three-key schema keeps the model on script.
        let schema = serde_json::json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["what_changed", "why_it_matters", "what_to_watch"],
            "properties": {
                "what_changed": {"type": "string"},
                "why_it_matters": {"type": "string"},
                "what_to_watch": {"type": "string"}
            }
        });

        vec![Tool {
            name: TOOL_NAME_EMIT_EXPLANATION,
            description: "Emit the final change explanation as structured JSON",
            input_schema: schema,
        }]
    }

    fn tool_choice() -> ToolChoice {
        ToolChoice::Tool {
            name: TOOL_NAME_EMIT_EXPLANATION,
        }
    }

    fn system_prompt() -> String {
        [
            "You are a calm, professional stock analyst explaining a detected change to a retail investor.",
            "You only receive pre-computed analysis results; never ask for raw price data.",
            "Return ONLY valid JSON. Do not wrap in markdown. Do not include any extra keys.",
            "Output schema:",
            "{",
            "  \"what_changed\": \"1-2 sentences\",",
            "  \"why_it_matters\": \"1-2 sentences\",",
            "  \"what_to_watch\": \"one invalidation signal to monitor\"",
            "}",
            "Rules:",
            "- Be calm and factual. No alarmism.",
            "- No buy/sell recommendations. No price predictions.",
            "- All three values must be non-empty.",
        ]
        .join("\n")
    }

    fn user_prompt(input: &ExplainInput) -> String {
        let diff_json = serde_json::to_string_pretty(&input.diff)
            .unwrap_or_else(|_| input.diff.summary.clone());
        format!(
            "Task: Explain the following detected change for {} between {} and {}.\n\nChange record JSON:\n{}",
            input.diff.symbol, input.diff.from_taken_at, input.diff.to_taken_at, diff_json
        )
    }

    fn repair_prompt(previous_output: &str) -> String {
        format!(
            "Your previous message was NOT valid JSON.\n\n\
TASK: Output ONLY a single JSON object with exactly the keys \
what_changed, why_it_matters, what_to_watch.\n\
- Do NOT include any markdown, prose, or code fences.\n\
- Use double quotes for all JSON strings.\n\
- All three values must be non-empty strings.\n\n\
INVALID OUTPUT (for reference only; DO NOT copy verbatim):\n{previous_output}"
        )
    }

    fn response_text(res: &CreateMessageResponse) -> String {
        let mut out = String::new();
        for block in &res.content {
            if let ContentBlock::Text { text } = block {
                if !out.is_empty() {
                    out.push('\n');
                }
                out.push_str(text);
            }
        }
        out
    }

    fn response_tool_explanation(
        res: &CreateMessageResponse,
    ) -> anyhow::Result<Option<LlmChangeExplanation>> {
        for block in &res.content {
            if let ContentBlock::ToolUse { name, input, .. } = block {
                if name == TOOL_NAME_EMIT_EXPLANATION {
                    let parsed = serde_json::from_value::<LlmChangeExplanation>(input.clone())
                        .context("failed to decode tool_use.input into LlmChangeExplanation")?;
                    return Ok(Some(parsed));
                }
            }
        }
        Ok(None)
    }

    async fn try_parse_with_repair(
        &self,
        symbol: &str,
        initial_text: String,
        initial_raw_json: serde_json::Value,
    ) -> anyhow::Result<(ChangeExplanation, serde_json::Value)> {
        match json::parse_explanation(&initial_text) {
            Ok(explanation) => Ok((explanation, initial_raw_json)),
            Err(first_err) => {
                let repair_req = CreateMessageRequest {
                    model: self.model.clone(),
                    max_tokens: self.max_tokens,
                    system: Some(Self::system_prompt()),
                    messages: vec![Message {
                        role: "user",
                        content: Self::repair_prompt(&initial_text),
                    }],
                    tools: Some(Self::tools()),
                    tool_choice: Some(Self::tool_choice()),
                };

                tracing::warn!(symbol, error = %first_err, "LLM output invalid; attempting repair");
                let (repair_raw_json, repair_res) = self.create_message(symbol, repair_req).await?;

                if let Some(contract) = Self::response_tool_explanation(&repair_res)? {
                    return Ok((contract.validate_and_into_explanation()?, repair_raw_json));
                }

                let repair_text = Self::response_text(&repair_res);
                match json::parse_explanation(&repair_text) {
                    Ok(explanation) => Ok((explanation, repair_raw_json)),
                    Err(err) => Err(LlmDiagnosticsError {
                        provider: Provider::Anthropic,
                        stage: ExplainStage::ParseAfterRepair,
                        symbol: symbol.to_string(),
                        detail: format!("final_error={err}"),
                        raw_output: Some(repair_text),
                        raw_response_json: Some(repair_raw_json),
                    }
                    .into()),
                }
            }
        }
    }

    pub async fn explain_change_with_raw(
        &self,
        input: ExplainInput,
    ) -> anyhow::Result<(ChangeExplanation, serde_json::Value)> {
        let req = CreateMessageRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(Self::system_prompt()),
            messages: vec![Message {
                role: "user",
                content: Self::user_prompt(&input),
            }],
            tools: Some(Self::tools()),
            tool_choice: Some(Self::tool_choice()),
        };

        let symbol = input.diff.symbol.clone();
        let (raw_json, res) = self.create_message(&symbol, req).await?;

        // Tool output path.
        if let Some(contract) = Self::response_tool_explanation(&res)? {
            return Ok((contract.validate_and_into_explanation()?, raw_json));
        }

        // Fallback to text (should be rare with a forced tool choice).
        let text = Self::response_text(&res);
        self.try_parse_with_repair(&symbol, text, raw_json).await
    }
}

#[async_trait::async_trait]
impl LlmClient for AnthropicClient {
    fn provider(&self) -> Provider {
        Provider::Anthropic
    }

    async fn explain_change(&self, input: ExplainInput) -> anyhow::Result<ChangeExplanation> {
        let (explanation, _raw) = self.explain_change_with_raw(input).await?;
        Ok(explanation)
    }
}

#[derive(Debug, Clone, Serialize)]
struct CreateMessageRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<Tool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<ToolChoice>,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CreateMessageResponse {
    content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Serialize)]
struct Tool {
    name: &'static str,
    description: &'static str,
    input_schema: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
enum ToolChoice {
    #[serde(rename = "tool")]
    Tool { name: &'static str },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },

    #[serde(rename = "tool_use")]
    ToolUse {
        #[serde(default)]
        id: String,
        #[serde(default)]
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },

    #[serde(other)]
    Unknown,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_tool_use_explanation_input() {
        let tool_input = json!({
            "what_changed": "Volatility jumped from the low to the high bucket.",
            "why_it_matters": "Wider daily swings usually mean higher position risk.",
            "what_to_watch": "Whether the 14-day range contracts back below its median."
        });

        let res = CreateMessageResponse {
            content: vec![ContentBlock::ToolUse {
                id: "toolu_1".to_string(),
                name: TOOL_NAME_EMIT_EXPLANATION.to_string(),
                input: tool_input,
            }],
        };

        let parsed = AnthropicClient::response_tool_explanation(&res)
            .unwrap()
            .unwrap();
        let explanation = parsed.validate_and_into_explanation().unwrap();
        assert!(explanation.what_changed.starts_with("Volatility"));
    }

    #[test]
    fn ignores_foreign_tool_blocks() {
        let res = CreateMessageResponse {
            content: vec![ContentBlock::ToolUse {
                id: "toolu_2".to_string(),
                name: "something_else".to_string(),
                input: json!({}),
            }],
        };

        assert!(AnthropicClient::response_tool_explanation(&res)
            .unwrap()
            .is_none());
    }
}
