//! Anthropic Claude provider implementation

use super::*;
use crate::error;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// Anthropic Claude provider
pub struct AnthropicProvider {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicProvider {
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs.unwrap_or(120)))
            .build()
            .map_err(error::client_build_failed)?;

        Ok(Self { client, config })
    }

    fn base_url(&self) -> &str {
        self.config.base_url.as_deref().unwrap_or("https://api.anthropic.com/v1")
    }

    fn build_request(&self, request: CompletionRequest) -> AnthropicRequest {
        let model = request.model.as_deref().unwrap_or(self.default_model()).to_string();
        let (system, messages) = to_anthropic_messages(request.messages);

        AnthropicRequest {
            model,
            messages,
            system,
            max_tokens: request.max_tokens.unwrap_or(4096),
            temperature: request.temperature,
            tools: request.tools.as_ref().map(|tools| {
                tools.iter().map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                }).collect()
            }),
            stop_sequences: request.stop,
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    fn models(&self) -> Vec<String> {
        vec![
            "claude-sonnet-4-20250514".into(),
            "claude-opus-4-20250514".into(),
            "claude-3-5-haiku-20241022".into(),
        ]
    }

    fn default_model(&self) -> &str {
        self.config.default_model.as_deref().unwrap_or("claude-sonnet-4-20250514")
    }

    async fn complete(&self, request: CompletionRequest) -> std::result::Result<CompletionResponse, ProviderError> {
        let api_request = self.build_request(request);

        let api_key = self.config.api_key.as_ref()
            .ok_or(ProviderError::AuthenticationFailed)?;

        let mut req = self.client
            .post(format!("{}/messages", self.base_url()))
            .header("x-api-key", api_key)
            .header("content-type", "application/json")
            .json(&api_request);

        // anthropic-version comes from the config headers
        for (key, value) in &self.config.headers {
            req = req.header(key, value);
        }

        let response = req.send().await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        let status = response.status().as_u16();
        if !response.status().is_success() {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok());
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status, text, retry_after));
        }

        let api_response: AnthropicResponse = response.json().await
            .map_err(|e| ProviderError::Parse(e.to_string()))?;

        Ok(parse_response(api_response))
    }
}

/// Split out the system prompt and convert the rest of the transcript.
///
/// Assistant tool calls become `tool_use` blocks; consecutive tool results
/// are merged into a single user turn, as the Messages API requires.
fn to_anthropic_messages(messages: Vec<ChatMessage>) -> (Option<String>, Vec<AnthropicMessage>) {
    let mut system: Option<String> = None;
    let mut out: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {
                let text = msg.content.unwrap_or_default();
                system = Some(match system {
                    Some(existing) => format!("{}\n\n{}", existing, text),
                    None => text,
                });
            }
            Role::Tool => {
                let block = AnthropicContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.unwrap_or_default(),
                    content: msg.content.unwrap_or_default(),
                };
                match out.last_mut().filter(|m| m.is_tool_result_turn()) {
                    Some(AnthropicMessage { content: AnthropicContent::Blocks(blocks), .. }) => {
                        blocks.push(block);
                    }
                    _ => out.push(AnthropicMessage {
                        role: "user".into(),
                        content: AnthropicContent::Blocks(vec![block]),
                    }),
                }
            }
            Role::Assistant if msg.has_tool_calls() => {
                let mut blocks = Vec::new();
                if let Some(text) = msg.content.filter(|t| !t.is_empty()) {
                    blocks.push(AnthropicContentBlock::Text { text });
                }
                for tc in msg.tool_calls.unwrap_or_default() {
                    let input = serde_json::from_str(&tc.arguments)
                        .unwrap_or_else(|_| serde_json::json!({}));
                    blocks.push(AnthropicContentBlock::ToolUse {
                        id: tc.id,
                        name: tc.name,
                        input,
                    });
                }
                out.push(AnthropicMessage {
                    role: "assistant".into(),
                    content: AnthropicContent::Blocks(blocks),
                });
            }
            Role::Assistant if msg.is_blank_assistant_turn() => {}
            Role::Assistant => out.push(AnthropicMessage {
                role: "assistant".into(),
                content: AnthropicContent::Text(msg.content.unwrap_or_default()),
            }),
            Role::User => out.push(AnthropicMessage {
                role: "user".into(),
                content: AnthropicContent::Text(msg.content.unwrap_or_default()),
            }),
        }
    }

    (system, out)
}

fn parse_response(api_response: AnthropicResponse) -> CompletionResponse {
    let mut content = String::new();
    let mut tool_calls = Vec::new();

    for block in api_response.content {
        match block {
            ContentBlock::Text { text } => {
                content.push_str(&text);
            }
            ContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                });
            }
            ContentBlock::Other => {}
        }
    }

    let finish_reason = match api_response.stop_reason.as_deref() {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        _ => FinishReason::Unknown,
    };

    let usage = Usage {
        prompt_tokens: api_response.usage.input_tokens,
        completion_tokens: api_response.usage.output_tokens,
        total_tokens: api_response.usage.input_tokens + api_response.usage.output_tokens,
    };

    CompletionResponse {
        id: api_response.id,
        model: api_response.model,
        content: if content.is_empty() { None } else { Some(content) },
        tool_calls,
        finish_reason,
        usage,
    }
}

// ============================================================================
// Anthropic API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    max_tokens: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<AnthropicTool>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stop_sequences: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: AnthropicContent,
}

impl AnthropicMessage {
    fn is_tool_result_turn(&self) -> bool {
        match &self.content {
            AnthropicContent::Blocks(blocks) => {
                self.role == "user"
                    && blocks.iter().all(|b| matches!(b, AnthropicContentBlock::ToolResult { .. }))
            }
            AnthropicContent::Text(_) => false,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum AnthropicContent {
    Text(String),
    Blocks(Vec<AnthropicContentBlock>),
}

#[derive(Debug, Serialize)]
#[serde(tag = "type")]
enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    id: String,
    model: String,
    content: Vec<ContentBlock>,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    // thinking and other block types are not surfaced
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: usize,
    output_tokens: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_extracted() {
        let (system, messages) = to_anthropic_messages(vec![
            ChatMessage::system("You are a supervisor"),
            ChatMessage::user("Why does my loop never end?"),
        ]);
        assert_eq!(system.as_deref(), Some("You are a supervisor"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn test_tool_round_trip_shape() {
        let (_, messages) = to_anthropic_messages(vec![
            ChatMessage::user("help"),
            ChatMessage::assistant_tool_calls(
                Some("Routing.".into()),
                vec![
                    ToolCall::new("t1", "search_memory", r#"{"query":"loop"}"#),
                    ToolCall::new("t2", "transfer_to_solving_agent", "{}"),
                ],
            ),
            ChatMessage::tool_result("t1", "[]"),
            ChatMessage::tool_result("t2", "Solution: ..."),
        ]);

        assert_eq!(messages.len(), 3);
        let body = serde_json::to_value(&messages).unwrap();
        assert_eq!(body[1]["content"][0]["type"], "text");
        assert_eq!(body[1]["content"][1]["type"], "tool_use");
        assert_eq!(body[1]["content"][1]["input"]["query"], "loop");
        assert_eq!(body[2]["role"], "user");
        assert_eq!(body[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(body[2]["content"][1]["tool_use_id"], "t2");
    }

    #[test]
    fn test_blank_assistant_turn_skipped() {
        let (_, messages) = to_anthropic_messages(vec![
            ChatMessage::user("first"),
            ChatMessage::assistant("  ").with_name("supervisor"),
            ChatMessage::user("second"),
        ]);
        assert_eq!(messages.len(), 2);
        assert!(messages.iter().all(|m| m.role == "user"));
    }

    #[test]
    fn test_parse_response() {
        let api: AnthropicResponse = serde_json::from_value(serde_json::json!({
            "id": "msg_1",
            "model": "claude-sonnet-4-20250514",
            "content": [
                { "type": "text", "text": "Let me check memory." },
                { "type": "tool_use", "id": "tu_1", "name": "search_memory", "input": { "query": "recursion" } }
            ],
            "stop_reason": "tool_use",
            "usage": { "input_tokens": 12, "output_tokens": 8 }
        }))
        .unwrap();

        let response = parse_response(api);
        assert_eq!(response.finish_reason, FinishReason::ToolCalls);
        assert_eq!(response.content.as_deref(), Some("Let me check memory."));
        assert_eq!(response.tool_calls[0].arguments, r#"{"query":"recursion"}"#);
        assert_eq!(response.usage.total_tokens, 20);
    }

    #[test]
    fn test_request_uses_default_model() {
        let provider = AnthropicProvider::new(ProviderConfig::anthropic("sk-ant")).unwrap();
        let req = provider.build_request(CompletionRequest::new(vec![ChatMessage::user("x")]));
        assert_eq!(req.model, "claude-sonnet-4-20250514");
        assert_eq!(req.max_tokens, 4096);
    }
}
