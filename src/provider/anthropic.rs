//! Anthropic provider implementation using the Messages API
//!
//! Speaks the native Anthropic format: system prompt as a top-level field,
//! tool results inside user messages, thinking blocks with signatures that
//! round-trip on replay. Streaming parses the SSE event frames by hand from
//! the byte stream.
//! Reference: https://docs.anthropic.com/en/api/messages

use super::{
    CompletionRequest, CompletionResponse, ContentPart, Message, Provider, Role, StopReason,
    StreamChunk, ToolDefinition, Usage,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

const ANTHROPIC_API_BASE: &str = "https://api.anthropic.com";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const WEB_SEARCH_TOOL_TYPE: &str = "web_search_20250305";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

pub struct AnthropicProvider {
    client: Client,
    api_key: String,
    base_url: String,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("api_key", &"<REDACTED>")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AnthropicProvider {
    pub fn new(api_key: String) -> Result<Self> {
        Self::with_base_url(api_key, ANTHROPIC_API_BASE.to_string())
    }

    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self> {
        if api_key.is_empty() {
            anyhow::bail!("Anthropic API key is empty");
        }
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn request_body(request: &CompletionRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(convert_message).collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
        });
        if stream {
            body["stream"] = json!(true);
        }
        if let Some(system) = &request.system {
            body["system"] = json!(system);
        }
        if let Some(budget) = request.thinking_budget {
            body["thinking"] = json!({"type": "enabled", "budget_tokens": budget});
        }

        let mut tools: Vec<Value> = request.tools.iter().map(convert_tool).collect();
        if request.web_search {
            tools.push(json!({"type": WEB_SEARCH_TOOL_TYPE, "name": "web_search"}));
        }
        if !tools.is_empty() {
            body["tools"] = json!(tools);
        }
        body
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/messages", self.base_url)
    }
}

/// Serialize one conversation message to the wire format.
fn convert_message(msg: &Message) -> Value {
    let role = match msg.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };
    let content: Vec<Value> = msg
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => json!({"type": "text", "text": text}),
            ContentPart::Thinking { text, signature } => json!({
                "type": "thinking",
                "thinking": text,
                "signature": signature.clone().unwrap_or_default(),
            }),
            ContentPart::Image { media_type, data } => json!({
                "type": "image",
                "source": {"type": "base64", "media_type": media_type, "data": data},
            }),
            ContentPart::ToolUse { id, name, input } => json!({
                "type": "tool_use", "id": id, "name": name, "input": input,
            }),
            ContentPart::ToolResult { tool_use_id, content } => json!({
                "type": "tool_result", "tool_use_id": tool_use_id, "content": content,
            }),
        })
        .collect();
    json!({"role": role, "content": content})
}

fn convert_tool(tool: &ToolDefinition) -> Value {
    json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.input_schema,
    })
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    content: Vec<ApiContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ApiContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        #[serde(default)]
        signature: Option<String>,
    },
    #[serde(rename = "tool_use")]
    ToolUse { id: String, name: String, input: Value },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Deserialize, Default)]
struct ApiUsage {
    #[serde(default)]
    input_tokens: u64,
    #[serde(default)]
    output_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
}

#[async_trait]
impl Provider for AnthropicProvider {
    fn name(&self) -> &str {
        "anthropic"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        tracing::debug!(
            model = %request.model,
            message_count = request.messages.len(),
            tool_count = request.tools.len(),
            web_search = request.web_search,
            "Anthropic completion request"
        );

        let body = Self::request_body(&request, false);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("failed to send request to Anthropic")?;

        let status = response.status();
        let text = response.text().await.context("failed to read Anthropic response")?;

        if !status.is_success() {
            if let Ok(err) = serde_json::from_str::<ApiError>(&text) {
                anyhow::bail!(
                    "Anthropic API error: {} ({:?})",
                    err.error.message,
                    err.error.error_type
                );
            }
            anyhow::bail!("Anthropic API error: {} {}", status, text);
        }

        let parsed: ApiResponse = serde_json::from_str(&text).with_context(|| {
            format!("failed to parse Anthropic response: {}", &text[..text.len().min(200)])
        })?;

        let mut content = Vec::new();
        for part in parsed.content {
            match part {
                ApiContent::Text { text } => {
                    if !text.is_empty() {
                        content.push(ContentPart::Text { text });
                    }
                }
                ApiContent::Thinking { thinking, signature } => {
                    content.push(ContentPart::Thinking { text: thinking, signature });
                }
                ApiContent::ToolUse { id, name, input } => {
                    content.push(ContentPart::ToolUse { id, name, input });
                }
                ApiContent::Unknown => {}
            }
        }

        let usage = parsed.usage.unwrap_or_default();
        Ok(CompletionResponse {
            content,
            usage: Usage {
                input_tokens: usage.input_tokens,
                output_tokens: usage.output_tokens,
            },
            stop_reason: StopReason::parse(parsed.stop_reason.as_deref().unwrap_or("")),
        })
    }

    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<futures::stream::BoxStream<'static, StreamChunk>> {
        tracing::debug!(
            model = %request.model,
            thinking_budget = ?request.thinking_budget,
            "Anthropic streaming request"
        );

        let body = Self::request_body(&request, true);
        let response = self
            .client
            .post(self.endpoint())
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await
            .context("failed to send streaming request to Anthropic")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            if let Ok(err) = serde_json::from_str::<ApiError>(&text) {
                anyhow::bail!(
                    "Anthropic API error: {} ({:?})",
                    err.error.message,
                    err.error.error_type
                );
            }
            anyhow::bail!("Anthropic streaming error: {} {}", status, text);
        }

        let byte_stream = response.bytes_stream();
        let mut state = SseState::default();

        Ok(byte_stream
            .flat_map(move |chunk_result| {
                let chunks = match chunk_result {
                    Ok(bytes) => state.feed(&bytes),
                    Err(e) => vec![StreamChunk::Error(e.to_string())],
                };
                futures::stream::iter(chunks)
            })
            .boxed())
    }
}

/// Incremental SSE parser for the Messages API event stream. Tracks the
/// current content block so deltas map to the right channel and tool-use
/// input JSON accumulates until the block closes.
#[derive(Default)]
struct SseState {
    buffer: String,
    block: Option<BlockState>,
    usage: Usage,
    stop_reason: Option<StopReason>,
}

enum BlockState {
    Thinking { signature: Option<String> },
    Text,
    ToolUse { id: String, name: String, input_json: String },
    Other,
}

impl SseState {
    fn feed(&mut self, bytes: &[u8]) -> Vec<StreamChunk> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));
        let mut out = Vec::new();

        while let Some(line_end) = self.buffer.find('\n') {
            let line = self.buffer[..line_end].trim().to_string();
            self.buffer.drain(..=line_end);

            if line.is_empty() || line.starts_with("event:") {
                continue;
            }
            let Some(data) = line.strip_prefix("data: ") else {
                continue;
            };
            let Ok(event) = serde_json::from_str::<Value>(data) else {
                continue;
            };
            self.handle_event(&event, &mut out);
        }
        out
    }

    fn handle_event(&mut self, event: &Value, out: &mut Vec<StreamChunk>) {
        let event_type = event.get("type").and_then(Value::as_str).unwrap_or("");
        match event_type {
            "message_start" => {
                if let Some(usage) = event.pointer("/message/usage") {
                    self.usage.input_tokens =
                        usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0);
                }
            }
            "content_block_start" => {
                let block = event.get("content_block");
                let block_type = block
                    .and_then(|b| b.get("type"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                match block_type {
                    "thinking" => {
                        self.block = Some(BlockState::Thinking { signature: None });
                        out.push(StreamChunk::ThinkingStarted);
                    }
                    "text" => {
                        self.block = Some(BlockState::Text);
                        out.push(StreamChunk::TextStarted);
                    }
                    "tool_use" => {
                        let id = block
                            .and_then(|b| b.get("id"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        let name = block
                            .and_then(|b| b.get("name"))
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string();
                        out.push(StreamChunk::ToolUseStarted {
                            id: id.clone(),
                            name: name.clone(),
                        });
                        self.block = Some(BlockState::ToolUse {
                            id,
                            name,
                            input_json: String::new(),
                        });
                    }
                    _ => {
                        self.block = Some(BlockState::Other);
                    }
                }
            }
            "content_block_delta" => {
                let Some(delta) = event.get("delta") else { return };
                let delta_type = delta.get("type").and_then(Value::as_str).unwrap_or("");
                match delta_type {
                    "thinking_delta" => {
                        if let Some(text) = delta.get("thinking").and_then(Value::as_str) {
                            out.push(StreamChunk::ThinkingDelta(text.to_string()));
                        }
                    }
                    "text_delta" => {
                        if let Some(text) = delta.get("text").and_then(Value::as_str) {
                            out.push(StreamChunk::TextDelta(text.to_string()));
                        }
                    }
                    "input_json_delta" => {
                        if let Some(BlockState::ToolUse { input_json, .. }) = &mut self.block {
                            if let Some(partial) = delta.get("partial_json").and_then(Value::as_str)
                            {
                                input_json.push_str(partial);
                            }
                        }
                    }
                    "signature_delta" => {
                        if let Some(BlockState::Thinking { signature }) = &mut self.block {
                            if let Some(sig) = delta.get("signature").and_then(Value::as_str) {
                                signature.get_or_insert_with(String::new).push_str(sig);
                            }
                        }
                    }
                    _ => {}
                }
            }
            "content_block_stop" => match self.block.take() {
                Some(BlockState::Thinking { signature }) => {
                    out.push(StreamChunk::ThinkingComplete { signature });
                }
                Some(BlockState::Text) => out.push(StreamChunk::TextComplete),
                Some(BlockState::ToolUse { id, name, input_json }) => {
                    let input = if input_json.is_empty() {
                        json!({})
                    } else {
                        serde_json::from_str(&input_json).unwrap_or_else(|_| json!({"raw": input_json}))
                    };
                    out.push(StreamChunk::ToolUseComplete { id, name, input });
                }
                _ => {}
            },
            "message_delta" => {
                if let Some(usage) = event.get("usage") {
                    if let Some(output) = usage.get("output_tokens").and_then(Value::as_u64) {
                        self.usage.output_tokens = output;
                    }
                }
                if let Some(reason) = event.pointer("/delta/stop_reason").and_then(Value::as_str) {
                    self.stop_reason = Some(StopReason::parse(reason));
                }
            }
            "message_stop" => {
                out.push(StreamChunk::Done {
                    usage: self.usage,
                    stop_reason: self.stop_reason.unwrap_or(StopReason::EndTurn),
                });
            }
            "error" => {
                let message = event
                    .pointer("/error/message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown stream error");
                out.push(StreamChunk::Error(message.to_string()));
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_lines(state: &mut SseState, lines: &[&str]) -> Vec<StreamChunk> {
        let mut out = Vec::new();
        for line in lines {
            out.extend(state.feed(format!("{line}\n").as_bytes()));
        }
        out
    }

    #[test]
    fn parses_interleaved_thinking_and_text() {
        let mut state = SseState::default();
        let chunks = feed_lines(
            &mut state,
            &[
                r#"data: {"type":"message_start","message":{"usage":{"input_tokens":120}}}"#,
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"thinking_delta","thinking":"hmm "}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"sig123"}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
                r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"text"}}"#,
                r#"data: {"type":"content_block_delta","index":1,"delta":{"type":"text_delta","text":"answer"}}"#,
                r#"data: {"type":"content_block_stop","index":1}"#,
                r#"data: {"type":"message_delta","delta":{"stop_reason":"end_turn"},"usage":{"output_tokens":42}}"#,
                r#"data: {"type":"message_stop"}"#,
            ],
        );

        assert!(matches!(chunks[0], StreamChunk::ThinkingStarted));
        assert!(matches!(&chunks[1], StreamChunk::ThinkingDelta(t) if t == "hmm "));
        assert!(
            matches!(&chunks[2], StreamChunk::ThinkingComplete { signature: Some(s) } if s == "sig123")
        );
        assert!(matches!(chunks[3], StreamChunk::TextStarted));
        assert!(matches!(&chunks[4], StreamChunk::TextDelta(t) if t == "answer"));
        assert!(matches!(chunks[5], StreamChunk::TextComplete));
        match chunks.last().unwrap() {
            StreamChunk::Done { usage, stop_reason } => {
                assert_eq!(usage.input_tokens, 120);
                assert_eq!(usage.output_tokens, 42);
                assert_eq!(*stop_reason, StopReason::EndTurn);
            }
            other => panic!("unexpected terminal chunk: {other:?}"),
        }
    }

    #[test]
    fn accumulates_tool_input_json() {
        let mut state = SseState::default();
        let chunks = feed_lines(
            &mut state,
            &[
                r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"tool_use","id":"tu_1","name":"get_case"}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"{\"case_num"}}"#,
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"input_json_delta","partial_json":"ber\":\"CR-12\"}"}}"#,
                r#"data: {"type":"content_block_stop","index":0}"#,
            ],
        );

        assert!(matches!(&chunks[0], StreamChunk::ToolUseStarted { id, name } if id == "tu_1" && name == "get_case"));
        match &chunks[1] {
            StreamChunk::ToolUseComplete { id, name, input } => {
                assert_eq!(id, "tu_1");
                assert_eq!(name, "get_case");
                assert_eq!(input["case_number"], "CR-12");
            }
            other => panic!("unexpected chunk: {other:?}"),
        }
    }

    #[test]
    fn handles_split_sse_frames() {
        let mut state = SseState::default();
        let mut chunks = Vec::new();
        let frame = r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text"}}"#;
        let (a, b) = frame.split_at(30);
        chunks.extend(state.feed(a.as_bytes()));
        chunks.extend(state.feed(format!("{b}\n").as_bytes()));
        assert!(matches!(chunks[0], StreamChunk::TextStarted));
    }

    #[test]
    fn thinking_blocks_serialize_with_signature() {
        let msg = Message {
            role: Role::Assistant,
            content: vec![ContentPart::Thinking {
                text: "trace".to_string(),
                signature: Some("sig".to_string()),
            }],
        };
        let wire = convert_message(&msg);
        assert_eq!(wire["content"][0]["type"], "thinking");
        assert_eq!(wire["content"][0]["signature"], "sig");
    }
}
