//! LLM provider abstraction
//!
//! A narrow interface over a long-context model exposing streaming,
//! interleaved thinking, and tool use. The conversation is an ordered
//! sequence of typed segments; the provider knows how to serialize them to
//! its wire format.

pub mod anthropic;

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentPart>,
}

impl Message {
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    /// Concatenated visible text of this message.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One typed segment of a conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    /// The model's reasoning trace. The signature must round-trip back to the
    /// provider when the segment is replayed in a later turn.
    Thinking {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    Image {
        media_type: String,
        /// Base64-encoded payload.
        data: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
    },
}

/// Tool definition advertised to the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    /// JSON Schema for the input object.
    pub input_schema: Value,
}

/// Request for one model call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub system: Option<String>,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: u32,
    /// Extended-thinking budget; `None` disables thinking.
    pub thinking_budget: Option<u32>,
    /// Advertise the provider's built-in web search tool (grounded calls).
    pub web_search: bool,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            system: None,
            messages: Vec::new(),
            tools: Vec::new(),
            max_tokens,
            thinking_budget: None,
            web_search: false,
        }
    }
}

/// Authoritative token usage reported by the provider for one call.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
    Other,
}

impl StopReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "end_turn" | "stop_sequence" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "tool_use" => StopReason::ToolUse,
            _ => StopReason::Other,
        }
    }
}

/// Incremental chunk from a streaming call. Thinking and response segments
/// interleave; tool-use blocks arrive complete once their input JSON has
/// accumulated.
#[derive(Debug, Clone)]
pub enum StreamChunk {
    ThinkingStarted,
    ThinkingDelta(String),
    /// Carries the signature that must round-trip on replay.
    ThinkingComplete { signature: Option<String> },
    TextStarted,
    TextDelta(String),
    TextComplete,
    ToolUseStarted { id: String, name: String },
    ToolUseComplete { id: String, name: String, input: Value },
    Done { usage: Usage, stop_reason: StopReason },
    Error(String),
}

/// Final result of a non-streaming call.
#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: Vec<ContentPart>,
    pub usage: Usage,
    pub stop_reason: StopReason,
}

impl CompletionResponse {
    /// Concatenated visible text.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|p| match p {
                ContentPart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Provider trait all model backends implement.
#[async_trait]
pub trait Provider: Send + Sync {
    fn name(&self) -> &str;

    /// One-shot completion (used by grounded secondary calls).
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse>;

    /// Streaming completion with interleaved thinking.
    async fn stream(
        &self,
        request: CompletionRequest,
    ) -> Result<BoxStream<'static, StreamChunk>>;
}
