//! Streaming runner — drives a single model call and fans its progress out
//! to the client.
//!
//! Every thinking token streams to the client as it arrives; the full text of
//! both channels is accumulated server-side so completion events carry
//! authoritative output even for clients that missed deltas. Token usage is
//! recorded on the accountant only when the provider reports call completion.

use crate::bus::{EventBus, Subevent, WorkflowKind};
use crate::provider::{
    CompletionRequest, ContentPart, Message, Provider, StopReason, StreamChunk, ToolDefinition,
};
use crate::telemetry::{TokenAccountant, TokenDelta};
use anyhow::{anyhow, Result};
use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;

/// Thinking-token heuristic: ~4 characters per token, used where the
/// provider does not itemise the thinking channel.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Specification for one streamed call.
pub struct CallSpec {
    pub kind: WorkflowKind,
    pub system: String,
    pub messages: Vec<Message>,
    pub thinking_budget: u32,
    pub max_tokens: u32,
    pub tools: Vec<ToolDefinition>,
    /// Extra fields merged into every emitted payload (e.g. `case_number`).
    pub tag: Value,
    /// Progress hints: when the thinking-delta count crosses a threshold, a
    /// labelled `status` frame is emitted. Heuristic, not contractual.
    pub milestones: Vec<(usize, String)>,
}

impl CallSpec {
    pub fn new(kind: WorkflowKind, system: impl Into<String>, user_prompt: impl Into<String>) -> Self {
        Self {
            kind,
            system: system.into(),
            messages: vec![Message::user_text(user_prompt)],
            thinking_budget: 10_000,
            max_tokens: 18_192,
            tools: Vec::new(),
            tag: json!({}),
            milestones: Vec::new(),
        }
    }

    pub fn with_budgets(mut self, thinking: u32, response: u32) -> Self {
        self.thinking_budget = thinking;
        self.max_tokens = thinking + response;
        self
    }

    pub fn with_tag(mut self, tag: Value) -> Self {
        self.tag = tag;
        self
    }
}

/// A tool invocation the model requested during the call.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub id: String,
    pub name: String,
    pub input: Value,
}

/// Result of one completed call.
pub struct RunOutcome {
    pub thinking: String,
    pub response: String,
    /// The assistant turn exactly as it must be replayed to the provider
    /// (thinking blocks with signatures, text, tool-use blocks, in order).
    pub assistant_content: Vec<ContentPart>,
    pub tool_requests: Vec<ToolRequest>,
    pub usage: crate::provider::Usage,
    pub truncated: bool,
}

pub struct StreamingRunner {
    provider: Arc<dyn Provider>,
    bus: Arc<EventBus>,
    accountant: Arc<TokenAccountant>,
    model: String,
}

impl StreamingRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        bus: Arc<EventBus>,
        accountant: Arc<TokenAccountant>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            bus,
            accountant,
            model: model.into(),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Drive one streaming call to completion, forwarding every chunk to the
    /// client. Errors from the transport surface as a namespaced error frame;
    /// a vanished client aborts the upstream stream without further events.
    pub async fn run(&self, client_id: &str, spec: CallSpec) -> Result<RunOutcome> {
        let request = CompletionRequest {
            model: self.model.clone(),
            system: Some(spec.system.clone()),
            messages: spec.messages.clone(),
            tools: spec.tools.clone(),
            max_tokens: spec.max_tokens,
            thinking_budget: Some(spec.thinking_budget),
            web_search: false,
        };

        let mut stream = match self.provider.stream(request).await {
            Ok(s) => s,
            Err(e) => {
                let msg = e.to_string();
                tracing::warn!(kind = ?spec.kind, error = %msg, "model call failed to open");
                self.emit(client_id, &spec, Subevent::Error, json!({"error": msg}));
                return Err(e);
            }
        };

        let mut thinking = String::new();
        let mut response = String::new();
        let mut segment_text = String::new();
        let mut assistant_content: Vec<ContentPart> = Vec::new();
        let mut tool_requests: Vec<ToolRequest> = Vec::new();
        let mut thinking_deltas = 0usize;
        let mut next_milestone = 0usize;
        let mut outcome: Option<RunOutcome> = None;

        while let Some(chunk) = stream.next().await {
            let delivered = match chunk {
                StreamChunk::ThinkingStarted => {
                    self.emit(client_id, &spec, Subevent::ThinkingStarted, json!({}))
                }
                StreamChunk::ThinkingDelta(text) => {
                    thinking.push_str(&text);
                    segment_text.push_str(&text);
                    thinking_deltas += 1;
                    self.check_milestones(client_id, &spec, thinking_deltas, &mut next_milestone);
                    self.emit(client_id, &spec, Subevent::ThinkingDelta, json!({"text": text}))
                }
                StreamChunk::ThinkingComplete { signature } => {
                    assistant_content.push(ContentPart::Thinking {
                        text: std::mem::take(&mut segment_text),
                        signature,
                    });
                    self.emit(
                        client_id,
                        &spec,
                        Subevent::ThinkingComplete,
                        json!({"total_length": thinking.len()}),
                    )
                }
                StreamChunk::TextStarted => {
                    segment_text.clear();
                    self.emit(client_id, &spec, Subevent::ResponseStarted, json!({}))
                }
                StreamChunk::TextDelta(text) => {
                    response.push_str(&text);
                    segment_text.push_str(&text);
                    self.emit(client_id, &spec, Subevent::ResponseDelta, json!({"text": text}))
                }
                StreamChunk::TextComplete => {
                    assistant_content.push(ContentPart::Text {
                        text: std::mem::take(&mut segment_text),
                    });
                    self.emit(
                        client_id,
                        &spec,
                        Subevent::ResponseComplete,
                        json!({"full_text": response}),
                    )
                }
                StreamChunk::ToolUseStarted { .. } => true,
                StreamChunk::ToolUseComplete { id, name, input } => {
                    assistant_content.push(ContentPart::ToolUse {
                        id: id.clone(),
                        name: name.clone(),
                        input: input.clone(),
                    });
                    tool_requests.push(ToolRequest { id, name, input });
                    true
                }
                StreamChunk::Done { usage, stop_reason } => {
                    let truncated = stop_reason == StopReason::MaxTokens;
                    let tally = self.accountant.add(TokenDelta {
                        input: usage.input_tokens,
                        output: usage.output_tokens,
                        thinking: thinking.len() as u64 / CHARS_PER_TOKEN,
                    });
                    self.bus.broadcast("token_update", json!(tally));
                    // Rounds that end in a tool request continue the same
                    // logical turn; the completion frame belongs to the
                    // terminal round only.
                    let delivered = if tool_requests.is_empty() {
                        self.emit(
                            client_id,
                            &spec,
                            Subevent::Complete,
                            json!({
                                "thinking_length": thinking.len(),
                                "response_length": response.len(),
                                "success": true,
                                "truncated": truncated,
                                "usage": usage,
                            }),
                        )
                    } else {
                        true
                    };
                    outcome = Some(RunOutcome {
                        thinking: std::mem::take(&mut thinking),
                        response: std::mem::take(&mut response),
                        assistant_content: std::mem::take(&mut assistant_content),
                        tool_requests: std::mem::take(&mut tool_requests),
                        usage,
                        truncated,
                    });
                    delivered
                }
                StreamChunk::Error(msg) => {
                    tracing::warn!(kind = ?spec.kind, error = %msg, "model stream error");
                    self.emit(client_id, &spec, Subevent::Error, json!({"error": msg.clone()}));
                    return Err(anyhow!("model stream error: {msg}"));
                }
            };

            if !delivered {
                // Client disconnected: abort the upstream call and discard
                // partial state.
                tracing::debug!(client_id, kind = ?spec.kind, "client gone, aborting stream");
                return Err(anyhow!("client disconnected"));
            }
            if outcome.is_some() {
                break;
            }
        }

        outcome.ok_or_else(|| {
            let msg = "stream ended before completion";
            self.emit(client_id, &spec, Subevent::Error, json!({"error": msg}));
            anyhow!(msg)
        })
    }

    fn emit(&self, client_id: &str, spec: &CallSpec, sub: Subevent, mut payload: Value) -> bool {
        merge_tag(&mut payload, &spec.tag);
        self.bus.emit(client_id, spec.kind, sub, payload)
    }

    fn check_milestones(
        &self,
        client_id: &str,
        spec: &CallSpec,
        deltas: usize,
        next: &mut usize,
    ) {
        while let Some((threshold, label)) = spec.milestones.get(*next) {
            if deltas < *threshold {
                break;
            }
            let _ = self.bus.emit_named(
                client_id,
                "status",
                json!({
                    "message": label,
                    "phase": spec.kind.namespace(),
                    "milestone": *next + 1,
                }),
            );
            *next += 1;
        }
    }
}

fn merge_tag(payload: &mut Value, tag: &Value) {
    if let (Some(obj), Some(extra)) = (payload.as_object_mut(), tag.as_object()) {
        for (k, v) in extra {
            obj.entry(k.clone()).or_insert_with(|| v.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_merges_without_clobbering() {
        let mut payload = json!({"text": "hello"});
        merge_tag(&mut payload, &json!({"case_number": "CR-1", "text": "ignored"}));
        assert_eq!(payload["case_number"], "CR-1");
        assert_eq!(payload["text"], "hello");
    }
}
