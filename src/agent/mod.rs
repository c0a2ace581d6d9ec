//! Agentic tool loop
//!
//! Multi-round executor: the model chooses each next action, the loop
//! dispatches tool invocations and feeds results back into the same logical
//! conversation. Rounds are bounded; on exhaustion the model gets one final
//! no-tools turn to summarize with what it has.

use crate::bus::Subevent;
use crate::provider::{ContentPart, Message, Role};
use crate::runner::{CallSpec, StreamingRunner, ToolRequest};
use crate::tool::ToolRegistry;
use anyhow::Result;
use serde_json::json;
use std::sync::Arc;

/// Hard bound on model turns per loop invocation.
pub const MAX_ROUNDS: usize = 8;

/// Truncated tool output carried on the event frame; the full text still
/// reaches the model.
const RESULT_PREVIEW_CHARS: usize = 256;

pub struct LoopSpec {
    pub kind: crate::bus::WorkflowKind,
    pub system: String,
    pub initial_prompt: String,
    /// Tool ids advertised to the model; `None` advertises the whole registry.
    pub tool_subset: Option<Vec<String>>,
    pub max_rounds: usize,
    pub thinking_budget: u32,
    pub max_tokens: u32,
}

pub struct LoopOutcome {
    /// Final response text from the terminal round.
    pub response: String,
    /// Concatenated thinking across all rounds.
    pub thinking: String,
    pub rounds: usize,
    pub tool_invocations: usize,
}

pub struct ToolLoop {
    runner: Arc<StreamingRunner>,
    registry: Arc<ToolRegistry>,
}

impl ToolLoop {
    pub fn new(runner: Arc<StreamingRunner>, registry: Arc<ToolRegistry>) -> Self {
        Self { runner, registry }
    }

    pub async fn run(&self, client_id: &str, spec: LoopSpec) -> Result<LoopOutcome> {
        let subset: Option<Vec<&str>> = spec
            .tool_subset
            .as_ref()
            .map(|names| names.iter().map(|s| s.as_str()).collect());
        let tool_defs = self.registry.definitions(subset.as_deref());

        let mut messages = vec![Message::user_text(spec.initial_prompt.as_str())];
        let mut all_thinking = String::new();
        let mut final_response = String::new();
        let mut tool_invocations = 0usize;
        let max_rounds = spec.max_rounds.min(MAX_ROUNDS).max(1);

        let mut round = 0usize;
        loop {
            round += 1;
            let terminal = round >= max_rounds;

            let mut call = CallSpec::new(spec.kind, spec.system.clone(), "");
            call.messages = messages.clone();
            call.thinking_budget = spec.thinking_budget;
            call.max_tokens = spec.max_tokens;
            // The terminal round advertises no tools so the model must answer.
            call.tools = if terminal { Vec::new() } else { tool_defs.clone() };

            let outcome = self.runner.run(client_id, call).await?;
            all_thinking.push_str(&outcome.thinking);
            if !outcome.response.is_empty() {
                final_response = outcome.response.clone();
            }
            messages.push(Message {
                role: Role::Assistant,
                content: sanitize_assistant_content(outcome.assistant_content),
            });

            if outcome.tool_requests.is_empty() || terminal {
                tracing::debug!(
                    rounds = round,
                    tool_invocations,
                    "tool loop finished"
                );
                return Ok(LoopOutcome {
                    response: final_response,
                    thinking: all_thinking,
                    rounds: round,
                    tool_invocations,
                });
            }

            // Dispatch strictly sequentially: the next invocation is not
            // issued until the previous result has been appended.
            let mut result_parts: Vec<ContentPart> = Vec::new();
            for request in &outcome.tool_requests {
                tool_invocations += 1;
                let result = self.dispatch(client_id, spec.kind, request).await;
                result_parts.push(ContentPart::ToolResult {
                    tool_use_id: request.id.clone(),
                    content: result,
                });
            }

            // Out of rounds with tools still in play: tell the model the next
            // turn is its last.
            if round + 1 >= max_rounds {
                result_parts.push(ContentPart::Text {
                    text: "You have reached the tool budget. Summarize your findings and \
                           recommendations using only what you have gathered so far."
                        .to_string(),
                });
            }
            messages.push(Message {
                role: Role::User,
                content: result_parts,
            });
        }
    }

    async fn dispatch(
        &self,
        client_id: &str,
        kind: crate::bus::WorkflowKind,
        request: &ToolRequest,
    ) -> String {
        self.runner.bus().emit(
            client_id,
            kind,
            Subevent::ToolCall,
            json!({
                "tool_id": request.id,
                "tool_name": request.name,
                "tool_input": request.input,
                "status": "calling",
            }),
        );
        self.runner.bus().emit(
            client_id,
            kind,
            Subevent::ToolCall,
            json!({
                "tool_id": request.id,
                "tool_name": request.name,
                "tool_input": request.input,
                "status": "executing",
            }),
        );

        let result = self
            .registry
            .dispatch(&request.name, request.input.clone())
            .await;

        let preview: String = result.output.chars().take(RESULT_PREVIEW_CHARS).collect();
        self.runner.bus().emit(
            client_id,
            kind,
            Subevent::ToolResult,
            json!({
                "tool_id": request.id,
                "tool_name": request.name,
                "result_preview": preview,
                "result_length": result.output.len(),
                "success": result.success,
            }),
        );
        result.output
    }
}

/// Thinking blocks without a signature cannot be replayed to the provider;
/// drop them from the transcript (the text already streamed to the client).
fn sanitize_assistant_content(content: Vec<ContentPart>) -> Vec<ContentPart> {
    let cleaned: Vec<ContentPart> = content
        .into_iter()
        .filter(|part| match part {
            ContentPart::Thinking { signature, .. } => signature.is_some(),
            ContentPart::Text { text } => !text.is_empty(),
            _ => true,
        })
        .collect();
    if cleaned.is_empty() {
        vec![ContentPart::Text { text: " ".to_string() }]
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_drops_unsigned_thinking() {
        let content = vec![
            ContentPart::Thinking {
                text: "unsigned".to_string(),
                signature: None,
            },
            ContentPart::Thinking {
                text: "signed".to_string(),
                signature: Some("sig".to_string()),
            },
            ContentPart::Text {
                text: "answer".to_string(),
            },
        ];
        let cleaned = sanitize_assistant_content(content);
        assert_eq!(cleaned.len(), 2);
    }

    #[test]
    fn sanitize_never_leaves_empty_turn() {
        let cleaned = sanitize_assistant_content(vec![ContentPart::Text {
            text: String::new(),
        }]);
        assert_eq!(cleaned.len(), 1);
    }
}
