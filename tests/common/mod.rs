//! Shared test harness: a scripted provider that replays canned model turns
//! and records every request it receives.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use case_nexus::bus::EventFrame;
use case_nexus::provider::{
    CompletionRequest, CompletionResponse, ContentPart, Provider, StopReason, StreamChunk, Usage,
};
use case_nexus::server::{build_state, AppState};
use case_nexus::store::{CaseRecord, Severity, Store};
use futures::stream::BoxStream;
use futures::StreamExt;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;

/// One scripted model turn.
pub enum Script {
    /// Stream these chunks in order.
    Stream(Vec<StreamChunk>),
    /// Stream with a per-chunk delay (for overlap tests).
    SlowStream(Vec<StreamChunk>, Duration),
    /// Non-streaming completion (grounded calls).
    Complete(CompletionResponse),
    /// Fail the call outright.
    Fail(String),
}

pub struct ScriptedProvider {
    scripts: Mutex<VecDeque<Script>>,
    pub requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    pub fn new(scripts: Vec<Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts: Mutex::new(scripts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn next_script(&self) -> Result<Script> {
        self.scripts
            .lock()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted provider exhausted"))
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse> {
        self.requests.lock().push(request);
        match self.next_script()? {
            Script::Complete(response) => Ok(response),
            Script::Fail(msg) => Err(anyhow!(msg)),
            _ => Err(anyhow!("scripted a stream where a completion was expected")),
        }
    }

    async fn stream(&self, request: CompletionRequest) -> Result<BoxStream<'static, StreamChunk>> {
        self.requests.lock().push(request);
        match self.next_script()? {
            Script::Stream(chunks) => Ok(futures::stream::iter(chunks).boxed()),
            Script::SlowStream(chunks, delay) => Ok(futures::stream::iter(chunks)
                .then(move |chunk| async move {
                    tokio::time::sleep(delay).await;
                    chunk
                })
                .boxed()),
            Script::Fail(msg) => Err(anyhow!(msg)),
            _ => Err(anyhow!("scripted a completion where a stream was expected")),
        }
    }
}

/// A complete thinking + text turn ending cleanly.
pub fn text_turn(thinking: &str, response: &str) -> Vec<StreamChunk> {
    let mut chunks = vec![
        StreamChunk::ThinkingStarted,
        StreamChunk::ThinkingDelta(thinking.to_string()),
        StreamChunk::ThinkingComplete {
            signature: Some("sig".to_string()),
        },
        StreamChunk::TextStarted,
    ];
    // Split the response across two deltas to exercise accumulation.
    let mut mid = response.len() / 2;
    while mid > 0 && !response.is_char_boundary(mid) {
        mid -= 1;
    }
    let (a, b) = response.split_at(mid);
    if !a.is_empty() {
        chunks.push(StreamChunk::TextDelta(a.to_string()));
    }
    if !b.is_empty() {
        chunks.push(StreamChunk::TextDelta(b.to_string()));
    }
    chunks.push(StreamChunk::TextComplete);
    chunks.push(StreamChunk::Done {
        usage: Usage {
            input_tokens: 1000,
            output_tokens: 200,
        },
        stop_reason: StopReason::EndTurn,
    });
    chunks
}

/// A turn where the model requests one tool and stops.
pub fn tool_turn(thinking: &str, tool_id: &str, tool_name: &str, input: Value) -> Vec<StreamChunk> {
    vec![
        StreamChunk::ThinkingStarted,
        StreamChunk::ThinkingDelta(thinking.to_string()),
        StreamChunk::ThinkingComplete {
            signature: Some("sig".to_string()),
        },
        StreamChunk::ToolUseStarted {
            id: tool_id.to_string(),
            name: tool_name.to_string(),
        },
        StreamChunk::ToolUseComplete {
            id: tool_id.to_string(),
            name: tool_name.to_string(),
            input,
        },
        StreamChunk::Done {
            usage: Usage {
                input_tokens: 500,
                output_tokens: 50,
            },
            stop_reason: StopReason::ToolUse,
        },
    ]
}

pub fn completion(text: &str) -> CompletionResponse {
    CompletionResponse {
        content: vec![ContentPart::Text {
            text: text.to_string(),
        }],
        usage: Usage {
            input_tokens: 100,
            output_tokens: 100,
        },
        stop_reason: StopReason::EndTurn,
    }
}

/// Minimal case record for seeding.
pub fn case(case_number: &str, officer: &str, charges: &[&str]) -> CaseRecord {
    CaseRecord {
        case_number: case_number.to_string(),
        defendant_name: format!("Defendant {case_number}"),
        charges: charges.iter().map(|s| s.to_string()).collect(),
        severity: Severity::Misdemeanor,
        status: "active".to_string(),
        court: "State Court".to_string(),
        judge: "Hon. Q. Adams".to_string(),
        prosecutor: "ADA Ray".to_string(),
        next_hearing_date: None,
        hearing_type: None,
        filing_date: "2026-06-01".to_string(),
        arrest_date: "2026-05-15".to_string(),
        evidence_summary: String::new(),
        notes: String::new(),
        attorney_notes: String::new(),
        plea_offer: None,
        plea_offer_details: None,
        arresting_officer: officer.to_string(),
        precinct: "Zone 9".to_string(),
        witnesses: vec![],
        prior_record: String::new(),
        bond_status: String::new(),
    }
}

/// Build the full engine over an in-memory store and the scripted provider.
pub fn harness(cases: &[CaseRecord], scripts: Vec<Script>) -> (AppState, Arc<ScriptedProvider>) {
    let store = Arc::new(Store::open_in_memory().expect("in-memory store"));
    store.insert_cases(cases).expect("seed cases");
    let provider = ScriptedProvider::new(scripts);
    let state = build_state(store, provider.clone(), "test-model");
    (state, provider)
}

/// Drain every frame currently queued for a client.
pub fn drain(rx: &mut UnboundedReceiver<EventFrame>) -> Vec<EventFrame> {
    let mut frames = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        frames.push(frame);
    }
    frames
}

pub fn events_named<'a>(frames: &'a [EventFrame], name: &str) -> Vec<&'a EventFrame> {
    frames.iter().filter(|f| f.event == name).collect()
}

/// First occurrence index of each named event, for ordering assertions.
pub fn position(frames: &[EventFrame], name: &str) -> Option<usize> {
    frames.iter().position(|f| f.event == name)
}
