//! Event bus — per-client push channel for streaming analysis events.
//!
//! Every streaming frame is namespaced by the workflow that produced it. The
//! workflow kinds form a closed enum and the namespace is a total function of
//! the kind, so event names are decided here rather than assembled ad hoc at
//! call sites.
//!
//! | Kind | Namespace |
//! |------|-----------|
//! | HealthCheck | `health_check` |
//! | DeepAnalysis | `deep_analysis` |
//! | Prosecution / Defense / Judge | `prosecution` / `defense` / `judge` |
//! | Motion | `motion` |
//! | Evidence | `evidence` |
//! | Chat | `chat` |
//! | Cascade | `cascade` |
//! | Widget | `widget` |
//! | HearingPrep | `hearing_prep` |
//! | ClientLetter | `client_letter` |
//!
//! Frames for one client are queued on an unbounded channel drained by that
//! client's socket writer, so emission order is delivery order.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    HealthCheck,
    DeepAnalysis,
    Prosecution,
    Defense,
    Judge,
    Motion,
    Evidence,
    Chat,
    Cascade,
    Widget,
    HearingPrep,
    ClientLetter,
}

impl WorkflowKind {
    pub fn namespace(&self) -> &'static str {
        match self {
            WorkflowKind::HealthCheck => "health_check",
            WorkflowKind::DeepAnalysis => "deep_analysis",
            WorkflowKind::Prosecution => "prosecution",
            WorkflowKind::Defense => "defense",
            WorkflowKind::Judge => "judge",
            WorkflowKind::Motion => "motion",
            WorkflowKind::Evidence => "evidence",
            WorkflowKind::Chat => "chat",
            WorkflowKind::Cascade => "cascade",
            WorkflowKind::Widget => "widget",
            WorkflowKind::HearingPrep => "hearing_prep",
            WorkflowKind::ClientLetter => "client_letter",
        }
    }

    /// Analysis type recorded in the insight log. The three adversarial
    /// phases share one record type.
    pub fn analysis_type(&self) -> &'static str {
        match self {
            WorkflowKind::Prosecution | WorkflowKind::Defense | WorkflowKind::Judge => "adversarial",
            other => other.namespace(),
        }
    }
}

/// Sub-events within one workflow's stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subevent {
    ThinkingStarted,
    ThinkingDelta,
    ThinkingComplete,
    ResponseStarted,
    ResponseDelta,
    ResponseComplete,
    ToolCall,
    ToolResult,
    Complete,
    Results,
    Error,
}

impl Subevent {
    fn suffix(&self) -> &'static str {
        match self {
            Subevent::ThinkingStarted => "thinking_started",
            Subevent::ThinkingDelta => "thinking_delta",
            Subevent::ThinkingComplete => "thinking_complete",
            Subevent::ResponseStarted => "response_started",
            Subevent::ResponseDelta => "response_delta",
            Subevent::ResponseComplete => "response_complete",
            Subevent::ToolCall => "tool_call",
            Subevent::ToolResult => "tool_result",
            Subevent::Complete => "complete",
            Subevent::Results => "results",
            Subevent::Error => "error",
        }
    }
}

/// Total function from (kind, subevent) to the wire event name.
pub fn event_name(kind: WorkflowKind, sub: Subevent) -> String {
    format!("{}_{}", kind.namespace(), sub.suffix())
}

/// One frame on the push channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,
    pub payload: Value,
}

/// Central registry of connected clients.
pub struct EventBus {
    clients: Mutex<HashMap<String, mpsc::UnboundedSender<EventFrame>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Register a client and get the receiving end of its frame queue.
    pub fn register(&self, client_id: &str) -> mpsc::UnboundedReceiver<EventFrame> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.clients.lock().insert(client_id.to_string(), tx);
        tracing::debug!(client_id, "event bus client registered");
        rx
    }

    pub fn unregister(&self, client_id: &str) {
        self.clients.lock().remove(client_id);
        tracing::debug!(client_id, "event bus client unregistered");
    }

    pub fn is_connected(&self, client_id: &str) -> bool {
        self.clients.lock().contains_key(client_id)
    }

    /// Emit a namespaced workflow event. Returns `false` when the client is
    /// gone, which callers treat as a cancellation signal.
    pub fn emit(&self, client_id: &str, kind: WorkflowKind, sub: Subevent, payload: Value) -> bool {
        self.emit_named(client_id, &event_name(kind, sub), payload)
    }

    /// Emit a cross-cutting event (`status`, `token_update`, …).
    pub fn emit_named(&self, client_id: &str, event: &str, payload: Value) -> bool {
        let clients = self.clients.lock();
        match clients.get(client_id) {
            Some(tx) => tx
                .send(EventFrame {
                    event: event.to_string(),
                    payload,
                })
                .is_ok(),
            None => false,
        }
    }

    /// Broadcast an event to every connected client.
    pub fn broadcast(&self, event: &str, payload: Value) {
        let clients = self.clients.lock();
        for tx in clients.values() {
            let _ = tx.send(EventFrame {
                event: event.to_string(),
                payload: payload.clone(),
            });
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn namespace_is_total_over_kinds() {
        let kinds = [
            WorkflowKind::HealthCheck,
            WorkflowKind::DeepAnalysis,
            WorkflowKind::Prosecution,
            WorkflowKind::Defense,
            WorkflowKind::Judge,
            WorkflowKind::Motion,
            WorkflowKind::Evidence,
            WorkflowKind::Chat,
            WorkflowKind::Cascade,
            WorkflowKind::Widget,
            WorkflowKind::HearingPrep,
            WorkflowKind::ClientLetter,
        ];
        let namespaces: std::collections::HashSet<&str> =
            kinds.iter().map(|k| k.namespace()).collect();
        assert_eq!(namespaces.len(), kinds.len());
        assert_eq!(
            event_name(WorkflowKind::Cascade, Subevent::ToolCall),
            "cascade_tool_call"
        );
        assert_eq!(
            event_name(WorkflowKind::HealthCheck, Subevent::ResponseDelta),
            "health_check_response_delta"
        );
    }

    #[tokio::test]
    async fn frames_delivered_in_emission_order() {
        let bus = EventBus::new();
        let mut rx = bus.register("c1");
        for i in 0..10 {
            assert!(bus.emit(
                "c1",
                WorkflowKind::Chat,
                Subevent::ResponseDelta,
                json!({"text": i}),
            ));
        }
        for i in 0..10 {
            let frame = rx.recv().await.unwrap();
            assert_eq!(frame.event, "chat_response_delta");
            assert_eq!(frame.payload["text"], i);
        }
    }

    #[tokio::test]
    async fn emit_to_gone_client_reports_disconnect() {
        let bus = EventBus::new();
        let _rx = bus.register("c1");
        bus.unregister("c1");
        assert!(!bus.emit("c1", WorkflowKind::Chat, Subevent::Error, json!({})));
        assert!(!bus.is_connected("c1"));
    }

    #[tokio::test]
    async fn broadcast_reaches_all_clients() {
        let bus = EventBus::new();
        let mut rx1 = bus.register("c1");
        let mut rx2 = bus.register("c2");
        bus.broadcast("token_update", json!({"call_count": 1}));
        assert_eq!(rx1.recv().await.unwrap().event, "token_update");
        assert_eq!(rx2.recv().await.unwrap().event, "token_update");
    }
}
