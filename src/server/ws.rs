//! WebSocket control channel — one connection per client.
//!
//! Inbound text frames are `{"type": <command>, ...payload}` workflow
//! triggers; outbound frames are the namespaced streaming events queued on
//! the client's event-bus channel. The writer drains the queue in emission
//! order, so clients observe events exactly as the engine produced them.

use super::AppState;
use crate::demo;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use uuid::Uuid;

pub async fn handle_connection(socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4().to_string();
    tracing::info!(client_id, "client connected");

    let mut rx = state.bus.register(&client_id);
    let (mut writer, mut reader) = socket.split();

    // Writer task: drain the client's frame queue onto the socket.
    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let text = match serde_json::to_string(&frame) {
                Ok(t) => t,
                Err(_) => continue,
            };
            if writer.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader loop: dispatch inbound commands. Each workflow runs on its own
    // task so a long analysis never blocks further reads (the request gate
    // rejects overlap per client).
    while let Some(Ok(message)) = reader.next().await {
        let WsMessage::Text(text) = message else {
            continue;
        };
        let Ok(frame) = serde_json::from_str::<Value>(&text) else {
            state.bus.emit_named(
                &client_id,
                "analysis_error",
                json!({"message": "malformed frame"}),
            );
            continue;
        };
        let command = frame.get("type").and_then(Value::as_str).unwrap_or("");
        dispatch(&state, &client_id, command, &frame);
    }

    // Disconnect: tear down per-client state and abort in-flight streams
    // (their next emit fails once the channel is gone).
    state.bus.unregister(&client_id);
    state.engine.client_gone(&client_id);
    writer_task.abort();
    tracing::info!(client_id, "client disconnected");
}

fn dispatch(state: &AppState, client_id: &str, command: &str, frame: &Value) {
    let state = state.clone();
    let client_id = client_id.to_string();
    let frame = frame.clone();
    let command = command.to_string();

    tokio::spawn(async move {
        let engine = &state.engine;
        let case_number = frame.get("case_number").and_then(Value::as_str).unwrap_or("");

        let result = match command.as_str() {
            "load_demo_caseload" => {
                state.bus.emit_named(
                    &client_id,
                    "status",
                    json!({"message": "Generating caseload...", "phase": "loading"}),
                );
                match demo::seed_demo_caseload(&state.store) {
                    Ok(counts) => {
                        state.bus.emit_named(
                            &client_id,
                            "caseload_loaded",
                            json!({
                                "total": counts.total,
                                "felonies": counts.felonies,
                                "misdemeanors": counts.misdemeanors,
                                "active": counts.active,
                                "message": format!(
                                    "Loaded {} cases ({} felonies, {} misdemeanors)",
                                    counts.total, counts.felonies, counts.misdemeanors
                                ),
                            }),
                        );
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }
            "run_health_check" => engine.run_health_check(&client_id).await,
            "run_deep_analysis" => engine.run_deep_analysis(&client_id, case_number).await,
            "run_adversarial" => engine.run_adversarial(&client_id, case_number).await,
            "generate_motion" => {
                let motion_type = frame
                    .get("motion_type")
                    .and_then(Value::as_str)
                    .unwrap_or("Motion to Suppress Evidence");
                engine.generate_motion(&client_id, case_number, motion_type).await
            }
            "analyze_evidence" => {
                let evidence_id = frame.get("evidence_id").and_then(Value::as_i64).unwrap_or(0);
                engine.analyze_evidence(&client_id, case_number, evidence_id).await
            }
            "chat_message" => {
                let message = frame.get("message").and_then(Value::as_str).unwrap_or("");
                engine.chat_message(&client_id, message).await
            }
            "clear_chat" => engine.clear_chat(&client_id),
            "run_hearing_prep" => engine.run_hearing_prep(&client_id, case_number).await,
            "run_client_letter" => engine.run_client_letter(&client_id, case_number).await,
            "run_cascade" => engine.run_cascade(&client_id).await,
            "search_case_law" => {
                let query = frame.get("query").and_then(Value::as_str).unwrap_or("");
                let court = frame.get("court").and_then(Value::as_str);
                engine.search_case_law(&client_id, query, court).await;
                Ok(())
            }
            "verify_citations" => {
                let text = frame.get("text").and_then(Value::as_str).unwrap_or("");
                engine
                    .verify_document_citations(&client_id, case_number, text)
                    .await;
                Ok(())
            }
            "create_widget" => {
                let request = frame.get("request").and_then(Value::as_str).unwrap_or("");
                engine.create_widget(&client_id, request).await
            }
            other => {
                state.bus.emit_named(
                    &client_id,
                    "analysis_error",
                    json!({"message": format!("unknown command: {other}")}),
                );
                Ok(())
            }
        };

        if let Err(e) = result {
            // Stream-level errors were already surfaced as namespaced error
            // frames; this catches everything else (store failures, etc.).
            tracing::warn!(command = %command, error = %e, "workflow ended with error");
        }
    });
}
