//! End-to-end workflow scenarios against a scripted model.

mod common;

use common::*;
use case_nexus::store::insights::{InsightQuery, FULL_CASELOAD};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

const CLIENT: &str = "test-client";

/// S1 — health check happy path: shared-officer connection lands in the
/// results frame, the store, and exactly one insight.
#[tokio::test]
async fn health_check_happy_path() {
    let model_output = json!({
        "alerts": [
            {"case_number": "A1", "alert_type": "deadline", "severity": "critical",
             "title": "Speedy trial clock", "message": "Deadline approaching"}
        ],
        "connections": [
            {"case_numbers": ["A1", "A2"], "connection_type": "officer",
             "title": "Shared arresting officer",
             "description": "Officer Rodriguez arrested both defendants", "confidence": 0.9,
             "actionable": "Cross-reference officer testimony"}
        ],
        "priority_actions": [
            {"rank": 1, "case_number": "A1", "action": "File speedy trial demand",
             "urgency": "this_week", "reason": "Clock running"}
        ],
        "caseload_insights": {"summary": "ok", "risk_level": "elevated", "key_patterns": []}
    })
    .to_string();

    let (state, _provider) = harness(
        &[
            case("A1", "Rodriguez", &["DUI"]),
            case("A2", "Rodriguez", &["Theft by Taking"]),
            case("A3", "Freeman", &["Battery"]),
        ],
        vec![Script::Stream(text_turn("scanning the caseload", &model_output))],
    );

    let mut rx = state.bus.register(CLIENT);
    state.engine.run_health_check(CLIENT).await.unwrap();
    let frames = drain(&mut rx);

    let results = events_named(&frames, "health_check_results");
    assert_eq!(results.len(), 1);
    let connections = results[0].payload["connections"].as_array().unwrap();
    assert!(connections.iter().any(|c| {
        let nums: Vec<&str> = c["case_numbers"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(Value::as_str)
            .collect();
        nums == ["A1", "A2"] && c["connection_type"] == "officer"
    }));

    // Findings replaced in the store.
    let stored = state.store.connections().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].case_numbers, vec!["A1", "A2"]);

    // Exactly one insight of type health_check scoped to the full caseload.
    let insights = state
        .store
        .list_insights(&InsightQuery {
            analysis_type: Some("health_check".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].scope, FULL_CASELOAD);

    // Accumulator fidelity: concatenated response deltas equal the
    // completion frame's full text.
    let deltas: String = frames
        .iter()
        .filter(|f| f.event == "health_check_response_delta")
        .map(|f| f.payload["text"].as_str().unwrap())
        .collect();
    let complete = events_named(&frames, "health_check_response_complete");
    assert_eq!(deltas, complete[0].payload["full_text"].as_str().unwrap());

    // Token updates are monotone.
    let mut last = (0u64, 0u64, 0u64, 0u64);
    for frame in events_named(&frames, "token_update") {
        let next = (
            frame.payload["total_input"].as_u64().unwrap(),
            frame.payload["total_output"].as_u64().unwrap(),
            frame.payload["total_thinking"].as_u64().unwrap(),
            frame.payload["call_count"].as_u64().unwrap(),
        );
        assert!(next.0 >= last.0 && next.1 >= last.1 && next.2 >= last.2 && next.3 >= last.3);
        last = next;
    }
    assert!(last.3 >= 1);
}

/// S2 — gate collision: the second concurrent health check is rejected with
/// a busy error and writes no duplicate insight.
#[tokio::test]
async fn gate_collision_rejects_second_workflow() {
    let model_output = json!({"alerts": [], "connections": [], "priority_actions": [],
        "caseload_insights": {}})
    .to_string();

    let (state, _provider) = harness(
        &[case("A1", "Rodriguez", &["DUI"])],
        vec![Script::SlowStream(
            text_turn("slow scan", &model_output),
            Duration::from_millis(40),
        )],
    );

    let mut rx = state.bus.register(CLIENT);

    let engine = Arc::clone(&state.engine);
    let first = tokio::spawn(async move { engine.run_health_check(CLIENT).await });
    tokio::time::sleep(Duration::from_millis(20)).await;

    // Second invocation while the first still holds the gate.
    state.engine.run_health_check(CLIENT).await.unwrap();
    first.await.unwrap().unwrap();

    let frames = drain(&mut rx);
    let busy: Vec<_> = frames
        .iter()
        .filter(|f| f.event == "analysis_error" && f.payload["message"] == "busy")
        .collect();
    assert_eq!(busy.len(), 1);

    let insights = state
        .store
        .list_insights(&InsightQuery {
            analysis_type: Some("health_check".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(insights.len(), 1);

    // Gate released after completion: a fresh acquire succeeds.
    assert!(!state.gate.is_active(CLIENT));
}

/// S3 — cascade tool loop: two tool rounds then a final answer, with the
/// full event lifecycle in order.
#[tokio::test]
async fn cascade_tool_loop_event_order() {
    let brief = "## Executive Strategic Summary\nAll quiet.\n```json\n[{\"label\": \"Review CR-12\", \"action_type\": \"deep_analysis\", \"case_number\": \"CR-12\", \"reason\": \"DUI stop is contestable\", \"urgency\": \"high\"}]\n```";

    let (state, _provider) = harness(
        &[case("CR-12", "Shaw", &["DUI"])],
        vec![
            Script::Stream(tool_turn(
                "need the case record",
                "tu_1",
                "get_case",
                json!({"case_number": "CR-12"}),
            )),
            Script::Stream(tool_turn(
                "need the law",
                "tu_2",
                "get_legal_context",
                json!({"topics": ["DUI"]}),
            )),
            Script::Stream(text_turn("synthesizing", brief)),
        ],
    );

    let mut rx = state.bus.register(CLIENT);
    state.engine.run_cascade(CLIENT).await.unwrap();
    let frames = drain(&mut rx);

    // Total tool_call frames with status "calling" is exactly 2, within the
    // round bound.
    let calling: Vec<_> = frames
        .iter()
        .filter(|f| f.event == "cascade_tool_call" && f.payload["status"] == "calling")
        .collect();
    assert_eq!(calling.len(), 2);
    assert!(calling.len() <= case_nexus::agent::MAX_ROUNDS);
    assert_eq!(calling[0].payload["tool_name"], "get_case");
    assert_eq!(calling[1].payload["tool_name"], "get_legal_context");

    // Lifecycle ordering: thinking → call → result per tool, then the final
    // response and completion.
    let order = [
        position(&frames, "cascade_thinking_started").unwrap(),
        frames
            .iter()
            .position(|f| f.event == "cascade_tool_call" && f.payload["tool_name"] == "get_case")
            .unwrap(),
        frames
            .iter()
            .position(|f| f.event == "cascade_tool_result" && f.payload["tool_name"] == "get_case")
            .unwrap(),
        frames
            .iter()
            .position(|f| {
                f.event == "cascade_tool_call" && f.payload["tool_name"] == "get_legal_context"
            })
            .unwrap(),
        frames
            .iter()
            .position(|f| {
                f.event == "cascade_tool_result" && f.payload["tool_name"] == "get_legal_context"
            })
            .unwrap(),
        position(&frames, "cascade_response_started").unwrap(),
        position(&frames, "cascade_complete").unwrap(),
    ];
    assert!(order.windows(2).all(|w| w[0] < w[1]), "events out of order: {order:?}");

    // Tool results carry bounded previews.
    for frame in frames.iter().filter(|f| f.event == "cascade_tool_result") {
        let preview = frame.payload["result_preview"].as_str().unwrap();
        assert!(preview.chars().count() <= 256);
        assert!(frame.payload["result_length"].as_u64().unwrap() > 0);
    }

    // The parsed actions list is persisted with the brief.
    let results = events_named(&frames, "cascade_results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].payload["actions"][0]["action_type"], "deep_analysis");
    let insights = state
        .store
        .list_insights(&InsightQuery {
            analysis_type: Some("cascade".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].result["actions"][0]["case_number"], "CR-12");
}

/// S4 — adversarial chain: three phases in order, each later phase consuming
/// the earlier phases' full text.
#[tokio::test]
async fn adversarial_chain_threads_phases() {
    let (state, provider) = harness(
        &[case("C", "Boone", &["Aggravated Assault"])],
        vec![
            Script::Stream(text_turn("building the case", "P1BRIEF: the state's theory")),
            Script::Stream(text_turn("dismantling", "P2BRIEF: the defense answer")),
            Script::Stream(text_turn("weighing", "P3BRIEF: the synthesis")),
        ],
    );

    let mut rx = state.bus.register(CLIENT);
    state.engine.run_adversarial(CLIENT, "C").await.unwrap();
    let frames = drain(&mut rx);

    let phases: Vec<_> = frames
        .iter()
        .filter(|f| f.event == "adversarial_phase")
        .collect();
    assert_eq!(phases.len(), 3);
    for (i, frame) in phases.iter().enumerate() {
        assert_eq!(frame.payload["phase_number"], (i + 1) as u64);
    }

    // Phase 2's prompt carries phase 1's full response; phase 3 carries both.
    let requests = provider.requests.lock();
    assert_eq!(requests.len(), 3);
    let phase2_text = requests[1]
        .messages
        .iter()
        .map(|m| m.text())
        .collect::<String>();
    assert!(phase2_text.contains("P1BRIEF: the state's theory"));
    let phase3_text = requests[2]
        .messages
        .iter()
        .map(|m| m.text())
        .collect::<String>();
    assert!(phase3_text.contains("P1BRIEF: the state's theory"));
    assert!(phase3_text.contains("P2BRIEF: the defense answer"));

    let results = events_named(&frames, "adversarial_results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].payload["judge"], "P3BRIEF: the synthesis");
}

/// Adversarial partial failure: a dead phase 2 aborts phase 3.
#[tokio::test]
async fn adversarial_phase_failure_skips_rest() {
    let (state, provider) = harness(
        &[case("C", "Boone", &["Battery"])],
        vec![
            Script::Stream(text_turn("building", "P1BRIEF")),
            Script::Fail("model unreachable".to_string()),
        ],
    );

    let mut rx = state.bus.register(CLIENT);
    assert!(state.engine.run_adversarial(CLIENT, "C").await.is_err());
    let frames = drain(&mut rx);

    assert!(position(&frames, "defense_error").is_some());
    assert!(events_named(&frames, "adversarial_results").is_empty());
    // Only two calls went out; the judge phase never ran.
    assert_eq!(provider.requests.lock().len(), 2);
    // No insight for a failed chain, and the gate is free again.
    assert!(state
        .store
        .list_insights(&InsightQuery {
            analysis_type: Some("adversarial".to_string()),
            ..Default::default()
        })
        .unwrap()
        .is_empty());
    assert!(!state.gate.is_active(CLIENT));
}

/// S5 — citation verification degrade: grounded search fails, the locally
/// extracted set still reaches the client.
#[tokio::test]
async fn citation_verification_degrades_gracefully() {
    let motion_text = "COMES NOW the defendant. Under O.C.G.A. § 16-5-21 and \
                       Mapp v. Ohio, 367 U.S. 643 (1961), suppression follows. \
                       See also 999 F.2d 1234.";

    let (state, _provider) = harness(
        &[case("CR-7", "Ayers", &["Aggravated Assault"])],
        vec![
            Script::Stream(text_turn("drafting", motion_text)),
            // The grounded verification call for the unknown reporter fails.
            Script::Fail("search provider down".to_string()),
        ],
    );

    let mut rx = state.bus.register(CLIENT);
    state
        .engine
        .generate_motion(CLIENT, "CR-7", "Motion to Suppress Evidence")
        .await
        .unwrap();
    let frames = drain(&mut rx);

    assert!(position(&frames, "motion_results").unwrap() < position(&frames, "citation_verification_started").unwrap());

    let results = events_named(&frames, "citation_verification_results");
    assert_eq!(results.len(), 1);
    let payload = &results[0].payload;
    assert!(payload["error"].as_str().is_some());

    let local: Vec<&str> = payload["local_citations"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert_eq!(
        local,
        vec!["O.C.G.A. § 16-5-21", "367 U.S. 643 (1961)", "999 F.2d 1234"]
    );

    // Corpus-backed citations verified locally despite the outage.
    assert!(payload["verified"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v["citation"] == "O.C.G.A. § 16-5-21"));
}

/// Grounded verification success: unknown citations resolve through the
/// web-search call and merge with the local matches.
#[tokio::test]
async fn citation_verification_grounded_success() {
    let motion_text = "Relief follows from O.C.G.A. § 16-8-2 and State v. Nobody, 999 F.2d 1234.";
    let verdicts = json!({
        "verified": [
            {"citation": "999 F.2d 1234", "normalized": "999 F.2d 1234",
             "case_name": "State v. Nobody", "url": "https://example.test/opinion",
             "status": "verified"}
        ],
        "not_found": [],
        "ambiguous": []
    })
    .to_string();

    let (state, provider) = harness(
        &[case("CR-8", "Ayers", &["Theft by Taking"])],
        vec![
            Script::Stream(text_turn("drafting", motion_text)),
            Script::Complete(completion(&verdicts)),
        ],
    );

    let mut rx = state.bus.register(CLIENT);
    state
        .engine
        .generate_motion(CLIENT, "CR-8", "Motion to Dismiss")
        .await
        .unwrap();
    let frames = drain(&mut rx);

    // The grounded call went out with web search enabled.
    assert!(provider.requests.lock().last().unwrap().web_search);

    let results = events_named(&frames, "citation_verification_results");
    assert_eq!(results.len(), 1);
    let payload = &results[0].payload;
    assert!(payload["error"].is_null());
    assert_eq!(payload["verified_count"], 2);
    assert!(payload["verified"]
        .as_array()
        .unwrap()
        .iter()
        .any(|v| v["url"] == "https://example.test/opinion"));
}

/// S6 — parse degradation: a non-JSON deep analysis still delivers raw text
/// and writes exactly one insight carrying it.
#[tokio::test]
async fn deep_analysis_parse_degradation() {
    let (state, _provider) = harness(
        &[case("CR-9", "Freeman", &["Theft by Taking"])],
        vec![Script::Stream(text_turn("thinking hard", "hello"))],
    );

    let mut rx = state.bus.register(CLIENT);
    state.engine.run_deep_analysis(CLIENT, "CR-9").await.unwrap();
    let frames = drain(&mut rx);

    let results = events_named(&frames, "deep_analysis_results");
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].payload["analysis"], "hello");
    assert_eq!(results[0].payload["case_number"], "CR-9");

    let insights = state
        .store
        .list_insights(&InsightQuery {
            analysis_type: Some("deep_analysis".to_string()),
            ..Default::default()
        })
        .unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0].result["response_text"], "hello");
    assert_eq!(insights[0].scope, "CR-9");
}

/// Unknown case numbers never reach the model.
#[tokio::test]
async fn missing_case_rejected_before_model_call() {
    let (state, provider) = harness(&[], vec![]);
    let mut rx = state.bus.register(CLIENT);

    state.engine.run_deep_analysis(CLIENT, "CR-404").await.unwrap();
    let frames = drain(&mut rx);

    let errors = events_named(&frames, "analysis_error");
    assert_eq!(errors.len(), 1);
    assert!(errors[0].payload["message"]
        .as_str()
        .unwrap()
        .contains("CR-404"));
    assert!(provider.requests.lock().is_empty());
    assert!(!state.gate.is_active(CLIENT));
}

/// Round bound: a model that never stops asking for tools is forced into a
/// terminal summarization turn at the limit.
#[tokio::test]
async fn tool_loop_round_bound_forces_terminal_turn() {
    let mut scripts: Vec<Script> = (0..7)
        .map(|i| {
            Script::Stream(tool_turn(
                "digging",
                &format!("tu_{i}"),
                "get_alerts",
                json!({}),
            ))
        })
        .collect();
    scripts.push(Script::Stream(text_turn("wrapping up", "final summary")));

    let (state, provider) = harness(&[case("CR-1", "Shaw", &["DUI"])], scripts);
    let mut rx = state.bus.register(CLIENT);
    state.engine.run_cascade(CLIENT).await.unwrap();
    let frames = drain(&mut rx);

    let calling = frames
        .iter()
        .filter(|f| f.event == "cascade_tool_call" && f.payload["status"] == "calling")
        .count();
    assert!(calling <= case_nexus::agent::MAX_ROUNDS);
    assert_eq!(calling, 7);

    let requests = provider.requests.lock();
    assert_eq!(requests.len(), 8);
    // The terminal round advertises no tools and carries the summarize nudge.
    assert!(requests[7].tools.is_empty());
    let last_text = requests[7]
        .messages
        .iter()
        .map(|m| m.text())
        .collect::<String>();
    assert!(last_text.contains("Summarize your findings"));

    let results = events_named(&frames, "cascade_results");
    assert_eq!(results[0].payload["summary"], "final summary");
    assert_eq!(results[0].payload["rounds"], 8);
}

/// Disconnected clients abort in-flight workflows without writing insights.
#[tokio::test]
async fn disconnect_cancels_workflow() {
    let model_output = json!({"alerts": [], "connections": [], "priority_actions": [],
        "caseload_insights": {}})
    .to_string();
    let (state, _provider) = harness(
        &[case("A1", "Rodriguez", &["DUI"])],
        vec![Script::Stream(text_turn("scan", &model_output))],
    );

    // Client vanishes before the first frame can be delivered.
    let rx = state.bus.register(CLIENT);
    drop(rx);
    state.bus.unregister(CLIENT);

    assert!(state.engine.run_health_check(CLIENT).await.is_err());
    assert!(state
        .store
        .list_insights(&InsightQuery::default())
        .unwrap()
        .is_empty());
    assert!(!state.gate.is_active(CLIENT));
}

/// Chat keeps per-client history: the second turn replays the first
/// exchange, and clear_chat resets it.
#[tokio::test]
async fn chat_history_threads_turns() {
    let (state, provider) = harness(
        &[case("CR-3", "Ayers", &["Burglary"])],
        vec![
            Script::Stream(text_turn("looking", "Kowalski's plea hearing is Aug 5.")),
            Script::Stream(text_turn("checking", "Yes, a speedy trial demand is on file.")),
        ],
    );

    let mut rx = state.bus.register(CLIENT);
    state.engine.chat_message(CLIENT, "When is the plea hearing?").await.unwrap();
    state.engine.chat_message(CLIENT, "Any speedy trial demand?").await.unwrap();
    let frames = drain(&mut rx);

    assert_eq!(events_named(&frames, "chat_results").len(), 2);

    let requests = provider.requests.lock();
    // Second call sees the whole prior exchange plus the new question.
    assert_eq!(requests[1].messages.len(), 3);
    let replayed: String = requests[1].messages.iter().map(|m| m.text()).collect();
    assert!(replayed.contains("Kowalski's plea hearing is Aug 5."));
    // The caseload context rides only in the first turn.
    assert!(requests[1].messages[2].text() == "Any speedy trial demand?");
    drop(requests);

    state.engine.clear_chat(CLIENT).unwrap();
    let frames = drain(&mut rx);
    assert_eq!(events_named(&frames, "chat_cleared").len(), 1);
}
