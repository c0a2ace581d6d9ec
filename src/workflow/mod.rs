//! Workflow engine — composes context, streaming calls, and the tool loop
//! into the nine analysis workflows.
//!
//! Each workflow: claims the client's gate slot, assembles context, drives
//! one or more model calls, persists exactly one insight on success, and
//! emits an authoritative `<workflow>_results` frame at termination. Errors
//! in one workflow never poison global state — the accountant and the
//! insight log are only touched on call completion and workflow success.

pub mod prompts;

use crate::agent::{LoopSpec, ToolLoop, MAX_ROUNDS};
use crate::bus::{EventBus, Subevent, WorkflowKind};
use crate::citations::{extract_json, CitationVerifier};
use crate::context::ContextBuilder;
use crate::gate::{GateGuard, RequestGate};
use crate::legal::LegalCorpus;
use crate::provider::{ContentPart, Message, Role};
use crate::runner::{CallSpec, StreamingRunner};
use crate::store::insights::FULL_CASELOAD;
use crate::store::{Alert, AlertSeverity, CaseConnection, PriorityAction, Store};
use crate::telemetry::TokenAccountant;
use crate::tool::ToolRegistry;
use anyhow::Result;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;

// Token budgets per workflow. max output = thinking budget + response room.
const HEALTH_CHECK_THINKING: u32 = 60_000;
const HEALTH_CHECK_RESPONSE: u32 = 16_384;
const DEEP_ANALYSIS_THINKING: u32 = 40_000;
const DEEP_ANALYSIS_RESPONSE: u32 = 16_384;
const ADVERSARIAL_THINKING: u32 = 30_000;
const ADVERSARIAL_RESPONSE: u32 = 16_384;
const JUDGE_THINKING: u32 = 20_000;
const JUDGE_RESPONSE: u32 = 8_192;
const MOTION_THINKING: u32 = 20_000;
const MOTION_RESPONSE: u32 = 64_000;
const EVIDENCE_THINKING: u32 = 20_000;
const EVIDENCE_RESPONSE: u32 = 8_192;
const CHAT_THINKING: u32 = 30_000;
const CHAT_RESPONSE: u32 = 8_192;
const HEARING_PREP_THINKING: u32 = 10_000;
const HEARING_PREP_RESPONSE: u32 = 4_096;
const CLIENT_LETTER_THINKING: u32 = 10_000;
const CLIENT_LETTER_RESPONSE: u32 = 8_192;
const CASCADE_THINKING: u32 = 30_000;
const CASCADE_RESPONSE: u32 = 16_384;
const WIDGET_THINKING: u32 = 20_000;
const WIDGET_RESPONSE: u32 = 8_192;

/// Chat history cap per client (10 exchanges).
const CHAT_HISTORY_LIMIT: usize = 20;

/// Judge-tendency context cap for hearing prep.
const JUDGE_CASES_LIMIT: usize = 10;

pub struct WorkflowEngine {
    store: Arc<Store>,
    legal: Arc<LegalCorpus>,
    context: Arc<ContextBuilder>,
    registry: Arc<ToolRegistry>,
    runner: Arc<StreamingRunner>,
    tool_loop: ToolLoop,
    verifier: Arc<CitationVerifier>,
    bus: Arc<EventBus>,
    gate: Arc<RequestGate>,
    accountant: Arc<TokenAccountant>,
    chat_histories: Mutex<HashMap<String, Vec<Message>>>,
}

impl WorkflowEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<Store>,
        legal: Arc<LegalCorpus>,
        context: Arc<ContextBuilder>,
        registry: Arc<ToolRegistry>,
        runner: Arc<StreamingRunner>,
        verifier: Arc<CitationVerifier>,
        bus: Arc<EventBus>,
        gate: Arc<RequestGate>,
        accountant: Arc<TokenAccountant>,
    ) -> Self {
        let tool_loop = ToolLoop::new(Arc::clone(&runner), Arc::clone(&registry));
        Self {
            store,
            legal,
            context,
            registry,
            runner,
            tool_loop,
            verifier,
            bus,
            gate,
            accountant,
            chat_histories: Mutex::new(HashMap::new()),
        }
    }

    // ── Workflow 1: caseload health check ─────────────────────────────────

    pub async fn run_health_check(&self, client_id: &str) -> Result<()> {
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        self.status(client_id, "health_check", "Preparing caseload for analysis...");

        let caseload = self.context.build_full_caseload_context()?;
        let legal = self.context.build_legal_context(&self.caseload_topics()?);
        let full_context = format!("{caseload}\n\n{legal}");
        let context_tokens = (full_context.len() / 4) as u64;

        self.emit_corpus_stats(client_id);
        self.estimate_input(client_id, full_context.len());
        self.bus.emit_named(
            client_id,
            "status",
            json!({
                "message": format!("Loading {context_tokens} tokens into the context window..."),
                "phase": "health_check",
                "context_tokens": context_tokens,
            }),
        );

        let system = prompts::with_today(prompts::HEALTH_CHECK);
        let user = format!(
            "{full_context}\n\nPerform a complete caseload health check. Scan EVERY case."
        );
        let mut spec = CallSpec::new(WorkflowKind::HealthCheck, system, user)
            .with_budgets(HEALTH_CHECK_THINKING, HEALTH_CHECK_RESPONSE);
        spec.milestones = vec![
            (1, "Scanning deadlines and speedy-trial exposure...".to_string()),
            (150, "Mapping cross-case connections...".to_string()),
            (350, "Comparing plea offers...".to_string()),
            (600, "Checking constitutional issues...".to_string()),
            (900, "Ranking priority actions...".to_string()),
        ];

        let outcome = self.runner.run(client_id, spec).await?;
        let parsed = extract_json(&outcome.response).filter(Value::is_object);

        match parsed {
            Some(parsed) => {
                let alerts = parse_alerts(&parsed);
                let connections = parse_connections(&parsed);
                let actions = parse_priority_actions(&parsed);
                self.store.replace_findings(&alerts, &connections, &actions)?;
                self.store.log_insight(
                    WorkflowKind::HealthCheck.analysis_type(),
                    FULL_CASELOAD,
                    &outcome.thinking,
                    &parsed,
                    context_tokens as i64,
                )?;
                self.bus.emit(
                    client_id,
                    WorkflowKind::HealthCheck,
                    Subevent::Results,
                    json!({
                        "alerts": parsed.get("alerts").cloned().unwrap_or_else(|| json!([])),
                        "connections": parsed.get("connections").cloned().unwrap_or_else(|| json!([])),
                        "priority_actions": parsed.get("priority_actions").cloned().unwrap_or_else(|| json!([])),
                        "caseload_insights": parsed.get("caseload_insights").cloned().unwrap_or_else(|| json!({})),
                        "thinking_length": outcome.thinking.len(),
                        "context_tokens": context_tokens,
                    }),
                );
            }
            None => {
                // Parse degradation: raw text still reaches the client and
                // the insight log.
                let payload = json!({"response_text": outcome.response});
                self.store.log_insight(
                    WorkflowKind::HealthCheck.analysis_type(),
                    FULL_CASELOAD,
                    &outcome.thinking,
                    &payload,
                    context_tokens as i64,
                )?;
                self.bus.emit(
                    client_id,
                    WorkflowKind::HealthCheck,
                    Subevent::Results,
                    json!({
                        "alerts": [],
                        "connections": [],
                        "priority_actions": [],
                        "caseload_insights": {},
                        "response_text": outcome.response,
                        "thinking_length": outcome.thinking.len(),
                    }),
                );
            }
        }
        Ok(())
    }

    // ── Workflow 2: deep case analysis ────────────────────────────────────

    pub async fn run_deep_analysis(&self, client_id: &str, case_number: &str) -> Result<()> {
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        let Some(case) = self.require_case(client_id, "deep_analysis", case_number)? else {
            return Ok(());
        };
        self.status(
            client_id,
            "deep_analysis",
            &format!("Analyzing {case_number} in depth..."),
        );

        let case_context = self
            .context
            .build_case_context(case_number)?
            .unwrap_or_default();
        let caseload = self.context.build_full_caseload_context()?;
        let legal = self.context.build_legal_context(&case.charges);
        let memory = self.context.build_memory_context(Some(case_number))?;

        self.emit_corpus_stats(client_id);
        self.estimate_input(client_id, case_context.len() + caseload.len() + legal.len());
        if !memory.is_empty() {
            self.bus.emit_named(
                client_id,
                "memory_loaded",
                json!({
                    "case_number": case_number,
                    "insight_count": memory.matches("Prior Analysis #").count(),
                }),
            );
        }

        let user = format!(
            "{case_context}\n\n---\n\n# RELATED CASELOAD CONTEXT\n{caseload}\n\n{legal}\n\n{memory}\n\nProvide a comprehensive defense strategy analysis."
        );
        let spec = CallSpec::new(
            WorkflowKind::DeepAnalysis,
            prompts::with_today(prompts::DEEP_ANALYSIS),
            user,
        )
        .with_budgets(DEEP_ANALYSIS_THINKING, DEEP_ANALYSIS_RESPONSE)
        .with_tag(json!({"case_number": case_number}));

        let outcome = self.runner.run(client_id, spec).await?;
        let parsed = extract_json(&outcome.response).filter(Value::is_object);
        let (analysis, insight_payload) = match parsed {
            Some(p) => (p.clone(), p),
            None => (
                Value::String(outcome.response.clone()),
                json!({"response_text": outcome.response}),
            ),
        };

        self.store.log_insight(
            WorkflowKind::DeepAnalysis.analysis_type(),
            case_number,
            &outcome.thinking,
            &insight_payload,
            outcome.usage.input_tokens as i64,
        )?;
        self.bus.emit(
            client_id,
            WorkflowKind::DeepAnalysis,
            Subevent::Results,
            json!({
                "case_number": case_number,
                "analysis": analysis,
                "thinking_length": outcome.thinking.len(),
            }),
        );
        Ok(())
    }

    // ── Workflow 3: adversarial simulation ────────────────────────────────

    pub async fn run_adversarial(&self, client_id: &str, case_number: &str) -> Result<()> {
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        let Some(case) = self.require_case(client_id, "adversarial", case_number)? else {
            return Ok(());
        };
        self.status(
            client_id,
            "adversarial",
            &format!("Starting adversarial simulation for {case_number}..."),
        );

        let case_context = self
            .context
            .build_case_context(case_number)?
            .unwrap_or_default();
        let legal = self.context.build_legal_context(&case.charges);
        let full_context = format!("{case_context}\n\n{legal}");
        self.emit_corpus_stats(client_id);
        let tag = json!({"case_number": case_number});

        // Phase 1: the state's strongest argument.
        self.emit_phase(client_id, "prosecution", 1, "Prosecution building their case...");
        let prosecution = self
            .runner
            .run(
                client_id,
                CallSpec::new(
                    WorkflowKind::Prosecution,
                    prompts::with_today(prompts::PROSECUTION),
                    format!(
                        "{full_context}\n\nBuild the strongest prosecution case. Write a comprehensive, court-ready prosecution brief."
                    ),
                )
                .with_budgets(ADVERSARIAL_THINKING, ADVERSARIAL_RESPONSE)
                .with_tag(tag.clone()),
            )
            .await?;

        // Phase 2 consumes phase 1's full text verbatim.
        self.emit_phase(client_id, "defense", 2, "Defense dismantling prosecution arguments...");
        let defense = self
            .runner
            .run(
                client_id,
                CallSpec::new(
                    WorkflowKind::Defense,
                    prompts::with_today(prompts::DEFENSE),
                    format!(
                        "{full_context}\n\n---\n\n# PROSECUTION'S FULL BRIEF (your opponent's complete strategy)\n\n{}\n\n---\n\nSystematically dismantle every prosecution argument. You have their entire playbook.",
                        prosecution.response
                    ),
                )
                .with_budgets(ADVERSARIAL_THINKING, ADVERSARIAL_RESPONSE)
                .with_tag(tag.clone()),
            )
            .await?;

        // Phase 3 synthesizes both briefs.
        self.emit_phase(client_id, "judge", 3, "Judicial analysis synthesizing both arguments...");
        let judge = self
            .runner
            .run(
                client_id,
                CallSpec::new(
                    WorkflowKind::Judge,
                    prompts::with_today(prompts::JUDGE),
                    format!(
                        "{full_context}\n\n---\n\n# PROSECUTION'S BRIEF\n\n{}\n\n---\n\n# DEFENSE'S BRIEF\n\n{}\n\n---\n\nProvide your objective judicial analysis: score the arguments, predict the outcome, and give strategic recommendations for the defense.",
                        prosecution.response, defense.response
                    ),
                )
                .with_budgets(JUDGE_THINKING, JUDGE_RESPONSE)
                .with_tag(tag.clone()),
            )
            .await?;

        let payload = json!({
            "prosecution": prosecution.response,
            "defense": defense.response,
            "judge": judge.response,
        });
        self.store.log_insight(
            WorkflowKind::Judge.analysis_type(),
            case_number,
            "",
            &payload,
            0,
        )?;
        self.bus.emit_named(
            client_id,
            "adversarial_results",
            json!({
                "case_number": case_number,
                "prosecution": prosecution.response,
                "defense": defense.response,
                "judge": judge.response,
                "prosecution_thinking": prosecution.thinking.len(),
                "defense_thinking": defense.thinking.len(),
                "judge_thinking": judge.thinking.len(),
            }),
        );
        Ok(())
    }

    // ── Workflow 4: motion generation ─────────────────────────────────────

    pub async fn generate_motion(
        &self,
        client_id: &str,
        case_number: &str,
        motion_type: &str,
    ) -> Result<()> {
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        let Some(case) = self.require_case(client_id, "motion", case_number)? else {
            return Ok(());
        };
        self.status(
            client_id,
            "motion",
            &format!("Drafting {motion_type} for {case_number}..."),
        );

        let case_context = self
            .context
            .build_case_context(case_number)?
            .unwrap_or_default();
        let mut topics = case.charges.clone();
        topics.push(motion_type.to_string());
        let legal = self.context.build_legal_context(&topics);
        self.emit_corpus_stats(client_id);

        let user = format!(
            "{case_context}\n\n{legal}\n\nDraft a {motion_type} for this case. Make it comprehensive, well-cited, and ready for attorney review. Use standard Georgia criminal procedure format."
        );
        let spec = CallSpec::new(
            WorkflowKind::Motion,
            prompts::with_today(prompts::MOTION),
            user,
        )
        .with_budgets(MOTION_THINKING, MOTION_RESPONSE)
        .with_tag(json!({"case_number": case_number, "motion_type": motion_type}));

        let outcome = self.runner.run(client_id, spec).await?;
        let motion_text = outcome.response;

        self.store.log_insight(
            WorkflowKind::Motion.analysis_type(),
            case_number,
            &outcome.thinking,
            &json!({"motion_type": motion_type, "motion_text": motion_text}),
            outcome.usage.input_tokens as i64,
        )?;
        self.bus.emit(
            client_id,
            WorkflowKind::Motion,
            Subevent::Results,
            json!({
                "case_number": case_number,
                "motion_type": motion_type,
                "motion_text": motion_text,
                "motion_length": motion_text.len(),
                "thinking_length": outcome.thinking.len(),
                "truncated": outcome.truncated,
            }),
        );

        // Every generated motion gets an automatic citation pass.
        self.verify_document_citations(client_id, case_number, &motion_text)
            .await;
        Ok(())
    }

    /// Citation verification with graceful degradation: a dead search
    /// provider still yields the locally-extracted set, flagged unverified.
    pub async fn verify_document_citations(&self, client_id: &str, case_number: &str, text: &str) {
        self.bus.emit_named(
            client_id,
            "citation_verification_started",
            json!({
                "case_number": case_number,
                "status": "Verifying citations...",
            }),
        );
        let (local_citations, report) = self.verifier.verify_text(text).await;
        self.bus.emit_named(
            client_id,
            "citation_verification_results",
            json!({
                "case_number": case_number,
                "verified": report.verified,
                "not_found": report.not_found,
                "ambiguous": report.ambiguous,
                "total_found": report.total_found,
                "verified_count": report.verified_count,
                "local_citations": local_citations,
                "error": report.error,
            }),
        );
    }

    // ── Workflow 5: evidence analysis ─────────────────────────────────────

    pub async fn analyze_evidence(
        &self,
        client_id: &str,
        case_number: &str,
        evidence_id: i64,
    ) -> Result<()> {
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        if self.require_case(client_id, "evidence", case_number)?.is_none() {
            return Ok(());
        }
        let Some(item) = self.store.get_evidence_item(case_number, evidence_id)? else {
            self.analysis_error(
                client_id,
                "evidence",
                format!("Evidence item {evidence_id} not found for {case_number}"),
            );
            return Ok(());
        };
        self.status(
            client_id,
            "evidence",
            &format!("Analyzing {} for {case_number}...", item.title),
        );

        let case_context = self
            .context
            .build_case_context(case_number)?
            .unwrap_or_default();
        let record = format!(
            "# EVIDENCE ITEM\n- Type: {}\n- Title: {}\n- Description: {}\n- Source: {}\n- Date Collected: {}\n",
            item.evidence_type, item.title, item.description, item.source, item.date_collected
        );

        // Attach the image (or the video's poster frame); fall back to a
        // text-only call when no readable media exists.
        let media_path = if item.poster_path.is_empty() {
            item.file_path.clone()
        } else {
            item.poster_path.clone()
        };
        let image_part = load_image_part(&media_path).await;

        let text = format!(
            "{case_context}\n\n---\n\n{record}\n\n{}",
            if image_part.is_some() {
                "Analyze the attached evidence image in the context of this case. Provide a thorough defense-oriented forensic analysis."
            } else {
                "No media file is available for this item; analyze the evidence record itself in the context of this case."
            }
        );
        let mut content = vec![ContentPart::Text { text }];
        if let Some(image) = image_part {
            content.push(image);
        }

        let mut spec = CallSpec::new(
            WorkflowKind::Evidence,
            prompts::with_today(prompts::EVIDENCE_ANALYSIS),
            "",
        )
        .with_budgets(EVIDENCE_THINKING, EVIDENCE_RESPONSE)
        .with_tag(json!({"case_number": case_number, "evidence_id": evidence_id}));
        spec.messages = vec![Message {
            role: Role::User,
            content,
        }];

        let outcome = self.runner.run(client_id, spec).await?;
        self.store.log_insight(
            WorkflowKind::Evidence.analysis_type(),
            case_number,
            &outcome.thinking,
            &json!({
                "evidence_id": evidence_id,
                "evidence_title": item.title,
                "analysis": outcome.response,
            }),
            outcome.usage.input_tokens as i64,
        )?;
        self.bus.emit(
            client_id,
            WorkflowKind::Evidence,
            Subevent::Results,
            json!({
                "case_number": case_number,
                "evidence_id": evidence_id,
                "analysis": outcome.response,
                "thinking_length": outcome.thinking.len(),
            }),
        );
        Ok(())
    }

    // ── Workflow 6: caseload chat ─────────────────────────────────────────

    pub async fn chat_message(&self, client_id: &str, message: &str) -> Result<()> {
        let message = message.trim();
        if message.is_empty() {
            self.analysis_error(client_id, "chat", "Empty message");
            return Ok(());
        }
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        self.status(client_id, "chat", "Thinking about your caseload...");

        let history = self
            .chat_histories
            .lock()
            .get(client_id)
            .cloned()
            .unwrap_or_default();

        // The caseload rides in the first turn only; later turns reuse it
        // from history.
        let user_content = if history.is_empty() {
            let caseload = self.context.build_full_caseload_context()?;
            let legal = self.context.build_legal_context(&self.caseload_topics()?);
            self.estimate_input(client_id, caseload.len() + legal.len());
            self.emit_corpus_stats(client_id);
            format!("{caseload}\n\n{legal}\n\n---\n\nThe attorney asks: {message}")
        } else {
            message.to_string()
        };

        let mut messages = history.clone();
        messages.push(Message::user_text(user_content.as_str()));

        let mut spec = CallSpec::new(
            WorkflowKind::Chat,
            prompts::with_today(prompts::CHAT),
            "",
        )
        .with_budgets(CHAT_THINKING, CHAT_RESPONSE);
        spec.messages = messages;

        let outcome = self.runner.run(client_id, spec).await?;

        {
            let mut histories = self.chat_histories.lock();
            let entry = histories.entry(client_id.to_string()).or_default();
            entry.push(Message::user_text(user_content.as_str()));
            entry.push(Message::assistant_text(outcome.response.as_str()));
            if entry.len() > CHAT_HISTORY_LIMIT {
                let excess = entry.len() - CHAT_HISTORY_LIMIT;
                entry.drain(..excess);
            }
        }
        self.store.append_chat(client_id, "user", message)?;
        self.store.append_chat(client_id, "assistant", &outcome.response)?;

        self.store.log_insight(
            WorkflowKind::Chat.analysis_type(),
            FULL_CASELOAD,
            &outcome.thinking,
            &json!({"message": message, "response_text": outcome.response}),
            outcome.usage.input_tokens as i64,
        )?;
        self.bus.emit(
            client_id,
            WorkflowKind::Chat,
            Subevent::Results,
            json!({
                "response": outcome.response,
                "thinking_length": outcome.thinking.len(),
            }),
        );
        Ok(())
    }

    pub fn clear_chat(&self, client_id: &str) -> Result<()> {
        self.chat_histories.lock().remove(client_id);
        self.store.clear_chat(client_id)?;
        self.bus.emit_named(client_id, "chat_cleared", json!({}));
        Ok(())
    }

    /// Drop all per-client state on disconnect.
    pub fn client_gone(&self, client_id: &str) {
        self.chat_histories.lock().remove(client_id);
    }

    // ── Workflow 7: hearing prep brief ────────────────────────────────────

    pub async fn run_hearing_prep(&self, client_id: &str, case_number: &str) -> Result<()> {
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        let Some(case) = self.require_case(client_id, "hearing_prep", case_number)? else {
            return Ok(());
        };
        self.status(
            client_id,
            "hearing_prep",
            &format!("Generating hearing brief for {case_number}..."),
        );

        let case_context = self
            .context
            .build_case_context(case_number)?
            .unwrap_or_default();
        let legal = self.context.build_legal_context(&case.charges);

        // Other cases before the same judge, for tendency analysis.
        let mut judge_lines = Vec::new();
        if !case.judge.is_empty() {
            for other in self.store.all_cases()? {
                if other.judge == case.judge && other.case_number != case_number {
                    judge_lines.push(format!(
                        "- {}: {}, Charges: {}, Status: {}",
                        other.case_number,
                        other.defendant_name,
                        other.charges.join(", "),
                        other.status
                    ));
                    if judge_lines.len() >= JUDGE_CASES_LIMIT {
                        break;
                    }
                }
            }
        }
        let judge_context = if judge_lines.is_empty() {
            String::new()
        } else {
            format!(
                "\n\n---\n\n# OTHER CASES WITH THIS JUDGE (for tendency analysis)\n{}",
                judge_lines.join("\n")
            )
        };

        let user = format!(
            "{case_context}\n\n{legal}{judge_context}\n\nGenerate a rapid hearing prep brief. Keep it under 500 words."
        );
        let spec = CallSpec::new(
            WorkflowKind::HearingPrep,
            prompts::with_today(prompts::HEARING_PREP),
            user,
        )
        .with_budgets(HEARING_PREP_THINKING, HEARING_PREP_RESPONSE)
        .with_tag(json!({"case_number": case_number}));

        let outcome = self.runner.run(client_id, spec).await?;
        self.store.log_insight(
            WorkflowKind::HearingPrep.analysis_type(),
            case_number,
            &outcome.thinking,
            &json!({"brief": outcome.response}),
            outcome.usage.input_tokens as i64,
        )?;
        self.bus.emit(
            client_id,
            WorkflowKind::HearingPrep,
            Subevent::Results,
            json!({
                "case_number": case_number,
                "brief": outcome.response,
                "thinking_length": outcome.thinking.len(),
            }),
        );
        Ok(())
    }

    // ── Workflow 8: client letter ─────────────────────────────────────────

    pub async fn run_client_letter(&self, client_id: &str, case_number: &str) -> Result<()> {
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        if self.require_case(client_id, "client_letter", case_number)?.is_none() {
            return Ok(());
        }
        self.status(
            client_id,
            "client_letter",
            &format!("Writing client letter for {case_number}..."),
        );

        let case_context = self
            .context
            .build_case_context(case_number)?
            .unwrap_or_default();
        let user = format!(
            "{case_context}\n\nWrite a clear, empathetic letter to this client explaining their case status, options, and next steps."
        );
        let spec = CallSpec::new(
            WorkflowKind::ClientLetter,
            prompts::with_today(prompts::CLIENT_LETTER),
            user,
        )
        .with_budgets(CLIENT_LETTER_THINKING, CLIENT_LETTER_RESPONSE)
        .with_tag(json!({"case_number": case_number}));

        let outcome = self.runner.run(client_id, spec).await?;
        self.store.log_insight(
            WorkflowKind::ClientLetter.analysis_type(),
            case_number,
            &outcome.thinking,
            &json!({"letter": outcome.response}),
            outcome.usage.input_tokens as i64,
        )?;
        self.bus.emit(
            client_id,
            WorkflowKind::ClientLetter,
            Subevent::Results,
            json!({
                "case_number": case_number,
                "letter": outcome.response,
                "thinking_length": outcome.thinking.len(),
            }),
        );
        Ok(())
    }

    // ── Workflow 9: cascade intelligence ──────────────────────────────────

    /// Autonomous investigation over the whole caseload: the model drives a
    /// bounded tool loop over all nine tools, then the terminal brief is
    /// parsed for a concrete actions list.
    pub async fn run_cascade(&self, client_id: &str) -> Result<()> {
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        self.status(client_id, "cascade", "Launching autonomous caseload investigation...");
        self.emit_corpus_stats(client_id);

        let index = self.caseload_index()?;
        let memory = self.context.build_memory_context(None)?;
        let initial_prompt = format!(
            "# CASELOAD INDEX\n{index}\n\n{memory}\nInvestigate this caseload using your tools. \
             Pull full context on the cases that matter most, check the current alerts and \
             connections, and produce the unified strategic brief with the closing actions block."
        );

        let outcome = self
            .tool_loop
            .run(
                client_id,
                LoopSpec {
                    kind: WorkflowKind::Cascade,
                    system: prompts::with_today(prompts::CASCADE),
                    initial_prompt,
                    tool_subset: None,
                    max_rounds: MAX_ROUNDS,
                    thinking_budget: CASCADE_THINKING,
                    max_tokens: CASCADE_THINKING + CASCADE_RESPONSE,
                },
            )
            .await?;

        let actions = extract_json(&outcome.response)
            .and_then(|v| match v {
                Value::Array(items) => Some(Value::Array(items)),
                Value::Object(ref obj) => obj.get("actions").cloned(),
                _ => None,
            })
            .unwrap_or_else(|| json!([]));

        self.store.log_insight(
            WorkflowKind::Cascade.analysis_type(),
            FULL_CASELOAD,
            &outcome.thinking,
            &json!({"brief": outcome.response, "actions": actions}),
            0,
        )?;
        self.bus.emit(
            client_id,
            WorkflowKind::Cascade,
            Subevent::Results,
            json!({
                "summary": outcome.response,
                "actions": actions,
                "rounds": outcome.rounds,
                "tool_invocations": outcome.tool_invocations,
                "thinking_length": outcome.thinking.len(),
            }),
        );
        Ok(())
    }

    // ── Ad-hoc widget ─────────────────────────────────────────────────────

    pub async fn create_widget(&self, client_id: &str, request: &str) -> Result<()> {
        let request = request.trim();
        if request.is_empty() {
            self.analysis_error(client_id, "widget", "Empty request");
            return Ok(());
        }
        let _guard = match self.claim(client_id) {
            Some(g) => g,
            None => return Ok(()),
        };
        self.status(client_id, "widget", "Building widget...");

        let caseload = self.context.build_full_caseload_context()?;
        let memory = self.context.build_memory_context(None)?;
        self.estimate_input(client_id, caseload.len());

        let user = format!("{caseload}\n\n{memory}\n\n---\n\nThe attorney requests: {request}");
        let spec = CallSpec::new(
            WorkflowKind::Widget,
            prompts::with_today(prompts::WIDGET),
            user,
        )
        .with_budgets(WIDGET_THINKING, WIDGET_RESPONSE);

        let outcome = self.runner.run(client_id, spec).await?;
        self.store.log_insight(
            WorkflowKind::Widget.analysis_type(),
            FULL_CASELOAD,
            &outcome.thinking,
            &json!({"request": request, "content": outcome.response}),
            outcome.usage.input_tokens as i64,
        )?;
        self.bus.emit(
            client_id,
            WorkflowKind::Widget,
            Subevent::Results,
            json!({
                "request": request,
                "content": outcome.response,
                "thinking_length": outcome.thinking.len(),
            }),
        );
        Ok(())
    }

    // ── Direct tool dispatch ──────────────────────────────────────────────

    /// `search_case_law` straight through the registry, outside the gate.
    pub async fn search_case_law(&self, client_id: &str, query: &str, court: Option<&str>) {
        let mut args = json!({"query": query});
        if let Some(court) = court {
            args["court"] = json!(court);
        }
        let result = self.registry.dispatch("search_case_law", args).await;
        let payload: Value = serde_json::from_str(&result.output)
            .unwrap_or_else(|_| json!({"error": "search_failed"}));
        self.bus.emit_named(client_id, "case_law_results", payload);
    }

    // ── Shared plumbing ───────────────────────────────────────────────────

    fn claim(&self, client_id: &str) -> Option<GateGuard> {
        match self.gate.try_acquire(client_id) {
            Some(guard) => Some(guard),
            None => {
                tracing::debug!(client_id, "workflow rejected: gate busy");
                self.bus
                    .emit_named(client_id, "analysis_error", json!({"message": "busy"}));
                None
            }
        }
    }

    /// Resolve a case or emit `analysis_error` without issuing any model
    /// call.
    fn require_case(
        &self,
        client_id: &str,
        phase: &str,
        case_number: &str,
    ) -> Result<Option<crate::store::CaseRecord>> {
        match self.store.get_case(case_number)? {
            Some(case) => Ok(Some(case)),
            None => {
                self.analysis_error(client_id, phase, format!("Case {case_number} not found"));
                Ok(None)
            }
        }
    }

    fn analysis_error(&self, client_id: &str, phase: &str, message: impl Into<String>) {
        self.bus.emit_named(
            client_id,
            "analysis_error",
            json!({"message": message.into(), "phase": phase}),
        );
    }

    fn status(&self, client_id: &str, phase: &str, message: &str) {
        self.bus.emit_named(
            client_id,
            "status",
            json!({"message": message, "phase": phase}),
        );
    }

    fn emit_phase(&self, client_id: &str, phase: &str, number: u32, status: &str) {
        self.bus.emit_named(
            client_id,
            "adversarial_phase",
            json!({"phase": phase, "phase_number": number, "status": status}),
        );
    }

    fn emit_corpus_stats(&self, client_id: &str) {
        self.bus
            .emit_named(client_id, "legal_corpus_loaded", json!(self.legal.stats()));
    }

    /// Estimated input tokens ticked onto the meter before the call; the
    /// authoritative count lands on completion.
    fn estimate_input(&self, client_id: &str, chars: usize) {
        let tally = self.accountant.add_input_estimate((chars / 4) as u64);
        self.bus.emit_named(client_id, "token_update", json!(tally));
    }

    /// Unique charges across the caseload, for the caseload-wide legal
    /// digest.
    fn caseload_topics(&self) -> Result<Vec<String>> {
        let mut topics: Vec<String> = Vec::new();
        for case in self.store.cases_ordered()? {
            for charge in case.charges {
                if !topics.contains(&charge) {
                    topics.push(charge);
                }
            }
            if topics.len() >= 24 {
                break;
            }
        }
        Ok(topics)
    }

    /// One line per case; the agent pulls full context through tools.
    fn caseload_index(&self) -> Result<String> {
        let cases = self.store.cases_ordered()?;
        let mut out = String::with_capacity(cases.len() * 96);
        for c in &cases {
            out.push_str(&format!(
                "- {}: {} | {} | {} | next hearing: {}\n",
                c.case_number,
                c.defendant_name,
                c.charges.join(", "),
                c.severity.as_str(),
                c.next_hearing_date.as_deref().unwrap_or("none"),
            ));
        }
        Ok(out)
    }
}

// ── Health-check payload parsing ──────────────────────────────────────────

fn parse_alerts(parsed: &Value) -> Vec<Alert> {
    parsed
        .get("alerts")
        .and_then(Value::as_array)
        .map(|alerts| {
            alerts
                .iter()
                .map(|a| Alert {
                    id: 0,
                    case_number: a
                        .get("case_number")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(String::from),
                    alert_type: str_field(a, "alert_type", "strategy"),
                    severity: AlertSeverity::parse(
                        a.get("severity").and_then(Value::as_str).unwrap_or("info"),
                    ),
                    title: str_field(a, "title", ""),
                    message: str_field(a, "message", ""),
                    details: str_field(a, "details", ""),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_connections(parsed: &Value) -> Vec<CaseConnection> {
    parsed
        .get("connections")
        .and_then(Value::as_array)
        .map(|conns| {
            conns
                .iter()
                .map(|c| CaseConnection {
                    id: 0,
                    case_numbers: c
                        .get("case_numbers")
                        .and_then(Value::as_array)
                        .map(|arr| {
                            arr.iter()
                                .filter_map(Value::as_str)
                                .map(String::from)
                                .collect()
                        })
                        .unwrap_or_default(),
                    connection_type: str_field(c, "connection_type", ""),
                    title: str_field(c, "title", ""),
                    description: str_field(c, "description", ""),
                    confidence: c.get("confidence").and_then(Value::as_f64).unwrap_or(0.0),
                    actionable: str_field(c, "actionable", ""),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_priority_actions(parsed: &Value) -> Vec<PriorityAction> {
    parsed
        .get("priority_actions")
        .and_then(Value::as_array)
        .map(|actions| {
            actions
                .iter()
                .enumerate()
                .map(|(i, p)| PriorityAction {
                    rank: p.get("rank").and_then(Value::as_i64).unwrap_or(i as i64 + 1),
                    case_number: str_field(p, "case_number", ""),
                    action: str_field(p, "action", ""),
                    urgency: str_field(p, "urgency", "routine"),
                    reason: str_field(p, "reason", ""),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn str_field(v: &Value, key: &str, default: &str) -> String {
    v.get(key)
        .and_then(Value::as_str)
        .unwrap_or(default)
        .to_string()
}

/// Read a media file into an image content part. Unreadable or unrecognized
/// files degrade to `None` (text-only analysis).
async fn load_image_part(path: &str) -> Option<ContentPart> {
    use base64::Engine;
    if path.is_empty() {
        return None;
    }
    let media_type = match path.rsplit('.').next().unwrap_or("") {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        _ => return None,
    };
    match tokio::fs::read(path).await {
        Ok(bytes) => Some(ContentPart::Image {
            media_type: media_type.to_string(),
            data: base64::engine::general_purpose::STANDARD.encode(bytes),
        }),
        Err(e) => {
            tracing::warn!(path, error = %e, "evidence media unreadable, text-only fallback");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_health_check_findings() {
        let parsed = json!({
            "alerts": [
                {"case_number": "CR-1", "alert_type": "deadline", "severity": "critical", "title": "t", "message": "m"},
                {"severity": "nonsense", "title": "u", "message": "v"}
            ],
            "connections": [
                {"case_numbers": ["CR-1", "CR-2"], "connection_type": "officer", "title": "shared", "description": "d", "confidence": 0.85}
            ],
            "priority_actions": [
                {"case_number": "CR-1", "action": "file motion", "urgency": "this_week", "reason": "r"}
            ]
        });
        let alerts = parse_alerts(&parsed);
        assert_eq!(alerts.len(), 2);
        assert_eq!(alerts[0].severity, AlertSeverity::Critical);
        assert_eq!(alerts[1].severity, AlertSeverity::Info);
        assert!(alerts[1].case_number.is_none());

        let conns = parse_connections(&parsed);
        assert_eq!(conns[0].case_numbers, vec!["CR-1", "CR-2"]);
        assert!((conns[0].confidence - 0.85).abs() < f64::EPSILON);

        let actions = parse_priority_actions(&parsed);
        assert_eq!(actions[0].rank, 1);
        assert_eq!(actions[0].urgency, "this_week");
    }

    #[tokio::test]
    async fn unreadable_media_degrades_to_text_only() {
        assert!(load_image_part("/nonexistent/evidence.png").await.is_none());
        assert!(load_image_part("evidence.mp4").await.is_none());
        assert!(load_image_part("").await.is_none());
    }
}
