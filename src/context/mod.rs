//! Context Builder — assembles the shared textual corpus stitched into every
//! workflow prompt.
//!
//! All output is deterministic given the store contents: cases render in
//! `case_number` ascending order with a stable separator, and no time or
//! random state leaks into the text.

use crate::legal::LegalCorpus;
use crate::store::insights::InsightQuery;
use crate::store::{CaseRecord, Store};
use anyhow::Result;
use serde_json::Value;
use std::sync::Arc;

/// Cap on the legal digest, in tokens (4 chars/token heuristic).
pub const LEGAL_CONTEXT_TOKEN_CAP: usize = 30_000;

/// Most recent insights rendered into memory context.
pub const MEMORY_LIMIT: usize = 5;

pub struct ContextBuilder {
    store: Arc<Store>,
    legal: Arc<LegalCorpus>,
}

impl ContextBuilder {
    pub fn new(store: Arc<Store>, legal: Arc<LegalCorpus>) -> Self {
        Self { store, legal }
    }

    /// The full caseload, every case rendered as markdown, in one pass into a
    /// single pre-sized buffer. At ~500 cases this is on the order of a
    /// megabyte of text; avoid intermediate copies.
    pub fn build_full_caseload_context(&self) -> Result<String> {
        let cases = self.store.cases_ordered()?;
        if cases.is_empty() {
            return Ok("No cases loaded.".to_string());
        }

        let mut out = String::with_capacity(cases.len() * 1024 + 64);
        out.push_str(&format!("# FULL CASELOAD — {} Active Cases\n\n", cases.len()));
        for case in &cases {
            render_case_summary(&mut out, case);
            out.push_str("\n---\n\n");
        }
        Ok(out)
    }

    /// Stable human-readable rendering of one case, including its evidence
    /// items.
    pub fn build_case_markdown(&self, case_number: &str) -> Result<Option<String>> {
        let case = match self.store.get_case(case_number)? {
            Some(c) => c,
            None => return Ok(None),
        };

        let mut out = String::with_capacity(2048);
        out.push_str(&format!("# CASE DETAIL: {}\n", case.case_number));
        out.push_str(&format!("## Defendant: {}\n\n### Charges\n", case.defendant_name));
        for charge in &case.charges {
            out.push_str(&format!("- {charge}\n"));
        }
        out.push_str("\n### Case Information\n");
        out.push_str(&format!("- Severity: {}\n", case.severity.as_str()));
        out.push_str(&format!("- Status: {}\n", case.status));
        out.push_str(&format!("- Court: {}\n", case.court));
        out.push_str(&format!("- Judge: {}\n", case.judge));
        out.push_str(&format!("- Prosecutor: {}\n", case.prosecutor));
        out.push_str(&format!("- Filing Date: {}\n", case.filing_date));
        out.push_str(&format!("- Arrest Date: {}\n", case.arrest_date));
        out.push_str(&format!("- Arresting Officer: {}\n", case.arresting_officer));
        out.push_str(&format!("- Precinct: {}\n", case.precinct));
        if !case.bond_status.is_empty() {
            out.push_str(&format!("- Bond: {}\n", case.bond_status));
        }
        if let Some(hearing) = &case.next_hearing_date {
            out.push_str(&format!(
                "- Next Hearing: {hearing} ({})\n",
                case.hearing_type.as_deref().unwrap_or("TBD")
            ));
        }
        if let Some(offer) = &case.plea_offer {
            out.push_str(&format!("\n### Plea Offer\n{offer}\n"));
            if let Some(details) = &case.plea_offer_details {
                out.push_str(&format!("{details}\n"));
            }
        }
        if !case.prior_record.is_empty() {
            out.push_str(&format!("\n### Prior Record\n{}\n", case.prior_record));
        }
        if !case.witnesses.is_empty() {
            out.push_str("\n### Witnesses\n");
            for w in &case.witnesses {
                out.push_str(&format!("- {w}\n"));
            }
        }
        if !case.evidence_summary.is_empty() {
            out.push_str(&format!("\n### Evidence Summary\n{}\n", case.evidence_summary));
        }
        if !case.notes.is_empty() {
            out.push_str(&format!("\n### Case Notes\n{}\n", case.notes));
        }
        if !case.attorney_notes.is_empty() {
            out.push_str(&format!("\n### Attorney Notes\n{}\n", case.attorney_notes));
        }

        let evidence = self.store.evidence(case_number)?;
        if !evidence.is_empty() {
            out.push_str("\n### Evidence Items\n");
            for e in &evidence {
                out.push_str(&format!("- [{}] {}: {}\n", e.evidence_type, e.title, e.description));
                if !e.source.is_empty() {
                    out.push_str(&format!("  Source: {}\n", e.source));
                }
            }
        }
        Ok(Some(out))
    }

    /// The focal case plus prior insights scoped to it and any caseload-wide
    /// alerts or connections that mention it.
    pub fn build_case_context(&self, case_number: &str) -> Result<Option<String>> {
        let mut out = match self.build_case_markdown(case_number)? {
            Some(md) => md,
            None => return Ok(None),
        };

        let alerts: Vec<_> = self
            .store
            .alerts()?
            .into_iter()
            .filter(|a| a.case_number.as_deref() == Some(case_number))
            .collect();
        if !alerts.is_empty() {
            out.push_str("\n### Active Alerts\n");
            for a in &alerts {
                out.push_str(&format!("- [{}] {}: {}\n", a.severity.as_str().to_uppercase(), a.title, a.message));
            }
        }

        let connections: Vec<_> = self
            .store
            .connections()?
            .into_iter()
            .filter(|c| c.case_numbers.iter().any(|cn| cn == case_number))
            .collect();
        if !connections.is_empty() {
            out.push_str("\n### Cross-Case Connections\n");
            for c in &connections {
                out.push_str(&format!(
                    "- {} (cases: {}): {}\n",
                    c.title,
                    c.case_numbers.join(", "),
                    c.description
                ));
            }
        }

        let memory = self.build_memory_context(Some(case_number))?;
        if !memory.is_empty() {
            out.push_str("\n");
            out.push_str(&memory);
        }
        Ok(Some(out))
    }

    /// Compact digest of statutes, amendments, and landmark cases relevant to
    /// a set of topic strings. Bounded by [`LEGAL_CONTEXT_TOKEN_CAP`].
    pub fn build_legal_context(&self, topics: &[String]) -> String {
        self.legal.digest_for_topics(topics, LEGAL_CONTEXT_TOKEN_CAP * 4)
    }

    /// Up to [`MEMORY_LIMIT`] most recent insights for a scope, newest first,
    /// rendered with type, timestamp, and condensed payload.
    pub fn build_memory_context(&self, case_number: Option<&str>) -> Result<String> {
        let insights = match case_number {
            Some(cn) => self.store.insights_for_case(cn, MEMORY_LIMIT)?,
            None => self.store.list_insights(&InsightQuery {
                limit: Some(MEMORY_LIMIT),
                ..Default::default()
            })?,
        };
        if insights.is_empty() {
            return Ok(String::new());
        }

        let mut out = String::from("# PRIOR ANALYSIS MEMORY — Findings from earlier in this session\n\n");
        for (i, insight) in insights.iter().enumerate() {
            let label = insight.analysis_type.replace('_', " ");
            out.push_str(&format!(
                "## Prior Analysis #{}: {} ({}) at {}\n",
                i + 1,
                label,
                insight.scope,
                insight.created_at
            ));
            condense_payload(&mut out, &insight.result);
            out.push('\n');
        }
        Ok(out)
    }
}

fn render_case_summary(out: &mut String, c: &CaseRecord) {
    out.push_str(&format!("## Case {}: {}\n", c.case_number, c.defendant_name));
    let charges = if c.charges.is_empty() { "Unknown".to_string() } else { c.charges.join(", ") };
    out.push_str(&format!("Charges: {charges}\n"));
    out.push_str(&format!("Severity: {} | Status: {}\n", c.severity.as_str(), c.status));
    out.push_str(&format!("Court: {} | Judge: {} | Prosecutor: {}\n", c.court, c.judge, c.prosecutor));
    if let Some(hearing) = &c.next_hearing_date {
        out.push_str(&format!(
            "Next Hearing: {hearing} ({})\n",
            c.hearing_type.as_deref().unwrap_or("TBD")
        ));
    }
    out.push_str(&format!("Filing: {} | Arrest: {}\n", c.filing_date, c.arrest_date));
    out.push_str(&format!("Arresting Officer: {} | Precinct: {}\n", c.arresting_officer, c.precinct));
    if let Some(offer) = &c.plea_offer {
        out.push_str(&format!("Plea Offer: {offer}\n"));
        if let Some(details) = &c.plea_offer_details {
            out.push_str(&format!("Plea Details: {details}\n"));
        }
    }
    if !c.bond_status.is_empty() {
        out.push_str(&format!("Bond: {}\n", c.bond_status));
    }
    if !c.prior_record.is_empty() {
        out.push_str(&format!("Prior Record: {}\n", c.prior_record));
    }
    let witnesses = if c.witnesses.is_empty() { "None listed".to_string() } else { c.witnesses.join(", ") };
    out.push_str(&format!("Witnesses: {witnesses}\n"));
    if !c.evidence_summary.is_empty() {
        out.push_str(&format!("Evidence: {}\n", c.evidence_summary));
    }
    if !c.notes.is_empty() {
        out.push_str(&format!("Notes: {}\n", c.notes));
    }
    if !c.attorney_notes.is_empty() {
        out.push_str(&format!("Attorney Notes: {}\n", c.attorney_notes));
    }
}

/// Pull the load-bearing fields out of an insight payload so memory stays
/// compact across long sessions.
fn condense_payload(out: &mut String, result: &Value) {
    let Some(obj) = result.as_object() else {
        if let Some(text) = result.as_str() {
            out.push_str(&format!("- {}\n", truncate(text, 200)));
        }
        return;
    };

    if let Some(alerts) = obj.get("alerts").and_then(Value::as_array) {
        let critical: Vec<&Value> = alerts
            .iter()
            .filter(|a| a.get("severity").and_then(Value::as_str) == Some("critical"))
            .collect();
        if !critical.is_empty() {
            out.push_str(&format!("- Found {} CRITICAL alerts\n", critical.len()));
            for a in critical.iter().take(3) {
                out.push_str(&format!(
                    "  - {}: {}\n",
                    a.get("title").and_then(Value::as_str).unwrap_or(""),
                    truncate(a.get("message").and_then(Value::as_str).unwrap_or(""), 150)
                ));
            }
        }
    }
    if let Some(connections) = obj.get("connections").and_then(Value::as_array) {
        for c in connections.iter().take(3) {
            out.push_str(&format!(
                "- Connection: {} (confidence: {:.0}%)\n",
                c.get("title").and_then(Value::as_str).unwrap_or(""),
                c.get("confidence").and_then(Value::as_f64).unwrap_or(0.0) * 100.0
            ));
        }
    }
    if let Some(summary) = obj.get("executive_summary").and_then(Value::as_str) {
        out.push_str(&format!("- Summary: {}\n", truncate(summary, 200)));
    }
    if let Some(score) = obj.get("prosecution_strength_score").and_then(Value::as_i64) {
        out.push_str(&format!("- Prosecution strength: {score}/100\n"));
    }
    if let Some(plea) = obj.get("plea_recommendation").and_then(Value::as_object) {
        out.push_str(&format!(
            "- Plea recommendation: {}\n",
            plea.get("recommendation").and_then(Value::as_str).unwrap_or("unknown")
        ));
    }
    if let Some(actions) = obj.get("priority_actions").and_then(Value::as_array) {
        for a in actions.iter().take(3) {
            out.push_str(&format!(
                "- Priority: {}\n",
                a.get("action").and_then(Value::as_str).unwrap_or("")
            ));
        }
    }
    if let Some(text) = obj.get("response_text").and_then(Value::as_str) {
        out.push_str(&format!("- {}\n", truncate(text, 200)));
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{CaseRecord, Severity};
    use serde_json::json;

    fn seed(store: &Store) {
        let mk = |cn: &str| CaseRecord {
            case_number: cn.to_string(),
            defendant_name: "Sam Doe".to_string(),
            charges: vec!["Theft by Taking".to_string()],
            severity: Severity::Misdemeanor,
            status: "active".to_string(),
            court: "State Court".to_string(),
            judge: "Hon. A. Park".to_string(),
            prosecutor: "ADA Lee".to_string(),
            next_hearing_date: None,
            hearing_type: None,
            filing_date: "2026-05-01".to_string(),
            arrest_date: "2026-04-15".to_string(),
            evidence_summary: String::new(),
            notes: String::new(),
            attorney_notes: String::new(),
            plea_offer: None,
            plea_offer_details: None,
            arresting_officer: "Freeman".to_string(),
            precinct: "Zone 2".to_string(),
            witnesses: vec![],
            prior_record: String::new(),
            bond_status: String::new(),
        };
        store.insert_cases(&[mk("CR-2"), mk("CR-1"), mk("CR-3")]).unwrap();
    }

    #[test]
    fn caseload_context_orders_by_case_number() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed(&store);
        let builder = ContextBuilder::new(store, LegalCorpus::load());
        let ctx = builder.build_full_caseload_context().unwrap();
        let p1 = ctx.find("## Case CR-1").unwrap();
        let p2 = ctx.find("## Case CR-2").unwrap();
        let p3 = ctx.find("## Case CR-3").unwrap();
        assert!(p1 < p2 && p2 < p3);
        // Deterministic: two builds are byte-identical.
        assert_eq!(ctx, builder.build_full_caseload_context().unwrap());
    }

    #[test]
    fn memory_context_is_bounded_and_newest_first() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        seed(&store);
        for i in 0..8 {
            store
                .log_insight("deep_analysis", "CR-1", "", &json!({"prosecution_strength_score": i}), 0)
                .unwrap();
        }
        let builder = ContextBuilder::new(store, LegalCorpus::load());
        let memory = builder.build_memory_context(Some("CR-1")).unwrap();
        assert_eq!(memory.matches("Prior Analysis #").count(), MEMORY_LIMIT);
        assert!(memory.contains("Prosecution strength: 7/100"));
        assert!(!memory.contains("Prosecution strength: 0/100"));
    }

    #[test]
    fn missing_case_yields_none() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let builder = ContextBuilder::new(store, LegalCorpus::load());
        assert!(builder.build_case_context("CR-404").unwrap().is_none());
    }
}
