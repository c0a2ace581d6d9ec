//! Grounded case-law tools: web-search backed opinion lookup, citation
//! verification, and precedent search by charge.

use super::{parse_args, Tool, ToolResult};
use crate::citations::{extract_json, CitationVerifier};
use crate::provider::{CompletionRequest, Message, Provider};
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const MAX_RESULTS: usize = 5;

fn court_name(court: &str) -> &str {
    match court {
        "ga" => "Georgia",
        "scotus" => "U.S. Supreme Court",
        "ca11" => "Eleventh Circuit",
        "ca5" => "Fifth Circuit",
        "ca9" => "Ninth Circuit",
        other => other,
    }
}

/// Issue one grounded opinion search and parse the JSON array of results.
async fn search_opinions(
    provider: &Arc<dyn Provider>,
    model: &str,
    query: &str,
    court: &str,
    max_results: usize,
) -> Result<Vec<Value>> {
    let prompt = format!(
        "Search the web for relevant case law opinions about: {query}\n\n\
         Jurisdiction: {}\nReturn up to {max_results} results.\n\n\
         For each result provide: case_name, citation (array of strings), court, \
         date_filed, snippet (max 400 chars), url.\n\n\
         Return ONLY a JSON array:\n\
         [{{\"case_name\": \"...\", \"citation\": [\"...\"], \"court\": \"...\", \
         \"date_filed\": \"...\", \"snippet\": \"...\", \"url\": \"...\"}}]\n\n\
         Search Google Scholar, CourtListener, Casetext, Justia, and other legal \
         databases. Only include cases you can confirm exist.",
        court_name(court)
    );

    let mut request = CompletionRequest::new(model, 4096);
    request.messages = vec![Message::user_text(prompt)];
    request.web_search = true;

    let response = provider.complete(request).await?;
    let parsed = extract_json(&response.text())
        .and_then(|v| v.as_array().cloned())
        .unwrap_or_default();
    Ok(parsed.into_iter().take(max_results).collect())
}

pub struct SearchCaseLawTool {
    provider: Arc<dyn Provider>,
    model: String,
}

impl SearchCaseLawTool {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
    #[serde(default)]
    court: Option<String>,
}

#[async_trait]
impl Tool for SearchCaseLawTool {
    fn id(&self) -> &str {
        "search_case_law"
    }

    fn description(&self) -> &str {
        "Search the web for case law opinions relevant to a query. Returns case names, citations, courts, dates, snippets, and URLs."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "court": {"type": "string", "description": "Court code: ga, scotus, ca11, ca5, ca9"}
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: SearchParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        if p.query.trim().is_empty() {
            return Ok(ToolResult::bad_input("query must not be empty"));
        }
        let court = p.court.as_deref().unwrap_or("ga");
        match search_opinions(&self.provider, &self.model, &p.query, court, MAX_RESULTS).await {
            Ok(results) => Ok(ToolResult::json(&json!({
                "query": p.query,
                "court": court,
                "results": results,
            }))),
            Err(e) => Ok(ToolResult::error("search_failed", e.to_string())),
        }
    }
}

pub struct VerifyCitationsTool {
    verifier: Arc<CitationVerifier>,
}

impl VerifyCitationsTool {
    pub fn new(verifier: Arc<CitationVerifier>) -> Self {
        Self { verifier }
    }
}

#[derive(Deserialize)]
struct VerifyParams {
    citations: Vec<String>,
}

#[async_trait]
impl Tool for VerifyCitationsTool {
    fn id(&self) -> &str {
        "verify_citations"
    }

    fn description(&self) -> &str {
        "Verify a list of legal citations against the local corpus and the web. Each citation comes back verified, not_found, or ambiguous, with a source URL where available."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "citations": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["citations"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: VerifyParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        if p.citations.is_empty() {
            return Ok(ToolResult::bad_input("citations must not be empty"));
        }
        let report = self.verifier.verify_citations(&p.citations).await;
        Ok(ToolResult::json(&serde_json::to_value(&report)?))
    }
}

pub struct SearchPrecedentsTool {
    provider: Arc<dyn Provider>,
    model: String,
}

impl SearchPrecedentsTool {
    pub fn new(provider: Arc<dyn Provider>, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
        }
    }
}

#[derive(Deserialize)]
struct PrecedentParams {
    charges: Vec<String>,
}

#[async_trait]
impl Tool for SearchPrecedentsTool {
    fn id(&self) -> &str {
        "search_precedents_for_charges"
    }

    fn description(&self) -> &str {
        "Find precedents relevant to a list of criminal charges, ranked by relevance per charge."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "charges": {"type": "array", "items": {"type": "string"}}
            },
            "required": ["charges"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: PrecedentParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        if p.charges.is_empty() {
            return Ok(ToolResult::bad_input("charges must not be empty"));
        }

        let mut per_charge = Vec::new();
        for charge in &p.charges {
            match search_opinions(&self.provider, &self.model, charge, "ga", 3).await {
                Ok(results) => per_charge.push(json!({"charge": charge, "precedents": results})),
                Err(e) => {
                    // One failed charge does not sink the batch.
                    tracing::warn!(charge = %charge, error = %e, "precedent search failed");
                    per_charge.push(json!({"charge": charge, "error": e.to_string()}));
                }
            }
        }
        Ok(ToolResult::json(&json!({"charges": per_charge})))
    }
}
