//! Findings tools: health-check output (alerts, connections) and the prior
//! analysis memory.

use super::{parse_args, Tool, ToolResult};
use crate::store::insights::InsightQuery;
use crate::store::Store;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct GetAlertsTool {
    store: Arc<Store>,
}

impl GetAlertsTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct AlertParams {
    #[serde(default)]
    case_number: Option<String>,
    #[serde(default)]
    severity: Option<String>,
}

#[async_trait]
impl Tool for GetAlertsTool {
    fn id(&self) -> &str {
        "get_alerts"
    }

    fn description(&self) -> &str {
        "List the active caseload alerts from the most recent health check, optionally filtered by case number or severity."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "case_number": {"type": "string"},
                "severity": {"type": "string", "enum": ["critical", "warning", "info"]}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: AlertParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        let mut alerts = self.store.alerts()?;
        if let Some(cn) = &p.case_number {
            alerts.retain(|a| a.case_number.as_deref() == Some(cn.as_str()));
        }
        if let Some(severity) = &p.severity {
            alerts.retain(|a| a.severity.as_str() == severity);
        }
        let count = alerts.len();
        Ok(ToolResult::json(&json!({"alerts": alerts, "count": count})))
    }
}

pub struct GetConnectionsTool {
    store: Arc<Store>,
}

impl GetConnectionsTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct ConnectionParams {
    #[serde(default)]
    case_number: Option<String>,
    #[serde(default, rename = "type")]
    connection_type: Option<String>,
}

#[async_trait]
impl Tool for GetConnectionsTool {
    fn id(&self) -> &str {
        "get_connections"
    }

    fn description(&self) -> &str {
        "List cross-case connections (shared officers, witnesses, plea disparities) found by the most recent health check."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "case_number": {"type": "string"},
                "type": {"type": "string", "description": "Connection type tag, e.g. officer or witness"}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: ConnectionParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        let mut connections = self.store.connections()?;
        if let Some(cn) = &p.case_number {
            connections.retain(|c| c.case_numbers.iter().any(|n| n == cn));
        }
        if let Some(ty) = &p.connection_type {
            connections.retain(|c| c.connection_type.eq_ignore_ascii_case(ty));
        }
        let count = connections.len();
        Ok(ToolResult::json(&json!({
            "connections": connections,
            "count": count,
        })))
    }
}

pub struct GetPriorAnalysesTool {
    store: Arc<Store>,
}

impl GetPriorAnalysesTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[derive(Deserialize)]
struct PriorParams {
    #[serde(default)]
    scope: Option<String>,
    #[serde(default, rename = "type")]
    analysis_type: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

#[async_trait]
impl Tool for GetPriorAnalysesTool {
    fn id(&self) -> &str {
        "get_prior_analyses"
    }

    fn description(&self) -> &str {
        "List prior completed analyses (newest first) so you can build on earlier findings instead of re-deriving them. Scope is a case number or 'full_caseload'."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "scope": {"type": "string"},
                "type": {"type": "string", "description": "Analysis type, e.g. health_check or deep_analysis"},
                "limit": {"type": "integer", "minimum": 1, "maximum": 25}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: PriorParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        let insights = self.store.list_insights(&InsightQuery {
            scope: p.scope,
            analysis_type: p.analysis_type,
            limit: Some(p.limit.unwrap_or(10).min(25)),
        })?;
        let entries: Vec<Value> = insights
            .iter()
            .map(|i| {
                json!({
                    "analysis_type": i.analysis_type,
                    "scope": i.scope,
                    "created_at": i.created_at,
                    "result": i.result,
                })
            })
            .collect();
        let count = entries.len();
        Ok(ToolResult::json(&json!({"analyses": entries, "count": count})))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::insights::FULL_CASELOAD;
    use crate::store::{Alert, AlertSeverity, CaseRecord, Severity};

    fn seeded_store() -> Arc<Store> {
        let store = Arc::new(Store::open_in_memory().unwrap());
        store
            .insert_cases(&[CaseRecord {
                case_number: "CR-1".to_string(),
                defendant_name: "Lee Park".to_string(),
                charges: vec!["Theft by Taking".to_string()],
                severity: Severity::Misdemeanor,
                status: "active".to_string(),
                court: String::new(),
                judge: String::new(),
                prosecutor: String::new(),
                next_hearing_date: None,
                hearing_type: None,
                filing_date: String::new(),
                arrest_date: String::new(),
                evidence_summary: String::new(),
                notes: String::new(),
                attorney_notes: String::new(),
                plea_offer: None,
                plea_offer_details: None,
                arresting_officer: String::new(),
                precinct: String::new(),
                witnesses: vec![],
                prior_record: String::new(),
                bond_status: String::new(),
            }])
            .unwrap();
        store
            .replace_findings(
                &[
                    Alert {
                        id: 0,
                        case_number: Some("CR-1".to_string()),
                        alert_type: "deadline".to_string(),
                        severity: AlertSeverity::Critical,
                        title: "t".to_string(),
                        message: "m".to_string(),
                        details: String::new(),
                    },
                    Alert {
                        id: 0,
                        case_number: None,
                        alert_type: "strategy".to_string(),
                        severity: AlertSeverity::Info,
                        title: "w".to_string(),
                        message: "m".to_string(),
                        details: String::new(),
                    },
                ],
                &[],
                &[],
            )
            .unwrap();
        store
    }

    #[tokio::test]
    async fn alerts_filter_by_severity() {
        let tool = GetAlertsTool::new(seeded_store());
        let result = tool.execute(json!({"severity": "critical"})).await.unwrap();
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["count"], 1);
    }

    #[tokio::test]
    async fn prior_analyses_newest_first_with_limit() {
        let store = seeded_store();
        for i in 0..3 {
            store
                .log_insight("health_check", FULL_CASELOAD, "", &json!({"run": i}), 0)
                .unwrap();
        }
        let tool = GetPriorAnalysesTool::new(store);
        let result = tool.execute(json!({"limit": 2})).await.unwrap();
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(parsed["count"], 2);
        assert_eq!(parsed["analyses"][0]["result"]["run"], 2);
    }
}
