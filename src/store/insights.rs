//! Insight Log — append-only record of completed analyses.
//!
//! Every workflow run appends exactly one insight. Insights are never
//! mutated or deleted; later workflows read them back as memory through the
//! context builder and the `get_prior_analyses` tool.

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Store;

/// Scope sentinel for caseload-wide analyses.
pub const FULL_CASELOAD: &str = "full_caseload";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Insight {
    pub id: i64,
    pub analysis_type: String,
    /// Either a case number or [`FULL_CASELOAD`].
    pub scope: String,
    pub result: Value,
    pub token_count: i64,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct InsightQuery {
    pub scope: Option<String>,
    pub analysis_type: Option<String>,
    pub limit: Option<usize>,
}

impl Store {
    /// Append one completed analysis. `thinking` is stored for audit but not
    /// returned by queries (it can run to hundreds of KB).
    pub fn log_insight(
        &self,
        analysis_type: &str,
        scope: &str,
        thinking: &str,
        result: &Value,
        token_count: i64,
    ) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT INTO analysis_log (analysis_type, scope, thinking_text, result_json, token_count, created_at)
             VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                analysis_type,
                scope,
                thinking,
                serde_json::to_string(result)?,
                token_count,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Insights newest-first, optionally filtered by scope and type.
    pub fn list_insights(&self, query: &InsightQuery) -> Result<Vec<Insight>> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT id, analysis_type, scope, result_json, token_count, created_at
             FROM analysis_log ORDER BY id DESC",
        )?;
        let rows = stmt.query_map([], |row| {
            let result_json: String = row.get(3)?;
            Ok(Insight {
                id: row.get(0)?,
                analysis_type: row.get(1)?,
                scope: row.get(2)?,
                result: serde_json::from_str(&result_json).unwrap_or(Value::Null),
                token_count: row.get(4)?,
                created_at: row.get(5)?,
            })
        })?;
        let mut insights: Vec<Insight> = rows
            .collect::<rusqlite::Result<Vec<_>>>()
            .context("failed to list insights")?;

        if let Some(scope) = &query.scope {
            insights.retain(|i| &i.scope == scope);
        }
        if let Some(ty) = &query.analysis_type {
            insights.retain(|i| &i.analysis_type == ty);
        }
        if let Some(limit) = query.limit {
            insights.truncate(limit);
        }
        Ok(insights)
    }

    /// Insights relevant to a case: those scoped to it plus caseload-wide ones.
    pub fn insights_for_case(&self, case_number: &str, limit: usize) -> Result<Vec<Insight>> {
        let all = self.list_insights(&InsightQuery::default())?;
        Ok(all
            .into_iter()
            .filter(|i| i.scope == case_number || i.scope == FULL_CASELOAD)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn insights_append_only_newest_first() {
        let store = Store::open_in_memory().unwrap();
        store
            .log_insight("health_check", FULL_CASELOAD, "", &json!({"alerts": []}), 100)
            .unwrap();
        store
            .log_insight("deep_analysis", "CR-2026-0001", "", &json!({"score": 62}), 50)
            .unwrap();

        let all = store.list_insights(&InsightQuery::default()).unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].analysis_type, "deep_analysis");
        assert_eq!(all[1].scope, FULL_CASELOAD);

        let filtered = store
            .list_insights(&InsightQuery {
                analysis_type: Some("health_check".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(filtered.len(), 1);
    }

    #[test]
    fn case_scope_includes_caseload_wide() {
        let store = Store::open_in_memory().unwrap();
        store.log_insight("health_check", FULL_CASELOAD, "", &json!({}), 0).unwrap();
        store.log_insight("deep_analysis", "CR-1", "", &json!({}), 0).unwrap();
        store.log_insight("deep_analysis", "CR-2", "", &json!({}), 0).unwrap();

        let for_case = store.insights_for_case("CR-1", 5).unwrap();
        assert_eq!(for_case.len(), 2);
    }

    #[test]
    fn superseded_health_check_still_discoverable() {
        let store = Store::open_in_memory().unwrap();
        store.log_insight("health_check", FULL_CASELOAD, "", &json!({"run": 1}), 0).unwrap();
        store.log_insight("health_check", FULL_CASELOAD, "", &json!({"run": 2}), 0).unwrap();

        let runs = store
            .list_insights(&InsightQuery {
                analysis_type: Some("health_check".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].result["run"], 2);
    }
}
