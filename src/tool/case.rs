//! Case lookup tools: structured record access and the full markdown
//! rendering used for deep context.

use super::{parse_args, Tool, ToolResult};
use crate::context::ContextBuilder;
use crate::store::Store;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
struct CaseParams {
    case_number: String,
}

pub struct GetCaseTool {
    store: Arc<Store>,
}

impl GetCaseTool {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Tool for GetCaseTool {
    fn id(&self) -> &str {
        "get_case"
    }

    fn description(&self) -> &str {
        "Fetch the structured record for one case: charges, actors, dates, plea posture, witnesses, and notes."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "case_number": {"type": "string", "description": "Case number, e.g. CR-2026-0051"}
            },
            "required": ["case_number"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: CaseParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        match self.store.get_case(&p.case_number)? {
            Some(case) => Ok(ToolResult::json(&serde_json::to_value(&case)?)),
            None => Ok(ToolResult::error(
                "not_found",
                format!("no case numbered {}", p.case_number),
            )),
        }
    }
}

pub struct GetCaseContextTool {
    context: Arc<ContextBuilder>,
}

impl GetCaseContextTool {
    pub fn new(context: Arc<ContextBuilder>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for GetCaseContextTool {
    fn id(&self) -> &str {
        "get_case_context"
    }

    fn description(&self) -> &str {
        "Fetch the full markdown context for one case, including evidence items, active alerts, cross-case connections, and prior analysis memory."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "case_number": {"type": "string"}
            },
            "required": ["case_number"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: CaseParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        match self.context.build_case_context(&p.case_number)? {
            Some(markdown) => Ok(ToolResult::json(&json!({
                "case_number": p.case_number,
                "context": markdown,
            }))),
            None => Ok(ToolResult::error(
                "not_found",
                format!("no case numbered {}", p.case_number),
            )),
        }
    }
}
