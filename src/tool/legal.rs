//! Legal corpus digest tool.

use super::{parse_args, Tool, ToolResult};
use crate::context::ContextBuilder;
use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

#[derive(Deserialize)]
struct LegalParams {
    topics: Vec<String>,
}

pub struct GetLegalContextTool {
    context: Arc<ContextBuilder>,
}

impl GetLegalContextTool {
    pub fn new(context: Arc<ContextBuilder>) -> Self {
        Self { context }
    }
}

#[async_trait]
impl Tool for GetLegalContextTool {
    fn id(&self) -> &str {
        "get_legal_context"
    }

    fn description(&self) -> &str {
        "Fetch the statutes, constitutional provisions, and landmark holdings relevant to a list of charges or legal topics."
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "topics": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "Charges or topics, e.g. [\"DUI\", \"speedy trial\"]"
                }
            },
            "required": ["topics"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let p: LegalParams = match parse_args(args) {
            Ok(p) => p,
            Err(bad) => return Ok(bad),
        };
        if p.topics.is_empty() {
            return Ok(ToolResult::bad_input("topics must not be empty"));
        }
        let digest = self.context.build_legal_context(&p.topics);
        Ok(ToolResult::json(&json!({
            "topics": p.topics,
            "legal_context": digest,
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::legal::LegalCorpus;
    use crate::store::Store;

    #[tokio::test]
    async fn digest_covers_requested_topic() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let context = Arc::new(ContextBuilder::new(store, LegalCorpus::load()));
        let tool = GetLegalContextTool::new(context);
        let result = tool.execute(json!({"topics": ["DUI"]})).await.unwrap();
        assert!(result.success);
        let parsed: Value = serde_json::from_str(&result.output).unwrap();
        assert!(parsed["legal_context"].as_str().unwrap().contains("40-6-391"));
    }

    #[tokio::test]
    async fn empty_topics_rejected() {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let context = Arc::new(ContextBuilder::new(store, LegalCorpus::load()));
        let tool = GetLegalContextTool::new(context);
        let result = tool.execute(json!({"topics": []})).await.unwrap();
        assert!(!result.success);
    }
}
