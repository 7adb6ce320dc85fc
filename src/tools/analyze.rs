//! Analysis tool: summarizes accumulated observations
//!
//! The reference analysis tool the planner falls back to when it cannot
//! produce a more specific plan, and the tool strategy-switch steps target.

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{Tool, ToolResult};
use crate::error::Result;

/// Built-in tool: produce a short textual summary of a list of observations.
pub struct AnalyzeTool;

#[async_trait]
impl Tool for AnalyzeTool {
    fn name(&self) -> &str {
        "analyze"
    }

    fn description(&self) -> &str {
        "Summarize a set of prior observations into a short textual analysis"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "observations": {"type": "array", "items": {"type": "string"}, "default": []},
                "question": {"type": "string", "default": ""}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let observations: Vec<String> = args
            .get("observations")
            .and_then(Value::as_array)
            .map(|a| a.iter().map(|v| v.to_string()).collect())
            .unwrap_or_default();
        let question = args.get("question").and_then(Value::as_str).unwrap_or("");

        if observations.is_empty() {
            return Ok(ToolResult::success(
                "No observations available to analyze yet.".to_string(),
            ));
        }

        let mut summary = String::new();
        if !question.is_empty() {
            summary.push_str(&format!("Regarding: {question}\n"));
        }
        summary.push_str(&format!("Analyzed {} observation(s):\n", observations.len()));
        for (i, obs) in observations.iter().enumerate().take(10) {
            let clipped: String = obs.chars().take(200).collect();
            summary.push_str(&format!("{}. {clipped}\n", i + 1));
        }

        Ok(ToolResult::success(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_observations_returns_placeholder() {
        let tool = AnalyzeTool;
        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.content.unwrap().contains("No observations"));
    }

    #[tokio::test]
    async fn summarizes_provided_observations() {
        let tool = AnalyzeTool;
        let result = tool
            .execute(serde_json::json!({"observations": ["a", "b"], "question": "what happened?"}))
            .await
            .unwrap();
        let content = result.content.unwrap();
        assert!(content.contains("what happened?"));
        assert!(content.contains("Analyzed 2"));
    }
}
