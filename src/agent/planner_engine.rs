//! Structured plan generation for the agent control loop
//!
//! Produces the full [`Plan`] record the control loop's state machine
//! consumes, repairing and re-prompting on parse failure before degrading
//! to a fixed fallback.

use serde::Serialize;
use serde_json::{json, Value};

use crate::agent::fallback_client::FallbackClient;
use crate::agent::json_loose::{loads_loose, validate_plan_json};
use crate::tools::registry::ToolRegistry;

const MAX_REPAIR_ATTEMPTS: usize = 2;

/// A structured plan produced by the planner, possibly after J's review.
#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub subgoals: Vec<String>,
    pub success_criteria: String,
    pub next_action: String,
    pub args: Value,
    pub expected_observation: String,
    pub rationale: String,
    pub tool_chain: Option<Vec<String>>,
    pub confidence: Option<f64>,
}

impl Plan {
    fn from_value(value: Value) -> Self {
        let subgoals = value
            .get("subgoals")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();
        let tool_chain = value
            .get("tool_chain")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect());
        let confidence = value.get("confidence").and_then(Value::as_f64).map(|c| c.clamp(0.0, 1.0));

        Plan {
            subgoals,
            success_criteria: value
                .get("success_criteria")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            next_action: value
                .get("next_action")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            args: value.get("args").cloned().unwrap_or_else(|| json!({})),
            expected_observation: value
                .get("expected_observation")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            rationale: value
                .get("rationale")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            tool_chain,
            confidence,
        }
    }

    /// Fixed plan returned when the model could not be coaxed into a valid
    /// structured response after all repair attempts.
    pub fn fallback() -> Self {
        Plan::from_value(json!({
            "subgoals": ["Understand the request", "Run an analysis pass"],
            "success_criteria": "Produce a best-effort summary of available information",
            "next_action": "analyze",
            "args": {"observations": []},
            "expected_observation": "Textual summary",
            "rationale": "Planner could not produce a valid plan after repair attempts",
        }))
    }
}

/// Small static table mapping a coarse goal type to a suggested tool chain.
fn suggest_tool_chain(goal: &str) -> Option<Vec<String>> {
    let lower = goal.to_lowercase();
    let chain: &[&str] = if lower.contains("count") {
        &["count_files", "analyze"]
    } else if lower.contains("find") || lower.contains("search") && lower.contains("file") {
        &["list_files", "analyze"]
    } else if lower.contains("compare") {
        &["list_files", "read_file", "analyze"]
    } else if lower.contains("research") || lower.contains("investigate") {
        &["duckduckgo_search", "web_get", "analyze"]
    } else if lower.contains("read") {
        &["read_file", "analyze"]
    } else if lower.contains("list") {
        &["list_files"]
    } else {
        return None;
    };
    Some(chain.iter().map(|s| s.to_string()).collect())
}

fn build_prompt(goal: &str, context: &str, failed_attempts: &str, tool_catalog: &str, prior_error: Option<&str>) -> String {
    let mut prompt = format!(
        "Goal: {goal}\n\nContext so far:\n{context}\n\nFailed attempts to avoid repeating:\n{failed_attempts}\n\n\
         Available tools:\n{tool_catalog}\n\n\
         Produce a JSON plan object with fields: subgoals (array of 2-7 strings), \
         success_criteria (string), next_action (tool name or empty string), \
         args (object, or an array of 2+ objects for a batch call), \
         expected_observation (string describing the expected shape of the result), \
         rationale (string)."
    );
    if let Some(err) = prior_error {
        prompt.push_str(&format!("\n\nThe previous attempt failed to parse: {err}\nPlease respond with valid JSON only."));
    }
    prompt
}

/// Generate a plan for `goal`, retrying up to [`MAX_REPAIR_ATTEMPTS`] times
/// on parse/validation failure before falling back to a fixed plan whose
/// `next_action` is the `analyze` tool.
pub async fn generate_plan(
    goal: &str,
    context: &str,
    failed_attempts: &str,
    tools: &ToolRegistry,
    client: &FallbackClient,
) -> Plan {
    let tool_catalog = tools
        .names()
        .iter()
        .map(|n| format!("- {n}"))
        .collect::<Vec<_>>()
        .join("\n");

    let mut prior_error: Option<String> = None;

    for attempt in 0..=MAX_REPAIR_ATTEMPTS {
        let prompt = build_prompt(goal, context, failed_attempts, &tool_catalog, prior_error.as_deref());

        let outcome = match client.call_with_fallback(&prompt, 3).await {
            Ok(o) => o,
            Err(e) => {
                prior_error = Some(e.to_string());
                tracing::warn!(attempt, error = %e, "planner LLM call failed");
                continue;
            }
        };

        let parsed = match loads_loose(&outcome.response_text) {
            Ok(p) => p,
            Err(e) => {
                prior_error = Some(e.to_string());
                continue;
            }
        };

        let validated = validate_plan_json(parsed.value);
        let mut plan = Plan::from_value(validated);
        if plan.tool_chain.is_none() {
            plan.tool_chain = suggest_tool_chain(goal);
        }
        return plan;
    }

    tracing::warn!(goal, "planner exhausted repair attempts, using fixed fallback plan");
    Plan::fallback()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_plan_targets_analyze_tool() {
        let plan = Plan::fallback();
        assert_eq!(plan.next_action, "analyze");
        assert!(plan.subgoals.len() >= 2);
    }

    #[test]
    fn tool_chain_suggestion_for_counting_goal() {
        let chain = suggest_tool_chain("count the files on my desktop").unwrap();
        assert_eq!(chain[0], "count_files");
    }

    #[test]
    fn tool_chain_suggestion_absent_for_unrecognized_goal() {
        assert!(suggest_tool_chain("do a backflip").is_none());
    }

    #[test]
    fn plan_from_value_clamps_confidence() {
        let plan = Plan::from_value(json!({"confidence": 3.0}));
        assert_eq!(plan.confidence, Some(1.0));
    }
}
