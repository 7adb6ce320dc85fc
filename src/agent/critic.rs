//! Plan critic: rule-based fast path plus an optional fail-open LLM pass
//!
//! The critic never mutates a plan; it returns a verdict the control loop
//! may choose to act on.

use serde::Serialize;
use serde_json::Value;

use crate::agent::fallback_client::FallbackClient;
use crate::agent::json_loose::loads_loose;
use crate::tools::registry::ToolRegistry;

/// The critic's verdict on a proposed plan.
#[derive(Debug, Clone, Serialize)]
pub struct CriticVerdict {
    pub approved: bool,
    pub changes: Vec<String>,
    pub reasoning: String,
}

/// Rule-based fast path: approve a known, enabled, non-destructive tool
/// call with an object-shaped `args`; reject unknown tools by name.
pub fn rule_based_review(next_action: &str, args: &Value, tools: &ToolRegistry) -> CriticVerdict {
    if next_action.is_empty() {
        return CriticVerdict {
            approved: true,
            changes: Vec::new(),
            reasoning: "no tool action requested".to_string(),
        };
    }

    if !tools.contains(next_action) {
        return CriticVerdict {
            approved: false,
            changes: vec![format!("Unknown tool: {next_action}")],
            reasoning: format!("{next_action} is not registered"),
        };
    }

    let policy = tools.policy(next_action).cloned().unwrap_or_default();
    if !policy.enabled {
        return CriticVerdict {
            approved: false,
            changes: vec![format!("Tool disabled: {next_action}")],
            reasoning: format!("{next_action} is disabled by policy"),
        };
    }

    if policy.destructive {
        let confirmed = args.get("confirm").and_then(Value::as_bool).unwrap_or(false);
        if !confirmed {
            return CriticVerdict {
                approved: false,
                changes: vec![format!("{next_action} requires confirm=true")],
                reasoning: "destructive call missing confirmation".to_string(),
            };
        }
    }

    if !args.is_object() && !args.is_array() {
        return CriticVerdict {
            approved: false,
            changes: vec!["args must be an object or a list of objects".to_string()],
            reasoning: "malformed args shape".to_string(),
        };
    }

    CriticVerdict {
        approved: true,
        changes: Vec::new(),
        reasoning: "known, enabled, non-destructive (or confirmed) tool with valid args".to_string(),
    }
}

/// Optional richer review via the LLM fallback chain. Any failure — network,
/// parse, or otherwise — defaults to fail-open approve, per spec §4.J.
pub async fn llm_review(
    goal: &str,
    plan_summary: &str,
    client: &FallbackClient,
) -> CriticVerdict {
    let prompt = format!(
        "Review this plan for safety and relevance to the goal.\nGoal: {goal}\nPlan: {plan_summary}\n\
         Respond with JSON: {{\"approved\": bool, \"changes\": [string], \"reasoning\": string}}"
    );

    let outcome = match client.call_with_fallback(&prompt, 3).await {
        Ok(o) => o,
        Err(e) => {
            return CriticVerdict {
                approved: true,
                changes: Vec::new(),
                reasoning: format!("critic LLM call failed, fail-open approve: {e}"),
            };
        }
    };

    let parsed = match loads_loose(&outcome.response_text) {
        Ok(p) => p,
        Err(e) => {
            return CriticVerdict {
                approved: true,
                changes: Vec::new(),
                reasoning: format!("critic response unparsable, fail-open approve: {e}"),
            };
        }
    };

    let approved = parsed.value.get("approved").and_then(Value::as_bool).unwrap_or(true);
    let changes = parsed
        .value
        .get("changes")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
        .unwrap_or_default();
    let reasoning = parsed
        .value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    CriticVerdict {
        approved,
        changes,
        reasoning,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::ToolPolicy;
    use crate::tools::traits::{Tool, ToolResult};
    use serde_json::json;

    struct StubTool;

    #[async_trait::async_trait]
    impl Tool for StubTool {
        fn name(&self) -> &str {
            "list_files"
        }
        fn description(&self) -> &str {
            "stub"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, _args: Value) -> crate::error::Result<ToolResult> {
            Ok(ToolResult::success(""))
        }
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let tools = ToolRegistry::new();
        let verdict = rule_based_review("nonexistent_tool", &json!({}), &tools);
        assert!(!verdict.approved);
        assert!(verdict.changes[0].contains("Unknown tool"));
    }

    #[test]
    fn known_non_destructive_tool_is_approved() {
        let mut tools = ToolRegistry::new();
        tools.register(StubTool);
        let verdict = rule_based_review("list_files", &json!({"dir": "~"}), &tools);
        assert!(verdict.approved);
    }

    #[test]
    fn destructive_without_confirm_is_rejected() {
        let mut tools = ToolRegistry::new();
        tools.register_with_policy(
            StubTool,
            ToolPolicy {
                destructive: true,
                require_confirm: true,
                ..ToolPolicy::default()
            },
        );
        let verdict = rule_based_review("list_files", &json!({"dir": "~"}), &tools);
        assert!(!verdict.approved);
    }

    #[test]
    fn destructive_with_confirm_is_approved() {
        let mut tools = ToolRegistry::new();
        tools.register_with_policy(
            StubTool,
            ToolPolicy {
                destructive: true,
                require_confirm: true,
                ..ToolPolicy::default()
            },
        );
        let verdict = rule_based_review("list_files", &json!({"dir": "~", "confirm": true}), &tools);
        assert!(verdict.approved);
    }

    #[test]
    fn empty_next_action_is_approved_without_tool_lookup() {
        let tools = ToolRegistry::new();
        let verdict = rule_based_review("", &json!({}), &tools);
        assert!(verdict.approved);
    }
}
