//! Tolerant structured-text parser for LLM responses
//!
//! LLMs asked to emit JSON routinely wrap it in prose, fence it in markdown,
//! or make small syntactic mistakes. This ladder tries progressively more
//! aggressive repairs before giving up and degrading to a fallback plan, so
//! the control loop can keep making progress instead of failing the step.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{json, Value};

use crate::error::{Error, Result};

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").unwrap());
static TRAILING_COMMA: LazyLock<Regex> = LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());
static BARE_KEY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(\w+)(\s*:)").unwrap());

/// Marks which rung of the repair ladder produced the parsed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStrategy {
    Direct,
    CodeFence,
    BalancedBraces,
    RepairRewrite,
    Fallback,
}

/// Result of a loose parse: the value plus which strategy produced it.
#[derive(Debug, Clone)]
pub struct LooseParse {
    pub value: Value,
    pub strategy: ParseStrategy,
}

/// Parse `text` as JSON, trying direct parse, code-fence stripping, a
/// balanced-brace scan, then syntax repairs, before falling back to a
/// degraded placeholder plan. Never errors — a caller that needs to know
/// whether degradation occurred should inspect `strategy`.
pub fn loads_loose(text: &str) -> Result<LooseParse> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(Error::JsonParseError("empty or whitespace-only input".into()));
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok(LooseParse {
            value,
            strategy: ParseStrategy::Direct,
        });
    }

    if trimmed.contains("```") {
        if let Some(caps) = CODE_FENCE.captures(trimmed) {
            let inner = caps.get(1).map(|m| m.as_str()).unwrap_or("").trim();
            if let Ok(value) = serde_json::from_str::<Value>(inner) {
                return Ok(LooseParse {
                    value,
                    strategy: ParseStrategy::CodeFence,
                });
            }
        }
    }

    if let Some(slice) = extract_balanced_braces(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(&slice) {
            return Ok(LooseParse {
                value,
                strategy: ParseStrategy::BalancedBraces,
            });
        }
    }

    let repaired = repair_rewrite(trimmed);
    if let Ok(value) = serde_json::from_str::<Value>(&repaired) {
        return Ok(LooseParse {
            value,
            strategy: ParseStrategy::RepairRewrite,
        });
    }

    tracing::warn!(
        preview = %trimmed.chars().take(200).collect::<String>(),
        "json parse failed after all repair strategies, falling back"
    );
    Ok(LooseParse {
        value: fallback_plan(),
        strategy: ParseStrategy::Fallback,
    })
}

/// Scan for the first balanced `{...}` span and return it verbatim.
fn extract_balanced_braces(text: &str) -> Option<String> {
    let mut depth = 0i32;
    let mut start = None;
    for (i, c) in text.char_indices() {
        match c {
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start {
                        return Some(text[s..=i].to_string());
                    }
                }
            }
            _ => {}
        }
    }
    None
}

/// Rewrite common LLM JSON mistakes: trailing commas, bare keys, single quotes.
fn repair_rewrite(text: &str) -> String {
    let fixed = TRAILING_COMMA.replace_all(text, "$1");
    let fixed = BARE_KEY.replace_all(&fixed, "\"$1\"$2");
    fixed.replace('\'', "\"")
}

fn fallback_plan() -> Value {
    json!({
        "subgoals": ["Understand the request", "Execute the task", "Provide results"],
        "success_criteria": "Complete the requested task",
        "next_action": "count_files",
        "args": {"dir": "~/Desktop", "limit": 0},
        "expected_observation": "Dictionary with count key",
        "rationale": "Fallback plan due to JSON parsing error"
    })
}

/// Fill in missing/mistyped fields of a plan object and clamp subgoal count
/// to the 2-7 range the control loop expects.
pub fn validate_plan_json(mut data: Value) -> Value {
    let obj = match data.as_object_mut() {
        Some(o) => o,
        None => return fallback_plan(),
    };

    if !matches!(obj.get("subgoals"), Some(Value::Array(_))) {
        obj.insert(
            "subgoals".into(),
            json!(["Complete the task", "Verify results"]),
        );
    }
    for field in ["success_criteria", "next_action", "expected_observation", "rationale"] {
        match obj.get(field) {
            Some(Value::String(_)) => {}
            Some(other) => {
                obj.insert(field.into(), Value::String(other.to_string()));
            }
            None => {
                obj.insert(field.into(), Value::String(String::new()));
            }
        }
    }
    if !matches!(obj.get("args"), Some(Value::Object(_))) {
        obj.insert("args".into(), json!({}));
    }

    if let Some(Value::Array(subgoals)) = obj.get_mut("subgoals") {
        if subgoals.len() < 2 {
            subgoals.push(Value::String("Complete the task".into()));
            subgoals.push(Value::String("Verify results".into()));
        } else if subgoals.len() > 7 {
            subgoals.truncate(7);
        }
    }

    data
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_parse_succeeds_on_clean_json() {
        let parsed = loads_loose(r#"{"a": 1}"#).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Direct);
    }

    #[test]
    fn strips_markdown_code_fence() {
        let text = "Here you go:\n```json\n{\"a\": 1}\n```";
        let parsed = loads_loose(text).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::CodeFence);
        assert_eq!(parsed.value["a"], 1);
    }

    #[test]
    fn extracts_balanced_object_from_prose() {
        let text = "Sure, here's the plan: {\"a\": 1} Hope that helps!";
        let parsed = loads_loose(text).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::BalancedBraces);
    }

    #[test]
    fn repairs_trailing_comma_and_bare_keys() {
        let text = "{a: 1, b: 2,}";
        let parsed = loads_loose(text).unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::RepairRewrite);
        assert_eq!(parsed.value["a"], 1);
        assert_eq!(parsed.value["b"], 2);
    }

    #[test]
    fn falls_back_when_unrecoverable() {
        let parsed = loads_loose("not json at all and no braces").unwrap();
        assert_eq!(parsed.strategy, ParseStrategy::Fallback);
        assert_eq!(parsed.value["next_action"], "count_files");
    }

    #[test]
    fn empty_input_errors() {
        let err = loads_loose("   ").unwrap_err();
        assert!(matches!(err, Error::JsonParseError(_)));
    }

    #[test]
    fn validate_plan_json_fills_missing_fields() {
        let filled = validate_plan_json(json!({"next_action": "read_file"}));
        assert_eq!(filled["next_action"], "read_file");
        assert!(filled["subgoals"].as_array().unwrap().len() >= 2);
        assert!(filled["args"].is_object());
    }

    #[test]
    fn validate_plan_json_clamps_too_many_subgoals() {
        let subgoals: Vec<Value> = (0..10).map(|i| Value::String(format!("step {i}"))).collect();
        let filled = validate_plan_json(json!({"subgoals": subgoals}));
        assert_eq!(filled["subgoals"].as_array().unwrap().len(), 7);
    }
}
