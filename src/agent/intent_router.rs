//! Intent classification and direct-action resolution
//!
//! A pure function of the goal string: no I/O, no LLM call. Priority-ordered
//! phrase matching decides whether a goal should bypass tools entirely
//! (conversational), resolve to one obvious tool call (direct action), or
//! enter the full plan/critique/execute/observe/verify loop (agent task).
//!
//! Phrase lists are documented and versioned in DESIGN.md.

use serde_json::{json, Value};

const ACTION_VERBS: &[&str] = &[
    "count", "list", "find", "delete", "create", "read", "check", "show", "get", "search",
];

const SYSTEM_TARGETS: &[&str] = &[
    "file",
    "folder",
    "directory",
    "document",
    "desktop",
    "home",
    "~/",
    "/users/",
    "my computer",
    "my documents",
    "my downloads",
    "in my",
    "on my",
];

const MULTI_STEP_MARKERS: &[&str] = &[
    "and then",
    "after that",
    "followed by",
    "next",
    "analyze and",
    "compare",
    "research",
    "investigate",
    "compile",
];

const KNOWLEDGE_MARKERS: &[&str] = &[
    "what is",
    "what are",
    "who is",
    "who was",
    "who are",
    "when did",
    "when was",
    "when is",
    "where is",
    "where are",
    "why does",
    "why is",
    "why are",
    "how does",
    "how do",
    "explain",
    "define",
    "describe",
    "tell me about",
    "how many",
    "capital of",
];

/// Coarse routing decision for a goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Conversational,
    DirectAction,
    AgentTask,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Conversational => "conversational",
            Intent::DirectAction => "direct_action",
            Intent::AgentTask => "agent_task",
        }
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

fn has_system_target(lower: &str) -> bool {
    contains_any(lower, SYSTEM_TARGETS)
}

/// Classify `goal` into one of the three coarse intents, in spec's priority
/// order: direct-action pattern, then multi-step marker, then knowledge
/// marker or trailing `?`, defaulting to direct-action.
pub fn route(goal: &str) -> Intent {
    let lower = goal.to_lowercase();

    if contains_any(&lower, ACTION_VERBS) && has_system_target(&lower) {
        return Intent::DirectAction;
    }

    if contains_any(&lower, MULTI_STEP_MARKERS) {
        return Intent::AgentTask;
    }

    if contains_any(&lower, KNOWLEDGE_MARKERS) && !has_system_target(&lower) {
        return Intent::Conversational;
    }

    if lower.trim_end().ends_with('?') && !has_system_target(&lower) {
        return Intent::Conversational;
    }

    Intent::DirectAction
}

/// Infer a sandbox-relative directory from common phrasing, or an explicit
/// path if one is present in the goal.
fn infer_path(lower: &str) -> String {
    if let Some(idx) = lower.find("~/") {
        let rest: String = lower[idx..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .collect();
        return rest;
    }
    if let Some(idx) = lower.find("/users/") {
        let rest: String = lower[idx..]
            .chars()
            .take_while(|c| !c.is_whitespace())
            .collect();
        return rest;
    }
    if lower.contains("desktop") {
        "~/Desktop".to_string()
    } else if lower.contains("downloads") {
        "~/Downloads".to_string()
    } else if lower.contains("documents") {
        "~/Documents".to_string()
    } else {
        "~".to_string()
    }
}

/// Resolve a direct-action goal to a single `(tool_name, args)` pair.
/// Called only after [`route`] has classified the goal as `DirectAction`.
pub fn resolve_direct_action(goal: &str) -> (String, Value) {
    let lower = goal.to_lowercase();
    let path = infer_path(&lower);

    if lower.contains("count") && lower.contains("folder") || lower.contains("count") && lower.contains("director") {
        return ("count_dirs".to_string(), json!({"dir": path, "limit": 0}));
    }
    if lower.contains("count") {
        return ("count_files".to_string(), json!({"dir": path, "limit": 0}));
    }
    if lower.contains("delete") {
        return (
            "delete_files".to_string(),
            json!({"dir": path, "confirm": false}),
        );
    }
    if lower.contains("read") {
        return ("read_file".to_string(), json!({"path": path, "offset": 0, "length": 65536}));
    }
    if lower.contains("list") || lower.contains("find") || lower.contains("show") || lower.contains("get") || lower.contains("check") {
        return ("list_files".to_string(), json!({"dir": path, "limit": 0}));
    }
    if lower.contains("search") {
        return (
            "duckduckgo_search".to_string(),
            json!({"query": goal.trim(), "limit": 5}),
        );
    }

    ("list_files".to_string(), json!({"dir": path, "limit": 0}))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn count_on_desktop_is_direct_action() {
        assert_eq!(route("count files on my Desktop"), Intent::DirectAction);
        let (tool, args) = resolve_direct_action("count files on my Desktop");
        assert_eq!(tool, "count_files");
        assert_eq!(args["dir"], "~/Desktop");
    }

    #[test]
    fn knowledge_question_is_conversational() {
        assert_eq!(
            route("What is the capital of France?"),
            Intent::Conversational
        );
    }

    #[test]
    fn multi_step_goal_is_agent_task() {
        assert_eq!(
            route("List files then analyze the largest"),
            Intent::AgentTask
        );
    }

    #[test]
    fn trailing_question_mark_without_system_target_is_conversational() {
        assert_eq!(route("Is Rust memory safe?"), Intent::Conversational);
    }

    #[test]
    fn system_target_overrides_trailing_question_mark() {
        // Contains a system target, so the knowledge/question path is skipped.
        assert_eq!(
            route("can you check my home directory?"),
            Intent::DirectAction
        );
    }

    #[test]
    fn ambiguous_goal_defaults_to_direct_action() {
        assert_eq!(route("do something useful"), Intent::DirectAction);
    }

    #[test]
    fn destructive_direct_action_defaults_confirm_false() {
        let (tool, args) = resolve_direct_action("delete files in my downloads");
        assert_eq!(tool, "delete_files");
        assert_eq!(args["confirm"], false);
    }
}
