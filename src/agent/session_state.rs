//! Per-session agent state with loop-safety bookkeeping
//!
//! Tracks the blackboard, recent observations, the full step ledger,
//! duplicate-attempt suppression, and retry budgets for a single running
//! goal. Bounded collections cap memory per session regardless of how long
//! the control loop runs.

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

const MAX_FACTS: usize = 50;
const MAX_OBS: usize = 8;
const MAX_CONFIDENCE_TREND: usize = 10;
const NO_PROGRESS_STRATEGY_SWITCH_THRESHOLD: u32 = 3;
const DEFAULT_RETRY_BUDGET: u32 = 1;

/// Status of a single ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Error,
    Mismatch,
    NoProgress,
    DuplicateBlocked,
}

/// A single recorded step in a session's execution history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub step: u32,
    pub action: String,
    pub args: Value,
    pub args_key: String,
    pub expected: String,
    pub status: StepStatus,
    pub obs_signature: String,
    pub error_class: Option<String>,
    #[serde(default)]
    pub notes: String,
    pub timestamp: f64,
}

/// Per-session agent state.
pub struct SessionState {
    pub session_id: String,
    blackboard_facts: VecDeque<String>,
    last_obs: VecDeque<String>,
    step_ledger: Vec<LedgerEntry>,
    attempt_set: HashSet<String>,
    confidence_trend: VecDeque<f64>,
    pub no_progress_count: u32,
    pub strategy_switches: u32,
    retry_budgets: std::collections::HashMap<String, u32>,
    pub total_steps: u32,
    start_time: Instant,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        SessionState {
            session_id: session_id.into(),
            blackboard_facts: VecDeque::new(),
            last_obs: VecDeque::new(),
            step_ledger: Vec::new(),
            attempt_set: HashSet::new(),
            confidence_trend: VecDeque::new(),
            no_progress_count: 0,
            strategy_switches: 0,
            retry_budgets: std::collections::HashMap::new(),
            total_steps: 0,
            start_time: Instant::now(),
        }
    }

    /// Build a stable `action_<hash>` key: path-bearing args are expanded
    /// and resolved before hashing so `~/x` and `/home/u/x` canonicalize
    /// to the same key.
    pub fn canonicalize_args(action: &str, args: &Value) -> String {
        let canonical = canonicalize_args_value(args);
        let sorted = serde_json::to_string(&sort_keys(&canonical)).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(sorted.as_bytes());
        let digest = hasher.finalize();
        let short: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
        format!("{action}_{short}")
    }

    pub fn is_duplicate_attempt(&self, action: &str, args: &Value) -> bool {
        self.attempt_set.contains(&Self::canonicalize_args(action, args))
    }

    pub fn mark_attempt(&mut self, action: &str, args: &Value, success: bool) {
        let key = Self::canonicalize_args(action, args);
        if success {
            self.attempt_set.remove(&key);
        } else {
            self.attempt_set.insert(key);
        }
    }

    pub fn add_ledger_entry(&mut self, entry: LedgerEntry) {
        match entry.status {
            StepStatus::NoProgress => self.no_progress_count += 1,
            StepStatus::Ok => self.no_progress_count = 0,
            _ => {}
        }
        self.step_ledger.push(entry);
        self.total_steps += 1;
    }

    pub fn step_ledger(&self) -> &[LedgerEntry] {
        &self.step_ledger
    }

    /// Snapshot of the currently-failed-and-not-yet-retried attempt keys,
    /// for handing to the batch executor's pre-check pass.
    pub fn attempt_keys(&self) -> &HashSet<String> {
        &self.attempt_set
    }

    pub fn add_observation(&mut self, obs: impl Into<String>) {
        self.last_obs.push_back(obs.into());
        while self.last_obs.len() > MAX_OBS {
            self.last_obs.pop_front();
        }
    }

    pub fn last_obs(&self) -> impl Iterator<Item = &String> {
        self.last_obs.iter()
    }

    pub fn add_fact(&mut self, fact: impl Into<String>) {
        let fact = fact.into();
        if fact.is_empty() || self.blackboard_facts.contains(&fact) {
            return;
        }
        self.blackboard_facts.push_back(fact);
        while self.blackboard_facts.len() > MAX_FACTS {
            self.blackboard_facts.pop_front();
        }
    }

    pub fn facts(&self) -> impl Iterator<Item = &String> {
        self.blackboard_facts.iter()
    }

    pub fn update_confidence(&mut self, confidence: f64) {
        self.confidence_trend.push_back(confidence);
        while self.confidence_trend.len() > MAX_CONFIDENCE_TREND {
            self.confidence_trend.pop_front();
        }
    }

    pub fn confidence_trend(&self) -> Vec<f64> {
        self.confidence_trend.iter().copied().collect()
    }

    pub fn get_retry_budget(&mut self, action: &str) -> u32 {
        *self
            .retry_budgets
            .entry(action.to_string())
            .or_insert(DEFAULT_RETRY_BUDGET)
    }

    pub fn decrement_retry_budget(&mut self, action: &str) {
        if let Some(budget) = self.retry_budgets.get_mut(action) {
            *budget = budget.saturating_sub(1);
        }
    }

    pub fn should_switch_strategy(&self) -> bool {
        self.no_progress_count >= NO_PROGRESS_STRATEGY_SWITCH_THRESHOLD
    }

    pub fn reset_no_progress(&mut self) {
        self.no_progress_count = 0;
        self.strategy_switches += 1;
    }

    /// Compressed context for feeding back to the LLM: recent observations,
    /// recent facts, and recent failures, clipped to `max_chars`.
    pub fn context_summary(&self, max_chars: usize) -> String {
        let mut parts = Vec::new();

        if !self.last_obs.is_empty() {
            let recent: Vec<&String> = self.last_obs.iter().rev().take(3).collect();
            let lines: Vec<String> = recent.into_iter().rev().map(|o| format!("- {o}")).collect();
            parts.push(format!("Recent observations:\n{}", lines.join("\n")));
        }

        if !self.blackboard_facts.is_empty() {
            let recent: Vec<&String> = self.blackboard_facts.iter().rev().take(5).collect();
            let lines: Vec<String> = recent.into_iter().rev().map(|f| format!("- {f}")).collect();
            parts.push(format!("Key facts:\n{}", lines.join("\n")));
        }

        let failures: Vec<&LedgerEntry> = self
            .step_ledger
            .iter()
            .rev()
            .take(5)
            .filter(|e| matches!(e.status, StepStatus::Error | StepStatus::DuplicateBlocked))
            .collect();
        if !failures.is_empty() {
            let lines: Vec<String> = failures
                .into_iter()
                .rev()
                .map(|e| {
                    format!(
                        "- {}({}): {}",
                        e.action,
                        e.args_key,
                        e.error_class.as_deref().unwrap_or("unknown")
                    )
                })
                .collect();
            parts.push(format!("Recent failures:\n{}", lines.join("\n")));
        }

        let full = parts.join("\n\n");
        if full.chars().count() > max_chars {
            let clipped: String = full.chars().take(max_chars).collect();
            format!("{clipped}... [context clipped]")
        } else {
            full
        }
    }

    pub fn duration_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }
}

fn canonicalize_args_value(args: &Value) -> Value {
    let Some(obj) = args.as_object() else {
        return args.clone();
    };
    let mut out = serde_json::Map::new();
    for (key, value) in obj {
        if matches!(key.as_str(), "dir" | "path" | "file") {
            if let Some(s) = value.as_str() {
                out.insert(key.clone(), Value::String(expand_and_resolve(s)));
                continue;
            }
        }
        out.insert(key.clone(), value.clone());
    }
    Value::Object(out)
}

fn expand_and_resolve(raw: &str) -> String {
    let expanded = if let Some(rest) = raw.strip_prefix("~/") {
        dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| Path::new(raw).to_path_buf())
    } else {
        Path::new(raw).to_path_buf()
    };
    expanded
        .canonicalize()
        .unwrap_or(expanded)
        .to_string_lossy()
        .into_owned()
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted = serde_json::Map::new();
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            for k in keys {
                sorted.insert(k.clone(), sort_keys(&map[k]));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        other => other.clone(),
    }
}

/// Build a short signature describing the shape of an observation, used to
/// detect whether a tool's result matched the planner's expectation.
pub fn create_observation_signature(observation: &Value) -> String {
    match observation {
        Value::Null => "null".to_string(),
        Value::Array(items) => format!("list[len={},keys={}]", items.len(), list_keys(items)),
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let preview: Vec<&str> = keys.iter().take(5).map(|s| s.as_str()).collect();
            format!("dict[keys={}]", preview.join(","))
        }
        Value::String(s) => {
            let lower = s.to_lowercase();
            if lower.contains("error") || lower.contains("failed") {
                format!("str[len={},error=true]", s.chars().count())
            } else {
                format!("str[len={}]", s.chars().count())
            }
        }
        Value::Number(n) => format!("number[value={n}]"),
        Value::Bool(b) => format!("bool[value={b}]"),
    }
}

fn list_keys(items: &[Value]) -> String {
    if items.is_empty() {
        return "empty".to_string();
    }
    let Some(first) = items[0].as_object() else {
        return "mixed".to_string();
    };
    let mut common: HashSet<String> = first.keys().cloned().collect();
    for item in items.iter().take(5).skip(1) {
        match item.as_object() {
            Some(obj) => {
                let keys: HashSet<String> = obj.keys().cloned().collect();
                common = common.intersection(&keys).cloned().collect();
            }
            None => {
                common.clear();
                break;
            }
        }
    }
    if common.is_empty() {
        "mixed".to_string()
    } else {
        let mut sorted: Vec<String> = common.into_iter().collect();
        sorted.sort();
        sorted.join("|")
    }
}

/// Wall-clock seconds since the epoch, for ledger timestamps.
pub fn unix_timestamp() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonicalize_args_is_order_independent() {
        let a = json!({"dir": "/tmp", "limit": 5});
        let b = json!({"limit": 5, "dir": "/tmp"});
        assert_eq!(
            SessionState::canonicalize_args("list_files", &a),
            SessionState::canonicalize_args("list_files", &b)
        );
    }

    #[test]
    fn duplicate_attempts_are_tracked_until_success() {
        let mut state = SessionState::new("s1");
        let args = json!({"dir": "/tmp"});
        assert!(!state.is_duplicate_attempt("list_files", &args));
        state.mark_attempt("list_files", &args, false);
        assert!(state.is_duplicate_attempt("list_files", &args));
        state.mark_attempt("list_files", &args, true);
        assert!(!state.is_duplicate_attempt("list_files", &args));
    }

    #[test]
    fn facts_are_bounded_and_deduplicated() {
        let mut state = SessionState::new("s1");
        for i in 0..60 {
            state.add_fact(format!("fact-{i}"));
        }
        assert_eq!(state.facts().count(), MAX_FACTS);
        state.add_fact("fact-59");
        assert_eq!(state.facts().count(), MAX_FACTS);
    }

    #[test]
    fn observations_are_bounded() {
        let mut state = SessionState::new("s1");
        for i in 0..20 {
            state.add_observation(format!("obs-{i}"));
        }
        assert_eq!(state.last_obs().count(), MAX_OBS);
    }

    #[test]
    fn no_progress_triggers_strategy_switch_at_threshold() {
        let mut state = SessionState::new("s1");
        for _ in 0..3 {
            state.add_ledger_entry(LedgerEntry {
                step: 0,
                action: "a".into(),
                args: json!({}),
                args_key: "a_1".into(),
                expected: "".into(),
                status: StepStatus::NoProgress,
                obs_signature: "".into(),
                error_class: None,
                notes: "".into(),
                timestamp: 0.0,
            });
        }
        assert!(state.should_switch_strategy());
        state.reset_no_progress();
        assert!(!state.should_switch_strategy());
        assert_eq!(state.strategy_switches, 1);
    }

    #[test]
    fn retry_budget_defaults_to_one_and_decrements() {
        let mut state = SessionState::new("s1");
        assert_eq!(state.get_retry_budget("read_file"), 1);
        state.decrement_retry_budget("read_file");
        assert_eq!(state.get_retry_budget("read_file"), 0);
        state.decrement_retry_budget("read_file");
        assert_eq!(state.get_retry_budget("read_file"), 0);
    }

    #[test]
    fn observation_signature_flags_error_strings() {
        assert_eq!(
            create_observation_signature(&json!("it failed badly")),
            "str[len=15,error=true]"
        );
    }

    #[test]
    fn observation_signature_describes_list_shape() {
        let sig = create_observation_signature(&json!([{"a": 1, "b": 2}, {"a": 3, "b": 4}]));
        assert_eq!(sig, "list[len=2,keys=a|b]");
    }

    #[test]
    fn context_summary_clips_to_max_chars() {
        let mut state = SessionState::new("s1");
        for i in 0..10 {
            state.add_observation("x".repeat(500) + &i.to_string());
        }
        let summary = state.context_summary(100);
        assert!(summary.chars().count() <= 100 + "... [context clipped]".chars().count());
    }
}
