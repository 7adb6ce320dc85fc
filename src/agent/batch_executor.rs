//! Parallel batch tool executor with pre-validation safety checks
//!
//! Tool calls are async `Tool::execute` futures, so concurrency is bounded
//! by a `tokio::sync::Semaphore` rather than a thread pool.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::Semaphore;

use crate::agent::error_class::ErrorClass;
use crate::agent::session_state::create_observation_signature;
use crate::error::{Error, Result};
use crate::tools::registry::ToolRegistry;

pub const MAX_BATCH_SIZE: usize = 10;
const DEFAULT_CONCURRENCY: usize = 4;
const DEFAULT_DEADLINE_SECS: u64 = 60;
const MERGE_CHAR_BUDGET: usize = 4000;

/// One task submitted to the batch executor.
#[derive(Debug, Clone)]
pub struct BatchTask {
    pub idx: usize,
    pub tool_name: String,
    pub args: Value,
    pub args_key: String,
}

/// Result of running (or pre-rejecting) one task, indexed by its input
/// position so callers can reassemble output order regardless of completion
/// order.
#[derive(Debug, Clone)]
pub struct BatchTaskResult {
    pub idx: usize,
    pub success: bool,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub error_class: Option<ErrorClass>,
    pub signature: String,
    pub duration_ms: u64,
}

/// Look for a `dir`/`path`/`file` argument to use in the cross-task
/// path-conflict check.
fn path_arg(args: &Value) -> Option<&str> {
    for key in ["dir", "path", "file"] {
        if let Some(s) = args.get(key).and_then(Value::as_str) {
            return Some(s);
        }
    }
    None
}

/// Batch-wide pre-validation: size, destructive-count, duplicate args_keys,
/// and duplicate path arguments across tasks. Does not touch the tool
/// registry or the session's attempt set — see [`pre_check_task`] for that.
pub fn validate_batch_safety(tasks: &[BatchTask], tools: &ToolRegistry) -> Result<()> {
    if tasks.len() > MAX_BATCH_SIZE {
        return Err(Error::BatchValidationError(format!(
            "batch size {} exceeds maximum of {MAX_BATCH_SIZE}",
            tasks.len()
        )));
    }

    let destructive_count = tasks
        .iter()
        .filter(|t| tools.is_destructive(&t.tool_name))
        .count();
    if destructive_count > 1 {
        return Err(Error::BatchValidationError(format!(
            "batch contains {destructive_count} destructive tasks, only 1 allowed"
        )));
    }

    let mut seen_keys = HashSet::new();
    for task in tasks {
        if !seen_keys.insert(&task.args_key) {
            return Err(Error::BatchValidationError(format!(
                "duplicate args_key within batch: {}",
                task.args_key
            )));
        }
    }

    let mut seen_paths = HashSet::new();
    for task in tasks {
        if let Some(p) = path_arg(&task.args) {
            if !seen_paths.insert(p) {
                return Err(Error::BatchValidationError(format!(
                    "duplicate path argument within batch: {p}"
                )));
            }
        }
    }

    Ok(())
}

/// Per-task pre-check against the tool registry and the session's attempt
/// set. Returns `Some(result)` to short-circuit the task without invoking
/// it, or `None` to indicate it should be dispatched.
pub fn pre_check_task(
    task: &BatchTask,
    tools: &ToolRegistry,
    attempt_set: &HashSet<String>,
) -> Option<BatchTaskResult> {
    if !tools.contains(&task.tool_name) {
        return Some(BatchTaskResult {
            idx: task.idx,
            success: false,
            result: None,
            error: Some(format!("unknown tool: {}", task.tool_name)),
            error_class: Some(ErrorClass::UnknownTool),
            signature: "null".to_string(),
            duration_ms: 0,
        });
    }

    if attempt_set.contains(&task.args_key) {
        return Some(BatchTaskResult {
            idx: task.idx,
            success: false,
            result: None,
            error: Some(format!("duplicate attempt: {}", task.args_key)),
            error_class: Some(ErrorClass::DuplicateBlocked),
            signature: "null".to_string(),
            duration_ms: 0,
        });
    }

    None
}

/// Execute the surviving tasks concurrently on a bounded worker pool under a
/// single deadline for the whole batch, then reassemble results by index.
pub async fn execute_batch(
    tasks: Vec<BatchTask>,
    tools: Arc<ToolRegistry>,
    attempt_set: &HashSet<String>,
) -> Vec<BatchTaskResult> {
    execute_batch_with(
        tasks,
        tools,
        attempt_set,
        DEFAULT_CONCURRENCY,
        Duration::from_secs(DEFAULT_DEADLINE_SECS),
    )
    .await
}

pub async fn execute_batch_with(
    tasks: Vec<BatchTask>,
    tools: Arc<ToolRegistry>,
    attempt_set: &HashSet<String>,
    concurrency: usize,
    deadline: Duration,
) -> Vec<BatchTaskResult> {
    let mut results: Vec<Option<BatchTaskResult>> = (0..tasks.len()).map(|_| None).collect();
    let mut dispatched = Vec::new();

    for task in tasks {
        if let Some(pre) = pre_check_task(&task, &tools, attempt_set) {
            results[pre.idx] = Some(pre);
        } else {
            dispatched.push(task);
        }
    }

    let semaphore = Arc::new(Semaphore::new(concurrency));
    let run = async {
        let mut handles = Vec::new();
        for task in dispatched {
            let tools = tools.clone();
            let sem = semaphore.clone();
            handles.push(tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.expect("semaphore closed");
                run_one(task, &tools).await
            }));
        }
        let mut out = Vec::new();
        for handle in handles {
            if let Ok(result) = handle.await {
                out.push(result);
            }
        }
        out
    };

    match tokio::time::timeout(deadline, run).await {
        Ok(completed) => {
            for r in completed {
                results[r.idx] = Some(r);
            }
        }
        Err(_) => {
            for slot in results.iter_mut() {
                if slot.is_none() {
                    *slot = Some(BatchTaskResult {
                        idx: 0, // overwritten below
                        success: false,
                        result: None,
                        error: Some("batch deadline exceeded".to_string()),
                        error_class: Some(ErrorClass::Timeout),
                        signature: "null".to_string(),
                        duration_ms: deadline.as_millis() as u64,
                    });
                }
            }
        }
    }

    results
        .into_iter()
        .enumerate()
        .map(|(idx, slot)| {
            let mut r = slot.unwrap_or_else(|| BatchTaskResult {
                idx,
                success: false,
                result: None,
                error: Some("task missing from batch result set".to_string()),
                error_class: Some(ErrorClass::ExecutionError),
                signature: "null".to_string(),
                duration_ms: 0,
            });
            r.idx = idx;
            r
        })
        .collect()
}

async fn run_one(task: BatchTask, tools: &ToolRegistry) -> BatchTaskResult {
    let start = Instant::now();
    let call = crate::tools::ToolCall {
        id: task.idx.to_string(),
        name: task.tool_name.clone(),
        arguments: task.args.clone(),
    };

    match tools.execute(&call).await {
        Ok(outcome) if outcome.success => {
            let value = outcome
                .content
                .as_deref()
                .and_then(|s| serde_json::from_str::<Value>(s).ok())
                .unwrap_or_else(|| Value::String(outcome.content.clone().unwrap_or_default()));
            BatchTaskResult {
                idx: task.idx,
                success: true,
                signature: create_observation_signature(&value),
                result: Some(value),
                error: None,
                error_class: None,
                duration_ms: start.elapsed().as_millis() as u64,
            }
        }
        Ok(outcome) => BatchTaskResult {
            idx: task.idx,
            success: false,
            result: None,
            signature: "null".to_string(),
            error: Some(outcome.error.unwrap_or_else(|| "tool reported failure".into())),
            error_class: Some(ErrorClass::ExecutionError),
            duration_ms: start.elapsed().as_millis() as u64,
        },
        Err(e) => BatchTaskResult {
            idx: task.idx,
            success: false,
            result: None,
            signature: "null".to_string(),
            error_class: Some(ErrorClass::from_error(&e)),
            error: Some(e.to_string()),
            duration_ms: start.elapsed().as_millis() as u64,
        },
    }
}

/// Merge per-task results into a single text observation: a header counting
/// successes, then one line per task, each truncated to a fair share of an
/// overall character budget.
pub fn merge_batch_observations(results: &[BatchTaskResult]) -> String {
    let total = results.len();
    let successes = results.iter().filter(|r| r.success).count();
    let header = format!("Batch execution: {successes}/{total} successful");

    if total == 0 {
        return header;
    }

    let per_task_budget = (MERGE_CHAR_BUDGET / total).max(40);
    let mut lines = vec![header];
    for r in results {
        let body = if r.success {
            r.result
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default()
        } else {
            format!(
                "error({}): {}",
                r.error_class.map(|e| e.as_str()).unwrap_or("unknown"),
                r.error.as_deref().unwrap_or("")
            )
        };
        let clipped: String = body.chars().take(per_task_budget).collect();
        lines.push(format!("[{}] {clipped}", r.idx));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::ToolPolicy;
    use crate::tools::traits::{Tool, ToolResult};
    use serde_json::json;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echo"
        }
        fn parameters_schema(&self) -> Value {
            json!({"type": "object"})
        }
        async fn execute(&self, args: Value) -> Result<ToolResult> {
            Ok(ToolResult::success(args.to_string()))
        }
    }

    fn registry() -> ToolRegistry {
        let mut r = ToolRegistry::new();
        r.register(EchoTool);
        r
    }

    #[test]
    fn rejects_batch_over_ten() {
        let tools = registry();
        let tasks: Vec<BatchTask> = (0..11)
            .map(|i| BatchTask {
                idx: i,
                tool_name: "echo".into(),
                args: json!({"n": i}),
                args_key: format!("echo_{i}"),
            })
            .collect();
        assert!(validate_batch_safety(&tasks, &tools).is_err());
    }

    #[test]
    fn accepts_batch_of_ten() {
        let tools = registry();
        let tasks: Vec<BatchTask> = (0..10)
            .map(|i| BatchTask {
                idx: i,
                tool_name: "echo".into(),
                args: json!({"n": i}),
                args_key: format!("echo_{i}"),
            })
            .collect();
        assert!(validate_batch_safety(&tasks, &tools).is_ok());
    }

    #[test]
    fn rejects_duplicate_args_key_within_batch() {
        let tools = registry();
        let tasks = vec![
            BatchTask { idx: 0, tool_name: "echo".into(), args: json!({}), args_key: "echo_1".into() },
            BatchTask { idx: 1, tool_name: "echo".into(), args: json!({}), args_key: "echo_1".into() },
        ];
        assert!(validate_batch_safety(&tasks, &tools).is_err());
    }

    #[test]
    fn rejects_duplicate_path_within_batch() {
        let tools = registry();
        let tasks = vec![
            BatchTask { idx: 0, tool_name: "echo".into(), args: json!({"dir": "/tmp"}), args_key: "a".into() },
            BatchTask { idx: 1, tool_name: "echo".into(), args: json!({"dir": "/tmp"}), args_key: "b".into() },
        ];
        assert!(validate_batch_safety(&tasks, &tools).is_err());
    }

    #[test]
    fn rejects_more_than_one_destructive_task() {
        let mut tools = ToolRegistry::new();
        tools.register_with_policy(EchoTool, ToolPolicy { destructive: true, ..ToolPolicy::default() });
        let tasks = vec![
            BatchTask { idx: 0, tool_name: "echo".into(), args: json!({}), args_key: "a".into() },
            BatchTask { idx: 1, tool_name: "echo".into(), args: json!({}), args_key: "b".into() },
        ];
        assert!(validate_batch_safety(&tasks, &tools).is_err());
    }

    #[tokio::test]
    async fn unknown_tool_is_precheck_rejected_without_dispatch() {
        let tools = Arc::new(registry());
        let tasks = vec![BatchTask {
            idx: 0,
            tool_name: "nope".into(),
            args: json!({}),
            args_key: "a".into(),
        }];
        let results = execute_batch(tasks, tools, &HashSet::new()).await;
        assert!(!results[0].success);
        assert_eq!(results[0].error_class, Some(ErrorClass::UnknownTool));
    }

    #[tokio::test]
    async fn results_preserve_input_order() {
        let tools = Arc::new(registry());
        let tasks: Vec<BatchTask> = (0..5)
            .map(|i| BatchTask {
                idx: i,
                tool_name: "echo".into(),
                args: json!({"n": i}),
                args_key: format!("echo_{i}"),
            })
            .collect();
        let results = execute_batch(tasks, tools, &HashSet::new()).await;
        for (i, r) in results.iter().enumerate() {
            assert_eq!(r.idx, i);
            assert!(r.success);
        }
    }

    #[tokio::test]
    async fn duplicate_in_attempt_set_is_blocked() {
        let tools = Arc::new(registry());
        let mut attempts = HashSet::new();
        attempts.insert("echo_dup".to_string());
        let tasks = vec![BatchTask {
            idx: 0,
            tool_name: "echo".into(),
            args: json!({}),
            args_key: "echo_dup".into(),
        }];
        let results = execute_batch(tasks, tools, &attempts).await;
        assert_eq!(results[0].error_class, Some(ErrorClass::DuplicateBlocked));
    }

    #[test]
    fn merge_header_counts_successes() {
        let results = vec![
            BatchTaskResult { idx: 0, success: true, result: Some(json!({"a":1})), error: None, error_class: None, signature: "s".into(), duration_ms: 1 },
            BatchTaskResult { idx: 1, success: false, result: None, error: Some("boom".into()), error_class: Some(ErrorClass::ExecutionError), signature: "null".into(), duration_ms: 1 },
        ];
        let merged = merge_batch_observations(&results);
        assert!(merged.starts_with("Batch execution: 1/2 successful"));
    }
}
