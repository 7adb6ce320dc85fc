//! Count files tool

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{Tool, ToolResult};
use crate::error::Result;
use crate::sandbox::PathGuard;

/// Built-in tool: count files in a directory, optionally filtered by substring
pub struct CountFilesTool {
    guard: Arc<PathGuard>,
}

impl CountFilesTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        CountFilesTool { guard }
    }
}

#[async_trait]
impl Tool for CountFilesTool {
    fn name(&self) -> &str {
        "count_files"
    }

    fn description(&self) -> &str {
        "Count files in a directory, optionally filtering by substring"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "dir": {"type": "string", "default": "~"},
                "needle": {"type": "string", "default": ""},
                "limit": {"type": "integer", "default": 0}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let dir = args.get("dir").and_then(Value::as_str).unwrap_or("~");
        let needle = args
            .get("needle")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_lowercase();
        let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(0);

        let dir_path = self.guard.validate_path(dir, false)?;
        if !dir_path.is_dir() {
            return Ok(ToolResult::failure(format!("Not a directory: {}", dir_path.display())));
        }

        let mut count = 0i64;
        let mut read_dir = tokio::fs::read_dir(&dir_path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if !meta.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !needle.is_empty() && !name.contains(&needle) {
                continue;
            }
            count += 1;
            if limit > 0 && count >= limit {
                break;
            }
        }

        Ok(ToolResult::success(serde_json::json!({"count": count}).to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn counts_matching_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("report_a.txt"), "").unwrap();
        std::fs::write(dir.path().join("report_b.txt"), "").unwrap();
        std::fs::write(dir.path().join("other.txt"), "").unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = CountFilesTool::new(guard);
        let result = tool
            .execute(serde_json::json!({"needle": "report"}))
            .await
            .unwrap();
        assert_eq!(result.content.unwrap(), r#"{"count":2}"#);
    }

    #[tokio::test]
    async fn respects_limit() {
        let dir = tempdir().unwrap();
        for i in 0..5 {
            std::fs::write(dir.path().join(format!("f{i}.txt")), "").unwrap();
        }
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = CountFilesTool::new(guard);
        let result = tool
            .execute(serde_json::json!({"limit": 2}))
            .await
            .unwrap();
        assert_eq!(result.content.unwrap(), r#"{"count":2}"#);
    }
}
