//! Count directories tool

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::traits::{Tool, ToolResult};
use crate::error::Result;
use crate::sandbox::PathGuard;

/// Built-in tool: count subdirectories, optionally filtered by substring
pub struct CountDirsTool {
    guard: Arc<PathGuard>,
}

impl CountDirsTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        CountDirsTool { guard }
    }
}

#[async_trait]
impl Tool for CountDirsTool {
    fn name(&self) -> &str {
        "count_dirs"
    }

    fn description(&self) -> &str {
        "Count subdirectories, optionally filtering by substring"
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
        let needle = args.get("needle").and_then(Value::as_str).unwrap_or("");
        let needle_lower = needle.to_lowercase();
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
            if !meta.is_dir() {
                continue;
            }
            let path = entry.path();
            if self.guard.is_dotfile(&path) && !needle.starts_with('.') {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_lowercase();
            if !needle_lower.is_empty() && !name.contains(&needle_lower) {
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
    async fn counts_dirs_skipping_dotfiles() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::create_dir(dir.path().join(".git")).unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = CountDirsTool::new(guard);
        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert_eq!(result.content.unwrap(), r#"{"count":1}"#);
    }

    #[tokio::test]
    async fn needle_starting_with_dot_includes_dotfiles() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join(".config")).unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = CountDirsTool::new(guard);
        let result = tool
            .execute(serde_json::json!({"needle": ".config"}))
            .await
            .unwrap();
        assert_eq!(result.content.unwrap(), r#"{"count":1}"#);
    }
}
