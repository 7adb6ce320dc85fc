//! Delete files tool (destructive)
//!
//! Policy enforcement (confirm gate) happens upstream in
//! [`crate::sandbox::validate_tool_args`] via [`crate::tools::registry::ToolRegistry::execute`];
//! this tool additionally enforces its own needle-length floor since that
//! check is specific to this operation, not the generic policy layer.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::traits::{Tool, ToolResult};
use crate::error::{Error, Result};
use crate::sandbox::PathGuard;

#[derive(Debug, Serialize)]
struct DeleteResult {
    deleted: usize,
    files: Vec<String>,
    errors: Vec<String>,
    message: String,
}

/// Built-in tool: delete files matching a substring needle
pub struct DeleteFilesTool {
    guard: Arc<PathGuard>,
}

impl DeleteFilesTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        DeleteFilesTool { guard }
    }
}

#[async_trait]
impl Tool for DeleteFilesTool {
    fn name(&self) -> &str {
        "delete_files"
    }

    fn description(&self) -> &str {
        "Delete files matching a substring (destructive, requires confirm=true)"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "dir": {"type": "string"},
                "needle": {"type": "string", "minLength": 2},
                "confirm": {"type": "boolean", "default": false},
                "limit": {"type": "integer", "default": 1000}
            },
            "required": ["dir", "needle"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let dir = args
            .get("dir")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ValidationError("delete_files requires dir".into()))?;
        let needle = args
            .get("needle")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::ValidationError("delete_files requires needle".into()))?;
        let confirmed = args.get("confirm").and_then(Value::as_bool).unwrap_or(false);
        let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(1000).max(0) as usize;

        if !confirmed {
            return Err(Error::DestructiveBlocked(
                "delete_files requires confirm=true".into(),
            ));
        }
        if needle.len() < 2 {
            return Err(Error::ValidationError(
                "delete_files requires needle with at least 2 characters".into(),
            ));
        }

        let dir_path = self.guard.validate_path(dir, false)?;
        if !dir_path.is_dir() {
            return Ok(ToolResult::failure(format!("Not a directory: {}", dir_path.display())));
        }

        let needle_lower = needle.to_lowercase();
        let mut to_delete = Vec::new();
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
            if name.contains(&needle_lower) {
                to_delete.push(entry.path());
                if to_delete.len() >= limit {
                    break;
                }
            }
        }

        if to_delete.is_empty() {
            let result = DeleteResult {
                deleted: 0,
                files: vec![],
                errors: vec![],
                message: format!("No files found matching '{needle}'"),
            };
            return Ok(ToolResult::success(serde_json::to_string(&result)?));
        }

        let mut deleted = Vec::new();
        let mut errors = Vec::new();
        for path in &to_delete {
            match tokio::fs::remove_file(path).await {
                Ok(()) => deleted.push(path.display().to_string()),
                Err(e) => errors.push(format!("{}: {}", path.display(), e)),
            }
        }

        let mut message = format!("Deleted {} files", deleted.len());
        if !errors.is_empty() {
            message.push_str(&format!(", {} errors", errors.len()));
        }

        let result = DeleteResult {
            deleted: deleted.len(),
            files: deleted,
            errors,
            message,
        };
        Ok(ToolResult::success(serde_json::to_string(&result)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn requires_confirm() {
        let dir = tempdir().unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = DeleteFilesTool::new(guard);
        let err = tool
            .execute(serde_json::json!({"dir": dir.path().to_string_lossy(), "needle": "ab"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DestructiveBlocked(_)));
    }

    #[tokio::test]
    async fn deletes_matching_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("temp_a.log"), "").unwrap();
        std::fs::write(dir.path().join("keep.txt"), "").unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = DeleteFilesTool::new(guard);
        let result = tool
            .execute(serde_json::json!({
                "dir": dir.path().to_string_lossy(),
                "needle": "temp",
                "confirm": true
            }))
            .await
            .unwrap();
        assert!(result.success);
        assert!(!dir.path().join("temp_a.log").exists());
        assert!(dir.path().join("keep.txt").exists());
    }

    #[tokio::test]
    async fn rejects_short_needle() {
        let dir = tempdir().unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = DeleteFilesTool::new(guard);
        let err = tool
            .execute(serde_json::json!({
                "dir": dir.path().to_string_lossy(),
                "needle": "a",
                "confirm": true
            }))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }
}
