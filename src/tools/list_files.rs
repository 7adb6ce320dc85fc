//! List files tool
//!
//! Lists directory entries with glob filtering and sort order, sandboxed
//! to a single root.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use super::traits::{Tool, ToolResult};
use crate::error::Result;
use crate::sandbox::{get_safe_glob_pattern, PathGuard};

#[derive(Debug, Clone, Serialize)]
struct FileEntry {
    name: String,
    path: String,
    is_dir: bool,
    mtime: f64,
    size: u64,
}

/// Built-in tool: list directory entries
pub struct ListFilesTool {
    guard: Arc<PathGuard>,
}

impl ListFilesTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        ListFilesTool { guard }
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List files and directories with sorting and glob filtering"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "dir": {"type": "string", "default": "~"},
                "pattern": {"type": "string", "default": "*"},
                "sort": {"type": "string", "enum": ["name", "mtime", "size"], "default": "name"},
                "limit": {"type": "integer", "default": 200}
            }
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let dir = args.get("dir").and_then(Value::as_str).unwrap_or("~");
        let pattern = args.get("pattern").and_then(Value::as_str).unwrap_or("*");
        let sort = args.get("sort").and_then(Value::as_str).unwrap_or("name");
        let limit = args.get("limit").and_then(Value::as_i64).unwrap_or(200);

        let dir_path = self.guard.validate_path(dir, false)?;
        if !dir_path.is_dir() {
            return Ok(ToolResult::failure(format!("Not a directory: {}", dir_path.display())));
        }

        let safe_pattern = get_safe_glob_pattern(pattern);
        let mut items = Vec::new();
        let mut read_dir = tokio::fs::read_dir(&dir_path).await?;
        while let Some(entry) = read_dir.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !glob_match(&safe_pattern, &name) {
                continue;
            }
            let meta = match entry.metadata().await {
                Ok(m) => m,
                Err(_) => continue,
            };
            let mtime = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0);
            items.push(FileEntry {
                name,
                path: entry.path().display().to_string(),
                is_dir: meta.is_dir(),
                mtime,
                size: if meta.is_file() { meta.len() } else { 0 },
            });
        }

        match sort {
            "mtime" => items.sort_by(|a, b| b.mtime.partial_cmp(&a.mtime).unwrap()),
            "size" => items.sort_by(|a, b| b.size.cmp(&a.size)),
            _ => items.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase())),
        }

        if limit > 0 {
            items.truncate(limit as usize);
        }

        let json = serde_json::to_string(&items)?;
        Ok(ToolResult::success_with_metadata(json, serde_json::json!({"count": items.len()})))
    }
}

/// Minimal `fnmatch`-style glob: supports `*` and `?` only, which is all
/// `get_safe_glob_pattern` can produce after stripping path separators.
fn glob_match(pattern: &str, name: &str) -> bool {
    fn helper(p: &[char], n: &[char]) -> bool {
        match (p.first(), n.first()) {
            (None, None) => true,
            (Some('*'), _) => helper(&p[1..], n) || (!n.is_empty() && helper(p, &n[1..])),
            (Some('?'), Some(_)) => helper(&p[1..], &n[1..]),
            (Some(pc), Some(nc)) if pc == nc => helper(&p[1..], &n[1..]),
            _ => false,
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();
    helper(&p, &n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn lists_entries_sorted_by_name() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("b.txt"), "").unwrap();
        std::fs::write(dir.path().join("a.txt"), "").unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = ListFilesTool::new(guard);
        let result = tool.execute(serde_json::json!({})).await.unwrap();
        assert!(result.success);
        let content = result.content.unwrap();
        assert!(content.find("a.txt").unwrap() < content.find("b.txt").unwrap());
    }

    #[tokio::test]
    async fn pattern_filters_entries() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("note.md"), "").unwrap();
        std::fs::write(dir.path().join("code.rs"), "").unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = ListFilesTool::new(guard);
        let result = tool
            .execute(serde_json::json!({"pattern": "*.rs"}))
            .await
            .unwrap();
        let content = result.content.unwrap();
        assert!(content.contains("code.rs"));
        assert!(!content.contains("note.md"));
    }

    #[test]
    fn glob_matches_star_and_question() {
        assert!(glob_match("*.rs", "main.rs"));
        assert!(!glob_match("*.rs", "main.py"));
        assert!(glob_match("a?c", "abc"));
    }
}
