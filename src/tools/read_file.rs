//! Read file tool
//!
//! Reads a byte range of a sandboxed file, falling back to a hex preview
//! when the content isn't valid UTF-8.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use super::traits::{Tool, ToolResult};
use crate::error::Result;
use crate::sandbox::PathGuard;

const MAX_READ_BYTES: u64 = 1024 * 1024;

/// Built-in tool: Read file
pub struct ReadFileTool {
    guard: Arc<PathGuard>,
}

impl ReadFileTool {
    pub fn new(guard: Arc<PathGuard>) -> Self {
        ReadFileTool { guard }
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read a byte range from a file within the sandbox"
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {"type": "string", "description": "File path to read"},
                "offset": {"type": "integer", "description": "Byte offset to start from", "default": 0},
                "length": {"type": "integer", "description": "Maximum bytes to read", "default": 65536}
            },
            "required": ["path"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let path = args
            .get("path")
            .and_then(|v| v.as_str())
            .ok_or_else(|| crate::Error::InvalidInput("Missing 'path' parameter".to_string()))?;
        let offset = args.get("offset").and_then(Value::as_u64).unwrap_or(0);
        let length = args.get("length").and_then(Value::as_u64).unwrap_or(65536);

        let resolved = self.guard.validate_path(path, false)?;
        if !resolved.is_file() {
            return Ok(ToolResult::failure(format!("Not a file: {}", resolved.display())));
        }

        let metadata = tokio::fs::metadata(&resolved).await?;
        let file_size = metadata.len();
        if offset >= file_size {
            return Ok(ToolResult::success(""));
        }

        let actual_length = std::cmp::min(length, MAX_READ_BYTES).min(file_size - offset);
        let mut file = tokio::fs::File::open(&resolved).await?;
        file.seek(std::io::SeekFrom::Start(offset)).await?;

        let mut buf = vec![0u8; actual_length as usize];
        let mut read_total = 0usize;
        while read_total < buf.len() {
            let n = file.read(&mut buf[read_total..]).await?;
            if n == 0 {
                break;
            }
            read_total += n;
        }
        buf.truncate(read_total);

        match String::from_utf8(buf.clone()) {
            Ok(content) => Ok(ToolResult::success(content)),
            Err(_) => {
                let mut content = format!("[Binary file: {} bytes]", buf.len());
                if buf.len() < 1000 {
                    content.push_str(&format!("\nHex: {}", hex_encode(&buf)));
                }
                Ok(ToolResult::success(content))
            }
        }
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn reads_text_content() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello world").unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = ReadFileTool::new(guard);
        let result = tool
            .execute(serde_json::json!({"path": "a.txt"}))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.content.as_deref(), Some("hello world"));
    }

    #[tokio::test]
    async fn offset_past_eof_returns_empty() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "hi").unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = ReadFileTool::new(guard);
        let result = tool
            .execute(serde_json::json!({"path": "a.txt", "offset": 100}))
            .await
            .unwrap();
        assert_eq!(result.content.as_deref(), Some(""));
    }

    #[tokio::test]
    async fn rejects_path_outside_sandbox() {
        let dir = tempdir().unwrap();
        let guard = Arc::new(PathGuard::new(dir.path()).unwrap());
        let tool = ReadFileTool::new(guard);
        let err = tool
            .execute(serde_json::json!({"path": "../../etc/passwd"}))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::PathOutsideSandbox(_)));
    }
}
