//! System command execution tool (destructive)
//!
//! Runs an OS command with a bounded timeout and an optional working
//! directory (`tokio::process::Command`-based), gated as destructive: the
//! registry policy requires `confirm: true`, enforced in
//! [`crate::sandbox::validate_tool_args`] before `execute` ever runs.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;

use super::traits::{Tool, ToolResult};
use crate::error::Result;

/// Built-in tool: run a system command
pub struct SystemCommandTool {
    working_dir: Option<PathBuf>,
    timeout_secs: u64,
}

impl Default for SystemCommandTool {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemCommandTool {
    pub fn new() -> Self {
        SystemCommandTool {
            working_dir: None,
            timeout_secs: 60,
        }
    }

    pub fn with_working_dir(working_dir: PathBuf) -> Self {
        SystemCommandTool {
            working_dir: Some(working_dir),
            timeout_secs: 60,
        }
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

#[async_trait]
impl Tool for SystemCommandTool {
    fn name(&self) -> &str {
        "system_command"
    }

    fn description(&self) -> &str {
        "Execute a system/shell command (destructive, requires confirm=true). Returns stdout, stderr, and exit code."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "command": {"type": "string", "description": "The command to execute (e.g. 'ls', 'mv')"},
                "args": {"type": "array", "items": {"type": "string"}, "description": "Arguments to pass to the command"},
                "working_dir": {"type": "string", "description": "Optional working directory"},
                "confirm": {"type": "boolean", "default": false}
            },
            "required": ["command", "confirm"]
        })
    }

    async fn execute(&self, args: Value) -> Result<ToolResult> {
        let command = args
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| crate::Error::InvalidInput("Missing 'command' parameter".to_string()))?;

        let cmd_args: Vec<String> = args
            .get("args")
            .and_then(Value::as_array)
            .map(|arr| arr.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default();

        let working_dir = args
            .get("working_dir")
            .and_then(Value::as_str)
            .map(PathBuf::from)
            .or_else(|| self.working_dir.clone());

        let mut cmd = Command::new(command);
        cmd.args(&cmd_args);
        if let Some(ref dir) = working_dir {
            cmd.current_dir(dir);
        }

        let timeout = Duration::from_secs(self.timeout_secs);
        let result = tokio::time::timeout(timeout, cmd.output()).await;

        match result {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code().unwrap_or(-1);
                let success = output.status.success();

                let mut content = String::new();
                if !stdout.is_empty() {
                    content.push_str("STDOUT:\n");
                    content.push_str(&stdout);
                }
                if !stderr.is_empty() {
                    if !content.is_empty() {
                        content.push('\n');
                    }
                    content.push_str("STDERR:\n");
                    content.push_str(&stderr);
                }
                if content.is_empty() {
                    content = format!("Command completed with exit code {exit_code}");
                }

                let metadata = serde_json::json!({
                    "exit_code": exit_code,
                    "success": success,
                    "command": command,
                    "args": cmd_args,
                });

                if success {
                    Ok(ToolResult::success_with_metadata(content, metadata))
                } else {
                    Ok(ToolResult {
                        success: false,
                        content: Some(content),
                        error: Some(format!("Command exited with code {exit_code}")),
                        metadata: Some(metadata),
                    })
                }
            }
            Ok(Err(e)) => Ok(ToolResult::failure(format!(
                "Failed to execute command '{command}': {e}"
            ))),
            Err(_) => Ok(ToolResult::failure(format!(
                "Command '{command}' timed out after {} seconds",
                self.timeout_secs
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn echoes_args_back() {
        let tool = SystemCommandTool::new();
        let result = tool
            .execute(serde_json::json!({"command": "echo", "args": ["hello", "world"], "confirm": true}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.content.unwrap().contains("hello world"));
    }

    #[tokio::test]
    async fn reports_unknown_command() {
        let tool = SystemCommandTool::new();
        let result = tool
            .execute(serde_json::json!({"command": "nonexistent_command_xyz", "confirm": true}))
            .await
            .unwrap();
        assert!(!result.success);
    }

    #[tokio::test]
    async fn runs_in_requested_working_dir() {
        let tool = SystemCommandTool::with_working_dir(PathBuf::from("/tmp"));
        let result = tool
            .execute(serde_json::json!({"command": "pwd", "confirm": true}))
            .await
            .unwrap();
        assert!(result.success);
        assert!(result.content.unwrap().contains("/tmp"));
    }
}
