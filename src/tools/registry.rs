//! Tool registry - manages available tools and their security policies

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::agent::types::ToolDefinition;
use crate::error::{Error, Result};

use super::traits::{Tool, ToolCall, ToolResult};

/// Per-tool security policy, loaded from the declarative tools config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPolicy {
    /// Whether the tool may be invoked at all
    pub enabled: bool,
    /// True if the tool performs an irreversible/destructive action
    pub destructive: bool,
    /// Whether a destructive tool call must carry `confirm: true`
    pub require_confirm: bool,
    /// Ceiling clamp applied to any `limit` argument
    pub max_limit: u32,
    /// Ceiling clamp applied to any `length` argument
    pub max_length: u32,
    /// Substrings that cause a `web_get` URL to be rejected
    pub blocked_domains: Vec<String>,
}

impl Default for ToolPolicy {
    fn default() -> Self {
        ToolPolicy {
            enabled: true,
            destructive: false,
            require_confirm: true,
            max_limit: 500,
            max_length: 65536,
            blocked_domains: Vec::new(),
        }
    }
}

/// One entry of the serializable tool catalog returned by the `/tools`
/// route and folded into planner prompts.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCatalogEntry {
    pub name: String,
    pub description: String,
    pub enabled: bool,
    pub destructive: bool,
    pub require_confirm: bool,
    pub parameters_schema: serde_json::Value,
}

/// Shape of the top-level declarative tools config file (YAML): a map of
/// tool name to policy record, per the `tools: <name>: {...}` schema.
#[derive(Debug, Clone, Deserialize)]
struct ToolsConfigFile {
    #[serde(default)]
    tools: HashMap<String, ToolPolicy>,
}

/// Registry of available tools and the policies that gate them.
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    policies: HashMap<String, ToolPolicy>,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        ToolRegistry {
            tools: HashMap::new(),
            policies: HashMap::new(),
        }
    }

    /// Register a tool with the default policy
    pub fn register<T: Tool + 'static>(&mut self, tool: T) {
        let name = tool.name().to_string();
        self.tools.insert(name.clone(), Box::new(tool));
        self.policies.entry(name).or_insert_with(ToolPolicy::default);
    }

    /// Register a tool with an explicit policy
    pub fn register_with_policy<T: Tool + 'static>(&mut self, tool: T, policy: ToolPolicy) {
        let name = tool.name().to_string();
        self.tools.insert(name.clone(), Box::new(tool));
        self.policies.insert(name, policy);
    }

    /// Overwrite the policy for an already-registered tool (e.g. from config).
    pub fn set_policy(&mut self, name: impl Into<String>, policy: ToolPolicy) {
        self.policies.insert(name.into(), policy);
    }

    /// Get a tool by name
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get the policy for a tool, if registered
    pub fn policy(&self, name: &str) -> Option<&ToolPolicy> {
        self.policies.get(name)
    }

    /// True if the named tool is destructive per policy
    pub fn is_destructive(&self, name: &str) -> bool {
        self.policies.get(name).map(|p| p.destructive).unwrap_or(false)
    }

    /// Get all tool definitions
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// Execute a tool call, enforcing its policy first
    pub async fn execute(&self, call: &ToolCall) -> Result<ToolResult> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| Error::UnknownTool(call.name.clone()))?;

        let policy = self.policies.get(&call.name).cloned().unwrap_or_default();
        let validated_args =
            crate::sandbox::validate_tool_args(&call.name, &call.arguments, &policy)?;

        tool.execute(validated_args).await
    }

    /// Get tool count
    pub fn count(&self) -> usize {
        self.tools.len()
    }

    /// List tool names
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    /// True if `name` refers to a registered tool
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// True if the named tool is registered and its policy allows calling it
    pub fn is_enabled(&self, name: &str) -> bool {
        self.policies.get(name).map(|p| p.enabled).unwrap_or(false)
    }

    /// Serializable snapshot of the registry for the `/tools` route and for
    /// folding into planner/critic prompts.
    pub fn info(&self) -> Vec<ToolCatalogEntry> {
        let mut entries: Vec<ToolCatalogEntry> = self
            .tools
            .iter()
            .map(|(name, tool)| {
                let policy = self.policies.get(name).cloned().unwrap_or_default();
                ToolCatalogEntry {
                    name: name.clone(),
                    description: tool.description().to_string(),
                    enabled: policy.enabled,
                    destructive: policy.destructive,
                    require_confirm: policy.require_confirm,
                    parameters_schema: tool.parameters_schema(),
                }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        entries
    }

    /// Apply per-tool policies from a declarative YAML config file onto an
    /// already-populated registry. Entries naming a tool that was never
    /// registered are skipped with a warning rather than aborting startup.
    pub fn load_tools_config(&mut self, yaml: &str) -> Result<()> {
        let parsed: ToolsConfigFile = serde_yaml::from_str(yaml)?;
        for (name, policy) in parsed.tools {
            if !self.tools.contains_key(&name) {
                tracing::warn!(tool = %name, "tools config names a tool that isn't registered, skipping");
                continue;
            }
            self.set_policy(name, policy);
        }
        Ok(())
    }

    /// Load policies from a declarative YAML config file on disk. Missing
    /// file is not an error: the registry simply keeps its default policies.
    pub async fn load_tools_config_file(&mut self, path: &std::path::Path) -> Result<()> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => self.load_tools_config(&contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %path.display(), "no tools config file present, using defaults");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::traits::ToolResult;

    #[test]
    fn test_tool_result() {
        let success = ToolResult::success("Done!");
        assert!(success.success);
        assert_eq!(success.content.as_deref(), Some("Done!"));

        let failure = ToolResult::failure("Oops!");
        assert!(!failure.success);
        assert_eq!(failure.error.as_deref(), Some("Oops!"));
    }

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its args back"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        async fn execute(&self, args: serde_json::Value) -> Result<ToolResult> {
            Ok(ToolResult::success(args.to_string()))
        }
    }

    #[tokio::test]
    async fn unknown_tool_call_errors() {
        let registry = ToolRegistry::new();
        let call = ToolCall {
            id: "1".into(),
            name: "does_not_exist".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, Error::UnknownTool(_)));
    }

    #[tokio::test]
    async fn disabled_tool_is_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register_with_policy(
            EchoTool,
            ToolPolicy {
                enabled: false,
                ..ToolPolicy::default()
            },
        );
        let call = ToolCall {
            id: "1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({}),
        };
        let err = registry.execute(&call).await.unwrap_err();
        assert!(matches!(err, Error::ToolDisabled(_)));
    }

    #[tokio::test]
    async fn registered_tool_runs() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let call = ToolCall {
            id: "1".into(),
            name: "echo".into(),
            arguments: serde_json::json!({"x": 1}),
        };
        let result = registry.execute(&call).await.unwrap();
        assert!(result.success);
    }

    #[test]
    fn info_reflects_policy() {
        let mut registry = ToolRegistry::new();
        registry.register_with_policy(
            EchoTool,
            ToolPolicy {
                destructive: true,
                ..ToolPolicy::default()
            },
        );
        let catalog = registry.info();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].name, "echo");
        assert!(catalog[0].destructive);
    }

    #[test]
    fn load_tools_config_applies_known_entries() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let yaml = "tools:\n  echo:\n    enabled: false\n    destructive: true\n";
        registry.load_tools_config(yaml).unwrap();
        assert!(!registry.is_enabled("echo"));
        assert!(registry.is_destructive("echo"));
    }

    #[test]
    fn load_tools_config_skips_unknown_tool_names() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool);
        let yaml = "tools:\n  does_not_exist:\n    enabled: false\n";
        registry.load_tools_config(yaml).unwrap();
        assert!(registry.is_enabled("echo"));
    }
}
