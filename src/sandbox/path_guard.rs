//! Path and argument sandboxing for filesystem-facing tools
//!
//! Every path a tool receives is resolved against a single sandbox root and
//! rejected if it escapes it. This is the last line of defense before a tool
//! touches the filesystem, independent of whatever the planner or LLM asked for.

use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{Error, Result};
use crate::tools::registry::ToolPolicy;

/// Resolves and validates paths against a sandbox root.
#[derive(Debug, Clone)]
pub struct PathGuard {
    sandbox_root: PathBuf,
}

impl PathGuard {
    /// Build a guard rooted at `sandbox_root` (expanded and canonicalized).
    pub fn new(sandbox_root: impl AsRef<Path>) -> Result<Self> {
        let expanded = expand_path(&sandbox_root.as_ref().to_string_lossy());
        let resolved = dunce_canonicalize(&expanded)?;
        Ok(PathGuard {
            sandbox_root: resolved,
        })
    }

    /// Root directory this guard enforces.
    pub fn root(&self) -> &Path {
        &self.sandbox_root
    }

    /// Validate and resolve `path_str` within the sandbox.
    ///
    /// If `allow_create` is false the resolved path must already exist.
    pub fn validate_path(&self, path_str: &str, allow_create: bool) -> Result<PathBuf> {
        let trimmed = path_str.trim();
        if trimmed.is_empty() {
            return Err(Error::ValidationError("empty path".into()));
        }

        let expanded = expand_path(trimmed);
        let candidate = if Path::new(&expanded).is_absolute() {
            PathBuf::from(&expanded)
        } else {
            self.sandbox_root.join(&expanded)
        };

        let resolved = if candidate.exists() {
            candidate
                .canonicalize()
                .map_err(|e| Error::ValidationError(format!("invalid path {trimmed}: {e}")))?
        } else {
            normalize_lexically(&candidate)
        };

        if !resolved.starts_with(&self.sandbox_root) {
            return Err(Error::PathOutsideSandbox(resolved.display().to_string()));
        }

        if !allow_create && !resolved.exists() {
            return Err(Error::ValidationError(format!(
                "path does not exist: {}",
                resolved.display()
            )));
        }

        Ok(resolved)
    }

    /// True if `path` contains a dotfile segment relative to the sandbox root.
    pub fn is_dotfile(&self, path: &Path) -> bool {
        path.strip_prefix(&self.sandbox_root)
            .into_iter()
            .flat_map(|rel| rel.components())
            .any(|c| {
                c.as_os_str()
                    .to_str()
                    .map(|s| s.starts_with('.'))
                    .unwrap_or(false)
            })
    }

    /// Drop dotfile entries from `paths` unless `allow_dotfiles` is set.
    pub fn filter_dotfiles(&self, paths: Vec<PathBuf>, allow_dotfiles: bool) -> Vec<PathBuf> {
        if allow_dotfiles {
            return paths;
        }
        paths
            .into_iter()
            .filter(|p| !self.is_dotfile(p))
            .collect()
    }
}

/// Clamp and validate a tool call's JSON arguments against its policy.
///
/// Returns a (possibly clamped) copy of `args`. Unlike [`PathGuard`], this
/// never touches the filesystem; it only enforces numeric bounds, the
/// destructive-confirm gate, and URL scheme/domain rules.
pub fn validate_tool_args(tool_name: &str, args: &Value, policy: &ToolPolicy) -> Result<Value> {
    if !policy.enabled {
        return Err(Error::ToolDisabled(tool_name.to_string()));
    }

    let mut validated = args.clone();
    let obj = validated
        .as_object_mut()
        .ok_or_else(|| Error::ValidationError("tool args must be a JSON object".into()))?;

    // Destructive-tool confirm gate applies to every tool the policy marks
    // destructive, not just the filesystem-specific ones below, so a
    // direct-action call can't bypass it by skipping the critic. Confirm is
    // mandatory whenever a tool is destructive; `require_confirm` does not
    // gate this, it only exists as a non-destructive per-tool policy flag.
    if policy.destructive {
        let confirmed = obj.get("confirm").and_then(Value::as_bool).unwrap_or(false);
        if !confirmed {
            return Err(Error::DestructiveBlocked(format!(
                "{tool_name} requires confirm=true"
            )));
        }
    }

    match tool_name {
        "list_files" | "count_files" | "count_dirs" => {
            if let Some(limit) = obj.get("limit").and_then(Value::as_i64) {
                if limit > policy.max_limit as i64 {
                    obj.insert("limit".into(), Value::from(policy.max_limit));
                }
            }
        }
        "read_file" => {
            if let Some(length) = obj.get("length").and_then(Value::as_i64) {
                if length > policy.max_length as i64 {
                    obj.insert("length".into(), Value::from(policy.max_length));
                }
            }
        }
        "web_get" => {
            let url = obj
                .get("url")
                .and_then(Value::as_str)
                .ok_or_else(|| Error::ValidationError("web_get requires url argument".into()))?
                .trim()
                .to_string();

            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(Error::ValidationError("invalid URL scheme".into()));
            }
            for domain in &policy.blocked_domains {
                if url.contains(domain.as_str()) {
                    return Err(Error::AccessDenied(format!("blocked domain: {domain}")));
                }
            }
        }
        _ => {}
    }

    Ok(validated)
}

/// Strip dangerous characters and clamp length for a filesystem-bound filename.
pub fn sanitize_filename(filename: &str) -> String {
    let sanitized: String = filename
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '.' | '_' | '-' | ' '))
        .collect();
    let sanitized = sanitized.trim_matches(|c| c == '.' || c == ' ');
    let clamped: String = sanitized.chars().take(255).collect();
    if clamped.is_empty() {
        "unnamed".to_string()
    } else {
        clamped
    }
}

/// Strip traversal and path-separator characters out of a glob pattern.
pub fn get_safe_glob_pattern(pattern: &str) -> String {
    let mut cleaned = pattern.to_string();
    for danger in ["..", "/", "\\", "~"] {
        cleaned = cleaned.replace(danger, "");
    }
    let cleaned = cleaned.trim().to_string();
    if cleaned.is_empty() {
        "*".to_string()
    } else {
        cleaned
    }
}

fn expand_path(raw: &str) -> String {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest).to_string_lossy().into_owned();
        }
    } else if raw == "~" {
        if let Some(home) = dirs::home_dir() {
            return home.to_string_lossy().into_owned();
        }
    }
    shellexpand_env(raw)
}

/// Minimal `$VAR`/`${VAR}` expansion; no dedicated shell-expansion crate
/// is in the dependency stack.
fn shellexpand_env(raw: &str) -> String {
    if !raw.contains('$') {
        return raw.to_string();
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let braced = chars.peek() == Some(&'{');
        if braced {
            chars.next();
        }
        let mut name = String::new();
        while let Some(&c2) = chars.peek() {
            if c2.is_alphanumeric() || c2 == '_' {
                name.push(c2);
                chars.next();
            } else {
                break;
            }
        }
        if braced && chars.peek() == Some(&'}') {
            chars.next();
        }
        if name.is_empty() {
            out.push('$');
        } else if let Ok(val) = std::env::var(&name) {
            out.push_str(&val);
        }
    }
    out
}

fn dunce_canonicalize(path: &str) -> Result<PathBuf> {
    let p = PathBuf::from(path);
    if p.exists() {
        p.canonicalize()
            .map_err(|e| Error::Config(format!("cannot resolve sandbox root {path}: {e}")))
    } else {
        Ok(normalize_lexically(&p))
    }
}

/// Lexically collapse `.`/`..` without touching the filesystem, for
/// paths that don't exist yet (create-mode validation).
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        use std::path::Component;
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_escape_above_root() {
        let dir = tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        let err = guard.validate_path("../../etc/passwd", false).unwrap_err();
        assert!(matches!(err, Error::PathOutsideSandbox(_)));
    }

    #[test]
    fn accepts_path_inside_root() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), "hi").unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        let resolved = guard.validate_path("hello.txt", false).unwrap();
        assert!(resolved.starts_with(guard.root()));
    }

    #[test]
    fn rejects_nonexistent_without_allow_create() {
        let dir = tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        let err = guard.validate_path("missing.txt", false).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn allow_create_permits_missing_path() {
        let dir = tempdir().unwrap();
        let guard = PathGuard::new(dir.path()).unwrap();
        let resolved = guard.validate_path("new/missing.txt", true).unwrap();
        assert!(resolved.starts_with(guard.root()));
    }

    #[test]
    fn sanitize_filename_strips_dangerous_chars() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "etcpasswd");
        assert_eq!(sanitize_filename("   "), "unnamed");
        assert_eq!(sanitize_filename("report (final).txt"), "report (final).txt");
    }

    #[test]
    fn safe_glob_pattern_strips_traversal() {
        assert_eq!(get_safe_glob_pattern("../*.rs"), "*.rs");
        assert_eq!(get_safe_glob_pattern(""), "*");
        assert_eq!(get_safe_glob_pattern("~/*.rs"), "/*.rs".replace('/', ""));
    }

    #[test]
    fn destructive_call_requires_confirm() {
        let policy = ToolPolicy {
            destructive: true,
            require_confirm: true,
            ..ToolPolicy::default()
        };
        let args = serde_json::json!({"dir": "/tmp", "needle": "ab"});
        let err = validate_tool_args("delete_files", &args, &policy).unwrap_err();
        assert!(matches!(err, Error::DestructiveBlocked(_)));
    }

    #[test]
    fn web_get_rejects_non_http_scheme() {
        let policy = ToolPolicy::default();
        let args = serde_json::json!({"url": "ftp://example.com/file"});
        let err = validate_tool_args("web_get", &args, &policy).unwrap_err();
        assert!(matches!(err, Error::ValidationError(_)));
    }

    #[test]
    fn web_get_blocks_configured_domain() {
        let mut policy = ToolPolicy::default();
        policy.blocked_domains.push("evil.example".into());
        let args = serde_json::json!({"url": "https://evil.example/page"});
        let err = validate_tool_args("web_get", &args, &policy).unwrap_err();
        assert!(matches!(err, Error::AccessDenied(_)));
    }
}
