//! Sandbox module - path and argument validation for filesystem-facing tools

mod path_guard;

pub use path_guard::{get_safe_glob_pattern, sanitize_filename, validate_tool_args, PathGuard};
