//! Configuration module - Modular configuration management
//!
//! Split into focused modules:
//! - types/mod.rs: Core configuration types (Config, AgentConfig, GatewayConfig)
//! - types/sandbox.rs: Sandbox/execution configuration
//! - io.rs: Configuration loading and saving
//! - validation.rs: Configuration validation
//! - paths.rs: Configuration file paths

mod io;
mod paths;
mod types;
mod validation;

// Re-export core config types
pub use types::{Config, AgentConfig, GatewayConfig, ThinkingLevel};

// Re-export sandbox types
pub use types::sandbox::{
    SandboxConfig, ExecutionEnv, ContainerConfig, WasmConfig,
};

// Re-export IO and utilities
pub use io::{load_config, load_config_from_env, load_config_from_path, save_config, ConfigSnapshot};
pub use paths::{config_dir, config_path, state_dir, workspace_dir};
pub use validation::{validate_config, ConfigValidationResult};
