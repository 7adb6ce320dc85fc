//! # OpenAgent
//!
//! An LLM-driven autonomous agent server: given a natural-language goal, the
//! control loop iteratively plans, executes external tools, observes
//! results, and decides whether the goal is met, streaming each stage to
//! the caller as it goes.
//!
//! ## Architecture
//!
//! - **Core** (`core`): the host CPU/memory metrics collector
//! - **Configuration** (`config`): modular configuration, focused type modules
//! - **Agent** (`agent`): the control loop itself - intent router, planner, critic,
//!   verifier, batch executor, session state, event channel, and the model
//!   fallback client
//! - **Sandbox** (`sandbox`): path/argument sandboxing plus OS/Wasm/container code executors
//! - **Tools** (`tools`): the tool registry and the reference filesystem/web/analysis tools
//!
//! ## Design Principles
//!
//! 1. **Trait-based abstraction**: All major components implement traits for loose coupling
//! 2. **Modular configuration**: Split into focused modules (provider, storage, sandbox)
//! 3. **Plugin architecture**: Easy to add new providers and tools
//! 4. **Security first**: sandboxed paths/arguments, destructive-tool confirmation, rate limiting
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use openagent::config::load_config;
//! use openagent::Result;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration from file or environment
//!     let config = load_config()?;
//!
//!     // Your agent code here...
//!     Ok(())
//! }
//! ```

// Core abstractions (traits and fundamental types)
pub mod core;

// Agent logic and LLM interaction
pub mod agent;

// Modular configuration (now a directory module)
#[path = "config/mod.rs"]
pub mod config;

// Error types
pub mod error;

// Secure execution sandboxes
pub mod sandbox;

// Tool trait, registry, and built-in tool implementations
pub mod tools;

// Re-export commonly used items
pub use error::{Error, Result};

// Re-export core metrics types for convenience
pub use core::{MetricsCollector, MetricsManager, SessionMetrics, SystemSnapshot};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const NAME: &str = env!("CARGO_PKG_NAME");
