//! OpenAgent CLI
//!
//! Command-line interface for running goals locally, inspecting the tool
//! registry, and checking model health without standing up the gateway.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;
use dialoguer::{theme::ColorfulTheme, Confirm};
use tokio::sync::Mutex;

use openagent::agent::control_loop::{validate_goal, ControlLoop, DEFAULT_STEP_BUDGET};
use openagent::agent::event_channel::EventChannel;
use openagent::agent::fallback_client::{FallbackClient, ModelConfig};
use openagent::agent::session_state::SessionState;
use openagent::core::metrics::MetricsCollector;
use openagent::sandbox::PathGuard;
use openagent::tools::{
    AnalyzeTool, CountDirsTool, CountFilesTool, DeleteFilesTool, DuckDuckGoSearchTool,
    ListFilesTool, ReadFileTool, SystemCommandTool, ToolPolicy, ToolRegistry, WebGetTool,
    WriteFileTool,
};
use openagent::{Result, VERSION};

#[derive(Parser)]
#[command(
    name = "openagent",
    author = "OpenAgent Contributors",
    version = VERSION,
    about = "OpenAgent - run and inspect the autonomous agent control loop",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a goal through the control loop to completion, printing each event
    Goal {
        /// Natural-language goal to pursue
        goal: String,
        /// Maximum agent-loop steps before giving up
        #[arg(long)]
        max_steps: Option<u32>,
        /// Pre-authorize destructive tool calls for this run
        #[arg(long)]
        destructive: bool,
    },

    /// List registered tools and their policies
    Tools,

    /// Check reachability of the configured model chain
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("openagent=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Goal {
            goal,
            max_steps,
            destructive,
        } => run_goal(goal, max_steps, destructive).await,
        Commands::Tools => list_tools().await,
        Commands::Health => check_health().await,
    }
}

fn build_tool_registry() -> Result<ToolRegistry> {
    let config = openagent::config::load_config().unwrap_or_default();
    let guard = Arc::new(PathGuard::new(&config.sandbox.allowed_dir)?);

    let mut tools = ToolRegistry::new();
    tools.register(ReadFileTool::new(Arc::clone(&guard)));
    tools.register(WriteFileTool::new(guard.root().to_path_buf()));
    tools.register(CountFilesTool::new(Arc::clone(&guard)));
    tools.register(CountDirsTool::new(Arc::clone(&guard)));
    tools.register_with_policy(
        DeleteFilesTool::new(Arc::clone(&guard)),
        ToolPolicy {
            destructive: true,
            require_confirm: true,
            ..Default::default()
        },
    );
    tools.register(ListFilesTool::new(Arc::clone(&guard)));
    tools.register(WebGetTool::new());
    tools.register(AnalyzeTool);
    tools.register_with_policy(
        SystemCommandTool::new(),
        ToolPolicy {
            destructive: true,
            require_confirm: true,
            ..Default::default()
        },
    );
    tools.register(DuckDuckGoSearchTool::new());
    Ok(tools)
}

fn model_chain() -> Vec<ModelConfig> {
    let primary =
        std::env::var("OPENAGENT_MODEL_PRIMARY").unwrap_or_else(|_| "llama3".to_string());
    let host = std::env::var("OPENAGENT_LLM_HOST_URL")
        .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
    let fallbacks = std::env::var("OPENAGENT_MODEL_FALLBACKS").unwrap_or_default();

    let mut models = vec![ModelConfig {
        name: primary,
        base_url: host.clone(),
        timeout_secs: 30,
        max_tokens: 4096,
        priority: 0,
    }];
    for (i, name) in fallbacks
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .enumerate()
    {
        models.push(ModelConfig {
            name: name.to_string(),
            base_url: host.clone(),
            timeout_secs: 30,
            max_tokens: 4096,
            priority: (i + 1) as u32,
        });
    }
    models
}

async fn run_goal(goal: String, max_steps: Option<u32>, destructive: bool) -> Result<()> {
    let goal = validate_goal(&goal)?;

    if destructive
        && !Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("This run may invoke destructive tools. Continue?")
            .default(false)
            .interact()
            .unwrap_or(false)
    {
        println!("{}", style("aborted").yellow());
        return Ok(());
    }

    let tools = Arc::new(build_tool_registry()?);
    let client = Arc::new(FallbackClient::new(model_chain()));
    let control_loop = ControlLoop::new(tools, client).with_confirm_destructive(destructive);

    let state = Mutex::new(SessionState::new("cli"));
    let channel = Mutex::new(EventChannel::new("cli"));
    let metrics = Mutex::new(MetricsCollector::new());

    let mut rx = {
        let ch = channel.lock().await;
        ch.subscribe()
    };

    let printer = tokio::spawn(async move {
        while let Ok(event) = rx.recv().await {
            println!("{} {}", style(&event.event).cyan().bold(), event.data);
        }
    });

    let outcome = control_loop
        .run(&goal, max_steps.unwrap_or(DEFAULT_STEP_BUDGET), &state, &channel, &metrics)
        .await;
    let _ = printer.await;

    println!("{} {:?}", style("outcome:").green().bold(), outcome);
    Ok(())
}

async fn list_tools() -> Result<()> {
    let tools = build_tool_registry()?;
    for entry in tools.info() {
        let marker = if entry.destructive {
            style("destructive").red()
        } else {
            style("safe").green()
        };
        println!(
            "{:<20} [{}] {}",
            style(&entry.name).bold(),
            marker,
            entry.description
        );
    }
    Ok(())
}

async fn check_health() -> Result<()> {
    let client = FallbackClient::new(model_chain());
    let status = client.get_system_status().await;
    println!(
        "{} {}/{} models healthy (system_healthy={})",
        style("status:").bold(),
        status.healthy_models,
        status.total_models,
        status.system_healthy
    );
    Ok(())
}
