//! OpenAgent Gateway - the thin HTTP adapter over the control loop
//!
//! Exposes exactly the seven routes the core relies on: `GET /auto/stream`
//! (SSE), `GET /health`, `GET /tools`, `GET /metrics`, `DELETE
//! /sessions/{id}`, `GET /sessions/{id}/export`, `POST /confirm/{id}`. The
//! event channel (`crate::agent::event_channel`) is the authoritative
//! ordering point; this adapter only serializes what it's handed and never
//! reorders it.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use openagent::agent::control_loop::{validate_goal, ControlLoop, DEFAULT_STEP_BUDGET};
use openagent::agent::event_channel::EventChannel;
use openagent::agent::fallback_client::{FallbackClient, ModelConfig};
use openagent::agent::outcome_log::OutcomeLog;
use openagent::agent::session_registry::SessionRegistry;
use openagent::core::metrics::MetricsCollector;
use openagent::sandbox::PathGuard;
use openagent::tools::{
    AnalyzeTool, CountDirsTool, CountFilesTool, DeleteFilesTool, DuckDuckGoSearchTool,
    ListFilesTool, ReadFileTool, SystemCommandTool, ToolPolicy, ToolRegistry, WebGetTool,
    WriteFileTool,
};

/// Environment-derived settings for the gateway binary, read directly since
/// they don't fit the channel-oriented `Config` shape `config::load_config`
/// already provides.
struct GatewayEnv {
    bind: String,
    port: u16,
    model_primary: String,
    model_fallbacks: Vec<String>,
    llm_host_url: String,
    allowed_origins: Vec<String>,
    step_budget_default: u32,
    tools_config_path: Option<std::path::PathBuf>,
}

impl GatewayEnv {
    fn from_env() -> Self {
        let model_primary =
            std::env::var("OPENAGENT_MODEL_PRIMARY").unwrap_or_else(|_| "llama3".to_string());
        let model_fallbacks = std::env::var("OPENAGENT_MODEL_FALLBACKS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let llm_host_url = std::env::var("OPENAGENT_LLM_HOST_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:11434".to_string());
        let allowed_origins = std::env::var("OPENAGENT_ALLOWED_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let step_budget_default = std::env::var("OPENAGENT_STEP_BUDGET_DEFAULT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_STEP_BUDGET);
        let tools_config_path = std::env::var("OPENAGENT_TOOLS_CONFIG")
            .ok()
            .map(std::path::PathBuf::from);
        let bind =
            std::env::var("OPENAGENT_GATEWAY_BIND").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = std::env::var("OPENAGENT_GATEWAY_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(18789);

        GatewayEnv {
            bind,
            port,
            model_primary,
            model_fallbacks,
            llm_host_url,
            allowed_origins,
            step_budget_default,
            tools_config_path,
        }
    }

    fn model_chain(&self) -> Vec<ModelConfig> {
        let mut models = vec![ModelConfig {
            name: self.model_primary.clone(),
            base_url: self.llm_host_url.clone(),
            timeout_secs: 30,
            max_tokens: 4096,
            priority: 0,
        }];
        for (i, name) in self.model_fallbacks.iter().enumerate() {
            models.push(ModelConfig {
                name: name.clone(),
                base_url: self.llm_host_url.clone(),
                timeout_secs: 30,
                max_tokens: 4096,
                priority: (i + 1) as u32,
            });
        }
        models
    }
}

#[derive(Clone)]
struct AppState {
    tools: Arc<ToolRegistry>,
    client: Arc<FallbackClient>,
    sessions: Arc<SessionRegistry>,
    channels: Arc<dashmap::DashMap<String, Arc<Mutex<EventChannel>>>>,
    metrics: Arc<Mutex<MetricsCollector>>,
    outcome_log: Arc<OutcomeLog>,
    step_budget_default: u32,
    started_at: std::time::Instant,
}

#[tokio::main]
async fn main() -> openagent::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let env = GatewayEnv::from_env();
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

    if let Some(path) = &env.tools_config_path {
        if let Err(e) = tools.load_tools_config_file(path).await {
            warn!(error = %e, path = %path.display(), "failed to apply tools config file");
        }
    }
    let tools = Arc::new(tools);

    let client = Arc::new(FallbackClient::new(env.model_chain()));
    let sessions = Arc::new(SessionRegistry::new());
    let channels: Arc<dashmap::DashMap<String, Arc<Mutex<EventChannel>>>> =
        Arc::new(dashmap::DashMap::new());
    let metrics = Arc::new(Mutex::new(MetricsCollector::new()));
    let outcome_log = Arc::new(OutcomeLog::new(
        openagent::config::state_dir().join("outcomes.jsonl"),
    ));

    let state = AppState {
        tools,
        client,
        sessions,
        channels,
        metrics,
        outcome_log,
        step_budget_default: env.step_budget_default,
        started_at: std::time::Instant::now(),
    };

    let cors = if env.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = env
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    };

    let app = Router::new()
        .route("/auto/stream", get(stream_goal))
        .route("/health", get(health))
        .route("/tools", get(list_tools))
        .route("/metrics", get(host_metrics))
        .route("/sessions/:id", delete(cancel_session))
        .route("/sessions/:id/export", get(export_session))
        .route("/confirm/:id", post(confirm_session))
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", env.bind, env.port);
    info!(%addr, "openagent gateway listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct StreamParams {
    goal: String,
    max_steps: Option<u32>,
    #[serde(default)]
    destructive: bool,
    session_id: Option<String>,
}

async fn stream_goal(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, (StatusCode, String)>
{
    let goal = validate_goal(&params.goal).map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let session_id = params
        .session_id
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let step_budget = params.max_steps.unwrap_or(state.step_budget_default);

    let session_state = state.sessions.get_or_create(&session_id);
    let channel = Arc::new(Mutex::new(EventChannel::new(session_id.clone())));
    state.channels.insert(session_id.clone(), Arc::clone(&channel));
    let rx = channel.lock().await.subscribe();

    let control_loop = ControlLoop::new(Arc::clone(&state.tools), Arc::clone(&state.client))
        .with_outcome_log(Arc::clone(&state.outcome_log))
        .with_confirm_destructive(params.destructive);

    let metrics = Arc::clone(&state.metrics);
    let channels = Arc::clone(&state.channels);
    let sessions = Arc::clone(&state.sessions);
    let session_id_for_task = session_id.clone();
    tokio::spawn(async move {
        control_loop
            .run(&goal, step_budget, &session_state, &channel, &metrics)
            .await;
        channels.remove(&session_id_for_task);
        sessions.remove(&session_id_for_task);
    });

    let stream = BroadcastStream::new(rx).filter_map(|item| match item {
        Ok(event) => Some(Ok(Event::default()
            .event(event.event)
            .data(event.data.to_string()))),
        Err(_lagged) => None,
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(30))))
}

async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "ok": true,
        "timestamp": openagent::agent::session_state::unix_timestamp(),
        "tools_loaded": state.tools.count(),
        "active_sessions": state.sessions.active_count(),
        "uptime_secs": state.started_at.elapsed().as_secs(),
    }))
}

async fn list_tools(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "tools": state.tools.info() }))
}

async fn host_metrics(State(state): State<AppState>) -> Json<serde_json::Value> {
    let snapshot = state.metrics.lock().await.collect();
    Json(serde_json::to_value(snapshot).unwrap_or_else(|_| json!({})))
}

async fn cancel_session(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> Response {
    match state.channels.get(&id) {
        Some(channel) => {
            channel.lock().await.cancel();
            StatusCode::NO_CONTENT.into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("unknown session: {id}")).into_response(),
    }
}

async fn export_session(State(state): State<AppState>, AxumPath(id): AxumPath<String>) -> Response {
    match state.sessions.get(&id) {
        Some(session) => {
            let guard = session.lock().await;
            Json(json!({
                "session_id": guard.session_id,
                "total_steps": guard.total_steps,
                "no_progress_count": guard.no_progress_count,
                "strategy_switches": guard.strategy_switches,
                "duration_secs": guard.duration_secs(),
                "step_ledger": guard.step_ledger(),
                "facts": guard.facts().collect::<Vec<_>>(),
                "last_obs": guard.last_obs().collect::<Vec<_>>(),
                "confidence_trend": guard.confidence_trend(),
            }))
            .into_response()
        }
        None => (StatusCode::NOT_FOUND, format!("unknown session: {id}")).into_response(),
    }
}

#[derive(Debug, Deserialize, Default)]
struct ConfirmBody {
    #[serde(default)]
    #[allow(dead_code)]
    note: Option<String>,
}

/// Stub human-in-the-loop confirmation endpoint. Destructive confirmation is
/// actually granted per-stream via `/auto/stream?destructive=true`; this
/// route exists so a caller has somewhere to post an async confirmation
/// decision without the gateway needing a pending-approval queue yet.
async fn confirm_session(
    State(state): State<AppState>,
    AxumPath(id): AxumPath<String>,
    body: Option<Json<ConfirmBody>>,
) -> Response {
    let _ = body.unwrap_or_default();
    match state.sessions.get(&id) {
        Some(_) => Json(json!({"session_id": id, "acknowledged": true})).into_response(),
        None => (StatusCode::NOT_FOUND, format!("unknown session: {id}")).into_response(),
    }
}
