//! Per-session event channel for streaming control-loop progress
//!
//! Single producer (the control loop), single logical consumer (one SSE
//! stream per session). Enforces the strict per-step ordering contract:
//! `plan(N), critic(N), exec(N), obs(N), hyp(N), bb(N), met(N)` before the
//! loop may advance to step `N+1`. A terminal event (`final`/`cancel`/
//! `error`) closes the channel.

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;
const MAX_SINGLE_OBS_CHARS: usize = 4000;
const MAX_BATCH_OBS_CHARS: usize = 1000;

/// One emitted event, ready to be serialized onto the wire.
#[derive(Debug, Clone, Serialize)]
pub struct AgentEvent {
    pub event: String,
    pub data: Value,
}

/// Emits ordered events for one session and exposes a broadcast receiver
/// for SSE consumers.
pub struct EventChannel {
    session_id: String,
    step: u32,
    cancelled: bool,
    closed: bool,
    sender: broadcast::Sender<AgentEvent>,
}

impl EventChannel {
    pub fn new(session_id: impl Into<String>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        EventChannel {
            session_id: session_id.into(),
            step: 0,
            cancelled: false,
            closed: false,
            sender,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.sender.subscribe()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Request cancellation; takes effect at the next substep boundary the
    /// control loop checks, and immediately emits a `cancel` event.
    pub fn cancel(&mut self) {
        if self.closed {
            return;
        }
        self.cancelled = true;
        self.emit_raw("cancel", json!({"cancelled": true, "step": self.step}));
        self.closed = true;
    }

    fn emit_raw(&self, event: &str, mut data: Value) {
        if let Some(obj) = data.as_object_mut() {
            obj.insert("session_id".into(), json!(self.session_id));
            obj.insert("step".into(), json!(self.step));
            obj.insert("timestamp".into(), json!(super::session_state::unix_timestamp()));
        }
        // A full broadcast channel with no receivers is not an error: the
        // SSE stream may not have attached yet, or may have disconnected.
        let _ = self.sender.send(AgentEvent {
            event: event.to_string(),
            data,
        });
    }

    fn emit(&mut self, event: &str, data: Value, step: Option<u32>) {
        if self.closed || (self.cancelled && event != "cancel") {
            return;
        }
        if let Some(step) = step {
            self.step = step;
        }
        self.emit_raw(event, data);
        if matches!(event, "final" | "cancel" | "error") {
            self.closed = true;
        }
    }

    pub fn emit_status(&mut self, status: &str) {
        self.emit("status", json!({"status": status}), None);
    }

    pub fn emit_plan(&mut self, step: u32, plan: &Value) {
        self.emit(
            "plan",
            json!({
                "subgoals": plan.get("subgoals").cloned().unwrap_or(json!([])),
                "success_criteria": plan.get("success_criteria").cloned().unwrap_or(json!("")),
                "next_action": plan.get("next_action").cloned().unwrap_or(json!("")),
                "args": plan.get("args").cloned().unwrap_or(json!({})),
                "expected_observation": plan.get("expected_observation").cloned().unwrap_or(json!("")),
                "rationale": plan.get("rationale").cloned().unwrap_or(json!("")),
            }),
            Some(step),
        );
    }

    pub fn emit_critic(&mut self, step: u32, approved: bool, changes: &[String], reasoning: &str) {
        self.emit(
            "critic",
            json!({"approved": approved, "changes": changes, "reasoning": reasoning}),
            Some(step),
        );
    }

    pub fn emit_exec(&mut self, step: u32, tool: &str, args: &Value, batch_idx: Option<usize>) {
        let mut data = json!({"tool": tool, "args": args});
        if let Some(idx) = batch_idx {
            data["batch_idx"] = json!(idx);
        }
        self.emit("exec", data, Some(step));
    }

    pub fn emit_obs(&mut self, step: u32, observation: &str, signature: &str, error_class: Option<&str>) {
        let clipped = observation.chars().count() > MAX_SINGLE_OBS_CHARS;
        let obs_str = if clipped {
            observation.chars().take(MAX_SINGLE_OBS_CHARS).collect::<String>() + "... [clipped]"
        } else {
            observation.to_string()
        };
        self.emit(
            "obs",
            json!({"observation": obs_str, "signature": signature, "error_class": error_class, "clipped": clipped}),
            Some(step),
        );
    }

    pub fn emit_obs_batch(&mut self, step: u32, observations: &[(String, String, Option<String>)]) {
        let batch: Vec<Value> = observations
            .iter()
            .enumerate()
            .map(|(i, (obs, sig, err))| {
                let clipped = obs.chars().count() > MAX_BATCH_OBS_CHARS;
                let obs_str = if clipped {
                    obs.chars().take(MAX_BATCH_OBS_CHARS).collect::<String>() + "... [clipped]"
                } else {
                    obs.clone()
                };
                json!({"idx": i, "observation": obs_str, "signature": sig, "error_class": err, "clipped": clipped})
            })
            .collect();
        self.emit("obs", json!({"batch": true, "observations": batch}), Some(step));
    }

    pub fn emit_hyp(&mut self, step: u32, expected_match: bool, actual_sig: &str, expected_sig: &str, notes: &str) {
        self.emit(
            "hyp",
            json!({"expected_match": expected_match, "actual_signature": actual_sig, "expected_signature": expected_sig, "notes": notes}),
            Some(step),
        );
    }

    pub fn emit_blackboard(&mut self, step: u32, recent_facts: &[String], last_obs_count: usize, step_count: usize) {
        self.emit(
            "bb",
            json!({
                "facts_count": recent_facts.len(),
                "recent_facts": recent_facts,
                "last_obs_count": last_obs_count,
                "step_count": step_count,
            }),
            Some(step),
        );
    }

    pub fn emit_metrics(
        &mut self,
        step: u32,
        cpu_percent: f32,
        memory_percent: f32,
        confidence_trend: &[f64],
        no_progress_count: u32,
        latency_ms: u64,
        tokens_used: u64,
    ) {
        self.emit(
            "met",
            json!({
                "cpu_percent": cpu_percent,
                "memory_percent": memory_percent,
                "confidence_trend": confidence_trend,
                "no_progress_count": no_progress_count,
                "latency_ms": latency_ms,
                "tokens_used": tokens_used,
            }),
            Some(step),
        );
    }

    pub fn emit_final(&mut self, result: &str, success: bool, confidence: f64, next_steps: &[String]) {
        self.emit(
            "final",
            json!({"result": result, "success": success, "confidence": confidence, "next_steps": next_steps}),
            None,
        );
    }

    pub fn emit_error(&mut self, error: &str) {
        self.emit("error", json!({"error": error}), None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_through_metrics_ordering_is_preserved() {
        let mut channel = EventChannel::new("s1");
        let mut rx = channel.subscribe();

        channel.emit_plan(1, &json!({"next_action": "read_file"}));
        channel.emit_critic(1, true, &[], "ok");
        channel.emit_exec(1, "read_file", &json!({}), None);
        channel.emit_obs(1, "result text", "str[len=11]", None);
        channel.emit_hyp(1, true, "sig", "sig", "");
        channel.emit_blackboard(1, &[], 0, 1);
        channel.emit_metrics(1, 10.0, 20.0, &[], 0, 5, 0);

        let expected_order = ["plan", "critic", "exec", "obs", "hyp", "bb", "met"];
        for expected in expected_order {
            let event = rx.try_recv().unwrap();
            assert_eq!(event.event, expected);
        }
    }

    #[test]
    fn final_event_closes_channel() {
        let mut channel = EventChannel::new("s1");
        channel.emit_final("done", true, 0.9, &[]);
        assert!(channel.is_closed());
        channel.emit_status("should not be emitted");
        let mut rx = channel.subscribe();
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn cancel_suppresses_further_events() {
        let mut channel = EventChannel::new("s1");
        let mut rx = channel.subscribe();
        channel.cancel();
        assert!(channel.is_cancelled());
        let event = rx.try_recv().unwrap();
        assert_eq!(event.event, "cancel");
        channel.emit_status("ignored");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn single_obs_clips_at_4000_chars() {
        let mut channel = EventChannel::new("s1");
        let mut rx = channel.subscribe();
        let long_obs = "x".repeat(5000);
        channel.emit_obs(1, &long_obs, "sig", None);
        let event = rx.try_recv().unwrap();
        assert_eq!(event.data["clipped"], true);
        assert!(event.data["observation"].as_str().unwrap().len() < 5000);
    }

    #[test]
    fn batch_obs_clips_at_1000_chars() {
        let mut channel = EventChannel::new("s1");
        let mut rx = channel.subscribe();
        let long_obs = "y".repeat(2000);
        channel.emit_obs_batch(1, &[(long_obs, "sig".into(), None)]);
        let event = rx.try_recv().unwrap();
        let observations = event.data["observations"].as_array().unwrap();
        assert_eq!(observations[0]["clipped"], true);
    }
}
