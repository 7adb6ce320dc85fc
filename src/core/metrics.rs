//! System and per-session performance metrics
//!
//! Scores purely on CPU/memory, which is what `sysinfo` can report
//! portably across hosts.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::time::Instant;

use serde::Serialize;
use sysinfo::System;

const HISTORY_SIZE: usize = 50;
const LOAD_WINDOW: usize = 3;
const CONFIDENCE_TREND_WINDOW: usize = 10;

/// A single host resource snapshot.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SystemSnapshot {
    pub cpu_percent: f32,
    pub memory_percent: f32,
    pub available_memory_gb: f64,
    pub timestamp: f64,
}

/// Collects host-level metrics over time with a bounded ring buffer.
pub struct MetricsCollector {
    sys: System,
    history: VecDeque<SystemSnapshot>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        MetricsCollector {
            sys,
            history: VecDeque::new(),
        }
    }

    /// Take a fresh snapshot and push it into the bounded history.
    pub fn collect(&mut self) -> SystemSnapshot {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let cpu_percent = if self.sys.cpus().is_empty() {
            0.0
        } else {
            self.sys.cpus().iter().map(|c| c.cpu_usage()).sum::<f32>() / self.sys.cpus().len() as f32
        };

        let total = self.sys.total_memory().max(1) as f64;
        let used = self.sys.used_memory() as f64;
        let memory_percent = (used / total * 100.0) as f32;
        let available_gb = (self.sys.total_memory().saturating_sub(self.sys.used_memory())) as f64
            / (1024.0 * 1024.0 * 1024.0);

        let snapshot = SystemSnapshot {
            cpu_percent,
            memory_percent,
            available_memory_gb: available_gb,
            timestamp: crate::agent::session_state::unix_timestamp(),
        };

        self.history.push_back(snapshot);
        while self.history.len() > HISTORY_SIZE {
            self.history.pop_front();
        }
        snapshot
    }

    pub fn is_under_load(&self) -> bool {
        match self.history.back() {
            Some(latest) => latest.cpu_percent > 80.0 || latest.memory_percent > 85.0,
            None => false,
        }
    }

    pub fn should_enable_eco_mode(&self) -> bool {
        if self.history.len() < LOAD_WINDOW {
            return false;
        }
        let recent: Vec<&SystemSnapshot> = self.history.iter().rev().take(LOAD_WINDOW).collect();
        let avg_cpu: f32 = recent.iter().map(|m| m.cpu_percent).sum::<f32>() / recent.len() as f32;
        let avg_memory: f32 = recent.iter().map(|m| m.memory_percent).sum::<f32>() / recent.len() as f32;
        avg_cpu > 70.0 || avg_memory > 80.0
    }

    /// Score in `[0.0, 1.0]`, higher is better.
    pub fn get_performance_score(&self) -> f64 {
        let Some(latest) = self.history.back() else {
            return 1.0;
        };
        let cpu_score = (1.0 - latest.cpu_percent as f64 / 100.0).max(0.0);
        let memory_score = (1.0 - latest.memory_percent as f64 / 100.0).max(0.0);
        (cpu_score + memory_score) / 2.0
    }
}

/// Per-session runtime metrics: tool usage, errors, LLM token spend.
pub struct SessionMetrics {
    pub session_id: String,
    start_time: Instant,
    step_timings: Vec<f64>,
    tool_usage: HashMap<String, u32>,
    error_counts: HashMap<String, u32>,
    pub token_usage: u64,
    pub llm_calls: u32,
    confidence_history: Vec<f64>,
}

impl SessionMetrics {
    pub fn new(session_id: impl Into<String>) -> Self {
        SessionMetrics {
            session_id: session_id.into(),
            start_time: Instant::now(),
            step_timings: Vec::new(),
            tool_usage: HashMap::new(),
            error_counts: HashMap::new(),
            token_usage: 0,
            llm_calls: 0,
            confidence_history: Vec::new(),
        }
    }

    pub fn record_step_timing(&mut self, duration_secs: f64) {
        self.step_timings.push(duration_secs);
    }

    pub fn record_tool_usage(&mut self, tool_name: &str) {
        *self.tool_usage.entry(tool_name.to_string()).or_insert(0) += 1;
    }

    pub fn record_error(&mut self, error_class: &str) {
        *self.error_counts.entry(error_class.to_string()).or_insert(0) += 1;
    }

    pub fn record_llm_call(&mut self, tokens_used: u64) {
        self.llm_calls += 1;
        self.token_usage += tokens_used;
    }

    pub fn record_confidence(&mut self, confidence: f64) {
        self.confidence_history.push(confidence);
    }

    pub fn average_step_time(&self) -> f64 {
        if self.step_timings.is_empty() {
            0.0
        } else {
            self.step_timings.iter().sum::<f64>() / self.step_timings.len() as f64
        }
    }

    pub fn session_duration(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn confidence_trend(&self) -> Vec<f64> {
        let start = self.confidence_history.len().saturating_sub(CONFIDENCE_TREND_WINDOW);
        self.confidence_history[start..].to_vec()
    }
}

/// Owns the host collector plus every session's metrics.
pub struct MetricsManager {
    system: MetricsCollector,
    sessions: HashMap<String, SessionMetrics>,
}

impl Default for MetricsManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsManager {
    pub fn new() -> Self {
        MetricsManager {
            system: MetricsCollector::new(),
            sessions: HashMap::new(),
        }
    }

    pub fn session_mut(&mut self, session_id: &str) -> &mut SessionMetrics {
        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| SessionMetrics::new(session_id))
    }

    pub fn collect_system(&mut self) -> SystemSnapshot {
        self.system.collect()
    }

    pub fn is_under_load(&self) -> bool {
        self.system.is_under_load()
    }

    pub fn should_enable_eco_mode(&self) -> bool {
        self.system.should_enable_eco_mode()
    }

    pub fn performance_score(&self) -> f64 {
        self.system.get_performance_score()
    }

    pub fn cleanup_session(&mut self, session_id: &str) {
        self.sessions.remove(session_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance_score_is_one_with_no_history() {
        let collector = MetricsCollector::new();
        assert_eq!(collector.get_performance_score(), 1.0);
    }

    #[test]
    fn performance_score_in_unit_range_after_collect() {
        let mut collector = MetricsCollector::new();
        collector.collect();
        let score = collector.get_performance_score();
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn session_metrics_tracks_tool_usage() {
        let mut metrics = SessionMetrics::new("s1");
        metrics.record_tool_usage("read_file");
        metrics.record_tool_usage("read_file");
        metrics.record_error("timeout");
        assert_eq!(metrics.tool_usage.get("read_file"), Some(&2));
        assert_eq!(metrics.error_counts.get("timeout"), Some(&1));
    }

    #[test]
    fn average_step_time_with_no_steps_is_zero() {
        let metrics = SessionMetrics::new("s1");
        assert_eq!(metrics.average_step_time(), 0.0);
    }

    #[test]
    fn confidence_trend_caps_at_window() {
        let mut metrics = SessionMetrics::new("s1");
        for i in 0..20 {
            metrics.record_confidence(i as f64 / 20.0);
        }
        assert_eq!(metrics.confidence_trend().len(), CONFIDENCE_TREND_WINDOW);
    }

    #[test]
    fn manager_reuses_session_metrics() {
        let mut manager = MetricsManager::new();
        manager.session_mut("s1").record_llm_call(10);
        assert_eq!(manager.session_mut("s1").token_usage, 10);
    }
}
