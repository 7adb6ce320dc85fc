//! Model fallback client
//!
//! Wraps an ordered chain of model endpoints on one base URL and walks the
//! chain on failure, caching cheap health probes for 60 seconds so a
//! degraded model isn't re-probed on every call.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

const HEALTH_CACHE_TTL_SECS: u64 = 60;
const HEALTH_CHECK_TIMEOUT_SECS: u64 = 5;

/// Configuration for a single model endpoint in the fallback chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    pub name: String,
    pub base_url: String,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    /// Lower priority value is tried first.
    pub priority: u32,
}

fn default_timeout() -> u64 {
    30
}

fn default_max_tokens() -> u32 {
    4096
}

/// Result of probing a single model's health.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub error: Option<String>,
    pub response_time_ms: Option<u64>,
}

/// Outcome of a fallback-chain generation call.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationOutcome {
    pub model_used: String,
    pub attempt: usize,
    pub response_text: String,
}

/// System-wide status across the whole fallback chain.
#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub base_url: String,
    pub primary_model: String,
    pub healthy_models: Vec<String>,
    pub total_models: usize,
    pub system_healthy: bool,
    pub model_details: Vec<(String, HealthStatus)>,
}

/// Generation request payload sent to the model endpoint.
#[derive(Debug, Clone, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Clone, Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// Walks an ordered chain of models on one backend, with cached health checks.
pub struct FallbackClient {
    client: reqwest::Client,
    models: Vec<ModelConfig>,
    health_cache: Cache<String, HealthStatus>,
}

impl FallbackClient {
    /// Build a client from an ordered model chain; `models[0]` is primary.
    pub fn new(models: Vec<ModelConfig>) -> Self {
        FallbackClient {
            client: reqwest::Client::new(),
            models,
            health_cache: Cache::builder()
                .time_to_live(Duration::from_secs(HEALTH_CACHE_TTL_SECS))
                .build(),
        }
    }

    fn primary(&self) -> Option<&ModelConfig> {
        self.models.iter().min_by_key(|m| m.priority)
    }

    fn ordered_models(&self) -> Vec<&ModelConfig> {
        let mut ordered: Vec<&ModelConfig> = self.models.iter().collect();
        ordered.sort_by_key(|m| m.priority);
        ordered
    }

    /// Check (and cache) the health of a single named model.
    pub async fn health_check(&self, model_name: &str) -> HealthStatus {
        if let Some(cached) = self.health_cache.get(model_name).await {
            return cached;
        }

        let Some(model) = self.models.iter().find(|m| m.name == model_name) else {
            return HealthStatus {
                healthy: false,
                error: Some("model not configured".into()),
                response_time_ms: None,
            };
        };

        let status = self.probe(model).await;
        self.health_cache
            .insert(model_name.to_string(), status.clone())
            .await;
        status
    }

    async fn probe(&self, model: &ModelConfig) -> HealthStatus {
        let tags_url = format!("{}/api/tags", model.base_url);
        let tags_resp = self
            .client
            .get(&tags_url)
            .timeout(Duration::from_secs(HEALTH_CHECK_TIMEOUT_SECS))
            .send()
            .await;

        let tags = match tags_resp {
            Ok(r) if r.status().is_success() => r.json::<TagsResponse>().await.ok(),
            Ok(r) => {
                return HealthStatus {
                    healthy: false,
                    error: Some(format!("backend not responding: {}", r.status())),
                    response_time_ms: None,
                }
            }
            Err(e) => {
                return HealthStatus {
                    healthy: false,
                    error: Some(format!("health check failed: {e}")),
                    response_time_ms: None,
                }
            }
        };

        if let Some(tags) = &tags {
            if !tags.models.iter().any(|m| m.name == model.name) {
                return HealthStatus {
                    healthy: false,
                    error: Some(format!("model {} not found on backend", model.name)),
                    response_time_ms: None,
                };
            }
        }

        let start = std::time::Instant::now();
        let test_req = GenerateRequest {
            model: &model.name,
            prompt: "Respond with exactly: OK",
            stream: false,
            options: GenerateOptions {
                temperature: 0.0,
                num_predict: 10,
            },
        };
        let resp = self
            .client
            .post(format!("{}/api/generate", model.base_url))
            .json(&test_req)
            .timeout(Duration::from_secs(model.timeout_secs))
            .send()
            .await;

        let elapsed = start.elapsed().as_millis() as u64;
        match resp {
            Ok(r) if r.status().is_success() => match r.json::<GenerateResponse>().await {
                Ok(body) => HealthStatus {
                    healthy: body.response.contains("OK"),
                    error: None,
                    response_time_ms: Some(elapsed),
                },
                Err(e) => HealthStatus {
                    healthy: false,
                    error: Some(e.to_string()),
                    response_time_ms: Some(elapsed),
                },
            },
            Ok(r) => HealthStatus {
                healthy: false,
                error: Some(format!("HTTP {}", r.status())),
                response_time_ms: Some(elapsed),
            },
            Err(e) => HealthStatus {
                healthy: false,
                error: Some(e.to_string()),
                response_time_ms: Some(elapsed),
            },
        }
    }

    /// Return the first healthy model name in priority order, if any.
    pub async fn get_available_model(&self) -> Option<String> {
        for model in self.ordered_models() {
            let health = self.health_check(&model.name).await;
            if health.healthy {
                return Some(model.name.clone());
            }
            warn!(model = %model.name, error = ?health.error, "model unhealthy");
        }
        None
    }

    /// Generate a completion, walking the fallback chain until one succeeds
    /// or `max_retries` models have been tried.
    pub async fn call_with_fallback(&self, prompt: &str, max_retries: usize) -> Result<GenerationOutcome> {
        let mut last_error = String::from("no models configured");

        for (attempt, model) in self.ordered_models().into_iter().enumerate() {
            if attempt >= max_retries {
                break;
            }

            let health = self.health_check(&model.name).await;
            if !health.healthy {
                last_error = health.error.unwrap_or_else(|| "model unhealthy".into());
                continue;
            }

            let request = GenerateRequest {
                model: &model.name,
                prompt,
                stream: false,
                options: GenerateOptions {
                    temperature: 0.3,
                    num_predict: model.max_tokens,
                },
            };

            match self
                .client
                .post(format!("{}/api/generate", model.base_url))
                .json(&request)
                .timeout(Duration::from_secs(model.timeout_secs))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => match resp.json::<GenerateResponse>().await {
                    Ok(body) => {
                        info!(model = %model.name, attempt, "fallback call succeeded");
                        return Ok(GenerationOutcome {
                            model_used: model.name.clone(),
                            attempt: attempt + 1,
                            response_text: body.response.trim().to_string(),
                        });
                    }
                    Err(e) => last_error = e.to_string(),
                },
                Ok(resp) => {
                    last_error = format!("HTTP {}: {}", resp.status(), resp.text().await.unwrap_or_default());
                }
                Err(e) => {
                    last_error = e.to_string();
                    self.health_cache
                        .insert(
                            model.name.clone(),
                            HealthStatus {
                                healthy: false,
                                error: Some(last_error.clone()),
                                response_time_ms: None,
                            },
                        )
                        .await;
                }
            }
        }

        Err(Error::NetworkError(format!(
            "all models failed, last error: {last_error}"
        )))
    }

    /// Snapshot health across the whole chain.
    pub async fn get_system_status(&self) -> SystemStatus {
        let mut details = Vec::new();
        for model in self.ordered_models() {
            details.push((model.name.clone(), self.health_check(&model.name).await));
        }
        let healthy_models: Vec<String> = details
            .iter()
            .filter(|(_, h)| h.healthy)
            .map(|(n, _)| n.clone())
            .collect();

        SystemStatus {
            base_url: self
                .primary()
                .map(|m| m.base_url.clone())
                .unwrap_or_default(),
            primary_model: self.primary().map(|m| m.name.clone()).unwrap_or_default(),
            system_healthy: !healthy_models.is_empty(),
            healthy_models,
            total_models: self.models.len(),
            model_details: details,
        }
    }
}

/// Shared handle suitable for passing into tool implementations.
pub type SharedFallbackClient = Arc<FallbackClient>;

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> FallbackClient {
        FallbackClient::new(vec![
            ModelConfig {
                name: "primary".into(),
                base_url: "http://127.0.0.1:1".into(),
                timeout_secs: 1,
                max_tokens: 128,
                priority: 0,
            },
            ModelConfig {
                name: "fallback".into(),
                base_url: "http://127.0.0.1:1".into(),
                timeout_secs: 1,
                max_tokens: 128,
                priority: 1,
            },
        ])
    }

    #[tokio::test]
    async fn unconfigured_model_reports_unhealthy() {
        let client = chain();
        let status = client.health_check("nonexistent").await;
        assert!(!status.healthy);
    }

    #[tokio::test]
    async fn ordered_models_respects_priority() {
        let client = chain();
        let ordered = client.ordered_models();
        assert_eq!(ordered[0].name, "primary");
        assert_eq!(ordered[1].name, "fallback");
    }

    #[tokio::test]
    async fn call_with_fallback_errors_when_all_models_unreachable() {
        let client = chain();
        let result = client.call_with_fallback("hello", 2).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn system_status_reports_all_models() {
        let client = chain();
        let status = client.get_system_status().await;
        assert_eq!(status.total_models, 2);
        assert!(!status.system_healthy);
    }
}
