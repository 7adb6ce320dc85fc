//! Goal-completion verifier: fast heuristic first, LLM fallback second
//!
//! Falls back to a rule-based key-info extraction pass when the LLM call
//! fails or times out.

use serde::Serialize;
use serde_json::Value;

use crate::agent::fallback_client::FallbackClient;
use crate::agent::json_loose::loads_loose;

const SUCCESS_MARKERS: &[&str] = &["found", "complete", "success", "count"];
const FAILURE_MARKERS: &[&str] = &["error", "failed"];

/// Verifier's decision about whether the goal has been met.
#[derive(Debug, Clone, Serialize)]
pub struct VerifierVerdict {
    pub finish: bool,
    pub result: String,
    pub confidence: f64,
    pub reasoning: String,
}

/// Fast, local heuristic. Returns `None` when inconclusive so the caller can
/// fall back to an LLM call.
pub fn heuristic_verify(last_observation: &str) -> Option<VerifierVerdict> {
    if last_observation.trim().is_empty() {
        return None;
    }

    let lower = last_observation.to_lowercase();
    if FAILURE_MARKERS.iter().any(|m| lower.contains(m)) {
        return None;
    }

    if let Ok(parsed) = serde_json::from_str::<Value>(last_observation) {
        if parsed.is_object() && (parsed.get("count").is_some() || parsed.get("result").is_some()) {
            return Some(VerifierVerdict {
                finish: true,
                result: last_observation.to_string(),
                confidence: 0.9,
                reasoning: "observation is a mapping carrying count/result".to_string(),
            });
        }
    }

    if SUCCESS_MARKERS.iter().any(|m| lower.contains(m)) {
        return Some(VerifierVerdict {
            finish: true,
            result: last_observation.to_string(),
            confidence: 0.9,
            reasoning: "observation contains a success marker".to_string(),
        });
    }

    None
}

/// LLM fallback: called only when the heuristic is inconclusive. Carries the
/// goal and up to the last 8 observations.
pub async fn llm_verify(
    goal: &str,
    observations: &[String],
    client: &FallbackClient,
) -> VerifierVerdict {
    let obs_block = observations
        .iter()
        .rev()
        .take(8)
        .rev()
        .map(|o| format!("- {o}"))
        .collect::<Vec<_>>()
        .join("\n");

    let prompt = format!(
        "Goal: {goal}\nObservations so far:\n{obs_block}\n\n\
         Has the goal been met? Respond with JSON: \
         {{\"finish\": bool, \"result\": string, \"confidence\": number between 0 and 1, \"reasoning\": string}}"
    );

    let outcome = match client.call_with_fallback(&prompt, 3).await {
        Ok(o) => o,
        Err(e) => {
            return fallback_verdict(observations, &format!("verifier LLM call failed: {e}"));
        }
    };

    let parsed = match loads_loose(&outcome.response_text) {
        Ok(p) => p,
        Err(e) => {
            return fallback_verdict(observations, &format!("verifier response unparsable: {e}"));
        }
    };

    let finish = parsed.value.get("finish").and_then(Value::as_bool).unwrap_or(false);
    let result = parsed
        .value
        .get("result")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();
    let confidence = parsed
        .value
        .get("confidence")
        .and_then(Value::as_f64)
        .unwrap_or(0.5)
        .clamp(0.0, 1.0);
    let reasoning = parsed
        .value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or("")
        .to_string();

    VerifierVerdict {
        finish,
        result,
        confidence,
        reasoning,
    }
}

fn fallback_verdict(observations: &[String], reasoning: &str) -> VerifierVerdict {
    VerifierVerdict {
        finish: false,
        result: observations.last().cloned().unwrap_or_default(),
        confidence: 0.5,
        reasoning: reasoning.to_string(),
    }
}

/// Conversational goals skip the loop's verification entirely: the single
/// LLM answer is final, with fixed high confidence if it looks substantive.
pub fn conversational_verdict(answer: &str) -> VerifierVerdict {
    let confidence = if answer.chars().count() > 10 { 0.95 } else { 0.6 };
    VerifierVerdict {
        finish: true,
        result: answer.to_string(),
        confidence,
        reasoning: "conversational goal answered directly, no verification step".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_observation_is_inconclusive() {
        assert!(heuristic_verify("").is_none());
    }

    #[test]
    fn observation_mentioning_error_is_inconclusive() {
        assert!(heuristic_verify("the tool failed with an error").is_none());
    }

    #[test]
    fn observation_with_success_marker_finishes() {
        let verdict = heuristic_verify("Found 12 files, task complete").unwrap();
        assert!(verdict.finish);
        assert_eq!(verdict.confidence, 0.9);
    }

    #[test]
    fn mapping_with_count_key_finishes() {
        let verdict = heuristic_verify(r#"{"count": 5}"#).unwrap();
        assert!(verdict.finish);
    }

    #[test]
    fn observation_without_markers_is_inconclusive() {
        assert!(heuristic_verify("the weather is nice today").is_none());
    }

    #[test]
    fn conversational_answer_over_ten_chars_has_high_confidence() {
        let verdict = conversational_verdict("Paris is the capital of France.");
        assert!(verdict.finish);
        assert!(verdict.confidence >= 0.9);
    }

    #[test]
    fn conversational_short_answer_has_lower_confidence() {
        let verdict = conversational_verdict("Paris");
        assert!(verdict.confidence < 0.9);
    }
}
