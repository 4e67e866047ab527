use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use super::{
    build_prompt, AdvisoryContext, AdvisoryOracle, AdvisoryOrigin, AdvisoryResult, BASELINE_SCORE,
};
use crate::clock::{Clock, SystemClock};
use crate::error::AdvisoryError;

/// Requests advisory scores and owns the last good result.
pub struct AdvisoryClient {
    oracle: Arc<dyn AdvisoryOracle>,
    timeout: Duration,
    fallback_recommendation: String,
    last_good: Mutex<Option<AdvisoryResult>>,
    clock: Arc<dyn Clock>,
}

impl AdvisoryClient {
    pub fn new(
        oracle: Arc<dyn AdvisoryOracle>,
        timeout: Duration,
        fallback_recommendation: &str,
    ) -> Self {
        Self {
            oracle,
            timeout,
            fallback_recommendation: fallback_recommendation.to_string(),
            last_good: Mutex::new(None),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp results with `clock` instead of the wall clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Ask the oracle for a fresh advisory.
    ///
    /// Never fails: on timeout, transport error or malformed output the last
    /// good result is returned (origin `LastKnown`), or a neutral default on
    /// first run.
    pub async fn refresh(&self, ctx: &AdvisoryContext) -> AdvisoryResult {
        let prompt = build_prompt(ctx);
        let outcome = match tokio::time::timeout(self.timeout, self.oracle.ask(&prompt)).await {
            Ok(Ok(text)) => parse_response(&text),
            Ok(Err(e)) => Err(e),
            Err(_) => Err(AdvisoryError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }),
        };

        match outcome {
            Ok((score, recommendation)) => {
                let result = AdvisoryResult {
                    score,
                    recommendation,
                    origin: AdvisoryOrigin::Oracle,
                    at: self.clock.now_utc(),
                };
                info!(score, "advisory refreshed");
                *self.last_good.lock().unwrap_or_else(|e| e.into_inner()) = Some(result.clone());
                result
            }
            Err(AdvisoryError::Disabled) => self.latest(),
            Err(e) => {
                warn!(error = %e, "advisory unavailable, using fallback");
                self.latest()
            }
        }
    }

    /// Seed the last good result, e.g. one persisted by an earlier run.
    pub fn remember(&self, result: AdvisoryResult) {
        *self.last_good.lock().unwrap_or_else(|e| e.into_inner()) = Some(result);
    }

    /// Last good result marked `LastKnown`, or the neutral default.
    pub fn latest(&self) -> AdvisoryResult {
        let last = self.last_good.lock().unwrap_or_else(|e| e.into_inner());
        match last.as_ref() {
            Some(good) => AdvisoryResult {
                origin: AdvisoryOrigin::LastKnown,
                ..good.clone()
            },
            None => AdvisoryResult::neutral(&self.fallback_recommendation, self.clock.now_utc()),
        }
    }
}

/// Validate raw oracle text against the `{score, recommendation}` schema.
///
/// Markdown code fences around the JSON are tolerated. `recommendation`
/// must be a non-empty string; `score` is clamped to 0..=100 and replaced
/// by the baseline when missing or not a number.
pub fn parse_response(text: &str) -> Result<(u8, String), AdvisoryError> {
    let body = strip_code_fence(text);
    let value: Value =
        serde_json::from_str(body).map_err(|e| AdvisoryError::Malformed(e.to_string()))?;
    let obj = value
        .as_object()
        .ok_or_else(|| AdvisoryError::Malformed("expected a JSON object".into()))?;

    let recommendation = obj
        .get("recommendation")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AdvisoryError::Malformed("missing recommendation".into()))?;

    let score = match obj.get("score").and_then(Value::as_f64) {
        Some(raw) if raw.is_finite() => raw.clamp(0.0, 100.0).round() as u8,
        _ => BASELINE_SCORE,
    };

    Ok((score, recommendation.to_string()))
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. "json") on the opening fence line.
    let rest = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    rest.trim_end().trim_end_matches("```").trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::Role;
    use async_trait::async_trait;
    use chrono::Local;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        replies: Mutex<Vec<Result<String, AdvisoryError>>>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(replies: Vec<Result<String, AdvisoryError>>) -> Self {
            Self {
                replies: Mutex::new(replies),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl AdvisoryOracle for Scripted {
        async fn ask(&self, _prompt: &str) -> Result<String, AdvisoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.replies.lock().unwrap().remove(0)
        }
    }

    struct Hung;

    #[async_trait]
    impl AdvisoryOracle for Hung {
        async fn ask(&self, _prompt: &str) -> Result<String, AdvisoryError> {
            std::future::pending().await
        }
    }

    fn ctx() -> AdvisoryContext {
        AdvisoryContext {
            usage_secs: 600,
            limit_min: 60,
            now: Local::now(),
            role: Role::Worker,
            routine: Vec::new(),
        }
    }

    fn client(oracle: Arc<dyn AdvisoryOracle>) -> AdvisoryClient {
        AdvisoryClient::new(oracle, Duration::from_secs(5), "fallback")
    }

    #[test]
    fn parse_clamps_out_of_range_scores() {
        assert_eq!(
            parse_response(r#"{"score": 150, "recommendation": "rest"}"#).unwrap(),
            (100, "rest".to_string())
        );
        assert_eq!(
            parse_response(r#"{"score": -3, "recommendation": "fine"}"#).unwrap().0,
            0
        );
        assert_eq!(
            parse_response(r#"{"score": 42.6, "recommendation": "ok"}"#).unwrap().0,
            43
        );
    }

    #[test]
    fn parse_defaults_missing_score_to_baseline() {
        assert_eq!(
            parse_response(r#"{"recommendation": "stretch"}"#).unwrap(),
            (BASELINE_SCORE, "stretch".to_string())
        );
        assert_eq!(
            parse_response(r#"{"score": "high", "recommendation": "stretch"}"#).unwrap().0,
            BASELINE_SCORE
        );
    }

    #[test]
    fn parse_rejects_malformed_payloads() {
        assert!(parse_response("not json").is_err());
        assert!(parse_response("[1, 2]").is_err());
        assert!(parse_response(r#"{"score": 10}"#).is_err());
        assert!(parse_response(r#"{"score": 10, "recommendation": "   "}"#).is_err());
    }

    #[test]
    fn parse_unwraps_code_fences() {
        let text = "```json\n{\"score\": 55, \"recommendation\": \"break\"}\n```";
        assert_eq!(parse_response(text).unwrap(), (55, "break".to_string()));
    }

    #[tokio::test]
    async fn first_failure_returns_neutral_default() {
        let oracle = Arc::new(Scripted::new(vec![Err(AdvisoryError::Transport(
            "down".into(),
        ))]));
        let result = client(oracle).refresh(&ctx()).await;
        assert_eq!(result.origin, AdvisoryOrigin::Default);
        assert_eq!(result.score, BASELINE_SCORE);
        assert_eq!(result.recommendation, "fallback");
    }

    #[tokio::test]
    async fn failure_after_success_reuses_last_good() {
        let oracle = Arc::new(Scripted::new(vec![
            Ok(r#"{"score": 70, "recommendation": "rest your eyes"}"#.into()),
            Ok("garbage".into()),
        ]));
        let client = client(oracle.clone());
        let first = client.refresh(&ctx()).await;
        assert_eq!(first.origin, AdvisoryOrigin::Oracle);
        let second = client.refresh(&ctx()).await;
        assert_eq!(second.origin, AdvisoryOrigin::LastKnown);
        assert_eq!(second.score, 70);
        assert_eq!(second.recommendation, "rest your eyes");
        assert_eq!(oracle.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hung_oracle_times_out() {
        let client = AdvisoryClient::new(Arc::new(Hung), Duration::from_secs(3), "fallback");
        let result = client.refresh(&ctx()).await;
        assert_eq!(result.origin, AdvisoryOrigin::Default);
        assert!(result.score <= 100);
    }
}
