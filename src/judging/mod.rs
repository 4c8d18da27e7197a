//! Natural-language answer judging behind an untrusted provider boundary.

pub mod gemini;

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::warn;

use crate::dao::models::VerdictEntity;

pub use gemini::GeminiJudge;

/// Highest score a single guess can earn.
pub const MAX_SCORE: u32 = 100;

/// Reason recorded when no judging credential is configured.
pub const NO_CREDENTIAL_REASON: &str = "Error: No API Key provided. Cannot verify.";
/// Reason recorded when the provider answered with an unexpected shape.
pub const INVALID_RESPONSE_REASON: &str = "AI verification failed: Invalid response format";

/// Result alias for provider calls.
pub type JudgingResult<T> = Result<T, JudgingError>;

/// Failures a provider can report before any verdict exists.
#[derive(Debug, Error)]
pub enum JudgingError {
    /// No credential was configured for the provider.
    #[error("Error: No API Key provided. Cannot verify.")]
    MissingCredential,
    /// Building the HTTP client failed.
    #[error("failed to build judging client")]
    ClientBuilder(#[source] reqwest::Error),
    /// The request could not be sent or its body could not be read.
    #[error("judging request failed: {0}")]
    Request(#[source] reqwest::Error),
    /// The provider replied with a non-success status.
    #[error("judging API error {0}")]
    Status(u16),
    /// The provider reply did not contain a JSON verdict.
    #[error("judging response parsing failed: {0}")]
    Parse(String),
}

/// Anything able to grade a guess against a canonical answer.
///
/// Implementations return the provider's raw JSON; shape validation happens in
/// [`Verdict::from_raw`] so that no implementation can smuggle an invalid score into the round.
pub trait JudgingProvider: Send + Sync {
    /// Grade `guess` against `answer`.
    fn judge(&self, guess: &str, answer: &str) -> BoxFuture<'static, JudgingResult<Value>>;
    /// Provider name used in logs.
    fn name(&self) -> &str;
}

/// Validated judgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The provider produced a well-formed score.
    Scored {
        /// Score in `0..=MAX_SCORE`.
        score: u32,
        /// Provider explanation.
        reason: String,
    },
    /// No usable judgment; counts as a zero score.
    Failed {
        /// What went wrong.
        reason: String,
    },
}

impl Verdict {
    /// Validate a raw provider reply: an object with a finite, non-negative numeric `score`
    /// and an optional string `reason`.
    pub fn from_raw(raw: &Value) -> Self {
        let Some(object) = raw.as_object() else {
            return Self::invalid();
        };
        let Some(score) = object.get("score").and_then(Value::as_f64) else {
            return Self::invalid();
        };
        if !score.is_finite() || score < 0.0 {
            return Self::invalid();
        }

        let reason = object
            .get("reason")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned();
        let score = score.round().min(MAX_SCORE as f64) as u32;
        Self::Scored { score, reason }
    }

    /// Zero-score verdict carrying `reason`.
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    fn invalid() -> Self {
        Self::failed(INVALID_RESPONSE_REASON)
    }

    /// Points earned; failures earn nothing.
    pub fn score(&self) -> u32 {
        match self {
            Self::Scored { score, .. } => *score,
            Self::Failed { .. } => 0,
        }
    }

    /// Explanation shown to players.
    pub fn reason(&self) -> &str {
        match self {
            Self::Scored { reason, .. } | Self::Failed { reason } => reason,
        }
    }

    /// Whether the guess earns points and ends the round.
    pub fn is_correct(&self) -> bool {
        self.score() > 0
    }
}

impl From<&Verdict> for VerdictEntity {
    fn from(verdict: &Verdict) -> Self {
        Self {
            score: verdict.score(),
            reason: verdict.reason().to_owned(),
            failed: matches!(verdict, Verdict::Failed { .. }),
        }
    }
}

/// Ask `provider` for a verdict, never taking longer than `limit` and never failing.
pub async fn judge_guess(
    provider: &dyn JudgingProvider,
    guess: &str,
    answer: &str,
    limit: Duration,
) -> Verdict {
    match timeout(limit, provider.judge(guess, answer)).await {
        Ok(Ok(raw)) => {
            let verdict = Verdict::from_raw(&raw);
            if let Verdict::Failed { .. } = verdict {
                warn!(provider = provider.name(), raw = %raw, "judging provider returned an invalid shape");
            }
            verdict
        }
        Ok(Err(err)) => {
            warn!(provider = provider.name(), error = %err, "judging provider failed");
            Verdict::failed(err.to_string())
        }
        Err(_) => {
            warn!(provider = provider.name(), ?limit, "judging provider timed out");
            Verdict::failed(format!("judging timed out after {limit:?}"))
        }
    }
}

/// Provider installed when no credential is configured; every guess fails cleanly.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentialJudge;

impl JudgingProvider for NoCredentialJudge {
    fn judge(&self, _guess: &str, _answer: &str) -> BoxFuture<'static, JudgingResult<Value>> {
        Box::pin(async { Err(JudgingError::MissingCredential) })
    }

    fn name(&self) -> &str {
        "none"
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn well_formed_reply_is_scored() {
        let verdict = Verdict::from_raw(&json!({"score": 100, "reason": "exact"}));
        assert_eq!(
            verdict,
            Verdict::Scored {
                score: 100,
                reason: "exact".into()
            }
        );
        assert!(verdict.is_correct());
    }

    #[test]
    fn scores_are_rounded_and_capped() {
        assert_eq!(Verdict::from_raw(&json!({"score": 49.6})).score(), 50);
        assert_eq!(Verdict::from_raw(&json!({"score": 1000})).score(), MAX_SCORE);
    }

    #[test]
    fn malformed_replies_fail() {
        for raw in [
            json!(null),
            json!("100"),
            json!({"score": "100"}),
            json!({"reason": "missing score"}),
            json!({"score": -5}),
            json!([100]),
        ] {
            let verdict = Verdict::from_raw(&raw);
            assert_eq!(verdict, Verdict::failed(INVALID_RESPONSE_REASON), "{raw}");
            assert_eq!(verdict.score(), 0);
        }
    }

    #[test]
    fn zero_score_is_a_wrong_answer() {
        let verdict = Verdict::from_raw(&json!({"score": 0, "reason": "wrong"}));
        assert!(!verdict.is_correct());
        let entity = VerdictEntity::from(&verdict);
        assert!(!entity.failed);
    }

    #[tokio::test]
    async fn missing_credential_degrades_to_failure() {
        let verdict = judge_guess(&NoCredentialJudge, "Jaws", "Jaws", Duration::from_secs(1)).await;
        assert_eq!(verdict, Verdict::failed(NO_CREDENTIAL_REASON));
    }

    struct Stalled;

    impl JudgingProvider for Stalled {
        fn judge(&self, _guess: &str, _answer: &str) -> BoxFuture<'static, JudgingResult<Value>> {
            Box::pin(futures::future::pending())
        }

        fn name(&self) -> &str {
            "stalled"
        }
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_provider_times_out() {
        let verdict = judge_guess(&Stalled, "Jaws", "Jaws", Duration::from_secs(5)).await;
        assert!(matches!(verdict, Verdict::Failed { .. }));
        assert!(verdict.reason().contains("timed out"));
    }
}
