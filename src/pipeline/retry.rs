//! Bounded retry with failure capture for graph steps.

use crate::pipeline::state::PipelineState;
use crate::ports::PortError;
use futures_util::future::BoxFuture;
use std::time::Duration;

/// Retry settings applied uniformly to every graph step.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of attempts per step.
    pub max_attempts: u32,
    /// Fixed pause between attempts.
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Run `step` with bounded retries, capturing exhaustion into `state.error`.
///
/// The closure is attempted up to `policy.max_attempts` times with a fixed
/// pause between attempts. When the final attempt fails the diagnostic
/// `"<step>: failed after N tries: <cause>"` is written into `state.error` and
/// the failure is swallowed; nothing ever propagates past this wrapper.
/// Callers must not assume other state fields reflect a half-completed
/// attempt.
pub async fn run_with_retries<F>(
    policy: RetryPolicy,
    step: &str,
    state: &mut PipelineState,
    mut f: F,
) where
    F: for<'a> FnMut(&'a mut PipelineState) -> BoxFuture<'a, Result<(), PortError>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<PortError> = None;

    for attempt in 1..=attempts {
        match f(state).await {
            Ok(()) => return,
            Err(error) => {
                tracing::warn!(step, attempt, error = %error, "Pipeline step failed");
                last_error = Some(error);
                if attempt < attempts && !policy.backoff.is_zero() {
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }

    let cause = last_error
        .map(|error| error.to_string())
        .unwrap_or_else(|| "unknown failure".to_string());
    let message = format!("{step}: failed after {attempts} tries: {cause}");
    tracing::error!(step, error = %message, "Pipeline step exhausted retries");
    state.error = Some(message);
}
