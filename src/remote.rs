//! Optional higher-accuracy remote predictor.
//!
//! The predictor is consulted through [`consult`], which bounds the call
//! with a timeout and validates the payload, so nothing a remote does can
//! surface as an error to the forecast caller.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::RemotePrediction;

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    #[error("remote predictor unreachable: {0}")]
    Unreachable(String),
    #[error("remote predictor returned an invalid payload: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait RemotePredictor: Send + Sync {
    /// `Ok(None)` means the service has nothing for this user.
    async fn predict(&self, user_id: &str) -> Result<Option<RemotePrediction>, RemoteError>;
}

/// Predictor used when no remote service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disabled;

#[async_trait]
impl RemotePredictor for Disabled {
    async fn predict(&self, _user_id: &str) -> Result<Option<RemotePrediction>, RemoteError> {
        Ok(None)
    }
}

/// Why a forecast fell back to local computation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DegradeReason {
    Timeout,
    Unreachable(String),
    Malformed(String),
}

impl fmt::Display for DegradeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradeReason::Timeout => write!(f, "remote predictor timed out"),
            DegradeReason::Unreachable(detail) => write!(f, "remote predictor unreachable: {detail}"),
            DegradeReason::Malformed(detail) => write!(f, "remote payload rejected: {detail}"),
        }
    }
}

impl From<RemoteError> for DegradeReason {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::Unreachable(detail) => DegradeReason::Unreachable(detail),
            RemoteError::Malformed(detail) => DegradeReason::Malformed(detail),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOutcome {
    Available(RemotePrediction),
    Absent,
    Failed(DegradeReason),
}

/// Check a remote payload before it is allowed to compete with local data.
pub fn validate(remote: &RemotePrediction) -> Result<(), RemoteError> {
    let confidence = remote
        .prediction
        .confidence
        .ok_or_else(|| RemoteError::Malformed("missing confidence".into()))?;
    if !(0.0..=1.0).contains(&confidence) {
        return Err(RemoteError::Malformed(format!(
            "confidence {confidence} outside [0, 1]"
        )));
    }

    let next = remote
        .prediction
        .next_period
        .ok_or_else(|| RemoteError::Malformed("missing next period".into()))?;
    if next.end_date < next.start_date {
        return Err(RemoteError::Malformed(format!(
            "next period ends {} before it starts {}",
            next.end_date, next.start_date
        )));
    }

    if let Some(window) = remote.prediction.fertility_window {
        if window.end < window.start {
            return Err(RemoteError::Malformed("inverted fertility window".into()));
        }
    }

    Ok(())
}

/// Call the predictor, bounded by `timeout`.
pub async fn consult(
    predictor: &dyn RemotePredictor,
    user_id: &str,
    timeout: Duration,
) -> RemoteOutcome {
    match tokio::time::timeout(timeout, predictor.predict(user_id)).await {
        Err(_) => RemoteOutcome::Failed(DegradeReason::Timeout),
        Ok(Err(err)) => RemoteOutcome::Failed(err.into()),
        Ok(Ok(None)) => RemoteOutcome::Absent,
        Ok(Ok(Some(remote))) => match validate(&remote) {
            Ok(()) => RemoteOutcome::Available(remote),
            Err(err) => RemoteOutcome::Failed(err.into()),
        },
    }
}
