//! Merging a local forecast with an optional remote prediction.

use serde::{Deserialize, Serialize};

use crate::models::{CycleStatistics, Prediction};
use crate::prediction::{LocalForecast, PredictionPolicy};
use crate::remote::{DegradeReason, RemoteOutcome};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Local,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ForecastStatus {
    Ok,
    Degraded { reason: DegradeReason },
}

impl ForecastStatus {
    pub fn is_degraded(&self) -> bool {
        matches!(self, ForecastStatus::Degraded { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Forecast {
    pub prediction: Prediction,
    pub statistics: CycleStatistics,
    pub source: PredictionSource,
    pub status: ForecastStatus,
}

/// Confidence assigned to a purely local prediction.
pub fn heuristic_confidence(local: &LocalForecast, policy: &PredictionPolicy) -> Option<f32> {
    if !local.prediction.is_available() {
        return None;
    }
    if local.samples >= 3 {
        Some(policy.established_history_confidence)
    } else {
        Some(policy.sparse_history_confidence)
    }
}

fn local_only(local: &LocalForecast, policy: &PredictionPolicy, status: ForecastStatus) -> Forecast {
    Forecast {
        prediction: Prediction {
            confidence: heuristic_confidence(local, policy),
            ..local.prediction.clone()
        },
        statistics: local.statistics.clone(),
        source: PredictionSource::Local,
        status,
    }
}

/// Decide between local and remote data.
///
/// A remote prediction above the policy threshold replaces the local one
/// wholesale. A weaker remote keeps the local dates but lends its
/// confidence. Absent or failed remotes leave the local prediction with a
/// heuristic confidence; failures are reported through the status.
pub fn merge_with_remote(
    local: &LocalForecast,
    remote: &RemoteOutcome,
    policy: &PredictionPolicy,
) -> Forecast {
    match remote {
        RemoteOutcome::Available(remote) => {
            let confidence = remote.prediction.confidence.unwrap_or(0.0);
            if confidence > policy.remote_confidence_threshold {
                return Forecast {
                    prediction: remote.prediction.clone(),
                    statistics: remote
                        .statistics
                        .clone()
                        .unwrap_or_else(|| local.statistics.clone()),
                    source: PredictionSource::Remote,
                    status: ForecastStatus::Ok,
                };
            }

            // A confidence attached to no prediction would mislead.
            let confidence = local
                .prediction
                .is_available()
                .then_some(confidence);

            Forecast {
                prediction: Prediction {
                    confidence,
                    ..local.prediction.clone()
                },
                statistics: local.statistics.clone(),
                source: PredictionSource::Local,
                status: ForecastStatus::Ok,
            }
        }
        RemoteOutcome::Absent => local_only(local, policy, ForecastStatus::Ok),
        RemoteOutcome::Failed(reason) => local_only(
            local,
            policy,
            ForecastStatus::Degraded {
                reason: reason.clone(),
            },
        ),
    }
}
