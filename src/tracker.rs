//! Session context tying the store, the remote predictor and the engine
//! together.
//!
//! The tracker owns an immutable snapshot of the history plus a version
//! counter bumped on every change. Forecasts are tagged with the version
//! they were computed from, and only a forecast at least as new as the
//! published one may replace it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::cache::{CacheError, SnapshotCache};
use crate::forecast::{self, Forecast};
use crate::models::{CycleReport, NewPeriod, PeriodInterval, PeriodPatch};
use crate::prediction::{self, PredictionPolicy};
use crate::remote::{self, RemoteOutcome, RemotePredictor};
use crate::store::{PeriodStore, StoreError};

pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone)]
pub struct TrackerOptions {
    pub policy: PredictionPolicy,
    pub remote_timeout: Duration,
}

impl Default for TrackerOptions {
    fn default() -> Self {
        Self {
            policy: PredictionPolicy::default(),
            remote_timeout: DEFAULT_REMOTE_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct HistorySnapshot {
    pub version: u64,
    pub periods: Arc<Vec<PeriodInterval>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PublishedForecast {
    pub version: u64,
    pub forecast: Forecast,
}

pub struct Tracker {
    user_id: String,
    store: Arc<dyn PeriodStore>,
    remote: Arc<dyn RemotePredictor>,
    cache: Option<SnapshotCache>,
    options: TrackerOptions,
    history: RwLock<HistorySnapshot>,
    latest: RwLock<Option<PublishedForecast>>,
}

impl Tracker {
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn PeriodStore>,
        remote: Arc<dyn RemotePredictor>,
        options: TrackerOptions,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            store,
            remote,
            cache: None,
            options,
            history: RwLock::new(HistorySnapshot::default()),
            latest: RwLock::new(None),
        }
    }

    pub fn with_cache(mut self, cache: SnapshotCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn policy(&self) -> &PredictionPolicy {
        &self.options.policy
    }

    pub async fn snapshot(&self) -> HistorySnapshot {
        self.history.read().await.clone()
    }

    /// Reload the history from the store. On failure the previous
    /// snapshot is kept.
    pub async fn refresh(&self) -> Result<HistorySnapshot, StoreError> {
        let periods = match self.store.list_intervals(&self.user_id).await {
            Ok(periods) => periods,
            Err(err) => {
                warn!(error = %err, "store read failed, keeping previous snapshot");
                return Err(err);
            }
        };
        debug!(periods = periods.len(), "history refreshed from store");

        let snapshot = self.install(periods).await;
        self.mirror(&snapshot).await;
        Ok(snapshot)
    }

    /// Install the cached mirror as the current snapshot, for when the
    /// store cannot be read. Returns whether a mirror was found.
    pub async fn restore_from_cache(&self) -> Result<bool, CacheError> {
        let Some(cache) = &self.cache else {
            return Ok(false);
        };
        match cache.load().await? {
            Some(periods) => {
                info!(periods = periods.len(), "restored history from local cache");
                self.install(periods).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn add_period(&self, period: NewPeriod) -> Result<PeriodInterval, StoreError> {
        let saved = self.store.save(&self.user_id, period).await?;
        info!(id = %saved.id, start = %saved.start_date, "period added");

        let snapshot = self
            .mutate(|periods| periods.push(saved.clone()))
            .await;
        self.mirror(&snapshot).await;
        Ok(saved)
    }

    pub async fn update_period(
        &self,
        id: Uuid,
        patch: PeriodPatch,
    ) -> Result<PeriodInterval, StoreError> {
        let updated = self.store.update(id, patch).await?;
        info!(id = %id, "period updated");

        let snapshot = self
            .mutate(|periods| match periods.iter_mut().find(|p| p.id == id) {
                Some(existing) => *existing = updated.clone(),
                None => periods.push(updated.clone()),
            })
            .await;
        self.mirror(&snapshot).await;
        Ok(updated)
    }

    pub async fn delete_period(&self, id: Uuid) -> Result<(), StoreError> {
        self.store.delete(id).await?;
        info!(id = %id, "period deleted");

        let snapshot = self.mutate(|periods| periods.retain(|p| p.id != id)).await;
        self.mirror(&snapshot).await;
        Ok(())
    }

    pub async fn statistics(&self) -> CycleReport {
        let snapshot = self.snapshot().await;
        prediction::cycle_statistics(&snapshot.periods, &self.options.policy)
    }

    /// Compute a forecast for the current snapshot, consulting the remote
    /// predictor. Never fails: remote problems show up in the status.
    pub async fn forecast(&self) -> PublishedForecast {
        let snapshot = self.snapshot().await;
        let local = prediction::local_forecast(&snapshot.periods, &self.options.policy);

        let outcome =
            remote::consult(self.remote.as_ref(), &self.user_id, self.options.remote_timeout).await;
        if let RemoteOutcome::Failed(reason) = &outcome {
            warn!(%reason, version = snapshot.version, "falling back to local prediction");
        }

        let published = PublishedForecast {
            version: snapshot.version,
            forecast: forecast::merge_with_remote(&local, &outcome, &self.options.policy),
        };
        if !self.publish(published.clone()).await {
            debug!(
                version = snapshot.version,
                "history changed while the remote was consulted, result not published"
            );
        }
        published
    }

    /// Newest published forecast.
    pub async fn latest_forecast(&self) -> Option<PublishedForecast> {
        self.latest.read().await.clone()
    }

    /// Last-write-wins by history version, not by arrival order.
    async fn publish(&self, candidate: PublishedForecast) -> bool {
        let mut latest = self.latest.write().await;
        let accept = latest
            .as_ref()
            .map_or(true, |current| candidate.version >= current.version);
        if accept {
            *latest = Some(candidate);
        }
        accept
    }

    fn local_only(&self, snapshot: &HistorySnapshot) -> PublishedForecast {
        let local = prediction::local_forecast(&snapshot.periods, &self.options.policy);
        PublishedForecast {
            version: snapshot.version,
            forecast: forecast::merge_with_remote(&local, &RemoteOutcome::Absent, &self.options.policy),
        }
    }

    async fn install(&self, periods: Vec<PeriodInterval>) -> HistorySnapshot {
        self.mutate(move |current| *current = periods).await
    }

    /// Apply a change to a copy of the history, swap it in under a new
    /// version and publish a local forecast for it.
    async fn mutate<F>(&self, change: F) -> HistorySnapshot
    where
        F: FnOnce(&mut Vec<PeriodInterval>) + Send,
    {
        let snapshot = {
            let mut history = self.history.write().await;
            let mut periods = history.periods.as_ref().clone();
            change(&mut periods);
            *history = HistorySnapshot {
                version: history.version + 1,
                periods: Arc::new(periods),
            };
            history.clone()
        };
        self.publish(self.local_only(&snapshot)).await;
        snapshot
    }

    async fn mirror(&self, snapshot: &HistorySnapshot) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(&snapshot.periods).await {
                warn!(error = %err, path = %cache.path().display(), "failed to update local cache");
            }
        }
    }
}
