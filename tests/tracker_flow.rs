use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Notify;
use uuid::Uuid;

use cykel_forecast::cache::SnapshotCache;
use cykel_forecast::crypto::{KdfParams, Passphrase};
use cykel_forecast::remote::{DegradeReason, RemoteError, RemotePredictor};
use cykel_forecast::store::{MemoryStore, PeriodStore, StoreError};
use cykel_forecast::{
    DateRange, ForecastStatus, NewPeriod, PeriodInterval, PeriodPatch, Prediction,
    PredictionSource, RemotePrediction, Tracker, TrackerOptions,
};

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn fast_kdf() -> KdfParams {
    KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    }
}

fn remote_prediction(confidence: f32) -> RemotePrediction {
    RemotePrediction {
        prediction: Prediction {
            next_period: Some(DateRange {
                start_date: date("2024-02-27"),
                end_date: date("2024-03-02"),
            }),
            ovulation_date: Some(date("2024-02-13")),
            fertility_window: None,
            confidence: Some(confidence),
        },
        statistics: None,
    }
}

/// Answers only once the test releases it.
struct GatedRemote {
    called: Notify,
    release: Notify,
    response: RemotePrediction,
}

#[async_trait]
impl RemotePredictor for GatedRemote {
    async fn predict(&self, _user_id: &str) -> Result<Option<RemotePrediction>, RemoteError> {
        self.called.notify_one();
        self.release.notified().await;
        Ok(Some(self.response.clone()))
    }
}

struct Hanging;

#[async_trait]
impl RemotePredictor for Hanging {
    async fn predict(&self, _user_id: &str) -> Result<Option<RemotePrediction>, RemoteError> {
        std::future::pending().await
    }
}

struct Fixed(RemotePrediction);

#[async_trait]
impl RemotePredictor for Fixed {
    async fn predict(&self, _user_id: &str) -> Result<Option<RemotePrediction>, RemoteError> {
        Ok(Some(self.0.clone()))
    }
}

/// Memory store whose reads can be switched off.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    down: AtomicBool,
}

#[async_trait]
impl PeriodStore for FlakyStore {
    async fn list_intervals(&self, user_id: &str) -> Result<Vec<PeriodInterval>, StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.list_intervals(user_id).await
    }

    async fn save(&self, user_id: &str, period: NewPeriod) -> Result<PeriodInterval, StoreError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection reset".into()));
        }
        self.inner.save(user_id, period).await
    }

    async fn update(&self, id: Uuid, patch: PeriodPatch) -> Result<PeriodInterval, StoreError> {
        self.inner.update(id, patch).await
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        self.inner.delete(id).await
    }
}

async fn seed(tracker: &Tracker) {
    tracker
        .add_period(NewPeriod::new(date("2024-01-01"), date("2024-01-05")))
        .await
        .unwrap();
    tracker
        .add_period(NewPeriod::new(date("2024-01-29"), date("2024-02-02")))
        .await
        .unwrap();
}

#[tokio::test]
async fn confident_remote_is_published() {
    let tracker = Tracker::new(
        "me",
        Arc::new(MemoryStore::new()),
        Arc::new(Fixed(remote_prediction(0.9))),
        TrackerOptions::default(),
    );
    seed(&tracker).await;

    let published = tracker.forecast().await;
    assert_eq!(published.version, 2);
    assert_eq!(published.forecast.source, PredictionSource::Remote);
    assert_eq!(published.forecast.prediction, remote_prediction(0.9).prediction);
    assert_eq!(tracker.latest_forecast().await, Some(published));
}

#[tokio::test(start_paused = true)]
async fn hanging_remote_falls_back_to_local() {
    let tracker = Tracker::new(
        "me",
        Arc::new(MemoryStore::new()),
        Arc::new(Hanging),
        TrackerOptions {
            remote_timeout: Duration::from_secs(2),
            ..TrackerOptions::default()
        },
    );
    seed(&tracker).await;

    let published = tracker.forecast().await;
    assert_eq!(
        published.forecast.status,
        ForecastStatus::Degraded {
            reason: DegradeReason::Timeout
        }
    );
    assert_eq!(published.forecast.source, PredictionSource::Local);
    assert_eq!(
        published.forecast.prediction.next_period,
        Some(DateRange {
            start_date: date("2024-02-26"),
            end_date: date("2024-03-01"),
        })
    );
    assert_eq!(published.forecast.prediction.confidence, Some(0.4));
}

#[tokio::test]
async fn stale_remote_response_does_not_replace_newer_forecast() {
    let remote = Arc::new(GatedRemote {
        called: Notify::new(),
        release: Notify::new(),
        response: remote_prediction(0.95),
    });
    let tracker = Tracker::new(
        "me",
        Arc::new(MemoryStore::new()),
        remote.clone(),
        TrackerOptions::default(),
    );
    seed(&tracker).await;

    let (stale, _) = tokio::join!(tracker.forecast(), async {
        remote.called.notified().await;
        tracker
            .add_period(NewPeriod::new(date("2024-02-26"), date("2024-03-01")))
            .await
            .unwrap();
        remote.release.notify_one();
    });

    assert_eq!(stale.version, 2);
    assert_eq!(stale.forecast.source, PredictionSource::Remote);

    let latest = tracker.latest_forecast().await.unwrap();
    assert_eq!(latest.version, 3);
    assert_eq!(latest.forecast.source, PredictionSource::Local);
    assert_eq!(latest.forecast.prediction.confidence, Some(0.6));
    assert_eq!(
        latest.forecast.prediction.next_period.map(|r| r.start_date),
        Some(date("2024-03-25"))
    );
}

#[tokio::test]
async fn store_outage_keeps_previous_snapshot() {
    let store = Arc::new(FlakyStore::default());
    let tracker = Tracker::new(
        "me",
        store.clone(),
        Arc::new(cykel_forecast::remote::Disabled),
        TrackerOptions::default(),
    );
    seed(&tracker).await;
    tracker.refresh().await.unwrap();
    let before = tracker.snapshot().await;

    store.down.store(true, Ordering::SeqCst);
    assert!(tracker.refresh().await.is_err());
    assert!(tracker
        .add_period(NewPeriod::new(date("2024-02-26"), date("2024-03-01")))
        .await
        .is_err());

    let after = tracker.snapshot().await;
    assert_eq!(after.version, before.version);
    assert_eq!(after.periods, before.periods);

    let published = tracker.forecast().await;
    assert!(published.forecast.prediction.is_available());
}

#[tokio::test]
async fn cache_serves_history_when_store_is_unreachable() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(FlakyStore::default());

    let writer = Tracker::new(
        "me",
        store.clone(),
        Arc::new(cykel_forecast::remote::Disabled),
        TrackerOptions::default(),
    )
    .with_cache(SnapshotCache::new(dir.path(), Passphrase::new("pw"), fast_kdf()));
    seed(&writer).await;

    store.down.store(true, Ordering::SeqCst);
    let reader = Tracker::new(
        "me",
        store.clone(),
        Arc::new(cykel_forecast::remote::Disabled),
        TrackerOptions::default(),
    )
    .with_cache(SnapshotCache::new(dir.path(), Passphrase::new("pw"), fast_kdf()));

    assert!(reader.refresh().await.is_err());
    assert!(reader.restore_from_cache().await.unwrap());
    assert_eq!(reader.snapshot().await.periods.len(), 2);

    let published = reader.forecast().await;
    assert_eq!(
        published.forecast.prediction.next_period.map(|r| r.start_date),
        Some(date("2024-02-26"))
    );
}

#[tokio::test(flavor = "current_thread")]
async fn sealed_writes_do_not_stall_other_tasks() {
    use std::sync::atomic::AtomicUsize;

    use cykel_forecast::storage::{self, FileStore};

    let dir = tempfile::tempdir().unwrap();
    let kdf = KdfParams {
        memory_kib: 8192,
        iterations: 2,
        parallelism: 1,
    };
    let store = FileStore::create(storage::vault_path(dir.path()), Passphrase::new("pw"), kdf)
        .await
        .unwrap();
    let tracker = Tracker::new(
        "me",
        Arc::new(store),
        Arc::new(cykel_forecast::remote::Disabled),
        TrackerOptions::default(),
    )
    .with_cache(SnapshotCache::new(dir.path(), Passphrase::new("pw"), kdf));

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                ticks.fetch_add(1, Ordering::SeqCst);
                tokio::task::yield_now().await;
            }
        })
    };

    tracker
        .add_period(NewPeriod::new(date("2024-01-01"), date("2024-01-05")))
        .await
        .unwrap();
    ticker.abort();

    assert!(ticks.load(Ordering::SeqCst) > 1);
}
