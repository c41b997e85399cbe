//! Persistent period history, as seen by the tracker.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{NewPeriod, PeriodInterval, PeriodPatch};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("period {0} not found")]
    NotFound(Uuid),
    #[error("period ends {end} before it starts {start}")]
    InvalidRange { start: NaiveDate, end: NaiveDate },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub fn validate_range(start: NaiveDate, end: NaiveDate) -> Result<(), StoreError> {
    if end < start {
        return Err(StoreError::InvalidRange { start, end });
    }
    Ok(())
}

#[async_trait]
pub trait PeriodStore: Send + Sync {
    /// All of a user's periods, in insertion order.
    async fn list_intervals(&self, user_id: &str) -> Result<Vec<PeriodInterval>, StoreError>;

    async fn save(&self, user_id: &str, period: NewPeriod) -> Result<PeriodInterval, StoreError>;

    async fn update(&self, id: Uuid, patch: PeriodPatch) -> Result<PeriodInterval, StoreError>;

    async fn delete(&self, id: Uuid) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct OwnedInterval {
    pub user_id: String,
    pub interval: PeriodInterval,
}

/// Patch a row in place, keeping it untouched if the result is invalid.
pub(crate) fn patch_row(
    rows: &mut [OwnedInterval],
    id: Uuid,
    patch: &PeriodPatch,
) -> Result<PeriodInterval, StoreError> {
    let row = rows
        .iter_mut()
        .find(|row| row.interval.id == id)
        .ok_or(StoreError::NotFound(id))?;

    let mut updated = row.interval.clone();
    patch.apply_to(&mut updated);
    validate_range(updated.start_date, updated.end_date)?;

    row.interval = updated.clone();
    Ok(updated)
}

pub(crate) fn remove_row(rows: &mut Vec<OwnedInterval>, id: Uuid) -> Result<(), StoreError> {
    let before = rows.len();
    rows.retain(|row| row.interval.id != id);
    if rows.len() == before {
        return Err(StoreError::NotFound(id));
    }
    Ok(())
}

/// Volatile store, for tests and sessions without persistence.
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<OwnedInterval>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeriodStore for MemoryStore {
    async fn list_intervals(&self, user_id: &str) -> Result<Vec<PeriodInterval>, StoreError> {
        Ok(self
            .rows
            .read()
            .await
            .iter()
            .filter(|row| row.user_id == user_id)
            .map(|row| row.interval.clone())
            .collect())
    }

    async fn save(&self, user_id: &str, period: NewPeriod) -> Result<PeriodInterval, StoreError> {
        validate_range(period.start_date, period.end_date)?;
        let interval = period.into_interval(Uuid::new_v4());
        self.rows.write().await.push(OwnedInterval {
            user_id: user_id.to_string(),
            interval: interval.clone(),
        });
        Ok(interval)
    }

    async fn update(&self, id: Uuid, patch: PeriodPatch) -> Result<PeriodInterval, StoreError> {
        patch_row(&mut self.rows.write().await, id, &patch)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        remove_row(&mut *self.rows.write().await, id)
    }
}

/// Stand-in for a backend that could not be opened. Every call fails with
/// [`StoreError::Unavailable`], so a tracker over it can only serve a
/// restored cache.
#[derive(Debug, Clone)]
pub struct UnreachableStore {
    reason: String,
}

impl UnreachableStore {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    fn error(&self) -> StoreError {
        StoreError::Unavailable(self.reason.clone())
    }
}

#[async_trait]
impl PeriodStore for UnreachableStore {
    async fn list_intervals(&self, _user_id: &str) -> Result<Vec<PeriodInterval>, StoreError> {
        Err(self.error())
    }

    async fn save(&self, _user_id: &str, _period: NewPeriod) -> Result<PeriodInterval, StoreError> {
        Err(self.error())
    }

    async fn update(&self, _id: Uuid, _patch: PeriodPatch) -> Result<PeriodInterval, StoreError> {
        Err(self.error())
    }

    async fn delete(&self, _id: Uuid) -> Result<(), StoreError> {
        Err(self.error())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[tokio::test]
    async fn save_assigns_ids_and_scopes_by_user() {
        let store = MemoryStore::new();
        let a = store
            .save("alice", NewPeriod::new(date("2024-01-01"), date("2024-01-05")))
            .await
            .unwrap();
        store
            .save("bob", NewPeriod::new(date("2024-01-03"), date("2024-01-06")))
            .await
            .unwrap();

        let alice = store.list_intervals("alice").await.unwrap();
        assert_eq!(alice, vec![a]);
    }

    #[tokio::test]
    async fn save_rejects_inverted_range() {
        let store = MemoryStore::new();
        let result = store
            .save("alice", NewPeriod::new(date("2024-01-05"), date("2024-01-01")))
            .await;
        assert!(matches!(result, Err(StoreError::InvalidRange { .. })));
        assert!(store.list_intervals("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_update_leaves_row_untouched() {
        let store = MemoryStore::new();
        let saved = store
            .save("alice", NewPeriod::new(date("2024-01-01"), date("2024-01-05")))
            .await
            .unwrap();

        let patch = PeriodPatch {
            start_date: Some(date("2024-01-10")),
            ..PeriodPatch::default()
        };
        assert!(store.update(saved.id, patch).await.is_err());
        assert_eq!(store.list_intervals("alice").await.unwrap(), vec![saved]);
    }

    #[tokio::test]
    async fn delete_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let id = Uuid::new_v4();
        assert!(matches!(store.delete(id).await, Err(StoreError::NotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn unreachable_store_rejects_everything() {
        let store = UnreachableStore::new("vault corrupted");
        assert!(matches!(
            store.list_intervals("me").await,
            Err(StoreError::Unavailable(reason)) if reason == "vault corrupted"
        ));
        assert!(store
            .save("me", NewPeriod::new(date("2024-01-01"), date("2024-01-05")))
            .await
            .is_err());
        assert!(store.delete(Uuid::new_v4()).await.is_err());
    }
}
