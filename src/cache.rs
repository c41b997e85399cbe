//! Best-effort local mirror of a period history.
//!
//! Periods are stored keyed by their ISO start date with dates kept as
//! plain strings, so a partially corrupted mirror still yields every entry
//! that parses. It is never authoritative.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::fs;
use tracing::warn;
use uuid::Uuid;

use crate::crypto::{self, KdfParams, Passphrase};
use crate::models::{Mood, PeriodInterval, Symptom};

const CACHE_FILE: &str = "snapshot.cykel";
const DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct CachedPeriod {
    id: String,
    end_date: String,
    #[serde(default)]
    symptoms: Vec<String>,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

type DateKeyed = BTreeMap<String, Vec<CachedPeriod>>;

fn tag_name<T: Serialize>(tag: &T) -> Option<String> {
    match serde_json::to_value(tag) {
        Ok(Value::String(name)) => Some(name),
        _ => None,
    }
}

fn parse_tag<T: DeserializeOwned>(name: &str) -> Option<T> {
    let parsed = serde_json::from_value(Value::String(name.to_string())).ok();
    if parsed.is_none() {
        warn!(tag = %name, "dropping unknown tag from cached period");
    }
    parsed
}

fn to_date_keyed(history: &[PeriodInterval]) -> DateKeyed {
    let mut keyed = DateKeyed::new();
    for period in history {
        keyed
            .entry(period.start_date.format(DATE_FORMAT).to_string())
            .or_default()
            .push(CachedPeriod {
                id: period.id.to_string(),
                end_date: period.end_date.format(DATE_FORMAT).to_string(),
                symptoms: period.symptoms.iter().filter_map(tag_name).collect(),
                mood: period.mood.as_ref().and_then(tag_name),
                description: period.description.clone(),
            });
    }
    keyed
}

fn from_date_keyed(keyed: DateKeyed) -> Vec<PeriodInterval> {
    let mut history = Vec::new();
    for (start, entries) in keyed {
        let Ok(start_date) = NaiveDate::parse_from_str(&start, DATE_FORMAT) else {
            warn!(start = %start, "skipping cached periods with unparseable start date");
            continue;
        };
        for entry in entries {
            let Ok(end_date) = NaiveDate::parse_from_str(&entry.end_date, DATE_FORMAT) else {
                warn!(end = %entry.end_date, "skipping cached period with unparseable end date");
                continue;
            };
            let Ok(id) = Uuid::parse_str(&entry.id) else {
                warn!(id = %entry.id, "skipping cached period with invalid id");
                continue;
            };
            history.push(PeriodInterval {
                id,
                start_date,
                end_date,
                symptoms: entry
                    .symptoms
                    .iter()
                    .filter_map(|name| parse_tag::<Symptom>(name))
                    .collect(),
                mood: entry.mood.as_deref().and_then(parse_tag::<Mood>),
                description: entry.description,
            });
        }
    }
    history
}

pub fn cache_path(dir: &Path) -> PathBuf {
    dir.join(CACHE_FILE)
}

/// Remove the mirror, if any.
pub async fn wipe(dir: &Path) -> Result<(), CacheError> {
    let path = cache_path(dir);
    if fs::try_exists(&path).await? {
        fs::remove_file(&path).await?;
    }
    Ok(())
}

pub struct SnapshotCache {
    path: PathBuf,
    passphrase: Passphrase,
    kdf: KdfParams,
}

impl SnapshotCache {
    pub fn new(dir: &Path, passphrase: Passphrase, kdf: KdfParams) -> Self {
        Self {
            path: cache_path(dir),
            passphrase,
            kdf,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn store(&self, history: &[PeriodInterval]) -> Result<(), CacheError> {
        let json = serde_json::to_vec(&to_date_keyed(history))?;
        let sealed = crypto::seal_blocking(self.passphrase.clone(), self.kdf, json).await?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, sealed).await?;
        Ok(())
    }

    /// `Ok(None)` when nothing has been cached yet.
    pub async fn load(&self) -> Result<Option<Vec<PeriodInterval>>, CacheError> {
        if !fs::try_exists(&self.path).await? {
            return Ok(None);
        }
        let sealed = fs::read(&self.path).await?;
        let json = crypto::open_blocking(self.passphrase.clone(), self.kdf, sealed).await?;
        let keyed: DateKeyed = serde_json::from_slice(&json)?;
        Ok(Some(from_date_keyed(keyed)))
    }
}
