//! Passphrase-sealed period vault on local disk.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::crypto::{self, KdfParams, Passphrase};
use crate::models::{NewPeriod, PeriodInterval, PeriodPatch};
use crate::store::{self, OwnedInterval, PeriodStore, StoreError};

const VAULT_FILE: &str = "periods.cykel";
const VAULT_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("crypto error: {0}")]
    Crypto(#[from] crypto::CryptoError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("data directory not found")]
    NoDataDir,
    #[error("vault already exists at {0}")]
    AlreadyExists(PathBuf),
    #[error("unsupported vault version {0}")]
    UnsupportedVersion(u32),
}

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Vault {
    version: u32,
    periods: Vec<OwnedInterval>,
}

/// Directory holding the vault and cache: the override if given, else the
/// platform's local data dir.
pub fn data_dir(override_dir: Option<&Path>) -> Result<PathBuf, StorageError> {
    match override_dir {
        Some(dir) => Ok(dir.to_path_buf()),
        None => Ok(dirs::data_local_dir()
            .ok_or(StorageError::NoDataDir)?
            .join("cykel")),
    }
}

pub fn vault_path(dir: &Path) -> PathBuf {
    dir.join(VAULT_FILE)
}

/// Encrypted [`PeriodStore`] backed by a single file.
///
/// Every mutation rewrites the file before the in-memory copy changes, so
/// a failed write leaves both in their previous state.
pub struct FileStore {
    path: PathBuf,
    passphrase: Passphrase,
    kdf: KdfParams,
    rows: RwLock<Vec<OwnedInterval>>,
}

impl FileStore {
    /// Create an empty vault. Refuses to overwrite an existing one.
    pub async fn create(
        path: PathBuf,
        passphrase: Passphrase,
        kdf: KdfParams,
    ) -> Result<Self, StorageError> {
        if fs::try_exists(&path).await? {
            return Err(StorageError::AlreadyExists(path));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let store = Self {
            path,
            passphrase,
            kdf,
            rows: RwLock::new(Vec::new()),
        };
        store.persist(&[]).await?;
        info!(path = %store.path.display(), "created period vault");
        Ok(store)
    }

    /// Open and decrypt an existing vault.
    pub async fn open(
        path: PathBuf,
        passphrase: Passphrase,
        kdf: KdfParams,
    ) -> Result<Self, StorageError> {
        let sealed = fs::read(&path).await?;
        let plaintext = crypto::open_blocking(passphrase.clone(), kdf, sealed).await?;
        let vault: Vault = serde_json::from_slice(&plaintext)?;
        if vault.version != VAULT_VERSION {
            return Err(StorageError::UnsupportedVersion(vault.version));
        }
        debug!(periods = vault.periods.len(), "opened period vault");

        Ok(Self {
            path,
            passphrase,
            kdf,
            rows: RwLock::new(vault.periods),
        })
    }

    pub async fn exists(path: &Path) -> Result<bool, StorageError> {
        Ok(fs::try_exists(path).await?)
    }

    /// Delete the vault permanently.
    pub async fn wipe(path: &Path) -> Result<(), StorageError> {
        if fs::try_exists(path).await? {
            fs::remove_file(path).await?;
            info!(path = %path.display(), "wiped period vault");
        }
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Plain JSON of every stored period.
    pub async fn export(&self) -> Result<String, StorageError> {
        let rows = self.rows.read().await;
        let periods: Vec<&PeriodInterval> = rows.iter().map(|row| &row.interval).collect();
        Ok(serde_json::to_string_pretty(&periods)?)
    }

    async fn persist(&self, rows: &[OwnedInterval]) -> Result<(), StorageError> {
        let vault = Vault {
            version: VAULT_VERSION,
            periods: rows.to_vec(),
        };
        let json = serde_json::to_vec(&vault)?;
        let sealed = crypto::seal_blocking(self.passphrase.clone(), self.kdf, json).await?;

        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, sealed).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl PeriodStore for FileStore {
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
        store::validate_range(period.start_date, period.end_date)?;
        let interval = period.into_interval(Uuid::new_v4());

        let mut rows = self.rows.write().await;
        let mut next = rows.clone();
        next.push(OwnedInterval {
            user_id: user_id.to_string(),
            interval: interval.clone(),
        });
        self.persist(&next).await?;
        *rows = next;

        Ok(interval)
    }

    async fn update(&self, id: Uuid, patch: PeriodPatch) -> Result<PeriodInterval, StoreError> {
        let mut rows = self.rows.write().await;
        let mut next = rows.clone();
        let updated = store::patch_row(&mut next, id, &patch)?;
        self.persist(&next).await?;
        *rows = next;

        Ok(updated)
    }

    async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let mut next = rows.clone();
        store::remove_row(&mut next, id)?;
        self.persist(&next).await?;
        *rows = next;

        Ok(())
    }
}
