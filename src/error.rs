use crate::cache::CacheError;
use crate::calendar::CalendarError;
use crate::config::ConfigError;
use crate::storage::StorageError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("no period vault found, run `cykel init` first")]
    NotInitialized,
    #[error("a passphrase is required (--passphrase or CYKEL_PASSPHRASE)")]
    MissingPassphrase,
}

pub type Result<T> = std::result::Result<T, Error>;
