use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use cykel_forecast::cache::{self, SnapshotCache};
use cykel_forecast::calendar;
use cykel_forecast::config::CykelConfig;
use cykel_forecast::crypto::Passphrase;
use cykel_forecast::remote::Disabled;
use cykel_forecast::storage::{self, FileStore};
use cykel_forecast::store::{PeriodStore, StoreError, UnreachableStore};
use cykel_forecast::{Error, NewPeriod, PeriodInterval, PeriodPatch, Result, Tracker};

use crate::{Cli, Command};

/// Parse a snake_case tag such as `back_pain` into one of the model enums.
pub fn parse_tag<T: DeserializeOwned>(raw: &str) -> std::result::Result<T, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown value '{raw}'"))
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Whether a command has to write to the vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    ReadOnly,
    ReadWrite,
}

impl Access {
    fn of(command: &Command) -> Self {
        match command {
            Command::Add { .. }
            | Command::Update { .. }
            | Command::Delete { .. }
            | Command::Export => Access::ReadWrite,
            _ => Access::ReadOnly,
        }
    }
}

/// An unlocked vault and the tracker reading from it.
///
/// Read-only sessions fall back to the sealed mirror when the vault itself
/// cannot be opened; `store` is then `None`.
struct Session {
    store: Option<Arc<FileStore>>,
    tracker: Tracker,
}

impl Session {
    async fn open(
        config: &CykelConfig,
        dir: &Path,
        passphrase: Passphrase,
        user: &str,
        access: Access,
    ) -> Result<Self> {
        let path = storage::vault_path(dir);
        if !FileStore::exists(&path).await? {
            return Err(Error::NotInitialized);
        }

        let kdf = config.storage.kdf;
        let cache = config
            .storage
            .cache
            .then(|| SnapshotCache::new(dir, passphrase.clone(), kdf));

        let (store, backend): (Option<Arc<FileStore>>, Arc<dyn PeriodStore>) =
            match FileStore::open(path, passphrase, kdf).await {
                Ok(store) => {
                    let store = Arc::new(store);
                    (Some(store.clone()), store as Arc<dyn PeriodStore>)
                }
                Err(err) if access == Access::ReadOnly && cache.is_some() => {
                    warn!(error = %err, "vault unreadable, serving cached history");
                    let backend: Arc<dyn PeriodStore> =
                        Arc::new(UnreachableStore::new(err.to_string()));
                    (None, backend)
                }
                Err(err) => return Err(err.into()),
            };

        let mut tracker = Tracker::new(user, backend, Arc::new(Disabled), config.tracker_options());
        if let Some(cache) = cache {
            tracker = tracker.with_cache(cache);
        }

        if let Err(err) = tracker.refresh().await {
            warn!(error = %err, "falling back to cached history");
            if !tracker.restore_from_cache().await? {
                return Err(err.into());
            }
        }

        Ok(Self { store, tracker })
    }
}

fn require_passphrase(cli: &Cli) -> Result<Passphrase> {
    cli.passphrase
        .as_deref()
        .map(Passphrase::new)
        .ok_or(Error::MissingPassphrase)
}

pub async fn dispatch(cli: Cli, config: &CykelConfig) -> Result<()> {
    let dir: PathBuf = storage::data_dir(config.storage.data_dir.as_deref())?;

    match &cli.command {
        Command::Init => {
            let passphrase = require_passphrase(&cli)?;
            let store = FileStore::create(storage::vault_path(&dir), passphrase, config.storage.kdf).await?;
            println!("created vault at {}", store.path().display());
            return Ok(());
        }
        Command::Wipe { yes } => {
            if !*yes {
                eprintln!("refusing to wipe without --yes");
                return Ok(());
            }
            FileStore::wipe(&storage::vault_path(&dir)).await?;
            cache::wipe(&dir).await?;
            info!("all local data removed");
            return Ok(());
        }
        _ => {}
    }

    let passphrase = require_passphrase(&cli)?;
    let access = Access::of(&cli.command);
    let session = Session::open(config, &dir, passphrase, &cli.user, access).await?;
    let tracker = &session.tracker;

    match cli.command {
        Command::Init | Command::Wipe { .. } => Ok(()),
        Command::Add {
            start,
            end,
            symptoms,
            mood,
            note,
        } => {
            let saved = tracker
                .add_period(NewPeriod {
                    start_date: start,
                    end_date: end,
                    symptoms: symptoms.into_iter().collect(),
                    mood,
                    description: note,
                })
                .await?;
            emit(&saved)
        }
        Command::Update {
            id,
            start,
            end,
            symptoms,
            mood,
            clear_mood,
            note,
            clear_note,
        } => {
            let patch = PeriodPatch {
                start_date: start,
                end_date: end,
                symptoms: symptoms.map(|s| s.into_iter().collect()),
                mood: if clear_mood { Some(None) } else { mood.map(Some) },
                description: if clear_note { Some(None) } else { note.map(Some) },
            };
            if patch.is_empty() {
                eprintln!("nothing to update");
                return Ok(());
            }
            emit(&tracker.update_period(id, patch).await?)
        }
        Command::Delete { id } => {
            tracker.delete_period(id).await?;
            println!("deleted {id}");
            Ok(())
        }
        Command::List => {
            let snapshot = tracker.snapshot().await;
            let mut periods: Vec<&PeriodInterval> = snapshot.periods.iter().collect();
            periods.sort_by_key(|p| p.start_date);
            emit(&periods)
        }
        Command::Predict => {
            let published = tracker.forecast().await;
            if !published.forecast.prediction.is_available() {
                eprintln!("not enough data yet: record at least two periods");
            }
            emit(&published)
        }
        Command::Stats => emit(&tracker.statistics().await),
        Command::Summary => {
            let published = tracker.forecast().await;
            let snapshot = tracker.snapshot().await;
            let today = chrono::Local::now().date_naive();
            emit(&calendar::summary(
                &snapshot.periods,
                &published.forecast.prediction,
                tracker.policy(),
                today,
            ))
        }
        Command::Month { year, month } => {
            let published = tracker.forecast().await;
            let snapshot = tracker.snapshot().await;
            emit(&calendar::month_view(
                year,
                month,
                &snapshot.periods,
                &published.forecast.prediction,
            )?)
        }
        Command::Export => {
            let store = session
                .store
                .as_ref()
                .ok_or_else(|| StoreError::Unavailable("vault is not open".into()))?;
            println!("{}", store.export().await?);
            Ok(())
        }
    }
}
