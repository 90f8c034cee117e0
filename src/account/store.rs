//! Persistent account store
//!
//! One CBOR snapshot per account at `<data_dir>/<account>.cbor`. Saves go
//! through a temp file that is fsynced and renamed over the old snapshot, so
//! a crash leaves either the previous or the new snapshot, never a mix.
//! Snapshots hold group master keys and are created owner-only (0600).

use super::data::AccountData;
use crate::serialization::{from_cbor, to_cbor, SerializationError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::debug;

const SNAPSHOT_EXTENSION: &str = "cbor";

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No stored snapshot for account {0}")]
    NotFound(String),

    #[error("Invalid account id: {0:?}")]
    InvalidAccountId(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot encoding error: {0}")]
    Serialization(#[from] SerializationError),
}

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn load(&self, account_id: &str) -> StoreResult<AccountData>;

    /// Replace the stored snapshot for `data.account_id` as one unit.
    async fn save(&self, data: &AccountData) -> StoreResult<()>;

    /// Ids of every stored account, sorted.
    async fn list(&self) -> StoreResult<Vec<String>>;
}

/// Account ids become file names, so only a conservative alphabet is allowed.
pub fn validate_account_id(account_id: &str) -> StoreResult<()> {
    let valid = !account_id.is_empty()
        && !account_id.starts_with('.')
        && account_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidAccountId(account_id.to_string()))
    }
}

pub struct FileAccountStore {
    dir: PathBuf,
}

impl FileAccountStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn snapshot_path(&self, account_id: &str) -> StoreResult<PathBuf> {
        validate_account_id(account_id)?;
        Ok(self
            .dir
            .join(format!("{}.{}", account_id, SNAPSHOT_EXTENSION)))
    }
}

#[async_trait]
impl AccountStore for FileAccountStore {
    async fn load(&self, account_id: &str) -> StoreResult<AccountData> {
        let path = self.snapshot_path(account_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(account_id.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(from_cbor(&bytes)?)
    }

    async fn save(&self, data: &AccountData) -> StoreResult<()> {
        let path = self.snapshot_path(&data.account_id)?;
        let bytes = to_cbor(data)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = self.dir.join(format!(
            ".{}.{}.tmp",
            data.account_id,
            uuid::Uuid::new_v4().simple()
        ));

        let mut options = tokio::fs::OpenOptions::new();
        options.write(true).create_new(true);
        #[cfg(unix)]
        options.mode(0o600);

        let written = async {
            let mut file = options.open(&tmp).await?;
            file.write_all(&bytes).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, &path).await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(account = %data.account_id, bytes = bytes.len(), "snapshot saved");
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                if validate_account_id(stem).is_ok() {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// In-memory store for tests, with switchable save failures.
#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    state: Arc<Mutex<MemoryState>>,
}

#[derive(Default)]
struct MemoryState {
    snapshots: HashMap<String, Vec<u8>>,
    fail_saves: bool,
    saves: usize,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Make every following save fail with an I/O error.
    pub fn fail_saves(&self, fail: bool) {
        self.lock().fail_saves = fail;
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> usize {
        self.lock().saves
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn load(&self, account_id: &str) -> StoreResult<AccountData> {
        let bytes = self
            .lock()
            .snapshots
            .get(account_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(account_id.to_string()))?;
        Ok(from_cbor(&bytes)?)
    }

    async fn save(&self, data: &AccountData) -> StoreResult<()> {
        validate_account_id(&data.account_id)?;
        let bytes = to_cbor(data)?;
        let mut state = self.lock();
        if state.fail_saves {
            return Err(StoreError::Io(std::io::Error::other("disk full")));
        }
        state.snapshots.insert(data.account_id.clone(), bytes);
        state.saves += 1;
        Ok(())
    }

    async fn list(&self) -> StoreResult<Vec<String>> {
        let mut ids: Vec<String> = self.lock().snapshots.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
