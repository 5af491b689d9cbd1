//! Persistence for lockout state.
//!
//! Values are stored as strings under a fixed set of keys, the same shape as
//! browser local storage. Readers parse them and treat anything unparseable as
//! absent.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{GuardError, Result};

/// Keys persisted by the lockout policy and countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKey {
    /// `"true"` while an invalid-attempt cycle is in progress.
    InvalidCode,
    /// Current attempt count.
    Quantity,
    /// Transient flag: a lockout was just triggered and its expiry is being computed.
    DateLock,
    /// Absolute lockout expiry, in milliseconds since the Unix epoch.
    Countdown,
    /// `"true"` while the countdown replaces the invite input.
    Timer,
}

impl StoreKey {
    /// Every key, in a stable order.
    pub const ALL: [Self; 5] = [
        Self::InvalidCode,
        Self::Quantity,
        Self::DateLock,
        Self::Countdown,
        Self::Timer,
    ];

    /// Returns the persisted name of this key.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCode => "invalid_code",
            Self::Quantity => "quantity",
            Self::DateLock => "date_lock",
            Self::Countdown => "countdown",
            Self::Timer => "timer",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == name)
    }
}

impl std::fmt::Display for StoreKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Injectable key-value storage for lockout state.
///
/// Implementations must be shareable across the policy and the countdown
/// task, hence `&self` receivers and the `Send + Sync` bound.
pub trait LockoutStore: Send + Sync {
    /// Reads the raw value stored under `key`.
    fn get(&self, key: StoreKey) -> Result<Option<String>>;

    /// Stores `value` under `key`, replacing any previous value.
    fn set(&self, key: StoreKey, value: &str) -> Result<()>;

    /// Removes `key`. Removing an absent key is not an error.
    fn remove(&self, key: StoreKey) -> Result<()>;

    /// Removes every lockout key.
    fn clear(&self) -> Result<()> {
        for key in StoreKey::ALL {
            self.remove(key)?;
        }
        Ok(())
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

/// A process-local store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<StoreKey, String>>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of keys currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries().map_or(0, |entries| entries.len())
    }

    /// Returns `true` if no key is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn entries(&self) -> Result<MutexGuard<'_, HashMap<StoreKey, String>>> {
        self.entries
            .lock()
            .map_err(|e| GuardError::persistence(format!("memory store poisoned: {e}")))
    }
}

impl LockoutStore for MemoryStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>> {
        Ok(self.entries()?.get(&key).cloned())
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        self.entries()?.insert(key, value.to_string());
        Ok(())
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        self.entries()?.remove(&key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.entries()?.clear();
        Ok(())
    }
}

// ============================================================================
// FileStore
// ============================================================================

/// A store backed by a small JSON object on disk.
///
/// Every operation reads the file, applies the change and writes it back
/// through a temporary file, so separate processes observe each other's
/// updates. A corrupt file reads as empty and is replaced on the next write.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    /// Creates a store persisting to `path`. The file is created lazily.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    /// Returns the backing file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<StoreKey, String>> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => {
                return Err(GuardError::persistence(format!(
                    "failed to read '{}': {e}",
                    self.path.display()
                )))
            }
        };

        let raw: BTreeMap<String, String> = match serde_json::from_str(&contents) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Lockout state file is corrupt, treating as empty");
                return Ok(BTreeMap::new());
            }
        };

        Ok(raw
            .into_iter()
            .filter_map(|(name, value)| StoreKey::from_name(&name).map(|key| (key, value)))
            .collect())
    }

    fn write_entries(&self, entries: &BTreeMap<StoreKey, String>) -> Result<()> {
        let persist_err = |e: std::io::Error| {
            GuardError::persistence(format!("failed to write '{}': {e}", self.path.display()))
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(persist_err)?;
            }
        }

        let raw: BTreeMap<&str, &str> = entries
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
            .collect();
        let json = serde_json::to_string_pretty(&raw)?;

        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, json).map_err(persist_err)?;
        std::fs::rename(&tmp_path, &self.path).map_err(persist_err)
    }

    fn update(&self, apply: impl FnOnce(&mut BTreeMap<StoreKey, String>)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|e| GuardError::persistence(format!("file store poisoned: {e}")))?;
        let mut entries = self.read_entries()?;
        apply(&mut entries);
        self.write_entries(&entries)
    }
}

impl LockoutStore for FileStore {
    fn get(&self, key: StoreKey) -> Result<Option<String>> {
        Ok(self.read_entries()?.remove(&key))
    }

    fn set(&self, key: StoreKey, value: &str) -> Result<()> {
        self.update(|entries| {
            entries.insert(key, value.to_string());
        })
    }

    fn remove(&self, key: StoreKey) -> Result<()> {
        self.update(|entries| {
            entries.remove(&key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(BTreeMap::clear)
    }
}
