//! Durable per-branch build sequence counters.
//!
//! The store is reloaded fresh on every invocation. Its load–increment–save cycle is guarded by
//! an exclusive lock (see [`CounterPersistence::lock`]), so two processes building the same
//! branch cannot both hand out the same sequence number.

use crate::{
    branch::BranchCode,
    error::{CodecError, StoreError},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    collections::BTreeMap,
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    thread,
    time::{Duration, SystemTime},
};
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// The persisted record of how many build numbers have been handed out per branch code.
///
/// Counters only ever go up by one per generated build number. They are never reset, not even
/// when the major version changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterStore {
    /// The major version seen by the most recent generation.
    pub major_version: u32,
    #[serde(default)]
    pub branch_counters: BTreeMap<BranchCode, u32>,
    #[serde(default)]
    pub total_builds: u32,
    #[serde(default)]
    pub last_build_date: Option<DateTime<Utc>>,
}

impl Default for CounterStore {
    fn default() -> Self {
        Self {
            major_version: 1,
            branch_counters: BTreeMap::new(),
            total_builds: 0,
            last_build_date: None,
        }
    }
}

impl CounterStore {
    /// The current counter for `code`, `0` if it has never been used.
    pub fn counter(&self, code: BranchCode) -> u32 {
        self.branch_counters.get(&code).copied().unwrap_or(0)
    }

    /// Returns the updated store and the new sequence number for `code`.
    ///
    /// The counter for `code` goes up by exactly one (starting at 1), as does `total_builds`, and
    /// `last_build_date` becomes `now`. `self` is left untouched.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Overflow`] if either counter is already at `u32::MAX`, which only a
    /// hand-edited store can reach.
    pub fn next_sequence(
        &self,
        code: BranchCode,
        now: DateTime<Utc>,
    ) -> Result<(Self, u32), CodecError> {
        let overflow = |field, value| CodecError::Overflow {
            field,
            value,
            max: u32::MAX - 1,
        };
        let current = self.counter(code);
        let sequence = current
            .checked_add(1)
            .ok_or_else(|| overflow("sequence", current))?;
        let total_builds = self
            .total_builds
            .checked_add(1)
            .ok_or_else(|| overflow("total builds", self.total_builds))?;

        let mut next = self.clone();
        next.branch_counters.insert(code, sequence);
        next.total_builds = total_builds;
        next.last_build_date = Some(now);
        Ok((next, sequence))
    }

    /// Whether `total_builds` equals the sum of the per-branch counters. Only a manual edit of
    /// the persisted store can make this false.
    pub fn is_consistent(&self) -> bool {
        self.branch_counters.values().map(|&c| u64::from(c)).sum::<u64>()
            == u64::from(self.total_builds)
    }
}

/// Storage for a [`CounterStore`].
pub trait CounterPersistence {
    /// Held for the duration of one load–increment–save cycle. Dropping it releases the lock.
    type Guard;

    /// Acquires exclusive access to the store.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Locked`] if the store stays locked by someone else, or
    /// [`StoreError::Io`] if the lock cannot be created.
    fn lock(&self) -> Result<Self::Guard, StoreError>;

    /// Reads the persisted store. An absent, unreadable or corrupt store yields a fresh
    /// [`CounterStore::default`]: a damaged history must not block a build.
    fn load(&self) -> CounterStore;

    /// Persists the whole store, replacing what was there.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store cannot be serialized or written.
    fn save(&self, store: &CounterStore) -> Result<(), StoreError>;
}

/// A [`CounterStore`] persisted as JSON in a file, locked through a sibling `.lock` file.
///
/// A lock file older than the stale age is taken to belong to a crashed process and is removed.
/// Removal happens only while holding a second `.lock.break` file, so two waiters can never both
/// break the same lock and end up removing each other's fresh one.
#[derive(Debug, Clone)]
pub struct CounterFile {
    path: PathBuf,
    lock_path: PathBuf,
    breaker_path: PathBuf,
    lock_timeout: Duration,
    stale_after: Duration,
}

const POLL_INTERVAL: Duration = Duration::from_millis(50);

impl CounterFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_path = path.clone().into_os_string();
        lock_path.push(".lock");
        let mut breaker_path = lock_path.clone();
        breaker_path.push(".break");
        Self {
            path,
            lock_path: lock_path.into(),
            breaker_path: breaker_path.into(),
            lock_timeout: Duration::from_secs(10),
            stale_after: Duration::from_secs(60),
        }
    }

    /// How long [`CounterPersistence::lock`] waits before giving up.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// How old a lock file must be before it is considered abandoned.
    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    fn io_error(&self, path: &Path, source: io::Error) -> StoreError {
        StoreError::Io {
            path: path.to_owned(),
            source,
        }
    }

    fn is_stale(&self, path: &Path) -> bool {
        fs::metadata(path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age > self.stale_after)
    }

    /// Removes the lock file if it is stale. Returns whether it did.
    ///
    /// While the breaker is held and a stale lock exists, no one else can remove the lock or
    /// create a new one, so the staleness check and the removal apply to the same file.
    fn break_stale_lock(&self) -> Result<bool, StoreError> {
        if !self.is_stale(&self.lock_path) {
            return Ok(false);
        }

        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.breaker_path)
        {
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                // a breaker left behind by a crash would otherwise block everyone
                if self.is_stale(&self.breaker_path) {
                    warn!(path = %self.breaker_path.display(), "removing stale lock breaker");
                    let _ = fs::remove_file(&self.breaker_path);
                }
                return Ok(false);
            }
            Err(e) => return Err(self.io_error(&self.breaker_path, e)),
        }
        let _breaker = LockGuard {
            path: self.breaker_path.clone(),
        };

        if !self.is_stale(&self.lock_path) {
            return Ok(false);
        }
        warn!(path = %self.lock_path.display(), "removing stale counter lock");
        match fs::remove_file(&self.lock_path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(self.io_error(&self.lock_path, e)),
        }
    }
}

/// Removes its lock file when dropped.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "could not release counter lock: {e}");
        }
    }
}

impl CounterPersistence for CounterFile {
    type Guard = LockGuard;

    fn lock(&self) -> Result<LockGuard, StoreError> {
        if let Some(dir) = self.lock_path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|e| self.io_error(dir, e))?;
        }

        let deadline = SystemTime::now() + self.lock_timeout;
        loop {
            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&self.lock_path)
            {
                Ok(mut file) => {
                    // informational only; a failed write does not invalidate the lock
                    let _ = writeln!(file, "{}", std::process::id());
                    debug!(path = %self.lock_path.display(), "acquired counter lock");
                    return Ok(LockGuard {
                        path: self.lock_path.clone(),
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if self.break_stale_lock()? {
                        continue;
                    }
                    if SystemTime::now() >= deadline {
                        return Err(StoreError::Locked {
                            path: self.lock_path.clone(),
                        });
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(e) => return Err(self.io_error(&self.lock_path, e)),
            }
        }
    }

    fn load(&self) -> CounterStore {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no counter store yet, starting fresh");
                return CounterStore::default();
            }
            Err(e) => {
                warn!(path = %self.path.display(), "counter store unreadable, starting fresh: {e}");
                return CounterStore::default();
            }
        };

        match serde_json::from_str::<CounterStore>(&text) {
            Ok(store) => {
                if !store.is_consistent() {
                    warn!(
                        total_builds = store.total_builds,
                        "counter store total does not match the per-branch counters"
                    );
                }
                store
            }
            Err(e) => {
                warn!(path = %self.path.display(), "counter store corrupt, starting fresh: {e}");
                CounterStore::default()
            }
        }
    }

    fn save(&self, store: &CounterStore) -> Result<(), StoreError> {
        let dir = match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir).map_err(|e| self.io_error(dir, e))?;

        let mut tmp = NamedTempFile::new_in(dir).map_err(|e| self.io_error(dir, e))?;
        serde_json::to_writer_pretty(&mut tmp, store)?;
        tmp.write_all(b"\n")
            .map_err(|e| self.io_error(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| self.io_error(&self.path, e.error))?;

        info!(
            path = %self.path.display(),
            total_builds = store.total_builds,
            "saved counter store"
        );
        Ok(())
    }
}

/// An in-memory [`CounterPersistence`], for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryCounters {
    store: RefCell<Option<CounterStore>>,
}

impl MemoryCounters {
    pub fn new(store: CounterStore) -> Self {
        Self {
            store: RefCell::new(Some(store)),
        }
    }

    /// What was last saved, if anything.
    pub fn saved(&self) -> Option<CounterStore> {
        self.store.borrow().clone()
    }
}

impl CounterPersistence for MemoryCounters {
    type Guard = ();

    fn lock(&self) -> Result<(), StoreError> {
        Ok(())
    }

    fn load(&self) -> CounterStore {
        self.store.borrow().clone().unwrap_or_default()
    }

    fn save(&self, store: &CounterStore) -> Result<(), StoreError> {
        *self.store.borrow_mut() = Some(store.clone());
        Ok(())
    }
}
