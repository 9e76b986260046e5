//! Durable per-day counter of upstream fetch calls.

use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Debug,
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use crate::{
    clock::Clock,
    error::{Result, WeatherError},
};

/// Calls made on `day`. `count` never refers to any other day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaState {
    pub day: NaiveDate,
    pub count: u32,
}

impl QuotaState {
    pub fn fresh(day: NaiveDate) -> Self {
        Self { day, count: 0 }
    }
}

/// Persistence for the singleton [`QuotaState`] record.
pub trait QuotaStore: Send + Sync + Debug {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<QuotaState>>;

    fn save(&self, state: &QuotaState) -> Result<()>;
}

/// Stores the quota record as a small JSON file.
#[derive(Debug, Clone)]
pub struct FileQuotaStore {
    path: PathBuf,
}

impl FileQuotaStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl QuotaStore for FileQuotaStore {
    fn load(&self) -> Result<Option<QuotaState>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(WeatherError::StorageUnavailable(format!(
                    "cannot read quota file {}: {err}",
                    self.path.display()
                )));
            }
        };

        match serde_json::from_str::<QuotaState>(&raw) {
            Ok(state) => Ok(Some(state)),
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "ignoring unreadable quota record: {err}"
                );
                Ok(None)
            }
        }
    }

    fn save(&self, state: &QuotaState) -> Result<()> {
        let unavailable = |err: io::Error| {
            WeatherError::StorageUnavailable(format!(
                "cannot write quota file {}: {err}",
                self.path.display()
            ))
        };

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(unavailable)?;
        }

        let data = serde_json::to_string_pretty(state).map_err(WeatherError::storage)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, data).map_err(unavailable)?;
        fs::rename(&tmp, &self.path).map_err(unavailable)?;
        Ok(())
    }
}

/// Counts upstream calls per calendar day.
///
/// The durable record is re-read on every operation so restarts and other
/// processes are observed. When persistence fails the tracker keeps counting
/// in memory and reports itself as degraded instead of failing callers.
#[derive(Debug)]
pub struct QuotaTracker {
    store: Box<dyn QuotaStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<QuotaState>,
    read_failed: AtomicBool,
    write_failed: AtomicBool,
}

impl QuotaTracker {
    pub fn new(store: impl QuotaStore + 'static, clock: Arc<dyn Clock>) -> Self {
        let today = clock.today();
        Self {
            store: Box::new(store),
            clock,
            state: Mutex::new(QuotaState::fresh(today)),
            read_failed: AtomicBool::new(false),
            write_failed: AtomicBool::new(false),
        }
    }

    /// Calls recorded for today. A stale record is rolled over and persisted
    /// before returning.
    pub fn count_today(&self) -> u32 {
        let mut state = self.state.lock();
        let behind = self.refresh(&mut state);
        if self.rollover(&mut state) || behind {
            self.persist(&state);
        }
        state.count
    }

    /// Record one upstream call and return today's new count.
    ///
    /// Never fails: a persistence error is logged and the in-memory count is
    /// still advanced.
    pub fn increment(&self) -> u32 {
        let mut state = self.state.lock();
        self.refresh(&mut state);
        self.rollover(&mut state);
        state.count = state.count.saturating_add(1);
        self.persist(&state);
        state.count
    }

    /// Whether the durable record could not be read, or the last write failed.
    pub fn is_degraded(&self) -> bool {
        self.read_failed.load(Ordering::Relaxed) || self.write_failed.load(Ordering::Relaxed)
    }

    /// Merge the durable record into `state`. A record is adopted only when it
    /// is for a later day or holds at least as many calls for the same day, so
    /// counts that failed to persist are never lost.
    ///
    /// Returns whether the durable record lags behind the in-memory state.
    fn refresh(&self, state: &mut QuotaState) -> bool {
        match self.store.load() {
            Ok(Some(stored)) => {
                self.read_failed.store(false, Ordering::Relaxed);
                let newer = stored.day > state.day
                    || (stored.day == state.day && stored.count >= state.count);
                if newer {
                    *state = stored;
                }
                stored != *state
            }
            Ok(None) => {
                self.read_failed.store(false, Ordering::Relaxed);
                false
            }
            Err(err) => {
                tracing::warn!("quota record unavailable, using in-memory count: {err}");
                self.read_failed.store(true, Ordering::Relaxed);
                false
            }
        }
    }

    fn rollover(&self, state: &mut QuotaState) -> bool {
        let today = self.clock.today();
        if state.day == today {
            return false;
        }
        tracing::debug!(from = %state.day, to = %today, "quota day rollover");
        *state = QuotaState::fresh(today);
        true
    }

    fn persist(&self, state: &QuotaState) {
        match self.store.save(state) {
            Ok(()) => self.write_failed.store(false, Ordering::Relaxed),
            Err(err) => {
                tracing::warn!(count = state.count, "failed to persist quota: {err}");
                self.write_failed.store(true, Ordering::Relaxed);
            }
        }
    }
}
