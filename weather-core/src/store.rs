//! Durable storage of normalized samples, keyed by city and request day.

use chrono::NaiveDate;
use std::fmt::Debug;

use crate::{error::Result, model::WeatherSample};

pub mod sqlite;

pub use sqlite::SqliteRecordStore;

/// Append-only store of forecast samples.
///
/// Every operation reports storage failures as
/// [`crate::WeatherError::StorageUnavailable`].
pub trait RecordStore: Send + Sync + Debug {
    /// Add one sample to the entry for `(city, day)`. Duplicates are kept.
    fn append(&self, city: &str, day: NaiveDate, sample: &WeatherSample) -> Result<()>;

    /// All samples for `(city, day)`, oldest forecast time first.
    fn query(&self, city: &str, day: NaiveDate) -> Result<Vec<WeatherSample>>;

    /// Number of stored samples requested on `day`, across all cities.
    fn count_for_day(&self, day: NaiveDate) -> Result<u64>;

    /// Delete entries requested more than `retention_days` days ago.
    /// Returns how many samples were removed.
    fn prune(&self, retention_days: u32) -> Result<usize>;
}
