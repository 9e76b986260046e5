//! SQLite-backed [`RecordStore`].

use chrono::{Days, NaiveDate, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, params};
use std::{path::Path, sync::Arc};

use super::RecordStore;
use crate::{
    clock::Clock,
    error::{Result, WeatherError},
    model::{WeatherSample, parse_timestamp},
};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Sample store living in a single SQLite database.
///
/// The connection sits behind a mutex so the store can be shared between
/// tasks; each statement runs atomically.
#[derive(Debug)]
pub struct SqliteRecordStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

struct StoredRow {
    city: String,
    timestamp: String,
    temperature: String,
    pressure: String,
    humidity: String,
    wind_speed: String,
    feels_like: String,
    description: String,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path`.
    pub fn open<P: AsRef<Path>>(path: P, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            WeatherError::StorageUnavailable(format!("cannot open {}: {e}", path.display()))
        })?;
        Self::with_connection(conn, clock)
    }

    /// A store that lives only as long as the process.
    pub fn in_memory(clock: Arc<dyn Clock>) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::with_connection(conn, clock)
    }

    fn with_connection(conn: Connection, clock: Arc<dyn Clock>) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn.lock().execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS weather_samples (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                city TEXT NOT NULL,
                day TEXT NOT NULL,
                timestamp TEXT NOT NULL,
                temperature TEXT NOT NULL,
                pressure TEXT NOT NULL,
                humidity TEXT NOT NULL,
                wind_speed TEXT NOT NULL,
                feels_like TEXT NOT NULL,
                description TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_samples_city_day ON weather_samples(city, day);
            CREATE INDEX IF NOT EXISTS idx_samples_day ON weather_samples(day);
            "#,
        )?;
        Ok(())
    }

    fn row_to_stored(row: &rusqlite::Row) -> rusqlite::Result<StoredRow> {
        Ok(StoredRow {
            city: row.get(0)?,
            timestamp: row.get(1)?,
            temperature: row.get(2)?,
            pressure: row.get(3)?,
            humidity: row.get(4)?,
            wind_speed: row.get(5)?,
            feels_like: row.get(6)?,
            description: row.get(7)?,
        })
    }
}

impl StoredRow {
    fn into_sample(self) -> Option<WeatherSample> {
        match parse_timestamp(&self.timestamp) {
            Ok(timestamp) => Some(WeatherSample {
                city: self.city,
                timestamp,
                temperature: self.temperature,
                pressure: self.pressure,
                humidity: self.humidity,
                wind_speed: self.wind_speed,
                feels_like: self.feels_like,
                description: self.description,
            }),
            Err(err) => {
                tracing::warn!(city = %self.city, "skipping stored sample: {err}");
                None
            }
        }
    }
}

fn day_key(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

impl RecordStore for SqliteRecordStore {
    fn append(&self, city: &str, day: NaiveDate, sample: &WeatherSample) -> Result<()> {
        let now = Utc::now().to_rfc3339();

        self.conn.lock().execute(
            r#"
            INSERT INTO weather_samples
            (city, day, timestamp, temperature, pressure, humidity, wind_speed, feels_like, description, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                city,
                day_key(day),
                sample.sortable_timestamp(),
                sample.temperature(),
                sample.pressure(),
                sample.humidity(),
                sample.wind_speed(),
                sample.feels_like(),
                sample.description(),
                now,
            ],
        )?;
        Ok(())
    }

    fn query(&self, city: &str, day: NaiveDate) -> Result<Vec<WeatherSample>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT city, timestamp, temperature, pressure, humidity, wind_speed, feels_like, description
             FROM weather_samples
             WHERE city = ?1 AND day = ?2
             ORDER BY timestamp ASC, id ASC",
        )?;

        let rows = stmt
            .query_map(params![city, day_key(day)], Self::row_to_stored)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows.into_iter().filter_map(StoredRow::into_sample).collect())
    }

    fn count_for_day(&self, day: NaiveDate) -> Result<u64> {
        let count: i64 = self.conn.lock().query_row(
            "SELECT COUNT(*) FROM weather_samples WHERE day = ?1",
            params![day_key(day)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    fn prune(&self, retention_days: u32) -> Result<usize> {
        let today = self.clock.today();
        let Some(cutoff) = today.checked_sub_days(Days::new(u64::from(retention_days))) else {
            return Ok(0);
        };

        let removed = self.conn.lock().execute(
            "DELETE FROM weather_samples WHERE day < ?1",
            params![day_key(cutoff)],
        )?;

        if removed > 0 {
            tracing::info!(removed, cutoff = %cutoff, "pruned expired samples");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::FixedClock, model::ForecastPoint};

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn sample(time: &str, temp: f64) -> WeatherSample {
        ForecastPoint {
            time: Some(time.into()),
            temperature_c: Some(temp),
            feels_like_c: Some(temp - 1.0),
            pressure_hpa: Some(1000.0),
            humidity_pct: Some(70.0),
            wind_speed_mps: Some(2.0),
            description: Some("clear sky".into()),
        }
        .normalize("Perm")
        .unwrap()
    }

    fn store_at(today: NaiveDate) -> (Arc<FixedClock>, SqliteRecordStore) {
        let clock = Arc::new(FixedClock::new(today));
        let store = SqliteRecordStore::in_memory(clock.clone()).unwrap();
        (clock, store)
    }

    #[test]
    fn query_returns_samples_in_timestamp_order() {
        let today = day(2024, 5, 1);
        let (_, store) = store_at(today);

        store.append("Perm", today, &sample("2024-05-02 03:00:00", 5.0)).unwrap();
        store.append("Perm", today, &sample("2024-05-01 21:00:00", 7.0)).unwrap();
        store.append("Perm", today, &sample("2024-05-02 00:00:00", 6.0)).unwrap();

        let got = store.query("Perm", today).unwrap();
        let times: Vec<_> = got.iter().map(|s| s.display_timestamp()).collect();
        assert_eq!(
            times,
            vec!["01.05.2024 21:00", "02.05.2024 00:00", "02.05.2024 03:00"]
        );
    }

    #[test]
    fn query_is_scoped_to_city_and_day() {
        let today = day(2024, 5, 1);
        let (_, store) = store_at(today);

        store.append("Perm", today, &sample("2024-05-01 12:00:00", 5.0)).unwrap();
        store.append("Kazan", today, &sample("2024-05-01 12:00:00", 9.0)).unwrap();
        store
            .append("Perm", day(2024, 4, 30), &sample("2024-04-30 12:00:00", 3.0))
            .unwrap();

        assert_eq!(store.query("Perm", today).unwrap().len(), 1);
        assert!(store.query("Omsk", today).unwrap().is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let today = day(2024, 5, 1);
        let (_, store) = store_at(today);
        let s = sample("2024-05-01 12:00:00", 5.0);

        store.append("Perm", today, &s).unwrap();
        store.append("Perm", today, &s).unwrap();

        let got = store.query("Perm", today).unwrap();
        assert_eq!(got, vec![s.clone(), s]);
    }

    #[test]
    fn count_for_day_spans_cities() {
        let today = day(2024, 5, 1);
        let (_, store) = store_at(today);

        store.append("Perm", today, &sample("2024-05-01 12:00:00", 5.0)).unwrap();
        store.append("Kazan", today, &sample("2024-05-01 15:00:00", 6.0)).unwrap();
        store
            .append("Kazan", day(2024, 4, 29), &sample("2024-04-29 15:00:00", 6.0))
            .unwrap();

        assert_eq!(store.count_for_day(today).unwrap(), 2);
        assert_eq!(store.count_for_day(day(2024, 4, 29)).unwrap(), 1);
        assert_eq!(store.count_for_day(day(2024, 1, 1)).unwrap(), 0);
    }

    #[test]
    fn prune_removes_only_expired_days_and_is_idempotent() {
        let today = day(2024, 5, 31);
        let (_, store) = store_at(today);

        // day 31 days ago is expired, exactly 30 days ago is kept
        store
            .append("Perm", day(2024, 4, 30), &sample("2024-04-30 12:00:00", 1.0))
            .unwrap();
        store
            .append("Perm", day(2024, 5, 1), &sample("2024-05-01 12:00:00", 2.0))
            .unwrap();
        store.append("Perm", today, &sample("2024-05-31 12:00:00", 3.0)).unwrap();

        assert_eq!(store.prune(30).unwrap(), 1);
        let after_first = (
            store.query("Perm", day(2024, 5, 1)).unwrap(),
            store.query("Perm", today).unwrap(),
        );

        assert_eq!(store.prune(30).unwrap(), 0);
        let after_second = (
            store.query("Perm", day(2024, 5, 1)).unwrap(),
            store.query("Perm", today).unwrap(),
        );

        assert_eq!(after_first, after_second);
        assert!(store.query("Perm", day(2024, 4, 30)).unwrap().is_empty());
    }

    #[test]
    fn prune_follows_the_clock() {
        let today = day(2024, 5, 1);
        let (clock, store) = store_at(today);
        store.append("Perm", today, &sample("2024-05-01 12:00:00", 1.0)).unwrap();

        assert_eq!(store.prune(0).unwrap(), 0);
        clock.advance_days(1);
        assert_eq!(store.prune(0).unwrap(), 1);
    }

    #[test]
    fn undecodable_rows_are_skipped() {
        let today = day(2024, 5, 1);
        let (_, store) = store_at(today);
        store.append("Perm", today, &sample("2024-05-01 12:00:00", 1.0)).unwrap();

        store
            .conn
            .lock()
            .execute(
                "INSERT INTO weather_samples
                 (city, day, timestamp, temperature, pressure, humidity, wind_speed, feels_like, description, created_at)
                 VALUES ('Perm', '2024-05-01', 'garbage', '', '', '', '', '', '', '')",
                [],
            )
            .unwrap();

        assert_eq!(store.query("Perm", today).unwrap().len(), 1);
    }

    #[test]
    fn reopening_a_file_keeps_samples() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("weather.db");
        let today = day(2024, 5, 1);
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(today));

        {
            let store = SqliteRecordStore::open(&path, clock.clone()).unwrap();
            store.append("Perm", today, &sample("2024-05-01 12:00:00", 1.0)).unwrap();
        }

        let store = SqliteRecordStore::open(&path, clock).unwrap();
        assert_eq!(store.query("Perm", today).unwrap().len(), 1);
    }

    #[test]
    fn open_in_missing_directory_is_storage_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("weather.db");
        let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(day(2024, 5, 1)));

        let err = SqliteRecordStore::open(&path, clock).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::StorageUnavailable);
    }
}
