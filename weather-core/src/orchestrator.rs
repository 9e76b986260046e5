//! Fetch-or-serve-cached decision for a single city.

use chrono::NaiveDate;
use std::sync::Arc;

use crate::{
    clock::Clock,
    config::CacheSettings,
    error::{ErrorKind, FetchError, Result, WeatherError},
    model::{Resolution, Source, WeatherSample},
    provider::WeatherProvider,
    quota::QuotaTracker,
    store::RecordStore,
};

const FETCH_OPERATION: &str = "forecast fetch";

/// Snapshot of today's quota usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaStatus {
    pub day: NaiveDate,
    pub used: u32,
    pub limit: u32,
    /// Samples stored today across all cities; `None` if the store is unreachable.
    pub stored_today: Option<u64>,
    pub degraded: bool,
}

impl QuotaStatus {
    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }

    pub fn is_exhausted(&self) -> bool {
        self.used >= self.limit
    }
}

/// Decides, per request, whether to call the provider or serve stored samples.
///
/// Holds no durable state of its own: the quota belongs to [`QuotaTracker`] and
/// samples to the [`RecordStore`].
#[derive(Debug)]
pub struct CacheOrchestrator {
    provider: Arc<dyn WeatherProvider>,
    store: Arc<dyn RecordStore>,
    quota: Arc<QuotaTracker>,
    clock: Arc<dyn Clock>,
    settings: CacheSettings,
}

impl CacheOrchestrator {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        store: Arc<dyn RecordStore>,
        quota: Arc<QuotaTracker>,
        clock: Arc<dyn Clock>,
        settings: CacheSettings,
    ) -> Self {
        Self {
            provider,
            store,
            quota,
            clock,
            settings,
        }
    }

    /// Return forecast samples for `city`, fetching only while today's quota
    /// allows it and falling back to today's cache entry otherwise.
    pub async fn resolve(&self, city: &str) -> Result<Resolution> {
        let city = city.trim();
        if city.is_empty() {
            return Err(WeatherError::InvalidInput(
                "city name must not be empty".to_string(),
            ));
        }

        let today = self.clock.today();
        let used = self.quota.count_today();
        let mut degraded = self.quota.is_degraded();

        let mut resolution = if used >= self.settings.daily_limit {
            tracing::debug!(city, used, limit = self.settings.daily_limit, "quota exhausted");
            self.serve_cached(city, today)?
        } else {
            let resolution = self.fetch_and_store(city, today).await?;
            degraded |= self.quota.is_degraded();
            resolution
        };

        if degraded {
            resolution.warn(ErrorKind::QuotaDegraded);
        }
        Ok(resolution)
    }

    fn serve_cached(&self, city: &str, today: NaiveDate) -> Result<Resolution> {
        let samples = self.store.query(city, today)?;
        if samples.is_empty() {
            tracing::info!(city, "quota exhausted and nothing cached for today");
            return Ok(Resolution::empty());
        }

        tracing::info!(city, samples = samples.len(), "serving cached forecast");
        Ok(Resolution::new(samples, Source::Cached))
    }

    async fn fetch_and_store(&self, city: &str, today: NaiveDate) -> Result<Resolution> {
        let timeout = self.settings.fetch_timeout();
        let fetched = tokio::time::timeout(timeout, self.provider.fetch_forecast(city, timeout))
            .await
            .unwrap_or(Err(FetchError::Timeout))
            .map_err(|source| WeatherError::Fetch {
                city: city.to_string(),
                operation: FETCH_OPERATION,
                source,
            })?;

        let received = fetched.len();
        let samples: Vec<WeatherSample> = fetched
            .iter()
            .enumerate()
            .filter_map(|(index, point)| match point.normalize(city) {
                Ok(sample) => Some(sample),
                Err(err) => {
                    tracing::warn!(city, index, "skipping malformed forecast point: {err}");
                    None
                }
            })
            .collect();

        if samples.is_empty() {
            tracing::info!(city, received, "provider returned no usable forecast points");
            return Ok(Resolution::empty());
        }

        let mut resolution = Resolution::new(Vec::new(), Source::Fetched);
        for sample in &samples {
            if let Err(err) = self.store.append(city, today, sample) {
                tracing::warn!(city, "failed to cache forecast sample: {err}");
                resolution.warn(ErrorKind::StorageUnavailable);
            }
        }

        let used = self.quota.increment();
        tracing::info!(
            city,
            samples = samples.len(),
            skipped = received - samples.len(),
            quota_used = used,
            "fetched forecast"
        );

        resolution.samples = samples;
        Ok(resolution)
    }

    /// Drop cache entries older than the configured retention window.
    /// Storage failures are logged and reported as zero rows removed.
    pub fn prune_expired(&self) -> usize {
        match self.store.prune(self.settings.retention_days) {
            Ok(removed) => removed,
            Err(err) => {
                tracing::warn!("failed to prune forecast cache: {err}");
                0
            }
        }
    }

    pub fn quota_status(&self) -> QuotaStatus {
        let day = self.clock.today();
        let used = self.quota.count_today();
        let stored_today = match self.store.count_for_day(day) {
            Ok(count) => Some(count),
            Err(err) => {
                tracing::warn!("failed to count cached samples: {err}");
                None
            }
        };

        QuotaStatus {
            day,
            used,
            limit: self.settings.daily_limit,
            stored_today,
            degraded: self.quota.is_degraded(),
        }
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }
}
