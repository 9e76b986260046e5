use anyhow::{Context, anyhow};
use clap::{Parser, Subcommand};
use inquire::{Confirm, Password};
use std::{fs, sync::Arc};
use weather_core::{
    CacheOrchestrator, Clock, Config, ErrorKind, FileQuotaStore, ProviderId, QuotaTracker,
    RecordStore, SqliteRecordStore, SystemClock, WeatherProvider, provider,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather CLI")]
pub struct Cli {
    /// Increase log verbosity (-v info, -vv debug).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure credentials for a specific provider.
    Configure {
        /// Provider short name, e.g. "openweather" or "weatherapi".
        provider: String,
    },

    /// Show the forecast for a city.
    Show {
        /// City name; defaults to `default_city` from the config.
        city: Option<String>,

        /// Use this provider instead of the configured default.
        #[arg(long)]
        provider: Option<String>,
    },

    /// Show how many upstream requests were made today.
    Quota,

    /// Delete cached forecasts older than the retention window.
    Prune {
        /// Retention in days; defaults to `cache.retention_days`.
        #[arg(long)]
        days: Option<u32>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let config = Config::load()?;

        match self.command {
            Command::Configure { provider } => configure(config, &provider),
            Command::Show { city, provider } => {
                print!("{}", show(&config, city, provider.as_deref()).await?);
                Ok(())
            }
            Command::Quota => {
                let cache = build_cache(&config, None)?;
                print!("{}", render::quota(&cache.orchestrator.quota_status()));
                Ok(())
            }
            Command::Prune { days } => {
                let cache = build_cache(&config, None)?;
                let days = days.unwrap_or(config.cache.retention_days);
                let removed = cache
                    .store
                    .prune(days)
                    .map_err(|err| anyhow!(render::error_message(&err, "")))?;
                println!("Removed {removed} cached sample(s) older than {days} day(s).");
                Ok(())
            }
        }
    }
}

/// Resolve and render the forecast for `city`.
///
/// A provider that cannot be set up is only an error once a fetch is
/// actually needed; with the quota used up, cached samples are still shown.
async fn show(
    config: &Config,
    city: Option<String>,
    provider: Option<&str>,
) -> anyhow::Result<String> {
    let (provider, unavailable) = match select_provider(config, provider) {
        Ok(provider) => (Some(provider), None),
        Err(err) => {
            tracing::warn!("no usable provider, only cached forecasts can be shown: {err:#}");
            (None, Some(err))
        }
    };

    let cache = build_cache(config, provider)?;
    cache.orchestrator.prune_expired();

    let city = city.unwrap_or_else(|| config.default_city.clone());
    let city = city.trim();
    match cache.orchestrator.resolve(city).await {
        Ok(resolution) => {
            let status = cache.orchestrator.quota_status();
            Ok(render::resolution(city, &resolution, &status))
        }
        Err(err) => match unavailable {
            Some(reason) if err.kind() == ErrorKind::FetchConnectionError => Err(reason),
            _ => Err(anyhow!(render::error_message(&err, city))),
        },
    }
}

fn configure(mut config: Config, provider: &str) -> anyhow::Result<()> {
    let id = ProviderId::try_from(provider)?;

    let api_key = Password::new(&format!("API key for {id}:"))
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;
    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }

    let was_default = config.default_provider_id().ok() == Some(id);
    config.upsert_provider_api_key(id, api_key);

    if config.default_provider_id().ok() != Some(id) {
        let make_default = Confirm::new(&format!("Make {id} the default provider?"))
            .with_default(true)
            .prompt()
            .context("Failed to read answer")?;
        if make_default {
            config.set_default_provider(id);
        }
    }

    config.save()?;

    let path = Config::config_file_path()?;
    if was_default {
        println!("Updated API key for {id} in {}", path.display());
    } else {
        println!("Saved {id} configuration to {}", path.display());
    }
    Ok(())
}

fn select_provider(
    config: &Config,
    requested: Option<&str>,
) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let boxed = match requested {
        Some(name) => provider::provider_from_config(ProviderId::try_from(name)?, config)?,
        None => provider::default_provider_from_config(config)?,
    };
    Ok(Arc::from(boxed))
}

struct Cache {
    orchestrator: CacheOrchestrator,
    store: Arc<dyn RecordStore>,
}

/// Wire the store, quota tracker and provider together.
///
/// Commands that never fetch get a provider that refuses to be called.
fn build_cache(
    config: &Config,
    provider: Option<Arc<dyn WeatherProvider>>,
) -> anyhow::Result<Cache> {
    let data_dir = config.data_dir()?;
    if let Err(err) = fs::create_dir_all(&data_dir) {
        tracing::warn!(
            dir = %data_dir.display(),
            "failed to create data directory: {err}"
        );
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let records_path = config.records_path()?;
    let store: Arc<dyn RecordStore> = match SqliteRecordStore::open(&records_path, clock.clone()) {
        Ok(store) => Arc::new(store),
        Err(err) => {
            tracing::warn!("forecast cache unavailable, using a temporary one: {err}");
            Arc::new(SqliteRecordStore::in_memory(clock.clone())?)
        }
    };

    let quota = Arc::new(QuotaTracker::new(
        FileQuotaStore::new(config.quota_path()?),
        clock.clone(),
    ));

    let provider = provider.unwrap_or_else(|| Arc::new(NoProvider) as Arc<dyn WeatherProvider>);
    let orchestrator =
        CacheOrchestrator::new(provider, store.clone(), quota, clock, config.cache.clone());

    Ok(Cache {
        orchestrator,
        store,
    })
}

/// Placeholder provider for commands that only read local state.
#[derive(Debug)]
struct NoProvider;

#[async_trait::async_trait]
impl WeatherProvider for NoProvider {
    async fn fetch_forecast(
        &self,
        _city: &str,
        _timeout: std::time::Duration,
    ) -> Result<Vec<weather_core::ForecastPoint>, weather_core::FetchError> {
        Err(weather_core::FetchError::ConnectionError(
            "no provider configured for this command".to_string(),
        ))
    }
}
