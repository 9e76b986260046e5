//! Core library for the `weather` CLI.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Abstraction over weather providers
//! - A quota-aware cache that decides, per request, whether to call the
//!   provider or serve samples stored earlier the same day
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod orchestrator;
pub mod provider;
pub mod quota;
pub mod store;

pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CacheSettings, Config, ProviderConfig};
pub use error::{ErrorKind, FetchError, WeatherError};
pub use model::{ForecastPoint, MalformedSample, Resolution, Source, WeatherSample};
pub use orchestrator::{CacheOrchestrator, QuotaStatus};
pub use provider::{ProviderId, WeatherProvider};
pub use quota::{FileQuotaStore, QuotaState, QuotaStore, QuotaTracker};
pub use store::{RecordStore, SqliteRecordStore};
