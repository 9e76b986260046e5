use chrono::NaiveDateTime;
use thiserror::Error;

use crate::error::ErrorKind;

const HPA_TO_MMHG: f64 = 0.750062;

/// Storage form of a sample timestamp; sorts lexicographically.
pub(crate) const SORTABLE_FORMAT: &str = "%Y-%m-%d %H:%M";
const DISPLAY_FORMAT: &str = "%d.%m.%Y %H:%M";
const ACCEPTED_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// A raw forecast point as produced by a provider, before normalization.
///
/// Fields are optional so that one broken entry in an upstream batch can be
/// represented (and later skipped) without failing the whole response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastPoint {
    /// Local forecast time, e.g. `2024-05-01 12:00:00`.
    pub time: Option<String>,
    pub temperature_c: Option<f64>,
    pub feels_like_c: Option<f64>,
    pub pressure_hpa: Option<f64>,
    pub humidity_pct: Option<f64>,
    pub wind_speed_mps: Option<f64>,
    pub description: Option<String>,
}

/// Why a [`ForecastPoint`] could not be turned into a [`WeatherSample`].
#[derive(Debug, Error, PartialEq)]
pub enum MalformedSample {
    #[error("missing field `{0}`")]
    MissingField(&'static str),

    #[error("field `{0}` is not a finite number")]
    NotFinite(&'static str),

    #[error("unrecognised timestamp '{0}'")]
    BadTimestamp(String),
}

impl ForecastPoint {
    /// Validate the point and derive its display fields.
    pub fn normalize(&self, city: &str) -> Result<WeatherSample, MalformedSample> {
        let raw_time = self
            .time
            .as_deref()
            .ok_or(MalformedSample::MissingField("time"))?;
        let timestamp = parse_timestamp(raw_time)?;

        let temperature = finite(self.temperature_c, "temperature")?;
        let feels_like = finite(self.feels_like_c, "feels_like")?;
        let pressure = finite(self.pressure_hpa, "pressure")?;
        let humidity = finite(self.humidity_pct, "humidity")?;
        let wind_speed = finite(self.wind_speed_mps, "wind_speed")?;
        let description = self
            .description
            .as_deref()
            .ok_or(MalformedSample::MissingField("description"))?;

        Ok(WeatherSample {
            city: city.to_string(),
            timestamp,
            temperature: format!("{} °C", format_decimal(temperature)),
            pressure: format!("{:.0} mmHg", (pressure * HPA_TO_MMHG).round()),
            humidity: format!("{}%", format_decimal(humidity)),
            wind_speed: format!("{} m/s", format_decimal(wind_speed)),
            feels_like: format!("{} °C", format_decimal(feels_like)),
            description: capitalize_first(description),
        })
    }
}

/// One normalized forecast point, ready for display and storage.
///
/// Display fields are pre-formatted strings combining value and unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherSample {
    pub(crate) city: String,
    pub(crate) timestamp: NaiveDateTime,
    pub(crate) temperature: String,
    pub(crate) pressure: String,
    pub(crate) humidity: String,
    pub(crate) wind_speed: String,
    pub(crate) feels_like: String,
    pub(crate) description: String,
}

impl WeatherSample {
    pub fn city(&self) -> &str {
        &self.city
    }

    pub fn timestamp(&self) -> NaiveDateTime {
        self.timestamp
    }

    /// Timestamp as `dd.MM.yyyy HH:mm`.
    pub fn display_timestamp(&self) -> String {
        self.timestamp.format(DISPLAY_FORMAT).to_string()
    }

    pub(crate) fn sortable_timestamp(&self) -> String {
        self.timestamp.format(SORTABLE_FORMAT).to_string()
    }

    pub fn temperature(&self) -> &str {
        &self.temperature
    }

    pub fn pressure(&self) -> &str {
        &self.pressure
    }

    pub fn humidity(&self) -> &str {
        &self.humidity
    }

    pub fn wind_speed(&self) -> &str {
        &self.wind_speed
    }

    pub fn feels_like(&self) -> &str {
        &self.feels_like
    }

    pub fn description(&self) -> &str {
        &self.description
    }
}

/// Where the samples of a [`Resolution`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Fetched,
    Cached,
    /// Nothing could be fetched or served from the cache.
    Empty,
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Source::Fetched => "fetched",
            Source::Cached => "cached",
            Source::Empty => "empty",
        })
    }
}

/// Outcome of resolving a city.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub samples: Vec<WeatherSample>,
    pub source: Source,
    /// Non-fatal problems hit along the way, e.g. a failed cache write.
    pub warnings: Vec<ErrorKind>,
}

impl Resolution {
    pub(crate) fn new(samples: Vec<WeatherSample>, source: Source) -> Self {
        Self {
            samples,
            source,
            warnings: Vec::new(),
        }
    }

    pub(crate) fn empty() -> Self {
        Self::new(Vec::new(), Source::Empty)
    }

    pub(crate) fn warn(&mut self, kind: ErrorKind) {
        if !self.warnings.contains(&kind) {
            self.warnings.push(kind);
        }
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, MalformedSample> {
    let raw = raw.trim();
    ACCEPTED_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .ok_or_else(|| MalformedSample::BadTimestamp(raw.to_string()))
}

fn finite(value: Option<f64>, field: &'static str) -> Result<f64, MalformedSample> {
    let v = value.ok_or(MalformedSample::MissingField(field))?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(MalformedSample::NotFinite(field))
    }
}

/// At most one decimal place, trailing `.0` dropped.
fn format_decimal(value: f64) -> String {
    let rounded = (value * 10.0).round() / 10.0;
    // avoid printing "-0"
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    if rounded.fract() == 0.0 {
        format!("{rounded:.0}")
    } else {
        format!("{rounded:.1}")
    }
}

fn capitalize_first(text: &str) -> String {
    let mut chars = text.trim().chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
