use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

use crate::{error::FetchError, model::ForecastPoint};

use super::{WeatherProvider, status_error};

const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org";

/// OpenWeatherMap 5 day / 3 hour forecast.
#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    lang: String,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            lang: "en".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    /// Language for upstream descriptions, e.g. `ru`.
    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = lang.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    pressure: Option<f64>,
    humidity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwWind {
    speed: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct OwForecastEntry {
    dt_txt: Option<String>,
    main: OwMain,
    weather: Vec<OwWeather>,
    wind: OwWind,
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Vec<serde_json::Value>,
}

impl From<OwForecastEntry> for ForecastPoint {
    fn from(entry: OwForecastEntry) -> Self {
        ForecastPoint {
            time: entry.dt_txt,
            temperature_c: entry.main.temp,
            feels_like_c: entry.main.feels_like,
            pressure_hpa: entry.main.pressure,
            humidity_pct: entry.main.humidity,
            wind_speed_mps: entry.wind.speed,
            description: entry.weather.into_iter().next().and_then(|w| w.description),
        }
    }
}

/// Decode each list entry on its own so one bad entry only spoils itself.
fn entry_to_point(value: serde_json::Value) -> ForecastPoint {
    match serde_json::from_value::<OwForecastEntry>(value) {
        Ok(entry) => entry.into(),
        Err(err) => {
            tracing::debug!("undecodable OpenWeather forecast entry: {err}");
            ForecastPoint::default()
        }
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch_forecast(
        &self,
        city: &str,
        timeout: Duration,
    ) -> Result<Vec<ForecastPoint>, FetchError> {
        let url = format!("{}/data/2.5/forecast", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("q", city),
                ("appid", self.api_key.as_str()),
                ("units", "metric"),
                ("lang", self.lang.as_str()),
            ])
            .timeout(timeout)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(status_error("OpenWeather forecast", status, &body));
        }

        let parsed: OwForecastResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::MalformedResponse(format!("OpenWeather forecast JSON: {e}"))
        })?;

        Ok(parsed.list.into_iter().map(entry_to_point).collect())
    }
}
