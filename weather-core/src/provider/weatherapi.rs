use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;

use crate::{error::FetchError, model::ForecastPoint};

use super::{WeatherProvider, status_error};

const DEFAULT_BASE_URL: &str = "http://api.weatherapi.com";
const FORECAST_DAYS: &str = "3";
/// WeatherAPI error code for "No matching location found."
const NO_LOCATION: i64 = 1006;

/// WeatherAPI.com hourly forecast.
#[derive(Debug, Clone)]
pub struct WeatherApiProvider {
    api_key: String,
    lang: String,
    base_url: String,
    http: Client,
}

impl WeatherApiProvider {
    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            lang: "en".to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            http: Client::new(),
        }
    }

    pub fn with_lang(mut self, lang: &str) -> Self {
        self.lang = lang.to_string();
        self
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[derive(Debug, Deserialize)]
struct WaCondition {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct WaForecastHour {
    time: Option<String>,
    temp_c: Option<f64>,
    feelslike_c: Option<f64>,
    pressure_mb: Option<f64>,
    humidity: Option<f64>,
    wind_kph: Option<f64>,
    condition: Option<WaCondition>,
}

#[derive(Debug, Deserialize)]
struct WaForecastDay {
    #[serde(default)]
    hour: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct WaForecast {
    forecastday: Vec<WaForecastDay>,
}

#[derive(Debug, Deserialize)]
struct WaForecastResponse {
    forecast: WaForecast,
}

#[derive(Debug, Deserialize)]
struct WaErrorBody {
    code: i64,
}

#[derive(Debug, Deserialize)]
struct WaErrorResponse {
    error: WaErrorBody,
}

impl From<WaForecastHour> for ForecastPoint {
    fn from(hour: WaForecastHour) -> Self {
        ForecastPoint {
            time: hour.time,
            temperature_c: hour.temp_c,
            feels_like_c: hour.feelslike_c,
            pressure_hpa: hour.pressure_mb,
            humidity_pct: hour.humidity,
            wind_speed_mps: hour.wind_kph.map(|kph| kph / 3.6),
            description: hour.condition.and_then(|c| c.text),
        }
    }
}

fn hour_to_point(value: serde_json::Value) -> ForecastPoint {
    match serde_json::from_value::<WaForecastHour>(value) {
        Ok(hour) => hour.into(),
        Err(err) => {
            tracing::debug!("undecodable WeatherAPI forecast hour: {err}");
            ForecastPoint::default()
        }
    }
}

/// WeatherAPI reports unknown locations as 400 with an error code.
fn classify_error(status: StatusCode, body: &str) -> FetchError {
    if status == StatusCode::BAD_REQUEST
        && let Ok(parsed) = serde_json::from_str::<WaErrorResponse>(body)
        && parsed.error.code == NO_LOCATION
    {
        return FetchError::NotFound;
    }
    status_error("WeatherAPI forecast", status, body)
}

#[async_trait]
impl WeatherProvider for WeatherApiProvider {
    async fn fetch_forecast(
        &self,
        city: &str,
        timeout: Duration,
    ) -> Result<Vec<ForecastPoint>, FetchError> {
        let url = format!("{}/v1/forecast.json", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(&[
                ("key", self.api_key.as_str()),
                ("q", city),
                ("days", FORECAST_DAYS),
                ("lang", self.lang.as_str()),
            ])
            .timeout(timeout)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        if !status.is_success() {
            return Err(classify_error(status, &body));
        }

        let parsed: WaForecastResponse = serde_json::from_str(&body).map_err(|e| {
            FetchError::MalformedResponse(format!("WeatherAPI forecast JSON: {e}"))
        })?;

        Ok(parsed
            .forecast
            .forecastday
            .into_iter()
            .flat_map(|day| day.hour)
            .map(hour_to_point)
            .collect())
    }
}
