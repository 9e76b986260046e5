//! Human-readable output. All user-facing wording lives here.

use std::fmt::Write;
use weather_core::{ErrorKind, QuotaStatus, Resolution, Source, WeatherError, WeatherSample};

const HEADERS: [&str; 7] = [
    "Date/time",
    "Temp",
    "Feels like",
    "Pressure",
    "Humidity",
    "Wind",
    "Description",
];

/// Remaining-request bands used when showing the quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaLevel {
    Ok,
    Low,
    Exhausted,
}

impl QuotaLevel {
    pub fn of(status: &QuotaStatus) -> Self {
        match status.remaining() {
            0 => Self::Exhausted,
            1..=100 => Self::Low,
            _ => Self::Ok,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Low => "low",
            Self::Exhausted => "exhausted",
        }
    }
}

pub fn resolution(city: &str, res: &Resolution, status: &QuotaStatus) -> String {
    let mut out = String::new();

    match res.source {
        Source::Fetched => {
            let _ = writeln!(out, "Forecast for {city} updated.");
        }
        Source::Cached => {
            let _ = writeln!(
                out,
                "Daily request limit reached; showing forecast for {city} cached today."
            );
        }
        Source::Empty if status.is_exhausted() => {
            let _ = writeln!(
                out,
                "Daily request limit ({}) exceeded and nothing is cached for {city} today.",
                status.limit
            );
        }
        Source::Empty => {
            let _ = writeln!(out, "No forecast data available for {city}.");
        }
    }

    for kind in &res.warnings {
        let _ = writeln!(out, "warning: {}", kind_message(*kind));
    }

    if !res.samples.is_empty() {
        out.push('\n');
        out.push_str(&table(&res.samples));
    }

    let _ = writeln!(out, "\nRequests today: {} / {}", status.used, status.limit);
    out
}

pub fn table(samples: &[WeatherSample]) -> String {
    let rows: Vec<[String; 7]> = samples
        .iter()
        .map(|s| {
            [
                s.display_timestamp(),
                s.temperature().to_string(),
                s.feels_like().to_string(),
                s.pressure().to_string(),
                s.humidity().to_string(),
                s.wind_speed().to_string(),
                s.description().to_string(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(|h| h.chars().count());
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let mut out = String::new();
    push_row(&mut out, &HEADERS, &widths);
    for row in &rows {
        push_row(&mut out, row, &widths);
    }
    out
}

fn push_row<S: AsRef<str>>(out: &mut String, cells: &[S], widths: &[usize; 7]) {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, &width)| format!("{:<width$}", cell.as_ref()))
        .collect::<Vec<_>>()
        .join("  ");
    out.push_str(line.trim_end());
    out.push('\n');
}

pub fn quota(status: &QuotaStatus) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Requests on {}: {} / {} ({} remaining) [{}]",
        status.day,
        status.used,
        status.limit,
        status.remaining(),
        QuotaLevel::of(status).label()
    );
    match status.stored_today {
        Some(n) => {
            let _ = writeln!(out, "Samples cached today: {n}");
        }
        None => {
            let _ = writeln!(out, "Samples cached today: unavailable");
        }
    }
    if status.degraded {
        let _ = writeln!(out, "warning: {}", kind_message(ErrorKind::QuotaDegraded));
    }
    out
}

pub fn error_message(err: &WeatherError, city: &str) -> String {
    match err.kind() {
        ErrorKind::FetchNotFound => format!("City not found: {city}"),
        ErrorKind::FetchConnectionError => format!("{} ({err})", kind_message(err.kind())),
        kind => kind_message(kind).to_string(),
    }
}

fn kind_message(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::InvalidInput => "Please enter a city name.",
        ErrorKind::StorageUnavailable => "The local forecast cache is unavailable.",
        ErrorKind::FetchNotFound => "City not found.",
        ErrorKind::FetchUnauthorized => {
            "The weather provider rejected the API key. Run `weather configure <provider>`."
        }
        ErrorKind::FetchConnectionError => "Could not reach the weather server.",
        ErrorKind::FetchTimeout => "The weather server did not answer in time.",
        ErrorKind::FetchMalformed => "The weather server sent data that could not be read.",
        ErrorKind::QuotaDegraded => {
            "The request counter could not be saved; today's count may be inaccurate."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use weather_core::{FetchError, ForecastPoint};

    fn status(used: u32) -> QuotaStatus {
        QuotaStatus {
            day: NaiveDate::from_ymd_opt(2024, 5, 1).unwrap(),
            used,
            limit: 500,
            stored_today: Some(3),
            degraded: false,
        }
    }

    fn sample(description: &str) -> WeatherSample {
        ForecastPoint {
            time: Some("2024-05-01 12:00:00".into()),
            temperature_c: Some(-3.0),
            feels_like_c: Some(-7.25),
            pressure_hpa: Some(1020.0),
            humidity_pct: Some(90.0),
            wind_speed_mps: Some(5.0),
            description: Some(description.into()),
        }
        .normalize("Perm")
        .unwrap()
    }

    #[test]
    fn quota_levels_follow_remaining_requests() {
        assert_eq!(QuotaLevel::of(&status(10)), QuotaLevel::Ok);
        assert_eq!(QuotaLevel::of(&status(400)), QuotaLevel::Low);
        assert_eq!(QuotaLevel::of(&status(500)), QuotaLevel::Exhausted);
    }

    #[test]
    fn table_aligns_columns() {
        let out = table(&[sample("snow"), sample("light shower snow")]);
        let lines: Vec<_> = out.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Date/time"));
        assert!(lines[1].starts_with("01.05.2024 12:00  -3 °C"));
        let col = |line: &str| line.chars().position(|c| c == 'L' || c == 'S').unwrap();
        assert_eq!(col(lines[1]), col(lines[2]));
    }

    #[test]
    fn empty_result_explains_the_quota() {
        let res = Resolution {
            samples: Vec::new(),
            source: Source::Empty,
            warnings: Vec::new(),
        };
        assert!(resolution("Perm", &res, &status(500)).contains("limit (500) exceeded"));
        assert!(resolution("Perm", &res, &status(3)).contains("No forecast data"));
    }

    #[test]
    fn warnings_are_listed() {
        let res = Resolution {
            samples: vec![sample("clear")],
            source: Source::Fetched,
            warnings: vec![ErrorKind::StorageUnavailable],
        };
        let out = resolution("Perm", &res, &status(1));
        assert!(out.contains("updated"));
        assert!(out.contains("warning: The local forecast cache is unavailable."));
        assert!(out.contains("Requests today: 1 / 500"));
    }

    #[test]
    fn error_messages_are_per_kind() {
        let err = WeatherError::Fetch {
            city: "Atlantis".into(),
            operation: "forecast fetch",
            source: FetchError::NotFound,
        };
        assert_eq!(error_message(&err, "Atlantis"), "City not found: Atlantis");

        let err = WeatherError::InvalidInput("empty".into());
        assert_eq!(error_message(&err, ""), "Please enter a city name.");
    }
}
