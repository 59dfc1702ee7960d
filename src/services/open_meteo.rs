//! Open-Meteo client.
//!
//! Geocoding, hourly/daily forecast and the historical archive.
//! See: https://open-meteo.com/en/docs
//!
//! Responses are kept as raw `serde_json::Value` (persisted verbatim in the
//! payload cache) and deserialized into typed structs only when samples are
//! built, so a cached payload can always be re-run through the engine.

use chrono::{Duration, NaiveDate, NaiveDateTime};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::{Deserialize, Serialize};

use crate::engine::Sample;
use crate::errors::AppError;

pub const OPEN_METEO_GEOCODE_URL: &str = "https://geocoding-api.open-meteo.com/v1/search";
pub const OPEN_METEO_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const OPEN_METEO_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Per-request timeout for all Open-Meteo calls.
const REQUEST_TIMEOUT_SECS: u64 = 20;

const CURRENT_VARIABLES: &str = "temperature_2m,relative_humidity_2m,apparent_temperature,\
precipitation,weather_code,wind_speed_10m";
const FORECAST_HOURLY_VARIABLES: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m,\
surface_pressure,cloud_cover,weather_code";
const ARCHIVE_HOURLY_VARIABLES: &str =
    "temperature_2m,relative_humidity_2m,wind_speed_10m,surface_pressure,cloud_cover";
const DAILY_VARIABLES: &str =
    "temperature_2m_max,temperature_2m_min,precipitation_probability_max,weather_code";

/// Base URLs for the three Open-Meteo APIs.
#[derive(Debug, Clone)]
pub struct OpenMeteoEndpoints {
    pub geocode_url: String,
    pub forecast_url: String,
    pub archive_url: String,
}

impl Default for OpenMeteoEndpoints {
    fn default() -> Self {
        Self {
            geocode_url: OPEN_METEO_GEOCODE_URL.to_string(),
            forecast_url: OPEN_METEO_FORECAST_URL.to_string(),
            archive_url: OPEN_METEO_ARCHIVE_URL.to_string(),
        }
    }
}

/// Client for the Open-Meteo APIs.
#[derive(Debug, Clone)]
pub struct OpenMeteoClient {
    client: reqwest::Client,
    user_agent: String,
    endpoints: OpenMeteoEndpoints,
}

/// A geocoded place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    pub country: String,
    pub admin1: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
}

impl Location {
    /// "Name, Region, Country" with empty parts left out.
    pub fn label(&self) -> String {
        [&self.name, &self.admin1, &self.country]
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

// --- Open-Meteo JSON response types ---

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Option<Vec<GeocodeResult>>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    name: Option<String>,
    country: Option<String>,
    admin1: Option<String>,
    latitude: f64,
    longitude: f64,
    timezone: Option<String>,
}

/// Hourly arrays as returned by both the forecast and archive APIs.
/// `null` entries deserialize to `None`.
#[derive(Debug, Default, Deserialize)]
pub struct HourlyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub relative_humidity_2m: Vec<Option<f64>>,
    #[serde(default)]
    pub wind_speed_10m: Vec<Option<f64>>,
    #[serde(default)]
    pub surface_pressure: Vec<Option<f64>>,
    #[serde(default)]
    pub cloud_cover: Vec<Option<f64>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CurrentBlock {
    pub time: Option<String>,
    pub temperature_2m: Option<f64>,
    pub relative_humidity_2m: Option<f64>,
    pub apparent_temperature: Option<f64>,
    pub precipitation: Option<f64>,
    pub weather_code: Option<i32>,
    pub wind_speed_10m: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DailyBlock {
    #[serde(default)]
    pub time: Vec<String>,
    #[serde(default)]
    pub temperature_2m_max: Vec<Option<f64>>,
    #[serde(default)]
    pub temperature_2m_min: Vec<Option<f64>>,
    #[serde(default)]
    pub precipitation_probability_max: Vec<Option<f64>>,
    #[serde(default)]
    pub weather_code: Vec<Option<i32>>,
}

/// Parsed `/v1/forecast` response.
#[derive(Debug, Default, Deserialize)]
pub struct ForecastResponse {
    #[serde(default)]
    pub current: CurrentBlock,
    #[serde(default)]
    pub hourly: HourlyBlock,
    #[serde(default)]
    pub daily: DailyBlock,
}

/// Parsed `/v1/archive` response.
#[derive(Debug, Default, Deserialize)]
pub struct ArchiveResponse {
    #[serde(default)]
    pub hourly: HourlyBlock,
}

impl OpenMeteoClient {
    pub fn new(user_agent: &str, endpoints: OpenMeteoEndpoints) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::InternalError(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            user_agent: user_agent.to_string(),
            endpoints,
        })
    }

    /// Resolve a place name to its best-matching location.
    pub async fn geocode(&self, query: &str) -> Result<Location, AppError> {
        let params = [
            ("name", query.to_string()),
            ("count", "1".to_string()),
            ("language", "en".to_string()),
            ("format", "json".to_string()),
        ];
        let raw = self.get_json(&self.endpoints.geocode_url, &params).await?;
        parse_geocode(&raw, query)
    }

    /// Fetch current conditions, hourly and daily forecast for `forecast_days`.
    pub async fn fetch_forecast(
        &self,
        location: &Location,
        forecast_days: u32,
    ) -> Result<serde_json::Value, AppError> {
        let params = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("timezone", "auto".to_string()),
            ("forecast_days", forecast_days.to_string()),
            ("wind_speed_unit", "ms".to_string()),
            ("current", CURRENT_VARIABLES.to_string()),
            ("hourly", FORECAST_HOURLY_VARIABLES.to_string()),
            ("daily", DAILY_VARIABLES.to_string()),
        ];
        self.get_json(&self.endpoints.forecast_url, &params).await
    }

    /// Fetch hourly observations for the `days_back` days ending at `today`.
    pub async fn fetch_archive(
        &self,
        location: &Location,
        days_back: u32,
        today: NaiveDate,
    ) -> Result<serde_json::Value, AppError> {
        let start = today - Duration::days(i64::from(days_back));
        let params = [
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("timezone", "auto".to_string()),
            ("start_date", start.format("%Y-%m-%d").to_string()),
            ("end_date", today.format("%Y-%m-%d").to_string()),
            ("wind_speed_unit", "ms".to_string()),
            ("hourly", ARCHIVE_HOURLY_VARIABLES.to_string()),
        ];
        self.get_json(&self.endpoints.archive_url, &params).await
    }

    async fn get_json(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<serde_json::Value, AppError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&self.user_agent)
                .map_err(|e| AppError::InternalError(format!("Invalid User-Agent: {}", e)))?,
        );

        let response = self
            .client
            .get(url)
            .headers(headers)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                AppError::ExternalServiceError(format!("Open-Meteo request failed: {}", e))
            })?;

        if !response.status().is_success() {
            return Err(AppError::ExternalServiceError(format!(
                "Open-Meteo returned HTTP {}",
                response.status()
            )));
        }

        response.json().await.map_err(|e| {
            AppError::ExternalServiceError(format!("Open-Meteo JSON parse error: {}", e))
        })
    }
}

/// Pick the first geocoding result, falling back to the query for a missing name.
pub fn parse_geocode(raw: &serde_json::Value, query: &str) -> Result<Location, AppError> {
    let parsed: GeocodeResponse = serde_json::from_value(raw.clone()).map_err(|e| {
        AppError::ExternalServiceError(format!("Geocoding response structure error: {}", e))
    })?;

    let first = parsed
        .results
        .and_then(|r| r.into_iter().next())
        .ok_or_else(|| {
            AppError::NotFound(format!(
                "No results found for '{}'. Try a nearby major city name.",
                query
            ))
        })?;

    Ok(Location {
        name: first
            .name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| query.to_string()),
        country: first.country.unwrap_or_default(),
        admin1: first.admin1.unwrap_or_default(),
        latitude: first.latitude,
        longitude: first.longitude,
        timezone: first
            .timezone
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| "auto".to_string()),
    })
}

pub fn parse_forecast(raw: &serde_json::Value) -> Result<ForecastResponse, AppError> {
    serde_json::from_value(raw.clone()).map_err(|e| {
        AppError::ExternalServiceError(format!("Forecast response structure error: {}", e))
    })
}

pub fn parse_archive(raw: &serde_json::Value) -> Result<ArchiveResponse, AppError> {
    serde_json::from_value(raw.clone()).map_err(|e| {
        AppError::ExternalServiceError(format!("Archive response structure error: {}", e))
    })
}

impl HourlyBlock {
    /// Convert the parallel hourly arrays into samples.
    ///
    /// Spans the common length of `time` and `temperature_2m`. A covariate
    /// array that is shorter or absent yields `None` for the rows it does not
    /// cover. Rows with an unparseable timestamp are skipped.
    pub fn to_samples(&self) -> Vec<Sample> {
        let n = self.time.len().min(self.temperature_2m.len());

        let mut samples = Vec::with_capacity(n);
        for i in 0..n {
            let Some(timestamp) = parse_local_time(&self.time[i]) else {
                tracing::warn!("Skipping hourly row with unparseable time '{}'", self.time[i]);
                continue;
            };
            samples.push(Sample {
                timestamp,
                temperature: self.temperature_2m[i],
                relative_humidity: value_at(&self.relative_humidity_2m, i),
                wind_speed: value_at(&self.wind_speed_10m, i),
                surface_pressure: value_at(&self.surface_pressure, i),
                cloud_cover: value_at(&self.cloud_cover, i),
            });
        }
        samples
    }
}

fn value_at(values: &[Option<f64>], i: usize) -> Option<f64> {
    values.get(i).copied().flatten()
}

/// Parse an Open-Meteo local timestamp such as "2026-01-28T15:00".
pub fn parse_local_time(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S"))
        .ok()
}

/// Short description of a WMO weather code.
pub fn weather_label(code: i32) -> &'static str {
    match code {
        0 => "Clear",
        1 => "Partly cloudy",
        2 => "Cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 | 56 | 57 => "Drizzle",
        61 | 63 | 65 | 66 | 67 => "Rain",
        71 | 73 | 75 | 77 => "Snow",
        80..=82 => "Rain showers",
        85 | 86 => "Snow showers",
        95 | 96 | 99 => "Thunderstorm",
        _ => "Unknown",
    }
}
