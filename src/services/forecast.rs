//! Location forecast service.
//!
//! A refresh geocodes the query, fetches forecast and archive concurrently and
//! stores both raw payloads in `location_payloads`. When Open-Meteo cannot be
//! reached the last stored payload for the same query is served instead,
//! flagged as stale. Building the response is a pure function of the payload,
//! so live and cached payloads go through the same engine run.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;

use crate::config::FetchSettings;
use crate::db::models::LocationPayloadRow;
use crate::db::queries::{self, UpsertLocationPayloadParams};
use crate::engine::{enhance_forecast, EngineConfig, EnhancedForecast};
use crate::errors::AppError;
use crate::helpers::{coordinate_to_decimal, dec_to_f64};
use crate::services::open_meteo::{
    parse_archive, parse_forecast, weather_label, CurrentBlock, DailyBlock, Location,
    OpenMeteoClient,
};

/// Raw provider data for one location query.
#[derive(Debug, Clone)]
pub struct LocationPayload {
    pub query_key: String,
    pub location: Location,
    pub fetched_at: DateTime<Utc>,
    pub forecast: serde_json::Value,
    pub archive: serde_json::Value,
    /// `true` when served from the cache after a failed refresh.
    pub stale: bool,
}

/// Conditions at the time of the forecast run.
#[derive(Debug, Clone, PartialEq)]
pub struct CurrentConditions {
    pub time: Option<String>,
    pub temperature_c: Option<f64>,
    pub apparent_temperature_c: Option<f64>,
    pub relative_humidity_pct: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub weather_code: Option<i32>,
    pub condition: &'static str,
}

/// One day of the daily outlook.
#[derive(Debug, Clone, PartialEq)]
pub struct DailyOutlook {
    pub date: NaiveDate,
    pub temperature_max_c: Option<f64>,
    pub temperature_min_c: Option<f64>,
    pub precipitation_probability_pct: Option<f64>,
    pub weather_code: Option<i32>,
    pub condition: &'static str,
}

/// Everything needed to render a location's forecast.
#[derive(Debug, Clone)]
pub struct LocationForecast {
    pub location: Location,
    pub fetched_at: DateTime<Utc>,
    pub stale: bool,
    pub current: CurrentConditions,
    pub daily: Vec<DailyOutlook>,
    pub enhanced: EnhancedForecast,
}

/// Cache key for a user query: trimmed and lower-cased.
pub fn normalize_query(query: &str) -> Result<String, AppError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest(
            "Location query must not be empty".to_string(),
        ));
    }
    Ok(trimmed.to_lowercase())
}

/// Fetch fresh data for a query and store it in the payload cache.
///
/// A failed cache write is logged; the fresh payload is still returned.
pub async fn refresh_location(
    pool: &PgPool,
    client: &OpenMeteoClient,
    settings: &FetchSettings,
    query: &str,
) -> Result<LocationPayload, AppError> {
    let query_key = normalize_query(query)?;
    let location = client.geocode(query.trim()).await?;

    let today = Utc::now().date_naive();
    let (forecast, archive) = futures::try_join!(
        client.fetch_forecast(&location, settings.forecast_days),
        client.fetch_archive(&location, settings.history_days, today),
    )?;

    let fetched_at = Utc::now();
    let write = queries::upsert_location_payload(
        pool,
        UpsertLocationPayloadParams {
            query_key: &query_key,
            location_name: &location.name,
            country: &location.country,
            admin1: &location.admin1,
            latitude: coordinate_to_decimal(location.latitude),
            longitude: coordinate_to_decimal(location.longitude),
            timezone: &location.timezone,
            fetched_at,
            forecast_json: &forecast,
            archive_json: &archive,
        },
    )
    .await;
    if let Err(e) = write {
        tracing::warn!("Failed to cache payload for '{}': {}", query_key, e);
    }

    tracing::debug!(
        "Refreshed '{}' → {} ({:.4}, {:.4})",
        query_key,
        location.label(),
        location.latitude,
        location.longitude
    );

    Ok(LocationPayload {
        query_key,
        location,
        fetched_at,
        forecast,
        archive,
        stale: false,
    })
}

/// Refresh a query, falling back to its cached payload when the refresh fails.
///
/// Without a cached payload the refresh error is returned unchanged.
pub async fn resolve_location_payload(
    pool: &PgPool,
    client: &OpenMeteoClient,
    settings: &FetchSettings,
    query: &str,
) -> Result<LocationPayload, AppError> {
    let query_key = normalize_query(query)?;

    let refresh_err = match refresh_location(pool, client, settings, query).await {
        Ok(payload) => return Ok(payload),
        Err(e) => e,
    };

    match queries::get_location_payload(pool, &query_key).await {
        Ok(Some(row)) => {
            tracing::warn!(
                "Refresh of '{}' failed ({}), serving cached payload from {}",
                query_key,
                refresh_err,
                row.fetched_at
            );
            Ok(payload_from_row(row))
        }
        Ok(None) => Err(refresh_err),
        Err(e) => {
            tracing::error!("Failed to read cached payload for '{}': {}", query_key, e);
            Err(refresh_err)
        }
    }
}

fn payload_from_row(row: LocationPayloadRow) -> LocationPayload {
    LocationPayload {
        location: Location {
            name: row.location_name,
            country: row.country,
            admin1: row.admin1,
            latitude: dec_to_f64(row.latitude),
            longitude: dec_to_f64(row.longitude),
            timezone: row.timezone,
        },
        query_key: row.query_key,
        fetched_at: row.fetched_at,
        forecast: row.forecast_json,
        archive: row.archive_json,
        stale: true,
    }
}

/// Run the engine over a payload and assemble the location forecast.
pub fn build_location_forecast(
    payload: &LocationPayload,
    config: &EngineConfig,
) -> Result<LocationForecast, AppError> {
    let forecast = parse_forecast(&payload.forecast)?;
    // An unreadable archive only costs the overlay, never the provider series
    let history = match parse_archive(&payload.archive) {
        Ok(archive) => archive.hourly.to_samples(),
        Err(e) => {
            tracing::warn!(
                "Ignoring unreadable archive for '{}': {}",
                payload.query_key,
                e
            );
            Vec::new()
        }
    };
    let horizon = forecast.hourly.to_samples();
    let enhanced = enhance_forecast(config, &history, &horizon);

    Ok(LocationForecast {
        location: payload.location.clone(),
        fetched_at: payload.fetched_at,
        stale: payload.stale,
        current: current_conditions(&forecast.current),
        daily: daily_outlook(&forecast.daily),
        enhanced,
    })
}

fn current_conditions(current: &CurrentBlock) -> CurrentConditions {
    CurrentConditions {
        time: current.time.clone(),
        temperature_c: current.temperature_2m,
        apparent_temperature_c: current.apparent_temperature,
        relative_humidity_pct: current.relative_humidity_2m,
        precipitation_mm: current.precipitation,
        wind_speed_ms: current.wind_speed_10m,
        weather_code: current.weather_code,
        condition: condition_for(current.weather_code),
    }
}

/// Daily rows over the common length of the daily arrays.
fn daily_outlook(daily: &DailyBlock) -> Vec<DailyOutlook> {
    let n = daily
        .time
        .len()
        .min(daily.temperature_2m_max.len())
        .min(daily.temperature_2m_min.len())
        .min(daily.precipitation_probability_max.len())
        .min(daily.weather_code.len());

    (0..n)
        .filter_map(|i| {
            let date = match NaiveDate::parse_from_str(&daily.time[i], "%Y-%m-%d") {
                Ok(d) => d,
                Err(_) => {
                    tracing::warn!("Skipping daily row with unparseable date '{}'", daily.time[i]);
                    return None;
                }
            };
            Some(DailyOutlook {
                date,
                temperature_max_c: daily.temperature_2m_max[i],
                temperature_min_c: daily.temperature_2m_min[i],
                precipitation_probability_pct: daily.precipitation_probability_max[i],
                weather_code: daily.weather_code[i],
                condition: condition_for(daily.weather_code[i]),
            })
        })
        .collect()
}

fn condition_for(code: Option<i32>) -> &'static str {
    code.map(weather_label).unwrap_or("Unknown")
}
