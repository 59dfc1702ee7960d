//! Forecast HTTP endpoint.
//!
//! - GET /api/v1/forecast?city=NAME

use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::Json;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::config::FetchSettings;
use crate::engine::{BlendedPoint, EngineConfig, Overlay, UnavailableReason};
use crate::errors::{AppError, ErrorResponse};
use crate::services::forecast::{
    build_location_forecast, resolve_location_payload, CurrentConditions, DailyOutlook,
    LocationForecast,
};
use crate::services::open_meteo::{Location, OpenMeteoClient};

/// Header set when the response was built from a cached payload.
pub const STALE_HEADER: &str = "X-Forecast-Stale";

/// Shared application state for forecast endpoints.
#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) pool: sqlx::PgPool,
    pub(crate) client: OpenMeteoClient,
    pub(crate) settings: FetchSettings,
    pub(crate) engine: EngineConfig,
}

// ---------------------------------------------------------------------------
// Query parameter structs
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, IntoParams)]
pub struct ForecastQuery {
    /// Place name to geocode (e.g. "Lagos")
    pub city: String,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationResponse {
    pub name: String,
    pub country: String,
    pub admin1: String,
    pub latitude: f64,
    pub longitude: f64,
    pub timezone: String,
    /// "Name, Region, Country" with empty parts left out
    pub label: String,
}

impl From<&Location> for LocationResponse {
    fn from(loc: &Location) -> Self {
        Self {
            name: loc.name.clone(),
            country: loc.country.clone(),
            admin1: loc.admin1.clone(),
            latitude: loc.latitude,
            longitude: loc.longitude,
            timezone: loc.timezone.clone(),
            label: loc.label(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct CurrentResponse {
    /// Provider-local time of the observation (e.g. "2026-01-28T06:00")
    pub time: Option<String>,
    pub temperature_c: Option<f64>,
    pub apparent_temperature_c: Option<f64>,
    pub relative_humidity_pct: Option<f64>,
    pub precipitation_mm: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    /// WMO weather code
    pub weather_code: Option<i32>,
    /// Short description of the weather code
    pub condition: String,
}

impl From<&CurrentConditions> for CurrentResponse {
    fn from(c: &CurrentConditions) -> Self {
        Self {
            time: c.time.clone(),
            temperature_c: c.temperature_c,
            apparent_temperature_c: c.apparent_temperature_c,
            relative_humidity_pct: c.relative_humidity_pct,
            precipitation_mm: c.precipitation_mm,
            wind_speed_ms: c.wind_speed_ms,
            weather_code: c.weather_code,
            condition: c.condition.to_string(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DailyResponse {
    /// Local date (YYYY-MM-DD)
    pub date: String,
    pub temperature_max_c: Option<f64>,
    pub temperature_min_c: Option<f64>,
    pub precipitation_probability_pct: Option<f64>,
    pub weather_code: Option<i32>,
    pub condition: String,
}

impl From<&DailyOutlook> for DailyResponse {
    fn from(d: &DailyOutlook) -> Self {
        Self {
            date: d.date.format("%Y-%m-%d").to_string(),
            temperature_max_c: d.temperature_max_c,
            temperature_min_c: d.temperature_min_c,
            precipitation_probability_pct: d.precipitation_probability_pct,
            weather_code: d.weather_code,
            condition: d.condition.to_string(),
        }
    }
}

/// State of the AI temperature overlay.
#[derive(Debug, Serialize, ToSchema)]
pub struct OverlayResponse {
    pub available: bool,
    /// Heuristic score in [0.15, 0.95]; null when unavailable
    pub confidence: Option<f64>,
    /// Confidence as a whole percentage
    pub confidence_pct: Option<u32>,
    /// In-sample fit error in °C
    pub fit_rmse_c: Option<f64>,
    /// Human-readable summary
    pub status: String,
}

impl From<&Overlay> for OverlayResponse {
    fn from(overlay: &Overlay) -> Self {
        match *overlay {
            Overlay::Available { confidence, rmse } => {
                let pct = (confidence * 100.0).round() as u32;
                Self {
                    available: true,
                    confidence: Some(confidence),
                    confidence_pct: Some(pct),
                    fit_rmse_c: Some(rmse),
                    status: format!(
                        "AI overlay: blended • confidence {}% • fit RMSE {:.1}°C",
                        pct, rmse
                    ),
                }
            }
            Overlay::Unavailable(ref reason) => Self {
                available: false,
                confidence: None,
                confidence_pct: None,
                fit_rmse_c: None,
                status: match reason {
                    UnavailableReason::InsufficientHistory { .. } => {
                        "AI overlay: unavailable (not enough history yet)".to_string()
                    }
                    UnavailableReason::IllConditioned => {
                        "AI overlay: unavailable (model fit failed)".to_string()
                    }
                },
            },
        }
    }
}

/// One hour of the blended series.
#[derive(Debug, Serialize, ToSchema)]
pub struct HourlyPointResponse {
    /// Provider-local time (e.g. "2026-01-28T15:00")
    pub time: String,
    /// Provider forecast; null when the provider did not report one
    pub provider_temperature_c: Option<f64>,
    /// Regression prediction; null when the overlay is unavailable
    pub ai_temperature_c: Option<f64>,
    pub blended_temperature_c: Option<f64>,
}

impl From<&BlendedPoint> for HourlyPointResponse {
    fn from(p: &BlendedPoint) -> Self {
        Self {
            time: p.timestamp.format("%Y-%m-%dT%H:%M").to_string(),
            provider_temperature_c: finite(p.provider_temperature),
            ai_temperature_c: p.ai_temperature.and_then(finite),
            blended_temperature_c: finite(p.blended_temperature),
        }
    }
}

fn finite(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LocationForecastResponse {
    pub location: LocationResponse,
    /// When the underlying payload was fetched from Open-Meteo (ISO 8601)
    pub fetched_at: String,
    /// True when served from the cache because Open-Meteo was unreachable
    pub stale: bool,
    pub current: CurrentResponse,
    pub daily: Vec<DailyResponse>,
    pub overlay: OverlayResponse,
    pub hourly: Vec<HourlyPointResponse>,
}

impl From<&LocationForecast> for LocationForecastResponse {
    fn from(f: &LocationForecast) -> Self {
        Self {
            location: LocationResponse::from(&f.location),
            fetched_at: f.fetched_at.to_rfc3339(),
            stale: f.stale,
            current: CurrentResponse::from(&f.current),
            daily: f.daily.iter().map(DailyResponse::from).collect(),
            overlay: OverlayResponse::from(&f.enhanced.overlay),
            hourly: f
                .enhanced
                .points
                .iter()
                .map(HourlyPointResponse::from)
                .collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Get the AI-enhanced forecast for a place.
///
/// Geocodes the query, refreshes forecast and history from Open-Meteo and
/// blends the provider's hourly temperatures with the regression overlay. If
/// Open-Meteo is unavailable, returns the last cached payload for the same
/// query with the `X-Forecast-Stale: true` header.
#[utoipa::path(
    get,
    path = "/api/v1/forecast",
    tag = "Forecasts",
    params(ForecastQuery),
    responses(
        (status = 200, description = "Blended forecast for the location", body = LocationForecastResponse,
         headers(
             ("X-Forecast-Stale" = String, description = "Set to 'true' when serving cached data because Open-Meteo is unreachable")
         )),
        (status = 400, description = "Empty location query", body = ErrorResponse),
        (status = 404, description = "No geocoding result for the query", body = ErrorResponse),
        (status = 502, description = "External service error (Open-Meteo unreachable, no cache)", body = ErrorResponse),
    )
)]
pub async fn get_location_forecast(
    State(state): State<AppState>,
    Query(params): Query<ForecastQuery>,
) -> Result<(HeaderMap, Json<LocationForecastResponse>), AppError> {
    let payload =
        resolve_location_payload(&state.pool, &state.client, &state.settings, &params.city)
            .await?;

    tracing::debug!(
        "Serving forecast for '{}' (stale={})",
        payload.query_key,
        payload.stale
    );
    let forecast = build_location_forecast(&payload, &state.engine)?;

    let mut headers = HeaderMap::new();
    if forecast.stale {
        headers.insert(STALE_HEADER, HeaderValue::from_static("true"));
    }

    Ok((headers, Json(LocationForecastResponse::from(&forecast))))
}
