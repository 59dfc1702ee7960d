//! Background refresher for configured locations.
//!
//! Keeps `location_payloads` warm so the stale fallback has recent data even
//! when nobody is calling the API, and re-runs the engine on every new
//! payload to record whether the overlay could be produced.
//!
//! - Refreshes every configured location sequentially, then sleeps for the
//!   configured interval
//! - A failing location is recorded and skipped; the loop never stops
//! - State is in-memory (`Arc<RwLock<RefresherState>>`) and exposed via the
//!   status endpoint

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::RwLock;
use utoipa::ToSchema;

use crate::config::FetchSettings;
use crate::engine::{EngineConfig, Overlay};
use crate::services::forecast::{build_location_forecast, refresh_location, LocationForecast};
use crate::services::open_meteo::OpenMeteoClient;

// ---------------------------------------------------------------------------
// Refresher state (in-memory, shared via Arc<RwLock<>>)
// ---------------------------------------------------------------------------

/// Outcome of the last refresh of one location.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct LocationRefreshStatus {
    /// Query as configured
    pub query: String,
    /// Resolved "Name, Region, Country" label
    pub label: Option<String>,
    pub last_refreshed_at: Option<DateTime<Utc>>,
    /// "ok", "error: <message>", or "pending"
    pub last_result: String,
    pub overlay_available: bool,
    pub confidence: Option<f64>,
    pub fit_rmse_c: Option<f64>,
    pub hourly_points: usize,
}

impl LocationRefreshStatus {
    fn pending(query: &str) -> Self {
        Self {
            query: query.to_string(),
            label: None,
            last_refreshed_at: None,
            last_result: "pending".to_string(),
            overlay_available: false,
            confidence: None,
            fit_rmse_c: None,
            hourly_points: 0,
        }
    }
}

/// Global refresher state, exposed via the status endpoint.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefresherState {
    pub active: bool,
    pub interval_secs: u64,
    pub next_wakeup_at: Option<DateTime<Utc>>,
    pub last_cycle_completed_at: Option<DateTime<Utc>>,
    pub last_cycle_duration_ms: Option<u64>,
    pub total_cycles: u64,
    pub locations: Vec<LocationRefreshStatus>,
}

impl RefresherState {
    pub fn new(locations: &[String], interval_secs: u64) -> Self {
        Self {
            active: !locations.is_empty(),
            interval_secs,
            next_wakeup_at: None,
            last_cycle_completed_at: None,
            last_cycle_duration_ms: None,
            total_cycles: 0,
            locations: locations
                .iter()
                .map(|q| LocationRefreshStatus::pending(q))
                .collect(),
        }
    }
}

/// Shared refresher state handle.
pub type SharedRefresherState = Arc<RwLock<RefresherState>>;

/// Dependencies of one refresh cycle.
#[derive(Clone)]
pub struct RefresherContext {
    pub pool: PgPool,
    pub client: OpenMeteoClient,
    pub settings: FetchSettings,
    pub engine: EngineConfig,
}

// ---------------------------------------------------------------------------
// Main loop
// ---------------------------------------------------------------------------

/// Run the background refresher. This function never returns.
///
/// Should be spawned via `tokio::spawn(run_refresher(...))`.
pub async fn run_refresher(
    ctx: RefresherContext,
    locations: Vec<String>,
    interval_secs: u64,
    state: SharedRefresherState,
) {
    tracing::info!(
        "Background refresher started for {} location(s), every {}s",
        locations.len(),
        interval_secs
    );

    loop {
        let cycle_start = Utc::now();

        for (i, query) in locations.iter().enumerate() {
            let status = refresh_one(&ctx, query).await;
            let mut s = state.write().await;
            if let Some(slot) = s.locations.get_mut(i) {
                *slot = status;
            }
        }

        let duration_ms = (Utc::now() - cycle_start).num_milliseconds().max(0) as u64;
        {
            let mut s = state.write().await;
            s.last_cycle_completed_at = Some(Utc::now());
            s.last_cycle_duration_ms = Some(duration_ms);
            s.next_wakeup_at = Some(Utc::now() + Duration::seconds(interval_secs as i64));
            s.total_cycles += 1;
        }

        tracing::info!(
            "Refresher: cycle complete in {}ms, sleeping {}s",
            duration_ms,
            interval_secs
        );

        tokio::time::sleep(std::time::Duration::from_secs(interval_secs)).await;
    }
}

async fn refresh_one(ctx: &RefresherContext, query: &str) -> LocationRefreshStatus {
    let payload = match refresh_location(&ctx.pool, &ctx.client, &ctx.settings, query).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!("Refresher: failed to refresh '{}': {}", query, e);
            return failed_status(query, &e.to_string());
        }
    };

    match build_location_forecast(&payload, &ctx.engine) {
        Ok(forecast) => status_from_forecast(query, &forecast),
        Err(e) => {
            tracing::error!("Refresher: failed to build forecast for '{}': {}", query, e);
            failed_status(query, &e.to_string())
        }
    }
}

fn failed_status(query: &str, message: &str) -> LocationRefreshStatus {
    LocationRefreshStatus {
        last_result: format!("error: {}", message),
        last_refreshed_at: Some(Utc::now()),
        ..LocationRefreshStatus::pending(query)
    }
}

fn status_from_forecast(query: &str, forecast: &LocationForecast) -> LocationRefreshStatus {
    let (confidence, fit_rmse_c) = match forecast.enhanced.overlay {
        Overlay::Available { confidence, rmse } => (Some(confidence), Some(rmse)),
        Overlay::Unavailable(_) => (None, None),
    };
    LocationRefreshStatus {
        query: query.to_string(),
        label: Some(forecast.location.label()),
        last_refreshed_at: Some(forecast.fetched_at),
        last_result: "ok".to_string(),
        overlay_available: forecast.enhanced.overlay.is_available(),
        confidence,
        fit_rmse_c,
        hourly_points: forecast.enhanced.points.len(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EnhancedForecast, UnavailableReason};
    use crate::services::forecast::CurrentConditions;
    use crate::services::open_meteo::Location;

    fn forecast_with(overlay: Overlay) -> LocationForecast {
        LocationForecast {
            location: Location {
                name: "Abuja".to_string(),
                country: "Nigeria".to_string(),
                admin1: "FCT".to_string(),
                latitude: 9.05785,
                longitude: 7.49508,
                timezone: "Africa/Lagos".to_string(),
            },
            fetched_at: "2026-01-28T06:00:00Z".parse().unwrap(),
            stale: false,
            current: CurrentConditions {
                time: None,
                temperature_c: None,
                apparent_temperature_c: None,
                relative_humidity_pct: None,
                precipitation_mm: None,
                wind_speed_ms: None,
                weather_code: None,
                condition: "Unknown",
            },
            daily: Vec::new(),
            enhanced: EnhancedForecast {
                points: Vec::new(),
                overlay,
            },
        }
    }

    #[test]
    fn test_new_state_is_pending() {
        let state = RefresherState::new(&["Lagos".to_string(), "Abuja".to_string()], 1800);
        assert!(state.active);
        assert_eq!(state.total_cycles, 0);
        assert_eq!(state.locations.len(), 2);
        assert!(state.locations.iter().all(|l| l.last_result == "pending"));
    }

    #[test]
    fn test_new_state_without_locations_is_inactive() {
        let state = RefresherState::new(&[], 600);
        assert!(!state.active);
        assert!(state.locations.is_empty());
    }

    #[test]
    fn test_status_from_available_overlay() {
        let forecast = forecast_with(Overlay::Available {
            confidence: 0.82,
            rmse: 1.08,
        });
        let status = status_from_forecast("abuja", &forecast);
        assert_eq!(status.last_result, "ok");
        assert_eq!(status.label.as_deref(), Some("Abuja, FCT, Nigeria"));
        assert!(status.overlay_available);
        assert_eq!(status.confidence, Some(0.82));
        assert_eq!(status.fit_rmse_c, Some(1.08));
    }

    #[test]
    fn test_status_from_unavailable_overlay() {
        let forecast = forecast_with(Overlay::Unavailable(
            UnavailableReason::InsufficientHistory {
                valid_samples: 12,
                required: 48,
            },
        ));
        let status = status_from_forecast("abuja", &forecast);
        assert!(!status.overlay_available);
        assert_eq!(status.confidence, None);
        assert_eq!(status.fit_rmse_c, None);
    }

    #[test]
    fn test_failed_status() {
        let status = failed_status("Atlantis", "Not found: no results");
        assert_eq!(status.query, "Atlantis");
        assert!(status.last_result.starts_with("error: "));
        assert!(status.last_refreshed_at.is_some());
        assert!(!status.overlay_available);
    }
}
