use crate::services::open_meteo::{
    OpenMeteoEndpoints, OPEN_METEO_ARCHIVE_URL, OPEN_METEO_FORECAST_URL, OPEN_METEO_GEOCODE_URL,
};

/// Lower bound for the background refresh interval (seconds).
const MIN_REFRESH_INTERVAL_SECS: u64 = 60;

/// Application configuration, parsed from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub port: u16,
    pub open_meteo_user_agent: String,
    pub endpoints: OpenMeteoEndpoints,
    pub settings: FetchSettings,
    /// Location queries refreshed in the background. Empty disables the refresher.
    pub refresh_locations: Vec<String>,
    pub refresh_interval_secs: u64,
    /// Emit logs as JSON lines instead of the human-readable format.
    pub log_json: bool,
}

/// How much data to fetch per location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub history_days: u32,
    pub forecast_days: u32,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            history_days: 21,
            forecast_days: 7,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = FetchSettings::default();
        Self {
            database_url: std::env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            port: std::env::var("PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("PORT must be a valid u16"),
            open_meteo_user_agent: std::env::var("OPEN_METEO_USER_AGENT")
                .unwrap_or_else(|_| "WeatherAI/0.1".to_string()),
            endpoints: OpenMeteoEndpoints {
                geocode_url: env_or("OPEN_METEO_GEOCODE_URL", OPEN_METEO_GEOCODE_URL),
                forecast_url: env_or("OPEN_METEO_FORECAST_URL", OPEN_METEO_FORECAST_URL),
                archive_url: env_or("OPEN_METEO_ARCHIVE_URL", OPEN_METEO_ARCHIVE_URL),
            },
            settings: FetchSettings {
                history_days: std::env::var("HISTORY_DAYS")
                    .map(|v| v.parse().expect("HISTORY_DAYS must be a valid u32"))
                    .unwrap_or(defaults.history_days),
                forecast_days: std::env::var("FORECAST_DAYS")
                    .map(|v| v.parse().expect("FORECAST_DAYS must be a valid u32"))
                    .unwrap_or(defaults.forecast_days),
            },
            refresh_locations: parse_location_list(
                &std::env::var("REFRESH_LOCATIONS").unwrap_or_else(|_| "Lagos".to_string()),
            ),
            refresh_interval_secs: std::env::var("REFRESH_INTERVAL_SECS")
                .map(|v| v.parse().expect("REFRESH_INTERVAL_SECS must be a valid u64"))
                .unwrap_or(1800)
                .max(MIN_REFRESH_INTERVAL_SECS),
            log_json: std::env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

/// Split a comma-separated list, dropping blank entries.
fn parse_location_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
