use axum::extract::State;
use axum::Json;
use serde::Serialize;
use sqlx::PgPool;
use utoipa::ToSchema;

use crate::db::queries;

/// Health check response.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Service status ("ok" when healthy, "degraded" when DB is unreachable)
    pub status: String,
    /// API version
    pub version: String,
    /// Whether the database is reachable
    pub database: bool,
    /// Number of locations with a cached payload (null when the DB is unreachable)
    pub cached_locations: Option<i64>,
}

/// Health check endpoint.
///
/// Returns the API status and version. Counts cached location payloads,
/// which doubles as the connectivity check. Returns status "degraded"
/// (still 200) if the DB is unreachable.
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse),
    )
)]
pub async fn health_check(State(pool): State<PgPool>) -> Json<HealthResponse> {
    let cached = match queries::count_location_payloads(&pool).await {
        Ok(n) => Some(n),
        Err(e) => {
            tracing::warn!("Health check: database query failed: {}", e);
            None
        }
    };

    Json(health_response(cached))
}

fn health_response(cached_locations: Option<i64>) -> HealthResponse {
    let db_ok = cached_locations.is_some();
    HealthResponse {
        status: if db_ok {
            "ok".to_string()
        } else {
            "degraded".to_string()
        },
        version: env!("CARGO_PKG_VERSION").to_string(),
        database: db_ok,
        cached_locations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_ok() {
        let r = health_response(Some(3));
        assert_eq!(r.status, "ok");
        assert!(r.database);
        assert_eq!(r.cached_locations, Some(3));
        assert_eq!(r.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn test_health_response_degraded() {
        let r = health_response(None);
        assert_eq!(r.status, "degraded");
        assert!(!r.database);
    }
}
