use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::models::LocationPayloadRow;

/// Parameters for writing a location payload.
pub struct UpsertLocationPayloadParams<'a> {
    pub query_key: &'a str,
    pub location_name: &'a str,
    pub country: &'a str,
    pub admin1: &'a str,
    pub latitude: rust_decimal::Decimal,
    pub longitude: rust_decimal::Decimal,
    pub timezone: &'a str,
    pub fetched_at: DateTime<Utc>,
    pub forecast_json: &'a serde_json::Value,
    pub archive_json: &'a serde_json::Value,
}

/// Insert or replace the cached payload for a query (last write wins).
pub async fn upsert_location_payload(
    pool: &PgPool,
    params: UpsertLocationPayloadParams<'_>,
) -> Result<LocationPayloadRow, sqlx::Error> {
    sqlx::query_as::<_, LocationPayloadRow>(
        "INSERT INTO location_payloads (
            id, query_key, location_name, country, admin1,
            latitude, longitude, timezone, fetched_at,
            forecast_json, archive_json, created_at, updated_at
        ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, NOW(), NOW())
        ON CONFLICT (query_key) DO UPDATE SET
            location_name = EXCLUDED.location_name,
            country = EXCLUDED.country,
            admin1 = EXCLUDED.admin1,
            latitude = EXCLUDED.latitude,
            longitude = EXCLUDED.longitude,
            timezone = EXCLUDED.timezone,
            fetched_at = EXCLUDED.fetched_at,
            forecast_json = EXCLUDED.forecast_json,
            archive_json = EXCLUDED.archive_json,
            updated_at = NOW()
        RETURNING id, query_key, location_name, country, admin1,
                  latitude, longitude, timezone, fetched_at,
                  forecast_json, archive_json, created_at",
    )
    .bind(Uuid::new_v4())
    .bind(params.query_key)
    .bind(params.location_name)
    .bind(params.country)
    .bind(params.admin1)
    .bind(params.latitude)
    .bind(params.longitude)
    .bind(params.timezone)
    .bind(params.fetched_at)
    .bind(params.forecast_json)
    .bind(params.archive_json)
    .fetch_one(pool)
    .await
}

/// Get the cached payload for a query key, regardless of age.
pub async fn get_location_payload(
    pool: &PgPool,
    query_key: &str,
) -> Result<Option<LocationPayloadRow>, sqlx::Error> {
    sqlx::query_as::<_, LocationPayloadRow>(
        "SELECT id, query_key, location_name, country, admin1,
                latitude, longitude, timezone, fetched_at,
                forecast_json, archive_json, created_at
         FROM location_payloads
         WHERE query_key = $1",
    )
    .bind(query_key)
    .fetch_optional(pool)
    .await
}

/// Number of cached locations.
pub async fn count_location_payloads(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM location_payloads")
        .fetch_one(pool)
        .await
}
