use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::FromRow;
use uuid::Uuid;

/// Cached Open-Meteo payloads for one location query.
///
/// `query_key` is the trimmed, lowercased user query; a later refresh of the
/// same query overwrites the row.
#[derive(Debug, Clone, FromRow)]
#[allow(dead_code)] // All fields populated by FromRow; id/created_at only read in tests
pub struct LocationPayloadRow {
    pub id: Uuid,
    pub query_key: String,
    pub location_name: String,
    pub country: String,
    pub admin1: String,
    pub latitude: Decimal,
    pub longitude: Decimal,
    pub timezone: String,
    pub fetched_at: DateTime<Utc>,
    pub forecast_json: serde_json::Value,
    pub archive_json: serde_json::Value,
    pub created_at: DateTime<Utc>,
}
