// Weather AI API v0.1
use axum::http::{HeaderName, Method};
use axum::{routing::get, Router};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod config;
mod db;
mod engine;
mod errors;
mod helpers;
mod routes;
mod services;

use config::AppConfig;
use engine::EngineConfig;
use routes::forecasts::AppState;
use services::open_meteo::OpenMeteoClient;
use services::refresher::{RefresherContext, RefresherState, SharedRefresherState};

/// Maximum number of connections in the database pool.
const DB_POOL_MAX_CONNECTIONS: u32 = 5;
/// Minimum number of connections kept alive in the database pool.
const DB_POOL_MIN_CONNECTIONS: u32 = 2;

/// Weather AI API OpenAPI document.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Weather AI API",
        version = "0.1.0",
        description = "Location weather forecasts from Open-Meteo with an AI temperature overlay. \
            A ridge regression fitted on the last weeks of observed hourly weather predicts \
            temperature from time-of-day, season and weather covariates; its prediction is \
            blended with the provider forecast and reported with a heuristic confidence.",
        license(name = "MIT"),
    ),
    tags(
        (name = "Health", description = "Service health check"),
        (name = "Forecasts", description = "Blended location forecasts"),
        (name = "Refresher", description = "Background location refresher status"),
    ),
    paths(
        routes::health::health_check,
        routes::forecasts::get_location_forecast,
        routes::refresher::get_refresher_status,
    ),
    components(
        schemas(
            routes::health::HealthResponse,
            routes::forecasts::LocationResponse,
            routes::forecasts::CurrentResponse,
            routes::forecasts::DailyResponse,
            routes::forecasts::OverlayResponse,
            routes::forecasts::HourlyPointResponse,
            routes::forecasts::LocationForecastResponse,
            services::refresher::RefresherState,
            services::refresher::LocationRefreshStatus,
            errors::ErrorResponse,
        )
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() {
    let config = AppConfig::from_env();

    // Initialize tracing
    let log_json = config.log_json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "weather_ai_api=debug,tower_http=debug".into()),
        )
        .with(log_json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!log_json).then(|| tracing_subscriber::fmt::layer()))
        .init();

    let engine_config = EngineConfig::default();
    engine_config
        .validate()
        .expect("Default engine configuration must be valid");

    // Set up database connection pool
    let pool = PgPoolOptions::new()
        .max_connections(DB_POOL_MAX_CONNECTIONS)
        .min_connections(DB_POOL_MIN_CONNECTIONS)
        .connect(&config.database_url)
        .await
        .expect("Failed to connect to database");

    // Run migrations
    sqlx::migrate!()
        .run(&pool)
        .await
        .expect("Failed to run database migrations");

    tracing::info!("Database migrations completed");

    let client = OpenMeteoClient::new(&config.open_meteo_user_agent, config.endpoints.clone())
        .expect("Failed to create Open-Meteo client");

    // Build shared application state
    let app_state = AppState {
        pool: pool.clone(),
        client: client.clone(),
        settings: config.settings,
        engine: engine_config,
    };

    // Shared refresher state; the loop only runs when locations are configured
    let refresher_state: SharedRefresherState = Arc::new(RwLock::new(RefresherState::new(
        &config.refresh_locations,
        config.refresh_interval_secs,
    )));
    if config.refresh_locations.is_empty() {
        tracing::info!("REFRESH_LOCATIONS is empty, background refresher disabled");
    } else {
        tokio::spawn(services::refresher::run_refresher(
            RefresherContext {
                pool: pool.clone(),
                client,
                settings: config.settings,
                engine: engine_config,
            },
            config.refresh_locations.clone(),
            config.refresh_interval_secs,
            refresher_state.clone(),
        ));
    }

    // CORS: read-only API, GET only; expose X-Forecast-Stale
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET])
        .allow_headers(Any)
        .expose_headers([HeaderName::from_static("x-forecast-stale")]);

    // Build router
    let forecast_routes = Router::new()
        .route(
            "/api/v1/forecast",
            get(routes::forecasts::get_location_forecast),
        )
        .with_state(app_state);

    // Health check uses PgPool to verify DB connectivity
    let health_routes = Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .with_state(pool);

    let refresher_routes = Router::new()
        .route(
            "/api/v1/refresher/status",
            get(routes::refresher::get_refresher_status),
        )
        .with_state(refresher_state);

    let app = Router::new()
        .merge(health_routes)
        .merge(forecast_routes)
        .merge(refresher_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("API server listening on {}", addr);
    tracing::info!(
        "Swagger UI available at http://localhost:{}/swagger-ui/",
        config.port
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind TCP listener");
    axum::serve(listener, app)
        .await
        .expect("Server terminated unexpectedly");
}
