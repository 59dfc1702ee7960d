pub mod forecasts;
pub mod health;
pub mod refresher;
