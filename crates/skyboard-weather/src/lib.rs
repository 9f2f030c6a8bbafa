//! Weather data for Skyboard
//!
//! OpenWeather current conditions, forecasts and geocoding behind a TTL cache,
//! with concurrent bundle lookups and periodic live feeds.

pub mod aggregator;
pub mod cache;
pub mod feed;
pub mod forecast;
pub mod geocode;
pub mod provider;
pub mod types;

mod raw;

pub use aggregator::{
    WeatherAggregator, WeatherBundle, DEFAULT_UPDATE_INTERVAL, MIN_UPDATE_INTERVAL,
};
pub use cache::{DataKind, WeatherCache};
pub use feed::WeatherFeed;
pub use geocode::{DEFAULT_SEARCH_LIMIT, MAX_SEARCH_LIMIT};
pub use provider::{OpenWeatherProvider, WeatherSource};
pub use types::*;
