//! OpenWeather upstream client.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use skyboard_core::{OpenWeatherConfig, ReqwestErrorExt, WeatherError};
use std::time::Duration;
use tracing::instrument;

use crate::forecast::{aggregate_daily, hourly_from_samples, MAX_HOURLY_SAMPLES};
use crate::raw::{OwCurrent, OwForecast};
use crate::types::{City, Coordinate, CurrentWeather, ForecastDay, HourlyForecast};

const OPENWEATHER_URL: &str = "https://api.openweathermap.org";
const REQUEST_TIMEOUT_SECS: u64 = 5;
const USER_AGENT: &str = "Skyboard/0.1.0";
/// Samples requested for daily aggregation (5 days of 3-hour steps)
const FORECAST_SAMPLES: usize = 40;

/// Source of weather and geocoding data.
///
/// Coordinates arrive pre-validated, so implementations never see an
/// out-of-range location.
#[async_trait]
pub trait WeatherSource: Send + Sync + std::fmt::Debug {
    async fn get_current_weather(&self, coord: Coordinate) -> Result<CurrentWeather, WeatherError>;

    async fn get_forecast(&self, coord: Coordinate) -> Result<Vec<ForecastDay>, WeatherError>;

    async fn get_hourly_forecast(
        &self,
        coord: Coordinate,
    ) -> Result<Vec<HourlyForecast>, WeatherError>;

    /// Rejects an empty query with a validation error before any request.
    async fn search_cities(&self, query: &str, limit: usize) -> Result<Vec<City>, WeatherError>;

    async fn reverse_geocode(&self, coord: Coordinate) -> Result<Option<City>, WeatherError>;
}

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    client: Client,
    api_key: String,
    base_url: String,
    units: String,
}

impl OpenWeatherProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, WeatherError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(ReqwestErrorExt::into_weather_error)?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: OPENWEATHER_URL.to_string(),
            units: "metric".to_string(),
        })
    }

    pub fn from_config(config: &OpenWeatherConfig) -> Result<Self, WeatherError> {
        let timeout = if config.timeout_secs == 0 {
            Duration::from_secs(REQUEST_TIMEOUT_SECS)
        } else {
            config.timeout()
        };
        Ok(Self::new(config.api_key.clone(), timeout)?
            .with_base_url(&config.base_url)
            .with_units(&config.units))
    }

    /// Point the client at another host (mock servers, proxies).
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_units(mut self, units: &str) -> Self {
        self.units = units.to_string();
        self
    }

    /// GET `path` with the API key bound, decoding a JSON body on 2xx.
    pub(crate) async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, WeatherError> {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("OpenWeather request to {} failed: {}", path, e);
                e.into_weather_error()
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("OpenWeather {} returned status {}", path, status);
            return Err(WeatherError::UpstreamUnavailable {
                status: Some(status.as_u16()),
                message: format!("{}: {}", status, truncate_body(&body)),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(ReqwestErrorExt::into_weather_error)
    }

    fn coord_query(&self, coord: Coordinate) -> Vec<(&'static str, String)> {
        vec![
            ("lat", coord.lat().to_string()),
            ("lon", coord.lon().to_string()),
            ("units", self.units.clone()),
        ]
    }

    async fn fetch_samples(
        &self,
        coord: Coordinate,
        count: usize,
    ) -> Result<OwForecast, WeatherError> {
        let mut query = self.coord_query(coord);
        query.push(("cnt", count.to_string()));
        self.get_json("/data/2.5/forecast", &query).await
    }
}

#[async_trait]
impl WeatherSource for OpenWeatherProvider {
    #[instrument(skip(self), level = "debug")]
    async fn get_current_weather(&self, coord: Coordinate) -> Result<CurrentWeather, WeatherError> {
        let raw: OwCurrent = self
            .get_json("/data/2.5/weather", &self.coord_query(coord))
            .await?;
        raw.into_domain()
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_forecast(&self, coord: Coordinate) -> Result<Vec<ForecastDay>, WeatherError> {
        let raw = self.fetch_samples(coord, FORECAST_SAMPLES).await?;
        aggregate_daily(&raw.list, raw.city.timezone)
    }

    #[instrument(skip(self), level = "debug")]
    async fn get_hourly_forecast(
        &self,
        coord: Coordinate,
    ) -> Result<Vec<HourlyForecast>, WeatherError> {
        let raw = self.fetch_samples(coord, MAX_HOURLY_SAMPLES).await?;
        hourly_from_samples(&raw.list)
    }

    #[instrument(skip(self), level = "debug")]
    async fn search_cities(&self, query: &str, limit: usize) -> Result<Vec<City>, WeatherError> {
        self.direct_geocode(query, limit).await
    }

    #[instrument(skip(self), level = "debug")]
    async fn reverse_geocode(&self, coord: Coordinate) -> Result<Option<City>, WeatherError> {
        self.reverse_lookup(coord).await
    }
}

fn truncate_body(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}
