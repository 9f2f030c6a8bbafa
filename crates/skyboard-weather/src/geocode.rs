//! City search and reverse geocoding via the OpenWeather geocoding API.

use skyboard_core::WeatherError;

use crate::provider::OpenWeatherProvider;
use crate::raw::OwGeoCity;
use crate::types::{City, Coordinate};

/// Results returned when the caller doesn't ask for a limit
pub const DEFAULT_SEARCH_LIMIT: usize = 5;
/// The provider never returns more than five matches
pub const MAX_SEARCH_LIMIT: usize = 5;

/// Trim a search query, rejecting blank input.
pub fn normalize_query(query: &str) -> Result<&str, WeatherError> {
    let trimmed = query.trim();
    if trimmed.is_empty() {
        return Err(WeatherError::validation("Search query must not be empty"));
    }
    Ok(trimmed)
}

pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_SEARCH_LIMIT)
}

impl OpenWeatherProvider {
    pub(crate) async fn direct_geocode(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<City>, WeatherError> {
        let query = normalize_query(query)?;
        let params = [
            ("q", query.to_string()),
            ("limit", clamp_limit(limit).to_string()),
        ];

        let raw: Vec<OwGeoCity> = self.get_json("/geo/1.0/direct", &params).await?;
        tracing::debug!("City search for {:?} returned {} matches", query, raw.len());

        Ok(raw.into_iter().map(City::from).collect())
    }

    pub(crate) async fn reverse_lookup(
        &self,
        coord: Coordinate,
    ) -> Result<Option<City>, WeatherError> {
        let params = [
            ("lat", coord.lat().to_string()),
            ("lon", coord.lon().to_string()),
            ("limit", "1".to_string()),
        ];

        let raw: Vec<OwGeoCity> = self.get_json("/geo/1.0/reverse", &params).await?;

        let city = raw.into_iter().next().map(City::from);
        if let Some(c) = &city {
            tracing::info!("Reverse geocoded {} to {}", coord, c.name);
        }
        Ok(city)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::WeatherSource;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(server: &MockServer) -> OpenWeatherProvider {
        OpenWeatherProvider::new("test_key", Duration::from_secs(2))
            .unwrap()
            .with_base_url(&server.uri())
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  London ").unwrap(), "London");
        assert!(matches!(
            normalize_query("   "),
            Err(WeatherError::Validation(_))
        ));
    }

    #[test]
    fn test_clamp_limit() {
        assert_eq!(clamp_limit(0), 1);
        assert_eq!(clamp_limit(3), 3);
        assert_eq!(clamp_limit(50), MAX_SEARCH_LIMIT);
    }

    #[tokio::test]
    async fn test_search_cities() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/geo/1.0/direct"))
            .and(query_param("q", "London"))
            .and(query_param("limit", "5"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "London", "lat": 51.5073219, "lon": -0.1276474, "country": "GB", "state": "England"},
                {"name": "London", "lat": 42.9832406, "lon": -81.243372, "country": "CA", "state": "Ontario"}
            ])))
            .mount(&mock_server)
            .await;

        let cities = provider(&mock_server)
            .search_cities("London", DEFAULT_SEARCH_LIMIT)
            .await
            .unwrap();

        assert_eq!(cities.len(), 2);
        assert!(cities[0].name.to_lowercase().contains("london"));
        assert_eq!(cities[0].id, "51.5073219,-0.1276474");
        assert_eq!(cities[1].state.as_deref(), Some("Ontario"));
    }

    #[tokio::test]
    async fn test_empty_query_never_reaches_network() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(0)
            .mount(&mock_server)
            .await;

        let err = provider(&mock_server)
            .search_cities("  ", DEFAULT_SEARCH_LIMIT)
            .await
            .unwrap_err();
        assert_eq!(err.http_status(), 400);
    }

    #[tokio::test]
    async fn test_reverse_geocode() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/geo/1.0/reverse"))
            .and(query_param("limit", "1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"name": "City of Westminster", "lat": 51.5, "lon": -0.13, "country": "GB", "state": "England"}
            ])))
            .mount(&mock_server)
            .await;

        let coord = Coordinate::new(51.5, -0.13).unwrap();
        let city = provider(&mock_server).reverse_geocode(coord).await.unwrap();
        assert_eq!(city.map(|c| c.country), Some("GB".to_string()));
    }

    #[tokio::test]
    async fn test_reverse_geocode_no_match() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/geo/1.0/reverse"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .mount(&mock_server)
            .await;

        let coord = Coordinate::new(0.0, -140.0).unwrap();
        let city = provider(&mock_server).reverse_geocode(coord).await.unwrap();
        assert!(city.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires OPENWEATHER_API_KEY. Run with: cargo test -p skyboard-weather -- --ignored
    async fn test_live_search_london() {
        let key = std::env::var("OPENWEATHER_API_KEY").unwrap();
        let provider = OpenWeatherProvider::new(key, Duration::from_secs(5)).unwrap();
        let cities = provider.search_cities("London", 5).await.unwrap();
        assert!(!cities.is_empty());
        assert!(cities[0].name.to_lowercase().contains("london"));
    }
}
