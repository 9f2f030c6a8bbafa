//! REST handlers. Success bodies are `{ "data": ... }`, failures `{ "error": "..." }`.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use skyboard_core::{AuthError, WeatherError};
use skyboard_weather::geocode::DEFAULT_SEARCH_LIMIT;
use skyboard_weather::{City, Coordinate, CurrentWeather, ForecastDay, HourlyForecast};

use crate::AppState;

/// Client-facing failure with its HTTP status.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<WeatherError> for ApiError {
    fn from(err: WeatherError) -> Self {
        if err.is_upstream() {
            tracing::warn!("Upstream failure: {}", err);
        }
        Self {
            status: StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::BAD_GATEWAY),
            message: err.user_message(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: err.user_message().to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct DataBody<T> {
    pub data: T,
}

type ApiResult<T> = Result<Json<DataBody<T>>, ApiError>;

fn data<T>(value: T) -> Json<DataBody<T>> {
    Json(DataBody { data: value })
}

/// Raw `lat`/`lon` query parameters, validated into a [`Coordinate`] by the handler.
#[derive(Debug, Deserialize)]
pub struct CoordQuery {
    lat: Option<String>,
    lon: Option<String>,
}

impl CoordQuery {
    fn coordinate(&self) -> Result<Coordinate, WeatherError> {
        Coordinate::parse(self.lat.as_deref(), self.lon.as_deref())
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    q: Option<String>,
    limit: Option<String>,
}

impl SearchQuery {
    fn limit(&self) -> Result<usize, WeatherError> {
        match self.limit.as_deref().map(str::trim) {
            None | Some("") => Ok(DEFAULT_SEARCH_LIMIT),
            Some(raw) => raw
                .parse()
                .map_err(|_| WeatherError::validation("limit must be a positive integer")),
        }
    }
}

pub async fn current(
    State(state): State<AppState>,
    Query(query): Query<CoordQuery>,
) -> ApiResult<CurrentWeather> {
    let coord = query.coordinate()?;
    Ok(data(state.aggregator.current(coord).await?))
}

pub async fn forecast(
    State(state): State<AppState>,
    Query(query): Query<CoordQuery>,
) -> ApiResult<Vec<ForecastDay>> {
    let coord = query.coordinate()?;
    Ok(data(state.aggregator.forecast(coord).await?))
}

pub async fn hourly(
    State(state): State<AppState>,
    Query(query): Query<CoordQuery>,
) -> ApiResult<Vec<HourlyForecast>> {
    let coord = query.coordinate()?;
    Ok(data(state.aggregator.hourly(coord).await?))
}

#[derive(Debug, Serialize)]
pub struct BundleData {
    pub current: Option<CurrentWeather>,
    pub forecast: Option<Vec<ForecastDay>>,
    pub hourly: Option<Vec<HourlyForecast>>,
}

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct BundleBody {
    pub data: BundleData,
    pub errors: Vec<FieldError>,
}

/// Current, forecast and hourly in one response. Failed slots are `null`
/// with an entry in `errors`; the request fails only when all three do.
pub async fn bundle(
    State(state): State<AppState>,
    Query(query): Query<CoordQuery>,
) -> Result<Json<BundleBody>, ApiError> {
    let coord = query.coordinate()?;
    let bundle = state.aggregator.bundle(coord).await;

    if bundle.is_total_failure() {
        if let Some((_, err)) = bundle.errors().first() {
            return Err(ApiError::from((*err).clone()));
        }
    }

    let errors = bundle
        .errors()
        .into_iter()
        .map(|(field, err)| FieldError {
            field,
            code: err.code(),
            message: err.user_message(),
        })
        .collect();

    Ok(Json(BundleBody {
        data: BundleData {
            current: bundle.current.ok(),
            forecast: bundle.forecast.ok(),
            hourly: bundle.hourly.ok(),
        },
        errors,
    }))
}

pub async fn search_cities(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> ApiResult<Vec<City>> {
    let limit = query.limit()?;
    let q = query.q.as_deref().unwrap_or_default();
    Ok(data(state.aggregator.search_cities(q, limit).await?))
}

pub async fn reverse_geocode(
    State(state): State<AppState>,
    Query(query): Query<CoordQuery>,
) -> ApiResult<Option<City>> {
    let coord = query.coordinate()?;
    Ok(data(state.aggregator.reverse_geocode(coord).await?))
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: &'static str,
    pub cache_entries: usize,
    pub active_subscriptions: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<DataBody<HealthStatus>> {
    data(HealthStatus {
        status: "ok",
        cache_entries: state.aggregator.cache().len(),
        active_subscriptions: state.aggregator.active_subscriptions(),
    })
}

#[derive(Debug, Serialize)]
pub struct ClearedCache {
    pub cleared: usize,
}

/// Drop every cached payload. Mounted behind the reCAPTCHA gate.
pub async fn clear_cache(State(state): State<AppState>) -> Json<DataBody<ClearedCache>> {
    let cache = state.aggregator.cache();
    let cleared = cache.len();
    cache.clear();
    data(ClearedCache { cleared })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let err = ApiError::from(WeatherError::validation("Latitude is required"));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.message(), "Latitude is required");

        let err = ApiError::from(WeatherError::UpstreamTimeout);
        assert_eq!(err.status(), StatusCode::GATEWAY_TIMEOUT);

        let err = ApiError::from(WeatherError::InvalidResponse("missing field `main`".into()));
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
        assert!(!err.message().contains("main"));

        let err = ApiError::from(AuthError::MissingToken);
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_search_limit_parsing() {
        let query = SearchQuery {
            q: Some("Paris".into()),
            limit: None,
        };
        assert_eq!(query.limit().unwrap(), DEFAULT_SEARCH_LIMIT);

        let query = SearchQuery {
            q: None,
            limit: Some("3".into()),
        };
        assert_eq!(query.limit().unwrap(), 3);

        let query = SearchQuery {
            q: None,
            limit: Some("-1".into()),
        };
        assert!(matches!(query.limit(), Err(WeatherError::Validation(_))));
    }
}
