//! Integration tests for the REST routes, driven in-process through the router
//! against a wiremock OpenWeather.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use skyboard_core::RecaptchaConfig;
use skyboard_server::{router, AppState, RecaptchaVerifier};
use skyboard_weather::cache::DEFAULT_TTL;
use skyboard_weather::{OpenWeatherProvider, WeatherAggregator, WeatherCache};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn current_body() -> Value {
    json!({
        "weather": [{"id": 800, "main": "Clear", "description": "clear sky", "icon": "01d"}],
        "main": {"temp": 18.3, "feels_like": 17.9, "temp_min": 16.0, "temp_max": 20.1, "pressure": 1021, "humidity": 55},
        "visibility": 10000,
        "wind": {"speed": 3.1, "deg": 180},
        "clouds": {"all": 0},
        "dt": 1_717_243_200,
        "sys": {"sunrise": 1_717_213_000, "sunset": 1_717_272_000},
        "timezone": 3600,
        "name": "London"
    })
}

fn forecast_body(count: usize) -> Value {
    let list: Vec<Value> = (0..count)
        .map(|i| {
            json!({
                "dt": 1_717_200_000 + (i as i64) * 10_800,
                "main": {"temp": 15.0 + (i % 8) as f64, "feels_like": 14.0, "temp_min": 14.0, "temp_max": 23.0, "pressure": 1015, "humidity": 60},
                "weather": [{"id": 801, "main": "Clouds", "description": "few clouds", "icon": "02d"}],
                "wind": {"speed": 4.0, "deg": 90},
                "pop": 0.1
            })
        })
        .collect();
    json!({"list": list, "city": {"timezone": 0}})
}

fn build_app(server: &MockServer, recaptcha: RecaptchaVerifier) -> Router {
    let provider = OpenWeatherProvider::new("test_key", Duration::from_millis(300))
        .unwrap()
        .with_base_url(&server.uri());
    let cache = Arc::new(WeatherCache::new(DEFAULT_TTL));
    let aggregator = Arc::new(WeatherAggregator::new(Arc::new(provider), cache));
    router(AppState::new(aggregator, recaptcha))
}

fn app(server: &MockServer) -> Router {
    build_app(server, RecaptchaVerifier::disabled())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

async fn get(app: Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::get(uri).body(Body::empty()).unwrap()).await
}

async fn mount_current(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_current_weather_success() {
    let server = MockServer::start().await;
    mount_current(&server).await;

    let (status, body) = get(app(&server), "/api/weather/current?lat=51.51&lon=-0.13").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["temp"], 18.3);
    assert_eq!(body["data"]["weather"][0]["main"], "Clear");
}

#[tokio::test]
async fn test_missing_coordinate_is_bad_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .expect(0)
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/api/weather/current?lat=51.51").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = get(app(&server), "/api/weather/hourly?lat=abc&lon=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = get(app(&server), "/api/weather/forecast?lat=91&lon=0").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_upstream_error_is_bad_gateway() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(500).set_body_string("internal stack trace"))
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/api/weather/current?lat=10&lon=10").await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let message = body["error"].as_str().unwrap();
    assert!(!message.contains("stack trace"));
}

#[tokio::test]
async fn test_upstream_timeout_is_gateway_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(current_body())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/api/weather/current?lat=10&lon=10").await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_forecast_groups_by_day() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .and(query_param("cnt", "40"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(40)))
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/api/weather/forecast?lat=51.51&lon=-0.13").await;

    assert_eq!(status, StatusCode::OK);
    let days = body["data"].as_array().unwrap();
    assert!(!days.is_empty() && days.len() <= 7);
    for day in days {
        assert!(day["temp"]["max"].as_f64() >= day["temp"]["min"].as_f64());
    }
}

#[tokio::test]
async fn test_bundle_reports_partial_failure() {
    let server = MockServer::start().await;
    mount_current(&server).await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .and(query_param("cnt", "40"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/forecast"))
        .and(query_param("cnt", "16"))
        .respond_with(ResponseTemplate::new(200).set_body_json(forecast_body(16)))
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/api/weather?lat=51.51&lon=-0.13").await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["current"].is_object());
    assert!(body["data"]["forecast"].is_null());
    assert_eq!(body["data"]["hourly"].as_array().unwrap().len(), 16);
    assert_eq!(body["errors"][0]["field"], "forecast");
    assert_eq!(body["errors"][0]["code"], "UPSTREAM_UNAVAILABLE");
}

#[tokio::test]
async fn test_bundle_total_failure_is_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/api/weather?lat=51.51&lon=-0.13").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_repeat_request_is_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data/2.5/weather"))
        .respond_with(ResponseTemplate::new(200).set_body_json(current_body()))
        .expect(1)
        .mount(&server)
        .await;

    let app = app(&server);
    let (first, _) = get(app.clone(), "/api/weather/current?lat=51.5074&lon=-0.1278").await;
    let (second, _) = get(app, "/api/weather/current?lat=51.51&lon=-0.13").await;
    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
}

#[tokio::test]
async fn test_search_cities() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/1.0/direct"))
        .and(query_param("q", "Paris"))
        .and(query_param("limit", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Paris", "lat": 48.8588897, "lon": 2.3200410, "country": "FR", "state": "Ile-de-France"},
            {"name": "Paris", "lat": 33.6617962, "lon": -95.555513, "country": "US", "state": "Texas"}
        ])))
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/api/cities/search?q=Paris&limit=2").await;

    assert_eq!(status, StatusCode::OK);
    let cities = body["data"].as_array().unwrap();
    assert_eq!(cities.len(), 2);
    assert_eq!(cities[0]["country"], "FR");
    assert_eq!(cities[1]["id"], "33.6617962,-95.555513");
}

#[tokio::test]
async fn test_empty_search_is_bad_request() {
    let server = MockServer::start().await;

    let (status, body) = get(app(&server), "/api/cities/search?q=%20%20").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = get(app(&server), "/api/cities/search").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_reverse_geocode_without_match_is_null() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/geo/1.0/reverse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let (status, body) = get(app(&server), "/api/cities/reverse?lat=0&lon=-140").await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"].is_null());
}

#[tokio::test]
async fn test_health_reports_cache_size() {
    let server = MockServer::start().await;
    mount_current(&server).await;

    let app = app(&server);
    get(app.clone(), "/api/weather/current?lat=1&lon=1").await;
    let (status, body) = get(app, "/api/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");
    assert_eq!(body["data"]["cacheEntries"], 1);
    assert_eq!(body["data"]["activeSubscriptions"], 0);
}

fn gated_app(server: &MockServer) -> Router {
    let config = RecaptchaConfig {
        secret: Some("test-secret".to_string()),
        verify_url: format!("{}/recaptcha/api/siteverify", server.uri()),
        min_score: 0.5,
    };
    let verifier = RecaptchaVerifier::new(&config, Duration::from_secs(2)).unwrap();
    build_app(server, verifier)
}

fn clear_request(token: Option<&str>) -> Request<Body> {
    let mut builder = Request::post("/api/cache/clear");
    if let Some(token) = token {
        builder = builder.header("x-recaptcha-token", token);
    }
    builder.body(Body::empty()).unwrap()
}

async fn mount_siteverify(server: &MockServer, body: Value) {
    Mock::given(method("POST"))
        .and(path("/recaptcha/api/siteverify"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_gate_rejects_missing_token() {
    let server = MockServer::start().await;

    let (status, body) = send(gated_app(&server), clear_request(None)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_gate_rejects_low_score() {
    let server = MockServer::start().await;
    mount_siteverify(&server, json!({"success": true, "score": 0.3})).await;

    let (status, _) = send(gated_app(&server), clear_request(Some("weak"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_gate_passes_high_score() {
    let server = MockServer::start().await;
    mount_siteverify(&server, json!({"success": true, "score": 0.8})).await;

    let (status, body) = send(gated_app(&server), clear_request(Some("good"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], 0);
}

#[tokio::test]
async fn test_gate_fails_closed_when_verification_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/recaptcha/api/siteverify"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let (status, _) = send(gated_app(&server), clear_request(Some("token"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_gate_bypassed_without_secret() {
    let server = MockServer::start().await;
    mount_current(&server).await;

    let app = app(&server);
    get(app.clone(), "/api/weather/current?lat=1&lon=1").await;
    let (status, body) = send(app, clear_request(None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["cleared"], 1);
}
