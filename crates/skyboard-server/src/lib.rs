//! HTTP transport for Skyboard
//!
//! REST endpoints under `/api`, GraphQL queries over `POST /graphql` and the
//! live subscription over a WebSocket upgrade on `GET /graphql`.

pub mod graphql;
pub mod recaptcha;
pub mod rest;

pub use graphql::{build_schema, WeatherSchema};
pub use recaptcha::{RecaptchaVerifier, Verification};

use async_graphql_axum::{GraphQL, GraphQLSubscription};
use axum::routing::{get, get_service, post};
use axum::{middleware, Router};
use skyboard_weather::WeatherAggregator;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// Shared handler state
#[derive(Debug, Clone)]
pub struct AppState {
    pub aggregator: Arc<WeatherAggregator>,
    pub recaptcha: Arc<RecaptchaVerifier>,
}

impl AppState {
    pub fn new(aggregator: Arc<WeatherAggregator>, recaptcha: RecaptchaVerifier) -> Self {
        Self {
            aggregator,
            recaptcha: Arc::new(recaptcha),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let schema = build_schema(state.aggregator.clone());

    let gated = Router::new()
        .route("/api/cache/clear", post(rest::clear_cache))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            recaptcha::require_recaptcha,
        ));

    Router::new()
        .route("/api/health", get(rest::health))
        .route("/api/weather", get(rest::bundle))
        .route("/api/weather/current", get(rest::current))
        .route("/api/weather/forecast", get(rest::forecast))
        .route("/api/weather/hourly", get(rest::hourly))
        .route("/api/cities/search", get(rest::search_cities))
        .route("/api/cities/reverse", get(rest::reverse_geocode))
        .merge(gated)
        .route(
            "/graphql",
            get_service(GraphQLSubscription::new(schema.clone()))
                .post_service(GraphQL::new(schema)),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(addr: &str, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    let local: SocketAddr = listener.local_addr()?;
    tracing::info!("Skyboard listening on http://{} (GraphQL at /graphql)", local);

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}
