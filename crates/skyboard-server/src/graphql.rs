//! GraphQL schema: weather queries plus the `weatherUpdates` subscription.

use async_graphql::{Context, EmptyMutation, ErrorExtensions, Object, Schema, Subscription};
use futures::Stream;
use skyboard_core::WeatherError;
use skyboard_weather::{
    City, Coordinate, CurrentWeather, ForecastDay, HourlyForecast, WeatherAggregator,
    WeatherBundle, WeatherUpdate,
};
use std::sync::Arc;

pub type WeatherSchema = Schema<QueryRoot, EmptyMutation, SubscriptionRoot>;

pub fn build_schema(aggregator: Arc<WeatherAggregator>) -> WeatherSchema {
    Schema::build(QueryRoot, EmptyMutation, SubscriptionRoot)
        .data(aggregator)
        .finish()
}

/// Convert a weather failure into a GraphQL error carrying `extensions.code`.
pub fn gql_error(err: &WeatherError) -> async_graphql::Error {
    if err.is_upstream() {
        tracing::warn!("Upstream failure: {}", err);
    }
    let code = err.code();
    async_graphql::Error::new(err.user_message()).extend_with(|_, ext| ext.set("code", code))
}

fn aggregator<'a>(ctx: &Context<'a>) -> async_graphql::Result<&'a Arc<WeatherAggregator>> {
    ctx.data::<Arc<WeatherAggregator>>()
}

fn coordinate(lat: f64, lon: f64) -> async_graphql::Result<Coordinate> {
    Coordinate::new(lat, lon).map_err(|e| gql_error(&e))
}

/// Bundle whose slots resolve to `null` plus an error entry when their fetch failed.
pub struct WeatherBundleObject {
    coord: Coordinate,
    bundle: WeatherBundle,
}

#[Object(name = "WeatherBundle")]
impl WeatherBundleObject {
    async fn lat(&self) -> f64 {
        self.coord.lat()
    }

    async fn lon(&self) -> f64 {
        self.coord.lon()
    }

    async fn current(&self) -> async_graphql::Result<Option<CurrentWeather>> {
        self.bundle.current.clone().map(Some).map_err(|e| gql_error(&e))
    }

    async fn forecast(&self) -> async_graphql::Result<Option<Vec<ForecastDay>>> {
        self.bundle.forecast.clone().map(Some).map_err(|e| gql_error(&e))
    }

    async fn hourly(&self) -> async_graphql::Result<Option<Vec<HourlyForecast>>> {
        self.bundle.hourly.clone().map(Some).map_err(|e| gql_error(&e))
    }
}

pub struct QueryRoot;

#[Object]
impl QueryRoot {
    /// Current conditions, daily forecast and hourly forecast in one request
    async fn weather(
        &self,
        ctx: &Context<'_>,
        lat: f64,
        lon: f64,
    ) -> async_graphql::Result<WeatherBundleObject> {
        let coord = coordinate(lat, lon)?;
        let bundle = aggregator(ctx)?.bundle(coord).await;
        if bundle.is_total_failure() {
            if let Some((_, err)) = bundle.errors().first() {
                return Err(gql_error(err));
            }
        }
        Ok(WeatherBundleObject { coord, bundle })
    }

    async fn current_weather(
        &self,
        ctx: &Context<'_>,
        lat: f64,
        lon: f64,
    ) -> async_graphql::Result<CurrentWeather> {
        let coord = coordinate(lat, lon)?;
        aggregator(ctx)?.current(coord).await.map_err(|e| gql_error(&e))
    }

    async fn forecast(
        &self,
        ctx: &Context<'_>,
        lat: f64,
        lon: f64,
    ) -> async_graphql::Result<Vec<ForecastDay>> {
        let coord = coordinate(lat, lon)?;
        aggregator(ctx)?.forecast(coord).await.map_err(|e| gql_error(&e))
    }

    async fn hourly_forecast(
        &self,
        ctx: &Context<'_>,
        lat: f64,
        lon: f64,
    ) -> async_graphql::Result<Vec<HourlyForecast>> {
        let coord = coordinate(lat, lon)?;
        aggregator(ctx)?.hourly(coord).await.map_err(|e| gql_error(&e))
    }

    async fn search_cities(
        &self,
        ctx: &Context<'_>,
        query: String,
        #[graphql(default = 5)] limit: i32,
    ) -> async_graphql::Result<Vec<City>> {
        // Out-of-range limits are clamped by the provider
        let limit = usize::try_from(limit).unwrap_or(0);
        aggregator(ctx)?
            .search_cities(&query, limit)
            .await
            .map_err(|e| gql_error(&e))
    }

    async fn reverse_geocode(
        &self,
        ctx: &Context<'_>,
        lat: f64,
        lon: f64,
    ) -> async_graphql::Result<Option<City>> {
        let coord = coordinate(lat, lon)?;
        aggregator(ctx)?
            .reverse_geocode(coord)
            .await
            .map_err(|e| gql_error(&e))
    }
}

pub struct SubscriptionRoot;

#[Subscription]
impl SubscriptionRoot {
    /// Current conditions now, then again on every refresh interval
    async fn weather_updates(
        &self,
        ctx: &Context<'_>,
        lat: f64,
        lon: f64,
    ) -> async_graphql::Result<impl Stream<Item = WeatherUpdate>> {
        let coord = coordinate(lat, lon)?;
        aggregator(ctx)?
            .subscribe(coord)
            .await
            .map_err(|e| gql_error(&e))
    }
}
