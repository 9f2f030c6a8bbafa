use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use skyboard_core::WeatherError;

/// A validated latitude/longitude pair, the key for every weather lookup.
///
/// Fields are private so a `Coordinate` can only exist inside its valid range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Coordinate {
    lat: f64,
    lon: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lon: f64) -> Result<Self, WeatherError> {
        if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
            return Err(WeatherError::validation(
                "lat must be a number between -90 and 90",
            ));
        }
        if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
            return Err(WeatherError::validation(
                "lon must be a number between -180 and 180",
            ));
        }
        Ok(Self { lat, lon })
    }

    /// Parse raw query-string values, rejecting missing or non-numeric input.
    pub fn parse(lat: Option<&str>, lon: Option<&str>) -> Result<Self, WeatherError> {
        let (lat, lon) = match (lat, lon) {
            (Some(lat), Some(lon)) => (lat.trim(), lon.trim()),
            _ => return Err(WeatherError::validation("lat and lon are required")),
        };
        let lat = lat
            .parse::<f64>()
            .map_err(|_| WeatherError::validation("lat must be a number between -90 and 90"))?;
        let lon = lon
            .parse::<f64>()
            .map_err(|_| WeatherError::validation("lon must be a number between -180 and 180"))?;
        Self::new(lat, lon)
    }

    pub fn lat(&self) -> f64 {
        self.lat
    }

    pub fn lon(&self) -> f64 {
        self.lon
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.lat, self.lon)
    }
}

/// Provider condition entry (e.g. 500 / "Rain" / "light rain" / "10d")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct WeatherCondition {
    pub id: i32,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct Wind {
    pub speed: f64,
    pub deg: Option<f64>,
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct Clouds {
    /// Cloudiness, percent
    pub all: u8,
}

/// Current conditions snapshot. Replaced wholesale by newer fetches, never edited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct CurrentWeather {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: f64,
    pub humidity: u8,
    /// Never empty
    pub weather: Vec<WeatherCondition>,
    pub wind: Wind,
    pub clouds: Clouds,
    /// Observation time, unix seconds
    pub dt: i64,
    /// Offset from UTC in seconds
    pub timezone: i64,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub visibility: Option<u32>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct ForecastTemp {
    pub min: f64,
    pub max: f64,
    pub day: f64,
    pub night: f64,
}

/// One calendar day aggregated from 3-hour samples
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct ForecastDay {
    /// Timestamp of the day's first sample
    pub dt: i64,
    /// Local calendar date
    pub date: NaiveDate,
    pub temp: ForecastTemp,
    pub weather: Vec<WeatherCondition>,
    pub humidity: u8,
    pub wind_speed: f64,
    /// Probability of precipitation, 0.0..=1.0
    pub pop: f64,
}

/// One raw 3-hour sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct HourlyForecast {
    pub dt: i64,
    pub temp: i32,
    pub feels_like: i32,
    pub humidity: u8,
    pub weather: Vec<WeatherCondition>,
    pub wind_speed: f64,
    pub pop: f64,
}

/// Geocoding result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct City {
    /// `"{lat},{lon}"`, stable across searches
    pub id: String,
    pub name: String,
    pub country: String,
    pub state: Option<String>,
    pub lat: f64,
    pub lon: f64,
}

impl City {
    pub fn new(name: String, country: String, state: Option<String>, lat: f64, lon: f64) -> Self {
        Self {
            id: format!("{},{}", lat, lon),
            name,
            country,
            state,
            lat,
            lon,
        }
    }
}

/// Snapshot pushed to live subscribers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "graphql", derive(async_graphql::SimpleObject))]
pub struct WeatherUpdate {
    pub lat: f64,
    pub lon: f64,
    pub current: CurrentWeather,
    /// Strictly increasing per subscriber
    pub timestamp: DateTime<Utc>,
}
