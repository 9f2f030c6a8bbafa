//! OpenWeather wire payloads and their conversion into domain types.

use serde::Deserialize;
use skyboard_core::WeatherError;

use crate::types::{City, Clouds, CurrentWeather, WeatherCondition, Wind};

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwCondition {
    pub id: i32,
    pub main: String,
    pub description: String,
    pub icon: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwMain {
    pub temp: f64,
    pub feels_like: f64,
    pub temp_min: f64,
    pub temp_max: f64,
    pub pressure: f64,
    pub humidity: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwWind {
    pub speed: f64,
    pub deg: Option<f64>,
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct OwClouds {
    pub all: u8,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct OwSys {
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwCurrent {
    pub weather: Vec<OwCondition>,
    pub main: OwMain,
    pub wind: OwWind,
    #[serde(default)]
    pub clouds: OwClouds,
    pub dt: i64,
    #[serde(default)]
    pub timezone: i64,
    #[serde(default)]
    pub sys: OwSys,
    pub visibility: Option<u32>,
    pub name: Option<String>,
}

/// One 3-hour entry of `/data/2.5/forecast`
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwSample {
    pub dt: i64,
    pub main: OwMain,
    pub weather: Vec<OwCondition>,
    pub wind: OwWind,
    pub pop: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct OwForecastCity {
    #[serde(default)]
    pub timezone: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwForecast {
    pub list: Vec<OwSample>,
    #[serde(default)]
    pub city: OwForecastCity,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct OwGeoCity {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub country: String,
    pub state: Option<String>,
}

pub(crate) fn conditions(raw: &[OwCondition]) -> Result<Vec<WeatherCondition>, WeatherError> {
    if raw.is_empty() {
        return Err(WeatherError::InvalidResponse(
            "weather condition list is empty".to_string(),
        ));
    }
    Ok(raw
        .iter()
        .map(|c| WeatherCondition {
            id: c.id,
            main: c.main.clone(),
            description: c.description.clone(),
            icon: c.icon.clone(),
        })
        .collect())
}

pub(crate) fn humidity_pct(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

impl OwCurrent {
    pub(crate) fn into_domain(self) -> Result<CurrentWeather, WeatherError> {
        Ok(CurrentWeather {
            temp: self.main.temp,
            feels_like: self.main.feels_like,
            temp_min: self.main.temp_min,
            temp_max: self.main.temp_max,
            pressure: self.main.pressure,
            humidity: humidity_pct(self.main.humidity),
            weather: conditions(&self.weather)?,
            wind: Wind {
                speed: self.wind.speed,
                deg: self.wind.deg,
                gust: self.wind.gust,
            },
            clouds: Clouds {
                all: self.clouds.all,
            },
            dt: self.dt,
            timezone: self.timezone,
            sunrise: self.sys.sunrise,
            sunset: self.sys.sunset,
            visibility: self.visibility,
            name: self.name.filter(|n| !n.is_empty()),
        })
    }
}

impl From<OwGeoCity> for City {
    fn from(raw: OwGeoCity) -> Self {
        City::new(raw.name, raw.country, raw.state, raw.lat, raw.lon)
    }
}
