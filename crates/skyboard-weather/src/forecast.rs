//! Daily and hourly shaping of the provider's 3-hour forecast samples.
//!
//! The day/night windows and the "middle sample" representative condition are
//! product rules carried over as-is; change them only with product sign-off.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use skyboard_core::WeatherError;

use crate::raw::{conditions, humidity_pct, OwSample};
use crate::types::{ForecastDay, ForecastTemp, HourlyForecast};

/// Maximum number of days returned by [`aggregate_daily`]
pub const MAX_FORECAST_DAYS: usize = 7;
/// Maximum number of samples returned by [`hourly_from_samples`] (~48h)
pub const MAX_HOURLY_SAMPLES: usize = 16;

const DAY_HOURS: std::ops::RangeInclusive<u32> = 12..=15;
const NIGHT_HOURS: std::ops::RangeInclusive<u32> = 0..=3;

fn local_time(dt: i64, tz_offset: i64) -> Result<NaiveDateTime, WeatherError> {
    DateTime::from_timestamp(dt + tz_offset, 0)
        .map(|t| t.naive_utc())
        .ok_or_else(|| WeatherError::InvalidResponse(format!("timestamp out of range: {}", dt)))
}

/// Group samples by local calendar date and reduce each group to one day.
pub(crate) fn aggregate_daily(
    samples: &[OwSample],
    tz_offset: i64,
) -> Result<Vec<ForecastDay>, WeatherError> {
    let mut ordered: Vec<&OwSample> = samples.iter().collect();
    ordered.sort_by_key(|s| s.dt);

    let mut days: Vec<(NaiveDate, Vec<(u32, &OwSample)>)> = Vec::new();
    for sample in ordered {
        let local = local_time(sample.dt, tz_offset)?;
        let date = local.date();
        let entry = (local.hour(), sample);
        match days.last_mut() {
            Some((last, group)) if *last == date => group.push(entry),
            _ => days.push((date, vec![entry])),
        }
    }

    days.into_iter()
        .take(MAX_FORECAST_DAYS)
        .map(|(date, group)| reduce_day(date, &group))
        .collect()
}

fn reduce_day(date: NaiveDate, group: &[(u32, &OwSample)]) -> Result<ForecastDay, WeatherError> {
    let (first, last) = match (group.first(), group.last()) {
        (Some((_, first)), Some((_, last))) => (*first, *last),
        _ => {
            return Err(WeatherError::InvalidResponse(format!(
                "no samples for {}",
                date
            )))
        }
    };

    let day = group
        .iter()
        .find(|(hour, _)| DAY_HOURS.contains(hour))
        .map_or(first.main.temp, |(_, s)| s.main.temp);
    let night = group
        .iter()
        .find(|(hour, _)| NIGHT_HOURS.contains(hour))
        .map_or(last.main.temp, |(_, s)| s.main.temp);

    let min = group
        .iter()
        .map(|(_, s)| s.main.temp_min.min(s.main.temp))
        .fold(f64::INFINITY, f64::min);
    let max = group
        .iter()
        .map(|(_, s)| s.main.temp_max.max(s.main.temp))
        .fold(f64::NEG_INFINITY, f64::max);

    let (_, representative) = group[group.len() / 2];
    let humidity =
        group.iter().map(|(_, s)| s.main.humidity).sum::<f64>() / group.len() as f64;
    let pop = group
        .iter()
        .map(|(_, s)| s.pop.unwrap_or(0.0))
        .fold(0.0, f64::max);

    Ok(ForecastDay {
        dt: first.dt,
        date,
        temp: ForecastTemp {
            min,
            max,
            day,
            night,
        },
        weather: conditions(&representative.weather)?,
        humidity: humidity_pct(humidity),
        wind_speed: first.wind.speed,
        pop,
    })
}

/// Pass samples through unaggregated, with whole-degree temperatures.
pub(crate) fn hourly_from_samples(
    samples: &[OwSample],
) -> Result<Vec<HourlyForecast>, WeatherError> {
    samples
        .iter()
        .take(MAX_HOURLY_SAMPLES)
        .map(|s| {
            Ok(HourlyForecast {
                dt: s.dt,
                temp: s.main.temp.round() as i32,
                feels_like: s.main.feels_like.round() as i32,
                humidity: humidity_pct(s.main.humidity),
                weather: conditions(&s.weather)?,
                wind_speed: s.wind.speed,
                pop: s.pop.unwrap_or(0.0),
            })
        })
        .collect()
}
