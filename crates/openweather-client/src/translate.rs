//! Translation from One Call payloads to provider-independent records.
//!
//! Pure functions over the cached JSON. Units are converted from the metric
//! request (Celsius, hPa, percent, degrees) to SI.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;

use weather_common::{
    Delta, ForecastKind, OutsideConditions, Position, PrecipitationType, RecordKind, SunTimes,
    WeatherError, WeatherRecord, WeatherWarning, WindConditions,
};

use crate::onecall::{DailyConditions, OneCallResponse, PointConditions};

const KELVIN_OFFSET: f64 = 273.15;

#[derive(Debug, Error)]
pub enum TranslateError {
    #[error("payload does not match the One Call schema: {0}")]
    Schema(String),

    #[error("timestamp {0} is out of range")]
    Timestamp(i64),
}

impl From<TranslateError> for WeatherError {
    fn from(err: TranslateError) -> Self {
        WeatherError::FetchFailure(err.to_string())
    }
}

pub type TranslateResult<T> = Result<T, TranslateError>;

pub fn parse(payload: &Value) -> TranslateResult<OneCallResponse> {
    OneCallResponse::deserialize(payload).map_err(|e| TranslateError::Schema(e.to_string()))
}

/// Current conditions as a single-entry list (empty when the provider omitted them).
pub fn observations(payload: &Value) -> TranslateResult<Vec<WeatherRecord>> {
    let response = parse(payload)?;
    response
        .current
        .as_ref()
        .map(|current| point_record(current, RecordKind::Observation))
        .into_iter()
        .collect()
}

/// Forecast entries in provider order.
pub fn forecasts(payload: &Value, kind: ForecastKind) -> TranslateResult<Vec<WeatherRecord>> {
    let response = parse(payload)?;
    match kind {
        ForecastKind::Daily => response.daily.iter().map(daily_record).collect(),
        ForecastKind::Point => response
            .hourly
            .iter()
            .map(|hour| point_record(hour, RecordKind::Point))
            .collect(),
    }
}

pub fn warnings(payload: &Value) -> TranslateResult<Vec<WeatherWarning>> {
    let response = parse(payload)?;
    response
        .alerts
        .iter()
        .map(|alert| {
            Ok(WeatherWarning {
                start_time: timestamp(alert.start)?,
                end_time: timestamp(alert.end)?,
                details: alert.description.clone(),
                source: alert.sender_name.clone(),
                kind: alert.event.clone(),
            })
        })
        .collect()
}

/// Flatten the current observation into host deltas.
///
/// Always carries the originating position and fetch time; observation fields
/// the provider omitted are left out.
pub fn observation_deltas(
    position: Position,
    payload: &Value,
    fetched_at: DateTime<Utc>,
) -> TranslateResult<Vec<Delta>> {
    let mut deltas = vec![
        Delta::new(
            "navigation.position",
            json!({ "latitude": position.latitude, "longitude": position.longitude }),
        ),
        Delta::new("environment.weather.fetchedAt", fetched_at.to_rfc3339()),
    ];

    let Some(record) = observations(payload)?.into_iter().next() else {
        return Ok(deltas);
    };

    deltas.push(Delta::new(
        "environment.weather.observedAt",
        record.date.to_rfc3339(),
    ));
    if let Some(description) = &record.description {
        deltas.push(Delta::new(
            "environment.weather.description",
            description.as_str(),
        ));
    }

    let outside = &record.outside;
    let numeric = [
        ("environment.outside.temperature", outside.temperature),
        (
            "environment.outside.feelsLikeTemperature",
            outside.feels_like_temperature,
        ),
        (
            "environment.outside.dewPointTemperature",
            outside.dew_point_temperature,
        ),
        ("environment.outside.pressure", outside.pressure),
        ("environment.outside.relativeHumidity", outside.relative_humidity),
        ("environment.outside.uvIndex", outside.uv_index),
        ("environment.outside.cloudCover", outside.cloud_cover),
        (
            "environment.outside.horizontalVisibility",
            outside.horizontal_visibility,
        ),
        (
            "environment.outside.precipitationVolume",
            outside.precipitation_volume,
        ),
        ("environment.wind.speedTrue", record.wind.speed_true),
        ("environment.wind.directionTrue", record.wind.direction_true),
        ("environment.wind.gust", record.wind.gust),
    ];
    deltas.extend(
        numeric
            .into_iter()
            .filter_map(|(path, value)| value.map(|v| Delta::new(path, v))),
    );

    if let Some(kind) = outside.precipitation_type {
        deltas.push(Delta::new(
            "environment.outside.precipitationType",
            kind.as_str(),
        ));
    }
    if let Some(sun) = &record.sun {
        deltas.push(Delta::new("environment.sun.sunrise", sun.sunrise.to_rfc3339()));
        deltas.push(Delta::new("environment.sun.sunset", sun.sunset.to_rfc3339()));
    }

    Ok(deltas)
}

fn point_record(point: &PointConditions, kind: RecordKind) -> TranslateResult<WeatherRecord> {
    let rain = point.rain.as_ref().and_then(|v| v.one_hour);
    let snow = point.snow.as_ref().and_then(|v| v.one_hour);

    Ok(WeatherRecord {
        date: timestamp(point.dt)?,
        kind,
        description: point.weather.first().map(|c| c.description.clone()),
        outside: OutsideConditions {
            temperature: point.temp.map(kelvin),
            feels_like_temperature: point.feels_like.map(kelvin),
            dew_point_temperature: point.dew_point.map(kelvin),
            pressure: point.pressure.map(pascal),
            relative_humidity: point.humidity.map(ratio),
            uv_index: point.uvi,
            cloud_cover: point.clouds.map(ratio),
            horizontal_visibility: point.visibility,
            precipitation_volume: rain.or(snow),
            precipitation_probability: point.pop,
            precipitation_type: PrecipitationType::infer(rain, snow),
            ..Default::default()
        },
        wind: wind(point.wind_speed, point.wind_deg, point.wind_gust),
        sun: sun_times(point.sunrise, point.sunset)?,
    })
}

fn daily_record(day: &DailyConditions) -> TranslateResult<WeatherRecord> {
    let temp = day.temp.as_ref();

    Ok(WeatherRecord {
        date: timestamp(day.dt)?,
        kind: RecordKind::Daily,
        description: day
            .summary
            .clone()
            .or_else(|| day.weather.first().map(|c| c.description.clone())),
        outside: OutsideConditions {
            temperature: temp.and_then(|t| t.day).map(kelvin),
            min_temperature: temp.and_then(|t| t.min).map(kelvin),
            max_temperature: temp.and_then(|t| t.max).map(kelvin),
            feels_like_temperature: day.feels_like.as_ref().and_then(|f| f.day).map(kelvin),
            dew_point_temperature: day.dew_point.map(kelvin),
            pressure: day.pressure.map(pascal),
            relative_humidity: day.humidity.map(ratio),
            uv_index: day.uvi,
            cloud_cover: day.clouds.map(ratio),
            horizontal_visibility: None,
            precipitation_volume: day.rain.or(day.snow),
            precipitation_probability: day.pop,
            precipitation_type: PrecipitationType::infer(day.rain, day.snow),
        },
        wind: wind(day.wind_speed, day.wind_deg, day.wind_gust),
        sun: sun_times(day.sunrise, day.sunset)?,
    })
}

fn wind(speed: Option<f64>, direction: Option<f64>, gust: Option<f64>) -> WindConditions {
    WindConditions {
        speed_true: speed,
        direction_true: direction.map(f64::to_radians),
        gust,
    }
}

fn sun_times(sunrise: Option<i64>, sunset: Option<i64>) -> TranslateResult<Option<SunTimes>> {
    match (sunrise, sunset) {
        (Some(rise), Some(set)) => Ok(Some(SunTimes {
            sunrise: timestamp(rise)?,
            sunset: timestamp(set)?,
        })),
        _ => Ok(None),
    }
}

fn timestamp(secs: i64) -> TranslateResult<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(TranslateError::Timestamp(secs))
}

fn kelvin(celsius: f64) -> f64 {
    celsius + KELVIN_OFFSET
}

fn pascal(hectopascal: f64) -> f64 {
    hectopascal * 100.0
}

fn ratio(percent: f64) -> f64 {
    percent / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::assert_approx_eq;
    use test_utils::fixtures::{onecall, positions};

    fn find<'a>(deltas: &'a [Delta], path: &str) -> Option<&'a Value> {
        deltas.iter().find(|d| d.path == path).map(|d| &d.value)
    }

    #[test]
    fn test_observation_converts_to_si() {
        let records = observations(&onecall::full_response()).unwrap();
        assert_eq!(records.len(), 1);

        let obs = &records[0];
        assert_eq!(obs.kind, RecordKind::Observation);
        assert_eq!(obs.date.timestamp(), onecall::CURRENT_DT);
        assert_eq!(obs.description.as_deref(), Some("light rain"));
        assert_approx_eq!(obs.outside.temperature.unwrap(), 288.15, 1e-9);
        assert_approx_eq!(obs.outside.pressure.unwrap(), 101_300.0, 1e-9);
        assert_approx_eq!(obs.outside.relative_humidity.unwrap(), 0.82, 1e-9);
        assert_approx_eq!(obs.outside.cloud_cover.unwrap(), 0.75, 1e-9);
        assert_approx_eq!(obs.wind.direction_true.unwrap(), std::f64::consts::PI, 1e-9);
        assert!(obs.sun.is_some());
    }

    #[test]
    fn test_rain_wins_over_snow() {
        let obs = observations(&onecall::full_response()).unwrap().remove(0);
        assert_eq!(obs.outside.precipitation_type, Some(PrecipitationType::Rain));
        assert_approx_eq!(obs.outside.precipitation_volume.unwrap(), 0.4, 1e-9);
    }

    #[test]
    fn test_point_forecasts_in_provider_order() {
        let hours = forecasts(&onecall::full_response(), ForecastKind::Point).unwrap();
        assert_eq!(hours.len(), 3);
        assert!(hours.iter().all(|h| h.kind == RecordKind::Point));
        assert!(hours.windows(2).all(|w| w[0].date < w[1].date));

        assert_eq!(hours[1].outside.precipitation_type, None);
        assert_eq!(hours[2].outside.precipitation_type, Some(PrecipitationType::Snow));
        assert_approx_eq!(hours[2].outside.temperature.unwrap(), 272.15, 1e-9);
    }

    #[test]
    fn test_daily_forecast_fields() {
        let days = forecasts(&onecall::full_response(), ForecastKind::Daily).unwrap();
        assert_eq!(days.len(), 2);

        let first = &days[0];
        assert_eq!(first.kind, RecordKind::Daily);
        assert_eq!(first.description.as_deref(), Some("Expect a day of rain"));
        assert_approx_eq!(first.outside.min_temperature.unwrap(), 284.15, 1e-9);
        assert_approx_eq!(first.outside.max_temperature.unwrap(), 291.65, 1e-9);
        assert_approx_eq!(first.outside.precipitation_volume.unwrap(), 4.2, 1e-9);
        assert_eq!(first.outside.precipitation_type, Some(PrecipitationType::Rain));

        assert_eq!(days[1].description.as_deref(), Some("clear sky"));
        assert_eq!(days[1].outside.precipitation_type, None);
    }

    #[test]
    fn test_warnings() {
        let warnings = warnings(&onecall::full_response()).unwrap();
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].kind, "Gale Warning");
        assert_eq!(warnings[0].source, "Met Service");
        assert!(warnings[0].start_time < warnings[0].end_time);

        assert!(super::warnings(&onecall::minimal_response())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_minimal_response_has_no_forecasts() {
        let payload = onecall::minimal_response();
        assert_eq!(observations(&payload).unwrap().len(), 1);
        assert!(forecasts(&payload, ForecastKind::Daily).unwrap().is_empty());
        assert!(forecasts(&payload, ForecastKind::Point).unwrap().is_empty());
    }

    #[test]
    fn test_schema_mismatch_is_error() {
        let err = observations(&serde_json::json!({ "lat": "north" })).unwrap_err();
        assert!(matches!(err, TranslateError::Schema(_)));

        let weather: WeatherError = err.into();
        assert!(matches!(weather, WeatherError::FetchFailure(_)));
    }

    #[test]
    fn test_observation_deltas() {
        let fetched_at = Utc.timestamp_opt(onecall::CURRENT_DT + 5, 0).unwrap();
        let deltas =
            observation_deltas(positions::OFFSHORE, &onecall::full_response(), fetched_at)
                .unwrap();

        let position = find(&deltas, "navigation.position").unwrap();
        assert_eq!(position["latitude"], 10.0);
        assert_eq!(position["longitude"], 20.0);
        assert_eq!(
            find(&deltas, "environment.weather.fetchedAt").unwrap(),
            &Value::from(fetched_at.to_rfc3339())
        );
        assert_approx_eq!(
            find(&deltas, "environment.outside.temperature")
                .and_then(Value::as_f64)
                .unwrap(),
            288.15,
            1e-9
        );
        assert_eq!(
            find(&deltas, "environment.outside.precipitationType").unwrap(),
            "rain"
        );
        assert!(find(&deltas, "environment.sun.sunrise").is_some());
        assert!(find(&deltas, "environment.wind.gust").is_some());
    }

    #[test]
    fn test_deltas_skip_missing_fields() {
        let fetched_at = Utc.timestamp_opt(onecall::CURRENT_DT, 0).unwrap();
        let deltas =
            observation_deltas(positions::OFFSHORE, &onecall::minimal_response(), fetched_at)
                .unwrap();

        assert!(find(&deltas, "environment.outside.temperature").is_some());
        assert!(find(&deltas, "environment.wind.gust").is_none());
        assert!(find(&deltas, "environment.outside.precipitationType").is_none());
        assert!(find(&deltas, "environment.sun.sunrise").is_none());
        assert!(find(&deltas, "environment.weather.description").is_none());
    }
}
