//! Provider-independent weather records.
//!
//! All quantities are SI: temperatures in Kelvin, pressure in Pascal,
//! humidity and cloud cover as ratios (0..=1), speeds in m/s, directions in
//! radians, distances in metres and precipitation volume in millimetres.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::WeatherError;

/// What a [`WeatherRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Observation,
    Daily,
    Point,
}

/// Forecast granularity requested by on-demand callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastKind {
    /// One entry per day.
    Daily,
    /// One entry per hour.
    Point,
}

impl ForecastKind {
    pub fn record_kind(self) -> RecordKind {
        match self {
            ForecastKind::Daily => RecordKind::Daily,
            ForecastKind::Point => RecordKind::Point,
        }
    }
}

impl FromStr for ForecastKind {
    type Err = WeatherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(ForecastKind::Daily),
            "point" => Ok(ForecastKind::Point),
            other => Err(WeatherError::Config(format!(
                "unknown forecast kind '{}', expected 'daily' or 'point'",
                other
            ))),
        }
    }
}

/// Precipitation type inferred from provider volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrecipitationType {
    Rain,
    Snow,
}

impl PrecipitationType {
    /// Rain wins when both volumes are reported.
    pub fn infer(rain: Option<f64>, snow: Option<f64>) -> Option<Self> {
        match (rain, snow) {
            (Some(_), _) => Some(PrecipitationType::Rain),
            (None, Some(_)) => Some(PrecipitationType::Snow),
            (None, None) => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PrecipitationType::Rain => "rain",
            PrecipitationType::Snow => "snow",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutsideConditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feels_like_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dew_point_temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pressure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relative_humidity: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uv_index: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_cover: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub horizontal_visibility: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation_volume: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation_probability: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precipitation_type: Option<PrecipitationType>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WindConditions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed_true: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub direction_true: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gust: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SunTimes {
    pub sunrise: DateTime<Utc>,
    pub sunset: DateTime<Utc>,
}

/// An observation or a single forecast entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    pub date: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: RecordKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub outside: OutsideConditions,
    pub wind: WindConditions,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sun: Option<SunTimes>,
}

/// A weather warning issued for the area.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherWarning {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    pub details: String,
    pub source: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Options accepted by the on-demand query surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryOptions {
    #[serde(default)]
    pub max_count: Option<usize>,
}

impl QueryOptions {
    pub fn with_max_count(max_count: usize) -> Self {
        Self {
            max_count: Some(max_count),
        }
    }

    /// Keep the first `max_count` entries, if a limit is set.
    pub fn truncate<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if let Some(max) = self.max_count {
            items.truncate(max);
        }
        items
    }
}
