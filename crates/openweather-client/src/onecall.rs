//! Wire types for the One Call 3.0 response (`units=metric`).
//!
//! Only the fields the translation layer reads are modelled; everything is
//! optional except timestamps because the provider omits fields freely.

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct OneCallResponse {
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub current: Option<PointConditions>,
    #[serde(default)]
    pub hourly: Vec<PointConditions>,
    #[serde(default)]
    pub daily: Vec<DailyConditions>,
    #[serde(default)]
    pub alerts: Vec<Alert>,
}

/// Weather condition code and text.
#[derive(Debug, Clone, Deserialize)]
pub struct Condition {
    pub id: i64,
    pub main: String,
    pub description: String,
}

/// Precipitation volume over the last hour, in mm.
#[derive(Debug, Clone, Deserialize)]
pub struct HourlyVolume {
    #[serde(rename = "1h")]
    pub one_hour: Option<f64>,
}

/// The `current` block and each `hourly` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PointConditions {
    pub dt: i64,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    /// Celsius
    pub temp: Option<f64>,
    pub feels_like: Option<f64>,
    /// hPa
    pub pressure: Option<f64>,
    /// Percent
    pub humidity: Option<f64>,
    pub dew_point: Option<f64>,
    pub uvi: Option<f64>,
    /// Percent
    pub clouds: Option<f64>,
    /// Metres
    pub visibility: Option<f64>,
    /// m/s
    pub wind_speed: Option<f64>,
    /// Degrees
    pub wind_deg: Option<f64>,
    pub wind_gust: Option<f64>,
    /// Probability of precipitation, 0..=1 (hourly only)
    pub pop: Option<f64>,
    #[serde(default)]
    pub weather: Vec<Condition>,
    pub rain: Option<HourlyVolume>,
    pub snow: Option<HourlyVolume>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyTemperature {
    pub day: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyFeelsLike {
    pub day: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyConditions {
    pub dt: i64,
    pub sunrise: Option<i64>,
    pub sunset: Option<i64>,
    pub summary: Option<String>,
    pub temp: Option<DailyTemperature>,
    pub feels_like: Option<DailyFeelsLike>,
    pub pressure: Option<f64>,
    pub humidity: Option<f64>,
    pub dew_point: Option<f64>,
    pub wind_speed: Option<f64>,
    pub wind_deg: Option<f64>,
    pub wind_gust: Option<f64>,
    pub clouds: Option<f64>,
    pub pop: Option<f64>,
    pub uvi: Option<f64>,
    /// Daily totals are plain numbers, not `{"1h": ..}` objects.
    pub rain: Option<f64>,
    pub snow: Option<f64>,
    #[serde(default)]
    pub weather: Vec<Condition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Alert {
    pub sender_name: String,
    pub event: String,
    pub start: i64,
    pub end: i64,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}
