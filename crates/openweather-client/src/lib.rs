//! OpenWeather One Call client.
//!
//! [`OpenWeatherClient`] implements [`weather_common::WeatherService`] and
//! returns the raw JSON payload so it can be cached as-is. The [`translate`]
//! module turns a cached payload into observations, forecasts, warnings and
//! host deltas.

pub mod client;
pub mod onecall;
pub mod translate;

pub use client::{ClientConfig, OpenWeatherClient, DEFAULT_BASE_URL};
pub use translate::{TranslateError, TranslateResult};
