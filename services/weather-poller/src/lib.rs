//! Vessel weather poller service library.
//!
//! Wires the geospatial cache and the OpenWeather client into a fetch
//! gateway, an autonomous polling scheduler and an HTTP query API.

pub mod config;
pub mod gateway;
pub mod host;
pub mod provider;
pub mod scheduler;
pub mod server;
