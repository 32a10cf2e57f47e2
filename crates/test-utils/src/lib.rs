//! Shared test utilities for the vessel weather workspace.
//!
//! This crate provides common testing infrastructure including:
//! - A manually advanced clock for cache ageing tests
//! - Scripted weather service and recording host sinks
//! - OpenWeather response fixtures
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, ManualClock, ScriptedWeatherService};
//! ```

pub mod clock;
pub mod fakes;
pub mod fixtures;

// Re-export commonly used items at the crate root
pub use clock::ManualClock;
pub use fakes::{
    FakePositionSource, RecordingDeltaSink, RecordingStatusSink, ScriptedWeatherService,
};
pub use fixtures::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use weather_common::{RemoteError, WeatherService};

    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[tokio::test]
    async fn test_scripted_service_replays_then_falls_back() {
        let service = Arc::new(ScriptedWeatherService::new());
        service.push_err(RemoteError::Timeout);

        assert!(service.fetch(positions::OFFSHORE).await.is_err());
        assert!(service.fetch(positions::OFFSHORE).await.is_ok());

        service.fail_by_default();
        assert!(service.fetch(positions::OFFSHORE).await.is_err());
        assert_eq!(service.calls(), 3);
        assert_eq!(service.max_in_flight(), 1);
    }
}
