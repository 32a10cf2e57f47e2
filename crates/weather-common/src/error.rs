//! Error types for the vessel weather services.

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using WeatherError.
pub type WeatherResult<T> = Result<T, WeatherError>;

/// Primary error type for weather retrieval and polling.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WeatherError {
    // === Retrieval Errors ===
    /// Remote call failed, timed out, or the provider reported an error.
    #[error("Weather fetch failed: {0}")]
    FetchFailure(String),

    // === Scheduling Errors ===
    #[error("Vessel position not available")]
    NoPositionAvailable,

    /// The periodic wake timer fired far earlier than its interval allows.
    #[error("Wake timer fired {elapsed_ms} ms after the previous wake (floor {floor_ms} ms)")]
    WatchdogTrip { elapsed_ms: u64, floor_ms: u64 },

    #[error("Gave up after {attempts} consecutive fetch failures")]
    RetryBudgetExhausted { attempts: u32 },

    // === Infrastructure Errors ===
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl WeatherError {
    /// Whether the scheduler can keep running after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, WeatherError::WatchdogTrip { .. } | WeatherError::Config(_))
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            WeatherError::FetchFailure(_) => 502,
            WeatherError::NoPositionAvailable | WeatherError::RetryBudgetExhausted { .. } => 503,
            WeatherError::WatchdogTrip { .. } | WeatherError::Config(_) => 500,
        }
    }
}

// Network failures and provider-reported errors collapse into one kind.
impl From<RemoteError> for WeatherError {
    fn from(err: RemoteError) -> Self {
        WeatherError::FetchFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_errors_normalize_to_fetch_failure() {
        let transport: WeatherError = RemoteError::Transport("connection reset".into()).into();
        let application: WeatherError = RemoteError::Application {
            code: 401,
            message: "Invalid API key".into(),
        }
        .into();

        assert!(matches!(transport, WeatherError::FetchFailure(_)));
        assert!(matches!(application, WeatherError::FetchFailure(_)));
        assert_eq!(transport.http_status_code(), 502);
    }

    #[test]
    fn test_only_watchdog_and_config_are_fatal() {
        assert!(WeatherError::WatchdogTrip {
            elapsed_ms: 10,
            floor_ms: 50_000
        }
        .is_fatal());
        assert!(!WeatherError::FetchFailure("x".into()).is_fatal());
        assert!(!WeatherError::NoPositionAvailable.is_fatal());
        assert!(!WeatherError::RetryBudgetExhausted { attempts: 3 }.is_fatal());
    }
}
