//! On-demand weather queries for a given position.

use std::sync::Arc;

use tracing::instrument;

use openweather_client::translate;
use weather_common::{
    ForecastKind, Position, QueryOptions, WeatherRecord, WeatherResult, WeatherWarning,
};

use crate::gateway::FetchGateway;

/// Provider surface used by the host. Reads go through the cache.
#[derive(Clone)]
pub struct WeatherProvider {
    gateway: Arc<FetchGateway>,
}

impl WeatherProvider {
    pub fn new(gateway: Arc<FetchGateway>) -> Self {
        Self { gateway }
    }

    #[instrument(skip(self), fields(position = %position))]
    pub async fn get_observations(
        &self,
        position: Position,
        options: QueryOptions,
    ) -> WeatherResult<Vec<WeatherRecord>> {
        let payload = self.gateway.resolve(position, false).await?;
        Ok(options.truncate(translate::observations(&payload)?))
    }

    #[instrument(skip(self), fields(position = %position))]
    pub async fn get_forecasts(
        &self,
        position: Position,
        kind: ForecastKind,
        options: QueryOptions,
    ) -> WeatherResult<Vec<WeatherRecord>> {
        let payload = self.gateway.resolve(position, false).await?;
        Ok(options.truncate(translate::forecasts(&payload, kind)?))
    }

    #[instrument(skip(self), fields(position = %position))]
    pub async fn get_warnings(&self, position: Position) -> WeatherResult<Vec<WeatherWarning>> {
        let payload = self.gateway.resolve(position, false).await?;
        Ok(translate::warnings(&payload)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_cache::{CacheConfig, GeoCache};
    use test_utils::{positions, ManualClock, ScriptedWeatherService};
    use weather_common::{RecordKind, RemoteError, WeatherError};

    fn provider(service: Arc<ScriptedWeatherService>) -> WeatherProvider {
        let cache = GeoCache::new(
            CacheConfig::new(chrono::Duration::minutes(60)),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        WeatherProvider::new(Arc::new(FetchGateway::new(Arc::new(cache), service)))
    }

    #[tokio::test]
    async fn test_queries_share_one_remote_call() {
        let service = Arc::new(ScriptedWeatherService::new());
        let provider = provider(service.clone());

        let observations = provider
            .get_observations(positions::OFFSHORE, QueryOptions::default())
            .await
            .unwrap();
        let daily = provider
            .get_forecasts(positions::OFFSHORE, ForecastKind::Daily, QueryOptions::default())
            .await
            .unwrap();
        let warnings = provider.get_warnings(positions::OFFSHORE).await.unwrap();

        assert_eq!(observations.len(), 1);
        assert_eq!(daily.len(), 2);
        assert_eq!(warnings.len(), 1);
        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_max_count_keeps_first_entries() {
        let provider = provider(Arc::new(ScriptedWeatherService::new()));

        let hourly = provider
            .get_forecasts(
                positions::OFFSHORE,
                ForecastKind::Point,
                QueryOptions::with_max_count(2),
            )
            .await
            .unwrap();

        assert_eq!(hourly.len(), 2);
        assert!(hourly.iter().all(|r| r.kind == RecordKind::Point));
        assert!(hourly[0].date < hourly[1].date);
    }

    #[tokio::test]
    async fn test_failure_is_generic_fetch_failure() {
        let service = Arc::new(ScriptedWeatherService::new());
        service.push_err(RemoteError::Status(500));
        let provider = provider(service);

        let err = provider
            .get_observations(positions::SYDNEY, QueryOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WeatherError::FetchFailure(_)));
    }
}
