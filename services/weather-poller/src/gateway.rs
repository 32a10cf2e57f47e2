//! Cache-or-fetch funnel shared by the scheduler and on-demand queries.

use std::sync::Arc;

use tracing::{debug, instrument, warn};

use geo_cache::GeoCache;
use weather_common::{Payload, Position, WeatherError, WeatherResult, WeatherService};

pub struct FetchGateway {
    cache: Arc<GeoCache>,
    service: Arc<dyn WeatherService>,
}

impl FetchGateway {
    pub fn new(cache: Arc<GeoCache>, service: Arc<dyn WeatherService>) -> Self {
        Self { cache, service }
    }

    pub fn cache(&self) -> &Arc<GeoCache> {
        &self.cache
    }

    /// Return the payload covering `position`.
    ///
    /// With `bypass_cache` the remote service is always called. Every
    /// successful remote call refreshes the cache entry for the cell.
    #[instrument(skip(self), fields(position = %position))]
    pub async fn resolve(&self, position: Position, bypass_cache: bool) -> WeatherResult<Payload> {
        if !position.is_valid() {
            return Err(WeatherError::FetchFailure(format!(
                "invalid position {}",
                position
            )));
        }

        if !bypass_cache {
            if let Some(entry) = self.cache.lookup(&position).await {
                debug!(cell = %entry.key(), fetched_at = %entry.fetched_at(), "Serving cached payload");
                return Ok(self.cache.get(&entry));
            }
        }

        let payload = self.service.fetch(position).await.map_err(|e| {
            warn!(error = %e, "Remote weather fetch failed");
            WeatherError::from(e)
        })?;

        let entry = self.cache.put(&position, payload.clone()).await;
        debug!(cell = %entry.key(), "Cached fresh payload");
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_cache::CacheConfig;
    use test_utils::{onecall, positions, ManualClock, ScriptedWeatherService};
    use weather_common::RemoteError;

    fn gateway(
        service: Arc<ScriptedWeatherService>,
        max_age: chrono::Duration,
    ) -> (FetchGateway, ManualClock) {
        let clock = ManualClock::default();
        let cache = GeoCache::new(CacheConfig::new(max_age), Arc::new(clock.clone())).unwrap();
        (FetchGateway::new(Arc::new(cache), service), clock)
    }

    #[tokio::test]
    async fn test_miss_fetches_and_caches() {
        let service = Arc::new(ScriptedWeatherService::new());
        let (gw, _) = gateway(service.clone(), chrono::Duration::minutes(30));

        gw.resolve(positions::OFFSHORE, false).await.unwrap();
        gw.resolve(positions::OFFSHORE, false).await.unwrap();

        assert_eq!(service.calls(), 1);
        assert_eq!(gw.cache().len().await, 1);
    }

    #[tokio::test]
    async fn test_bypass_always_fetches_and_refreshes() {
        let service = Arc::new(ScriptedWeatherService::new());
        let (gw, clock) = gateway(service.clone(), chrono::Duration::minutes(30));

        gw.resolve(positions::OFFSHORE, false).await.unwrap();
        clock.advance(chrono::Duration::minutes(20));

        service.push_ok(onecall::minimal_response());
        let payload = gw.resolve(positions::OFFSHORE, true).await.unwrap();
        assert_eq!(service.calls(), 2);
        assert!(payload.get("hourly").is_none());

        // The refreshed entry is stamped now, so it outlives the original.
        clock.advance(chrono::Duration::minutes(20));
        let cached = gw.resolve(positions::OFFSHORE, false).await.unwrap();
        assert_eq!(service.calls(), 2);
        assert!(cached.get("hourly").is_none());
    }

    #[tokio::test]
    async fn test_stale_entry_refetched() {
        let service = Arc::new(ScriptedWeatherService::new());
        let (gw, clock) = gateway(service.clone(), chrono::Duration::minutes(30));

        gw.resolve(positions::OFFSHORE, false).await.unwrap();
        clock.advance(chrono::Duration::minutes(30));
        gw.resolve(positions::OFFSHORE, false).await.unwrap();

        assert_eq!(service.calls(), 2);
    }

    #[tokio::test]
    async fn test_nearby_position_shares_cell() {
        let service = Arc::new(ScriptedWeatherService::new());
        let (gw, _) = gateway(service.clone(), chrono::Duration::minutes(30));

        gw.resolve(positions::OFFSHORE, false).await.unwrap();
        gw.resolve(Position::new(10.001, 20.001), false).await.unwrap();

        assert_eq!(service.calls(), 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_cache_untouched() {
        let service = Arc::new(ScriptedWeatherService::new());
        service.push_err(RemoteError::Application {
            code: 401,
            message: "Invalid API key".into(),
        });
        let (gw, _) = gateway(service.clone(), chrono::Duration::minutes(30));

        let err = gw.resolve(positions::OFFSHORE, true).await.unwrap_err();
        assert!(matches!(err, WeatherError::FetchFailure(_)));
        assert!(gw.cache().is_empty().await);
    }

    #[tokio::test]
    async fn test_invalid_position_rejected_without_remote_call() {
        let service = Arc::new(ScriptedWeatherService::new());
        let (gw, _) = gateway(service.clone(), chrono::Duration::minutes(30));

        assert!(gw.resolve(Position::new(f64::NAN, 0.0), false).await.is_err());
        assert_eq!(service.calls(), 0);
    }

    #[tokio::test]
    async fn test_zero_max_age_always_fetches() {
        let service = Arc::new(ScriptedWeatherService::new());
        let (gw, _) = gateway(service.clone(), chrono::Duration::zero());

        gw.resolve(positions::OFFSHORE, false).await.unwrap();
        gw.resolve(positions::OFFSHORE, false).await.unwrap();

        assert_eq!(service.calls(), 2);
    }
}
