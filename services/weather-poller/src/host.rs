//! In-process host adapters: position store, delta buffer and status log.

use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

use weather_common::{Delta, DeltaSink, Position, PositionSource, StatusSink};

/// Last position pushed by the host.
#[derive(Debug, Default)]
pub struct SharedPosition {
    current: RwLock<Option<Position>>,
}

impl SharedPosition {
    pub fn new(initial: Option<Position>) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    pub fn set(&self, position: Position) {
        let mut current = self.current.write().unwrap_or_else(|e| e.into_inner());
        *current = Some(position);
    }
}

impl PositionSource for SharedPosition {
    fn current_position(&self) -> Option<Position> {
        *self.current.read().unwrap_or_else(|e| e.into_inner())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaBatch {
    pub published_at: DateTime<Utc>,
    pub updates: Vec<Delta>,
}

/// Keeps the most recent delta batch for the status API.
#[derive(Debug, Default)]
pub struct LatestDeltas {
    latest: RwLock<Option<DeltaBatch>>,
}

impl LatestDeltas {
    pub fn latest(&self) -> Option<DeltaBatch> {
        self.latest.read().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl DeltaSink for LatestDeltas {
    fn publish(&self, deltas: Vec<Delta>) {
        info!(count = deltas.len(), "Publishing weather deltas");
        let batch = DeltaBatch {
            published_at: Utc::now(),
            updates: deltas,
        };
        *self.latest.write().unwrap_or_else(|e| e.into_inner()) = Some(batch);
    }
}

/// Routes host status messages to the log.
#[derive(Debug, Default)]
pub struct LogStatusSink;

impl StatusSink for LogStatusSink {
    fn report_status(&self, message: &str) {
        info!(target: "weather_poller::host", status = %message, "Plugin status");
    }

    fn report_error(&self, message: &str) {
        error!(target: "weather_poller::host", error = %message, "Plugin error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_utils::positions;

    #[test]
    fn test_shared_position_updates() {
        let shared = SharedPosition::default();
        assert_eq!(shared.current_position(), None);

        shared.set(positions::SOLENT);
        assert_eq!(shared.current_position(), Some(positions::SOLENT));
    }

    #[test]
    fn test_latest_deltas_keeps_last_batch() {
        let sink = LatestDeltas::default();
        assert!(sink.latest().is_none());

        sink.publish(vec![Delta::new("environment.outside.temperature", 288.15)]);
        sink.publish(vec![
            Delta::new("environment.outside.temperature", 289.15),
            Delta::new("environment.wind.speedTrue", 4.0),
        ]);

        let latest = sink.latest().unwrap();
        assert_eq!(latest.updates.len(), 2);
        assert_eq!(latest.updates[0].value, 289.15);
    }
}
