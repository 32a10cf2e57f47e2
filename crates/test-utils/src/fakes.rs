//! In-memory stand-ins for the poller's collaborators.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use weather_common::{
    Delta, DeltaSink, Payload, Position, PositionSource, RemoteError, StatusSink, WeatherService,
};

use crate::fixtures::onecall;

/// Weather service that replays queued responses.
///
/// Once the queue is empty every call returns the fallback response.
/// Tracks call counts and the highest number of concurrent calls seen.
pub struct ScriptedWeatherService {
    queue: Mutex<VecDeque<Result<serde_json::Value, RemoteError>>>,
    fallback_fails: Mutex<bool>,
    positions: Mutex<Vec<Position>>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Option<Duration>,
}

impl ScriptedWeatherService {
    pub fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            fallback_fails: Mutex::new(false),
            positions: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: None,
        }
    }

    /// Every call sleeps for `delay` (tokio time) before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_ok(&self, body: serde_json::Value) {
        self.queue.lock().unwrap().push_back(Ok(body));
    }

    pub fn push_err(&self, err: RemoteError) {
        self.queue.lock().unwrap().push_back(Err(err));
    }

    /// Make the fallback response a transport failure.
    pub fn fail_by_default(&self) {
        *self.fallback_fails.lock().unwrap() = true;
    }

    /// Make the fallback response a success again.
    pub fn succeed_by_default(&self) {
        *self.fallback_fails.lock().unwrap() = false;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn positions(&self) -> Vec<Position> {
        self.positions.lock().unwrap().clone()
    }
}

impl Default for ScriptedWeatherService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WeatherService for ScriptedWeatherService {
    async fn fetch(&self, position: Position) -> Result<Payload, RemoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.positions.lock().unwrap().push(position);
        let now_in_flight = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now_in_flight, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = self.queue.lock().unwrap().pop_front();
        let result = match next {
            Some(result) => result,
            None if *self.fallback_fails.lock().unwrap() => {
                Err(RemoteError::Transport("scripted failure".into()))
            }
            None => Ok(onecall::full_response()),
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(Arc::new)
    }
}

/// Position source whose answer can be changed from the test.
#[derive(Default)]
pub struct FakePositionSource {
    position: Mutex<Option<Position>>,
    calls: AtomicUsize,
}

impl FakePositionSource {
    pub fn new(position: Option<Position>) -> Self {
        Self {
            position: Mutex::new(position),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, position: Option<Position>) {
        *self.position.lock().unwrap() = position;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl PositionSource for FakePositionSource {
    fn current_position(&self) -> Option<Position> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.position.lock().unwrap()
    }
}

/// Delta sink that keeps every published batch.
#[derive(Default)]
pub struct RecordingDeltaSink {
    batches: Mutex<Vec<Vec<Delta>>>,
}

impl RecordingDeltaSink {
    pub fn batches(&self) -> Vec<Vec<Delta>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn count(&self) -> usize {
        self.batches.lock().unwrap().len()
    }
}

impl DeltaSink for RecordingDeltaSink {
    fn publish(&self, deltas: Vec<Delta>) {
        self.batches.lock().unwrap().push(deltas);
    }
}

/// Status sink that keeps every message.
#[derive(Default)]
pub struct RecordingStatusSink {
    statuses: Mutex<Vec<String>>,
    errors: Mutex<Vec<String>>,
}

impl RecordingStatusSink {
    pub fn statuses(&self) -> Vec<String> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<String> {
        self.errors.lock().unwrap().clone()
    }
}

impl StatusSink for RecordingStatusSink {
    fn report_status(&self, message: &str) {
        self.statuses.lock().unwrap().push(message.to_string());
    }

    fn report_error(&self, message: &str) {
        self.errors.lock().unwrap().push(message.to_string());
    }
}
