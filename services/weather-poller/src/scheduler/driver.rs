//! Async driver for [`SchedulerMachine`].
//!
//! One control loop task per running scheduler. The loop owns the machine and
//! every timer; fetches run as spawned tasks and report back over a channel.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use openweather_client::translate;
use weather_common::{
    DeltaSink, Payload, Position, PositionSource, StatusSink, WeatherError, WeatherResult,
};

use super::machine::{
    Directive, Phase, RetryKind, SchedulerConfig, SchedulerMachine, WakeSource,
};
use crate::gateway::FetchGateway;

/// Snapshot published after every event the loop handles.
#[derive(Debug, Clone, Serialize)]
pub struct SchedulerStatus {
    pub phase: Phase,
    pub fetch_in_flight: bool,
    pub wake_timer_armed: bool,
    pub consecutive_fetch_errors: u32,
    pub consecutive_no_position_retries: u32,
    pub last_fetch: Option<DateTime<Utc>>,
    pub last_position: Option<Position>,
    pub last_status: Option<String>,
    pub last_error: Option<String>,
    pub polls_succeeded: u64,
    pub polls_failed: u64,
}

impl Default for SchedulerStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            fetch_in_flight: false,
            wake_timer_armed: false,
            consecutive_fetch_errors: 0,
            consecutive_no_position_retries: 0,
            last_fetch: None,
            last_position: None,
            last_status: None,
            last_error: None,
            polls_succeeded: 0,
            polls_failed: 0,
        }
    }
}

/// Collaborators shared by every run of a [`Poller`].
#[derive(Clone)]
pub struct PollerContext {
    pub gateway: Arc<FetchGateway>,
    pub positions: Arc<dyn PositionSource>,
    pub deltas: Arc<dyn DeltaSink>,
    pub status: Arc<dyn StatusSink>,
}

struct RunHandle {
    cancel: CancellationToken,
    wake_tx: mpsc::Sender<WakeSource>,
    task: JoinHandle<()>,
}

/// Handle to the polling scheduler. Start and stop may be called repeatedly.
pub struct Poller {
    context: PollerContext,
    config: SchedulerConfig,
    run: Mutex<Option<RunHandle>>,
    status_tx: watch::Sender<SchedulerStatus>,
}

impl Poller {
    /// The gateway's cache must use the fetch interval as its max age.
    pub fn new(context: PollerContext, config: SchedulerConfig) -> WeatherResult<Self> {
        config.validate()?;
        let max_age = context.gateway.cache().max_age();
        if max_age.to_std().ok() != Some(config.fetch_interval) {
            return Err(WeatherError::Config(format!(
                "cache max age {}s does not match fetch interval {}s",
                max_age.num_seconds(),
                config.fetch_interval.as_secs()
            )));
        }
        let (status_tx, _) = watch::channel(SchedulerStatus::default());
        Ok(Self {
            context,
            config,
            run: Mutex::new(None),
            status_tx,
        })
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Spawn the control loop. Returns `false` if it is already running.
    pub async fn start(&self) -> bool {
        let mut run = self.run.lock().await;
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("Poller already running");
            return false;
        }

        let cancel = CancellationToken::new();
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let control = ControlLoop::new(
            self.context.clone(),
            self.config.clone(),
            cancel.clone(),
            wake_rx,
            self.status_tx.clone(),
        );
        let task = tokio::spawn(control.run());

        info!(
            fetch_interval_secs = self.config.fetch_interval.as_secs(),
            wake_interval_secs = self.config.wake_interval.as_secs(),
            "Poller started"
        );
        *run = Some(RunHandle {
            cancel,
            wake_tx,
            task,
        });
        true
    }

    /// Cancel the control loop and wait for it to exit.
    pub async fn stop(&self) -> bool {
        let Some(handle) = self.run.lock().await.take() else {
            return false;
        };
        handle.cancel.cancel();
        if let Err(e) = handle.task.await {
            error!(error = %e, "Poller task ended abnormally");
        }
        info!("Poller stopped");
        true
    }

    /// Ask a running loop to re-evaluate now. Coalesces with a pending wake.
    pub async fn wake(&self) {
        self.send_wake(WakeSource::External).await;
    }

    async fn send_wake(&self, source: WakeSource) {
        if let Some(handle) = self.run.lock().await.as_ref() {
            let _ = handle.wake_tx.try_send(source);
        }
    }

    pub async fn is_running(&self) -> bool {
        self.run
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    pub fn status(&self) -> SchedulerStatus {
        self.status_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerStatus> {
        self.status_tx.subscribe()
    }
}

struct FetchOutcome {
    position: Position,
    result: WeatherResult<Payload>,
}

enum Flow {
    Continue,
    Halt,
}

struct ControlLoop {
    context: PollerContext,
    machine: SchedulerMachine,
    cancel: CancellationToken,
    wake_rx: mpsc::Receiver<WakeSource>,
    result_tx: mpsc::Sender<FetchOutcome>,
    result_rx: mpsc::Receiver<FetchOutcome>,
    wake_timer: Option<Interval>,
    fetch_retry: Option<Pin<Box<Sleep>>>,
    no_position_retry: Option<Pin<Box<Sleep>>>,
    status_tx: watch::Sender<SchedulerStatus>,
    status: SchedulerStatus,
}

impl ControlLoop {
    fn new(
        context: PollerContext,
        config: SchedulerConfig,
        cancel: CancellationToken,
        wake_rx: mpsc::Receiver<WakeSource>,
        status_tx: watch::Sender<SchedulerStatus>,
    ) -> Self {
        let (result_tx, result_rx) = mpsc::channel(1);
        // Poll totals survive restarts.
        let (polls_succeeded, polls_failed) = {
            let previous = status_tx.borrow();
            (previous.polls_succeeded, previous.polls_failed)
        };
        let status = SchedulerStatus {
            polls_succeeded,
            polls_failed,
            ..Default::default()
        };
        Self {
            context,
            machine: SchedulerMachine::new(config),
            cancel,
            wake_rx,
            result_tx,
            result_rx,
            wake_timer: None,
            fetch_retry: None,
            no_position_retry: None,
            status_tx,
            status,
        }
    }

    async fn run(mut self) {
        let position = self.context.positions.current_position();
        let directives = self.machine.start(Instant::now(), position);
        if let Flow::Halt = self.apply(directives) {
            return;
        }

        loop {
            let directives = tokio::select! {
                biased;

                _ = self.cancel.cancelled() => self.machine.stop(),
                Some(outcome) = self.result_rx.recv() => self.complete(outcome),
                _ = next_tick(&mut self.wake_timer) => self.wake(WakeSource::Periodic),
                _ = fire(&mut self.fetch_retry) => {
                    self.fetch_retry = None;
                    self.wake(WakeSource::Retry(RetryKind::Fetch))
                }
                _ = fire(&mut self.no_position_retry) => {
                    self.no_position_retry = None;
                    self.wake(WakeSource::Retry(RetryKind::NoPosition))
                }
                Some(source) = self.wake_rx.recv() => self.wake(source),
            };

            if let Flow::Halt = self.apply(directives) {
                break;
            }
            if self.cancel.is_cancelled() && !self.machine.is_running() {
                break;
            }
        }
    }

    fn wake(&mut self, source: WakeSource) -> Vec<Directive> {
        let position = self.context.positions.current_position();
        debug!(?source, has_position = position.is_some(), "Scheduler wake");
        self.machine.wake(Instant::now(), source, position)
    }

    fn complete(&mut self, outcome: FetchOutcome) -> Vec<Directive> {
        let now = Instant::now();
        let fetched_at = Utc::now();

        let result = outcome.result.and_then(|payload| {
            translate::observation_deltas(outcome.position, &payload, fetched_at)
                .map_err(WeatherError::from)
        });

        match result {
            Ok(deltas) => {
                counter!("weather_poll_success_total").increment(1);
                self.status.polls_succeeded += 1;
                self.status.last_fetch = Some(fetched_at);
                self.status.last_position = Some(outcome.position);
                info!(position = %outcome.position, deltas = deltas.len(), "Poll succeeded");
                self.machine.fetch_succeeded(now, deltas)
            }
            Err(e) => {
                self.status.polls_failed += 1;
                warn!(position = %outcome.position, error = %e, "Poll failed");
                self.machine.fetch_failed(now, e)
            }
        }
    }

    fn apply(&mut self, directives: Vec<Directive>) -> Flow {
        let mut flow = Flow::Continue;

        for directive in directives {
            match directive {
                Directive::Fetch(position) => self.spawn_fetch(position),
                Directive::ScheduleRetry { kind, after } => {
                    debug!(?kind, after_secs = after.as_secs(), "Retry scheduled");
                    *self.retry_slot(kind) = Some(Box::pin(sleep(after)));
                }
                Directive::CancelRetry(kind) => *self.retry_slot(kind) = None,
                Directive::ArmWakeTimer => {
                    let period = self.machine.config().wake_interval;
                    let mut timer = interval_at(Instant::now() + period, period);
                    timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    self.wake_timer = Some(timer);
                }
                Directive::Publish(deltas) => self.context.deltas.publish(deltas),
                Directive::Status(message) => {
                    info!(status = %message, "Scheduler status");
                    self.context.status.report_status(&message);
                    self.status.last_status = Some(message);
                }
                Directive::Error(err) => self.report_error(err),
                Directive::Halt => {
                    self.wake_timer = None;
                    self.fetch_retry = None;
                    self.no_position_retry = None;
                    flow = Flow::Halt;
                }
            }
        }

        self.publish_status();
        flow
    }

    fn retry_slot(&mut self, kind: RetryKind) -> &mut Option<Pin<Box<Sleep>>> {
        match kind {
            RetryKind::Fetch => &mut self.fetch_retry,
            RetryKind::NoPosition => &mut self.no_position_retry,
        }
    }

    fn spawn_fetch(&self, position: Position) {
        let gateway = self.context.gateway.clone();
        let tx = self.result_tx.clone();
        tokio::spawn(async move {
            let result = gateway.resolve(position, true).await;
            // The loop may be gone after a stop; the result is then dropped.
            let _ = tx.send(FetchOutcome { position, result }).await;
        });
    }

    fn report_error(&mut self, err: WeatherError) {
        let message = err.to_string();
        match &err {
            WeatherError::WatchdogTrip { .. } => {
                counter!("weather_watchdog_trips_total").increment(1);
                error!(error = %message, "Watchdog tripped, halting scheduler");
            }
            e if e.is_fatal() => error!(error = %message, "Scheduler error"),
            _ => warn!(error = %message, "Scheduler error"),
        }
        self.context.status.report_error(&message);
        self.status.last_error = Some(message);
    }

    fn publish_status(&mut self) {
        let state = self.machine.state();
        self.status.phase = state.phase;
        self.status.fetch_in_flight = state.fetch_in_flight;
        self.status.wake_timer_armed = state.wake_timer_armed;
        self.status.consecutive_fetch_errors = state.consecutive_fetch_errors;
        self.status.consecutive_no_position_retries = state.consecutive_no_position_retries;
        self.status_tx.send_replace(self.status.clone());
    }
}

async fn next_tick(timer: &mut Option<Interval>) -> Instant {
    match timer {
        Some(timer) => timer.tick().await,
        None => pending().await,
    }
}

async fn fire(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use geo_cache::{CacheConfig, GeoCache};
    use test_utils::{
        positions, FakePositionSource, ManualClock, RecordingDeltaSink, RecordingStatusSink,
        ScriptedWeatherService,
    };
    use weather_common::RemoteError;

    const HOUR: Duration = Duration::from_secs(3600);

    struct Harness {
        poller: Poller,
        service: Arc<ScriptedWeatherService>,
        positions: Arc<FakePositionSource>,
        deltas: Arc<RecordingDeltaSink>,
        status: Arc<RecordingStatusSink>,
    }

    fn harness(service: ScriptedWeatherService, position: Option<Position>) -> Harness {
        let service = Arc::new(service);
        let positions = Arc::new(FakePositionSource::new(position));
        let deltas = Arc::new(RecordingDeltaSink::default());
        let status = Arc::new(RecordingStatusSink::default());

        let cache = GeoCache::new(
            CacheConfig::new(chrono::Duration::hours(1)),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        let gateway = Arc::new(FetchGateway::new(Arc::new(cache), service.clone()));

        let poller = Poller::new(
            PollerContext {
                gateway,
                positions: positions.clone(),
                deltas: deltas.clone(),
                status: status.clone(),
            },
            SchedulerConfig::new(HOUR),
        )
        .unwrap();

        Harness {
            poller,
            service,
            positions,
            deltas,
            status,
        }
    }

    /// Let spawned tasks and the control loop drain without moving time.
    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_poll_publishes_and_arms_wake() {
        let h = harness(ScriptedWeatherService::new(), Some(positions::OFFSHORE));

        assert!(h.poller.start().await);
        settle().await;

        assert_eq!(h.service.calls(), 1);
        let batches = h.deltas.batches();
        assert_eq!(batches.len(), 1);
        assert!(batches[0].iter().any(|d| d.path == "navigation.position"));
        assert_eq!(h.status.statuses(), vec!["Started".to_string()]);

        let status = h.poller.status();
        assert_eq!(status.phase, Phase::Sleeping);
        assert!(status.wake_timer_armed);
        assert_eq!(status.polls_succeeded, 1);
        assert_eq!(status.last_position, Some(positions::OFFSHORE));

        h.poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_wakes_refetch_after_fetch_interval() {
        let h = harness(ScriptedWeatherService::new(), Some(positions::OFFSHORE));
        h.poller.start().await;
        settle().await;

        tokio::time::sleep(Duration::from_secs(30 * 60)).await;
        settle().await;
        assert_eq!(h.service.calls(), 1);

        tokio::time::sleep(Duration::from_secs(31 * 60 + 5)).await;
        settle().await;
        assert_eq!(h.service.calls(), 2);
        assert_eq!(h.deltas.count(), 2);
        assert!(h.status.errors().is_empty());

        h.poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_flight_under_wake_storm() {
        let service = ScriptedWeatherService::new().with_delay(Duration::from_secs(30));
        let h = harness(service, Some(positions::OFFSHORE));
        h.poller.start().await;
        settle().await;

        for _ in 0..10 {
            h.poller.wake().await;
            settle().await;
        }
        assert_eq!(h.service.calls(), 1);
        assert!(h.poller.status().fetch_in_flight);

        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;

        assert_eq!(h.service.max_in_flight(), 1);
        assert_eq!(h.deltas.count(), 1);

        h.poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_then_recovery() {
        let service = ScriptedWeatherService::new();
        service.fail_by_default();
        let h = harness(service, Some(positions::OFFSHORE));

        h.poller.start().await;
        settle().await;
        for _ in 0..2 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            settle().await;
        }

        assert_eq!(h.service.calls(), 3);
        let errors = h.status.errors();
        assert!(errors.iter().any(|e| e.contains("Gave up after 3")));

        let status = h.poller.status();
        assert_eq!(status.consecutive_fetch_errors, 0);
        assert!(status.wake_timer_armed);
        assert_eq!(status.polls_failed, 3);

        // No retry is pending: nothing happens before the next wake.
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;
        assert_eq!(h.service.calls(), 3);

        h.service.succeed_by_default();
        tokio::time::sleep(Duration::from_secs(31)).await;
        settle().await;
        assert_eq!(h.service.calls(), 4);
        assert_eq!(h.deltas.count(), 1);

        h.poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_position_gives_up_after_twelve_retries() {
        let h = harness(ScriptedWeatherService::new(), None);
        h.poller.start().await;
        settle().await;

        for _ in 0..20 {
            tokio::time::sleep(Duration::from_secs(10)).await;
            settle().await;
        }

        assert_eq!(h.positions.calls(), 13);
        assert_eq!(h.service.calls(), 0);
        assert_eq!(h.status.errors(), vec!["Vessel position not available".to_string()]);
        assert_eq!(h.poller.status().consecutive_no_position_retries, 12);

        // An external wake with a position resumes polling.
        h.positions.set(Some(positions::SOLENT));
        h.poller.wake().await;
        settle().await;
        assert_eq!(h.service.positions(), vec![positions::SOLENT]);
        assert_eq!(h.poller.status().consecutive_no_position_retries, 0);

        h.poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_cancels_timers_and_discards_in_flight_result() {
        let service = ScriptedWeatherService::new().with_delay(Duration::from_secs(5));
        let h = harness(service, Some(positions::OFFSHORE));
        h.poller.start().await;
        settle().await;
        assert!(h.poller.is_running().await);

        assert!(h.poller.stop().await);
        assert!(!h.poller.is_running().await);
        assert_eq!(
            h.status.statuses(),
            vec!["Started".to_string(), "Stopped".to_string()]
        );

        tokio::time::sleep(HOUR * 3).await;
        settle().await;
        assert_eq!(h.service.calls(), 1);
        assert_eq!(h.deltas.count(), 0);
        assert_eq!(h.poller.status().phase, Phase::Stopped);

        // Restart fetches again immediately.
        assert!(h.poller.start().await);
        settle().await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        settle().await;
        assert_eq!(h.service.calls(), 2);
        assert_eq!(h.deltas.count(), 1);

        h.poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_early_periodic_wake_trips_watchdog_and_halts_loop() {
        let h = harness(ScriptedWeatherService::new(), Some(positions::OFFSHORE));
        h.poller.start().await;
        settle().await;
        assert!(h.poller.status().wake_timer_armed);

        // A periodic wake right after the timer was armed is below the floor.
        h.poller.send_wake(WakeSource::Periodic).await;
        settle().await;

        assert!(!h.poller.is_running().await);
        let errors = h.status.errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("Wake timer fired 0 ms"), "{}", errors[0]);

        let status = h.poller.status();
        assert_eq!(status.phase, Phase::Stopped);
        assert!(!status.wake_timer_armed);
        assert!(!status.fetch_in_flight);

        // Timers are gone: nothing fetches until the host starts it again.
        tokio::time::sleep(HOUR * 3).await;
        settle().await;
        assert_eq!(h.service.calls(), 1);
        assert_eq!(h.deltas.count(), 1);

        assert!(h.poller.start().await);
        settle().await;
        assert_eq!(h.service.calls(), 2);

        h.poller.stop().await;
    }

    #[tokio::test]
    async fn test_rejects_cache_max_age_other_than_fetch_interval() {
        let service = Arc::new(ScriptedWeatherService::new());
        let cache = GeoCache::new(
            CacheConfig::new(chrono::Duration::minutes(30)),
            Arc::new(ManualClock::default()),
        )
        .unwrap();
        let context = PollerContext {
            gateway: Arc::new(FetchGateway::new(Arc::new(cache), service)),
            positions: Arc::new(FakePositionSource::new(None)),
            deltas: Arc::new(RecordingDeltaSink::default()),
            status: Arc::new(RecordingStatusSink::default()),
        };

        let err = Poller::new(context.clone(), SchedulerConfig::new(HOUR))
            .err()
            .expect("mismatched max age must be rejected");
        assert!(matches!(err, WeatherError::Config(_)));

        assert!(Poller::new(context, SchedulerConfig::new(Duration::from_secs(30 * 60))).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_keeps_single_loop() {
        let h = harness(ScriptedWeatherService::new(), Some(positions::OFFSHORE));
        assert!(h.poller.start().await);
        assert!(!h.poller.start().await);
        settle().await;
        assert_eq!(h.service.calls(), 1);

        h.poller.stop().await;
        assert!(!h.poller.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_translation_failure_counts_as_fetch_failure() {
        let service = ScriptedWeatherService::new();
        service.push_ok(serde_json::json!({ "lat": "nowhere" }));
        service.push_err(RemoteError::Timeout);
        let h = harness(service, Some(positions::OFFSHORE));

        h.poller.start().await;
        settle().await;
        assert_eq!(h.deltas.count(), 0);
        assert_eq!(h.poller.status().polls_failed, 1);

        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle().await;

        assert_eq!(h.service.calls(), 3);
        assert_eq!(h.deltas.count(), 1);
        assert_eq!(h.poller.status().consecutive_fetch_errors, 0);

        h.poller.stop().await;
    }
}
