//! Polling state machine.
//!
//! Pure bookkeeping: every event takes the current instant and returns the
//! directives the driver must carry out. Timers, tasks and I/O live in
//! [`super::driver`].

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::debug;

use weather_common::{Delta, Position, WeatherError};

pub const DEFAULT_WAKE_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_FETCH_RETRY_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_FETCH_MAX_RETRIES: u32 = 3;
pub const DEFAULT_NO_POSITION_RETRY_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_NO_POSITION_MAX_RETRIES: u32 = 12;

/// Upper bound on the slack the watchdog allows below the wake interval.
const WATCHDOG_MAX_SLACK: Duration = Duration::from_secs(10);

/// Timing and retry policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Minimum spacing between scheduled fetches. Also the cache max age.
    pub fetch_interval: Duration,
    /// Period of the wake timer. Must be shorter than `fetch_interval`.
    pub wake_interval: Duration,
    pub fetch_retry_interval: Duration,
    /// Fetch attempts per cycle before giving up until the next wake.
    pub fetch_max_retries: u32,
    pub no_position_retry_interval: Duration,
    pub no_position_max_retries: u32,
}

impl SchedulerConfig {
    pub fn new(fetch_interval: Duration) -> Self {
        Self {
            fetch_interval,
            wake_interval: DEFAULT_WAKE_INTERVAL,
            fetch_retry_interval: DEFAULT_FETCH_RETRY_INTERVAL,
            fetch_max_retries: DEFAULT_FETCH_MAX_RETRIES,
            no_position_retry_interval: DEFAULT_NO_POSITION_RETRY_INTERVAL,
            no_position_max_retries: DEFAULT_NO_POSITION_MAX_RETRIES,
        }
    }

    /// Shortest acceptable gap between two wake timer ticks.
    pub fn watchdog_floor(&self) -> Duration {
        self.wake_interval - WATCHDOG_MAX_SLACK.min(self.wake_interval / 2)
    }

    pub fn validate(&self) -> Result<(), WeatherError> {
        if self.wake_interval.is_zero() {
            return Err(WeatherError::Config("wake interval must be positive".into()));
        }
        if self.wake_interval >= self.fetch_interval {
            return Err(WeatherError::Config(format!(
                "wake interval ({}s) must be shorter than the fetch interval ({}s)",
                self.wake_interval.as_secs(),
                self.fetch_interval.as_secs()
            )));
        }
        if self.fetch_max_retries == 0 {
            return Err(WeatherError::Config("fetch_max_retries must be at least 1".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    AwaitingPosition,
    Fetching,
    Sleeping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryKind {
    Fetch,
    NoPosition,
}

/// What caused a wake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeSource {
    /// Tick of the periodic wake timer.
    Periodic,
    Retry(RetryKind),
    /// Host nudge, e.g. a new position was pushed.
    External,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Directive {
    Fetch(Position),
    ScheduleRetry { kind: RetryKind, after: Duration },
    CancelRetry(RetryKind),
    ArmWakeTimer,
    Publish(Vec<Delta>),
    Status(String),
    Error(WeatherError),
    /// Drop every timer and leave the control loop.
    Halt,
}

/// Counters and timestamps exposed for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerState {
    pub phase: Phase,
    pub last_wake_time: Option<Instant>,
    pub last_fetch_time: Option<Instant>,
    pub consecutive_fetch_errors: u32,
    pub consecutive_no_position_retries: u32,
    pub fetch_in_flight: bool,
    pub wake_timer_armed: bool,
}

#[derive(Debug)]
pub struct SchedulerMachine {
    config: SchedulerConfig,
    phase: Phase,
    last_wake_time: Option<Instant>,
    last_fetch_time: Option<Instant>,
    consecutive_fetch_errors: u32,
    consecutive_no_position_retries: u32,
    fetch_in_flight: bool,
    wake_timer_armed: bool,
    gave_up_on_position: bool,
}

impl SchedulerMachine {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            last_wake_time: None,
            last_fetch_time: None,
            consecutive_fetch_errors: 0,
            consecutive_no_position_retries: 0,
            fetch_in_flight: false,
            wake_timer_armed: false,
            gave_up_on_position: false,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        !matches!(self.phase, Phase::Idle | Phase::Stopped)
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState {
            phase: self.phase,
            last_wake_time: self.last_wake_time,
            last_fetch_time: self.last_fetch_time,
            consecutive_fetch_errors: self.consecutive_fetch_errors,
            consecutive_no_position_retries: self.consecutive_no_position_retries,
            fetch_in_flight: self.fetch_in_flight,
            wake_timer_armed: self.wake_timer_armed,
        }
    }

    pub fn start(&mut self, now: Instant, position: Option<Position>) -> Vec<Directive> {
        if self.is_running() {
            return Vec::new();
        }
        self.reset();

        let mut directives = vec![Directive::Status("Started".into())];
        self.evaluate(now, position, &mut directives);
        directives
    }

    pub fn stop(&mut self) -> Vec<Directive> {
        if !self.is_running() {
            return Vec::new();
        }
        self.reset();
        self.phase = Phase::Stopped;
        vec![Directive::Halt, Directive::Status("Stopped".into())]
    }

    pub fn wake(
        &mut self,
        now: Instant,
        source: WakeSource,
        position: Option<Position>,
    ) -> Vec<Directive> {
        let mut directives = Vec::new();
        if !self.is_running() {
            return directives;
        }

        if source == WakeSource::Periodic {
            if let Some(last) = self.last_wake_time {
                let elapsed = now.saturating_duration_since(last);
                let floor = self.config.watchdog_floor();
                if elapsed < floor {
                    return self.trip(elapsed, floor);
                }
            }
            self.last_wake_time = Some(now);
        }

        if self.fetch_in_flight {
            debug!(?source, "Fetch already in flight, ignoring wake");
            return directives;
        }

        self.evaluate(now, position, &mut directives);
        directives
    }

    pub fn fetch_succeeded(&mut self, now: Instant, deltas: Vec<Delta>) -> Vec<Directive> {
        if !self.is_running() || !self.fetch_in_flight {
            return Vec::new();
        }
        self.fetch_in_flight = false;
        self.consecutive_fetch_errors = 0;
        self.last_fetch_time = Some(now);
        self.phase = Phase::Sleeping;

        let mut directives = vec![Directive::Publish(deltas)];
        if !self.wake_timer_armed {
            self.arm_wake_timer(now, &mut directives);
        }
        directives
    }

    pub fn fetch_failed(&mut self, now: Instant, error: WeatherError) -> Vec<Directive> {
        if !self.is_running() || !self.fetch_in_flight {
            return Vec::new();
        }
        self.fetch_in_flight = false;

        let mut directives = vec![Directive::Error(error)];
        if self.consecutive_fetch_errors < self.config.fetch_max_retries {
            directives.push(Directive::ScheduleRetry {
                kind: RetryKind::Fetch,
                after: self.config.fetch_retry_interval,
            });
            return directives;
        }

        let attempts = self.consecutive_fetch_errors;
        self.consecutive_fetch_errors = 0;
        self.phase = Phase::Sleeping;
        directives.push(Directive::Error(WeatherError::RetryBudgetExhausted { attempts }));
        if !self.wake_timer_armed {
            self.arm_wake_timer(now, &mut directives);
        }
        directives
    }

    fn evaluate(&mut self, now: Instant, position: Option<Position>, out: &mut Vec<Directive>) {
        let Some(position) = position else {
            self.await_position(out);
            return;
        };

        if self.phase == Phase::AwaitingPosition || self.consecutive_no_position_retries > 0 {
            self.consecutive_no_position_retries = 0;
            self.gave_up_on_position = false;
            out.push(Directive::CancelRetry(RetryKind::NoPosition));
        }
        self.phase = Phase::Fetching;

        if let Some(last) = self.last_fetch_time {
            if now.saturating_duration_since(last) < self.config.fetch_interval {
                self.phase = Phase::Sleeping;
                return;
            }
        }

        if self.consecutive_fetch_errors >= self.config.fetch_max_retries {
            // Budget spent and no wake timer yet; start a fresh cycle.
            self.consecutive_fetch_errors = 0;
        }
        self.consecutive_fetch_errors += 1;
        self.fetch_in_flight = true;
        out.push(Directive::CancelRetry(RetryKind::Fetch));
        out.push(Directive::Fetch(position));
    }

    fn await_position(&mut self, out: &mut Vec<Directive>) {
        self.phase = Phase::AwaitingPosition;

        if self.consecutive_no_position_retries < self.config.no_position_max_retries {
            self.consecutive_no_position_retries += 1;
            out.push(Directive::ScheduleRetry {
                kind: RetryKind::NoPosition,
                after: self.config.no_position_retry_interval,
            });
            if self.consecutive_no_position_retries == 1 {
                out.push(Directive::Status("Waiting for vessel position".into()));
            }
        } else if !self.gave_up_on_position {
            self.gave_up_on_position = true;
            out.push(Directive::Error(WeatherError::NoPositionAvailable));
        }
    }

    fn arm_wake_timer(&mut self, now: Instant, out: &mut Vec<Directive>) {
        self.wake_timer_armed = true;
        self.last_wake_time = Some(now);
        out.push(Directive::ArmWakeTimer);
    }

    fn trip(&mut self, elapsed: Duration, floor: Duration) -> Vec<Directive> {
        self.reset();
        self.phase = Phase::Stopped;
        vec![
            Directive::Halt,
            Directive::Error(WeatherError::WatchdogTrip {
                elapsed_ms: elapsed.as_millis() as u64,
                floor_ms: floor.as_millis() as u64,
            }),
        ]
    }

    fn reset(&mut self) {
        self.last_wake_time = None;
        self.last_fetch_time = None;
        self.consecutive_fetch_errors = 0;
        self.consecutive_no_position_retries = 0;
        self.fetch_in_flight = false;
        self.wake_timer_armed = false;
        self.gave_up_on_position = false;
    }
}
