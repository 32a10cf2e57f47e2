//! Autonomous polling of the vessel position.
//!
//! [`machine`] holds the wake/retry/watchdog rules as a pure state machine;
//! [`driver`] runs it on tokio timers.

pub mod driver;
pub mod machine;

pub use driver::{Poller, PollerContext, SchedulerStatus};
pub use machine::{Phase, SchedulerConfig};
