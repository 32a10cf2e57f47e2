//! Interfaces the host application provides to the poller.

use crate::delta::Delta;
use crate::position::Position;

/// Supplies the vessel's current position on demand.
pub trait PositionSource: Send + Sync {
    /// `None` means "not yet known", not an error.
    fn current_position(&self) -> Option<Position>;
}

/// Receives normalized weather deltas after each successful poll.
pub trait DeltaSink: Send + Sync {
    fn publish(&self, deltas: Vec<Delta>);
}

/// Receives operational status and error messages.
pub trait StatusSink: Send + Sync {
    fn report_status(&self, message: &str);
    fn report_error(&self, message: &str);
}
