//! Desk lifecycle states.

use std::fmt;

/// Operational state of a [`crate::TradeDesk`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeskState {
    /// Components are being wired up.
    Starting,
    /// Accepting usecases.
    Running,
    /// Background work is being stopped; no new usecases.
    ShuttingDown,
    /// Stopped.
    Stopped,
}

impl DeskState {
    /// Check if the desk is accepting new usecases.
    pub fn accepts_requests(&self) -> bool {
        matches!(self, DeskState::Running)
    }

    /// Check if the desk is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeskState::Stopped)
    }
}

impl fmt::Display for DeskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DeskState::Starting => "starting",
            DeskState::Running => "running",
            DeskState::ShuttingDown => "shutting-down",
            DeskState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}
