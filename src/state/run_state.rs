use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of one crawl run
///
/// `Idle -> Running -> {Completed, Cancelled, Failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    /// The frontier drained or the page ceiling was reached; per-item failures may be non-zero
    Completed,
    /// Stopped by the user; completed work was kept and rewritten
    Cancelled,
    /// A setup error (unreachable start URL, unwritable output) prevented the crawl
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }

    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::Running)
                | (Self::Idle, Self::Cancelled)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Cancelled)
                | (Self::Running, Self::Failed)
        )
    }

    fn to_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Completed => 2,
            Self::Cancelled => 3,
            Self::Failed => 4,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Completed,
            3 => Self::Cancelled,
            4 => Self::Failed,
            _ => Self::Idle,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
            Self::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// A run state that can be read while the run is progressing
#[derive(Debug)]
pub struct AtomicRunState(AtomicU8);

impl AtomicRunState {
    pub fn new(state: RunState) -> Self {
        Self(AtomicU8::new(state.to_u8()))
    }

    pub fn get(&self) -> RunState {
        RunState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `next` if the transition is legal, returning whether it happened
    pub fn transition(&self, next: RunState) -> bool {
        let mut current = self.0.load(Ordering::Acquire);
        loop {
            if !RunState::from_u8(current).can_transition_to(next) {
                return false;
            }
            match self.0.compare_exchange(
                current,
                next.to_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Moves from exactly `expected` to `next`; fails if another transition won
    pub fn transition_from(&self, expected: RunState, next: RunState) -> bool {
        expected.can_transition_to(next)
            && self
                .0
                .compare_exchange(
                    expected.to_u8(),
                    next.to_u8(),
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok()
    }
}
