/// URL status definitions for tracking crawl progress
///
/// Every URL the frontier has ever seen carries exactly one of these states.
use serde::Serialize;
use std::fmt;

/// Represents the current state of a URL in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UrlStatus {
    // ===== Active States =====
    /// Admitted to the frontier and waiting for a worker
    Pending,

    /// Taken by a worker and being fetched
    InFlight,

    // ===== Terminal States =====
    /// Fetched and processed successfully
    Done,

    /// Fetch, parse or write failed; the reason is kept on the record
    Failed,

    /// Discovered after the page ceiling was reached; recorded but never fetched
    NotFetched,
}

impl UrlStatus {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending | Self::InFlight)
    }

    /// Returns true if the URL was visited, successfully or not
    pub fn is_visited(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if moving from `self` to `next` is a legal transition
    ///
    /// The only legal moves are `Pending -> InFlight` and
    /// `InFlight -> Done | Failed`. Terminal states never change.
    pub fn can_transition_to(&self, next: UrlStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InFlight)
                | (Self::InFlight, Self::Done)
                | (Self::InFlight, Self::Failed)
        )
    }

    /// Short lowercase name used in logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InFlight => "in_flight",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::NotFetched => "not_fetched",
        }
    }
}

impl fmt::Display for UrlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
