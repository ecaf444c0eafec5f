//! Forward-only run state machine.

use std::fmt;

use serde::Serialize;

/// Where a pipeline run currently is.
///
/// `Idle → SessionStarting → Ready → Fetching → Extracting → Writing → Done`,
/// with `Failed` reachable from every non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    SessionStarting,
    Ready,
    Fetching,
    Extracting,
    Writing,
    Done,
    Failed(String),
}

impl PipelineState {
    /// `Done` and `Failed` end a run.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed(_))
    }

    /// Whether moving from `self` to `next` is allowed.
    pub fn can_transition_to(&self, next: &PipelineState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            Self::Failed(_) => true,
            _ => next.rank() > self.rank(),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::SessionStarting => 1,
            Self::Ready => 2,
            Self::Fetching => 3,
            Self::Extracting => 4,
            Self::Writing => 5,
            Self::Done | Self::Failed(_) => 6,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::SessionStarting => f.write_str("starting content server"),
            Self::Ready => f.write_str("content server ready"),
            Self::Fetching => f.write_str("fetching page"),
            Self::Extracting => f.write_str("extracting articles"),
            Self::Writing => f.write_str("writing output"),
            Self::Done => f.write_str("done"),
            Self::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}
