//! Progress callbacks for front ends.

use zimport_shared::ServerHandle;

use crate::pipeline::ExportOutcome;
use crate::state::PipelineState;

/// Progress callback for reporting pipeline status.
///
/// Calls are one-way notifications; a reporter cannot influence the run.
pub trait ProgressReporter: Send + Sync {
    /// Called on every state transition, including the terminal one.
    fn state(&self, state: &PipelineState);
    /// Called once the content server process has been spawned.
    fn session_started(&self, handle: &ServerHandle);
    /// Called when the run completes successfully.
    fn done(&self, outcome: &ExportOutcome);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn state(&self, _state: &PipelineState) {}
    fn session_started(&self, _handle: &ServerHandle) {}
    fn done(&self, _outcome: &ExportOutcome) {}
}
