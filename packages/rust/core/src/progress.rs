//! Progress callbacks for long pipeline runs.

use docweave_shared::BuildReport;

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when a topic has been through every component (or failed).
    /// Topics may complete out of order when processing is parallel.
    fn topic_done(&self, key: &str, current: usize, total: usize);
    /// Called when the run completes.
    fn done(&self, report: &BuildReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn topic_done(&self, _key: &str, _current: usize, _total: usize) {}
    fn done(&self, _report: &BuildReport) {}
}
