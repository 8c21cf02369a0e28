//! Progress callbacks for long-running commands.

/// Progress callback for reporting run status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called as each unit of work (answer, batch) finishes.
    fn item_progress(&self, current: usize, total: usize, detail: &str);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn item_progress(&self, _current: usize, _total: usize, _detail: &str) {}
}
