//! Progress callbacks for long-running stages.

/// Progress callback for reporting stage status.
///
/// Analysis workers call this from several tasks at once.
pub trait StageProgress: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each unit of work (a batch or a document).
    fn advance(&self, current: usize, total: usize, label: &str);
    /// Called once when the stage has finished all of its work.
    fn finish(&self) {}
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl StageProgress for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn advance(&self, _current: usize, _total: usize, _label: &str) {}
}
