//! Progress reporting hooks for long-running retrievals.

/// Receives coarse progress from the orchestrator.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after a batch of candidates has been ranked.
    fn ranked(&self, query: &str, qualifying: usize, needed: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn ranked(&self, _query: &str, _qualifying: usize, _needed: usize) {}
}
