// src/progress.rs
/// Lightweight progress reporting for a sync run.
/// Frontends implement this to surface status to users; every hook is optional.
pub trait Progress {
    /// Run started against `store`.
    fn begin(&mut self, _store: &str) {}

    /// Lifecycle transition.
    fn phase(&mut self, _state: crate::runner::SyncState) {}

    /// Free-form status line for human eyes.
    fn log(&mut self, _msg: &str) {}

    /// One write batch acknowledged by the store.
    fn batch_done(&mut self, _kind: BatchKind, _rows: usize) {}

    /// Called at the end, successful or not.
    fn finish(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchKind {
    Insert,
    Update,
}

/// A no-op progress sink.
pub struct NullProgress;
impl Progress for NullProgress {}
