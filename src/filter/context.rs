use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Rows written per transaction when a stage is not told otherwise.
pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Shared flag checked by stages between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A token that has not been cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation; every clone observes it.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Execution settings shared by every stage of a run.
#[derive(Debug, Clone)]
pub struct StageContext {
    batch_size: usize,
    cancel: CancellationToken,
}

impl StageContext {
    /// Context with an explicit batch size (at least 1).
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
            ..Self::default()
        }
    }

    /// Rows per insert batch; each batch is committed on its own. Never zero.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Checked before each batch is written.
    pub fn cancel(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Attach a cancellation token.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

impl Default for StageContext {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            cancel: CancellationToken::new(),
        }
    }
}
