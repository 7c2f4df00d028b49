//! Best-effort cancellation for long-running construction and rebuilds.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::TesseraError;

/// Cloneable cancellation handle.
///
/// Rebuild and construction loops consult the token between per-pyramid or
/// per-mosaic iterations and bail out with [`TesseraError::Cancelled`] once
/// it is triggered. Cancellation is cooperative: an iteration that already
/// started runs to completion.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Creates a token in the non-cancelled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns true once [`CancellationToken::cancel`] has been called.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Propagates cancellation as an error.
    pub fn check(&self) -> Result<(), TesseraError> {
        if self.is_cancelled() {
            Err(TesseraError::Cancelled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(token.check().is_ok());

        clone.cancel();
        assert!(token.is_cancelled());
        assert_matches!(token.check(), Err(TesseraError::Cancelled));
    }
}
