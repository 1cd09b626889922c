//! Cooperative cancellation.
//!
//! A single signal, polled between pipeline stages and between major loop
//! iterations inside a stage (§5). Observed cancellation unwinds to
//! [`crate::error::EngineError::Canceled`] and triggers rollback where one
//! is in progress.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::EngineError;

/// A cheaply-cloneable cancellation flag shared between a caller and a
/// running pipeline.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a fresh, not-yet-canceled token.
    #[must_use]
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// `true` if [`Self::cancel`] has been called on this token or any of
    /// its clones.
    #[must_use]
    pub fn is_canceled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Poll for cancellation, returning [`EngineError::Canceled`] if it has
    /// been requested. Call this between stages and between iterations of
    /// a stage's major loop.
    ///
    /// # Errors
    /// Returns [`EngineError::Canceled`] if cancellation was requested.
    pub fn check(&self) -> Result<(), EngineError> {
        if self.is_canceled() {
            Err(EngineError::Canceled)
        } else {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_token_not_canceled() {
        let token = CancellationToken::new();
        assert!(!token.is_canceled());
        assert!(token.check().is_ok());
    }

    #[test]
    fn cancel_is_observed_through_clone() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_canceled());
        assert!(matches!(token.check(), Err(EngineError::Canceled)));
    }

    #[test]
    fn cancel_is_idempotent() {
        let token = CancellationToken::new();
        token.cancel();
        token.cancel();
        assert!(token.is_canceled());
    }
}
