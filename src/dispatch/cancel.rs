//! Cooperative cancellation of a collection run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared flag asking the dispatcher to stop collecting.
///
/// Clones observe the same flag, so one can be handed to a signal handler
/// while the dispatcher holds another.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_flag() {
        let token = CancelToken::new();
        let handler_copy = token.clone();
        assert!(!token.is_cancelled());

        handler_copy.cancel();
        assert!(token.is_cancelled());
    }
}
