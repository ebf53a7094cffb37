//! Cooperative cancellation shared between the connector and its
//! sender/receiver threads.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cloneable one-shot cancellation flag.
///
/// The connector hands one token to each worker loop for a connection
/// cycle. Workers poll it between blocking operations (the read side
/// relies on the socket read timeout to bound how long a poll is
/// deferred). Once cancelled a token never resets; a new cycle gets a
/// fresh token.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clones_observe_cancel() {
        let token = CancelToken::new();
        let other = token.clone();
        assert!(!other.is_cancelled());
        token.cancel();
        assert!(other.is_cancelled());
        assert!(token.is_cancelled());
    }
}
