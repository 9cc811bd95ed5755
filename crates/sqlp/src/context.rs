//! Cancellation and deadline propagation for statement execution.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::error::{Result, SqlpError};

/// Carries a cancellation signal and an optional deadline to an execution
/// target.
///
/// Clones share the cancellation flag, so a clone handed to another thread
/// can cancel the statement running on this one.
#[derive(Clone, Debug, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
}

impl Context {
    /// A context that is never cancelled and has no deadline.
    pub fn background() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the reason this context is done, if it is.
    pub fn err(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(SqlpError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(SqlpError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_live() {
        let ctx = Context::background();
        assert!(ctx.err().is_ok());
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_is_shared_between_clones() {
        let ctx = Context::background();
        let handle = ctx.clone();
        handle.cancel();

        assert!(ctx.is_cancelled());
        assert!(matches!(ctx.err(), Err(SqlpError::Cancelled)));
    }

    #[test]
    fn test_deadline() {
        let expired = Context::with_deadline(Instant::now() - Duration::from_millis(1));
        assert!(matches!(expired.err(), Err(SqlpError::DeadlineExceeded)));

        let live = Context::with_timeout(Duration::from_secs(60));
        assert!(live.err().is_ok());
    }
}
