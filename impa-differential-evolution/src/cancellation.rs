//! Cooperative cancellation shared between a running solve and its caller.
//!
//! The token is a single atomic flag. Any thread may raise it; the solver
//! polls it before every cost evaluation and consumes it when it stops, so
//! a raised flag aborts exactly one run.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Clonable handle to a shared abort flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// New token with the flag lowered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raises the flag. Safe to call from any thread, any number of times.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether the flag is raised.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// Lowers the flag and reports whether it was raised.
    pub fn take(&self) -> bool {
        self.flag.swap(false, Ordering::SeqCst)
    }

    /// Lowers the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Result of one cost evaluation that may have been interrupted.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Evaluation<T> {
    /// The evaluation completed.
    Done(T),
    /// The evaluation observed a cancellation request and stopped.
    Cancelled,
}

impl<T> Evaluation<T> {
    /// Whether the evaluation was interrupted.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Evaluation::Cancelled)
    }

    /// Completed value, if any.
    pub fn done(self) -> Option<T> {
        match self {
            Evaluation::Done(v) => Some(v),
            Evaluation::Cancelled => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_take_consumes_the_flag() {
        let token = CancellationToken::new();
        assert!(!token.take());
        token.cancel();
        token.cancel();
        assert!(token.is_cancelled());
        assert!(token.take());
        assert!(!token.is_cancelled());
        assert!(!token.take());
    }

    #[test]
    fn test_cancel_from_another_thread() {
        let token = CancellationToken::new();
        let remote = token.clone();
        thread::spawn(move || remote.cancel()).join().unwrap();
        assert!(token.is_cancelled());
    }
}
