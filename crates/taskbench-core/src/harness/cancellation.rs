use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Shared stop signal for every worker of one run.
#[derive(Clone, Debug, Default)]
pub struct RunCancellationToken {
    flag: Arc<AtomicBool>,
}

impl RunCancellationToken {
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

/// Cancels the run if the owning worker unwinds.
pub(crate) struct CancelOnPanic<'a> {
    token: &'a RunCancellationToken,
}

impl<'a> CancelOnPanic<'a> {
    pub(crate) fn new(token: &'a RunCancellationToken) -> Self {
        Self { token }
    }
}

impl Drop for CancelOnPanic<'_> {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CancelOnPanic, RunCancellationToken};

    #[test]
    fn clones_share_one_flag() {
        let token = RunCancellationToken::new();
        let clone = token.clone();
        assert!(!token.is_cancelled());

        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn guard_cancels_only_when_unwinding() {
        let token = RunCancellationToken::new();
        drop(CancelOnPanic::new(&token));
        assert!(!token.is_cancelled());

        let shared = token.clone();
        let outcome = std::thread::spawn(move || {
            let _guard = CancelOnPanic::new(&shared);
            panic!("worker blew up");
        })
        .join();
        assert!(outcome.is_err());
        assert!(token.is_cancelled());
    }
}
