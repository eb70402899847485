use tokio::task::AbortHandle;

/// Exclusively owned handle of a spawned tick loop. Dropping the guard aborts
/// the loop, so every path that discards it cancels pending firings.
#[derive(Debug)]
pub(crate) struct TimerGuard {
    handle: AbortHandle,
}

impl TimerGuard {
    pub(crate) fn new(handle: AbortHandle) -> Self {
        Self { handle }
    }
}

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
