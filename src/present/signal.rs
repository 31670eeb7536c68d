use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct LevelState {
    raised: bool,
    closed: bool,
}

#[derive(Debug, Default)]
struct Level {
    state: Mutex<LevelState>,
    cv: Condvar,
}

impl Level {
    fn lock(&self) -> MutexGuard<'_, LevelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut LevelState)) {
        let mut st = self.lock();
        f(&mut st);
        drop(st);
        self.cv.notify_all();
    }

    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut st = self.lock();
        loop {
            if st.raised {
                return true;
            }
            if st.closed {
                return false;
            }
            match deadline {
                None => st = self.cv.wait(st).unwrap_or_else(PoisonError::into_inner),
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return false;
                    }
                    st = self
                        .cv
                        .wait_timeout(st, d - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
            }
        }
    }
}

/// Level-triggered "ready for next frame" flag shared between the scheduler and producers.
///
/// Starts lowered. Closing wakes every waiter and keeps the signal lowered for good.
#[derive(Clone, Debug, Default)]
pub struct ReadySignal {
    inner: Arc<Level>,
}

impl ReadySignal {
    /// A lowered, open signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the signal and wake waiters. No effect once closed.
    pub fn raise(&self) {
        self.inner.update(|st| {
            if !st.closed {
                st.raised = true;
            }
        });
    }

    /// Lower the signal.
    pub fn lower(&self) {
        self.inner.update(|st| st.raised = false);
    }

    /// Lower permanently and release all waiters.
    pub fn close(&self) {
        self.inner.update(|st| {
            st.raised = false;
            st.closed = true;
        });
    }

    /// Current level.
    pub fn is_raised(&self) -> bool {
        self.inner.lock().raised
    }

    /// Whether the signal has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Block until raised. Returns `false` if the signal was closed instead.
    pub fn wait(&self) -> bool {
        self.inner.wait_until(None)
    }

    /// Block until raised or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.wait_until(Some(Instant::now() + timeout))
    }
}

/// One-shot completion marker for rasterization work a submitted batch depends on.
#[derive(Clone, Debug, Default)]
pub struct RasterFence {
    inner: Arc<Level>,
}

impl RasterFence {
    /// An unsignaled fence.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the work complete.
    pub fn signal(&self) {
        self.inner.update(|st| st.raised = true);
    }

    /// Whether the work has completed.
    pub fn is_signaled(&self) -> bool {
        self.inner.lock().raised
    }

    /// Block until signaled or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.inner.wait_until(Some(Instant::now() + timeout))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/present/signal.rs"]
mod tests;
