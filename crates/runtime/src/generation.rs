//! Monotonic cycle generations with per-cycle cancellation.
//!
//! Every refresh cycle starts with [`CycleTracker::begin`], which bumps the
//! generation and cancels the token handed to the previous cycle. A cycle may
//! only publish results while its generation is still current.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::trace;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

/// What a running cycle holds on to.
#[derive(Debug, Clone)]
pub struct CycleHandle {
    pub generation: Generation,
    pub token: CancellationToken,
}

impl CycleHandle {
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Debug)]
pub struct CycleTracker {
    current: AtomicU64,
    token: Mutex<CancellationToken>,
}

impl Default for CycleTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleTracker {
    pub fn new() -> Self {
        Self {
            current: AtomicU64::new(0),
            token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Start a new cycle, cancelling whichever cycle was running.
    pub fn begin(&self) -> CycleHandle {
        let token = CancellationToken::new();
        let previous = std::mem::replace(&mut *self.token.lock(), token.clone());
        previous.cancel();
        let generation = Generation(self.current.fetch_add(1, Ordering::SeqCst) + 1);
        trace!(%generation, "cycle started");
        CycleHandle { generation, token }
    }

    pub fn current(&self) -> Generation {
        Generation(self.current.load(Ordering::SeqCst))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }

    /// Cancel the running cycle without starting another.
    pub fn cancel_current(&self) {
        self.token.lock().cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::{CycleTracker, Generation};

    #[test]
    fn begin_supersedes_and_cancels_previous() {
        let t = CycleTracker::new();
        assert_eq!(t.current(), Generation(0));

        let first = t.begin();
        assert!(t.is_current(first.generation));
        assert!(!first.is_cancelled());

        let second = t.begin();
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
        assert!(!t.is_current(first.generation));
        assert!(t.is_current(second.generation));
        assert!(second.generation > first.generation);
    }

    #[test]
    fn cancel_current_keeps_generation() {
        let t = CycleTracker::new();
        let h = t.begin();
        t.cancel_current();
        assert!(h.is_cancelled());
        assert!(t.is_current(h.generation));
    }
}
