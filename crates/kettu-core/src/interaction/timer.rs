use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc,
};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CANCELLED: u8 = 2;

/// Single-shot deadline bound to one interaction.
///
/// `on_fire` runs at most once. Firing and `cancel()` race on one
/// compare-and-set, so a cancel that wins the race guarantees `on_fire`
/// never runs, and a cancel that loses is a no-op.
#[derive(Debug)]
pub struct ResponseTimer {
    state: Arc<AtomicU8>,
    cancel: CancellationToken,
}

impl ResponseTimer {
    /// Start the countdown on the current tokio runtime.
    pub fn start<T, F>(deadline: Duration, fallback: T, on_fire: F) -> Self
    where
        T: Send + 'static,
        F: FnOnce(T) + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(ARMED));
        let cancel = CancellationToken::new();

        let task_state = state.clone();
        let task_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = task_cancel.cancelled() => {}
                _ = sleep(deadline) => {
                    if task_state
                        .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        on_fire(fallback);
                    }
                }
            }
        });

        Self { state, cancel }
    }

    /// Stop the countdown. Returns `true` if this call prevented the timer
    /// from firing; `false` if it already fired or was already cancelled.
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        self.cancel.cancel();
        won
    }

    pub fn has_fired(&self) -> bool {
        self.state.load(Ordering::Acquire) == FIRED
    }
}
