use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::oneshot;

use super::{
    envelope::{InteractionResult, MessageBody},
    timer::ResponseTimer,
};

/// Who settled a pending response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettledBy {
    Application,
    Timeout,
}

/// Outcome of one settle attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettleOutcome {
    /// This attempt produced the result.
    Accepted,
    /// The deadline fallback was already produced; deliver out-of-band instead.
    DeadlineMissed,
    /// The application already settled this interaction; no further effect.
    AlreadySettled,
}

/// Resolution handed to the dispatcher.
#[derive(Clone, Debug, PartialEq)]
pub struct Settlement {
    pub result: InteractionResult,
    pub by: SettledBy,
}

#[derive(Debug)]
struct Slot {
    settled: Option<SettledBy>,
    tx: Option<oneshot::Sender<Settlement>>,
}

/// Exactly-once result slot for one interaction.
///
/// The timer callback and every responder call go through `settle`, which
/// checks and sets the settled flag under one lock.
#[derive(Debug)]
pub struct PendingResponse {
    slot: Mutex<Slot>,
}

impl PendingResponse {
    pub fn new() -> (Arc<Self>, oneshot::Receiver<Settlement>) {
        let (tx, rx) = oneshot::channel();
        let pending = Arc::new(Self {
            slot: Mutex::new(Slot {
                settled: None,
                tx: Some(tx),
            }),
        });
        (pending, rx)
    }

    pub fn settle(&self, by: SettledBy, result: InteractionResult) -> SettleOutcome {
        let mut slot = self.slot.lock().unwrap_or_else(PoisonError::into_inner);
        match slot.settled {
            Some(SettledBy::Timeout) => SettleOutcome::DeadlineMissed,
            Some(SettledBy::Application) => SettleOutcome::AlreadySettled,
            None => {
                slot.settled = Some(by);
                if let Some(tx) = slot.tx.take() {
                    // Receiver gone means the caller stopped waiting; the
                    // result is still settled so later calls see it.
                    let _ = tx.send(Settlement { result, by });
                }
                SettleOutcome::Accepted
            }
        }
    }

    pub fn settled_by(&self) -> Option<SettledBy> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .settled
    }
}

/// Handle given to application code for one command interaction.
///
/// Cheap to clone and safe to call from any task; only the first settle wins.
#[derive(Clone, Debug)]
pub struct InteractionResponder {
    inner: Arc<ResponderInner>,
}

#[derive(Debug)]
struct ResponderInner {
    pending: Arc<PendingResponse>,
    timer: ResponseTimer,
}

impl InteractionResponder {
    pub fn new(pending: Arc<PendingResponse>, timer: ResponseTimer) -> Self {
        Self {
            inner: Arc::new(ResponderInner { pending, timer }),
        }
    }

    /// Acknowledge without content. Ignored once the deadline has fired or
    /// the interaction is already settled.
    pub fn acknowledge(&self, hidden: bool) -> SettleOutcome {
        self.settle(InteractionResult::Acknowledge { hidden })
    }

    /// Reply in-band. Returns `false` when the deadline already fired and the
    /// caller must deliver the message out-of-band.
    pub fn reply(&self, message: &MessageBody, hidden: bool) -> bool {
        self.try_reply(message, hidden) != SettleOutcome::DeadlineMissed
    }

    pub fn try_reply(&self, message: &MessageBody, hidden: bool) -> SettleOutcome {
        self.settle(InteractionResult::Message {
            hidden,
            body: message.clone(),
        })
    }

    pub fn has_fired(&self) -> bool {
        self.inner.timer.has_fired()
    }

    pub fn settled_by(&self) -> Option<SettledBy> {
        self.inner.pending.settled_by()
    }

    /// Settle as if the deadline fired. No effect once settled.
    pub(crate) fn expire(&self) {
        let outcome = self
            .inner
            .pending
            .settle(SettledBy::Timeout, InteractionResult::fallback());
        if outcome == SettleOutcome::Accepted {
            self.inner.timer.cancel();
        }
    }

    fn settle(&self, result: InteractionResult) -> SettleOutcome {
        let outcome = self.inner.pending.settle(SettledBy::Application, result);
        if outcome == SettleOutcome::Accepted {
            self.inner.timer.cancel();
        }
        outcome
    }
}

/// Build the slot, the deadline timer that settles it with `fallback`, and
/// the responder bound to both.
pub fn arm(
    deadline: std::time::Duration,
    fallback: InteractionResult,
) -> (InteractionResponder, oneshot::Receiver<Settlement>) {
    let (pending, rx) = PendingResponse::new();
    let on_fire = {
        let pending = pending.clone();
        move |fallback: InteractionResult| {
            pending.settle(SettledBy::Timeout, fallback);
        }
    };
    let timer = ResponseTimer::start(deadline, fallback, on_fire);
    (InteractionResponder::new(pending, timer), rx)
}
