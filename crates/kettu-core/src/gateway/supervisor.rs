use std::sync::Arc;

use crate::{
    config::Backoff,
    errors::Error,
    events::{ClientEvent, SessionEvent},
    ports::EventSink,
    Result,
};

use super::connection::{DestroyHandle, SessionConnection, SessionOutcome};

/// Drives a `SessionConnection` through reconnects until it is destroyed or
/// closed with an unrecoverable code.
pub struct ReconnectSupervisor {
    connection: SessionConnection,
    backoff: Backoff,
    sink: Arc<dyn EventSink>,
}

impl ReconnectSupervisor {
    pub fn new(connection: SessionConnection, sink: Arc<dyn EventSink>) -> Self {
        let backoff = connection.backoff();
        Self {
            connection,
            backoff,
            sink,
        }
    }

    pub fn destroy_handle(&self) -> DestroyHandle {
        self.connection.destroy_handle()
    }

    /// Returns `Ok(())` after `destroy`, `Err(SessionFatal)` after an
    /// unrecoverable close. Never returns otherwise.
    pub async fn run(mut self) -> Result<()> {
        let destroy = self.connection.destroy_handle();
        let mut attempt: u32 = 0;

        loop {
            match self.connection.connect().await {
                SessionOutcome::Destroyed => {
                    tracing::info!("gateway session destroyed");
                    self.publish(SessionEvent::Destroyed);
                    return Ok(());
                }
                SessionOutcome::Fatal { code, reason } => {
                    tracing::error!(code, %reason, "gateway session is unrecoverable; not reconnecting");
                    self.publish(SessionEvent::Fatal {
                        code,
                        reason: reason.clone(),
                    });
                    return Err(Error::SessionFatal { code, reason });
                }
                outcome => {
                    if self.connection.reached_ready() {
                        attempt = 0;
                    }
                    let delay = self.backoff.delay_for_attempt(attempt);
                    attempt = attempt.saturating_add(1);

                    tracing::info!(?outcome, ?delay, attempt, "scheduling reconnect");
                    self.publish(SessionEvent::Reconnecting { delay, attempt });

                    // A destroy during the wait makes the next connect return
                    // `Destroyed` without opening a transport.
                    tokio::select! {
                        _ = destroy.destroyed() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    fn publish(&self, event: SessionEvent) {
        self.sink.publish(ClientEvent::Session(event));
    }
}
