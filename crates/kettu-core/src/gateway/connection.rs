use std::{sync::Arc, time::Duration};

use serde_json::Value;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::GatewayConfig,
    domain::SessionId,
    events::{ClientEvent, SessionEvent},
    ports::{EventSink, GatewayConnection, GatewayTransport, TransportEvent, ABNORMAL_CLOSURE},
};

use super::{
    close::{classify_close, CloseClassification, NORMAL_CLOSURE, RECONNECT_CLOSE_CODE},
    protocol::*,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Identifying,
    Resuming,
    Ready,
    Invalid,
    Closed,
}

/// How one connect cycle ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Transport closed; reconnect. `resumable` tells whether a session id survived.
    Disconnected { code: u16, resumable: bool },
    /// The server rejected the identify/resume. The session id was cleared.
    InvalidSession,
    /// The transport could not be opened.
    ConnectFailed(String),
    /// Unrecoverable close code. Terminal.
    Fatal { code: u16, reason: String },
    /// `destroy()` was called. Terminal.
    Destroyed,
}

/// Receives gateway dispatches other than the session handshake ones.
pub trait DispatchHandler: Send + Sync {
    fn on_dispatch(&self, name: &str, data: Value);
}

/// Cloneable handle that shuts the session down from any task.
#[derive(Clone, Debug)]
pub struct DestroyHandle(CancellationToken);

impl DestroyHandle {
    pub fn destroy(&self) {
        self.0.cancel();
    }

    pub fn is_destroyed(&self) -> bool {
        self.0.is_cancelled()
    }

    pub async fn destroyed(&self) {
        self.0.cancelled().await
    }
}

enum Step {
    Continue,
    End(SessionOutcome),
}

/// One logical gateway session over successive transport connections.
///
/// `connect` takes `&mut self`, so at most one connect cycle is ever in flight
/// and the stored session id has a single writer.
pub struct SessionConnection {
    cfg: GatewayConfig,
    transport: Arc<dyn GatewayTransport>,
    handler: Arc<dyn DispatchHandler>,
    sink: Arc<dyn EventSink>,
    state: watch::Sender<SessionState>,
    session_id: Option<SessionId>,
    seq: Option<u64>,
    reached_ready: bool,
    destroy: CancellationToken,
}

impl SessionConnection {
    pub fn new(
        cfg: GatewayConfig,
        transport: Arc<dyn GatewayTransport>,
        handler: Arc<dyn DispatchHandler>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Disconnected);
        Self {
            cfg,
            transport,
            handler,
            sink,
            state,
            session_id: None,
            seq: None,
            reached_ready: false,
            destroy: CancellationToken::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    /// Whether the last connect cycle got as far as `Ready`.
    pub fn reached_ready(&self) -> bool {
        self.reached_ready
    }

    pub fn backoff(&self) -> crate::config::Backoff {
        self.cfg.backoff
    }

    pub fn destroy_handle(&self) -> DestroyHandle {
        DestroyHandle(self.destroy.clone())
    }

    pub fn destroy(&self) {
        self.destroy.cancel();
    }

    /// Run one connect cycle: open the transport, identify or resume, then
    /// pump frames until the connection ends.
    pub async fn connect(&mut self) -> SessionOutcome {
        if self.destroy.is_cancelled() {
            self.set_state(SessionState::Closed);
            return SessionOutcome::Destroyed;
        }

        self.reached_ready = false;
        self.set_state(SessionState::Connecting);
        self.sink.publish(ClientEvent::Session(SessionEvent::Connecting {
            resuming: self.session_id.is_some(),
        }));
        tracing::info!(resuming = self.session_id.is_some(), "connecting to gateway");

        let destroy = self.destroy.clone();
        let opened = tokio::select! {
            _ = destroy.cancelled() => {
                self.set_state(SessionState::Closed);
                return SessionOutcome::Destroyed;
            }
            r = self.transport.connect(&self.cfg.url) => r,
        };

        let mut conn = match opened {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, "gateway connect failed");
                self.set_state(SessionState::Disconnected);
                return SessionOutcome::ConnectFailed(e.to_string());
            }
        };

        self.pump(conn.as_mut()).await
    }

    async fn pump(&mut self, conn: &mut dyn GatewayConnection) -> SessionOutcome {
        let destroy = self.destroy.clone();
        let mut heartbeat: Option<Interval> = None;
        let mut awaiting_ack = false;

        loop {
            tokio::select! {
                _ = destroy.cancelled() => {
                    let _ = conn.close(NORMAL_CLOSURE).await;
                    return self.on_close(NORMAL_CLOSURE, "destroyed", true);
                }
                _ = tick(&mut heartbeat) => {
                    if awaiting_ack {
                        tracing::warn!("heartbeat not acknowledged; reconnecting");
                        let _ = conn.close(RECONNECT_CLOSE_CODE).await;
                        return self.on_close(RECONNECT_CLOSE_CODE, "heartbeat ack missed", false);
                    }
                    awaiting_ack = true;
                    if let Step::End(outcome) = self.send(conn, Frame::heartbeat(self.seq)).await {
                        return outcome;
                    }
                }
                event = conn.recv() => match event {
                    TransportEvent::Closed { code, reason } => {
                        let intentional = destroy.is_cancelled();
                        return self.on_close(code, &reason, intentional);
                    }
                    TransportEvent::Frame(text) => {
                        let step = self
                            .on_frame(conn, &text, &mut heartbeat, &mut awaiting_ack)
                            .await;
                        if let Step::End(outcome) = step {
                            return outcome;
                        }
                    }
                },
            }
        }
    }

    async fn on_frame(
        &mut self,
        conn: &mut dyn GatewayConnection,
        text: &str,
        heartbeat: &mut Option<Interval>,
        awaiting_ack: &mut bool,
    ) -> Step {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring malformed gateway frame");
                return Step::Continue;
            }
        };
        if let Some(s) = frame.s {
            self.seq = Some(s);
        }

        match frame.op {
            OP_HELLO => {
                let period = Duration::from_millis(frame.heartbeat_interval_ms().unwrap_or(41_250));
                let mut iv = interval_at(Instant::now() + period, period);
                iv.set_missed_tick_behavior(MissedTickBehavior::Delay);
                *heartbeat = Some(iv);
                *awaiting_ack = false;

                let handshake = match &self.session_id {
                    Some(id) => {
                        self.set_state(SessionState::Resuming);
                        tracing::info!(session = %id.0, "resuming session");
                        Frame::resume(&self.cfg.token, id, self.seq)
                    }
                    None => {
                        self.set_state(SessionState::Identifying);
                        tracing::info!("identifying new session");
                        Frame::identify(&self.cfg.token, self.cfg.intents)
                    }
                };
                self.send(conn, handshake).await
            }
            OP_HEARTBEAT => self.send(conn, Frame::heartbeat(self.seq)).await,
            OP_HEARTBEAT_ACK => {
                *awaiting_ack = false;
                Step::Continue
            }
            OP_RECONNECT => {
                tracing::info!("server requested reconnect");
                let _ = conn.close(RECONNECT_CLOSE_CODE).await;
                Step::End(self.on_close(RECONNECT_CLOSE_CODE, "reconnect requested", false))
            }
            OP_INVALID_SESSION => {
                tracing::warn!("session invalidated; next connect identifies");
                self.set_state(SessionState::Invalid);
                self.session_id = None;
                self.seq = None;
                self.sink
                    .publish(ClientEvent::Session(SessionEvent::InvalidSession));
                let _ = conn.close(RECONNECT_CLOSE_CODE).await;
                self.set_state(SessionState::Disconnected);
                Step::End(SessionOutcome::InvalidSession)
            }
            OP_DISPATCH => {
                self.on_dispatch(frame.t.as_deref().unwrap_or_default(), frame.d);
                Step::Continue
            }
            other => {
                tracing::debug!(op = other, "ignoring gateway op");
                Step::Continue
            }
        }
    }

    fn on_dispatch(&mut self, name: &str, data: Value) {
        match name {
            "READY" => {
                let id = data
                    .get("session_id")
                    .and_then(Value::as_str)
                    .map(|s| SessionId(s.to_string()));
                match id {
                    Some(id) => {
                        tracing::info!(session = %id.0, "session ready");
                        self.session_id = Some(id.clone());
                        self.reached_ready = true;
                        self.set_state(SessionState::Ready);
                        self.sink.publish(ClientEvent::Session(SessionEvent::Ready {
                            session_id: id,
                        }));
                    }
                    None => tracing::warn!("READY without session_id"),
                }
            }
            "RESUMED" => {
                tracing::info!("session resumed");
                self.reached_ready = true;
                self.set_state(SessionState::Ready);
                self.sink.publish(ClientEvent::Session(SessionEvent::Resumed));
            }
            _ => self.handler.on_dispatch(name, data),
        }
    }

    async fn send(&mut self, conn: &mut dyn GatewayConnection, frame: Frame) -> Step {
        let text = match serde_json::to_string(&frame) {
            Ok(t) => t,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode gateway frame");
                return Step::Continue;
            }
        };
        match conn.send(text).await {
            Ok(()) => Step::Continue,
            Err(e) => {
                tracing::warn!(error = %e, op = frame.op, "gateway send failed");
                let _ = conn.close(RECONNECT_CLOSE_CODE).await;
                Step::End(self.on_close(ABNORMAL_CLOSURE, "send failed", false))
            }
        }
    }

    fn on_close(&mut self, code: u16, reason: &str, intentional: bool) -> SessionOutcome {
        match classify_close(code, intentional) {
            CloseClassification::Normal => {
                tracing::info!("gateway session closed");
                self.set_state(SessionState::Closed);
                SessionOutcome::Destroyed
            }
            CloseClassification::Unrecoverable => {
                tracing::error!(code, reason, "gateway closed with unrecoverable code");
                self.set_state(SessionState::Closed);
                SessionOutcome::Fatal {
                    code,
                    reason: reason.to_string(),
                }
            }
            CloseClassification::Unresumable => {
                tracing::warn!(code, reason, "gateway closed; session cannot be resumed");
                self.session_id = None;
                self.seq = None;
                self.disconnected(code)
            }
            CloseClassification::Recoverable => {
                tracing::warn!(code, reason, "gateway closed");
                self.disconnected(code)
            }
        }
    }

    fn disconnected(&mut self, code: u16) -> SessionOutcome {
        let resumable = self.session_id.is_some();
        self.set_state(SessionState::Disconnected);
        self.sink
            .publish(ClientEvent::Session(SessionEvent::Disconnected { code, resumable }));
        SessionOutcome::Disconnected { code, resumable }
    }

    fn set_state(&self, next: SessionState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            tracing::debug!(?prev, ?next, "session state");
        }
    }
}

async fn tick(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(iv) => {
            iv.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::testing::*;
    use serde_json::json;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn identifies_then_resumes_after_recoverable_close() {
        let transport = FakeTransport::new(vec![
            vec![hello(45_000), ready("abc", 1), closed(4000)],
            vec![hello(45_000), resumed(2), closed(4004)],
        ]);
        let (mut conn, sink, _) = session(transport.clone());

        let outcome = conn.connect().await;
        assert_eq!(
            outcome,
            SessionOutcome::Disconnected {
                code: 4000,
                resumable: true
            }
        );
        assert_eq!(conn.state(), SessionState::Disconnected);
        assert_eq!(conn.session_id(), Some(&SessionId("abc".to_string())));
        assert!(conn.reached_ready());

        let outcome = conn.connect().await;
        assert!(matches!(outcome, SessionOutcome::Fatal { code: 4004, .. }));
        assert_eq!(conn.state(), SessionState::Closed);

        let sent = transport.sent_ops();
        assert_eq!(sent, vec![OP_IDENTIFY, OP_RESUME]);
        let resume = &transport.sent()[1];
        assert_eq!(resume.d["session_id"], json!("abc"));
        assert_eq!(resume.d["seq"], json!(1));

        let events = sink.session_events();
        assert!(events.contains(&SessionEvent::Ready {
            session_id: SessionId("abc".to_string())
        }));
        assert!(events.contains(&SessionEvent::Resumed));
    }

    #[tokio::test(start_paused = true)]
    async fn unresumable_close_forces_fresh_identify() {
        let transport = FakeTransport::new(vec![
            vec![hello(45_000), ready("abc", 1), closed(4007)],
            vec![hello(45_000), closed(4000)],
        ]);
        let (mut conn, _, _) = session(transport.clone());

        let outcome = conn.connect().await;
        assert_eq!(
            outcome,
            SessionOutcome::Disconnected {
                code: 4007,
                resumable: false
            }
        );
        assert_eq!(conn.session_id(), None);

        conn.connect().await;
        assert_eq!(transport.sent_ops(), vec![OP_IDENTIFY, OP_IDENTIFY]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_session_during_resume_clears_session() {
        let transport = FakeTransport::new(vec![
            vec![hello(45_000), ready("abc", 1), closed(1001)],
            vec![hello(45_000), invalid_session()],
            vec![hello(45_000), closed(4000)],
        ]);
        let (mut conn, sink, _) = session(transport.clone());

        conn.connect().await;
        let outcome = conn.connect().await;
        assert_eq!(outcome, SessionOutcome::InvalidSession);
        assert_eq!(conn.state(), SessionState::Disconnected);
        assert_eq!(conn.session_id(), None);
        assert!(sink.session_events().contains(&SessionEvent::InvalidSession));

        conn.connect().await;
        assert_eq!(
            transport.sent_ops(),
            vec![OP_IDENTIFY, OP_RESUME, OP_IDENTIFY]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn far_end_normal_close_is_recoverable() {
        let transport =
            FakeTransport::new(vec![vec![hello(45_000), ready("abc", 1), closed(1000)]]);
        let (mut conn, _, _) = session(transport);

        assert_eq!(
            conn.connect().await,
            SessionOutcome::Disconnected {
                code: 1000,
                resumable: true
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_request_closes_and_keeps_session() {
        let transport = FakeTransport::new(vec![vec![
            hello(45_000),
            ready("abc", 1),
            frame(json!({"op": 7, "d": null})),
        ]]);
        let (mut conn, _, _) = session(transport.clone());

        assert_eq!(
            conn.connect().await,
            SessionOutcome::Disconnected {
                code: 4000,
                resumable: true
            }
        );
        assert_eq!(transport.closes(), vec![4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn heartbeats_on_interval_and_answers_server_requests() {
        let transport = FakeTransport::new(vec![vec![
            hello(1_000),
            ready("abc", 5),
            frame(json!({"op": 1, "d": null})),
        ]]);
        let (mut conn, _, _) = session(transport.clone());

        // No ACKs arrive: beat at 1s, zombie at 2s.
        let started = Instant::now();
        let outcome = conn.connect().await;
        assert_eq!(started.elapsed(), Duration::from_millis(2_000));
        assert_eq!(
            outcome,
            SessionOutcome::Disconnected {
                code: 4000,
                resumable: true
            }
        );
        assert_eq!(
            transport.sent_ops(),
            vec![OP_IDENTIFY, OP_HEARTBEAT, OP_HEARTBEAT]
        );
        assert_eq!(transport.sent()[2].d, json!(5));
        assert_eq!(transport.closes(), vec![4000]);
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledged_heartbeats_keep_connection_alive() {
        let transport = FakeTransport::new(vec![vec![
            hello(1_000),
            ready("abc", 1),
            delayed(1_500, json!({"op": 11})),
            delayed(2_500, json!({"op": 11})),
            closed_after(2_800, 4000),
        ]]);
        let (mut conn, _, _) = session(transport.clone());

        let outcome = conn.connect().await;
        assert_eq!(
            outcome,
            SessionOutcome::Disconnected {
                code: 4000,
                resumable: true
            }
        );
        assert_eq!(
            transport.sent_ops(),
            vec![OP_IDENTIFY, OP_HEARTBEAT, OP_HEARTBEAT]
        );
        assert!(transport.closes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn forwards_other_dispatches() {
        let transport = FakeTransport::new(vec![vec![
            hello(45_000),
            ready("abc", 1),
            frame(json!({"op": 0, "t": "GUILD_CREATE", "s": 2, "d": {"id": "9"}})),
            closed(4000),
        ]]);
        let (mut conn, _, handler) = session(transport);

        conn.connect().await;
        assert_eq!(
            handler.dispatches(),
            vec![("GUILD_CREATE".to_string(), json!({"id": "9"}))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn destroy_closes_normally_and_is_terminal() {
        let transport = FakeTransport::new(vec![vec![hello(45_000), ready("abc", 1)]]);
        let (mut conn, _, _) = session(transport.clone());

        let handle = conn.destroy_handle();
        tokio::spawn(async move {
            sleep(Duration::from_millis(10)).await;
            handle.destroy();
        });

        assert_eq!(conn.connect().await, SessionOutcome::Destroyed);
        assert_eq!(conn.state(), SessionState::Closed);
        assert_eq!(transport.closes(), vec![1000]);

        // Terminal: no new transport is opened.
        assert_eq!(conn.connect().await, SessionOutcome::Destroyed);
        assert_eq!(transport.connects(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failure_is_reported() {
        let transport = FakeTransport::new(vec![]);
        let (mut conn, _, _) = session(transport);

        assert!(matches!(
            conn.connect().await,
            SessionOutcome::ConnectFailed(_)
        ));
        assert_eq!(conn.state(), SessionState::Disconnected);
    }
}
