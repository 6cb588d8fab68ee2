//! Gateway session lifecycle: handshake, heartbeat, close classification and
//! reconnect supervision.

pub mod close;
pub mod connection;
pub mod protocol;
pub mod supervisor;

use std::sync::Arc;

use serde_json::Value;

use crate::{
    events::ClientEvent,
    interaction::{InteractionDispatcher, RawInteraction},
    ports::EventSink,
};

pub use close::{classify_close, CloseClassification};
pub use connection::{
    DestroyHandle, DispatchHandler, SessionConnection, SessionOutcome, SessionState,
};
pub use supervisor::ReconnectSupervisor;

/// Routes `INTERACTION_CREATE` to the interaction dispatcher and forwards
/// everything else to the event sink.
pub struct GatewayDispatch {
    dispatcher: Arc<InteractionDispatcher>,
    sink: Arc<dyn EventSink>,
}

impl GatewayDispatch {
    pub fn new(dispatcher: Arc<InteractionDispatcher>, sink: Arc<dyn EventSink>) -> Self {
        Self { dispatcher, sink }
    }
}

impl DispatchHandler for GatewayDispatch {
    fn on_dispatch(&self, name: &str, data: Value) {
        if name != "INTERACTION_CREATE" {
            self.sink.publish(ClientEvent::Dispatch {
                name: name.to_string(),
                data,
            });
            return;
        }

        let raw: RawInteraction = match serde_json::from_value(data) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "malformed INTERACTION_CREATE payload");
                return;
            }
        };
        // The session loop must keep heartbeating while the deadline runs.
        let dispatcher = self.dispatcher.clone();
        tokio::spawn(async move {
            if let Err(e) = dispatcher.handle_from_gateway(raw).await {
                tracing::warn!(error = %e, "gateway interaction failed");
            }
        });
    }
}


#[cfg(test)]
mod tests {
    use super::testing::RecordingSink;
    use super::*;
    use crate::{
        config::InteractionConfig,
        domain::Snowflake,
        interaction::{delivery::tests::FakeHttp, DeliveryRouter},
        ports::Method,
    };
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn interaction_create_is_answered_via_callback() {
        let http = Arc::new(FakeHttp::default());
        let router = Arc::new(DeliveryRouter::new(http.clone(), Some(Snowflake::from("5"))));
        let sink = Arc::new(RecordingSink::default());
        let dispatcher = Arc::new(InteractionDispatcher::new(
            InteractionConfig::default(),
            sink.clone(),
            router,
        ));
        let gateway = GatewayDispatch::new(dispatcher, sink.clone());

        gateway.on_dispatch(
            "INTERACTION_CREATE",
            json!({"type": 1, "id": "10", "token": "tk"}),
        );
        tokio::time::sleep(Duration::from_millis(1)).await;

        let calls = http.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, Method::Post);
        assert_eq!(calls[0].path, "/interactions/10/tk/callback");
        assert_eq!(calls[0].body, Some(json!({"type": 1})));
    }

    #[tokio::test]
    async fn other_dispatches_reach_the_sink() {
        let sink = Arc::new(RecordingSink::default());
        let router = Arc::new(DeliveryRouter::new(Arc::new(FakeHttp::default()), None));
        let dispatcher = Arc::new(InteractionDispatcher::new(
            InteractionConfig::default(),
            sink.clone(),
            router,
        ));
        let gateway = GatewayDispatch::new(dispatcher, sink.clone());

        gateway.on_dispatch("MESSAGE_CREATE", json!({"id": "1"}));
        assert!(sink.session_events().is_empty());
        assert_eq!(sink.0.lock().unwrap().len(), 1);
    }
}
