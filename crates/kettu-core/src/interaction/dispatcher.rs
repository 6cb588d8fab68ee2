use std::sync::Arc;

use serde_json::Value;

use crate::{config::InteractionConfig, events::ClientEvent, ports::EventSink, Result};

use super::{
    command::CommandInteraction,
    delivery::{self, DeliveryRouter, InBandDone},
    envelope::{InteractionEnvelope, InteractionKind, InteractionResult, RawInteraction},
    responder::{self, InteractionResponder, SettledBy},
};

/// Turns raw interaction payloads into exactly one result each.
///
/// Every invocation owns its own slot and timer, so concurrent dispatches
/// never share mutable state.
pub struct InteractionDispatcher {
    cfg: InteractionConfig,
    sink: Arc<dyn EventSink>,
    router: Arc<DeliveryRouter>,
}

/// Expires the interaction if the caller stops waiting before it settles, so
/// a later reply is sent as a follow-up.
struct ExpireOnDrop(InteractionResponder);

impl Drop for ExpireOnDrop {
    fn drop(&mut self) {
        self.0.expire();
    }
}

impl InteractionDispatcher {
    pub fn new(
        cfg: InteractionConfig,
        sink: Arc<dyn EventSink>,
        router: Arc<DeliveryRouter>,
    ) -> Self {
        Self { cfg, sink, router }
    }

    pub fn router(&self) -> &Arc<DeliveryRouter> {
        &self.router
    }

    /// Parse and dispatch a JSON payload.
    pub async fn dispatch_value(&self, payload: Value) -> Result<InteractionResult> {
        let raw: RawInteraction = serde_json::from_value(payload)?;
        self.dispatch(raw).await
    }

    /// Resolve one interaction.
    ///
    /// Probes resolve immediately with `Pong`. Commands publish one
    /// `InteractionCreate` event, then wait for the application to settle or
    /// for the deadline fallback, whichever comes first. The returned result
    /// is the caller's to transmit; follow-ups wait until this returns.
    pub async fn dispatch(&self, raw: RawInteraction) -> Result<InteractionResult> {
        let (_in_band, done) = delivery::in_band_gate();
        self.resolve(raw, done).await
    }

    /// Gateway path: resolve, then deliver the result through the callback
    /// endpoint. Follow-ups for the same interaction wait for the callback.
    pub async fn handle_from_gateway(&self, raw: RawInteraction) -> Result<()> {
        let id = raw.id.clone();
        let token = raw.token.clone();
        let (in_band, done) = delivery::in_band_gate();
        let result = self.resolve(raw, done).await?;
        let sent = self.router.respond_via_callback(&id, &token, &result).await;
        drop(in_band);
        sent
    }

    async fn resolve(&self, raw: RawInteraction, in_band: InBandDone) -> Result<InteractionResult> {
        let envelope = InteractionEnvelope::classify(raw)?;

        let data = match envelope.kind {
            InteractionKind::Probe => {
                tracing::debug!(id = %envelope.id, "probe interaction");
                return Ok(InteractionResult::Pong);
            }
            InteractionKind::Command(data) => data,
        };

        let (responder, settled) =
            responder::arm(self.cfg.response_deadline, InteractionResult::fallback());
        let _expire = ExpireOnDrop(responder.clone());

        tracing::debug!(id = %envelope.id, command = %data.name, "command interaction");
        let interaction = CommandInteraction::new(
            envelope.id.clone(),
            envelope.token,
            envelope.channel_id,
            envelope.guild_id,
            envelope.member,
            data,
            responder,
            self.router.clone(),
            in_band,
        );
        self.sink.publish(ClientEvent::InteractionCreate(interaction));

        match settled.await {
            Ok(s) => {
                if s.by == SettledBy::Timeout {
                    tracing::debug!(id = %envelope.id, "deadline fallback sent");
                }
                Ok(s.result)
            }
            // The slot owns the sender until it settles, so this is unreachable
            // in practice; answer with the fallback rather than not at all.
            Err(_) => Ok(InteractionResult::fallback()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::Snowflake,
        errors::Error,
        interaction::{delivery::tests::FakeHttp, ReplyDelivery},
        ports::{HttpPort, HttpRequest},
    };
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    /// Runs a closure against every published interaction, on its own task.
    struct ScriptedApp {
        published: Mutex<usize>,
        on_interaction: Box<dyn Fn(CommandInteraction) + Send + Sync>,
    }

    impl EventSink for ScriptedApp {
        fn publish(&self, event: ClientEvent) {
            *self.published.lock().unwrap() += 1;
            if let ClientEvent::InteractionCreate(i) = event {
                (self.on_interaction)(i);
            }
        }
    }

    /// Holds callback POSTs for 500 ms and records when each request ends.
    #[derive(Default)]
    struct SlowCallbackHttp {
        finished: Mutex<Vec<(String, Instant)>>,
    }

    #[async_trait]
    impl HttpPort for SlowCallbackHttp {
        async fn request(&self, req: HttpRequest) -> Result<Value> {
            if req.path.ends_with("/callback") {
                sleep(Duration::from_millis(500)).await;
            }
            self.finished.lock().unwrap().push((req.path, Instant::now()));
            Ok(Value::Null)
        }
    }

    fn setup(
        http: Arc<FakeHttp>,
        on_interaction: impl Fn(CommandInteraction) + Send + Sync + 'static,
    ) -> (InteractionDispatcher, Arc<ScriptedApp>) {
        let deadline = InteractionConfig::default().response_deadline;
        setup_with_deadline(http, deadline, on_interaction)
    }

    fn setup_with_deadline(
        http: Arc<dyn HttpPort>,
        response_deadline: Duration,
        on_interaction: impl Fn(CommandInteraction) + Send + Sync + 'static,
    ) -> (InteractionDispatcher, Arc<ScriptedApp>) {
        let app = Arc::new(ScriptedApp {
            published: Mutex::new(0),
            on_interaction: Box::new(on_interaction),
        });
        let router = Arc::new(DeliveryRouter::new(http, Some(Snowflake::from("42"))));
        let cfg = InteractionConfig { response_deadline };
        let dispatcher = InteractionDispatcher::new(cfg, app.clone(), router);
        (dispatcher, app)
    }

    fn command() -> Value {
        json!({
            "type": 2,
            "id": "100",
            "token": "tok",
            "data": {"id": "5", "name": "echo"}
        })
    }

    #[tokio::test(start_paused = true)]
    async fn probe_resolves_immediately_without_event() {
        let http = Arc::new(FakeHttp::default());
        let (dispatcher, app) = setup(http.clone(), |_| panic!("no event expected"));

        let started = Instant::now();
        let result = dispatcher
            .dispatch_value(json!({"type": 1, "id": "1", "token": "t"}))
            .await
            .unwrap();

        assert_eq!(result, InteractionResult::Pong);
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(*app.published.lock().unwrap(), 0);
        assert!(http.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_kind_fails_without_event() {
        let (dispatcher, app) = setup(Arc::new(FakeHttp::default()), |_| {});

        let err = dispatcher
            .dispatch_value(json!({"type": 9, "id": "1", "token": "t"}))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::UnsupportedInteraction(_)));
        assert_eq!(*app.published.lock().unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_application_gets_fallback_at_deadline() {
        let http = Arc::new(FakeHttp::default());
        let (dispatcher, app) = setup(http.clone(), |_| {});

        let started = Instant::now();
        let result = dispatcher.dispatch_value(command()).await.unwrap();

        assert_eq!(result, InteractionResult::Acknowledge { hidden: false });
        assert_eq!(serde_json::to_value(&result).unwrap(), json!({"type": 5}));
        assert!(started.elapsed() >= Duration::from_millis(250));
        assert_eq!(*app.published.lock().unwrap(), 1);
        assert!(http.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_fires_at_configured_deadline() {
        let http = Arc::new(FakeHttp::default());
        let deadline = Duration::from_millis(1000);
        let (dispatcher, _app) = setup_with_deadline(http.clone(), deadline, |_| {});

        let started = Instant::now();
        let result = dispatcher.dispatch_value(command()).await.unwrap();

        assert_eq!(result, InteractionResult::fallback());
        assert_eq!(started.elapsed(), Duration::from_millis(1000));
        assert!(http.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn longer_deadline_keeps_slow_reply_in_band() {
        let http = Arc::new(FakeHttp::default());
        let deadline = Duration::from_millis(1000);
        let (dispatcher, _app) = setup_with_deadline(http.clone(), deadline, |i| {
            tokio::spawn(async move {
                sleep(Duration::from_millis(600)).await;
                let delivery = i.reply("slow", false).await.unwrap();
                assert_eq!(delivery, ReplyDelivery::InBand);
            });
        });

        let result = dispatcher.dispatch_value(command()).await.unwrap();
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"type": 4, "data": {"content": "slow"}})
        );
        assert!(http.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn early_reply_is_delivered_in_band() {
        let http = Arc::new(FakeHttp::default());
        let (dispatcher, _app) = setup(http.clone(), |i| {
            tokio::spawn(async move {
                sleep(Duration::from_millis(50)).await;
                let delivery = i.reply("hi", false).await.unwrap();
                assert_eq!(delivery, ReplyDelivery::InBand);
            });
        });

        let started = Instant::now();
        let result = dispatcher.dispatch_value(command()).await.unwrap();

        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({"type": 4, "data": {"content": "hi"}})
        );
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50) && elapsed < Duration::from_millis(250));

        sleep(Duration::from_secs(1)).await;
        assert!(http.calls().is_empty(), "no follow-up for an in-band reply");
    }

    #[tokio::test(start_paused = true)]
    async fn late_reply_goes_out_of_band() {
        let http = Arc::new(FakeHttp::default());
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let seen = deliveries.clone();
        let (dispatcher, _app) = setup(http.clone(), move |i| {
            let seen = seen.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(400)).await;
                let d = i.reply("hi", false).await.unwrap();
                seen.lock().unwrap().push(d);
            });
        });

        let result = dispatcher.dispatch_value(command()).await.unwrap();
        assert_eq!(result, InteractionResult::fallback());
        assert!(http.calls().is_empty());

        sleep(Duration::from_millis(500)).await;
        assert_eq!(*deliveries.lock().unwrap(), vec![ReplyDelivery::FollowUp]);
        let calls = http.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/webhooks/42/tok");
        assert_eq!(calls[0].body, Some(json!({"content": "hi"})));
    }

    #[tokio::test(start_paused = true)]
    async fn reply_after_caller_stops_waiting_goes_out_of_band() {
        let http = Arc::new(FakeHttp::default());
        let parked = Arc::new(Mutex::new(None));
        let slot = parked.clone();
        let (dispatcher, _app) = setup(http.clone(), move |i| {
            *slot.lock().unwrap() = Some(i);
        });

        let waited =
            tokio::time::timeout(Duration::from_millis(10), dispatcher.dispatch_value(command()))
                .await;
        assert!(waited.is_err(), "dispatch should still be pending");

        let interaction = parked.lock().unwrap().take().unwrap();
        let delivery = interaction.reply("hi", false).await.unwrap();
        assert_eq!(delivery, ReplyDelivery::FollowUp);

        let calls = http.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/webhooks/42/tok");
        assert_eq!(calls[0].body, Some(json!({"content": "hi"})));

        // The deadline timer no longer runs for the abandoned interaction.
        sleep(Duration::from_secs(1)).await;
        assert!(!interaction.responder().has_fired());
    }

    #[tokio::test(start_paused = true)]
    async fn acknowledge_then_reply_has_no_second_effect() {
        let http = Arc::new(FakeHttp::default());
        let deliveries = Arc::new(Mutex::new(Vec::new()));
        let seen = deliveries.clone();
        let (dispatcher, _app) = setup(http.clone(), move |i| {
            let seen = seen.clone();
            tokio::spawn(async move {
                i.acknowledge(true);
                i.acknowledge(false);
                let d = i.reply("later", false).await.unwrap();
                seen.lock().unwrap().push(d);
            });
        });

        let result = dispatcher.dispatch_value(command()).await.unwrap();
        assert_eq!(result, InteractionResult::Acknowledge { hidden: true });

        sleep(Duration::from_secs(1)).await;
        assert_eq!(*deliveries.lock().unwrap(), vec![ReplyDelivery::Ignored]);
        assert!(http.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_envelopes_resolve_independently() {
        let http = Arc::new(FakeHttp::default());
        let (dispatcher, _app) = setup(http.clone(), |i| {
            if i.id.as_str() == "1" {
                i.acknowledge(true);
            }
        });
        let a = json!({"type": 2, "id": "1", "token": "a", "data": {"id": "5", "name": "x"}});
        let b = json!({"type": 2, "id": "2", "token": "b", "data": {"id": "5", "name": "x"}});

        let (ra, rb) = tokio::join!(dispatcher.dispatch_value(a), dispatcher.dispatch_value(b));
        assert_eq!(ra.unwrap(), InteractionResult::Acknowledge { hidden: true });
        assert_eq!(rb.unwrap(), InteractionResult::fallback());
    }

    #[tokio::test(start_paused = true)]
    async fn gateway_path_posts_callback() {
        let http = Arc::new(FakeHttp::default());
        let (dispatcher, _app) = setup(http.clone(), |i| {
            i.acknowledge(false);
        });

        let raw: RawInteraction = serde_json::from_value(command()).unwrap();
        dispatcher.handle_from_gateway(raw).await.unwrap();

        let calls = http.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].path, "/interactions/100/tok/callback");
        assert_eq!(calls[0].body, Some(json!({"type": 5})));
    }

    #[tokio::test(start_paused = true)]
    async fn follow_up_waits_for_gateway_callback() {
        let http = Arc::new(SlowCallbackHttp::default());
        let deadline = Duration::from_millis(250);
        let (dispatcher, _app) = setup_with_deadline(http.clone(), deadline, |i| {
            tokio::spawn(async move {
                sleep(Duration::from_millis(300)).await;
                let delivery = i.reply("late", false).await.unwrap();
                assert_eq!(delivery, ReplyDelivery::FollowUp);
            });
        });

        let started = Instant::now();
        let raw: RawInteraction = serde_json::from_value(command()).unwrap();
        dispatcher.handle_from_gateway(raw).await.unwrap();
        sleep(Duration::from_millis(100)).await;

        let finished = http.finished.lock().unwrap().clone();
        let paths: Vec<_> = finished.iter().map(|(p, _)| p.as_str()).collect();
        assert_eq!(paths, vec!["/interactions/100/tok/callback", "/webhooks/42/tok"]);
        // Callback starts at the deadline and takes 500 ms.
        assert_eq!(finished[0].1 - started, Duration::from_millis(750));
        assert!(finished[1].1 >= finished[0].1);
    }
}
