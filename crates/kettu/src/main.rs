use std::sync::Arc;

use kettu_core::{
    config::Config,
    events::ChannelSink,
    gateway::{GatewayDispatch, ReconnectSupervisor, SessionConnection},
    interaction::{DeliveryRouter, InteractionDispatcher},
    logging::{self, mask_token},
    ports::{EventSink, HttpPort},
};
use kettu_gateway::WsTransport;
use kettu_rest::RestClient;

mod app;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    logging::init("kettu")?;

    let cfg = Arc::new(Config::load()?);
    tracing::info!(token = %mask_token(&cfg.token), "starting kettu");

    let http: Arc<dyn HttpPort> = Arc::new(RestClient::from_config(&cfg)?);
    let (sink, events) = ChannelSink::new();
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let router = Arc::new(DeliveryRouter::new(http.clone(), cfg.application_id.clone()));
    let dispatcher = Arc::new(InteractionDispatcher::new(
        cfg.interactions(),
        sink.clone(),
        router,
    ));

    let connection = SessionConnection::new(
        cfg.gateway(),
        Arc::new(WsTransport::new()),
        Arc::new(GatewayDispatch::new(dispatcher.clone(), sink.clone())),
        sink.clone(),
    );
    let supervisor = ReconnectSupervisor::new(connection, sink);
    let destroy = supervisor.destroy_handle();

    if let (Some(addr), Some(public_key)) = (cfg.webhook_addr, cfg.public_key.as_deref()) {
        let handler = kettu_webhook::handler(public_key, dispatcher)?;
        let stop = destroy.clone();
        tokio::spawn(async move {
            let shutdown = async move { stop.destroyed().await };
            if let Err(e) = kettu_webhook::serve(addr, handler, shutdown).await {
                tracing::error!(error = %e, "webhook front stopped");
            }
        });
    }

    app::register_commands(http).await;
    tokio::spawn(app::run(events));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            destroy.destroy();
        }
    });

    supervisor.run().await?;
    Ok(())
}
