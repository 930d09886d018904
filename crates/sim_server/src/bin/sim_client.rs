use clap::Parser;
use sim_net::{NatsConnection, NatsPeer, NetEvent};
use sim_server::{ClientConfig, Flow, GameClient, TickLoop, build_dependencies, load_prototypes};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ClientConfig::parse();
    let prototypes = load_prototypes(config.prototypes.as_deref())?;
    let tick_config = config.tick_config();
    let username = config.username.clone();

    let connection = NatsConnection::open(config.nats_url.as_deref()).await?;
    let peer = NatsPeer::client(connection, &config.prefix)
        .await
        .with_connect_timeout(config.connect_timeout());

    let deps = build_dependencies(config, prototypes)?;
    let mut client = GameClient::new(Box::new(peer), &deps)?;
    client.connect(&username)?;
    info!(%username, "connecting");

    let mut tick_loop = TickLoop::new(tick_config);
    let mut last_count = None;
    let reason = tick_loop
        .run(|| {
            for event in client.tick() {
                match event {
                    NetEvent::ConnectFailed { reason } => anyhow::bail!("connection failed: {reason}"),
                    NetEvent::Disconnected { reason, .. } => {
                        info!(%reason, "server closed the connection");
                        return Ok(Flow::Stop);
                    }
                    NetEvent::Connected { .. } => {}
                }
            }
            let count = client.world().entity_count();
            if last_count != Some(count) {
                info!(
                    entities = count,
                    tick = client.world().last_applied_tick(),
                    "replica updated"
                );
                last_count = Some(count);
            }
            Ok(Flow::Continue)
        })
        .await?;

    client.disconnect("client shutting down");
    info!(?reason, ticks = tick_loop.ticks_run(), "client stopped");
    Ok(())
}
