use clap::Parser;
use sim_net::{NatsConnection, NatsPeer};
use sim_server::{Flow, GameServer, ServerConfig, TickLoop, build_dependencies, load_prototypes};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = ServerConfig::parse();
    let prototypes = load_prototypes(config.prototypes.as_deref())?;
    let tick_config = config.tick_config();

    let connection = NatsConnection::open(config.nats_url.as_deref()).await?;
    let peer = NatsPeer::server(connection, &config.prefix).await?;
    info!(prefix = %config.prefix, "listening for clients");

    let deps = build_dependencies(config, prototypes)?;
    let mut server = GameServer::new(Box::new(peer), &deps)?;
    let map = server.world_mut().maps_mut().create_map(None)?;
    info!(%map, "created default map");
    server.startup()?;

    let mut tick_loop = TickLoop::new(tick_config);
    let reason = tick_loop
        .run(|| {
            server.tick();
            Ok(Flow::Continue)
        })
        .await?;

    server.shutdown("server shutting down");
    info!(?reason, ticks = tick_loop.ticks_run(), "server stopped");
    Ok(())
}
