//! The game server.
//!
//! [`GameServer`] ties the transport to the authoritative world. Each tick
//! it:
//!
//! 1. processes incoming packets (connections, acks, info requests),
//! 2. advances the world one step and runs the systems,
//! 3. sends every in-game session the delta from its acknowledged tick,
//! 4. drops deletion history no session can still need.

use std::sync::Arc;

use sim_component::{ComponentFactory, Tick};
use sim_net::{ConnectionId, MsgServerInfo, MsgServerInfoReq, NetChannel, NetError, NetEvent, NetManager, NetPeer};
use sim_world::{
    Dependencies, EntityEvent, EntityManager, EntitySystemManager, MsgState, MsgStateAck, PhysicsSystem,
    PrototypeIndex, ServerEntityManager,
};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::GameError;
use crate::session::SessionRegistry;

/// State reachable from message handlers.
#[derive(Debug, Default)]
pub struct ServerContext {
    sessions: SessionRegistry,
    info_requests: Vec<ConnectionId>,
    current_tick: Tick,
}

/// Authoritative server: network, world, systems and sessions.
#[derive(Debug)]
pub struct GameServer {
    net: NetManager<ServerContext>,
    ctx: ServerContext,
    world: ServerEntityManager,
    systems: EntitySystemManager,
    events: Vec<EntityEvent>,
    config: Arc<ServerConfig>,
}

impl GameServer {
    /// Build a server on `peer`. Resolves [`ServerConfig`],
    /// [`ComponentFactory`] and [`PrototypeIndex`] from `deps`.
    ///
    /// # Errors
    ///
    /// Fails if a dependency is missing or message registration clashes.
    pub fn new(peer: Box<dyn NetPeer>, deps: &Dependencies) -> Result<Self, GameError> {
        let config = deps.resolve::<ServerConfig>()?;
        let factory = deps.resolve::<ComponentFactory>()?;
        let prototypes = deps.resolve::<PrototypeIndex>()?;

        let world = ServerEntityManager::from_manager(
            EntityManager::new(factory, prototypes).with_move_threshold(config.move_threshold),
        );
        let mut net = NetManager::server(peer, config.max_players);
        register_messages(&mut net)?;

        let mut systems = EntitySystemManager::new();
        systems.register(PhysicsSystem::new());

        Ok(Self {
            net,
            ctx: ServerContext::default(),
            world,
            systems,
            events: Vec::new(),
            config,
        })
    }

    #[must_use]
    pub fn world(&self) -> &ServerEntityManager {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut ServerEntityManager {
        &mut self.world
    }

    pub fn systems_mut(&mut self) -> &mut EntitySystemManager {
        &mut self.systems
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionRegistry {
        &self.ctx.sessions
    }

    #[must_use]
    pub fn net(&self) -> &NetManager<ServerContext> {
        &self.net
    }

    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.world.current_tick()
    }

    /// Entity events raised during the last tick.
    #[must_use]
    pub fn events(&self) -> &[EntityEvent] {
        &self.events
    }

    /// Start the world and initialize the systems.
    ///
    /// # Errors
    ///
    /// Returns the first system initialization failure.
    pub fn startup(&mut self) -> Result<(), GameError> {
        self.world.startup();
        self.systems.initialize(&mut self.world)?;
        info!(
            server = %self.config.server_name,
            max_players = self.config.max_players,
            entities = self.world.entity_count(),
            "game server started"
        );
        Ok(())
    }

    /// Run one server tick. Returns the new tick.
    pub fn tick(&mut self) -> Tick {
        self.process_network();
        let tick = self.world.update(&mut self.systems, self.config.frame_time());
        self.ctx.current_tick = tick;
        self.events = self.world.drain_events();
        self.broadcast_states();
        self.cull_history();
        tick
    }

    fn process_network(&mut self) {
        self.ctx.current_tick = self.world.current_tick();
        for event in self.net.process_packets(&mut self.ctx) {
            match event {
                NetEvent::Connected { conn, session } => {
                    self.ctx.sessions.connect(conn, session);
                    self.ctx.sessions.join_game(conn);
                }
                NetEvent::Disconnected { conn, reason, .. } => {
                    self.ctx.sessions.disconnect(conn);
                    debug!(%conn, %reason, "channel closed");
                }
                NetEvent::ConnectFailed { reason } => warn!(%reason, "unexpected connect failure on server"),
            }
        }

        for conn in std::mem::take(&mut self.ctx.info_requests) {
            let Some(player) = self.ctx.sessions.get(conn) else {
                continue;
            };
            let info = MsgServerInfo {
                server_name: self.config.server_name.clone(),
                max_players: u32::try_from(self.config.max_players).unwrap_or(u32::MAX),
                session: player.session,
            };
            if let Err(e) = self.net.server_send_message(conn, &info) {
                warn!(%conn, error = %e, "failed to send server info");
            }
        }
    }

    fn broadcast_states(&mut self) {
        for (conn, cursor) in self.ctx.sessions.in_game() {
            let state = match self.world.get_game_state(cursor) {
                Ok(state) => state,
                Err(e) => {
                    error!(%conn, cursor, error = %e, "failed to build game state");
                    continue;
                }
            };
            if let Err(e) = self.net.server_send_message(conn, &MsgState { state }) {
                warn!(%conn, error = %e, "failed to send game state");
            }
        }
    }

    fn cull_history(&mut self) {
        let to_tick = match self.ctx.sessions.min_cursor() {
            Some(0) => return,
            Some(cursor) => cursor - 1,
            None => self.world.current_tick(),
        };
        self.world.cull_deletion_history(to_tick);
    }

    /// Disconnect everyone and tear the world down.
    pub fn shutdown(&mut self, reason: &str) {
        self.net.shutdown(reason);
        self.systems.shutdown();
        self.world.shutdown();
        info!(reason, "game server shut down");
    }
}

fn register_messages(net: &mut NetManager<ServerContext>) -> Result<(), NetError> {
    net.register_net_message::<MsgStateAck, _>(|ctx: &mut ServerContext, channel: &NetChannel, msg: MsgStateAck| {
        if msg.tick > ctx.current_tick {
            warn!(conn = %channel.connection(), tick = msg.tick, current = ctx.current_tick, "ack from the future");
            return;
        }
        ctx.sessions.acknowledge(channel.connection(), msg.tick);
    })?;
    net.register_net_message::<MsgServerInfoReq, _>(|ctx: &mut ServerContext, channel: &NetChannel, _| {
        ctx.info_requests.push(channel.connection());
    })?;
    net.register_outgoing::<MsgState>()?;
    net.register_outgoing::<MsgServerInfo>()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::GameClient;
    use crate::config::ClientConfig;
    use crate::build_dependencies;
    use clap::Parser;
    use sim_component::EntityUid;
    use sim_math::{GridCoordinates, GridId, Vec2};
    use sim_net::{LoopbackConfig, LoopbackNetwork};
    use sim_world::Physics;

    const BALL: &str = r#"[{ "id": "ball", "components": [ { "type": "Physics", "mass": 2.0 } ] }]"#;

    fn prototypes() -> PrototypeIndex {
        let mut index = PrototypeIndex::new();
        index.load_json(BALL).unwrap();
        index
    }

    struct Harness {
        net: LoopbackNetwork,
        server: GameServer,
        grid: GridId,
    }

    impl Harness {
        fn new(link: LoopbackConfig) -> Self {
            let (net, peer) = LoopbackNetwork::new(link);
            let deps = build_dependencies(ServerConfig::default(), prototypes()).unwrap();
            let mut server = GameServer::new(Box::new(peer), &deps).unwrap();
            let map = server.world_mut().maps_mut().create_map(None).unwrap();
            let grid = server.world().maps().map(map).unwrap().default_grid();
            server.startup().unwrap();
            Self { net, server, grid }
        }

        fn client(&self, username: &str) -> GameClient {
            let deps = build_dependencies(ClientConfig::parse_from(["sim_client"]), prototypes()).unwrap();
            let mut client = GameClient::new(Box::new(self.net.client()), &deps).unwrap();
            client.connect(username).unwrap();
            client
        }

        fn spawn_ball(&mut self, position: Vec2, velocity: Vec2) -> EntityUid {
            let world = self.server.world_mut();
            let uid = world
                .spawn_entity_at("ball", GridCoordinates::new(self.grid, position))
                .unwrap();
            world.components_mut().get_component_mut::<Physics>(uid).unwrap().linear_velocity = velocity;
            world.dirty_component::<Physics>(uid);
            uid
        }

        fn stop_ball(&mut self, uid: EntityUid) {
            let world = self.server.world_mut();
            world.components_mut().get_component_mut::<Physics>(uid).unwrap().linear_velocity = Vec2::ZERO;
            world.dirty_component::<Physics>(uid);
        }

        fn run(&mut self, clients: &mut [&mut GameClient], rounds: usize) {
            for _ in 0..rounds {
                self.server.tick();
                for client in clients.iter_mut() {
                    client.tick();
                }
            }
        }
    }

    fn assert_replicated(server: &GameServer, client: &GameClient, uid: EntityUid) {
        let expected = server.world().world_position(uid).unwrap();
        let actual = client.world().world_position(uid).unwrap();
        assert!((expected - actual).length() < 1.0e-4, "{expected} != {actual}");
        let server_physics = server.world().components().get_component::<Physics>(uid).unwrap();
        let client_physics = client.world().components().get_component::<Physics>(uid).unwrap();
        assert_eq!(client_physics.linear_velocity, server_physics.linear_velocity);
        assert_eq!(client_physics.mass, 2.0);
    }

    #[test]
    fn test_client_joins_and_receives_world() {
        let mut h = Harness::new(LoopbackConfig::default());
        let uid = h.spawn_ball(Vec2::new(1.0, 2.0), Vec2::ZERO);
        let mut client = h.client("alice");
        h.run(&mut [&mut client], 4);

        assert!(client.is_connected());
        assert_eq!(h.server.sessions().len(), 1);
        assert!(client.world().entity(uid).unwrap().is_initialized());
        assert_eq!(client.world().entity_count(), h.server.world().entity_count());
        assert_eq!(client.world().world_position(uid).unwrap(), Vec2::new(1.0, 2.0));
        assert!(client.world().maps().grid_exists(h.grid));
    }

    #[test]
    fn test_server_info_reply() {
        let mut h = Harness::new(LoopbackConfig::default());
        let mut client = h.client("alice");
        h.run(&mut [&mut client], 4);

        let info = client.server_info().unwrap();
        assert_eq!(info.server_name, "sim server");
        assert_eq!(info.max_players, 32);
        assert_eq!(info.session.username, "alice");
    }

    #[test]
    fn test_moving_ball_converges() {
        let mut h = Harness::new(LoopbackConfig::default());
        let uid = h.spawn_ball(Vec2::ZERO, Vec2::new(10.0, 0.0));
        let mut client = h.client("alice");
        h.run(&mut [&mut client], 20);

        assert!(h.server.world().world_position(uid).unwrap().x > 2.0);
        assert_replicated(&h.server, &client, uid);
        let moved = |events: &[EntityEvent]| {
            events
                .iter()
                .any(|e| matches!(e, EntityEvent::Moved { uid: moved, .. } if *moved == uid))
        };
        assert!(moved(h.server.events()));
        assert!(moved(client.events()));
        assert_eq!(client.world().last_applied_tick(), h.server.current_tick());
    }

    #[test]
    fn test_acks_advance_cursor() {
        let mut h = Harness::new(LoopbackConfig::default());
        let mut client = h.client("alice");
        h.run(&mut [&mut client], 6);

        let cursors = h.server.sessions().in_game();
        assert_eq!(cursors.len(), 1);
        let (_, cursor) = cursors[0];
        assert!(cursor > 0);
        assert!(cursor < h.server.current_tick());
    }

    #[test]
    fn test_deletion_reaches_client_and_history_is_culled() {
        let mut h = Harness::new(LoopbackConfig::default());
        let keep = h.spawn_ball(Vec2::ZERO, Vec2::ZERO);
        let doomed = h.spawn_ball(Vec2::new(5.0, 0.0), Vec2::ZERO);
        let mut client = h.client("alice");
        h.run(&mut [&mut client], 4);
        assert!(client.world().entity_exists(doomed));

        assert!(h.server.world_mut().delete_entity(doomed));
        assert_eq!(h.server.world().deletion_history_len(), 1);
        h.run(&mut [&mut client], 1);
        assert!(!client.world().entity_exists(doomed));
        assert!(client.events().contains(&EntityEvent::Deleted { uid: doomed }));
        assert!(client.world().entity_exists(keep));

        // Culled once the client acknowledged a state containing the deletion.
        h.run(&mut [&mut client], 2);
        assert_eq!(h.server.world().deletion_history_len(), 0);
    }

    #[test]
    fn test_history_culled_without_sessions() {
        let mut h = Harness::new(LoopbackConfig::default());
        let uid = h.spawn_ball(Vec2::ZERO, Vec2::ZERO);
        h.server.world_mut().delete_entity(uid);
        h.server.tick();
        assert_eq!(h.server.world().deletion_history_len(), 0);
    }

    #[test]
    fn test_late_joiner_gets_current_world() {
        let mut h = Harness::new(LoopbackConfig::default());
        let early = h.spawn_ball(Vec2::ZERO, Vec2::ZERO);
        let mut first = h.client("alice");
        h.run(&mut [&mut first], 4);
        h.server.world_mut().delete_entity(early);
        let late = h.spawn_ball(Vec2::new(3.0, 3.0), Vec2::new(0.0, 10.0));
        h.run(&mut [&mut first], 4);

        let mut second = h.client("bob");
        h.run(&mut [&mut first, &mut second], 4);
        for client in [&first, &second] {
            assert!(!client.world().entity_exists(early));
            assert_replicated(&h.server, client, late);
        }
    }

    #[test]
    fn test_lossy_link_still_converges() {
        let mut h = Harness::new(LoopbackConfig::lossy(3));
        let uid = h.spawn_ball(Vec2::ZERO, Vec2::new(10.0, 5.0));
        let mut client = h.client("alice");
        h.run(&mut [&mut client], 30);
        h.stop_ball(uid);
        h.run(&mut [&mut client], 10);

        assert!(h.net.dropped_frames() > 0);
        assert_replicated(&h.server, &client, uid);
    }

    #[test]
    fn test_disconnect_removes_session() {
        let mut h = Harness::new(LoopbackConfig::default());
        let mut client = h.client("alice");
        h.run(&mut [&mut client], 4);
        assert_eq!(h.server.sessions().len(), 1);

        client.disconnect("bye");
        h.run(&mut [&mut client], 2);
        assert!(h.server.sessions().is_empty());
        assert!(!client.is_connected());
    }

    #[test]
    fn test_missing_dependency_fails() {
        let (_net, peer) = LoopbackNetwork::new(LoopbackConfig::default());
        let deps = sim_world::DependencyCollection::new().build();
        assert!(matches!(
            GameServer::new(Box::new(peer), &deps),
            Err(GameError::Dependency(_))
        ));
    }
}
