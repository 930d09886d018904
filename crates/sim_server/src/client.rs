//! The game client.
//!
//! [`GameClient`] keeps a replica of the server's world. Game states are
//! queued by the message handler and applied in tick order on the next
//! [`GameClient::tick`]; the newest applied tick is acknowledged back so
//! the server can shrink the next delta.

use sim_component::{ComponentFactory, Tick};
use sim_net::{MsgServerInfo, MsgServerInfoReq, NetChannel, NetError, NetEvent, NetManager, NetPeer};
use sim_world::{ClientEntityManager, Dependencies, EntityEvent, GameState, MsgState, MsgStateAck, PrototypeIndex};
use tracing::{debug, info, warn};

use crate::error::GameError;

/// State reachable from message handlers.
#[derive(Debug, Default)]
pub struct ClientContext {
    states: Vec<GameState>,
    server_info: Option<MsgServerInfo>,
}

/// Replicating client: network and world replica.
#[derive(Debug)]
pub struct GameClient {
    net: NetManager<ClientContext>,
    ctx: ClientContext,
    world: ClientEntityManager,
    events: Vec<EntityEvent>,
}

impl GameClient {
    /// Build a client on `peer`. Resolves [`ComponentFactory`] and
    /// [`PrototypeIndex`] from `deps`.
    ///
    /// # Errors
    ///
    /// Fails if a dependency is missing or message registration clashes.
    pub fn new(peer: Box<dyn NetPeer>, deps: &Dependencies) -> Result<Self, GameError> {
        let factory = deps.resolve::<ComponentFactory>()?;
        let prototypes = deps.resolve::<PrototypeIndex>()?;

        let mut net = NetManager::client(peer);
        register_messages(&mut net)?;

        Ok(Self {
            net,
            ctx: ClientContext::default(),
            world: ClientEntityManager::new(factory, prototypes),
            events: Vec::new(),
        })
    }

    /// Start logging in as `username`.
    ///
    /// # Errors
    ///
    /// Fails if the name is invalid or a connection is already open.
    pub fn connect(&mut self, username: &str) -> Result<(), GameError> {
        self.net.client_connect(username)?;
        Ok(())
    }

    pub fn disconnect(&mut self, reason: &str) {
        self.net.client_disconnect(reason);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.net.is_connected()
    }

    #[must_use]
    pub fn is_connecting(&self) -> bool {
        self.net.is_connecting()
    }

    #[must_use]
    pub fn world(&self) -> &ClientEntityManager {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut ClientEntityManager {
        &mut self.world
    }

    /// Server details, once the server answered the info request.
    #[must_use]
    pub fn server_info(&self) -> Option<&MsgServerInfo> {
        self.ctx.server_info.as_ref()
    }

    /// Entity events raised by the states applied during the last tick.
    #[must_use]
    pub fn events(&self) -> &[EntityEvent] {
        &self.events
    }

    #[must_use]
    pub fn net(&self) -> &NetManager<ClientContext> {
        &self.net
    }

    /// Poll the network and apply every state that arrived. Returns the
    /// connection events seen this poll.
    pub fn tick(&mut self) -> Vec<NetEvent> {
        let events = self.net.process_packets(&mut self.ctx);
        for event in &events {
            match event {
                NetEvent::Connected { session, .. } => {
                    info!(%session, "connected to server");
                    if let Err(e) = self.net.client_send_message(&MsgServerInfoReq) {
                        warn!(error = %e, "failed to request server info");
                    }
                }
                NetEvent::Disconnected { reason, .. } => info!(%reason, "disconnected from server"),
                NetEvent::ConnectFailed { reason } => warn!(%reason, "connection failed"),
            }
        }
        if let Some(tick) = self.apply_states() {
            if let Err(e) = self.net.client_send_message(&MsgStateAck { tick }) {
                warn!(tick, error = %e, "failed to acknowledge state");
            }
        }
        self.events = self.world.drain_events();
        events
    }

    /// Apply queued states oldest first. Returns the newest tick applied.
    fn apply_states(&mut self) -> Option<Tick> {
        let mut states = std::mem::take(&mut self.ctx.states);
        states.sort_by_key(|state| state.to_tick);

        let mut newest = None;
        for state in &states {
            match self.world.apply_game_state(state) {
                Ok(true) => newest = Some(state.to_tick),
                Ok(false) => debug!(to_tick = state.to_tick, "skipped stale state"),
                Err(e) => {
                    warn!(from_tick = state.from_tick, to_tick = state.to_tick, error = %e, "failed to apply state");
                    break;
                }
            }
        }
        newest
    }
}

fn register_messages(net: &mut NetManager<ClientContext>) -> Result<(), NetError> {
    net.register_net_message::<MsgState, _>(|ctx: &mut ClientContext, _: &NetChannel, msg: MsgState| {
        ctx.states.push(msg.state);
    })?;
    net.register_net_message::<MsgServerInfo, _>(|ctx: &mut ClientContext, _: &NetChannel, msg: MsgServerInfo| {
        debug!(server = %msg.server_name, session = %msg.session, "received server info");
        ctx.server_info = Some(msg);
    })?;
    net.register_outgoing::<MsgStateAck>()?;
    net.register_outgoing::<MsgServerInfoReq>()?;
    Ok(())
}
