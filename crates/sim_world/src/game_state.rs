//! The replicated game state and its messages.
//!
//! A [`GameState`] is the delta between the tick a client last acknowledged
//! (`from_tick`) and the tick the server built it at (`to_tick`). The server
//! sends it as [`MsgState`] on the unreliable Entity group; the client
//! answers with [`MsgStateAck`]. A lost state needs no resend: the next one
//! is built from the same, unadvanced cursor and covers it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sim_component::{ComponentState, EntityUid, Tick};
use sim_math::{GridId, MapCoordinates, MapId};
use sim_net::{MsgGroup, NetMessage};

use crate::map::{ChunkIndex, Tile};

/// Replicated state of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityState {
    pub uid: EntityUid,
    /// Prototype the client instantiates unknown entities from.
    pub prototype: Option<String>,
    /// States of the components modified since the cursor, by net id.
    pub component_states: Vec<ComponentState>,
}

/// Tiles of one chunk, flattened `x * size + y`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkDatum {
    pub index: ChunkIndex,
    pub tiles: Vec<Tile>,
}

/// Placement and modified chunks of one grid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridDatum {
    pub coordinates: MapCoordinates,
    pub chunks: Vec<ChunkDatum>,
}

/// What a client needs to create a grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridCreationDatum {
    pub chunk_size: u16,
    pub snap_size: f32,
    pub is_default: bool,
}

/// Map and grid changes since the cursor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapStateData {
    /// Grids modified since the cursor.
    pub grid_data: BTreeMap<GridId, GridDatum>,
    pub deleted_grids: Vec<GridId>,
    pub deleted_maps: Vec<MapId>,
    /// New maps and their default grid.
    pub created_maps: BTreeMap<MapId, GridId>,
    pub created_grids: BTreeMap<GridId, GridCreationDatum>,
}

impl MapStateData {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.grid_data.is_empty()
            && self.deleted_grids.is_empty()
            && self.deleted_maps.is_empty()
            && self.created_maps.is_empty()
            && self.created_grids.is_empty()
    }
}

/// A tick-scoped delta of the world.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GameState {
    /// The cursor the delta is relative to.
    pub from_tick: Tick,
    /// The tick the delta brings the client to.
    pub to_tick: Tick,
    pub entity_states: Vec<EntityState>,
    pub deleted_entities: Vec<EntityUid>,
    pub map_data: MapStateData,
}

impl GameState {
    /// Returns `true` if the delta carries no change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entity_states.is_empty() && self.deleted_entities.is_empty() && self.map_data.is_empty()
    }
}

/// Server → client game state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MsgState {
    pub state: GameState,
}

impl NetMessage for MsgState {
    const NAME: &'static str = "MsgState";
    const GROUP: MsgGroup = MsgGroup::Entity;
}

/// Client → server acknowledgement of an applied game state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MsgStateAck {
    /// `to_tick` of the applied state.
    pub tick: Tick,
}

impl NetMessage for MsgStateAck {
    const NAME: &'static str = "MsgStateAck";
    const GROUP: MsgGroup = MsgGroup::Entity;
}
