//! Map and grid registry with network state support.
//!
//! The server stamps every creation, tile change and deletion with the
//! current tick, so [`MapManager::get_state_data`] can produce the delta a
//! client needs from its cursor. The client applies that delta in two
//! halves around the entity states: [`MapManager::apply_state_pre`] creates
//! maps, grids and tiles before anything can reference them, and
//! [`MapManager::apply_state_post`] deletes grids and maps only after every
//! entity state has been applied.

use std::collections::BTreeMap;

use sim_component::Tick;
use sim_math::{GridId, Mat3, MapCoordinates, MapId, Vec2};
use tracing::{debug, info, warn};

use crate::error::WorldError;
use crate::game_state::{ChunkDatum, GridCreationDatum, GridDatum, MapStateData};
use crate::map::{DEFAULT_CHUNK_SIZE, Grid, Map, Tile, TileIndices};

/// A tile changed by an applied state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileChange {
    pub grid: GridId,
    pub indices: TileIndices,
    pub tile: Tile,
}

/// Every map and grid of one process.
#[derive(Debug)]
pub struct MapManager {
    maps: BTreeMap<MapId, Map>,
    grids: BTreeMap<GridId, Grid>,
    next_map: u32,
    next_grid: u32,
    map_deletions: Vec<(Tick, MapId)>,
    grid_deletions: Vec<(Tick, GridId)>,
    current_tick: Tick,
}

impl MapManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            maps: BTreeMap::new(),
            grids: BTreeMap::new(),
            next_map: 1,
            next_grid: 1,
            map_deletions: Vec::new(),
            grid_deletions: Vec::new(),
            current_tick: 0,
        }
    }

    /// Tick stamped onto changes.
    #[must_use]
    pub fn current_tick(&self) -> Tick {
        self.current_tick
    }

    pub fn set_current_tick(&mut self, tick: Tick) {
        self.current_tick = tick;
    }

    // ── Maps ───────────────────────────────────────────────────────────────

    /// Create a map and its default grid. With `id == None` the next free
    /// id is used.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DuplicateMap`] if the id is taken and
    /// [`WorldError::ReservedMap`] for `u32::MAX`.
    pub fn create_map(&mut self, id: Option<MapId>) -> Result<MapId, WorldError> {
        self.create_map_with_grid(id, None, DEFAULT_CHUNK_SIZE, 1.0)
    }

    fn create_map_with_grid(
        &mut self,
        id: Option<MapId>,
        grid_id: Option<GridId>,
        chunk_size: u16,
        snap_size: f32,
    ) -> Result<MapId, WorldError> {
        let id = id.unwrap_or(MapId(self.next_map));
        if id.is_nullspace() || self.maps.contains_key(&id) {
            return Err(WorldError::DuplicateMap(id));
        }
        if id.0 == u32::MAX {
            return Err(WorldError::ReservedMap(id));
        }
        let grid_id = grid_id.unwrap_or(GridId(self.next_grid));
        self.check_new_grid(grid_id)?;
        self.next_map = self.next_map.max(id.0.saturating_add(1));
        self.insert_grid(Grid::new(grid_id, id, chunk_size, snap_size, true, self.current_tick));
        self.maps.insert(id, Map::new(id, grid_id, self.current_tick));
        info!(map = %id, default_grid = %grid_id, "created map");
        Ok(id)
    }

    #[must_use]
    pub fn map(&self, id: MapId) -> Option<&Map> {
        self.maps.get(&id)
    }

    #[must_use]
    pub fn map_exists(&self, id: MapId) -> bool {
        self.maps.contains_key(&id)
    }

    /// Every map, ordered by id.
    pub fn maps(&self) -> impl Iterator<Item = &Map> {
        self.maps.values()
    }

    /// Delete a map and all of its grids. Returns `false` if unknown.
    pub fn delete_map(&mut self, id: MapId) -> bool {
        if self.maps.remove(&id).is_none() {
            return false;
        }
        let grids: Vec<GridId> = self
            .grids
            .values()
            .filter(|g| g.map_id() == id)
            .map(Grid::id)
            .collect();
        for grid in grids {
            self.remove_grid(grid);
        }
        self.map_deletions.push((self.current_tick, id));
        info!(map = %id, "deleted map");
        true
    }

    // ── Grids ──────────────────────────────────────────────────────────────

    fn check_new_grid(&self, id: GridId) -> Result<(), WorldError> {
        if id.is_nullspace() || self.grids.contains_key(&id) {
            return Err(WorldError::DuplicateGrid(id));
        }
        if id.0 == u32::MAX {
            return Err(WorldError::ReservedGrid(id));
        }
        Ok(())
    }

    fn insert_grid(&mut self, grid: Grid) {
        self.next_grid = self.next_grid.max(grid.id().0.saturating_add(1));
        self.grids.insert(grid.id(), grid);
    }

    /// Create a grid on `map`. With `id == None` the next free id is used.
    ///
    /// # Errors
    ///
    /// Fails if the map is unknown or the grid id is taken.
    pub fn create_grid(
        &mut self,
        map: MapId,
        id: Option<GridId>,
        chunk_size: u16,
        snap_size: f32,
    ) -> Result<GridId, WorldError> {
        if !self.maps.contains_key(&map) {
            return Err(WorldError::UnknownMap(map));
        }
        let id = id.unwrap_or(GridId(self.next_grid));
        self.check_new_grid(id)?;
        self.insert_grid(Grid::new(id, map, chunk_size, snap_size, false, self.current_tick));
        debug!(grid = %id, map = %map, "created grid");
        Ok(id)
    }

    #[must_use]
    pub fn grid(&self, id: GridId) -> Option<&Grid> {
        self.grids.get(&id)
    }

    pub fn grid_mut(&mut self, id: GridId) -> Option<&mut Grid> {
        self.grids.get_mut(&id)
    }

    #[must_use]
    pub fn grid_exists(&self, id: GridId) -> bool {
        self.grids.contains_key(&id)
    }

    /// Every grid, ordered by id.
    pub fn grids(&self) -> impl Iterator<Item = &Grid> {
        self.grids.values()
    }

    fn remove_grid(&mut self, id: GridId) {
        if self.grids.remove(&id).is_some() {
            self.grid_deletions.push((self.current_tick, id));
            debug!(grid = %id, "deleted grid");
        }
    }

    /// Delete a grid. Returns `Ok(false)` if unknown.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::DefaultGrid`] for a map's default grid; delete
    /// the map instead.
    pub fn delete_grid(&mut self, id: GridId) -> Result<bool, WorldError> {
        let Some(grid) = self.grids.get(&id) else {
            return Ok(false);
        };
        if grid.is_default() && self.maps.contains_key(&grid.map_id()) {
            return Err(WorldError::DefaultGrid(id));
        }
        self.remove_grid(id);
        Ok(true)
    }

    /// Move a grid's origin within its map.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownGrid`] if the grid does not exist.
    pub fn set_grid_position(&mut self, id: GridId, position: Vec2) -> Result<(), WorldError> {
        let tick = self.current_tick;
        let grid = self.grids.get_mut(&id).ok_or(WorldError::UnknownGrid(id))?;
        grid.set_world_position(position, tick);
        Ok(())
    }

    /// Set one tile. Returns `true` if it changed.
    ///
    /// # Errors
    ///
    /// Returns [`WorldError::UnknownGrid`] if the grid does not exist.
    pub fn set_tile(&mut self, id: GridId, indices: TileIndices, tile: Tile) -> Result<bool, WorldError> {
        let tick = self.current_tick;
        let grid = self.grids.get_mut(&id).ok_or(WorldError::UnknownGrid(id))?;
        Ok(grid.set_tile(indices, tile, tick))
    }

    /// The map a grid belongs to; nullspace for unknown grids.
    #[must_use]
    pub fn map_of(&self, grid: GridId) -> MapId {
        self.grids.get(&grid).map_or(MapId::NULLSPACE, Grid::map_id)
    }

    /// Placement matrix of a grid; identity for nullspace and unknown grids.
    #[must_use]
    pub fn grid_matrix(&self, grid: GridId) -> Mat3 {
        self.grids.get(&grid).map_or(Mat3::IDENTITY, Grid::placement_matrix)
    }

    /// Origin of a grid in its map; zero for nullspace and unknown grids.
    #[must_use]
    pub fn grid_origin(&self, grid: GridId) -> Vec2 {
        self.grids.get(&grid).map_or(Vec2::ZERO, Grid::world_position)
    }

    /// The grid under a map position: a non-default grid with a chunk
    /// there, else the map's default grid. Nullspace for unknown maps.
    #[must_use]
    pub fn find_grid_at(&self, coordinates: MapCoordinates) -> GridId {
        let Some(map) = self.maps.get(&coordinates.map_id) else {
            return GridId::NULLSPACE;
        };
        self.grids
            .values()
            .find(|g| g.map_id() == map.id() && !g.is_default() && g.covers(coordinates.position))
            .map_or(map.default_grid(), Grid::id)
    }

    // ── Network state ──────────────────────────────────────────────────────

    /// Map changes at or after `from_tick`.
    #[must_use]
    pub fn get_state_data(&self, from_tick: Tick) -> MapStateData {
        let mut data = MapStateData::default();

        for grid in self.grids.values() {
            if grid.last_modified_tick() < from_tick {
                continue;
            }
            let chunks = grid
                .chunks()
                .filter(|c| c.last_modified_tick() >= from_tick)
                .map(|c| ChunkDatum {
                    index: c.index(),
                    tiles: c.tiles().to_vec(),
                })
                .collect();
            data.grid_data.insert(
                grid.id(),
                GridDatum {
                    coordinates: MapCoordinates::new(grid.map_id(), grid.world_position()),
                    chunks,
                },
            );
            if grid.created_tick() >= from_tick {
                data.created_grids.insert(
                    grid.id(),
                    GridCreationDatum {
                        chunk_size: grid.chunk_size(),
                        snap_size: grid.snap_size(),
                        is_default: grid.is_default(),
                    },
                );
            }
        }

        for map in self.maps.values().filter(|m| m.created_tick() >= from_tick) {
            data.created_maps.insert(map.id(), map.default_grid());
        }
        data.deleted_grids = self
            .grid_deletions
            .iter()
            .filter(|(tick, _)| *tick >= from_tick)
            .map(|(_, id)| *id)
            .collect();
        data.deleted_maps = self
            .map_deletions
            .iter()
            .filter(|(tick, _)| *tick >= from_tick)
            .map(|(_, id)| *id)
            .collect();
        data
    }

    /// Forget deletions at or before `to_tick`.
    pub fn cull_deletion_history(&mut self, to_tick: Tick) {
        self.map_deletions.retain(|(tick, _)| *tick > to_tick);
        self.grid_deletions.retain(|(tick, _)| *tick > to_tick);
    }

    /// Number of remembered map and grid deletions.
    #[must_use]
    pub fn deletion_history_len(&self) -> usize {
        self.map_deletions.len() + self.grid_deletions.len()
    }

    /// First half of applying a received state: create maps with their
    /// default grids, then the other grids, then write grid placement and
    /// tiles. Returns every tile that changed.
    ///
    /// # Errors
    ///
    /// Fails on an id clash, on tile data for an unknown grid, or on a chunk
    /// whose length does not match the grid's chunk size.
    pub fn apply_state_pre(&mut self, data: &MapStateData) -> Result<Vec<TileChange>, WorldError> {
        for (map_id, grid_id) in &data.created_maps {
            if self.maps.contains_key(map_id) {
                continue;
            }
            let creation = data.created_grids.get(grid_id).copied().unwrap_or(GridCreationDatum {
                chunk_size: DEFAULT_CHUNK_SIZE,
                snap_size: 1.0,
                is_default: true,
            });
            self.create_map_with_grid(Some(*map_id), Some(*grid_id), creation.chunk_size, creation.snap_size)?;
        }

        for (grid_id, creation) in &data.created_grids {
            if creation.is_default || self.grids.contains_key(grid_id) {
                continue;
            }
            let Some(datum) = data.grid_data.get(grid_id) else {
                warn!(grid = %grid_id, "created grid without placement data");
                continue;
            };
            self.create_grid(datum.coordinates.map_id, Some(*grid_id), creation.chunk_size, creation.snap_size)?;
        }

        let tick = self.current_tick;
        let mut changes = Vec::new();
        for (grid_id, datum) in &data.grid_data {
            let grid = self.grids.get_mut(grid_id).ok_or(WorldError::UnknownGrid(*grid_id))?;
            if grid.map_id() != datum.coordinates.map_id {
                warn!(grid = %grid_id, "moving grids between maps is not supported");
                continue;
            }
            grid.set_world_position(datum.coordinates.position, tick);

            let expected = usize::from(grid.chunk_size()) * usize::from(grid.chunk_size());
            for chunk_data in &datum.chunks {
                if chunk_data.tiles.len() != expected {
                    return Err(WorldError::ChunkSize {
                        grid: *grid_id,
                        expected,
                        found: chunk_data.tiles.len(),
                    });
                }
                let size = grid.chunk_size();
                let chunk = grid.chunk_mut(chunk_data.index, tick);
                let mut tiles = chunk_data.tiles.iter();
                for x in 0..size {
                    for y in 0..size {
                        let Some(tile) = tiles.next() else { break };
                        if chunk.set_tile(x, y, *tile, tick) {
                            changes.push(TileChange {
                                grid: *grid_id,
                                indices: chunk.grid_indices(x, y),
                                tile: *tile,
                            });
                        }
                    }
                }
            }
            if !changes.is_empty() {
                grid.touch(tick);
            }
        }
        Ok(changes)
    }

    /// Second half of applying a received state: delete grids, then maps.
    pub fn apply_state_post(&mut self, data: &MapStateData) {
        for grid in &data.deleted_grids {
            self.remove_grid(*grid);
        }
        for map in &data.deleted_maps {
            self.delete_map(*map);
        }
    }
}

impl Default for MapManager {
    fn default() -> Self {
        Self::new()
    }
}
