//! Maps, grids and tile chunks.
//!
//! A [`Map`] is a disjoint world space that always owns one default grid. A
//! [`Grid`] is a tile region placed at a world position inside its map; its
//! tiles are stored in square [`Chunk`]s created on first write. One tile is
//! one world unit.
//!
//! Chunk tiles are stored flattened, `tiles[x * size + y]`, which is also
//! the order they travel in on the wire.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sim_component::Tick;
use sim_math::{GridId, Mat3, MapId, Vec2};

/// Chunk edge length used when none is given.
pub const DEFAULT_CHUNK_SIZE: u16 = 16;

/// How far from a snap line a position may be and still count as on it.
const SNAP_TOLERANCE: f32 = 1.0e-3;

fn on_whole_multiple(v: Vec2) -> bool {
    (v - v.round()).abs().cmplt(Vec2::splat(SNAP_TOLERANCE)).all()
}

/// One tile of a grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    /// Tile definition id; `0` is empty space.
    pub type_id: u16,
    /// Definition-specific payload.
    pub data: u16,
}

impl Tile {
    /// Empty space.
    pub const EMPTY: Tile = Tile { type_id: 0, data: 0 };

    #[must_use]
    pub const fn new(type_id: u16) -> Self {
        Self { type_id, data: 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.type_id == 0
    }
}

/// Integer tile position within a grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileIndices {
    pub x: i32,
    pub y: i32,
}

impl TileIndices {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Position of a chunk within a grid, in chunks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ChunkIndex {
    pub x: i32,
    pub y: i32,
}

impl ChunkIndex {
    #[must_use]
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A square block of tiles.
#[derive(Debug, Clone)]
pub struct Chunk {
    index: ChunkIndex,
    size: u16,
    tiles: Vec<Tile>,
    last_modified_tick: Tick,
}

impl Chunk {
    /// An empty chunk.
    #[must_use]
    pub fn new(index: ChunkIndex, size: u16, tick: Tick) -> Self {
        let size_sq = usize::from(size) * usize::from(size);
        Self {
            index,
            size,
            tiles: vec![Tile::EMPTY; size_sq],
            last_modified_tick: tick,
        }
    }

    #[must_use]
    pub fn index(&self) -> ChunkIndex {
        self.index
    }

    #[must_use]
    pub fn size(&self) -> u16 {
        self.size
    }

    #[must_use]
    pub fn last_modified_tick(&self) -> Tick {
        self.last_modified_tick
    }

    fn offset(&self, x: u16, y: u16) -> usize {
        usize::from(x) * usize::from(self.size) + usize::from(y)
    }

    /// The tile at chunk-local `(x, y)`.
    #[must_use]
    pub fn tile(&self, x: u16, y: u16) -> Tile {
        if x >= self.size || y >= self.size {
            return Tile::EMPTY;
        }
        self.tiles[self.offset(x, y)]
    }

    /// Set a tile. Returns `true` if it changed.
    pub fn set_tile(&mut self, x: u16, y: u16, tile: Tile, tick: Tick) -> bool {
        if x >= self.size || y >= self.size {
            return false;
        }
        let offset = self.offset(x, y);
        if self.tiles[offset] == tile {
            return false;
        }
        self.tiles[offset] = tile;
        self.last_modified_tick = self.last_modified_tick.max(tick);
        true
    }

    /// Tiles in wire order.
    #[must_use]
    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    /// Tile indices, in grid space, of chunk-local `(x, y)`.
    #[must_use]
    pub fn grid_indices(&self, x: u16, y: u16) -> TileIndices {
        let size = i32::from(self.size);
        TileIndices::new(
            self.index.x * size + i32::from(x),
            self.index.y * size + i32::from(y),
        )
    }
}

/// A tile region placed inside a map.
#[derive(Debug, Clone)]
pub struct Grid {
    id: GridId,
    map_id: MapId,
    chunk_size: u16,
    snap_size: f32,
    is_default: bool,
    world_position: Vec2,
    created_tick: Tick,
    last_modified_tick: Tick,
    chunks: BTreeMap<ChunkIndex, Chunk>,
}

impl Grid {
    /// An empty grid at the map origin.
    #[must_use]
    pub fn new(id: GridId, map_id: MapId, chunk_size: u16, snap_size: f32, is_default: bool, tick: Tick) -> Self {
        Self {
            id,
            map_id,
            chunk_size: chunk_size.max(1),
            snap_size,
            is_default,
            world_position: Vec2::ZERO,
            created_tick: tick,
            last_modified_tick: tick,
            chunks: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> GridId {
        self.id
    }

    #[must_use]
    pub fn map_id(&self) -> MapId {
        self.map_id
    }

    #[must_use]
    pub fn chunk_size(&self) -> u16 {
        self.chunk_size
    }

    #[must_use]
    pub fn snap_size(&self) -> f32 {
        self.snap_size
    }

    /// Whether this is its map's default grid.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Position of the grid origin within its map.
    #[must_use]
    pub fn world_position(&self) -> Vec2 {
        self.world_position
    }

    #[must_use]
    pub fn created_tick(&self) -> Tick {
        self.created_tick
    }

    #[must_use]
    pub fn last_modified_tick(&self) -> Tick {
        self.last_modified_tick
    }

    /// Move the grid origin.
    pub fn set_world_position(&mut self, position: Vec2, tick: Tick) {
        if self.world_position != position {
            self.world_position = position;
            self.last_modified_tick = self.last_modified_tick.max(tick);
        }
    }

    /// Placement of the grid origin in its map.
    #[must_use]
    pub fn placement_matrix(&self) -> Mat3 {
        Mat3::from_translation(self.world_position)
    }

    /// Map position to grid-local position.
    #[must_use]
    pub fn world_to_local(&self, position: Vec2) -> Vec2 {
        position - self.world_position
    }

    /// Grid-local position to map position.
    #[must_use]
    pub fn local_to_world(&self, position: Vec2) -> Vec2 {
        position + self.world_position
    }

    /// The chunk holding `indices` and the tile's offset inside it.
    #[must_use]
    pub fn chunk_for(&self, indices: TileIndices) -> (ChunkIndex, u16, u16) {
        let size = i32::from(self.chunk_size);
        let chunk = ChunkIndex::new(indices.x.div_euclid(size), indices.y.div_euclid(size));
        // rem_euclid with a positive divisor fits the chunk size.
        let x = u16::try_from(indices.x.rem_euclid(size)).unwrap_or(0);
        let y = u16::try_from(indices.y.rem_euclid(size)).unwrap_or(0);
        (chunk, x, y)
    }

    /// The tile at `indices`; empty where no chunk exists.
    #[must_use]
    pub fn tile(&self, indices: TileIndices) -> Tile {
        let (chunk, x, y) = self.chunk_for(indices);
        self.chunks.get(&chunk).map_or(Tile::EMPTY, |c| c.tile(x, y))
    }

    /// Set a tile, creating its chunk. Returns `true` if it changed.
    pub fn set_tile(&mut self, indices: TileIndices, tile: Tile, tick: Tick) -> bool {
        let (index, x, y) = self.chunk_for(indices);
        let size = self.chunk_size;
        let changed = self
            .chunks
            .entry(index)
            .or_insert_with(|| Chunk::new(index, size, tick))
            .set_tile(x, y, tile, tick);
        if changed {
            self.last_modified_tick = self.last_modified_tick.max(tick);
        }
        changed
    }

    /// The chunk at `index`, created empty if missing.
    pub fn chunk_mut(&mut self, index: ChunkIndex, tick: Tick) -> &mut Chunk {
        let size = self.chunk_size;
        self.chunks
            .entry(index)
            .or_insert_with(|| Chunk::new(index, size, tick))
    }

    /// Every chunk, ordered by index.
    pub fn chunks(&self) -> impl Iterator<Item = &Chunk> {
        self.chunks.values()
    }

    /// Whether the grid-local `position` is the center of a snap cell.
    #[must_use]
    pub fn on_snap_center(&self, position: Vec2) -> bool {
        on_whole_multiple(position / self.snap_size - Vec2::splat(0.5))
    }

    /// Whether the grid-local `position` is a corner of the snap lattice.
    #[must_use]
    pub fn on_snap_border(&self, position: Vec2) -> bool {
        on_whole_multiple(position / self.snap_size)
    }

    /// Whether a chunk of this grid covers the map position `position`.
    #[must_use]
    pub fn covers(&self, position: Vec2) -> bool {
        let local = self.world_to_local(position).floor();
        let (chunk, _, _) = self.chunk_for(TileIndices::new(local.x as i32, local.y as i32));
        self.chunks.contains_key(&chunk)
    }

    /// The grid-local tile holding `position`.
    #[must_use]
    pub fn tile_indices_at(&self, position: Vec2) -> TileIndices {
        let local = self.world_to_local(position).floor();
        TileIndices::new(local.x as i32, local.y as i32)
    }

    pub(crate) fn touch(&mut self, tick: Tick) {
        self.last_modified_tick = self.last_modified_tick.max(tick);
    }
}

/// A disjoint world space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Map {
    id: MapId,
    default_grid: GridId,
    created_tick: Tick,
}

impl Map {
    #[must_use]
    pub fn new(id: MapId, default_grid: GridId, tick: Tick) -> Self {
        Self {
            id,
            default_grid,
            created_tick: tick,
        }
    }

    #[must_use]
    pub fn id(&self) -> MapId {
        self.id
    }

    /// The grid used for positions no other grid covers.
    #[must_use]
    pub fn default_grid(&self) -> GridId {
        self.default_grid
    }

    #[must_use]
    pub fn created_tick(&self) -> Tick {
        self.created_tick
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_for_negative_indices() {
        let grid = Grid::new(GridId(1), MapId(1), 16, 1.0, false, 0);
        assert_eq!(grid.chunk_for(TileIndices::new(-1, 17)), (ChunkIndex::new(-1, 1), 15, 1));
        assert_eq!(grid.chunk_for(TileIndices::new(0, 0)), (ChunkIndex::new(0, 0), 0, 0));
    }

    #[test]
    fn test_set_tile_stamps_tick() {
        let mut grid = Grid::new(GridId(1), MapId(1), 4, 1.0, false, 1);
        assert!(grid.set_tile(TileIndices::new(5, 2), Tile::new(3), 7));
        assert!(!grid.set_tile(TileIndices::new(5, 2), Tile::new(3), 9));
        assert_eq!(grid.tile(TileIndices::new(5, 2)), Tile::new(3));
        assert_eq!(grid.last_modified_tick(), 7);
        let chunk = grid.chunks().next().unwrap();
        assert_eq!(chunk.index(), ChunkIndex::new(1, 0));
        assert_eq!(chunk.last_modified_tick(), 7);
    }

    #[test]
    fn test_tiles_are_flattened_row_major() {
        let mut chunk = Chunk::new(ChunkIndex::new(0, 0), 4, 0);
        chunk.set_tile(1, 2, Tile::new(9), 1);
        assert_eq!(chunk.tiles()[4 + 2], Tile::new(9));
        assert_eq!(chunk.grid_indices(1, 2), TileIndices::new(1, 2));
    }

    #[test]
    fn test_covers_uses_world_position() {
        let mut grid = Grid::new(GridId(2), MapId(1), 4, 1.0, false, 0);
        grid.set_world_position(Vec2::new(10.0, 0.0), 1);
        grid.set_tile(TileIndices::new(0, 0), Tile::new(1), 1);
        assert!(grid.covers(Vec2::new(11.5, 2.0)));
        assert!(!grid.covers(Vec2::new(1.5, 2.0)));
        assert_eq!(grid.world_to_local(Vec2::new(11.0, 1.0)), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn test_snap_center_and_border() {
        let grid = Grid::new(GridId(1), MapId(1), 4, 0.5, false, 0);
        assert!(grid.on_snap_center(Vec2::new(0.25, 0.75)));
        assert!(!grid.on_snap_center(Vec2::new(0.5, 0.75)));
        assert!(grid.on_snap_border(Vec2::new(1.0, -0.5)));
        assert!(!grid.on_snap_border(Vec2::new(1.0, 0.3)));
    }
}
