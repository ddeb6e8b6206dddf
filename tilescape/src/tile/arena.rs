//! Index-based arena owning all tiles of one tileset.
//!
//! The tree hands out [`TileId`] indices, so tiles must never move once an
//! index exists. The builder pre-counts the manifest's nodes and reserves
//! exact capacity up front; `push` asserts that growth never requires a
//! reallocation, making sibling-group allocation safe by construction.

use super::{Tile, TileId};

/// Growable store of tiles with stable indices.
pub struct TileArena {
    tiles: Vec<Tile>,
}

impl TileArena {
    /// Creates an arena with capacity for exactly `capacity` tiles.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tiles: Vec::with_capacity(capacity),
        }
    }

    /// Number of tiles in the arena.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// True when the arena holds no tiles.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// The identifier the next pushed tile will receive.
    pub(crate) fn next_id(&self) -> TileId {
        TileId(self.tiles.len() as u32)
    }

    /// Appends a tile, returning its stable identifier.
    pub(crate) fn push(&mut self, tile: Tile) -> TileId {
        debug_assert!(
            self.tiles.len() < self.tiles.capacity(),
            "tile arena would reallocate and invalidate live indices"
        );
        let id = self.next_id();
        self.tiles.push(tile);
        id
    }

    /// The tile with the given identifier, if it exists.
    pub fn get(&self, id: TileId) -> Option<&Tile> {
        self.tiles.get(id.index())
    }

    pub(crate) fn get_mut(&mut self, id: TileId) -> Option<&mut Tile> {
        self.tiles.get_mut(id.index())
    }

    /// Iterates over all tiles in allocation order.
    pub fn iter(&self) -> impl Iterator<Item = &Tile> {
        self.tiles.iter()
    }
}

impl std::ops::Index<TileId> for TileArena {
    type Output = Tile;

    fn index(&self, id: TileId) -> &Tile {
        &self.tiles[id.index()]
    }
}
