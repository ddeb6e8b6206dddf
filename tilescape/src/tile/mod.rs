//! A node of the tileset tree.
//!
//! Tiles are identified by a stable index into their owning arena, never by
//! address. Spatial metadata (bounding volumes, geometric error, transform)
//! is immutable after tree construction; only the load state, the content
//! slot, the renderer-resource slot, and the working-set timestamp mutate
//! afterwards, and only through the load pipeline or the unload pass.

mod arena;
mod state;

pub use arena::TileArena;
pub use state::{LoadState, StateCell};

use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};

use glam::DMat4;
use parking_lot::Mutex;

use crate::geometry::BoundingVolume;

/// Stable index of a tile within its arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileId(pub(crate) u32);

impl TileId {
    /// Index into the owning arena.
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// How a tile's children relate to its own content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refine {
    /// Children fully substitute the parent's content when refined.
    Replace,
    /// Children supplement the parent's content.
    Add,
}

/// Decoded tile payload. Opaque to the engine; produced by the injected
/// content decoder and owned by the tile once loaded.
pub type TileContent = Box<dyn Any + Send + Sync>;

/// Renderer-prepared resources for a tile. Opaque to the engine; produced
/// and freed by the renderer adapter.
pub type RendererResources = Box<dyn Any + Send + Sync>;

/// One node of the tileset tree.
pub struct Tile {
    id: TileId,
    parent: Option<TileId>,
    // Children occupy one contiguous arena range, established before any
    // reference into the range is handed out.
    first_child: u32,
    child_count: u32,
    bounding_volume: BoundingVolume,
    content_bounding_volume: Option<BoundingVolume>,
    viewer_request_volume: Option<BoundingVolume>,
    geometric_error: f64,
    refine: Refine,
    transform: DMat4,
    content_uri: Option<String>,
    state: StateCell,
    content: Mutex<Option<TileContent>>,
    renderer_resources: Mutex<Option<RendererResources>>,
    last_touched: AtomicU64,
}

impl Tile {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: TileId,
        parent: Option<TileId>,
        bounding_volume: BoundingVolume,
        content_bounding_volume: Option<BoundingVolume>,
        viewer_request_volume: Option<BoundingVolume>,
        geometric_error: f64,
        refine: Refine,
        transform: DMat4,
        content_uri: Option<String>,
    ) -> Self {
        Self {
            id,
            parent,
            first_child: 0,
            child_count: 0,
            bounding_volume,
            content_bounding_volume,
            viewer_request_volume,
            geometric_error,
            refine,
            transform,
            content_uri,
            state: StateCell::default(),
            content: Mutex::new(None),
            renderer_resources: Mutex::new(None),
            last_touched: AtomicU64::new(0),
        }
    }

    /// This tile's arena index.
    pub fn id(&self) -> TileId {
        self.id
    }

    /// The parent tile, if any.
    pub fn parent(&self) -> Option<TileId> {
        self.parent
    }

    /// Identifiers of this tile's children: one contiguous arena range.
    pub fn children(&self) -> impl ExactSizeIterator<Item = TileId> {
        (self.first_child..self.first_child + self.child_count).map(TileId)
    }

    /// Number of children.
    pub fn child_count(&self) -> usize {
        self.child_count as usize
    }

    pub(crate) fn set_children(&mut self, first_child: TileId, count: usize) {
        debug_assert_eq!(self.child_count, 0, "children already created");
        self.first_child = first_child.0;
        self.child_count = count as u32;
    }

    /// The tile's bounding volume, already in world coordinates.
    pub fn bounding_volume(&self) -> &BoundingVolume {
        &self.bounding_volume
    }

    /// Optional tighter bounding volume around just the tile's content.
    pub fn content_bounding_volume(&self) -> Option<&BoundingVolume> {
        self.content_bounding_volume.as_ref()
    }

    /// Optional volume the viewer must be inside for content to be
    /// requested.
    pub fn viewer_request_volume(&self) -> Option<&BoundingVolume> {
        self.viewer_request_volume.as_ref()
    }

    /// World-space error introduced by rendering this tile instead of
    /// refining to its children.
    pub fn geometric_error(&self) -> f64 {
        self.geometric_error
    }

    /// Refinement policy for this tile's children.
    pub fn refine(&self) -> Refine {
        self.refine
    }

    /// Local-to-world transform, composed multiplicatively from the parent.
    pub fn transform(&self) -> &DMat4 {
        &self.transform
    }

    /// Resolved content URI, if the tile has content.
    pub fn content_uri(&self) -> Option<&str> {
        self.content_uri.as_deref()
    }

    /// Current load state.
    pub fn state(&self) -> LoadState {
        self.state.load()
    }

    /// True when the tile can be rendered: content and renderer resources
    /// are ready. This is the only signal the selection pass uses.
    pub fn is_renderable(&self) -> bool {
        self.state.load() == LoadState::RendererResourcesPrepared
    }

    pub(crate) fn state_cell(&self) -> &StateCell {
        &self.state
    }

    /// Stores decoded content. Must be called before the state store that
    /// publishes it.
    pub(crate) fn set_content(&self, content: Option<TileContent>) {
        *self.content.lock() = content;
    }

    /// True if the tile currently holds decoded content.
    pub fn has_content(&self) -> bool {
        self.content.lock().is_some()
    }

    pub(crate) fn set_renderer_resources(&self, resources: Option<RendererResources>) {
        *self.renderer_resources.lock() = resources;
    }

    /// Runs `f` with the renderer resources, if any are attached.
    pub fn with_renderer_resources<R>(
        &self,
        f: impl FnOnce(&(dyn Any + Send + Sync)) -> R,
    ) -> Option<R> {
        self.renderer_resources.lock().as_ref().map(|r| f(&**r))
    }

    /// Working-set timestamp: the global visit counter value when this tile
    /// was last touched by a selection pass.
    pub(crate) fn last_touched(&self) -> u64 {
        self.last_touched.load(Ordering::Relaxed)
    }

    pub(crate) fn touch(&self, stamp: u64) {
        self.last_touched.store(stamp, Ordering::Relaxed);
    }

    /// Drops content, moving the tile back to `Unloaded` (a new content
    /// generation), and returns any renderer resources for the caller to
    /// free.
    ///
    /// Acts only on fully prepared tiles: every other state is either empty
    /// or owned by an in-flight load task, and `Failed` stays failed so the
    /// tile is not retried. Returns whether the tile was unloaded.
    pub(crate) fn unload_content(&self) -> (bool, Option<RendererResources>) {
        if self.state.load() != LoadState::RendererResourcesPrepared {
            return (false, None);
        }

        let resources = self.renderer_resources.lock().take();
        *self.content.lock() = None;
        self.state.store(LoadState::Unloaded);
        (true, resources)
    }

    #[cfg(test)]
    pub(crate) fn force_state(&self, state: LoadState) {
        self.state.store(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BoundingSphere;
    use glam::DVec3;

    pub(crate) fn test_tile(id: u32) -> Tile {
        Tile::new(
            TileId(id),
            None,
            BoundingVolume::from_sphere(BoundingSphere::new(DVec3::ZERO, 1.0)),
            None,
            None,
            16.0,
            Refine::Replace,
            DMat4::IDENTITY,
            Some("tile.bin".to_string()),
        )
    }

    #[test]
    fn test_new_tile_is_unloaded() {
        let tile = test_tile(0);
        assert_eq!(tile.state(), LoadState::Unloaded);
        assert!(!tile.is_renderable());
        assert!(!tile.has_content());
    }

    #[test]
    fn test_children_range() {
        let mut tile = test_tile(0);
        tile.set_children(TileId(4), 3);
        let ids: Vec<_> = tile.children().collect();
        assert_eq!(ids, vec![TileId(4), TileId(5), TileId(6)]);
        assert_eq!(tile.child_count(), 3);
    }

    #[test]
    fn test_renderable_only_when_prepared() {
        let tile = test_tile(0);
        tile.force_state(LoadState::ContentLoaded);
        assert!(!tile.is_renderable());
        tile.force_state(LoadState::RendererResourcesPrepared);
        assert!(tile.is_renderable());
    }

    #[test]
    fn test_unload_refuses_mid_flight() {
        let tile = test_tile(0);
        tile.force_state(LoadState::ContentLoading);
        let (unloaded, resources) = tile.unload_content();
        assert!(!unloaded);
        assert!(resources.is_none());
        assert_eq!(tile.state(), LoadState::ContentLoading);
    }

    #[test]
    fn test_unload_keeps_failed_sticky() {
        let tile = test_tile(0);
        tile.force_state(LoadState::Failed);
        tile.unload_content();
        assert_eq!(tile.state(), LoadState::Failed);
    }

    #[test]
    fn test_unload_drops_content_and_resets() {
        let tile = test_tile(0);
        tile.set_content(Some(Box::new(vec![1u8, 2, 3])));
        tile.set_renderer_resources(Some(Box::new("gpu handle")));
        tile.force_state(LoadState::RendererResourcesPrepared);

        let (unloaded, resources) = tile.unload_content();
        assert!(unloaded);
        assert!(resources.is_some());
        assert!(!tile.has_content());
        assert_eq!(tile.state(), LoadState::Unloaded);
    }
}
