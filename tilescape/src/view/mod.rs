//! Per-frame tile selection.
//!
//! A [`TilesetView`] owns what one viewer saw last frame. Each call to
//! [`TilesetView::update`] walks the tree once, depth-first, and decides per
//! tile: cull it, render it, or refine into its children. The decisions
//! follow from the screen-space error of the tile's geometric error at the
//! camera's distance, with one hard rule against holes: a tile is only
//! refined when *all* of its children are renderable, otherwise the tile
//! itself is rendered while the children load.
//!
//! The pass never blocks on I/O. Tiles that should load are collected into
//! two priority queues during the walk (children blocking a refinement
//! before tiles rendered without content yet) and handed to the load
//! pipeline afterwards, bounded by `maximum_simultaneous_tile_loads`. The
//! same walk stamps every visited tile so the working-set unload pass knows
//! what is currently needed.
//!
//! Render-list deltas (`new_tiles_to_render`, `tiles_to_no_longer_render`)
//! come from comparing against the previous frame's per-tile results, so a
//! host can fade tiles in and out without diffing the full list itself.

use std::collections::HashSet;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::geometry::Camera;
use crate::tile::{LoadState, Tile, TileArena, TileId};
use crate::tileset::Tileset;

/// Errors from a selection pass.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewError {
    /// `update` was called while another update for the same view was still
    /// running.
    #[error("a selection pass for this view is already running")]
    UpdateInProgress,
}

/// What a selection pass decided for one tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum SelectionResult {
    /// Not visited, or visited by an older frame.
    #[default]
    None,
    /// Outside the view frustum.
    Culled,
    /// Selected for rendering.
    Rendered,
    /// Replaced by its children.
    Refined,
}

/// Per-tile memory of the frame that last decided about the tile.
#[derive(Debug, Clone, Copy, Default)]
struct TileSelectionState {
    frame: u32,
    result: SelectionResult,
}

/// Output of one selection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewUpdate {
    /// Every tile to draw this frame, in traversal order.
    pub tiles_to_render: Vec<TileId>,
    /// Tiles in `tiles_to_render` that were not rendered last frame.
    pub new_tiles_to_render: Vec<TileId>,
    /// Tiles rendered last frame that must no longer be drawn.
    pub tiles_to_no_longer_render: Vec<TileId>,
    /// Number of selected tiles still mid-load after this pass.
    pub tiles_loading: u32,
}

/// One viewer's frame-to-frame selection state for a tileset.
pub struct TilesetView {
    name: String,
    inner: Mutex<ViewState>,
}

struct ViewState {
    frame_number: u32,
    results: Vec<TileSelectionState>,
}

impl TilesetView {
    /// Creates a view for `tileset`. A view belongs to the tileset it was
    /// created for and must not be reused across tilesets.
    pub fn new(tileset: &Tileset, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(ViewState {
                frame_number: 0,
                results: vec![TileSelectionState::default(); tileset.arena().len()],
            }),
        }
    }

    /// Name given at creation, for logs.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs one selection pass and returns the render-list deltas.
    ///
    /// Fails fast instead of blocking when an update for this view is
    /// already in progress on another thread.
    pub fn update(&self, tileset: &Tileset, camera: &Camera) -> Result<ViewUpdate, ViewError> {
        let mut state = self.inner.try_lock().ok_or(ViewError::UpdateInProgress)?;

        let arena = tileset.arena();
        if state.results.len() != arena.len() {
            state.results = vec![TileSelectionState::default(); arena.len()];
        }

        let last_frame = state.frame_number;
        let current_frame = last_frame.wrapping_add(1);
        let mut update = ViewUpdate::default();

        let Some(root) = tileset.root_id() else {
            state.frame_number = current_frame;
            return Ok(update);
        };

        let stamp = tileset.next_touch_stamp();
        let mut traversal = Traversal {
            arena,
            camera,
            threshold: tileset.options().maximum_screen_space_error,
            last_frame,
            current_frame,
            stamp,
            results: &mut state.results,
            update: &mut update,
            high_priority: Vec::new(),
            medium_priority: Vec::new(),
            queued: HashSet::new(),
        };
        traversal.visit(root);

        let Traversal {
            high_priority,
            medium_priority,
            queued,
            ..
        } = traversal;

        tileset.unload_unused_tiles(stamp);

        let cap = tileset.options().maximum_simultaneous_tile_loads as u64;
        for id in high_priority.into_iter().chain(medium_priority) {
            if tileset.metrics_counters().loads_in_progress() >= cap {
                break;
            }
            tileset.pipeline().load_content(id);
        }

        for &id in &queued {
            match arena[id].state() {
                LoadState::ContentLoading
                | LoadState::ContentLoaded
                | LoadState::RendererResourcesPreparing => update.tiles_loading += 1,
                _ => {}
            }
        }

        debug!(
            view = %self.name,
            rendered = update.tiles_to_render.len(),
            loading = update.tiles_loading,
            "selection pass complete"
        );

        state.frame_number = current_frame;
        Ok(update)
    }
}

/// Working state of one depth-first selection walk.
struct Traversal<'a> {
    arena: &'a TileArena,
    camera: &'a Camera,
    threshold: f64,
    last_frame: u32,
    current_frame: u32,
    stamp: u64,
    results: &'a mut Vec<TileSelectionState>,
    update: &'a mut ViewUpdate,
    /// Children blocking a wanted refinement.
    high_priority: Vec<TileId>,
    /// Tiles selected for rendering but not yet loaded.
    medium_priority: Vec<TileId>,
    queued: HashSet<TileId>,
}

impl Traversal<'_> {
    fn visit(&mut self, id: TileId) {
        let arena = self.arena;
        let tile = &arena[id];
        tile.touch(self.stamp);

        if !self.camera.is_bounding_volume_visible(tile.bounding_volume()) {
            self.mark_tile_non_rendered(id);
            self.set_result(id, SelectionResult::Culled);
            return;
        }

        // Leaves render regardless of their error; there is nothing finer.
        if tile.child_count() == 0 {
            self.render_tile(id);
            return;
        }

        let distance = self
            .camera
            .distance_squared_to_bounding_volume(tile.bounding_volume())
            .sqrt();
        let sse = self.camera.screen_space_error(tile.geometric_error(), distance);

        if sse <= self.threshold {
            self.render_tile(id);
            return;
        }

        // Refinement is all-or-nothing: every child must be renderable, or
        // this tile keeps rendering while the children load.
        let mut all_children_ready = true;
        for child_id in tile.children() {
            let child = &arena[child_id];
            if !self.wants_content(child) || child.is_renderable() {
                continue;
            }
            all_children_ready = false;
            if child.state() != LoadState::Failed && self.queued.insert(child_id) {
                self.high_priority.push(child_id);
            }
        }

        if !all_children_ready {
            self.render_tile(id);
            return;
        }

        if self.last_result(id) == SelectionResult::Rendered {
            self.update.tiles_to_no_longer_render.push(id);
        }
        self.set_result(id, SelectionResult::Refined);
        for child_id in tile.children() {
            self.visit(child_id);
        }
    }

    /// Selects `id` for rendering, collapsing any subtree it was refined
    /// into last frame and queueing its own content if still missing.
    fn render_tile(&mut self, id: TileId) {
        self.mark_children_non_rendered(id);

        if self.last_result(id) != SelectionResult::Rendered {
            self.update.new_tiles_to_render.push(id);
        }
        self.update.tiles_to_render.push(id);
        self.set_result(id, SelectionResult::Rendered);

        let tile = &self.arena[id];
        if self.wants_content(tile)
            && !tile.is_renderable()
            && tile.state() != LoadState::Failed
            && self.queued.insert(id)
        {
            self.medium_priority.push(id);
        }
    }

    /// Whether the viewer is inside the tile's request volume, if it has
    /// one. Outside it, no content is requested and the tile never blocks a
    /// refinement.
    fn wants_content(&self, tile: &Tile) -> bool {
        tile.viewer_request_volume()
            .map_or(true, |volume| volume.distance_squared_to(self.camera.position()) == 0.0)
    }

    /// Emits no-longer-render for `id` if it was rendered last frame, and
    /// recurses through subtrees it was refined into.
    fn mark_tile_non_rendered(&mut self, id: TileId) {
        match self.last_result(id) {
            SelectionResult::Rendered => {
                self.update.tiles_to_no_longer_render.push(id);
            }
            SelectionResult::Refined => {
                let arena = self.arena;
                for child_id in arena[id].children() {
                    self.mark_tile_non_rendered(child_id);
                }
            }
            SelectionResult::None | SelectionResult::Culled => {}
        }
    }

    /// Same as [`Traversal::mark_tile_non_rendered`] but for the subtree
    /// below `id` only: the tile itself is about to be rendered again.
    fn mark_children_non_rendered(&mut self, id: TileId) {
        if self.last_result(id) == SelectionResult::Refined {
            let arena = self.arena;
            for child_id in arena[id].children() {
                self.mark_tile_non_rendered(child_id);
            }
        }
    }

    fn last_result(&self, id: TileId) -> SelectionResult {
        let entry = self.results[id.index()];
        if entry.frame == self.last_frame {
            entry.result
        } else {
            SelectionResult::None
        }
    }

    fn set_result(&mut self, id: TileId, result: SelectionResult) {
        self.results[id.index()] = TileSelectionState {
            frame: self.current_frame,
            result,
        };
    }
}
