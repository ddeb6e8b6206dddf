//! The asynchronous tile content load pipeline.
//!
//! A load is triggered at most once per content generation via an atomic
//! compare-and-swap on the tile's state cell, then runs to completion as a
//! single task on the host's executor:
//!
//! ```text
//! fetch bytes -> decode content -> prepare renderer resources
//! ```
//!
//! Every failure along the way reports one diagnostic event and parks the
//! tile in the terminal `Failed` state; nothing is retried. Tasks are never
//! cancelled, so a load that outlives the camera that wanted it simply
//! finishes and leaves a warm cache entry behind.

mod accessor;
mod content;
mod tasks;

pub use accessor::{AccessorError, AssetAccessor, AssetResponse, ReqwestAccessor};
pub use content::{ContentDecoder, RendererAdapter, RendererError};
pub use tasks::{InlineTaskProcessor, TaskProcessor, TokioTaskProcessor};

#[cfg(test)]
pub(crate) use accessor::tests::MockAssetAccessor;
#[cfg(test)]
pub(crate) use content::tests::{
    CountingAdapter, FailingAdapter, PassthroughDecoder, RejectingDecoder,
};

use std::sync::Arc;

use tracing::{debug, warn};

use crate::diagnostics::{DiagnosticEvent, DiagnosticsSink, TilesetMetrics};
use crate::tile::{LoadState, TileArena, TileId};
use crate::tileset::manifest;

/// Host-provided capabilities the engine runs against.
#[derive(Clone)]
pub struct Externals {
    pub accessor: Arc<dyn AssetAccessor>,
    pub tasks: Arc<dyn TaskProcessor>,
    pub decoder: Arc<dyn ContentDecoder>,
    /// Absent for headless hosts; tiles then skip resource preparation.
    pub renderer: Option<Arc<dyn RendererAdapter>>,
    pub diagnostics: Arc<dyn DiagnosticsSink>,
}

/// Drives tile content through the load-state machine.
pub(crate) struct LoadPipeline {
    arena: Arc<TileArena>,
    externals: Externals,
    metrics: Arc<TilesetMetrics>,
}

impl LoadPipeline {
    pub(crate) fn new(
        arena: Arc<TileArena>,
        externals: Externals,
        metrics: Arc<TilesetMetrics>,
    ) -> Self {
        Self {
            arena,
            externals,
            metrics,
        }
    }

    /// Triggers a content load for `id`. Returns whether a load was actually
    /// started; repeat calls while a load is in flight, after completion, or
    /// after failure are no-ops.
    pub(crate) fn load_content(&self, id: TileId) -> bool {
        let Some(tile) = self.arena.get(id) else {
            return false;
        };
        if !tile.state_cell().try_begin_loading() {
            return false;
        }

        self.metrics.load_started();

        let Some(url) = tile.content_uri().map(String::from) else {
            // Nothing to fetch or prepare: renderable immediately, so
            // refinement over this tile never blocks on it.
            tile.state_cell().store(LoadState::RendererResourcesPrepared);
            self.metrics.load_completed(0);
            return true;
        };

        debug!(url = %url, "starting tile content load");

        let arena = Arc::clone(&self.arena);
        let externals = self.externals.clone();
        let metrics = Arc::clone(&self.metrics);
        self.externals.tasks.start_task(Box::pin(async move {
            run_load(arena, externals, metrics, id, url).await;
        }));
        true
    }
}

/// One complete load, from request to renderable (or failed) tile.
async fn run_load(
    arena: Arc<TileArena>,
    externals: Externals,
    metrics: Arc<TilesetMetrics>,
    id: TileId,
    url: String,
) {
    let tile = &arena[id];

    let response = match externals.accessor.request_asset(&url).await {
        Ok(response) => response,
        Err(err) => {
            warn!(url = %url, error = %err, "tile request failed");
            externals.diagnostics.report(&DiagnosticEvent::TransportFailure {
                url,
                message: err.to_string(),
            });
            tile.state_cell().store(LoadState::Failed);
            metrics.load_failed();
            return;
        }
    };

    if !response.is_success() {
        warn!(url = %url, status = response.status, "tile request returned error status");
        externals.diagnostics.report(&DiagnosticEvent::HttpStatus {
            url,
            status: response.status,
        });
        tile.state_cell().store(LoadState::Failed);
        metrics.load_failed();
        return;
    }

    let data = response.data;
    match externals.decoder.create_content(&url, &data) {
        Some(content) => {
            // The content slot must be filled before the release store that
            // publishes the state to the selection pass.
            tile.set_content(Some(content));
            tile.state_cell().store(LoadState::ContentLoaded);
        }
        None => {
            if manifest::looks_like_manifest(&data) {
                warn!(url = %url, "tile content is a nested tileset manifest");
                externals
                    .diagnostics
                    .report(&DiagnosticEvent::ExternalTileset { url });
            } else {
                warn!(url = %url, "tile content not recognized by decoder");
                externals
                    .diagnostics
                    .report(&DiagnosticEvent::UndecodableContent { url });
            }
            tile.state_cell().store(LoadState::Failed);
            metrics.load_failed();
            return;
        }
    }

    match &externals.renderer {
        Some(renderer) => {
            tile.state_cell().store(LoadState::RendererResourcesPreparing);
            match renderer.prepare(tile).await {
                Ok(resources) => {
                    tile.set_renderer_resources(resources);
                    tile.state_cell().store(LoadState::RendererResourcesPrepared);
                }
                Err(err) => {
                    warn!(url = %url, error = %err, "renderer resource preparation failed");
                    tile.state_cell().store(LoadState::Failed);
                    metrics.load_failed();
                    return;
                }
            }
        }
        None => {
            tile.state_cell().store(LoadState::RendererResourcesPrepared);
        }
    }

    metrics.load_completed(data.len() as u64);
}
