//! A streamed tileset: the tile tree plus everything needed to load it.
//!
//! Construction fetches and parses the manifest, builds the tile tree into
//! an arena, and wires up the load pipeline. Network and parse failures at
//! construction are not fatal: they are reported through the diagnostics
//! sink and yield an empty tileset that renders nothing, so one bad URL
//! never takes the host down.

mod builder;
pub mod manifest;

pub use manifest::ManifestError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info};

use crate::diagnostics::{DiagnosticEvent, MetricsSnapshot, TilesetMetrics};
use crate::geometry::Camera;
use crate::pipeline::{Externals, LoadPipeline};
use crate::tile::{LoadState, Tile, TileArena, TileId};
use crate::view::{TilesetView, ViewError, ViewUpdate};

/// Base URL of the hosted-asset API.
const HOSTED_ASSET_API: &str = "https://api.cesium.com";

/// Where a tileset's manifest comes from.
#[derive(Debug, Clone)]
pub enum TilesetSource {
    /// A direct manifest URL.
    Url(String),
    /// An asset hosted behind the asset API, resolved through its endpoint
    /// lookup.
    HostedAsset {
        asset_id: u64,
        access_token: Option<String>,
    },
}

/// Tuning knobs for selection and caching.
#[derive(Debug, Clone)]
pub struct TilesetOptions {
    /// Largest screen-space error, in pixels, tolerated before a tile is
    /// refined into its children.
    pub maximum_screen_space_error: f64,
    /// Upper bound on concurrently in-flight content loads.
    pub maximum_simultaneous_tile_loads: usize,
    /// Loaded-tile count above which least-recently-used tiles outside the
    /// working set are unloaded.
    pub maximum_cached_tiles: usize,
}

impl Default for TilesetOptions {
    fn default() -> Self {
        Self {
            maximum_screen_space_error: 16.0,
            maximum_simultaneous_tile_loads: 20,
            maximum_cached_tiles: 512,
        }
    }
}

/// A streamed tileset.
pub struct Tileset {
    arena: Arc<TileArena>,
    root: Option<TileId>,
    source: TilesetSource,
    options: TilesetOptions,
    externals: Externals,
    pipeline: LoadPipeline,
    metrics: Arc<TilesetMetrics>,
    // Monotonic working-set clock; each selection pass takes one stamp.
    touch_counter: AtomicU64,
}

impl Tileset {
    /// Builds a tileset from manifest bytes already in hand, resolving
    /// relative content URIs against `base_url`.
    pub fn from_manifest_bytes(
        externals: Externals,
        data: &[u8],
        base_url: &str,
        options: TilesetOptions,
    ) -> Result<Self, ManifestError> {
        let doc = manifest::parse_manifest(data)?;
        let (arena, root) = builder::build_tree(&doc, base_url, &*externals.diagnostics)?;
        Ok(Self::assemble(
            externals,
            arena,
            root,
            TilesetSource::Url(base_url.to_string()),
            options,
        ))
    }

    /// Fetches a manifest by URL and builds the tileset. Failures surface
    /// as diagnostics and an empty tileset.
    pub async fn from_url(
        externals: Externals,
        url: impl Into<String>,
        options: TilesetOptions,
    ) -> Self {
        let url = url.into();
        let source = TilesetSource::Url(url.clone());
        let (arena, root) = Self::fetch_tree(&externals, &url).await;
        Self::assemble(externals, arena, root, source, options)
    }

    /// Resolves a hosted asset through the asset API's endpoint lookup,
    /// then fetches the manifest it points at with the granted token.
    pub async fn from_hosted_asset(
        externals: Externals,
        asset_id: u64,
        access_token: Option<String>,
        options: TilesetOptions,
    ) -> Self {
        let source = TilesetSource::HostedAsset {
            asset_id,
            access_token: access_token.clone(),
        };

        let mut endpoint_url = format!("{HOSTED_ASSET_API}/v1/assets/{asset_id}/endpoint");
        if let Some(token) = &access_token {
            endpoint_url = append_access_token(&endpoint_url, token);
        }

        let (arena, root) = match Self::fetch_endpoint(&externals, &endpoint_url).await {
            Some(manifest_url) => Self::fetch_tree(&externals, &manifest_url).await,
            None => empty_tree(),
        };
        Self::assemble(externals, arena, root, source, options)
    }

    /// One endpoint lookup: returns the manifest URL with the granted
    /// access token appended, or `None` after reporting the failure.
    async fn fetch_endpoint(externals: &Externals, endpoint_url: &str) -> Option<String> {
        let response = match externals.accessor.request_asset(endpoint_url).await {
            Ok(response) => response,
            Err(err) => {
                externals
                    .diagnostics
                    .report(&DiagnosticEvent::TransportFailure {
                        url: endpoint_url.to_string(),
                        message: err.to_string(),
                    });
                return None;
            }
        };
        if !response.is_success() {
            externals.diagnostics.report(&DiagnosticEvent::HttpStatus {
                url: endpoint_url.to_string(),
                status: response.status,
            });
            return None;
        }

        let endpoint: manifest::HostedAssetEndpoint = match serde_json::from_slice(&response.data)
        {
            Ok(endpoint) => endpoint,
            Err(err) => {
                externals
                    .diagnostics
                    .report(&DiagnosticEvent::ManifestParseFailure {
                        url: endpoint_url.to_string(),
                        message: err.to_string(),
                    });
                return None;
            }
        };

        let mut url = endpoint.url;
        if let Some(token) = endpoint.access_token {
            url = append_access_token(&url, &token);
        }
        Some(url)
    }

    /// Fetches and parses a manifest, building the tree against the
    /// response's final URL so relative content URIs survive redirects.
    async fn fetch_tree(externals: &Externals, url: &str) -> (TileArena, Option<TileId>) {
        let response = match externals.accessor.request_asset(url).await {
            Ok(response) => response,
            Err(err) => {
                externals
                    .diagnostics
                    .report(&DiagnosticEvent::TransportFailure {
                        url: url.to_string(),
                        message: err.to_string(),
                    });
                return empty_tree();
            }
        };
        if !response.is_success() {
            externals.diagnostics.report(&DiagnosticEvent::HttpStatus {
                url: url.to_string(),
                status: response.status,
            });
            return empty_tree();
        }

        let doc = match manifest::parse_manifest(&response.data) {
            Ok(doc) => doc,
            Err(err) => {
                externals
                    .diagnostics
                    .report(&DiagnosticEvent::ManifestParseFailure {
                        url: response.url.clone(),
                        message: err.to_string(),
                    });
                return empty_tree();
            }
        };

        match builder::build_tree(&doc, &response.url, &*externals.diagnostics) {
            Ok(pair) => pair,
            Err(err) => {
                externals
                    .diagnostics
                    .report(&DiagnosticEvent::ManifestSchemaViolation {
                        url: response.url.clone(),
                        detail: err.to_string(),
                    });
                empty_tree()
            }
        }
    }

    fn assemble(
        externals: Externals,
        arena: TileArena,
        root: Option<TileId>,
        source: TilesetSource,
        options: TilesetOptions,
    ) -> Self {
        let arena = Arc::new(arena);
        let metrics = Arc::new(TilesetMetrics::new());
        let pipeline = LoadPipeline::new(Arc::clone(&arena), externals.clone(), Arc::clone(&metrics));
        info!(tiles = arena.len(), "tileset constructed");
        Self {
            arena,
            root,
            source,
            options,
            externals,
            pipeline,
            metrics,
            touch_counter: AtomicU64::new(0),
        }
    }

    /// All tiles of the tileset.
    pub fn arena(&self) -> &TileArena {
        &self.arena
    }

    /// The root tile, absent for an empty tileset.
    pub fn root(&self) -> Option<&Tile> {
        self.root.map(|id| &self.arena[id])
    }

    pub(crate) fn root_id(&self) -> Option<TileId> {
        self.root
    }

    /// Where the manifest came from.
    pub fn source(&self) -> &TilesetSource {
        &self.source
    }

    pub fn options(&self) -> &TilesetOptions {
        &self.options
    }

    /// Point-in-time load-pipeline counters.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Runs one selection pass for `view` with the given camera.
    pub fn update_view(
        &self,
        view: &TilesetView,
        camera: &Camera,
    ) -> Result<ViewUpdate, ViewError> {
        view.update(self, camera)
    }

    pub(crate) fn pipeline(&self) -> &LoadPipeline {
        &self.pipeline
    }

    pub(crate) fn metrics_counters(&self) -> &TilesetMetrics {
        &self.metrics
    }

    pub(crate) fn next_touch_stamp(&self) -> u64 {
        self.touch_counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Unloads least-recently-touched prepared tiles until the loaded count
    /// is back under `maximum_cached_tiles`. Tiles touched by the selection
    /// pass that took `current_stamp`, the root, and tiles mid-load are
    /// never unloaded.
    pub(crate) fn unload_unused_tiles(&self, current_stamp: u64) {
        let maximum = self.options.maximum_cached_tiles;

        let mut loaded = 0usize;
        let mut candidates: Vec<(u64, TileId)> = Vec::new();
        for tile in self.arena.iter() {
            match tile.state() {
                LoadState::ContentLoading
                | LoadState::ContentLoaded
                | LoadState::RendererResourcesPreparing
                | LoadState::RendererResourcesPrepared => loaded += 1,
                LoadState::Unloaded | LoadState::Failed => continue,
            }
            if tile.state() == LoadState::RendererResourcesPrepared
                && Some(tile.id()) != self.root
                && tile.last_touched() < current_stamp
            {
                candidates.push((tile.last_touched(), tile.id()));
            }
        }
        if loaded <= maximum {
            return;
        }

        candidates.sort_unstable_by_key(|&(stamp, _)| stamp);
        for (_, id) in candidates {
            if loaded <= maximum {
                break;
            }
            let tile = &self.arena[id];
            let (unloaded, resources) = tile.unload_content();
            if !unloaded {
                continue;
            }
            if let (Some(renderer), Some(resources)) = (&self.externals.renderer, resources) {
                renderer.free(tile, resources);
            }
            self.metrics.tile_unloaded();
            loaded -= 1;
            debug!(tile = id.index(), "unloaded tile outside working set");
        }
    }
}

fn empty_tree() -> (TileArena, Option<TileId>) {
    (TileArena::with_capacity(0), None)
}

fn append_access_token(url: &str, token: &str) -> String {
    if url.contains('?') {
        format!("{url}&access_token={token}")
    } else {
        format!("{url}?access_token={token}")
    }
}
