//! Content decoding and renderer-resource preparation hooks.
//!
//! The engine moves bytes and drives states; it does not understand tile
//! payload formats and it owns no GPU objects. Both concerns are injected:
//! the host's [`ContentDecoder`] turns bytes into opaque content, and its
//! [`RendererAdapter`] turns content into opaque renderer resources that the
//! engine attaches to the tile and later hands back for freeing.

use bytes::Bytes;
use futures::future::BoxFuture;
use thiserror::Error;

use crate::tile::{RendererResources, Tile, TileContent};

/// Error produced by a renderer adapter while preparing resources.
#[derive(Debug, Error)]
#[error("renderer resource preparation failed: {0}")]
pub struct RendererError(pub String);

/// Turns raw asset bytes into decoded tile content.
///
/// Called on a worker task, never on the render thread.
pub trait ContentDecoder: Send + Sync {
    /// Decodes `data` fetched from `url`. Returns `None` when the bytes are
    /// not a recognized content format; the tile is then failed.
    fn create_content(&self, url: &str, data: &Bytes) -> Option<TileContent>;
}

/// Prepares and frees per-tile renderer resources.
pub trait RendererAdapter: Send + Sync {
    /// Builds renderer resources for a tile whose content just finished
    /// decoding. May complete asynchronously (GPU upload on another
    /// thread); the tile stays in `RendererResourcesPreparing` until the
    /// future resolves.
    fn prepare<'a>(
        &'a self,
        tile: &'a Tile,
    ) -> BoxFuture<'a, Result<Option<RendererResources>, RendererError>>;

    /// Frees resources previously returned by [`RendererAdapter::prepare`].
    /// Called when the tile's content is unloaded.
    fn free(&self, tile: &Tile, resources: RendererResources);

    /// Notifies the adapter that a preparation will not be waited for. The
    /// engine lets in-flight loads run to completion and never calls this
    /// itself; hosts driving their own teardown may.
    fn cancel(&self, _tile: &Tile) {}
}
