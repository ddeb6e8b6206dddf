//! Tilescape - streaming engine for hierarchical 3D tilesets
//!
//! This library streams large, geospatially indexed 3D datasets over a
//! network and decides, every frame, which subset should be resident and
//! displayed to satisfy a target visual error given a camera.
//!
//! The core pieces are:
//!
//! - [`geometry`] - bounding volumes, frustum culling, and the
//!   screen-space-error metric
//! - [`tile`] - the tileset tree node and its load-state machine
//! - [`tileset`] - manifest parsing, tree construction, and tileset-wide
//!   configuration
//! - [`view`] - per-viewer selection state and the per-frame selection
//!   algorithm
//! - [`pipeline`] - the asynchronous content load pipeline and the host
//!   capabilities it is built from
//! - [`diagnostics`] - failure reporting and lock-free metrics
//!
//! Transport, content decoding, and rendering are consumed through narrow
//! injected interfaces; the engine compiles and is fully testable with mock
//! implementations of all of them.

pub mod diagnostics;
pub mod geometry;
pub mod pipeline;
pub mod tile;
pub mod tileset;
pub mod view;

pub use geometry::{BoundingVolume, Camera};
pub use pipeline::Externals;
pub use tile::{LoadState, Refine, Tile, TileId};
pub use tileset::{Tileset, TilesetOptions, TilesetSource};
pub use view::{TilesetView, ViewError, ViewUpdate};
