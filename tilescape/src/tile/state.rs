//! The tile content load-state machine.
//!
//! State advances only forward within one content generation:
//!
//! ```text
//! Unloaded -> ContentLoading -> ContentLoaded
//!          -> RendererResourcesPreparing -> RendererResourcesPrepared
//! ```
//!
//! plus a terminal `Failed` reachable from any mid-pipeline state. The cell
//! is written by the load pipeline (worker threads) and read by the
//! selection pass (render thread): stores are `Release` and loads are
//! `Acquire`, so a reader that observes a state also observes every write
//! (content slot, resource slot) made before that state was published.

use std::sync::atomic::{AtomicU8, Ordering};

/// Load state of a tile's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LoadState {
    /// No content request has been issued.
    Unloaded = 0,
    /// An asset request is in flight.
    ContentLoading = 1,
    /// Content bytes were received and decoded.
    ContentLoaded = 2,
    /// The renderer adapter is preparing resources for the content.
    RendererResourcesPreparing = 3,
    /// Content and renderer resources are ready; the tile is renderable.
    RendererResourcesPrepared = 4,
    /// Loading failed; the tile is permanently non-renderable and is never
    /// re-queued.
    Failed = 5,
}

impl LoadState {
    fn from_u8(value: u8) -> LoadState {
        match value {
            0 => LoadState::Unloaded,
            1 => LoadState::ContentLoading,
            2 => LoadState::ContentLoaded,
            3 => LoadState::RendererResourcesPreparing,
            4 => LoadState::RendererResourcesPrepared,
            _ => LoadState::Failed,
        }
    }
}

/// Atomic cell holding a [`LoadState`].
#[derive(Debug)]
pub struct StateCell(AtomicU8);

impl StateCell {
    pub fn new(state: LoadState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    /// Current state (acquire: pairs with [`StateCell::store`]).
    pub fn load(&self) -> LoadState {
        LoadState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Publishes a new state (release: makes prior slot writes visible).
    pub fn store(&self, state: LoadState) {
        self.0.store(state as u8, Ordering::Release);
    }

    /// Atomically moves `Unloaded -> ContentLoading`. Returns false if the
    /// tile was in any other state, making the load trigger idempotent.
    pub fn try_begin_loading(&self) -> bool {
        self.0
            .compare_exchange(
                LoadState::Unloaded as u8,
                LoadState::ContentLoading as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl Default for StateCell {
    fn default() -> Self {
        Self::new(LoadState::Unloaded)
    }
}
