//! Registry of live pixel buffers
//!
//! Every [`PixelBuffer`](crate::PixelBuffer) registers itself on
//! construction and unregisters on drop, so the owner of a
//! [`RasterContext`](crate::RasterContext) can see which buffers exist when
//! the display mode changes or memory runs low. The registry is shared by
//! handle and internally synchronized.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Identity of a registered buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u64);

/// Size snapshot of a live buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferInfo {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Default)]
struct RegistryState {
    live: BTreeMap<BufferId, BufferInfo>,
    next_id: u64,
}

/// Cloneable handle to the process-scoped buffer registry
#[derive(Debug, Clone, Default)]
pub struct BufferRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl BufferRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A panic while holding the lock cannot leave the map half-written
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocate an id for a new buffer and record it as live
    pub fn register(&self, width: u32, height: u32) -> BufferId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = BufferId(state.next_id);
        state.live.insert(id, BufferInfo { width, height });
        id
    }

    /// Forget a buffer. Unknown ids are ignored.
    pub fn unregister(&self, id: BufferId) {
        self.lock().live.remove(&id);
    }

    /// Record a size change of a live buffer
    pub fn update_size(&self, id: BufferId, width: u32, height: u32) {
        if let Some(info) = self.lock().live.get_mut(&id) {
            *info = BufferInfo { width, height };
        }
    }

    pub fn is_live(&self, id: BufferId) -> bool {
        self.lock().live.contains_key(&id)
    }

    pub fn live_count(&self) -> usize {
        self.lock().live.len()
    }

    /// Ids of all live buffers in creation order
    pub fn live_ids(&self) -> Vec<BufferId> {
        self.lock().live.keys().copied().collect()
    }

    /// Sum of the dense pixel footprint of all live buffers, in bytes
    pub fn total_pixel_bytes(&self) -> usize {
        self.lock()
            .live
            .values()
            .map(|info| info.width as usize * info.height as usize * 4)
            .sum()
    }

    /// Drop every entry (explicit shutdown)
    pub fn shutdown(&self) {
        let mut state = self.lock();
        if !state.live.is_empty() {
            log::debug!("registry shutdown with {} live buffers", state.live.len());
        }
        state.live.clear();
    }
}
