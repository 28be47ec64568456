//! Shared state every buffer is created against
//!
//! A [`RasterContext`] replaces a global application object: it carries the
//! display layout used for native pixel data, the backend, the live-buffer
//! registry and the loaded [`RasterConfig`]. Buffers hold an `Arc` to it.

use std::sync::Arc;

use crate::config::RasterConfig;
use crate::display::{Backend, ChannelLayout, SoftwareBackend};
use crate::registry::BufferRegistry;

#[derive(Debug)]
pub struct RasterContext {
    config: RasterConfig,
    backend: Arc<dyn Backend>,
    registry: BufferRegistry,
}

impl RasterContext {
    /// Context with a fresh registry
    pub fn new(config: RasterConfig, backend: Arc<dyn Backend>) -> Arc<Self> {
        Self::with_registry(config, backend, BufferRegistry::new())
    }

    /// Context sharing an existing registry (e.g. after a display change
    /// swaps the backend but keeps tracking the same buffers)
    pub fn with_registry(
        config: RasterConfig,
        backend: Arc<dyn Backend>,
        registry: BufferRegistry,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            backend,
            registry,
        })
    }

    /// Software-only context with default settings
    pub fn software() -> Arc<Self> {
        Self::new(RasterConfig::default(), Arc::new(SoftwareBackend))
    }

    #[inline]
    pub fn config(&self) -> &RasterConfig {
        &self.config
    }

    #[inline]
    pub fn layout(&self) -> &ChannelLayout {
        &self.config.layout
    }

    #[inline]
    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    #[inline]
    pub fn registry(&self) -> &BufferRegistry {
        &self.registry
    }
}
