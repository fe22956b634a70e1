//! # Cache Domains
//!
//! Where a buffer can be bound, and which GPU caches that makes it visible
//! through.

use bitflags::bitflags;

bitflags! {
    /// Pipeline binding points a buffer is currently attached to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct BindFlags: u32 {
        /// Vertex fetch
        const VERTEX_BUFFER = 1 << 0;
        /// Index fetch
        const INDEX_BUFFER = 1 << 1;
        /// Shader constant buffer
        const CONSTANT_BUFFER = 1 << 2;
        /// Texture / buffer sampler view
        const SAMPLER_VIEW = 1 << 3;
        /// Shader storage / image resource
        const SHADER_RESOURCE = 1 << 4;
        /// Stream-output target
        const STREAM_OUTPUT = 1 << 5;
        /// Colour render target
        const RENDER_TARGET = 1 << 6;
        /// Depth/stencil target
        const DEPTH_STENCIL = 1 << 7;
    }
}

bitflags! {
    /// GPU caches that may hold stale or unwritten data for a buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct CacheFlags: u32 {
        /// Vertex cache
        const VERTEX = 1 << 0;
        /// Shader constant cache
        const CONSTANT = 1 << 1;
        /// Texture cache
        const TEXTURE = 1 << 2;
        /// Stream-output / SMX path
        const STREAMOUT = 1 << 3;
        /// Colour buffer cache
        const COLOR = 1 << 4;
        /// Depth buffer cache
        const DEPTH = 1 << 5;
    }
}

impl Default for BindFlags {
    fn default() -> Self {
        BindFlags::empty()
    }
}

impl Default for CacheFlags {
    fn default() -> Self {
        CacheFlags::empty()
    }
}

impl CacheFlags {
    /// Caches a buffer with these bindings can be read or written through
    pub fn for_bindings(bind: BindFlags) -> Self {
        let mut caches = CacheFlags::empty();

        if bind.intersects(BindFlags::VERTEX_BUFFER | BindFlags::INDEX_BUFFER) {
            caches |= CacheFlags::VERTEX;
        }
        if bind.contains(BindFlags::CONSTANT_BUFFER) {
            caches |= CacheFlags::CONSTANT;
        }
        if bind.intersects(BindFlags::SAMPLER_VIEW | BindFlags::SHADER_RESOURCE) {
            caches |= CacheFlags::TEXTURE;
        }
        if bind.contains(BindFlags::STREAM_OUTPUT) {
            caches |= CacheFlags::STREAMOUT;
        }
        if bind.contains(BindFlags::RENDER_TARGET) {
            caches |= CacheFlags::COLOR;
        }
        if bind.contains(BindFlags::DEPTH_STENCIL) {
            caches |= CacheFlags::DEPTH;
        }

        caches
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_buffer_has_no_caches() {
        assert!(CacheFlags::for_bindings(BindFlags::empty()).is_empty());
    }

    #[test]
    fn test_binding_to_cache_mapping() {
        let caches = CacheFlags::for_bindings(BindFlags::INDEX_BUFFER | BindFlags::SAMPLER_VIEW);
        assert_eq!(caches, CacheFlags::VERTEX | CacheFlags::TEXTURE);

        let caches = CacheFlags::for_bindings(BindFlags::RENDER_TARGET | BindFlags::DEPTH_STENCIL);
        assert_eq!(caches, CacheFlags::COLOR | CacheFlags::DEPTH);
    }
}
