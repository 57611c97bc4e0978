//! Render target pool
//!
//! Target providers describe what they need; the pool reuses a free
//! target with a matching descriptor and only asks the backend to
//! allocate when nothing matches. All targets are released back to the
//! pool at the start of each frame.

use serde::{Deserialize, Serialize};

use super::backend::RenderBackend;
use super::graph::GraphError;

/// Identifier of a pooled render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TargetId(u32);

impl TargetId {
    /// Raw id value.
    #[must_use]
    pub const fn raw(&self) -> u32 {
        self.0
    }

    /// Rebuild an id from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
}

/// Pixel dimensions of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetSize {
    /// Track the presentation surface size
    Backbuffer,
    /// Fixed size in pixels
    Fixed {
        /// Width in pixels
        width: u32,
        /// Height in pixels
        height: u32,
    },
}

/// Color format of a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetFormat {
    /// 8-bit BGRA, matches the presentation surface
    Bgra8,
    /// 16-bit float RGBA for HDR rendering
    Hdr,
}

/// Everything needed to allocate or match a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TargetDesc {
    /// Size policy
    pub size: TargetSize,
    /// Color format
    pub format: TargetFormat,
    /// Whether a depth attachment is required
    pub depth: bool,
}

impl Default for TargetDesc {
    fn default() -> Self {
        Self {
            size: TargetSize::Backbuffer,
            format: TargetFormat::Bgra8,
            depth: true,
        }
    }
}

struct Entry {
    desc: TargetDesc,
    in_use: bool,
}

/// Allocate-or-reuse pool of render targets.
pub struct TargetPool {
    entries: Vec<Entry>,
}

impl TargetPool {
    /// Create an empty pool.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Release every target back to the pool; call at frame start.
    pub fn begin_frame(&mut self) {
        for entry in &mut self.entries {
            entry.in_use = false;
        }
    }

    /// Get a target matching `desc`, reusing a free one when possible.
    ///
    /// # Errors
    ///
    /// [`GraphError::Backend`] when the backend cannot allocate.
    pub fn acquire(
        &mut self,
        desc: TargetDesc,
        backend: &mut dyn RenderBackend,
    ) -> Result<TargetId, GraphError> {
        if let Some((index, entry)) = self
            .entries
            .iter_mut()
            .enumerate()
            .find(|(_, entry)| !entry.in_use && entry.desc == desc)
        {
            entry.in_use = true;
            return Ok(TargetId(index as u32));
        }

        let id = TargetId(self.entries.len() as u32);
        backend
            .create_target(id, &desc)
            .map_err(|e| GraphError::Backend(e.to_string()))?;
        self.entries.push(Entry { desc, in_use: true });
        log::debug!("allocated render target {id:?} {desc:?}");
        Ok(id)
    }

    /// Number of targets ever allocated.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the pool holds no targets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TargetPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::backend::NullBackend;

    #[test]
    fn test_matching_descriptor_is_reused_across_frames() {
        let mut pool = TargetPool::new();
        let mut backend = NullBackend::default();
        let desc = TargetDesc::default();

        pool.begin_frame();
        let first = pool.acquire(desc, &mut backend).unwrap();
        pool.begin_frame();
        let second = pool.acquire(desc, &mut backend).unwrap();

        assert_eq!(first, second);
        assert_eq!(backend.created.len(), 1);
    }

    #[test]
    fn test_mismatched_descriptor_allocates() {
        let mut pool = TargetPool::new();
        let mut backend = NullBackend::default();

        pool.begin_frame();
        let color = pool.acquire(TargetDesc::default(), &mut backend).unwrap();
        let hdr = pool
            .acquire(
                TargetDesc {
                    format: TargetFormat::Hdr,
                    ..Default::default()
                },
                &mut backend,
            )
            .unwrap();

        assert_ne!(color, hdr);
        assert_eq!(backend.created.len(), 2);
    }

    #[test]
    fn test_two_acquires_same_frame_get_distinct_targets() {
        let mut pool = TargetPool::new();
        let mut backend = NullBackend::default();
        let desc = TargetDesc::default();

        pool.begin_frame();
        let a = pool.acquire(desc, &mut backend).unwrap();
        let b = pool.acquire(desc, &mut backend).unwrap();

        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
    }
}
