//! Graphics backend boundary
//!
//! Everything above this trait is GPU-free: operations build draw calls
//! and resolve targets, and the backend turns them into API work. The
//! production implementation is the wgpu renderer; [`NullBackend`]
//! swallows submissions for headless runs and tests.

use glam::Mat4;

use super::graph::Eye;
use super::target::{TargetDesc, TargetId};
use crate::ecs::Shape;

/// Error reported by a backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendError(pub String);

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for BackendError {}

/// One mesh drawn at a world transform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawCall {
    /// Mesh to draw
    pub shape: Shape,
    /// World matrix
    pub transform: Mat4,
}

/// The submission surface the render graph drives.
pub trait RenderBackend {
    /// Allocate GPU resources for a render target.
    ///
    /// # Errors
    ///
    /// Allocation failure; the frame degrades instead of aborting the
    /// process.
    fn create_target(&mut self, id: TargetId, desc: &TargetDesc) -> Result<(), BackendError>;

    /// Release a target's resources.
    fn dispose_target(&mut self, id: TargetId);

    /// Draw `calls` into `target` from the given eye.
    ///
    /// # Errors
    ///
    /// Submission failure (lost device, unknown target).
    fn submit(&mut self, target: TargetId, eye: &Eye, calls: &[DrawCall])
    -> Result<(), BackendError>;

    /// Present `target` to the surface, or to the offscreen texture an
    /// embedding editor consumes.
    ///
    /// # Errors
    ///
    /// Presentation failure; the previously presented image stays up.
    fn present(&mut self, target: TargetId) -> Result<(), BackendError>;

    /// The presentation surface was resized.
    fn resize(&mut self, _width: u32, _height: u32) {}
}

/// Backend that accepts everything and draws nothing.
///
/// Used by headless engines and unit tests; the counters let tests
/// observe what the graph submitted.
#[derive(Debug, Default)]
pub struct NullBackend {
    /// Descriptors of every target created, by id order
    pub created: Vec<TargetDesc>,
    /// Number of submit calls accepted
    pub submits: usize,
    /// Total draw calls across all submits
    pub draws: usize,
    /// Number of present calls accepted
    pub presents: usize,
}

impl RenderBackend for NullBackend {
    fn create_target(&mut self, _id: TargetId, desc: &TargetDesc) -> Result<(), BackendError> {
        self.created.push(*desc);
        Ok(())
    }

    fn dispose_target(&mut self, _id: TargetId) {}

    fn submit(
        &mut self,
        _target: TargetId,
        _eye: &Eye,
        calls: &[DrawCall],
    ) -> Result<(), BackendError> {
        self.submits += 1;
        self.draws += calls.len();
        Ok(())
    }

    fn present(&mut self, _target: TargetId) -> Result<(), BackendError> {
        self.presents += 1;
        Ok(())
    }
}
