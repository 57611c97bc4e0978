//! Rendering module
//!
//! Frames are produced by a graph of typed operations executed in
//! dependency order; the wgpu backend sits behind the [`RenderBackend`]
//! trait so everything above it runs headless.

mod backend;
mod context;
mod graph;
mod mesh;
mod operation;
mod pipeline;
mod target;

pub use backend::{BackendError, DrawCall, NullBackend, RenderBackend};
pub use context::{OutputMode, WgpuRenderer};
pub use graph::{
    Eye, FrameContext, FrameReport, GraphError, NodeState, OpId, Operation, RenderGraph, SlotKind,
    SlotValue,
};
pub use mesh::{Mesh, Vertex};
pub use operation::{
    CameraProvideOperation, EntityProvideOperation, EyeProvideOperation, OutputToScreenOperation,
    RenderOperation, TargetProvideOperation,
};
pub use pipeline::{EdgeSpec, OpSpec, Pipeline, PipelineId, PipelineSpec};
pub use target::{TargetDesc, TargetFormat, TargetId, TargetPool, TargetSize};
