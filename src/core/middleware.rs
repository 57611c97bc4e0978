//! Engine middleware interface
//!
//! The hook surface an embedding host implements: an editor, a debug
//! shell, or any layer that wants to ride the frame loop. The engine
//! calls these at fixed points and never blocks waiting on a response.

use super::Scene;
use crate::renderer::Pipeline;
use crate::scripting::{HostApi, ScriptBridge};

/// Lifecycle and frame hooks for an embedding host.
///
/// Every method has an empty default, so hosts implement only what they
/// care about.
pub trait Middleware {
    /// All engine subsystems finished initializing.
    fn on_runtime_initialized(&mut self) {}

    /// The engine is about to shut down.
    fn on_runtime_shutdown(&mut self) {}

    /// The window exists and the render backend is live.
    fn on_renderer_initialized(&mut self) {}

    /// A frame's render phase is about to start.
    fn on_start_render(&mut self) {}

    /// A frame's render phase just ended.
    fn on_end_render(&mut self) {}

    /// System services (audio, assets) updated this frame.
    fn on_system_update(&mut self, _delta: f32) {}

    /// The physics step for this frame completed; bridged events are
    /// readable until the next step.
    fn on_physics_update(&mut self, _delta: f32) {}

    /// The script phase: drive gameplay through the bridge and API.
    fn on_script_update(&mut self, _delta: f32, _bridge: &ScriptBridge, _api: &mut HostApi) {}

    /// A different scene became active.
    fn on_scene_changed(&mut self, _scene: &Scene) {}

    /// A different pipeline became active.
    fn on_pipeline_changed(&mut self, _pipeline: &Pipeline) {}
}

/// Middleware that does nothing; the default when no host is attached.
#[derive(Debug, Default)]
pub struct NullMiddleware;

impl Middleware for NullMiddleware {}
