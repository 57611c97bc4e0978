//! Meridian, a 3D game engine runtime
//!
//! The engine core pairs a scene/entity-component runtime with a
//! render-operation graph:
//! - explicit generational-index entity store with sparse-set tables
//! - transform hierarchy with cycle detection
//! - physics via rapier3d, native events bridged to a per-frame list
//! - spatial audio via rodio with self-cleaning one-shot voices
//! - frames produced by a typed render-operation DAG over wgpu
//! - a single-threaded orchestrator with middleware hooks for
//!   embedding hosts

pub mod audio;
pub mod core;
pub mod ecs;
pub mod input;
pub mod physics;
pub mod renderer;
pub mod scripting;

// Re-exports for convenience
pub use glam;
pub use rapier3d;
pub use wgpu;
pub use winit;

/// Prelude module for common imports
pub mod prelude {
    pub use crate::audio::{AudioInstanceList, AudioManager, AudioRequest, InstanceId};
    pub use crate::core::{
        Engine, EngineConfig, EngineState, HostEvent, Middleware, NullMiddleware, Scene,
    };
    pub use crate::ecs::{
        AudioListenerComponent, AudioSourceComponent, CameraComponent, ColliderShape,
        DynamicActor, Entity, EntityStore, Meta, Parent, Renderable, Shape, StaticActor,
        Transform,
    };
    pub use crate::input::Input;
    pub use crate::physics::{BodyHandle, CollisionEvent, PhysicsWorld, TriggerEvent};
    pub use crate::renderer::{
        FrameReport, Operation, Pipeline, PipelineSpec, RenderGraph, SlotKind, SlotValue,
        TargetDesc,
    };
    pub use crate::scripting::{HostApi, ScriptArgs, ScriptBridge, ScriptValue};
    pub use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
    pub use winit::keyboard::KeyCode;
}
