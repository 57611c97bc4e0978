//! Entity Component System module
//!
//! An explicit arena + generational-index store with sparse-set
//! component tables, plus the transform hierarchy built on top of it.

mod components;
mod entity;
mod hierarchy;
mod store;

pub use components::{
    AudioListenerComponent, AudioSourceComponent, CameraComponent, ColliderShape, DynamicActor,
    Meta, Parent, Renderable, Shape, StaticActor, Transform,
};
pub use entity::Entity;
pub use hierarchy::{HierarchyError, world_matrix, world_pose};
pub use store::{Component, EntityStore, StoreError};
