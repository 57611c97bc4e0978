//! Physics simulation module
//!
//! Built on top of rapier3d; native callbacks are bridged into the
//! per-frame [`PhysicsEventList`] consumed by gameplay systems.

mod events;
mod world;

pub use events::{CollisionEvent, PhysicsEventList, TriggerEvent};
pub use world::{BodyHandle, PhysicsWorld, RaycastHit};
