//! Built-in components

use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use super::Entity;
use crate::physics::BodyHandle;

/// Name and enable flag every entity carries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Meta {
    /// Display name
    pub name: String,
    /// Disabled entities are skipped by providers and systems
    pub enabled: bool,
}

impl Meta {
    /// Create an enabled meta component.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
        }
    }
}

/// Local transform: position, rotation, and scale.
///
/// Scale components are expected to stay finite; a zero scale produces a
/// degenerate (non-invertible) matrix, which downstream consumers
/// tolerate rather than reject.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Transform {
    /// Position relative to the parent (or world, without a parent)
    pub position: Vec3,
    /// Rotation as a quaternion
    pub rotation: Quat,
    /// Scale factor
    pub scale: Vec3,
}

impl Transform {
    /// Create a transform with just a position.
    #[must_use]
    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    /// Create a transform with position and rotation.
    #[must_use]
    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Local matrix: translate * rotate * scale.
    #[must_use]
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }

    /// Forward direction (negative Z in local space).
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.rotation * Vec3::NEG_Z
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

/// Reference to a parent entity.
///
/// A weak reference: it is re-resolved through the store on every walk
/// and may dangle after the parent is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Parent(pub Entity);

/// Perspective camera parameters.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraComponent {
    /// Vertical field of view in radians
    pub fov: f32,
    /// Near clipping plane
    pub near: f32,
    /// Far clipping plane
    pub far: f32,
    /// Whether this is the camera the pipeline renders from
    pub main: bool,
}

impl Default for CameraComponent {
    fn default() -> Self {
        Self {
            fov: std::f32::consts::FRAC_PI_4,
            near: 0.1,
            far: 1000.0,
            main: true,
        }
    }
}

/// Procedural mesh shapes the renderer knows how to build.
///
/// Shapes are unit-sized; world size comes from the entity's transform
/// scale, which keeps them usable as mesh-cache keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Shape {
    /// Unit cube centered at the origin
    Cube,
    /// Unit plane on the XZ axis
    Plane,
    /// Unit-diameter UV sphere
    Sphere,
}

/// Marks an entity as drawable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Renderable {
    /// Mesh to draw
    pub shape: Shape,
    /// Hidden entities are skipped by the entity provider
    pub visible: bool,
}

impl Renderable {
    /// Create a visible renderable.
    #[must_use]
    pub const fn new(shape: Shape) -> Self {
        Self {
            shape,
            visible: true,
        }
    }
}

/// Collider shapes for physics actors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum ColliderShape {
    /// Axis-aligned box given by half extents
    Box {
        /// Half extents along each axis
        half_extents: Vec3,
    },
    /// Sphere given by radius
    Sphere {
        /// Sphere radius
        radius: f32,
    },
    /// Y-axis capsule
    Capsule {
        /// Half the cylinder height
        half_height: f32,
        /// Cap radius
        radius: f32,
    },
}

/// Non-moving physics actor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct StaticActor {
    /// Collision shape
    pub shape: ColliderShape,
    /// Sensors report trigger events instead of contacts
    pub trigger: bool,
    /// Runtime body handle, rebuilt after deserialization
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

impl StaticActor {
    /// Create a solid static actor.
    #[must_use]
    pub const fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            trigger: false,
            body: None,
        }
    }
}

/// Simulated physics actor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct DynamicActor {
    /// Collision shape
    pub shape: ColliderShape,
    /// Collider density used for mass properties
    pub density: f32,
    /// Sensors report trigger events instead of contacts
    pub trigger: bool,
    /// Runtime body handle, rebuilt after deserialization
    #[serde(skip)]
    pub body: Option<BodyHandle>,
}

impl DynamicActor {
    /// Create a solid dynamic actor with unit density.
    #[must_use]
    pub const fn new(shape: ColliderShape) -> Self {
        Self {
            shape,
            density: 1.0,
            trigger: false,
            body: None,
        }
    }
}

/// Emits sound from the entity's world position.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AudioSourceComponent {
    /// Key into the audio manager's sound bank
    pub sound: String,
    /// Playback volume
    pub volume: f32,
    /// Whether [`play_on_spawn`](Self::play_on_spawn) starts a loop
    pub looping: bool,
    /// Start playback as soon as the source is first seen
    pub play_on_spawn: bool,
}

impl AudioSourceComponent {
    /// Create a one-shot source for `sound`.
    pub fn new(sound: impl Into<String>) -> Self {
        Self {
            sound: sound.into(),
            volume: 1.0,
            looping: false,
            play_on_spawn: false,
        }
    }
}

/// Marks the entity whose pose drives the audio listener.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AudioListenerComponent {
    /// Only one listener is consulted; disabled ones are skipped
    pub enabled: bool,
}

impl Default for AudioListenerComponent {
    fn default() -> Self {
        Self { enabled: true }
    }
}
