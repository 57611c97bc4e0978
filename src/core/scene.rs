//! Scenes
//!
//! A scene owns the entity store and the physics world built over it.
//! At most one scene is active in the engine at a time. Scenes
//! round-trip exactly through snapshot serialization in RON or JSON.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::ecs::{
    AudioListenerComponent, AudioSourceComponent, CameraComponent, DynamicActor, Entity,
    EntityStore, Meta, Parent, Renderable, StaticActor, Transform,
};
use crate::physics::PhysicsWorld;

/// Process-unique scene identity, used to suppress redundant change
/// notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SceneId(u64);

impl SceneId {
    fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Errors that can occur during scene operations.
#[derive(Debug, Clone)]
pub enum SceneError {
    /// File could not be read or written
    IoError(String),
    /// Snapshot could not be serialized
    SerializeError(String),
    /// Snapshot could not be parsed
    DeserializeError(String),
}

impl std::fmt::Display for SceneError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "IO error: {e}"),
            Self::SerializeError(e) => write!(f, "serialize error: {e}"),
            Self::DeserializeError(e) => write!(f, "deserialize error: {e}"),
        }
    }
}

impl std::error::Error for SceneError {}

/// The world the engine updates and renders.
pub struct Scene {
    id: SceneId,
    name: String,
    store: EntityStore,
    physics: PhysicsWorld,
}

impl Scene {
    /// Create an empty scene.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: SceneId::next(),
            name: name.into(),
            store: EntityStore::new(),
            physics: PhysicsWorld::new(),
        }
    }

    /// Identity of this scene instance.
    #[must_use]
    pub const fn id(&self) -> SceneId {
        self.id
    }

    /// Scene name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The entity store.
    #[must_use]
    pub const fn store(&self) -> &EntityStore {
        &self.store
    }

    /// The entity store, mutably.
    pub fn store_mut(&mut self) -> &mut EntityStore {
        &mut self.store
    }

    /// The physics world.
    #[must_use]
    pub const fn physics(&self) -> &PhysicsWorld {
        &self.physics
    }

    /// The physics world, mutably.
    pub fn physics_mut(&mut self) -> &mut PhysicsWorld {
        &mut self.physics
    }

    /// Create an entity in this scene.
    pub fn create_entity(&mut self, name: impl Into<String>) -> Entity {
        self.store.create(name)
    }

    /// Destroy an entity, synchronously releasing its components and
    /// any physics bodies it owned.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        if let Some(actor) = self.store.get::<StaticActor>(entity)
            && let Some(body) = actor.body
        {
            self.physics.remove_body(body);
        }
        if let Some(actor) = self.store.get::<DynamicActor>(entity)
            && let Some(body) = actor.body
        {
            self.physics.remove_body(body);
        }
        self.store.destroy(entity)
    }

    /// Step physics, bridging native events into the event list.
    pub fn step_physics(&mut self, dt: f32) {
        self.physics.step(dt, &mut self.store);
    }

    /// Capture the serializable state of the scene.
    #[must_use]
    pub fn snapshot(&self) -> SceneSnapshot {
        let mut live: Vec<(Entity, &Meta)> = self.store.iter::<Meta>().collect();
        live.sort_by_key(|(entity, _)| entity.index());

        let index_of = |target: Entity| live.iter().position(|(e, _)| *e == target);

        let entities = live
            .iter()
            .map(|&(entity, meta)| EntityRecord {
                name: meta.name.clone(),
                enabled: meta.enabled,
                transform: self.store.get::<Transform>(entity).copied(),
                parent: self
                    .store
                    .get::<Parent>(entity)
                    .and_then(|&Parent(parent)| index_of(parent)),
                camera: self.store.get::<CameraComponent>(entity).copied(),
                renderable: self.store.get::<Renderable>(entity).copied(),
                static_actor: self.store.get::<StaticActor>(entity).copied().map(|mut a| {
                    // Runtime handles do not serialize.
                    a.body = None;
                    a
                }),
                dynamic_actor: self.store.get::<DynamicActor>(entity).copied().map(
                    |mut a| {
                        a.body = None;
                        a
                    },
                ),
                audio_source: self.store.get::<AudioSourceComponent>(entity).cloned(),
                audio_listener: self.store.get::<AudioListenerComponent>(entity).copied(),
            })
            .collect();

        SceneSnapshot {
            name: self.name.clone(),
            entities,
        }
    }

    /// Rebuild a scene from a snapshot.
    ///
    /// Entities are recreated in record order, then parent references
    /// are wired; physics bodies are recreated by the next physics
    /// step.
    #[must_use]
    pub fn from_snapshot(snapshot: &SceneSnapshot) -> Self {
        let mut scene = Self::new(snapshot.name.clone());

        let entities: Vec<Entity> = snapshot
            .entities
            .iter()
            .map(|record| {
                let entity = scene.store.create(record.name.clone());
                // create() attached the Meta; only the flag can differ.
                if let Some(meta) = scene.store.get_mut::<Meta>(entity) {
                    meta.enabled = record.enabled;
                }
                macro_rules! put {
                    ($field:expr) => {
                        if let Some(component) = $field.clone() {
                            let _ = scene.store.insert(entity, component);
                        }
                    };
                }
                put!(record.transform);
                put!(record.camera);
                put!(record.renderable);
                put!(record.static_actor);
                put!(record.dynamic_actor);
                put!(record.audio_source);
                put!(record.audio_listener);
                entity
            })
            .collect();

        for (record, &entity) in snapshot.entities.iter().zip(&entities) {
            if let Some(parent_index) = record.parent {
                match entities.get(parent_index) {
                    Some(&parent) => {
                        let _ = scene.store.insert(entity, Parent(parent));
                    }
                    None => log::warn!(
                        "snapshot entity '{}' references parent index {parent_index} out of range",
                        record.name
                    ),
                }
            }
        }

        scene
    }

    /// Save the scene as pretty RON.
    ///
    /// # Errors
    ///
    /// [`SceneError`] on write or serialization failure.
    pub fn save_ron(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let text =
            ron::ser::to_string_pretty(&self.snapshot(), ron::ser::PrettyConfig::default())
                .map_err(|e| SceneError::SerializeError(e.to_string()))?;
        fs::write(path, text).map_err(|e| SceneError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Load a scene from a RON file.
    ///
    /// # Errors
    ///
    /// [`SceneError`] on read or parse failure.
    pub fn load_ron(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let text = fs::read_to_string(path).map_err(|e| SceneError::IoError(e.to_string()))?;
        let snapshot: SceneSnapshot =
            ron::from_str(&text).map_err(|e| SceneError::DeserializeError(e.to_string()))?;
        Ok(Self::from_snapshot(&snapshot))
    }

    /// Save the scene as pretty JSON.
    ///
    /// # Errors
    ///
    /// [`SceneError`] on write or serialization failure.
    pub fn save_json(&self, path: impl AsRef<Path>) -> Result<(), SceneError> {
        let text = serde_json::to_string_pretty(&self.snapshot())
            .map_err(|e| SceneError::SerializeError(e.to_string()))?;
        fs::write(path, text).map_err(|e| SceneError::IoError(e.to_string()))?;
        Ok(())
    }

    /// Load a scene from a JSON file.
    ///
    /// # Errors
    ///
    /// [`SceneError`] on read or parse failure.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, SceneError> {
        let text = fs::read_to_string(path).map_err(|e| SceneError::IoError(e.to_string()))?;
        let snapshot: SceneSnapshot = serde_json::from_str(&text)
            .map_err(|e| SceneError::DeserializeError(e.to_string()))?;
        Ok(Self::from_snapshot(&snapshot))
    }
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("entities", &self.store.len())
            .finish()
    }
}

/// One entity's serialized components.
///
/// The parent is an index into the snapshot's entity list, so records
/// stay valid across id recycling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    /// Entity name
    pub name: String,
    /// Meta enabled flag
    pub enabled: bool,
    /// Local transform
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<Transform>,
    /// Index of the parent record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<usize>,
    /// Camera parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera: Option<CameraComponent>,
    /// Drawable shape
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderable: Option<Renderable>,
    /// Static physics actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub static_actor: Option<StaticActor>,
    /// Dynamic physics actor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dynamic_actor: Option<DynamicActor>,
    /// Audio source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_source: Option<AudioSourceComponent>,
    /// Audio listener
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audio_listener: Option<AudioListenerComponent>,
}

/// The serializable form of a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    /// Scene name
    pub name: String,
    /// All entities, parent indices local to this list
    pub entities: Vec<EntityRecord>,
}
