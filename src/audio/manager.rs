//! Audio manager
//!
//! Owns the output stream, the loaded sound bank, and one
//! [`AudioRequest`] per source entity. Failing to open an output device
//! is fatal at startup; a bad instance mid-run is logged and skipped.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use glam::Vec3;
use rodio::mixer::Mixer;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Source};
use rustc_hash::{FxHashMap, FxHashSet};

use super::instance::{AudioError, AudioInstance, InstanceId, SpatialHandle};
use super::request::AudioRequest;
use crate::ecs::{
    self, AudioListenerComponent, AudioSourceComponent, DynamicActor, Entity, EntityStore,
};
use crate::physics::PhysicsWorld;

/// Half the distance between the listener's ears, in world units.
const EAR_OFFSET: f32 = 0.1;

/// Manages audio output and all per-entity playback requests.
pub struct AudioManager {
    /// The output stream (must be kept alive)
    _stream: OutputStream,
    mixer: Mixer,
    /// Decoded-on-demand sound bytes by name
    bank: FxHashMap<String, Arc<[u8]>>,
    /// Live requests by source entity
    requests: FxHashMap<Entity, AudioRequest>,
    /// Entities whose `play_on_spawn` already fired
    spawned: FxHashSet<Entity>,
    master_volume: f32,
}

impl AudioManager {
    /// Open the default output device.
    ///
    /// # Errors
    ///
    /// [`AudioError::NoDevice`] if no output device is available; the
    /// engine treats this as fatal at startup.
    pub fn new() -> Result<Self, AudioError> {
        let stream = OutputStreamBuilder::from_default_device()
            .map_err(|_| AudioError::NoDevice)?
            .open_stream()
            .map_err(|_| AudioError::NoDevice)?;
        let mixer = stream.mixer().clone();

        Ok(Self {
            _stream: stream,
            mixer,
            bank: FxHashMap::default(),
            requests: FxHashMap::default(),
            spawned: FxHashSet::default(),
            master_volume: 1.0,
        })
    }

    /// Load a sound file into the bank under `name`.
    ///
    /// # Errors
    ///
    /// [`AudioError::IoError`] if the file cannot be read.
    pub fn load(&mut self, name: impl Into<String>, path: impl AsRef<Path>) -> Result<(), AudioError> {
        let bytes = std::fs::read(path).map_err(|e| AudioError::IoError(e.to_string()))?;
        self.load_bytes(name, bytes.into());
        Ok(())
    }

    /// Store already-loaded sound bytes in the bank.
    pub fn load_bytes(&mut self, name: impl Into<String>, bytes: Arc<[u8]>) {
        self.bank.insert(name.into(), bytes);
    }

    /// Start a fire-and-forget voice for `entity`.
    ///
    /// # Errors
    ///
    /// [`AudioError::UnknownSound`] or [`AudioError::DecodeError`]; both
    /// are non-fatal to the frame.
    pub fn play_oneshot(
        &mut self,
        entity: Entity,
        sound: &str,
        volume: f32,
    ) -> Result<InstanceId, AudioError> {
        let instance = self.spawn_instance(sound, volume, false)?;
        Ok(self.requests.entry(entity).or_default().add_oneshot(instance))
    }

    /// Start a looping voice for `entity`; it plays until stopped.
    ///
    /// # Errors
    ///
    /// Same conditions as [`AudioManager::play_oneshot`].
    pub fn play_looping(
        &mut self,
        entity: Entity,
        sound: &str,
        volume: f32,
    ) -> Result<InstanceId, AudioError> {
        let instance = self.spawn_instance(sound, volume, true)?;
        Ok(self
            .requests
            .entry(entity)
            .or_default()
            .add_persistent(instance))
    }

    fn spawn_instance(
        &self,
        sound: &str,
        volume: f32,
        looping: bool,
    ) -> Result<AudioInstance, AudioError> {
        let bytes = self
            .bank
            .get(sound)
            .ok_or_else(|| AudioError::UnknownSound(sound.to_string()))?
            .clone();
        let source =
            Decoder::new(Cursor::new(bytes)).map_err(|e| AudioError::DecodeError(e.to_string()))?;

        let handle = SpatialHandle::new(&self.mixer);
        if looping {
            handle.append(source.repeat_infinite());
        } else {
            handle.append(source);
        }

        let mut instance = AudioInstance::new(sound, Box::new(handle));
        instance.set_volume(volume * self.master_volume);
        instance.play();
        Ok(instance)
    }

    /// Stop the voice `id` belonging to `entity`; a no-op if neither
    /// resolves.
    pub fn stop(&mut self, entity: Entity, id: InstanceId) -> bool {
        self.requests
            .get_mut(&entity)
            .is_some_and(|request| request.remove(id))
    }

    /// Stop every voice of `entity`.
    pub fn stop_entity(&mut self, entity: Entity) {
        if let Some(mut request) = self.requests.remove(&entity) {
            request.stop_all();
        }
        self.spawned.remove(&entity);
    }

    /// Stop everything.
    pub fn stop_all(&mut self) {
        for request in self.requests.values_mut() {
            request.stop_all();
        }
        self.requests.clear();
        self.spawned.clear();
    }

    /// Set the volume applied to newly spawned voices and push it to the
    /// live ones.
    pub fn set_master_volume(&mut self, volume: f32) {
        self.master_volume = volume.max(0.0);
        // Per-voice volumes collapse to the master here; sources that
        // need finer control set it per instance id.
        for request in self.requests.values_mut() {
            request.set_volume(self.master_volume);
        }
    }

    /// Current master volume.
    #[must_use]
    pub const fn master_volume(&self) -> f32 {
        self.master_volume
    }

    /// Number of live voices across all entities.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.requests.values().map(AudioRequest::instance_count).sum()
    }

    /// Per-frame maintenance.
    ///
    /// Prunes requests whose entity no longer resolves, fires
    /// `play_on_spawn` sources, evicts finished one-shots, and pushes
    /// spatial attributes: each source's world position and body
    /// velocity, and the listener entity's ear positions. Runs after
    /// the physics step so transforms are current.
    pub fn update(&mut self, store: &EntityStore, physics: &PhysicsWorld) {
        self.requests.retain(|entity, request| {
            if store.contains(*entity) {
                true
            } else {
                request.stop_all();
                false
            }
        });
        self.spawned.retain(|entity| store.contains(*entity));

        self.fire_spawn_sources(store);

        let ears = listener_ears(store);

        let entities: Vec<Entity> = self.requests.keys().copied().collect();
        for entity in entities {
            let position = match ecs::world_pose(store, entity) {
                Ok((position, _)) => position,
                Err(e) => {
                    log::warn!("audio source {entity}: {e}");
                    continue;
                }
            };
            let velocity = store
                .get::<DynamicActor>(entity)
                .and_then(|actor| actor.body)
                .and_then(|body| physics.linear_velocity(body))
                .unwrap_or(Vec3::ZERO);

            let Some(request) = self.requests.get_mut(&entity) else {
                continue;
            };
            request.retire_finished();
            request.set_attributes(position, velocity);
            if let Some((left, right)) = ears {
                request.set_listener(left, right);
            }
        }
    }

    fn fire_spawn_sources(&mut self, store: &EntityStore) {
        let pending: Vec<(Entity, AudioSourceComponent)> = store
            .iter::<AudioSourceComponent>()
            .filter(|(entity, source)| source.play_on_spawn && !self.spawned.contains(entity))
            .map(|(entity, source)| (entity, source.clone()))
            .collect();
        for (entity, source) in pending {
            self.spawned.insert(entity);
            let result = if source.looping {
                self.play_looping(entity, &source.sound, source.volume)
            } else {
                self.play_oneshot(entity, &source.sound, source.volume)
            };
            if let Err(e) = result {
                // One bad source must not stop the frame.
                log::warn!("audio source {entity} failed to start: {e}");
            }
        }
    }
}

impl std::fmt::Debug for AudioManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioManager")
            .field("bank_size", &self.bank.len())
            .field("requests", &self.requests.len())
            .field("master_volume", &self.master_volume)
            .finish()
    }
}

/// Ear positions of the first enabled listener entity, if any.
fn listener_ears(store: &EntityStore) -> Option<(Vec3, Vec3)> {
    let (entity, _) = store
        .iter::<AudioListenerComponent>()
        .find(|(_, listener)| listener.enabled)?;
    match ecs::world_pose(store, entity) {
        Ok((position, rotation)) => {
            let right = rotation * Vec3::X * EAR_OFFSET;
            Some((position - right, position + right))
        }
        Err(e) => {
            log::warn!("audio listener {entity}: {e}");
            None
        }
    }
}
