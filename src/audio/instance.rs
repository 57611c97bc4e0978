//! Audio playback instances
//!
//! An [`AudioInstance`] exclusively owns one native playback handle.
//! The handle is behind the [`PlaybackHandle`] trait so the ownership
//! and lifecycle bookkeeping above it stays testable without an audio
//! device; production code uses the rodio spatial sink implementation.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::Vec3;
use rodio::SpatialSink;
use rodio::mixer::Mixer;

/// Errors that can occur during audio operations.
#[derive(Debug, Clone)]
pub enum AudioError {
    /// IO error reading file
    IoError(String),
    /// Error decoding audio data
    DecodeError(String),
    /// No sound loaded under the requested name
    UnknownSound(String),
    /// No audio output device available
    NoDevice,
}

impl std::fmt::Display for AudioError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IoError(e) => write!(f, "IO error: {e}"),
            Self::DecodeError(e) => write!(f, "Decode error: {e}"),
            Self::UnknownSound(name) => write!(f, "no sound loaded under '{name}'"),
            Self::NoDevice => write!(f, "No audio output device available"),
        }
    }
}

impl std::error::Error for AudioError {}

/// Process-unique identifier for one playback instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstanceId(u64);

impl InstanceId {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw id value, as handed across the script bridge.
    #[must_use]
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Rebuild an id from its raw value.
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

/// Control surface of one native playback voice.
pub trait PlaybackHandle {
    /// Resume or start playback.
    fn play(&mut self);
    /// Stop playback; the voice cannot be resumed.
    fn stop(&mut self);
    /// Set playback volume.
    fn set_volume(&mut self, volume: f32);
    /// Move the emitter in world space.
    fn set_emitter_position(&mut self, position: Vec3);
    /// Move the listener's ears in world space.
    fn set_listener(&mut self, left_ear: Vec3, right_ear: Vec3);
    /// Whether the voice finished playing naturally.
    fn is_finished(&self) -> bool;
}

/// Rodio-backed spatial voice.
pub struct SpatialHandle {
    sink: SpatialSink,
}

impl SpatialHandle {
    /// Create a voice on `mixer` with emitter and ears at the origin.
    #[must_use]
    pub fn new(mixer: &Mixer) -> Self {
        let sink = SpatialSink::connect_new(
            mixer,
            [0.0; 3],
            [-0.1, 0.0, 0.0],
            [0.1, 0.0, 0.0],
        );
        Self { sink }
    }

    /// Queue a decoded source on the voice.
    pub fn append<S>(&self, source: S)
    where
        S: rodio::Source + Send + 'static,
    {
        self.sink.append(source);
    }
}

impl PlaybackHandle for SpatialHandle {
    fn play(&mut self) {
        self.sink.play();
    }

    fn stop(&mut self) {
        self.sink.stop();
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume.max(0.0));
    }

    fn set_emitter_position(&mut self, position: Vec3) {
        self.sink.set_emitter_position(position.into());
    }

    fn set_listener(&mut self, left_ear: Vec3, right_ear: Vec3) {
        self.sink.set_left_ear_position(left_ear.into());
        self.sink.set_right_ear_position(right_ear.into());
    }

    fn is_finished(&self) -> bool {
        self.sink.empty()
    }
}

/// One playing voice, exclusively owned by an instance list.
///
/// Dropping the instance stops and releases the native voice.
pub struct AudioInstance {
    id: InstanceId,
    sound: String,
    handle: Box<dyn PlaybackHandle>,
    velocity: Vec3,
}

impl AudioInstance {
    /// Wrap a playback handle.
    pub fn new(sound: impl Into<String>, handle: Box<dyn PlaybackHandle>) -> Self {
        Self {
            id: InstanceId::next(),
            sound: sound.into(),
            handle,
            velocity: Vec3::ZERO,
        }
    }

    /// This instance's id.
    #[must_use]
    pub const fn id(&self) -> InstanceId {
        self.id
    }

    /// Name of the sound the instance is playing.
    #[must_use]
    pub fn sound(&self) -> &str {
        &self.sound
    }

    /// Start or resume playback.
    pub fn play(&mut self) {
        self.handle.play();
    }

    /// Stop playback.
    pub fn stop(&mut self) {
        self.handle.stop();
    }

    /// Set the voice volume.
    pub fn set_volume(&mut self, volume: f32) {
        self.handle.set_volume(volume);
    }

    /// Push 3D attributes to the native voice.
    ///
    /// The caller has already computed the entity's world transform;
    /// velocity is recorded for attribute queries even though the
    /// backend applies no doppler.
    pub fn set_attributes(&mut self, position: Vec3, velocity: Vec3) {
        self.velocity = velocity;
        self.handle.set_emitter_position(position);
    }

    /// Last velocity pushed via [`AudioInstance::set_attributes`].
    #[must_use]
    pub const fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Move the listener's ears.
    pub fn set_listener(&mut self, left_ear: Vec3, right_ear: Vec3) {
        self.handle.set_listener(left_ear, right_ear);
    }

    /// Whether playback completed naturally.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for AudioInstance {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

impl std::fmt::Debug for AudioInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioInstance")
            .field("id", &self.id)
            .field("sound", &self.sound)
            .field("finished", &self.is_finished())
            .finish()
    }
}
