//! Audio system
//!
//! Built on top of the rodio audio library. Voices are spatial sinks
//! owned by per-entity requests; one-shot voices self-clean on
//! completion, persistent voices loop until explicitly stopped.

mod instance;
mod manager;
mod request;

pub use instance::{AudioError, AudioInstance, InstanceId, PlaybackHandle, SpatialHandle};
pub use manager::AudioManager;
pub use request::{AudioInstanceList, AudioRequest};
