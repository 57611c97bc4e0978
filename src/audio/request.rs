//! Per-entity audio requests
//!
//! An [`AudioRequest`] tracks the voices started from one source
//! entity: a one-shot list that self-cleans when voices finish, and a
//! persistent list that loops until explicitly stopped. Instances are
//! exclusively owned; removing one stops it.

use glam::Vec3;

use super::instance::{AudioInstance, InstanceId};

/// Ordered collection of exclusively-owned playback instances.
#[derive(Debug, Default)]
pub struct AudioInstanceList {
    instances: Vec<AudioInstance>,
}

impl AudioInstanceList {
    /// Create an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Take ownership of an instance.
    pub fn add(&mut self, instance: AudioInstance) -> InstanceId {
        let id = instance.id();
        self.instances.push(instance);
        id
    }

    /// Stop and release the instance with `id`.
    ///
    /// Removing an id that is not present is a no-op, not an error.
    pub fn remove(&mut self, id: InstanceId) -> bool {
        match self.instances.iter().position(|i| i.id() == id) {
            Some(pos) => {
                // Dropping the instance stops the native voice.
                self.instances.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Whether an instance with `id` is held here.
    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.instances.iter().any(|i| i.id() == id)
    }

    /// Evict instances that finished playing naturally.
    pub fn retire_finished(&mut self) -> usize {
        let before = self.instances.len();
        self.instances.retain(|i| !i.is_finished());
        before - self.instances.len()
    }

    /// Push 3D attributes to every instance.
    pub fn set_attributes(&mut self, position: Vec3, velocity: Vec3) {
        for instance in &mut self.instances {
            instance.set_attributes(position, velocity);
        }
    }

    /// Move the listener's ears on every instance.
    pub fn set_listener(&mut self, left_ear: Vec3, right_ear: Vec3) {
        for instance in &mut self.instances {
            instance.set_listener(left_ear, right_ear);
        }
    }

    /// Set the volume of every instance.
    pub fn set_volume(&mut self, volume: f32) {
        for instance in &mut self.instances {
            instance.set_volume(volume);
        }
    }

    /// Stop and release every instance.
    pub fn stop_all(&mut self) {
        self.instances.clear();
    }

    /// Number of live instances.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Whether the list holds no instance.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Iterate the instances in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &AudioInstance> {
        self.instances.iter()
    }
}

/// The voices owned by one source entity.
#[derive(Debug, Default)]
pub struct AudioRequest {
    oneshot: AudioInstanceList,
    persistent: AudioInstanceList,
}

impl AudioRequest {
    /// Create a request with no voices.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fire-and-forget voice; it is evicted automatically once it
    /// finishes.
    pub fn add_oneshot(&mut self, instance: AudioInstance) -> InstanceId {
        self.oneshot.add(instance)
    }

    /// Add a looping voice; it plays until removed.
    pub fn add_persistent(&mut self, instance: AudioInstance) -> InstanceId {
        self.persistent.add(instance)
    }

    /// Stop and release the voice with `id`, whichever list holds it.
    pub fn remove(&mut self, id: InstanceId) -> bool {
        self.oneshot.remove(id) || self.persistent.remove(id)
    }

    /// Whether either list holds `id`.
    #[must_use]
    pub fn contains(&self, id: InstanceId) -> bool {
        self.oneshot.contains(id) || self.persistent.contains(id)
    }

    /// Evict finished one-shot voices.
    pub fn retire_finished(&mut self) -> usize {
        self.oneshot.retire_finished()
    }

    /// Push 3D attributes to every voice.
    pub fn set_attributes(&mut self, position: Vec3, velocity: Vec3) {
        self.oneshot.set_attributes(position, velocity);
        self.persistent.set_attributes(position, velocity);
    }

    /// Move the listener's ears on every voice.
    pub fn set_listener(&mut self, left_ear: Vec3, right_ear: Vec3) {
        self.oneshot.set_listener(left_ear, right_ear);
        self.persistent.set_listener(left_ear, right_ear);
    }

    /// Set the volume of every voice.
    pub fn set_volume(&mut self, volume: f32) {
        self.oneshot.set_volume(volume);
        self.persistent.set_volume(volume);
    }

    /// Stop and release every voice.
    pub fn stop_all(&mut self) {
        self.oneshot.stop_all();
        self.persistent.stop_all();
    }

    /// Total number of live voices.
    #[must_use]
    pub fn instance_count(&self) -> usize {
        self.oneshot.len() + self.persistent.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::instance::PlaybackHandle;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Records calls instead of producing sound.
    #[derive(Clone, Default)]
    struct Probe {
        stopped: Rc<Cell<bool>>,
        finished: Rc<Cell<bool>>,
        position: Rc<Cell<Vec3>>,
        ears: Rc<Cell<(Vec3, Vec3)>>,
    }

    struct MockHandle(Probe);

    impl PlaybackHandle for MockHandle {
        fn play(&mut self) {}
        fn stop(&mut self) {
            self.0.stopped.set(true);
        }
        fn set_volume(&mut self, _volume: f32) {}
        fn set_emitter_position(&mut self, position: Vec3) {
            self.0.position.set(position);
        }
        fn set_listener(&mut self, left_ear: Vec3, right_ear: Vec3) {
            self.0.ears.set((left_ear, right_ear));
        }
        fn is_finished(&self) -> bool {
            self.0.finished.get()
        }
    }

    fn instance(probe: &Probe) -> AudioInstance {
        AudioInstance::new("test", Box::new(MockHandle(probe.clone())))
    }

    #[test]
    fn test_remove_stops_exactly_that_instance() {
        let probes: Vec<Probe> = (0..3).map(|_| Probe::default()).collect();
        let mut list = AudioInstanceList::new();
        let ids: Vec<InstanceId> = probes.iter().map(|p| list.add(instance(p))).collect();

        assert!(list.remove(ids[1]));

        assert_eq!(list.len(), 2);
        assert!(!probes[0].stopped.get());
        assert!(probes[1].stopped.get());
        assert!(!probes[2].stopped.get());
    }

    #[test]
    fn test_double_remove_is_noop() {
        let probe = Probe::default();
        let mut list = AudioInstanceList::new();
        let id = list.add(instance(&probe));

        assert!(list.remove(id));
        assert!(!list.remove(id));
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn test_retire_evicts_only_finished() {
        let done = Probe::default();
        let playing = Probe::default();
        let mut list = AudioInstanceList::new();
        list.add(instance(&done));
        let keep = list.add(instance(&playing));
        done.finished.set(true);

        let evicted = list.retire_finished();

        assert_eq!(evicted, 1);
        assert_eq!(list.len(), 1);
        assert!(list.contains(keep));
    }

    #[test]
    fn test_attributes_reach_every_instance() {
        let probes: Vec<Probe> = (0..2).map(|_| Probe::default()).collect();
        let mut list = AudioInstanceList::new();
        for p in &probes {
            list.add(instance(p));
        }

        let position = Vec3::new(1.0, 2.0, 3.0);
        list.set_attributes(position, Vec3::X);
        list.set_listener(Vec3::NEG_X, Vec3::X);

        for p in &probes {
            assert_eq!(p.position.get(), position);
            assert_eq!(p.ears.get(), (Vec3::NEG_X, Vec3::X));
        }
    }

    #[test]
    fn test_dropping_list_stops_voices() {
        let probe = Probe::default();
        {
            let mut list = AudioInstanceList::new();
            list.add(instance(&probe));
        }
        assert!(probe.stopped.get());
    }

    #[test]
    fn test_request_oneshot_self_cleans_persistent_stays() {
        let oneshot = Probe::default();
        let looped = Probe::default();
        let mut request = AudioRequest::new();
        request.add_oneshot(instance(&oneshot));
        let loop_id = request.add_persistent(instance(&looped));

        // Both "finish" from the backend's point of view; only the
        // one-shot may be evicted automatically.
        oneshot.finished.set(true);
        looped.finished.set(true);
        request.retire_finished();

        assert_eq!(request.instance_count(), 1);
        assert!(request.contains(loop_id));

        assert!(request.remove(loop_id));
        assert_eq!(request.instance_count(), 0);
    }
}
