//! Per-frame physics event buffer
//!
//! Native physics callbacks are translated into plain trigger/collision
//! records appended here during the step, read by gameplay consumers
//! after the step, and cleared at the start of the next step. Production
//! and consumption never interleave within a frame; everything runs on
//! the main loop thread.

use crate::ecs::Entity;

/// A sensor volume was entered or left.
///
/// Entity references are weak: consumers must re-resolve them through
/// the store, since either side may have been destroyed after the step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    /// Entity owning the sensor collider
    pub trigger: Entity,
    /// Entity that entered or left the sensor
    pub actor: Entity,
    /// True on enter, false on exit
    pub entered: bool,
}

/// Two solid colliders started or stopped touching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollisionEvent {
    /// First participant
    pub first: Entity,
    /// Second participant
    pub second: Entity,
    /// True when contact starts, false when it stops
    pub started: bool,
}

/// Insertion-ordered buffers of the current step's events.
#[derive(Debug, Default)]
pub struct PhysicsEventList {
    trigger_events: Vec<TriggerEvent>,
    collision_events: Vec<CollisionEvent>,
}

impl PhysicsEventList {
    /// Create empty buffers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trigger event.
    ///
    /// A mirrored duplicate of an already-recorded pair with the same
    /// phase flag is discarded, so each crossing is reported once.
    pub fn register_trigger(&mut self, event: TriggerEvent) {
        let duplicate = self.trigger_events.iter().any(|existing| {
            existing.entered == event.entered
                && ((existing.trigger == event.trigger && existing.actor == event.actor)
                    || (existing.trigger == event.actor && existing.actor == event.trigger))
        });
        if !duplicate {
            self.trigger_events.push(event);
        }
    }

    /// Append a collision event, discarding mirrored duplicates.
    pub fn register_collision(&mut self, event: CollisionEvent) {
        let duplicate = self.collision_events.iter().any(|existing| {
            existing.started == event.started
                && ((existing.first == event.first && existing.second == event.second)
                    || (existing.first == event.second && existing.second == event.first))
        });
        if !duplicate {
            self.collision_events.push(event);
        }
    }

    /// Trigger events accumulated this step, in insertion order.
    #[must_use]
    pub fn trigger_events(&self) -> &[TriggerEvent] {
        &self.trigger_events
    }

    /// Collision events accumulated this step, in insertion order.
    #[must_use]
    pub fn collision_events(&self) -> &[CollisionEvent] {
        &self.collision_events
    }

    /// Drop all accumulated events.
    pub fn clear(&mut self) {
        self.trigger_events.clear();
        self.collision_events.clear();
    }

    /// Whether both buffers are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.trigger_events.is_empty() && self.collision_events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::EntityStore;

    fn entities(n: usize) -> Vec<Entity> {
        let mut store = EntityStore::new();
        (0..n).map(|i| store.create(format!("e{i}"))).collect()
    }

    #[test]
    fn test_register_then_read_then_clear() {
        let e = entities(3);
        let mut list = PhysicsEventList::new();
        list.register_trigger(TriggerEvent {
            trigger: e[0],
            actor: e[1],
            entered: true,
        });
        list.register_trigger(TriggerEvent {
            trigger: e[0],
            actor: e[2],
            entered: true,
        });

        let events = list.trigger_events().to_vec();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].actor, e[1]);
        assert_eq!(events[1].actor, e[2]);

        list.clear();
        assert!(list.trigger_events().is_empty());
        assert!(list.collision_events().is_empty());
    }

    #[test]
    fn test_mirrored_trigger_pair_recorded_once() {
        let e = entities(2);
        let mut list = PhysicsEventList::new();
        list.register_trigger(TriggerEvent {
            trigger: e[0],
            actor: e[1],
            entered: true,
        });
        list.register_trigger(TriggerEvent {
            trigger: e[1],
            actor: e[0],
            entered: true,
        });

        assert_eq!(list.trigger_events().len(), 1);
    }

    #[test]
    fn test_enter_and_exit_are_distinct() {
        let e = entities(2);
        let mut list = PhysicsEventList::new();
        list.register_trigger(TriggerEvent {
            trigger: e[0],
            actor: e[1],
            entered: true,
        });
        list.register_trigger(TriggerEvent {
            trigger: e[0],
            actor: e[1],
            entered: false,
        });

        assert_eq!(list.trigger_events().len(), 2);
    }

    #[test]
    fn test_mirrored_collision_pair_recorded_once() {
        let e = entities(2);
        let mut list = PhysicsEventList::new();
        list.register_collision(CollisionEvent {
            first: e[0],
            second: e[1],
            started: true,
        });
        list.register_collision(CollisionEvent {
            first: e[1],
            second: e[0],
            started: true,
        });
        // Stop events are a separate phase and must get through.
        list.register_collision(CollisionEvent {
            first: e[1],
            second: e[0],
            started: false,
        });

        assert_eq!(list.collision_events().len(), 2);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let e = entities(4);
        let mut list = PhysicsEventList::new();
        for pair in e.windows(2) {
            list.register_collision(CollisionEvent {
                first: pair[0],
                second: pair[1],
                started: true,
            });
        }

        let firsts: Vec<Entity> = list.collision_events().iter().map(|c| c.first).collect();
        assert_eq!(firsts, vec![e[0], e[1], e[2]]);
    }
}
