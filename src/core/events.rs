//! Boundary event queue
//!
//! Native window callbacks are translated at the boundary into plain
//! [`HostEvent`] data and pushed onto a bounded queue. The frame loop
//! is the single consumer and drains the queue exactly once per frame;
//! when the queue overflows the oldest events are dropped and counted.

use std::collections::VecDeque;

use glam::Vec2;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

/// Default capacity of the boundary queue.
const DEFAULT_CAPACITY: usize = 256;

/// Plain-data translation of a host window/input callback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HostEvent {
    /// A key changed state
    Key {
        /// Physical key code
        code: KeyCode,
        /// True on press, false on release
        pressed: bool,
    },
    /// A mouse button changed state
    MouseButton {
        /// Which button
        button: MouseButton,
        /// True on press, false on release
        pressed: bool,
    },
    /// The cursor moved to a new window position
    CursorMoved(Vec2),
    /// The scroll wheel moved
    MouseWheel(Vec2),
    /// The window was resized
    Resized(u32, u32),
    /// The host asked the engine to close
    CloseRequested,
}

/// Bounded single-consumer queue of boundary events.
#[derive(Debug)]
pub struct EventQueue {
    events: VecDeque<HostEvent>,
    capacity: usize,
    dropped: u64,
}

impl EventQueue {
    /// Create a queue with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a queue holding at most `capacity` events.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
            dropped: 0,
        }
    }

    /// Append an event, dropping the oldest when full.
    pub fn push(&mut self, event: HostEvent) {
        if self.events.len() == self.capacity {
            self.events.pop_front();
            self.dropped += 1;
            log::warn!("event queue overflow, oldest event dropped");
        }
        self.events.push_back(event);
    }

    /// Drain all queued events in arrival order.
    pub fn drain(&mut self) -> impl Iterator<Item = HostEvent> + '_ {
        self.events.drain(..)
    }

    /// Number of queued events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether no events are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Total events lost to overflow since creation.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drain_returns_events_in_arrival_order() {
        let mut queue = EventQueue::new();
        queue.push(HostEvent::Resized(1, 1));
        queue.push(HostEvent::CloseRequested);

        let events: Vec<HostEvent> = queue.drain().collect();

        assert_eq!(
            events,
            vec![HostEvent::Resized(1, 1), HostEvent::CloseRequested]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let mut queue = EventQueue::with_capacity(2);
        queue.push(HostEvent::Resized(1, 1));
        queue.push(HostEvent::Resized(2, 2));
        queue.push(HostEvent::Resized(3, 3));

        let events: Vec<HostEvent> = queue.drain().collect();

        assert_eq!(
            events,
            vec![HostEvent::Resized(2, 2), HostEvent::Resized(3, 3)]
        );
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_drained_queue_is_reusable() {
        let mut queue = EventQueue::new();
        queue.push(HostEvent::CloseRequested);
        let _ = queue.drain().count();

        queue.push(HostEvent::Resized(5, 5));

        assert_eq!(queue.len(), 1);
    }
}
