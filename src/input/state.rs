//! Input state
//!
//! Consumes the translated [`HostEvent`] stream and answers the polled
//! queries gameplay and scripts make once per frame. Per-frame edges
//! (just pressed / just released) flip on `end_frame`.

use glam::Vec2;
use rustc_hash::FxHashSet;
use winit::event::MouseButton;
use winit::keyboard::KeyCode;

use crate::core::HostEvent;

/// Polled keyboard and mouse state.
#[derive(Debug, Default)]
pub struct Input {
    pressed_keys: FxHashSet<KeyCode>,
    just_pressed_keys: FxHashSet<KeyCode>,
    just_released_keys: FxHashSet<KeyCode>,
    pressed_mouse_buttons: FxHashSet<MouseButton>,
    just_pressed_mouse_buttons: FxHashSet<MouseButton>,
    mouse_position: Vec2,
    mouse_delta: Vec2,
    scroll_delta: Vec2,
}

impl Input {
    /// Create an empty input state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one boundary event into the state.
    ///
    /// Non-input events (resize, close request) are ignored here; the
    /// orchestrator routes them elsewhere.
    pub fn apply(&mut self, event: &HostEvent) {
        match *event {
            HostEvent::Key { code, pressed } => {
                if pressed {
                    if !self.pressed_keys.contains(&code) {
                        self.just_pressed_keys.insert(code);
                    }
                    self.pressed_keys.insert(code);
                } else {
                    self.pressed_keys.remove(&code);
                    self.just_released_keys.insert(code);
                }
            }
            HostEvent::MouseButton { button, pressed } => {
                if pressed {
                    if !self.pressed_mouse_buttons.contains(&button) {
                        self.just_pressed_mouse_buttons.insert(button);
                    }
                    self.pressed_mouse_buttons.insert(button);
                } else {
                    self.pressed_mouse_buttons.remove(&button);
                }
            }
            HostEvent::CursorMoved(position) => {
                self.mouse_delta += position - self.mouse_position;
                self.mouse_position = position;
            }
            HostEvent::MouseWheel(delta) => {
                self.scroll_delta += delta;
            }
            HostEvent::Resized(..) | HostEvent::CloseRequested => {}
        }
    }

    /// Clear per-frame state; call after the frame's consumers ran.
    pub fn end_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.just_released_keys.clear();
        self.just_pressed_mouse_buttons.clear();
        self.mouse_delta = Vec2::ZERO;
        self.scroll_delta = Vec2::ZERO;
    }

    /// Whether a key is currently held.
    #[must_use]
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Whether a key went down this frame.
    #[must_use]
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    /// Whether a key went up this frame.
    #[must_use]
    pub fn is_key_just_released(&self, key: KeyCode) -> bool {
        self.just_released_keys.contains(&key)
    }

    /// Whether a mouse button is currently held.
    #[must_use]
    pub fn is_mouse_button_pressed(&self, button: MouseButton) -> bool {
        self.pressed_mouse_buttons.contains(&button)
    }

    /// Whether a mouse button went down this frame.
    #[must_use]
    pub fn is_mouse_button_just_pressed(&self, button: MouseButton) -> bool {
        self.just_pressed_mouse_buttons.contains(&button)
    }

    /// Current cursor position in window coordinates.
    #[must_use]
    pub const fn mouse_position(&self) -> Vec2 {
        self.mouse_position
    }

    /// Cursor movement accumulated this frame.
    #[must_use]
    pub const fn mouse_delta(&self) -> Vec2 {
        self.mouse_delta
    }

    /// Scroll wheel movement accumulated this frame.
    #[must_use]
    pub const fn scroll_delta(&self) -> Vec2 {
        self.scroll_delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, pressed: bool) -> HostEvent {
        HostEvent::Key { code, pressed }
    }

    #[test]
    fn test_press_and_release_cycle() {
        let mut input = Input::new();

        input.apply(&key(KeyCode::Space, true));
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_just_pressed(KeyCode::Space));

        input.end_frame();
        assert!(input.is_key_pressed(KeyCode::Space));
        assert!(!input.is_key_just_pressed(KeyCode::Space));

        input.apply(&key(KeyCode::Space, false));
        assert!(!input.is_key_pressed(KeyCode::Space));
        assert!(input.is_key_just_released(KeyCode::Space));
    }

    #[test]
    fn test_repeat_press_is_not_just_pressed_again() {
        let mut input = Input::new();
        input.apply(&key(KeyCode::KeyW, true));
        input.end_frame();

        input.apply(&key(KeyCode::KeyW, true));

        assert!(input.is_key_pressed(KeyCode::KeyW));
        assert!(!input.is_key_just_pressed(KeyCode::KeyW));
    }

    #[test]
    fn test_mouse_motion_accumulates_delta() {
        let mut input = Input::new();

        input.apply(&HostEvent::CursorMoved(Vec2::new(10.0, 0.0)));
        input.apply(&HostEvent::CursorMoved(Vec2::new(15.0, 5.0)));

        assert_eq!(input.mouse_position(), Vec2::new(15.0, 5.0));
        assert_eq!(input.mouse_delta(), Vec2::new(15.0, 5.0));

        input.end_frame();
        assert_eq!(input.mouse_delta(), Vec2::ZERO);
        assert_eq!(input.mouse_position(), Vec2::new(15.0, 5.0));
    }

    #[test]
    fn test_scroll_accumulates_within_frame() {
        let mut input = Input::new();

        input.apply(&HostEvent::MouseWheel(Vec2::new(0.0, 1.0)));
        input.apply(&HostEvent::MouseWheel(Vec2::new(0.0, 2.0)));

        assert_eq!(input.scroll_delta(), Vec2::new(0.0, 3.0));
    }
}
