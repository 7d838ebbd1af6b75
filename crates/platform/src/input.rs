//! Keyboard and mouse state for the demo window.
//!
//! Besides key edges this tracks a left-button drag, which the application
//! turns into a region selection on the composited image.

use std::collections::HashSet;

pub use winit::keyboard::KeyCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
    Other,
}

impl From<winit::event::MouseButton> for MouseButton {
    fn from(button: winit::event::MouseButton) -> Self {
        match button {
            winit::event::MouseButton::Left => MouseButton::Left,
            winit::event::MouseButton::Right => MouseButton::Right,
            winit::event::MouseButton::Middle => MouseButton::Middle,
            _ => MouseButton::Other,
        }
    }
}

/// A finished left-button drag in window pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Drag {
    pub start: (f32, f32),
    pub end: (f32, f32),
}

/// Pressed keys and buttons, per-frame edges and the last completed drag.
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<KeyCode>,
    just_pressed_keys: HashSet<KeyCode>,
    pressed_buttons: HashSet<MouseButton>,
    mouse_position: (f32, f32),
    drag_origin: Option<(f32, f32)>,
    completed_drag: Option<Drag>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears per-frame edges. Call once per redraw after handling input.
    pub fn begin_frame(&mut self) {
        self.just_pressed_keys.clear();
        self.completed_drag = None;
    }

    /// Marks `key` pressed; repeats do not register a new edge.
    pub fn on_key_pressed(&mut self, key: KeyCode) {
        if self.pressed_keys.insert(key) {
            self.just_pressed_keys.insert(key);
        }
    }

    pub fn on_key_released(&mut self, key: KeyCode) {
        self.pressed_keys.remove(&key);
    }

    pub fn on_mouse_pressed(&mut self, button: MouseButton) {
        if self.pressed_buttons.insert(button) && button == MouseButton::Left {
            self.drag_origin = Some(self.mouse_position);
        }
    }

    pub fn on_mouse_released(&mut self, button: MouseButton) {
        if self.pressed_buttons.remove(&button)
            && button == MouseButton::Left
            && let Some(start) = self.drag_origin.take()
        {
            self.completed_drag = Some(Drag {
                start,
                end: self.mouse_position,
            });
        }
    }

    pub fn on_mouse_moved(&mut self, x: f32, y: f32) {
        self.mouse_position = (x, y);
    }

    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.pressed_keys.contains(&key)
    }

    /// Whether `key` went down since the last [`begin_frame`](Self::begin_frame).
    pub fn is_key_just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed_keys.contains(&key)
    }

    pub fn is_mouse_pressed(&self, button: MouseButton) -> bool {
        self.pressed_buttons.contains(&button)
    }

    pub fn mouse_position(&self) -> (f32, f32) {
        self.mouse_position
    }

    /// The drag completed since the last [`begin_frame`](Self::begin_frame).
    pub fn completed_drag(&self) -> Option<Drag> {
        self.completed_drag
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_edges() {
        let mut input = InputState::new();
        input.on_key_pressed(KeyCode::KeyR);
        assert!(input.is_key_just_pressed(KeyCode::KeyR));
        assert!(input.is_key_pressed(KeyCode::KeyR));

        input.begin_frame();
        assert!(!input.is_key_just_pressed(KeyCode::KeyR));
        assert!(input.is_key_pressed(KeyCode::KeyR));

        // Key repeat does not produce a new edge.
        input.on_key_pressed(KeyCode::KeyR);
        assert!(!input.is_key_just_pressed(KeyCode::KeyR));

        input.on_key_released(KeyCode::KeyR);
        assert!(!input.is_key_pressed(KeyCode::KeyR));
    }

    #[test]
    fn test_left_drag() {
        let mut input = InputState::new();
        input.on_mouse_moved(10.0, 20.0);
        input.on_mouse_pressed(MouseButton::Left);
        input.on_mouse_moved(110.0, 220.0);
        assert!(input.completed_drag().is_none());

        input.on_mouse_released(MouseButton::Left);
        assert_eq!(
            input.completed_drag(),
            Some(Drag {
                start: (10.0, 20.0),
                end: (110.0, 220.0)
            })
        );

        input.begin_frame();
        assert!(input.completed_drag().is_none());
    }

    #[test]
    fn test_right_button_does_not_drag() {
        let mut input = InputState::new();
        input.on_mouse_pressed(MouseButton::Right);
        input.on_mouse_moved(5.0, 5.0);
        input.on_mouse_released(MouseButton::Right);
        assert!(input.completed_drag().is_none());
        assert!(!input.is_mouse_pressed(MouseButton::Right));
    }
}
