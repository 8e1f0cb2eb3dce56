//! Keyboard state for the current frame.

use std::collections::HashSet;

use winit::event::ElementState;
use winit::keyboard::KeyCode;

/// Keys held, pressed and released, reset per frame.
#[derive(Debug, Default)]
pub struct InputState {
    keys_held: HashSet<KeyCode>,
    keys_pressed: HashSet<KeyCode>,
    keys_released: HashSet<KeyCode>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear per-frame state. Call at the start of each frame.
    pub fn begin_frame(&mut self) {
        self.keys_pressed.clear();
        self.keys_released.clear();
    }

    /// Process a keyboard event.
    pub fn process_keyboard(&mut self, key: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                if !self.keys_held.contains(&key) {
                    self.keys_pressed.insert(key);
                }
                self.keys_held.insert(key);
            }
            ElementState::Released => {
                self.keys_held.remove(&key);
                self.keys_released.insert(key);
            }
        }
    }

    /// Check if a key is currently held.
    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    /// Check if a key was pressed this frame.
    pub fn is_key_pressed(&self, key: KeyCode) -> bool {
        self.keys_pressed.contains(&key)
    }

    /// Check if a key was released this frame.
    pub fn is_key_released(&self, key: KeyCode) -> bool {
        self.keys_released.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_is_reported_once() {
        let mut input = InputState::new();
        input.process_keyboard(KeyCode::Escape, ElementState::Pressed);
        assert!(input.is_key_pressed(KeyCode::Escape));
        input.begin_frame();
        input.process_keyboard(KeyCode::Escape, ElementState::Pressed);
        assert!(!input.is_key_pressed(KeyCode::Escape));
        assert!(input.is_key_held(KeyCode::Escape));
        input.process_keyboard(KeyCode::Escape, ElementState::Released);
        assert!(input.is_key_released(KeyCode::Escape));
        assert!(!input.is_key_held(KeyCode::Escape));
    }
}
