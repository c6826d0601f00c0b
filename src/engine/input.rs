// Input state tracking for keyboard and mouse
// Abstracts winit events into a queryable per-frame snapshot

use std::collections::HashSet;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

pub struct InputState {
    // Keyboard
    keys_held: HashSet<KeyCode>,

    // Mouse buttons: held across frames, pressed/released only for this frame
    buttons_held: HashSet<MouseButton>,
    buttons_pressed: HashSet<MouseButton>,
    buttons_released: HashSet<MouseButton>,

    // Cursor position in window pixels (client coordinates)
    pub mouse_position: (f32, f32),
    // Cursor movement accumulated this frame
    pub mouse_delta: (f32, f32),
    pub cursor_inside: bool,
    // Set on the frame the cursor leaves the window
    pub cursor_left: bool,

    // Scroll: accumulated vertical scroll this frame, reset in end_frame()
    pub scroll_delta: f32,

    pub window_size: (u32, u32),
}

impl InputState {
    pub fn new() -> Self {
        Self {
            keys_held: HashSet::new(),
            buttons_held: HashSet::new(),
            buttons_pressed: HashSet::new(),
            buttons_released: HashSet::new(),
            mouse_position: (0.0, 0.0),
            mouse_delta: (0.0, 0.0),
            cursor_inside: false,
            cursor_left: false,
            scroll_delta: 0.0,
            window_size: (0, 0),
        }
    }

    /// Feed a winit WindowEvent into the input state.
    /// Call this once per event before the app's own event handling.
    pub fn process_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(key) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => { self.keys_held.insert(key); }
                        ElementState::Released => { self.keys_held.remove(&key); }
                    }
                }
            }
            WindowEvent::MouseInput { state, button, .. } => match state {
                ElementState::Pressed => {
                    self.buttons_held.insert(*button);
                    self.buttons_pressed.insert(*button);
                }
                ElementState::Released => {
                    self.buttons_held.remove(button);
                    self.buttons_released.insert(*button);
                }
            },
            WindowEvent::CursorMoved { position, .. } => {
                let pos = (position.x as f32, position.y as f32);
                if self.cursor_inside {
                    self.mouse_delta.0 += pos.0 - self.mouse_position.0;
                    self.mouse_delta.1 += pos.1 - self.mouse_position.1;
                }
                self.mouse_position = pos;
                self.cursor_inside = true;
            }
            WindowEvent::CursorEntered { .. } => {
                self.cursor_inside = true;
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor_inside = false;
                self.cursor_left = true;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let y = match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 100.0,
                };
                self.scroll_delta += y;
            }
            WindowEvent::Resized(size) => {
                self.window_size = (size.width, size.height);
            }
            WindowEvent::Focused(false) => {
                // Releases are not delivered to an unfocused window.
                self.keys_held.clear();
                self.buttons_released.extend(self.buttons_held.drain());
            }
            _ => {}
        }
    }

    /// Call once per frame after update() and render() have consumed input.
    /// Resets per-frame accumulators.
    pub fn end_frame(&mut self) {
        self.scroll_delta = 0.0;
        self.mouse_delta = (0.0, 0.0);
        self.buttons_pressed.clear();
        self.buttons_released.clear();
        self.cursor_left = false;
    }

    pub fn is_key_held(&self, key: KeyCode) -> bool {
        self.keys_held.contains(&key)
    }

    pub fn is_button_held(&self, button: MouseButton) -> bool {
        self.buttons_held.contains(&button)
    }

    pub fn was_pressed(&self, button: MouseButton) -> bool {
        self.buttons_pressed.contains(&button)
    }

    pub fn was_released(&self, button: MouseButton) -> bool {
        self.buttons_released.contains(&button)
    }
}

impl Default for InputState {
    fn default() -> Self {
        Self::new()
    }
}
