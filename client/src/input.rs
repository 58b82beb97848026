//! Pointer and keyboard interpretation for the game window

use crate::leaderboard::SortKey;
use macroquad::prelude::*;

/// Pointer travel in pixels before a press counts as a drag instead of a click
pub const DRAG_THRESHOLD: f32 = 4.0;

/// Something the player asked for this frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// Drag delta in window pixels
    Pan { dx: f32, dy: f32 },
    /// Click or tap at a window position
    Reveal { x: f32, y: f32 },
    Resize { width: f32, height: f32 },
    /// Leaderboard column picked; picking it again flips the order.
    SortBy(SortKey),
    Reconnect,
    Quit,
}

/// Tells drags from clicks for a single pointer
#[derive(Debug, Default, Clone)]
pub struct PointerTracker {
    pressed_at: Option<(f32, f32)>,
    last: (f32, f32),
    dragging: bool,
}

impl PointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }

    pub fn press(&mut self, x: f32, y: f32) {
        self.pressed_at = Some((x, y));
        self.last = (x, y);
        self.dragging = false;
    }

    /// Returns the pan delta since the last motion once the press became a drag
    pub fn motion(&mut self, x: f32, y: f32) -> Option<(f32, f32)> {
        let (start_x, start_y) = self.pressed_at?;
        if !self.dragging {
            let travelled = ((x - start_x).powi(2) + (y - start_y).powi(2)).sqrt();
            if travelled < DRAG_THRESHOLD {
                return None;
            }
            self.dragging = true;
        }
        let delta = (x - self.last.0, y - self.last.1);
        self.last = (x, y);
        if delta == (0.0, 0.0) {
            None
        } else {
            Some(delta)
        }
    }

    /// Returns the click position if the press never turned into a drag
    pub fn release(&mut self, x: f32, y: f32) -> Option<(f32, f32)> {
        let pressed = self.pressed_at.take();
        let was_drag = std::mem::take(&mut self.dragging);
        match pressed {
            Some(_) if !was_drag => Some((x, y)),
            _ => None,
        }
    }
}

/// Fires once per key press while the key is held across frames
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyLatch {
    was_down: bool,
}

impl KeyLatch {
    pub fn rising(&mut self, down: bool) -> bool {
        let fired = down && !self.was_down;
        self.was_down = down;
        fired
    }
}

/// Leaderboard column bound to a key, if any
pub fn sort_key_for(key: KeyCode) -> Option<SortKey> {
    match key {
        KeyCode::S => Some(SortKey::Score),
        KeyCode::T => Some(SortKey::TilesPerHour),
        _ => None,
    }
}

/// Polls macroquad once per frame and turns raw state into [`InputEvent`]s
pub struct InputManager {
    pointer: PointerTracker,
    window_size: (f32, f32),

    // Previous frame key state for edge detection
    reconnect_key: KeyLatch,
    sort_keys: [(KeyCode, KeyLatch); 2],
}

impl InputManager {
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            pointer: PointerTracker::new(),
            window_size: (width, height),
            reconnect_key: KeyLatch::default(),
            sort_keys: [
                (KeyCode::S, KeyLatch::default()),
                (KeyCode::T, KeyLatch::default()),
            ],
        }
    }

    pub fn update(&mut self) -> Vec<InputEvent> {
        let mut events = Vec::new();

        if is_key_pressed(KeyCode::Escape) {
            events.push(InputEvent::Quit);
        }

        if self.reconnect_key.rising(is_key_down(KeyCode::R)) {
            events.push(InputEvent::Reconnect);
        }

        for (code, latch) in self.sort_keys.iter_mut() {
            if latch.rising(is_key_down(*code)) {
                if let Some(key) = sort_key_for(*code) {
                    events.push(InputEvent::SortBy(key));
                }
            }
        }

        let size = (screen_width(), screen_height());
        if size != self.window_size {
            self.window_size = size;
            events.push(InputEvent::Resize {
                width: size.0,
                height: size.1,
            });
        }

        let (x, y) = mouse_position();
        if is_mouse_button_pressed(MouseButton::Left) {
            self.pointer.press(x, y);
        } else if is_mouse_button_released(MouseButton::Left) {
            if let Some((x, y)) = self.pointer.release(x, y) {
                events.push(InputEvent::Reveal { x, y });
            }
        } else if is_mouse_button_down(MouseButton::Left) {
            if let Some((dx, dy)) = self.pointer.motion(x, y) {
                events.push(InputEvent::Pan { dx, dy });
            }
        }

        events
    }
}
