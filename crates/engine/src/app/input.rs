use std::collections::HashSet;

/// Physical triggers the controller can bind handlers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Enter,
    Escape,
    Space,
    Tab,
    Backspace,
    KeyW,
    KeyA,
    KeyS,
    KeyD,
    KeyE,
    KeyQ,
    MouseLeft,
    MouseRight,
    MouseMiddle,
}

/// Read side of input state, as seen by controller dispatch.
pub trait InputSource {
    fn is_held(&self, button: Button) -> bool;
    /// True only during the frame in which `button` transitioned to pressed.
    fn is_just_pressed(&self, button: Button) -> bool;
}

/// Tracks held buttons and the press edges seen since the last frame.
#[derive(Debug, Clone, Default)]
pub struct InputState {
    held: HashSet<Button>,
    pressed_edges: HashSet<Button>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// OS key repeat arrives as repeated presses; only the first one is an edge.
    pub fn press(&mut self, button: Button) {
        if self.held.insert(button) {
            self.pressed_edges.insert(button);
        }
    }

    pub fn release(&mut self, button: Button) {
        self.held.remove(&button);
    }

    pub fn set(&mut self, button: Button, is_pressed: bool) {
        if is_pressed {
            self.press(button);
        } else {
            self.release(button);
        }
    }

    /// Clears press edges once a frame has consumed them.
    pub fn end_frame(&mut self) {
        self.pressed_edges.clear();
    }

    pub fn release_all(&mut self) {
        self.held.clear();
        self.pressed_edges.clear();
    }
}

impl InputSource for InputState {
    fn is_held(&self, button: Button) -> bool {
        self.held.contains(&button)
    }

    fn is_just_pressed(&self, button: Button) -> bool {
        self.pressed_edges.contains(&button)
    }
}
