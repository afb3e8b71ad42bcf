use std::fmt;
use std::rc::Rc;
use std::time::Instant;

use tracing::debug;

use super::input::{Button, InputSource};

/// Named handler tiers. While any `System` handler is bound, the
/// `Application` tier is suspended entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerTier {
    System,
    Application,
}

impl HandlerTier {
    pub const fn as_str(self) -> &'static str {
        match self {
            HandlerTier::System => "system",
            HandlerTier::Application => "app",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sensitivity {
    /// Fires once on the frame the button goes down; used for menus.
    JustPressed,
    /// Fires every frame the button stays down; used for movement.
    Held,
}

pub type HandlerAction<C> = Rc<dyn Fn(&mut C)>;

pub struct Handler<C> {
    pub id: String,
    pub button: Button,
    pub sensitivity: Sensitivity,
    action: HandlerAction<C>,
}

impl<C> Handler<C> {
    pub fn new(
        id: impl Into<String>,
        button: Button,
        sensitivity: Sensitivity,
        action: impl Fn(&mut C) + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            button,
            sensitivity,
            action: Rc::new(action),
        }
    }

    fn is_triggered(&self, input: &impl InputSource) -> bool {
        match self.sensitivity {
            Sensitivity::JustPressed => input.is_just_pressed(self.button),
            Sensitivity::Held => input.is_held(self.button),
        }
    }
}

impl<C> fmt::Debug for Handler<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handler")
            .field("id", &self.id)
            .field("button", &self.button)
            .field("sensitivity", &self.sensitivity)
            .finish_non_exhaustive()
    }
}

/// Input-priority router over two handler tiers.
///
/// Dispatch is split in two steps so handlers can mutate the controller that
/// owns them: [`Controller::fired_actions`] snapshots the callbacks that
/// match this frame, and the caller invokes them against its own context.
pub struct Controller<C> {
    system: Vec<Handler<C>>,
    application: Vec<Handler<C>>,
}

impl<C> Default for Controller<C> {
    fn default() -> Self {
        Self {
            system: Vec::new(),
            application: Vec::new(),
        }
    }
}

impl<C> Controller<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_handler(&mut self, tier: HandlerTier, handler: Handler<C>) {
        debug!(
            tier = tier.as_str(),
            handler = %handler.id,
            button = ?handler.button,
            "handler_added"
        );
        self.tier_mut(tier).push(handler);
    }

    /// Removes every handler registered under `id` in `tier`; returns how many.
    pub fn remove_handler(&mut self, tier: HandlerTier, id: &str) -> usize {
        let handlers = self.tier_mut(tier);
        let before = handlers.len();
        handlers.retain(|handler| handler.id != id);
        let removed = before - handlers.len();
        debug!(tier = tier.as_str(), handler = id, removed, "handler_removed");
        removed
    }

    pub fn handler_count(&self, tier: HandlerTier) -> usize {
        self.tier(tier).len()
    }

    pub fn active_tier(&self) -> HandlerTier {
        if self.system.is_empty() {
            HandlerTier::Application
        } else {
            HandlerTier::System
        }
    }

    /// Actions of every handler in the active tier whose trigger fired.
    pub fn fired_actions(&self, input: &impl InputSource) -> Vec<HandlerAction<C>> {
        self.tier(self.active_tier())
            .iter()
            .filter(|handler| handler.is_triggered(input))
            .map(|handler| Rc::clone(&handler.action))
            .collect()
    }

    fn tier(&self, tier: HandlerTier) -> &Vec<Handler<C>> {
        match tier {
            HandlerTier::System => &self.system,
            HandlerTier::Application => &self.application,
        }
    }

    fn tier_mut(&mut self, tier: HandlerTier) -> &mut Vec<Handler<C>> {
        match tier {
            HandlerTier::System => &mut self.system,
            HandlerTier::Application => &mut self.application,
        }
    }
}

impl<C> fmt::Debug for Controller<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("system", &self.system)
            .field("application", &self.application)
            .finish()
    }
}

/// Measures the time between consecutive frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    last: Instant,
}

impl FrameClock {
    pub fn new(now: Instant) -> Self {
        Self { last: now }
    }

    /// Seconds since the previous tick; resets the reference point.
    pub fn tick(&mut self, now: Instant) -> f32 {
        let dt = now.saturating_duration_since(self.last).as_secs_f32();
        self.last = now;
        dt
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new(Instant::now())
    }
}
