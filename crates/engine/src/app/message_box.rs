use tracing::info;

use super::color::color_or_transparent;
use super::controller::{Handler, HandlerTier, Sensitivity};
use super::engine::{Engine, EngineError};
use super::geometry::Vec2;
use super::ids::ViewId;
use super::input::Button;
use super::view::{Camera, View};

/// View and handler id used by the message box.
pub const MESSAGE_BOX_ID: &str = "messagebox";

const TEXT_SCALE: i32 = 2;
const TEXT_MARGIN: i32 = 4;

impl Engine {
    /// Shows `text` over the active scene until Enter is pressed.
    ///
    /// The box is a view appended last to the scene's draw order. While it
    /// is up, its system-tier Enter handler suspends every application
    /// handler; pressing Enter removes the view and the handler together.
    pub fn display_message_box(&mut self, text: &str) -> Result<(), EngineError> {
        let settings = self.config().defaults.message_box.clone();
        let foreground = color_or_transparent(&settings.color);
        let background = color_or_transparent(&settings.background);

        let camera = Camera::try_new(Vec2::ZERO, settings.width, settings.height)?;

        let scene = self.active_scene_mut()?;
        let view = scene.attach_view(
            ViewId::from(MESSAGE_BOX_ID),
            View::new(Vec2::new(settings.x, settings.y), camera, background),
        );
        let message = text.to_string();
        view.set_overlay(move |surface| {
            surface.clear(background);
            surface.draw_text(TEXT_MARGIN, TEXT_MARGIN, &message, foreground, TEXT_SCALE);
        });
        view.show();

        // A second box replaces the first; keep a single dismiss handler.
        self.remove_handler(HandlerTier::System, MESSAGE_BOX_ID);
        self.add_handler(
            HandlerTier::System,
            Handler::new(
                MESSAGE_BOX_ID,
                Button::Enter,
                Sensitivity::JustPressed,
                dismiss_message_box,
            ),
        );
        info!(text, "message_box_shown");
        Ok(())
    }

    pub fn has_message_box(&self) -> bool {
        self.controller().handler_count(HandlerTier::System) > 0
            && self
                .active_scene()
                .is_ok_and(|scene| scene.get_view(MESSAGE_BOX_ID).is_ok())
    }
}

fn dismiss_message_box(engine: &mut Engine) {
    if let Ok(scene) = engine.active_scene_mut() {
        scene.remove_view(MESSAGE_BOX_ID);
    }
    engine.remove_handler(HandlerTier::System, MESSAGE_BOX_ID);
    info!("message_box_dismissed");
}
