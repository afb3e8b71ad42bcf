use tile_engine::app::{Button, Direction, Handler, HandlerTier, Sensitivity};
use tile_engine::Engine;
use tracing::{info, trace, warn};

const MOVEMENT_KEYS: [(Button, Direction); 4] = [
    (Button::ArrowUp, Direction::North),
    (Button::ArrowDown, Direction::South),
    (Button::ArrowLeft, Direction::West),
    (Button::ArrowRight, Direction::East),
];

const HELP_TEXT: &str = "ARROWS MOVE\nENTER CLOSES THIS BOX\nESC QUITS";

/// Held arrow keys walk `player` through the active scene.
pub(crate) fn bind_player(engine: &mut Engine, player: &str) {
    let attached = engine
        .active_scene()
        .is_ok_and(|scene| scene.has_actor(player));
    if !attached {
        warn!(player, "player actor not in the startup scene; arrow keys unbound");
        return;
    }

    for (button, direction) in MOVEMENT_KEYS {
        let actor = player.to_string();
        engine.add_handler(
            HandlerTier::Application,
            Handler::new(
                format!("move_{direction:?}").to_lowercase(),
                button,
                Sensitivity::Held,
                move |engine: &mut Engine| match engine.move_actor(&actor, direction) {
                    Ok(moved) => trace!(actor = %actor, ?direction, moved, "player_step"),
                    Err(error) => trace!(actor = %actor, error = %error, "player_step_failed"),
                },
            ),
        );
    }
    info!(player, "player_controls_bound");
}

/// Space shows the key help in a message box.
pub(crate) fn bind_help(engine: &mut Engine) {
    engine.add_handler(
        HandlerTier::Application,
        Handler::new("help", Button::Space, Sensitivity::JustPressed, |engine: &mut Engine| {
            if let Err(error) = engine.display_message_box(HELP_TEXT) {
                warn!(error = %error, "help_unavailable");
            }
        }),
    );
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tile_engine::app::{Bitmap, InputState, Vec2};
    use tile_engine::content::{MemoryAssetLoader, MemoryMapLoader};
    use tile_engine::Configuration;

    use super::*;

    const CONFIG: &str = r#"<configuration>
  <system>
    <window width="200" height="200" title="Controls"/>
    <scripting dir="scripts" extension="script"/>
    <directory characters="characters" maps="maps"/>
    <startup script="main" scene="town" player="hero"/>
  </system>
  <default>
    <scene basespeed="100"/>
    <actor speed="1"/>
    <messagebox color="white" bgcolor="navy" x="100" y="100" width="160" height="40"/>
  </default>
</configuration>"#;

    fn engine() -> Engine {
        let config = Configuration::from_xml_str(CONFIG).expect("config");
        let images = MemoryAssetLoader::new().with_bitmap(
            Path::new("characters").join("hero.png"),
            Bitmap::filled(4, 4, [0, 255, 0, 255]),
        );
        let mut engine =
            Engine::with_loaders(config, Box::new(images), Box::new(MemoryMapLoader::new()));
        engine.new_scene("town", "black");
        engine
            .spawn_actor("town", "hero".into(), "hero.png", Vec2::new(50.0, 50.0), true, true)
            .expect("hero");
        engine.activate_scene("town").expect("activate");
        engine
    }

    #[test]
    fn held_arrow_moves_the_player_each_frame() {
        let mut engine = engine();
        bind_player(&mut engine, "hero");

        let mut input = InputState::new();
        input.press(Button::ArrowRight);
        engine.step(0.1, &input).expect("frame");
        input.end_frame();
        engine.step(0.1, &input).expect("frame");

        let hero = engine.actors().get("hero").expect("hero");
        assert_eq!(hero.position(), Vec2::new(70.0, 50.0));
    }

    #[test]
    fn unknown_player_binds_nothing() {
        let mut engine = engine();
        bind_player(&mut engine, "ghost");
        assert_eq!(engine.controller().handler_count(HandlerTier::Application), 0);
    }

    #[test]
    fn space_opens_help() {
        let mut engine = engine();
        bind_help(&mut engine);

        let mut input = InputState::new();
        input.press(Button::Space);
        engine.step(0.016, &input).expect("frame");
        assert!(engine.has_message_box());
    }
}
