//! Commands every engine ships with.

use super::{ArgKind, CommandShape, ScriptEngine, Value};
use crate::app::{color_or_transparent, ActorId, Camera, Engine, Vec2, ViewId};

pub fn register_core_actions(scripts: &mut ScriptEngine<Engine>) {
    scripts.register(
        "NewScene",
        "Create an empty scene",
        CommandShape::new().text("scene_id").text("bgcolor"),
        |engine, args| {
            engine.new_scene(args.text(0), &args.text(1));
            Ok(None)
        },
    );

    scripts.register(
        "NewMapScene",
        "Create a scene from a map file and spawn its actors",
        CommandShape::new()
            .text("scene_id")
            .text("map_file")
            .text("bgcolor"),
        |engine, args| {
            engine.new_map_scene(args.text(0), &args.text(1), &args.text(2))?;
            Ok(None)
        },
    );

    scripts.register(
        "NewView",
        "Add a hidden view to a scene",
        CommandShape::new()
            .text("scene_id")
            .text("view_id")
            .number("x")
            .number("y")
            .number("width")
            .number("height")
            .text("bgcolor"),
        |engine, args| {
            let background = color_or_transparent(&args.text(6));
            let camera = Camera::try_new(Vec2::ZERO, args.number(4), args.number(5))?;
            engine.scene_mut(&args.text(0))?.new_view(
                ViewId::from(args.text(1)),
                Vec2::new(args.number(2), args.number(3)),
                camera,
                background,
            );
            Ok(None)
        },
    );

    scripts.register(
        "StartMapView",
        "Render the scene map through a view",
        CommandShape::new().text("scene_id").text("view_id"),
        |engine, args| {
            engine.scene_mut(&args.text(0))?.use_map(&args.text(1))?;
            Ok(None)
        },
    );

    scripts.register(
        "ShowView",
        "Make a view visible",
        CommandShape::new().text("scene_id").text("view_id"),
        |engine, args| {
            engine
                .scene_mut(&args.text(0))?
                .get_view_mut(&args.text(1))?
                .show();
            Ok(None)
        },
    );

    scripts.register(
        "NewActor",
        "Create an actor and attach it to a scene",
        CommandShape::new()
            .text("scene_id")
            .text("actor_id")
            .text("image_file")
            .number("x")
            .number("y")
            .flag("visible")
            .flag("collision"),
        |engine, args| {
            engine.spawn_actor(
                &args.text(0),
                ActorId::from(args.text(1)),
                &args.text(2),
                Vec2::new(args.number(3), args.number(4)),
                args.flag(5),
                args.flag(6),
            )?;
            Ok(None)
        },
    );

    scripts.register(
        "ViewFocus",
        "Make a view follow an actor",
        CommandShape::new()
            .text("scene_id")
            .text("view_id")
            .text("actor_id"),
        |engine, args| {
            let actor = args.text(2);
            let scene = engine.scene_mut(&args.text(0))?;
            scene.require_actor(&actor)?;
            scene
                .get_view_mut(&args.text(1))?
                .focus_on(ActorId::from(actor));
            Ok(None)
        },
    );

    scripts.register(
        "ActorVisible",
        "Draw an actor in each listed view",
        CommandShape::new()
            .text("scene_id")
            .text("actor_id")
            .rest("view_id", ArgKind::Text),
        |engine, args| {
            let actor = args.text(1);
            let views = args.rest_text(2);
            let scene = engine.scene_mut(&args.text(0))?;
            scene.require_actor(&actor)?;
            for view in &views {
                scene.get_view(view)?;
            }
            for view in &views {
                scene
                    .get_view_mut(view)?
                    .show_actor(ActorId::from(actor.as_str()));
            }
            Ok(None)
        },
    );

    scripts.register(
        "ActorSpeed",
        "Set an actor's speed multiplier",
        CommandShape::new()
            .text("scene_id")
            .text("actor_id")
            .number("speed"),
        |engine, args| {
            engine.attached_actor_mut(&args.text(0), &args.text(1))?.speed = args.number(2);
            Ok(None)
        },
    );

    scripts.register(
        "MoveActor",
        "Relocate an actor, or queue a destination for it",
        CommandShape::new()
            .text("scene_id")
            .text("actor_id")
            .number("x")
            .number("y")
            .flag("instant"),
        |engine, args| {
            let target = Vec2::new(args.number(2), args.number(3));
            let actor = engine.attached_actor_mut(&args.text(0), &args.text(1))?;
            if args.flag(4) {
                actor.move_to(target);
            } else {
                actor.queue_destination(target);
            }
            Ok(None)
        },
    );

    scripts.register(
        "MoveView",
        "Move a view on the scene surface",
        CommandShape::new()
            .text("scene_id")
            .text("view_id")
            .number("x")
            .number("y"),
        |engine, args| {
            engine
                .scene_mut(&args.text(0))?
                .get_view_mut(&args.text(1))?
                .move_to(Vec2::new(args.number(2), args.number(3)));
            Ok(None)
        },
    );

    scripts.register(
        "ActivateScene",
        "Make a scene the one the loop runs",
        CommandShape::new().text("scene_id"),
        |engine, args| {
            engine.activate_scene(&args.text(0))?;
            Ok(None)
        },
    );

    scripts.register(
        "RunScriptFile",
        "Run <scripting dir>/<name>.<extension>",
        CommandShape::new().text("name"),
        |engine, args| {
            let report = engine.run_script_file(&args.text(0))?;
            Ok(Some(Value::Bool(report.succeeded())))
        },
    );
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::app::{Bitmap, EngineError};
    use crate::content::{Configuration, MemoryAssetLoader, MemoryMapLoader};
    use crate::script::{dispatch, Action, Script, ScriptError};

    const CONFIG: &str = r#"<configuration>
  <system>
    <window width="320" height="240" title="Test"/>
    <scripting dir="scripts" extension="script"/>
    <directory characters="characters" maps="maps"/>
    <startup script="main" scene="town"/>
  </system>
  <default>
    <scene basespeed="100"/>
    <actor speed="2"/>
    <messagebox color="white" bgcolor="navy" x="160" y="40" width="300" height="60"/>
  </default>
</configuration>"#;

    fn engine() -> Engine {
        let config = Configuration::from_xml_str(CONFIG).expect("config");
        let images = MemoryAssetLoader::new().with_bitmap(
            PathBuf::from("characters").join("hero.png"),
            Bitmap::filled(8, 8, [255, 0, 0, 255]),
        );
        Engine::with_loaders(config, Box::new(images), Box::new(MemoryMapLoader::new()))
    }

    fn action(command: &str, arguments: &[&str]) -> Action {
        Action::new(command, arguments.iter().copied().map(Value::from).collect())
    }

    fn run(engine: &mut Engine, raw: &str) {
        let report = engine.run_script(&Script::parse_str(raw));
        assert!(report.succeeded(), "script failed: {:?}", report.failures);
    }

    #[test]
    fn builds_a_scene_with_a_focused_actor() {
        let mut engine = engine();
        run(
            &mut engine,
            "NewScene town black\n\
             NewView town main 160 120 320 240 black\n\
             ShowView town main\n\
             NewActor town hero hero.png 20 30 true true\n\
             ViewFocus town main hero\n\
             ActorVisible town hero main\n\
             ActorSpeed town hero 3\n\
             MoveView town main 100 80\n\
             ActivateScene town\n",
        );

        let scene = engine.scene("town").expect("scene");
        let view = scene.get_view("main").expect("view");
        assert!(view.is_visible());
        assert_eq!(view.position(), Vec2::new(100.0, 80.0));
        assert_eq!(view.camera().width(), 320.0);
        assert_eq!(view.focus().map(ActorId::as_str), Some("hero"));
        assert_eq!(view.visible_actors(), &[ActorId::from("hero")]);

        let hero = engine.actors().get("hero").expect("hero");
        assert_eq!(hero.position(), Vec2::new(20.0, 30.0));
        assert_eq!(hero.speed, 3.0);
        assert!(hero.visible);
        assert_eq!(engine.active_scene_id().map(|id| id.as_str()), Some("town"));
    }

    #[test]
    fn move_actor_instant_ignores_speed_and_queue_otherwise() {
        let mut engine = engine();
        run(
            &mut engine,
            "NewScene town black\n\
             NewActor town hero hero.png 0 0 true true\n\
             ActorSpeed town hero 9\n\
             MoveActor town hero 40 50 true\n\
             MoveActor town hero 60 50 false\n",
        );

        let hero = engine.actors().get("hero").expect("hero");
        assert_eq!(hero.position(), Vec2::new(40.0, 50.0));
        assert_eq!(hero.clip().center(), Vec2::new(40.0, 50.0));
        assert_eq!(hero.destinations().len(), 1);
    }

    #[test]
    fn missing_targets_surface_as_not_found() {
        let mut engine = engine();
        let error = dispatch(&mut engine, &action("ShowView", &["nowhere", "main"]))
            .expect_err("no scene");
        assert!(matches!(error, ScriptError::Engine(EngineError::SceneNotFound { .. })));

        run(&mut engine, "NewScene town black\n");
        let error = dispatch(
            &mut engine,
            &Action::new("ActorSpeed", vec!["town".into(), "ghost".into(), "2".into()]),
        )
        .expect_err("no actor");
        assert!(matches!(error, ScriptError::Engine(EngineError::ActorNotAttached { .. })));

        let error = dispatch(&mut engine, &action("StartMapView", &["town", "main"]))
            .expect_err("no map");
        assert!(matches!(error, ScriptError::Engine(EngineError::NoMapData)));
    }

    #[test]
    fn actor_image_failure_does_not_register_the_actor() {
        let mut engine = engine();
        run(&mut engine, "NewScene town black\n");
        let error = dispatch(
            &mut engine,
            &action("NewActor", &["town", "ghost", "ghost.png", "0", "0", "true", "true"]),
        )
        .expect_err("missing image");
        assert!(matches!(error, ScriptError::Engine(EngineError::Asset(_))));
        assert!(engine.actors().get("ghost").is_none());
        assert!(!engine.scene("town").expect("scene").has_actor("ghost"));
    }

    #[test]
    fn oversized_or_empty_views_are_refused() {
        let mut engine = engine();
        run(&mut engine, "NewScene town black\n");
        for (width, height) in [("1e12", "1e12"), ("0", "100"), ("100", "-4")] {
            let error = dispatch(
                &mut engine,
                &action("NewView", &["town", "v", "0", "0", width, height, "black"]),
            )
            .expect_err("size");
            assert!(
                matches!(error, ScriptError::Engine(EngineError::InvalidViewSize { .. })),
                "{width}x{height}: {error}"
            );
        }
        assert!(engine.scene("town").expect("scene").get_view("v").is_err());
    }

    #[test]
    fn unreadable_numbers_and_flags_read_as_zero_and_false() {
        let mut engine = engine();
        run(
            &mut engine,
            "NewScene town black\n\
             NewActor town hero hero.png 10 10 true true\n\
             MoveActor town hero abc 5 true\n\
             NewActor town guard hero.png 1 2 yes true\n",
        );

        let hero = engine.actors().get("hero").expect("hero");
        assert_eq!(hero.position(), Vec2::new(0.0, 5.0));
        let guard = engine.actors().get("guard").expect("guard");
        assert_eq!(guard.position(), Vec2::new(1.0, 2.0));
        assert!(!guard.visible);
    }

    #[test]
    fn actor_visible_changes_nothing_when_a_view_is_missing() {
        let mut engine = engine();
        run(
            &mut engine,
            "NewScene town black\n\
             NewView town main 160 120 320 240 black\n\
             NewActor town hero hero.png 20 30 true true\n",
        );

        let error = dispatch(
            &mut engine,
            &action("ActorVisible", &["town", "hero", "main", "ghost"]),
        )
        .expect_err("missing view");
        assert!(matches!(error, ScriptError::Engine(EngineError::ViewNotFound { .. })));
        let scene = engine.scene("town").expect("scene");
        assert!(scene.get_view("main").expect("main").visible_actors().is_empty());

        run(&mut engine, "ActorVisible town hero main main\n");
        let scene = engine.scene("town").expect("scene");
        assert_eq!(
            scene.get_view("main").expect("main").visible_actors(),
            &[ActorId::from("hero")]
        );
    }
}
