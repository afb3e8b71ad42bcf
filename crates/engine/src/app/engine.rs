use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::actor::{Actor, ActorTable};
use super::color::color_or_transparent;
use super::controller::{Controller, FrameClock, Handler, HandlerTier};
use super::geometry::{Direction, Vec2};
use super::ids::{ActorId, SceneId};
use super::input::InputState;
use super::scene::Scene;
use super::surface::Surface;
use crate::content::{
    AssetCache, AssetError, AssetLoader, Configuration, ImageAssetLoader, MapError, MapLoader,
    TiledMapLoader,
};
use crate::script::{
    self, register_core_actions, Action, CommandResult, Script, ScriptEngine, ScriptError,
    ScriptHost, ScriptRun,
};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("scene '{scene}' not found")]
    SceneNotFound { scene: String },
    #[error("view '{view}' not found")]
    ViewNotFound { view: String },
    #[error("actor '{actor}' not found")]
    ActorNotFound { actor: String },
    #[error("actor '{actor}' is not attached to the scene")]
    ActorNotAttached { actor: String },
    #[error("scene has no map data")]
    NoMapData,
    #[error("no active scene")]
    NoActiveScene,
    #[error("view size {width}x{height} is out of range")]
    InvalidViewSize { width: f32, height: f32 },
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error(transparent)]
    Map(#[from] MapError),
}

/// Read/write access handed to per-frame game logic. Actors and their
/// destination queues may be changed freely; the active scene is read-only
/// so its views keep their draw order for the frame.
pub struct FrameContext<'a> {
    pub dt: f32,
    pub input: &'a InputState,
    pub scene_id: &'a SceneId,
    pub scene: &'a Scene,
    pub actors: &'a mut ActorTable,
}

impl FrameContext<'_> {
    /// [`Scene::move_actor`] on the active scene with this frame's delta.
    pub fn move_actor(&mut self, actor: &str, direction: Direction) -> Result<bool, EngineError> {
        self.scene.move_actor(self.actors, actor, direction, self.dt)
    }
}

/// Free-form logic run once per frame, after input handlers and before
/// destination processing.
pub trait GameLogic {
    fn update(&mut self, frame: &mut FrameContext<'_>);
}

impl<F> GameLogic for F
where
    F: FnMut(&mut FrameContext<'_>),
{
    fn update(&mut self, frame: &mut FrameContext<'_>) {
        self(frame)
    }
}

/// Owns every scene and actor plus the input controller and the script
/// registry. Scenes and views refer to actors by id only.
pub struct Engine {
    config: Configuration,
    images: AssetCache,
    maps: Box<dyn MapLoader>,
    actors: ActorTable,
    scenes: HashMap<SceneId, Scene>,
    active_scene: Option<SceneId>,
    control: Controller<Engine>,
    scripts: ScriptEngine<Engine>,
    logic: Option<Box<dyn GameLogic>>,
    /// Names of script files currently executing, outermost first.
    running_scripts: Vec<String>,
    clock: FrameClock,
    dt: f32,
}

impl Engine {
    /// Decodes images from disk and reads Tiled maps.
    pub fn new(config: Configuration) -> Self {
        let map_images = AssetCache::new(Box::new(ImageAssetLoader));
        Self::with_loaders(
            config,
            Box::new(ImageAssetLoader),
            Box::new(TiledMapLoader::new(map_images)),
        )
    }

    pub fn with_loaders(
        config: Configuration,
        images: Box<dyn AssetLoader>,
        maps: Box<dyn MapLoader>,
    ) -> Self {
        let mut scripts = ScriptEngine::new();
        register_core_actions(&mut scripts);
        Self {
            config,
            images: AssetCache::new(images),
            maps,
            actors: ActorTable::new(),
            scenes: HashMap::new(),
            active_scene: None,
            control: Controller::new(),
            scripts,
            logic: None,
            running_scripts: Vec::new(),
            clock: FrameClock::default(),
            dt: 0.0,
        }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    /// Seconds covered by the current frame.
    pub fn dt(&self) -> f32 {
        self.dt
    }

    pub fn actors(&self) -> &ActorTable {
        &self.actors
    }

    pub fn actors_mut(&mut self) -> &mut ActorTable {
        &mut self.actors
    }

    pub fn controller(&self) -> &Controller<Engine> {
        &self.control
    }

    pub fn scripts(&self) -> &ScriptEngine<Engine> {
        &self.scripts
    }

    /// For registering game-specific commands next to the core ones.
    pub fn scripts_mut(&mut self) -> &mut ScriptEngine<Engine> {
        &mut self.scripts
    }

    /// Creates an empty scene sized to the window, replacing any scene with
    /// the same id.
    pub fn new_scene(&mut self, id: impl Into<SceneId>, background: &str) -> &mut Scene {
        let scene = self.blank_scene(background);
        self.insert_scene(id.into(), scene)
    }

    /// Loads `<maps dir>/<map_file>`, creates a scene around it and spawns
    /// the map's actors into it.
    pub fn new_map_scene(
        &mut self,
        id: impl Into<SceneId>,
        map_file: &str,
        background: &str,
    ) -> Result<&mut Scene, EngineError> {
        let id = id.into();
        let path = self.config.system.directories.maps.join(map_file);
        let map = self.maps.load_map(&path)?;
        let spawns = map.spawns.clone();

        let mut scene = self.blank_scene(background);
        scene.set_map(map);
        self.insert_scene(id.clone(), scene);

        for spawn in spawns {
            self.spawn_actor(
                id.as_str(),
                ActorId::from(spawn.actor_id),
                &spawn.image_file,
                spawn.position,
                spawn.visible,
                spawn.collide,
            )?;
        }
        self.scene_mut(id.as_str())
    }

    fn blank_scene(&self, background: &str) -> Scene {
        let window = &self.config.system.window;
        Scene::new(
            self.config.defaults.scene_base_speed,
            color_or_transparent(background),
            window.width,
            window.height,
        )
    }

    fn insert_scene(&mut self, id: SceneId, scene: Scene) -> &mut Scene {
        info!(scene = %id, "scene_created");
        match self.scenes.entry(id) {
            Entry::Occupied(mut entry) => {
                warn!(scene = %entry.key(), "scene_replaced");
                entry.insert(scene);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(scene),
        }
    }

    pub fn scene(&self, id: &str) -> Result<&Scene, EngineError> {
        self.scenes.get(id).ok_or_else(|| EngineError::SceneNotFound {
            scene: id.to_string(),
        })
    }

    pub fn scene_mut(&mut self, id: &str) -> Result<&mut Scene, EngineError> {
        self.scenes
            .get_mut(id)
            .ok_or_else(|| EngineError::SceneNotFound {
                scene: id.to_string(),
            })
    }

    pub fn scene_ids(&self) -> impl Iterator<Item = &SceneId> {
        self.scenes.keys()
    }

    pub fn activate_scene(&mut self, id: &str) -> Result<(), EngineError> {
        let (key, _) = self
            .scenes
            .get_key_value(id)
            .ok_or_else(|| EngineError::SceneNotFound {
                scene: id.to_string(),
            })?;
        self.active_scene = Some(key.clone());
        info!(scene = id, "scene_activated");
        Ok(())
    }

    pub fn active_scene_id(&self) -> Option<&SceneId> {
        self.active_scene.as_ref()
    }

    pub fn active_scene(&self) -> Result<&Scene, EngineError> {
        let id = self.active_scene.as_ref().ok_or(EngineError::NoActiveScene)?;
        self.scene(id.as_str())
    }

    pub fn active_scene_mut(&mut self) -> Result<&mut Scene, EngineError> {
        let id = self
            .active_scene
            .clone()
            .ok_or(EngineError::NoActiveScene)?;
        self.scene_mut(id.as_str())
    }

    /// Builds an actor from `<characters dir>/<image_file>` with the
    /// configured default speed. The actor starts hidden with collision on.
    pub fn new_actor(&mut self, image_file: &str, position: Vec2) -> Result<Actor, EngineError> {
        let path = self.config.system.directories.characters.join(image_file);
        let sprite = self.images.bitmap(&path)?;
        Ok(Actor::new(
            sprite,
            position,
            self.config.defaults.actor_speed,
        ))
    }

    /// Registers an actor globally, replacing any actor with the same id.
    pub fn add_actor(&mut self, id: ActorId, actor: Actor) -> Option<Actor> {
        debug!(actor = %id, "actor_added");
        self.actors.insert(id, actor)
    }

    /// Creates, registers and attaches an actor in one go. Nothing is
    /// registered if the scene is missing or the image fails to load.
    pub fn spawn_actor(
        &mut self,
        scene: &str,
        id: ActorId,
        image_file: &str,
        position: Vec2,
        visible: bool,
        collision: bool,
    ) -> Result<(), EngineError> {
        self.scene(scene)?;
        let mut actor = self.new_actor(image_file, position)?;
        actor.visible = visible;
        actor.set_collision(collision);
        self.add_actor(id.clone(), actor);
        self.scene_mut(scene)?.use_actor(id);
        Ok(())
    }

    /// An actor from the global table, provided `scene` has it attached.
    pub fn attached_actor_mut(
        &mut self,
        scene: &str,
        actor: &str,
    ) -> Result<&mut Actor, EngineError> {
        self.scene(scene)?.require_actor(actor)?;
        self.actors
            .get_mut(actor)
            .ok_or_else(|| EngineError::ActorNotFound {
                actor: actor.to_string(),
            })
    }

    /// [`Scene::move_actor`] on the active scene using the current frame
    /// delta. Meant for held-key handlers.
    pub fn move_actor(&mut self, actor: &str, direction: Direction) -> Result<bool, EngineError> {
        let id = self.active_scene.as_ref().ok_or(EngineError::NoActiveScene)?;
        let scene = self.scenes.get(id).ok_or_else(|| EngineError::SceneNotFound {
            scene: id.to_string(),
        })?;
        scene.move_actor(&mut self.actors, actor, direction, self.dt)
    }

    /// Free-form counterpart of [`Engine::move_actor`].
    pub fn move_actor_angle(&mut self, actor: &str, degrees: f32) -> Result<bool, EngineError> {
        let id = self.active_scene.as_ref().ok_or(EngineError::NoActiveScene)?;
        let scene = self.scenes.get(id).ok_or_else(|| EngineError::SceneNotFound {
            scene: id.to_string(),
        })?;
        scene.move_actor_angle(&mut self.actors, actor, degrees, self.dt)
    }

    pub fn add_handler(&mut self, tier: HandlerTier, handler: Handler<Engine>) {
        self.control.add_handler(tier, handler);
    }

    pub fn remove_handler(&mut self, tier: HandlerTier, id: &str) -> usize {
        self.control.remove_handler(tier, id)
    }

    pub fn set_logic(&mut self, logic: impl GameLogic + 'static) {
        self.logic = Some(Box::new(logic));
    }

    pub fn clear_logic(&mut self) {
        self.logic = None;
    }

    pub fn dispatch(&mut self, action: &Action) -> CommandResult {
        script::dispatch(self, action)
    }

    pub fn run_script(&mut self, source: &Script) -> ScriptRun {
        let report = script::run(self, source.actions());
        debug!(
            executed = report.executed,
            failed = report.failures.len(),
            "script_finished"
        );
        report
    }

    /// Runs `<scripting dir>/<name>.<extension>`.
    ///
    /// A file that is already running, directly or through a chain of
    /// `RunScriptFile` lines, is refused with [`ScriptError::RecursiveScript`].
    pub fn run_script_file(&mut self, name: &str) -> Result<ScriptRun, ScriptError> {
        if self.running_scripts.iter().any(|running| running == name) {
            return Err(ScriptError::RecursiveScript {
                name: name.to_string(),
                chain: self.running_scripts.join(" -> "),
            });
        }
        let path = self.config.script_path(name);
        let script = Script::from_file(&path)?;
        info!(path = %path.display(), actions = script.len(), "script_started");

        self.running_scripts.push(name.to_string());
        let report = self.run_script(&script);
        self.running_scripts.pop();
        Ok(report)
    }

    /// Advances one frame using wall-clock time since the previous call.
    pub fn update(&mut self, input: &InputState) -> Result<(), EngineError> {
        let dt = self.clock.tick(Instant::now());
        self.step(dt, input)
    }

    /// Advances one frame of `dt` seconds: input handlers, then game logic,
    /// then destination movement on the active scene.
    pub fn step(&mut self, dt: f32, input: &InputState) -> Result<(), EngineError> {
        if self.active_scene.is_none() {
            return Err(EngineError::NoActiveScene);
        }
        self.dt = dt;

        for action in self.control.fired_actions(input) {
            action(self);
        }

        // Handlers may have switched scenes; re-resolve.
        let id = self.active_scene.clone().ok_or(EngineError::NoActiveScene)?;
        let scene = self.scenes.get(&id).ok_or_else(|| EngineError::SceneNotFound {
            scene: id.to_string(),
        })?;

        if let Some(logic) = self.logic.as_mut() {
            let mut frame = FrameContext {
                dt,
                input,
                scene_id: &id,
                scene,
                actors: &mut self.actors,
            };
            logic.update(&mut frame);
        }

        scene.process_actor_destinations(&mut self.actors, dt);
        Ok(())
    }

    /// Composes the active scene.
    pub fn render(&mut self) -> Result<&Surface, EngineError> {
        let id = self.active_scene.as_ref().ok_or(EngineError::NoActiveScene)?;
        let scene = self
            .scenes
            .get_mut(id)
            .ok_or_else(|| EngineError::SceneNotFound {
                scene: id.to_string(),
            })?;
        Ok(scene.render(&self.actors))
    }
}

impl ScriptHost for Engine {
    fn script_engine(&self) -> &ScriptEngine<Self> {
        &self.scripts
    }
}
