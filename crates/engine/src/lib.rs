//! Tile-based 2D engine: scenes, views, actors, layered input handlers and
//! a small command scripting layer, hosted in a winit window.

pub mod app;
pub mod content;
pub mod script;

pub use app::{run_app, AppError, Engine, EngineError, LoopConfig};
pub use content::{resolve_app_paths, AppPaths, Configuration, StartupError, ROOT_ENV_VAR};
pub use script::{Action, Script, ScriptEngine, ScriptError};
