use thiserror::Error;
use tile_engine::content::ConfigError;
use tile_engine::{
    resolve_app_paths, Configuration, Engine, EngineError, LoopConfig, ScriptError, StartupError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::controls;

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) engine: Engine,
}

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Paths(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("startup script failed: {0}")]
    Script(#[from] ScriptError),
    #[error("startup scene unavailable: {0}")]
    Scene(#[from] EngineError),
}

/// Loads configuration, runs the startup script and activates the startup
/// scene.
pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Tile Engine Startup ===");

    let paths = resolve_app_paths()?;
    info!(
        root = %paths.root.display(),
        config = %paths.config_path.display(),
        "startup"
    );
    let mut configuration = Configuration::load(&paths.config_path)?;
    configuration.resolve_directories(&paths.assets_dir);
    let startup = configuration.system.startup.clone();

    let mut engine = Engine::new(configuration);
    let report = engine.run_script_file(&startup.script)?;
    if !report.succeeded() {
        warn!(
            script = %startup.script,
            executed = report.executed,
            failed = report.failures.len(),
            "startup_script_incomplete"
        );
    }
    engine.activate_scene(&startup.scene)?;

    match startup.player.as_deref() {
        Some(player) => controls::bind_player(&mut engine, player),
        None => info!("no player configured; arrow keys unbound"),
    }
    controls::bind_help(&mut engine);

    Ok(AppWiring {
        config: LoopConfig::default(),
        engine,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
