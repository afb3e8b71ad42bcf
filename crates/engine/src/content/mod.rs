mod assets;
mod config;
mod map;
mod paths;
mod tmj;
mod tmx;

pub use assets::{AssetCache, AssetError, AssetLoader, ImageAssetLoader, MemoryAssetLoader};
pub use config::{
    ConfigError, Configuration, DefaultConfig, DirectoryConfig, MessageBoxConfig,
    ScriptingConfig, SourceLocation, StartupConfig, SystemConfig, WindowConfig,
};
pub use map::{
    MapData, MapError, MapLoader, MemoryMapLoader, SpawnPoint, TiledMapLoader, COLLISION_INSET,
};
pub use paths::{resolve_app_paths, AppPaths, StartupError, ROOT_ENV_VAR};
