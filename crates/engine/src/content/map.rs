//! Tiled map loading: parse, composite visible tile layers into one image,
//! and extract collision and spawn objects in y-up map coordinates.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use thiserror::Error;
use tracing::{info, warn};

use super::assets::{AssetCache, AssetError};
use super::{tmj, tmx};
use crate::app::{Bitmap, Rect, Vec2, MAX_SURFACE_SIDE};

/// Collision objects are shrunk by this margin on every side so actors can
/// brush past obstacle edges.
pub const COLLISION_INSET: f32 = 2.0;

const FLIP_FLAGS: u32 = 0xF000_0000;

#[derive(Debug, Error)]
pub enum MapError {
    #[error("failed to read map file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed map XML in {path} at line {line}, column {column}: {message}")]
    Xml {
        path: PathBuf,
        message: String,
        line: usize,
        column: usize,
    },
    #[error("malformed map JSON in {path} at {location}: {source}")]
    Json {
        path: PathBuf,
        location: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid map data in {path}: {message}")]
    Invalid { path: PathBuf, message: String },
    #[error("unsupported map {path}: {message}")]
    Unsupported { path: PathBuf, message: String },
    #[error("failed to load tileset image for map: {0}")]
    Asset(#[from] AssetError),
}

/// An actor placement read from a `Spawn` object.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnPoint {
    pub actor_id: String,
    pub image_file: String,
    pub position: Vec2,
    pub visible: bool,
    pub collide: bool,
}

/// A loaded map: the composited image plus static geometry.
#[derive(Debug, Clone)]
pub struct MapData {
    pub image: Rc<Bitmap>,
    pub width: u32,
    pub height: u32,
    pub collision: Vec<Rect>,
    pub spawns: Vec<SpawnPoint>,
}

impl MapData {
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width as f32, self.height as f32)
    }
}

pub trait MapLoader {
    fn load_map(&mut self, path: &Path) -> Result<MapData, MapError>;
}

/// Parser-independent form of a Tiled map.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawMap {
    pub width: u32,
    pub height: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    pub tilesets: Vec<RawTileset>,
    pub layers: Vec<RawLayer>,
    pub objects: Vec<RawObject>,
}

#[derive(Debug, Clone)]
pub(crate) struct RawTileset {
    pub first_gid: u32,
    pub tile_width: u32,
    pub tile_height: u32,
    /// Zero when the file omits it; derived from the image width.
    pub columns: u32,
    pub spacing: u32,
    pub margin: u32,
    pub image: PathBuf,
}

#[derive(Debug, Clone)]
pub(crate) struct RawLayer {
    pub name: String,
    pub visible: bool,
    pub gids: Vec<u32>,
}

#[derive(Debug, Clone, Default)]
pub(crate) struct RawObject {
    pub kind: String,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub visible: bool,
    pub properties: HashMap<String, String>,
}

impl RawObject {
    fn property(&self, name: &str) -> &str {
        self.properties.get(name).map(String::as_str).unwrap_or("")
    }

    fn flag(&self, name: &str) -> bool {
        self.property(name).trim().parse().unwrap_or(false)
    }
}

/// Loads `.tmx` (XML) and `.tmj` / `.json` maps from disk.
pub struct TiledMapLoader {
    images: AssetCache,
}

impl TiledMapLoader {
    pub fn new(images: AssetCache) -> Self {
        Self { images }
    }
}

impl MapLoader for TiledMapLoader {
    fn load_map(&mut self, path: &Path) -> Result<MapData, MapError> {
        let raw = fs::read_to_string(path).map_err(|source| MapError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base_dir = path.parent().unwrap_or(Path::new(""));
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        let parsed = match extension.as_deref() {
            Some("tmx") => tmx::parse_tmx(path, base_dir, &raw)?,
            Some("tmj") | Some("json") => tmj::parse_tmj(path, base_dir, &raw)?,
            _ => {
                return Err(MapError::Unsupported {
                    path: path.to_path_buf(),
                    message: "expected a .tmx, .tmj or .json file".to_string(),
                })
            }
        };

        let map = build_map(path, &parsed, |image| self.images.bitmap(image))?;
        info!(
            path = %path.display(),
            width = map.width,
            height = map.height,
            collision_count = map.collision.len(),
            spawn_count = map.spawns.len(),
            "map_loaded"
        );
        Ok(map)
    }
}

/// Serves pre-built maps by path; for headless hosts and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryMapLoader {
    maps: HashMap<PathBuf, MapData>,
}

impl MemoryMapLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_map(mut self, path: impl Into<PathBuf>, map: MapData) -> Self {
        self.maps.insert(path.into(), map);
        self
    }
}

impl MapLoader for MemoryMapLoader {
    fn load_map(&mut self, path: &Path) -> Result<MapData, MapError> {
        self.maps.get(path).cloned().ok_or_else(|| MapError::Read {
            path: path.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "map not registered"),
        })
    }
}

pub(crate) fn build_map(
    path: &Path,
    raw: &RawMap,
    mut load_image: impl FnMut(&Path) -> Result<Rc<Bitmap>, AssetError>,
) -> Result<MapData, MapError> {
    let invalid = |message: String| MapError::Invalid {
        path: path.to_path_buf(),
        message,
    };
    let pixels = |tiles: u32, tile_size: u32| {
        tiles
            .checked_mul(tile_size)
            .filter(|&side| side <= MAX_SURFACE_SIDE)
    };
    let (Some(width), Some(height)) = (
        pixels(raw.width, raw.tile_width),
        pixels(raw.height, raw.tile_height),
    ) else {
        return Err(invalid(format!(
            "{}x{} tiles of {}x{} px exceed {MAX_SURFACE_SIDE} px per side",
            raw.width, raw.height, raw.tile_width, raw.tile_height
        )));
    };
    let expected = (raw.width as usize)
        .checked_mul(raw.height as usize)
        .ok_or_else(|| invalid(format!("{}x{} tiles is too many", raw.width, raw.height)))?;
    let mut canvas = Bitmap::filled(width, height, [0, 0, 0, 0]);

    let mut tileset_images = Vec::with_capacity(raw.tilesets.len());
    for tileset in &raw.tilesets {
        tileset_images.push(load_image(&tileset.image)?);
    }

    for layer in raw.layers.iter().filter(|layer| layer.visible) {
        if layer.gids.len() != expected {
            return Err(invalid(format!(
                "layer '{}' has {} tiles, expected {expected}",
                layer.name,
                layer.gids.len()
            )));
        }
        for (index, raw_gid) in layer.gids.iter().enumerate() {
            let gid = raw_gid & !FLIP_FLAGS;
            if gid == 0 {
                continue;
            }
            let Some(slot) = tileset_for(&raw.tilesets, gid) else {
                warn!(gid, layer = %layer.name, "map_tile_without_tileset");
                continue;
            };
            let tileset = &raw.tilesets[slot];
            let image = &tileset_images[slot];
            let columns = match tileset.columns {
                0 => ((image.width().saturating_sub(tileset.margin)) + tileset.spacing)
                    / (tileset.tile_width + tileset.spacing).max(1),
                columns => columns,
            }
            .max(1);
            let local = gid - tileset.first_gid;
            let stride_x = tileset.tile_width.saturating_add(tileset.spacing);
            let stride_y = tileset.tile_height.saturating_add(tileset.spacing);
            let src_left = (local % columns)
                .saturating_mul(stride_x)
                .saturating_add(tileset.margin);
            let src_top = (local / columns)
                .saturating_mul(stride_y)
                .saturating_add(tileset.margin);

            let cell_x = index as u32 % raw.width;
            let cell_y = index as u32 / raw.width;
            // Oversized tiles anchor at the bottom-left of their cell.
            let dst_left = (cell_x * raw.tile_width) as i32;
            let dst_top = ((cell_y + 1) * raw.tile_height) as i32 - tileset.tile_height as i32;
            image.copy_tile_into(
                &mut canvas,
                src_left,
                src_top,
                tileset.tile_width,
                tileset.tile_height,
                dst_left,
                dst_top,
            );
        }
    }

    let map_height = height as f32;
    let mut collision = Vec::new();
    let mut spawns = Vec::new();
    for object in &raw.objects {
        match object.kind.as_str() {
            "Collision" => {
                let bottom = map_height - object.y - object.height;
                collision.push(Rect::new(
                    object.x + COLLISION_INSET,
                    bottom + COLLISION_INSET,
                    object.x + object.width - COLLISION_INSET,
                    bottom + object.height - COLLISION_INSET,
                ));
            }
            "Spawn" => spawns.push(SpawnPoint {
                actor_id: object.property("gameID").to_string(),
                image_file: object.property("imgfile").to_string(),
                position: Vec2::new(object.x, map_height - object.y),
                visible: object.visible,
                collide: object.flag("collide"),
            }),
            _ => {}
        }
    }

    Ok(MapData {
        image: Rc::new(canvas),
        width,
        height,
        collision,
        spawns,
    })
}

/// Index of the tileset owning `gid`: the one with the greatest first gid
/// not above it.
fn tileset_for(tilesets: &[RawTileset], gid: u32) -> Option<usize> {
    tilesets
        .iter()
        .enumerate()
        .filter(|(_, tileset)| tileset.first_gid <= gid)
        .max_by_key(|(_, tileset)| tileset.first_gid)
        .map(|(index, _)| index)
}
