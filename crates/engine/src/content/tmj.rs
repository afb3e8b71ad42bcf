//! Tiled JSON (`.tmj` / `.json`) parsing into [`RawMap`].

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Deserialize;

use super::map::{MapError, RawLayer, RawMap, RawObject, RawTileset};
use super::tmx::{decode_base64_gids, parse_tsx, resolve};

#[derive(Debug, Deserialize)]
struct TmjMap {
    width: u32,
    height: u32,
    tilewidth: u32,
    tileheight: u32,
    #[serde(default = "orthogonal")]
    orientation: String,
    #[serde(default)]
    infinite: bool,
    #[serde(default)]
    tilesets: Vec<TmjTileset>,
    #[serde(default)]
    layers: Vec<TmjLayer>,
}

#[derive(Debug, Deserialize)]
struct TmjTileset {
    #[serde(default)]
    firstgid: u32,
    source: Option<String>,
    image: Option<String>,
    tilewidth: Option<u32>,
    tileheight: Option<u32>,
    #[serde(default)]
    columns: u32,
    #[serde(default)]
    spacing: u32,
    #[serde(default)]
    margin: u32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum TmjLayer {
    Tilelayer {
        #[serde(default)]
        name: String,
        #[serde(default = "visible")]
        visible: bool,
        data: Option<TmjData>,
        encoding: Option<String>,
        compression: Option<String>,
    },
    Objectgroup {
        #[serde(default)]
        objects: Vec<TmjObject>,
    },
    Group {
        #[serde(default = "visible")]
        visible: bool,
        #[serde(default)]
        layers: Vec<TmjLayer>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TmjData {
    Gids(Vec<u32>),
    Encoded(String),
}

#[derive(Debug, Deserialize)]
struct TmjObject {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    class: String,
    #[serde(default)]
    x: f32,
    #[serde(default)]
    y: f32,
    #[serde(default)]
    width: f32,
    #[serde(default)]
    height: f32,
    #[serde(default = "visible")]
    visible: bool,
    #[serde(default)]
    properties: Vec<TmjProperty>,
}

#[derive(Debug, Deserialize)]
struct TmjProperty {
    name: String,
    #[serde(default)]
    value: serde_json::Value,
}

fn orthogonal() -> String {
    "orthogonal".to_string()
}

fn visible() -> bool {
    true
}

pub(crate) fn parse_tmj(path: &Path, base_dir: &Path, raw: &str) -> Result<RawMap, MapError> {
    let parsed: TmjMap = deserialize(path, raw)?;
    if parsed.orientation != "orthogonal" {
        return Err(unsupported(path, format!("{} orientation", parsed.orientation)));
    }
    if parsed.infinite {
        return Err(unsupported(path, "infinite maps".to_string()));
    }

    let mut map = RawMap {
        width: parsed.width,
        height: parsed.height,
        tile_width: parsed.tilewidth,
        tile_height: parsed.tileheight,
        ..RawMap::default()
    };
    for tileset in &parsed.tilesets {
        map.tilesets.push(tileset_from(path, base_dir, tileset)?);
    }
    collect_layers(path, &parsed.layers, true, &mut map)?;
    Ok(map)
}

fn deserialize<T: DeserializeOwned>(path: &Path, raw: &str) -> Result<T, MapError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        let location = error.path().to_string();
        MapError::Json {
            path: path.to_path_buf(),
            location,
            source: error.into_inner(),
        }
    })
}

fn unsupported(path: &Path, message: String) -> MapError {
    MapError::Unsupported {
        path: path.to_path_buf(),
        message,
    }
}

fn invalid(path: &Path, message: String) -> MapError {
    MapError::Invalid {
        path: path.to_path_buf(),
        message,
    }
}

fn tileset_from(
    path: &Path,
    base_dir: &Path,
    tileset: &TmjTileset,
) -> Result<RawTileset, MapError> {
    let Some(source) = &tileset.source else {
        return embedded_tileset(path, base_dir, tileset, tileset.firstgid);
    };

    let external_path = resolve(base_dir, source);
    if source.ends_with(".tsx") {
        return parse_tsx(&external_path, tileset.firstgid);
    }
    let raw = fs::read_to_string(&external_path).map_err(|error| MapError::Read {
        path: external_path.clone(),
        source: error,
    })?;
    let external: TmjTileset = deserialize(&external_path, &raw)?;
    let external_dir = external_path.parent().unwrap_or(base_dir);
    embedded_tileset(&external_path, external_dir, &external, tileset.firstgid)
}

fn embedded_tileset(
    path: &Path,
    image_dir: &Path,
    tileset: &TmjTileset,
    first_gid: u32,
) -> Result<RawTileset, MapError> {
    let image = tileset
        .image
        .as_deref()
        .ok_or_else(|| unsupported(path, "tilesets must reference a single image".to_string()))?;
    let tile_width = tileset
        .tilewidth
        .ok_or_else(|| invalid(path, "tileset is missing tilewidth".to_string()))?;
    let tile_height = tileset
        .tileheight
        .ok_or_else(|| invalid(path, "tileset is missing tileheight".to_string()))?;
    Ok(RawTileset {
        first_gid,
        tile_width,
        tile_height,
        columns: tileset.columns,
        spacing: tileset.spacing,
        margin: tileset.margin,
        image: resolve(image_dir, image),
    })
}

/// Flattens group layers; a hidden group hides everything inside it.
fn collect_layers(
    path: &Path,
    layers: &[TmjLayer],
    parent_visible: bool,
    map: &mut RawMap,
) -> Result<(), MapError> {
    for layer in layers {
        match layer {
            TmjLayer::Tilelayer {
                name,
                visible,
                data,
                encoding,
                compression,
            } => {
                if compression.as_deref().is_some_and(|value| !value.is_empty()) {
                    return Err(unsupported(path, "compressed layer data".to_string()));
                }
                let gids = match (data, encoding.as_deref()) {
                    (Some(TmjData::Gids(gids)), _) => gids.clone(),
                    (Some(TmjData::Encoded(text)), Some("base64")) => {
                        decode_base64_gids(text).map_err(|message| invalid(path, message))?
                    }
                    (Some(TmjData::Encoded(_)), _) => {
                        return Err(invalid(
                            path,
                            format!("layer '{name}' has string data without base64 encoding"),
                        ))
                    }
                    (None, _) => {
                        return Err(unsupported(
                            path,
                            format!(
                                "layer '{name}' has no data (chunked layers are not supported)"
                            ),
                        ))
                    }
                };
                map.layers.push(RawLayer {
                    name: name.clone(),
                    visible: parent_visible && *visible,
                    gids,
                });
            }
            TmjLayer::Objectgroup { objects } => {
                map.objects.extend(objects.iter().map(raw_object));
            }
            TmjLayer::Group { visible, layers } => {
                collect_layers(path, layers, parent_visible && *visible, map)?;
            }
            TmjLayer::Other => {}
        }
    }
    Ok(())
}

fn raw_object(object: &TmjObject) -> RawObject {
    let kind = if object.kind.is_empty() {
        object.class.clone()
    } else {
        object.kind.clone()
    };
    let properties: HashMap<String, String> = object
        .properties
        .iter()
        .map(|property| {
            let value = match &property.value {
                serde_json::Value::String(text) => text.clone(),
                other => other.to_string(),
            };
            (property.name.clone(), value)
        })
        .collect();
    RawObject {
        kind,
        x: object.x,
        y: object.y,
        width: object.width,
        height: object.height,
        visible: object.visible,
        properties,
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const MAP: &str = r#"{
  "width": 2, "height": 1, "tilewidth": 8, "tileheight": 8,
  "orientation": "orthogonal", "infinite": false,
  "tilesets": [
    { "firstgid": 1, "image": "tiles.png", "tilewidth": 8, "tileheight": 8, "columns": 2 }
  ],
  "layers": [
    { "type": "tilelayer", "name": "floor", "data": [1, 2], "visible": true },
    { "type": "group", "visible": false, "layers": [
      { "type": "tilelayer", "name": "roof", "data": "AQAAAAIAAAA=", "encoding": "base64" }
    ] },
    { "type": "imagelayer", "image": "sky.png" },
    { "type": "objectgroup", "objects": [
      { "type": "Collision", "x": 0, "y": 0, "width": 16, "height": 8 },
      { "class": "Spawn", "x": 4, "y": 8, "visible": true, "properties": [
        { "name": "gameID", "type": "string", "value": "hero" },
        { "name": "collide", "type": "bool", "value": false }
      ] }
    ] }
  ]
}"#;

    #[test]
    fn parses_layers_groups_and_objects() {
        let map = parse_tmj(Path::new("maps/town.tmj"), Path::new("maps"), MAP).expect("parse");

        assert_eq!((map.width, map.height), (2, 1));
        assert_eq!(map.tilesets[0].image, PathBuf::from("maps/tiles.png"));
        assert_eq!(map.layers.len(), 2);
        assert_eq!(map.layers[0].gids, vec![1, 2]);
        assert!(!map.layers[1].visible);
        assert_eq!(map.layers[1].gids, vec![1, 2]);

        assert_eq!(map.objects[0].kind, "Collision");
        assert_eq!(map.objects[1].kind, "Spawn");
        assert_eq!(map.objects[1].properties["gameID"], "hero");
        assert_eq!(map.objects[1].properties["collide"], "false");
    }

    #[test]
    fn type_errors_report_json_path() {
        let raw = MAP.replace(r#""width": 2"#, r#""width": "two""#);
        let error = parse_tmj(Path::new("town.tmj"), Path::new(""), &raw).expect_err("must fail");
        match error {
            MapError::Json { location, .. } => assert_eq!(location, "width"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn infinite_maps_are_unsupported() {
        let raw = MAP.replace(r#""infinite": false"#, r#""infinite": true"#);
        assert!(matches!(
            parse_tmj(Path::new("town.tmj"), Path::new(""), &raw),
            Err(MapError::Unsupported { .. })
        ));
    }

    #[test]
    fn external_json_tilesets_keep_the_map_first_gid() {
        let temp = tempfile::tempdir().expect("tempdir");
        fs::write(
            temp.path().join("ground.tsj"),
            r#"{ "image": "ground.png", "tilewidth": 8, "tileheight": 8, "columns": 4 }"#,
        )
        .expect("write tileset");
        let raw = MAP.replace(
            r#"{ "firstgid": 1, "image": "tiles.png", "tilewidth": 8, "tileheight": 8, "columns": 2 }"#,
            r#"{ "firstgid": 3, "source": "ground.tsj" }"#,
        );

        let map = parse_tmj(&temp.path().join("town.tmj"), temp.path(), &raw).expect("parse");
        assert_eq!(map.tilesets[0].first_gid, 3);
        assert_eq!(map.tilesets[0].columns, 4);
        assert_eq!(map.tilesets[0].image, temp.path().join("ground.png"));
    }
}
