//! TMX (Tiled XML) parsing into [`RawMap`].

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use base64::Engine as _;
use roxmltree::{Document, Node};

use super::map::{MapError, RawLayer, RawMap, RawObject, RawTileset};

pub(crate) fn parse_tmx(path: &Path, base_dir: &Path, raw: &str) -> Result<RawMap, MapError> {
    let doc = parse_document(path, raw)?;
    let ctx = TmxContext { path };
    let root = doc.root_element();
    if root.tag_name().name() != "map" {
        return Err(ctx.invalid(format!(
            "root element must be <map>, found <{}>",
            root.tag_name().name()
        )));
    }

    let orientation = root.attribute("orientation").unwrap_or("orthogonal");
    if orientation != "orthogonal" {
        return Err(ctx.unsupported(format!("{orientation} orientation")));
    }
    if root.attribute("infinite") == Some("1") {
        return Err(ctx.unsupported("infinite maps".to_string()));
    }

    let mut map = RawMap {
        width: ctx.number(root, "width")?,
        height: ctx.number(root, "height")?,
        tile_width: ctx.number(root, "tilewidth")?,
        tile_height: ctx.number(root, "tileheight")?,
        ..RawMap::default()
    };

    for node in root.children().filter(Node::is_element) {
        match node.tag_name().name() {
            "tileset" => map.tilesets.push(ctx.tileset(node, base_dir)?),
            "layer" => map.layers.push(ctx.layer(node)?),
            "objectgroup" => {
                for object in node
                    .children()
                    .filter(|child| child.has_tag_name("object"))
                {
                    map.objects.push(ctx.object(object)?);
                }
            }
            _ => {}
        }
    }

    Ok(map)
}

fn parse_document<'input>(path: &Path, raw: &'input str) -> Result<Document<'input>, MapError> {
    Document::parse(raw).map_err(|error| MapError::Xml {
        path: path.to_path_buf(),
        message: error.to_string(),
        line: error.pos().row as usize,
        column: error.pos().col as usize,
    })
}

/// Reads an external `.tsx` tileset; its image resolves next to the file.
pub(crate) fn parse_tsx(tsx_path: &Path, first_gid: u32) -> Result<RawTileset, MapError> {
    let raw = fs::read_to_string(tsx_path).map_err(|source| MapError::Read {
        path: tsx_path.to_path_buf(),
        source,
    })?;
    let doc = parse_document(tsx_path, &raw)?;
    let tsx_dir = tsx_path.parent().unwrap_or(Path::new(""));
    TmxContext { path: tsx_path }.tileset_body(doc.root_element(), first_gid, tsx_dir)
}

struct TmxContext<'a> {
    path: &'a Path,
}

impl TmxContext<'_> {
    fn invalid(&self, message: String) -> MapError {
        MapError::Invalid {
            path: self.path.to_path_buf(),
            message,
        }
    }

    fn unsupported(&self, message: String) -> MapError {
        MapError::Unsupported {
            path: self.path.to_path_buf(),
            message,
        }
    }

    fn number<T: FromStr>(&self, node: Node<'_, '_>, name: &str) -> Result<T, MapError> {
        let raw = node.attribute(name).ok_or_else(|| {
            self.invalid(format!(
                "<{}> is missing attribute '{name}'",
                node.tag_name().name()
            ))
        })?;
        raw.trim().parse().map_err(|_| {
            self.invalid(format!(
                "<{}> attribute '{name}' is not a number: '{raw}'",
                node.tag_name().name()
            ))
        })
    }

    fn number_or<T: FromStr>(
        &self,
        node: Node<'_, '_>,
        name: &str,
        fallback: T,
    ) -> Result<T, MapError> {
        match node.attribute(name) {
            Some(_) => self.number(node, name),
            None => Ok(fallback),
        }
    }

    fn tileset(&self, node: Node<'_, '_>, base_dir: &Path) -> Result<RawTileset, MapError> {
        let first_gid = self.number(node, "firstgid")?;
        match node.attribute("source") {
            Some(source) => parse_tsx(&resolve(base_dir, source), first_gid),
            None => self.tileset_body(node, first_gid, base_dir),
        }
    }

    fn tileset_body(
        &self,
        node: Node<'_, '_>,
        first_gid: u32,
        image_dir: &Path,
    ) -> Result<RawTileset, MapError> {
        let image = node
            .children()
            .find(|child| child.has_tag_name("image"))
            .and_then(|image| image.attribute("source"))
            .ok_or_else(|| {
                self.unsupported("tilesets must reference a single <image>".to_string())
            })?;
        Ok(RawTileset {
            first_gid,
            tile_width: self.number(node, "tilewidth")?,
            tile_height: self.number(node, "tileheight")?,
            columns: self.number_or(node, "columns", 0)?,
            spacing: self.number_or(node, "spacing", 0)?,
            margin: self.number_or(node, "margin", 0)?,
            image: resolve(image_dir, image),
        })
    }

    fn layer(&self, node: Node<'_, '_>) -> Result<RawLayer, MapError> {
        let name = node.attribute("name").unwrap_or("").to_string();
        let visible = node.attribute("visible") != Some("0");
        let data = node
            .children()
            .find(|child| child.has_tag_name("data"))
            .ok_or_else(|| self.invalid(format!("layer '{name}' has no <data>")))?;
        if data.children().any(|child| child.has_tag_name("chunk")) {
            return Err(self.unsupported("chunked layer data".to_string()));
        }

        let text = data.text().unwrap_or("");
        let gids = match (data.attribute("encoding"), data.attribute("compression")) {
            (_, Some(compression)) => {
                return Err(self.unsupported(format!("{compression} compressed layer data")))
            }
            (Some("csv"), None) => self.csv_gids(text)?,
            (Some("base64"), None) => self.base64_gids(text)?,
            (None, None) => data
                .children()
                .filter(|child| child.has_tag_name("tile"))
                .map(|tile| self.number_or(tile, "gid", 0u32))
                .collect::<Result<Vec<_>, _>>()?,
            (Some(other), None) => {
                return Err(self.unsupported(format!("'{other}' layer encoding")))
            }
        };

        Ok(RawLayer {
            name,
            visible,
            gids,
        })
    }

    fn csv_gids(&self, text: &str) -> Result<Vec<u32>, MapError> {
        text.split(',')
            .map(str::trim)
            .filter(|cell| !cell.is_empty())
            .map(|cell| {
                cell.parse()
                    .map_err(|_| self.invalid(format!("invalid tile id '{cell}' in CSV data")))
            })
            .collect()
    }

    fn base64_gids(&self, text: &str) -> Result<Vec<u32>, MapError> {
        decode_base64_gids(text).map_err(|message| self.invalid(message))
    }

    fn object(&self, node: Node<'_, '_>) -> Result<RawObject, MapError> {
        let kind = node
            .attribute("type")
            .or_else(|| node.attribute("class"))
            .unwrap_or("")
            .to_string();
        let mut properties = HashMap::new();
        for property in node
            .children()
            .filter(|child| child.has_tag_name("properties"))
            .flat_map(|group| group.children())
            .filter(|child| child.has_tag_name("property"))
        {
            let Some(name) = property.attribute("name") else {
                continue;
            };
            let value = property
                .attribute("value")
                .map(str::to_string)
                .or_else(|| property.text().map(str::to_string))
                .unwrap_or_default();
            properties.insert(name.to_string(), value);
        }

        Ok(RawObject {
            kind,
            x: self.number_or(node, "x", 0.0)?,
            y: self.number_or(node, "y", 0.0)?,
            width: self.number_or(node, "width", 0.0)?,
            height: self.number_or(node, "height", 0.0)?,
            visible: node.attribute("visible") != Some("0"),
            properties,
        })
    }
}

/// Uncompressed base64 layer data: little-endian `u32` gids.
pub(crate) fn decode_base64_gids(text: &str) -> Result<Vec<u32>, String> {
    let compact: String = text.chars().filter(|ch| !ch.is_whitespace()).collect();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(compact.as_bytes())
        .map_err(|error| format!("invalid base64 layer data: {error}"))?;
    if bytes.len() % 4 != 0 {
        return Err("base64 layer data is not a whole number of tiles".to_string());
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect())
}

pub(crate) fn resolve(dir: &Path, source: &str) -> PathBuf {
    let source = Path::new(source);
    if source.is_absolute() {
        source.to_path_buf()
    } else {
        dir.join(source)
    }
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;

    use super::*;

    const CSV_MAP: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<map version="1.10" orientation="orthogonal" renderorder="right-down" width="2" height="2" tilewidth="16" tileheight="16" infinite="0">
 <tileset firstgid="1" name="ground" tilewidth="16" tileheight="16" tilecount="4" columns="2">
  <image source="tiles/ground.png" width="32" height="32"/>
 </tileset>
 <layer id="1" name="floor" width="2" height="2">
  <data encoding="csv">
1,2,
3,2147483652
</data>
 </layer>
 <layer id="2" name="roof" width="2" height="2" visible="0">
  <data><tile gid="1"/><tile/><tile/><tile gid="4"/></data>
 </layer>
 <objectgroup id="3" name="objects">
  <object id="1" type="Collision" x="0" y="0" width="32" height="16"/>
 </objectgroup>
 <objectgroup id="4" name="actors">
  <object id="2" class="Spawn" x="8" y="24" visible="0">
   <properties>
    <property name="gameID" value="hero"/>
    <property name="imgfile" value="hero.png"/>
    <property name="collide" type="bool" value="true"/>
   </properties>
  </object>
 </objectgroup>
</map>"#;

    #[test]
    fn parses_csv_layers_tilesets_and_all_object_groups() {
        let map = parse_tmx(Path::new("maps/town.tmx"), Path::new("maps"), CSV_MAP).expect("parse");

        assert_eq!((map.width, map.height, map.tile_width, map.tile_height), (2, 2, 16, 16));
        assert_eq!(map.tilesets[0].image, PathBuf::from("maps/tiles/ground.png"));
        assert_eq!(map.tilesets[0].columns, 2);
        assert_eq!(map.layers[0].gids, vec![1, 2, 3, 2_147_483_652]);
        assert!(!map.layers[1].visible);
        assert_eq!(map.layers[1].gids, vec![1, 0, 0, 4]);

        assert_eq!(map.objects.len(), 2);
        assert_eq!(map.objects[0].kind, "Collision");
        assert_eq!(map.objects[1].kind, "Spawn");
        assert!(!map.objects[1].visible);
        assert_eq!(map.objects[1].properties.get("gameID").map(String::as_str), Some("hero"));
    }

    #[test]
    fn decodes_uncompressed_base64_data() {
        let bytes: Vec<u8> = [1u32, 0, 7, 2].iter().flat_map(|gid| gid.to_le_bytes()).collect();
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let raw = CSV_MAP.replace(
            "<data encoding=\"csv\">\n1,2,\n3,2147483652\n</data>",
            &format!("<data encoding=\"base64\">\n   {encoded}\n  </data>"),
        );
        let map = parse_tmx(Path::new("town.tmx"), Path::new(""), &raw).expect("parse");
        assert_eq!(map.layers[0].gids, vec![1, 0, 7, 2]);
    }

    #[test]
    fn compressed_data_is_unsupported() {
        let raw = CSV_MAP.replace(
            "<data encoding=\"csv\">",
            "<data encoding=\"base64\" compression=\"zlib\">",
        );
        assert!(matches!(
            parse_tmx(Path::new("town.tmx"), Path::new(""), &raw),
            Err(MapError::Unsupported { .. })
        ));
    }

    #[test]
    fn isometric_maps_are_unsupported() {
        let raw = CSV_MAP.replace("orthogonal", "isometric");
        assert!(matches!(
            parse_tmx(Path::new("town.tmx"), Path::new(""), &raw),
            Err(MapError::Unsupported { .. })
        ));
    }

    #[test]
    fn malformed_xml_reports_position() {
        let error = parse_tmx(Path::new("town.tmx"), Path::new(""), "<map><layer></map>")
            .expect_err("must fail");
        assert!(matches!(error, MapError::Xml { line: 1, .. }));
    }

    #[test]
    fn external_tilesets_resolve_images_next_to_the_tsx() {
        let temp = tempfile::tempdir().expect("tempdir");
        let tiles_dir = temp.path().join("tilesets");
        fs::create_dir_all(&tiles_dir).expect("mkdir");
        fs::write(
            tiles_dir.join("ground.tsx"),
            r#"<?xml version="1.0"?>
<tileset name="ground" tilewidth="8" tileheight="8" spacing="1" margin="1">
 <image source="ground.png" width="19" height="19"/>
</tileset>"#,
        )
        .expect("write tsx");
        let raw = CSV_MAP.replace(
            r#"<tileset firstgid="1" name="ground" tilewidth="16" tileheight="16" tilecount="4" columns="2">
  <image source="tiles/ground.png" width="32" height="32"/>
 </tileset>"#,
            r#"<tileset firstgid="5" source="tilesets/ground.tsx"/>"#,
        );

        let map = parse_tmx(&temp.path().join("town.tmx"), temp.path(), &raw).expect("parse");
        let tileset = &map.tilesets[0];
        assert_eq!(tileset.first_gid, 5);
        assert_eq!((tileset.tile_width, tileset.spacing, tileset.margin), (8, 1, 1));
        assert_eq!(tileset.image, tiles_dir.join("ground.png"));
    }
}
