use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use roxmltree::{Document, Node};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed configuration XML at {location}: {message}")]
    Malformed {
        message: String,
        location: SourceLocation,
    },
    #[error("configuration root must be <configuration>, found <{found}> at {location}")]
    InvalidRoot {
        found: String,
        location: SourceLocation,
    },
    #[error("missing configuration element <{path}> under element at {location}")]
    MissingElement {
        path: String,
        location: SourceLocation,
    },
    #[error("missing configuration attribute {path} at {location}")]
    MissingAttribute {
        path: String,
        location: SourceLocation,
    },
    #[error("invalid value '{value}' for {path} at {location}")]
    InvalidValue {
        path: String,
        value: String,
        location: SourceLocation,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub system: SystemConfig,
    pub defaults: DefaultConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemConfig {
    pub window: WindowConfig,
    pub scripting: ScriptingConfig,
    pub directories: DirectoryConfig,
    pub startup: StartupConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptingConfig {
    pub dir: PathBuf,
    pub extension: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryConfig {
    pub characters: PathBuf,
    pub maps: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupConfig {
    pub script: String,
    pub scene: String,
    /// Actor driven by the host's arrow-key handlers, if any.
    pub player: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DefaultConfig {
    pub scene_base_speed: f32,
    pub actor_speed: f32,
    pub message_box: MessageBoxConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MessageBoxConfig {
    pub color: String,
    pub background: String,
    /// Centre of the box on the scene surface.
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Configuration {
    /// Loads and parses `path`. Relative script, character and map
    /// directories are resolved against the file's own directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_xml_str(&raw)?;
        if let Some(base) = path.parent() {
            config.resolve_directories(base);
        }
        info!(
            path = %path.display(),
            title = %config.system.window.title,
            width = config.system.window.width,
            height = config.system.window.height,
            "configuration_loaded"
        );
        Ok(config)
    }

    pub fn from_xml_str(raw: &str) -> Result<Self, ConfigError> {
        let doc = Document::parse(raw).map_err(|error| ConfigError::Malformed {
            message: error.to_string(),
            location: SourceLocation {
                line: error.pos().row as usize,
                column: error.pos().col as usize,
            },
        })?;
        let parser = ConfigParser { doc: &doc };
        let root = doc.root_element();
        if root.tag_name().name() != "configuration" {
            return Err(ConfigError::InvalidRoot {
                found: root.tag_name().name().to_string(),
                location: parser.location(root),
            });
        }

        let system = parser.child(root, "system")?;
        let window = parser.child(system, "window")?;
        let scripting = parser.child(system, "scripting")?;
        let directory = parser.child(system, "directory")?;
        let startup = parser.child(system, "startup")?;

        let defaults = parser.child(root, "default")?;
        let scene = parser.child(defaults, "scene")?;
        let actor = parser.child(defaults, "actor")?;
        let message_box = parser.child(defaults, "messagebox")?;

        Ok(Self {
            system: SystemConfig {
                window: WindowConfig {
                    width: parser.parsed(window, "width")?,
                    height: parser.parsed(window, "height")?,
                    title: parser.attr(window, "title")?.to_string(),
                },
                scripting: ScriptingConfig {
                    dir: PathBuf::from(parser.attr(scripting, "dir")?),
                    extension: parser.attr(scripting, "extension")?.to_string(),
                },
                directories: DirectoryConfig {
                    characters: PathBuf::from(parser.attr(directory, "characters")?),
                    maps: PathBuf::from(parser.attr(directory, "maps")?),
                },
                startup: StartupConfig {
                    script: parser.attr(startup, "script")?.to_string(),
                    scene: parser.attr(startup, "scene")?.to_string(),
                    player: startup.attribute("player").map(str::to_string),
                },
            },
            defaults: DefaultConfig {
                scene_base_speed: parser.parsed(scene, "basespeed")?,
                actor_speed: parser.parsed(actor, "speed")?,
                message_box: MessageBoxConfig {
                    color: parser.attr(message_box, "color")?.to_string(),
                    background: parser.attr(message_box, "bgcolor")?.to_string(),
                    x: parser.parsed(message_box, "x")?,
                    y: parser.parsed(message_box, "y")?,
                    width: parser.parsed(message_box, "width")?,
                    height: parser.parsed(message_box, "height")?,
                },
            },
        })
    }

    pub fn resolve_directories(&mut self, base: &Path) {
        for dir in [
            &mut self.system.scripting.dir,
            &mut self.system.directories.characters,
            &mut self.system.directories.maps,
        ] {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }

    /// `<scripting dir>/<name>.<extension>`
    pub fn script_path(&self, name: &str) -> PathBuf {
        self.system
            .scripting
            .dir
            .join(format!("{name}.{}", self.system.scripting.extension))
    }
}

struct ConfigParser<'a, 'input> {
    doc: &'a Document<'input>,
}

impl<'a, 'input> ConfigParser<'a, 'input> {
    fn location(&self, node: Node<'_, '_>) -> SourceLocation {
        let pos = self.doc.text_pos_at(node.range().start);
        SourceLocation {
            line: pos.row as usize,
            column: pos.col as usize,
        }
    }

    fn child(
        &self,
        parent: Node<'a, 'input>,
        name: &str,
    ) -> Result<Node<'a, 'input>, ConfigError> {
        parent
            .children()
            .find(|node| node.is_element() && node.tag_name().name() == name)
            .ok_or_else(|| ConfigError::MissingElement {
                path: format!("{}/{name}", element_path(parent)),
                location: self.location(parent),
            })
    }

    fn attr(&self, node: Node<'a, 'input>, name: &str) -> Result<&'a str, ConfigError> {
        node.attribute(name)
            .ok_or_else(|| ConfigError::MissingAttribute {
                path: format!("{}@{name}", element_path(node)),
                location: self.location(node),
            })
    }

    fn parsed<T: FromStr>(&self, node: Node<'a, 'input>, name: &str) -> Result<T, ConfigError> {
        let raw = self.attr(node, name)?;
        raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
            path: format!("{}@{name}", element_path(node)),
            value: raw.to_string(),
            location: self.location(node),
        })
    }
}

fn element_path(node: Node<'_, '_>) -> String {
    let mut names: Vec<&str> = node
        .ancestors()
        .filter(|ancestor| ancestor.is_element())
        .map(|ancestor| ancestor.tag_name().name())
        .collect();
    names.reverse();
    names.join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<configuration>
    <!-- basic system requirements -->
    <system>
        <window width="640" height="480" title="RPG Demo"/>
        <scripting dir="scripts" extension="script"/>
        <directory characters="characters" maps="maps"/>
        <startup script="main" scene="town" player="hero"/>
    </system>
    <default>
        <scene basespeed="200"/>
        <actor speed="1.5"/>
        <messagebox color="white" bgcolor="navy" x="320" y="60" width="600" height="100"/>
    </default>
</configuration>"#;

    #[test]
    fn parses_every_section() {
        let config = Configuration::from_xml_str(SAMPLE).expect("parse");
        assert_eq!(config.system.window.width, 640);
        assert_eq!(config.system.window.title, "RPG Demo");
        assert_eq!(config.system.scripting.extension, "script");
        assert_eq!(config.system.directories.maps, PathBuf::from("maps"));
        assert_eq!(config.system.startup.player.as_deref(), Some("hero"));
        assert_eq!(config.defaults.scene_base_speed, 200.0);
        assert_eq!(config.defaults.actor_speed, 1.5);
        assert_eq!(config.defaults.message_box.background, "navy");
        assert_eq!(config.defaults.message_box.height, 100.0);
    }

    #[test]
    fn missing_attribute_fails_fast_with_path() {
        let raw = SAMPLE.replace(r#" basespeed="200""#, "");
        let error = Configuration::from_xml_str(&raw).expect_err("must fail");
        match error {
            ConfigError::MissingAttribute { path, location } => {
                assert_eq!(path, "configuration/default/scene@basespeed");
                assert_eq!(location.line, 11);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_element_is_reported() {
        let raw = SAMPLE.replace(r#"<directory characters="characters" maps="maps"/>"#, "");
        let error = Configuration::from_xml_str(&raw).expect_err("must fail");
        assert!(matches!(
            error,
            ConfigError::MissingElement { ref path, .. } if path == "configuration/system/directory"
        ));
    }

    #[test]
    fn invalid_number_is_reported() {
        let raw = SAMPLE.replace(r#"width="640""#, r#"width="wide""#);
        let error = Configuration::from_xml_str(&raw).expect_err("must fail");
        assert!(matches!(error, ConfigError::InvalidValue { ref value, .. } if value == "wide"));
    }

    #[test]
    fn malformed_xml_carries_location() {
        let error = Configuration::from_xml_str("<configuration><system>").expect_err("must fail");
        assert!(matches!(error, ConfigError::Malformed { .. }));
    }

    #[test]
    fn load_resolves_directories_against_config_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.xml");
        fs::write(&path, SAMPLE).expect("write");

        let config = Configuration::load(&path).expect("load");
        assert_eq!(config.system.directories.characters, temp.path().join("characters"));
        assert_eq!(config.script_path("intro"), temp.path().join("scripts").join("intro.script"));
    }

    #[test]
    fn unreadable_file_is_a_read_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let error = Configuration::load(&temp.path().join("absent.xml")).expect_err("must fail");
        assert!(matches!(error, ConfigError::Read { .. }));
    }
}
