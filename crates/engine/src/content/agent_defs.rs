use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use roxmltree::{Document, Node};
use tracing::info;

use crate::sim::entity::{BehaviorCategory, EntitySpawn};
use crate::sim::world::ObjectId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentErrorCode {
    ReadFile,
    XmlMalformed,
    InvalidRoot,
    UnknownDefType,
    UnknownField,
    DuplicateField,
    MissingField,
    InvalidValue,
    DuplicateDef,
}

#[derive(Debug, Clone)]
pub struct ContentCompileError {
    pub code: ContentErrorCode,
    pub message: String,
    pub file_path: PathBuf,
    pub location: Option<SourceLocation>,
}

impl fmt::Display for ContentCompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.file_path.display())?;
        if let Some(location) = self.location {
            write!(f, ":{}:{}", location.line, location.column)?;
        }
        write!(f, ": {:?}: {}", self.code, self.message)
    }
}

impl std::error::Error for ContentCompileError {}

/// Archetype an entity can be spawned from.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentDef {
    pub def_name: String,
    pub label: String,
    pub behavior: BehaviorCategory,
    pub health: f32,
    pub damage: f32,
    pub speed: f32,
    pub detection_radius: f32,
    pub wander_radius: Option<f32>,
    pub max_force: Option<f32>,
    pub script: Option<String>,
}

impl AgentDef {
    pub fn to_spawn(&self, object_id: ObjectId) -> EntitySpawn {
        let mut spawn = EntitySpawn::new(
            self.label.clone(),
            self.behavior,
            object_id,
            self.health,
            self.damage,
            self.speed,
            self.detection_radius,
        );
        if let Some(script) = &self.script {
            spawn = spawn.with_script(script.clone());
        }
        if let Some(wander_radius) = self.wander_radius {
            spawn = spawn.with_wander_radius(wander_radius);
        }
        if let Some(max_force) = self.max_force {
            spawn = spawn.with_max_force(max_force);
        }
        spawn
    }
}

#[derive(Debug, Default, Clone)]
pub struct AgentDefDatabase {
    defs: BTreeMap<String, AgentDef>,
}

impl AgentDefDatabase {
    pub fn get(&self, def_name: &str) -> Option<&AgentDef> {
        self.defs.get(def_name)
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }

    pub fn def_names(&self) -> impl Iterator<Item = &str> {
        self.defs.keys().map(String::as_str)
    }
}

/// Loads every `*.xml` file directly inside `dir`, in file-name order. A def
/// name may appear only once across the whole load.
pub fn load_agent_defs(dir: &Path) -> Result<AgentDefDatabase, ContentCompileError> {
    let mut files = Vec::<PathBuf>::new();
    let entries = fs::read_dir(dir).map_err(|source| read_error(dir.to_path_buf(), source))?;
    for entry in entries {
        let entry = entry.map_err(|source| read_error(dir.to_path_buf(), source))?;
        let path = entry.path();
        let is_xml = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml"));
        if path.is_file() && is_xml {
            files.push(path);
        }
    }
    files.sort();

    let mut database = AgentDefDatabase::default();
    for file in files {
        let raw = fs::read_to_string(&file).map_err(|source| read_error(file.clone(), source))?;
        for def in parse_agent_defs(&file, &raw)? {
            if database.defs.contains_key(&def.def_name) {
                return Err(ContentCompileError {
                    code: ContentErrorCode::DuplicateDef,
                    message: format!(
                        "duplicate AgentDef '{}'; each defName may be defined only once",
                        def.def_name
                    ),
                    file_path: file.clone(),
                    location: None,
                });
            }
            database.defs.insert(def.def_name.clone(), def);
        }
    }
    info!(
        dir = %dir.display(),
        def_count = database.len(),
        "agent_defs_loaded"
    );
    Ok(database)
}

pub fn parse_agent_defs(file_path: &Path, raw: &str) -> Result<Vec<AgentDef>, ContentCompileError> {
    let doc = Document::parse(raw).map_err(|error| ContentCompileError {
        code: ContentErrorCode::XmlMalformed,
        message: format!("malformed XML: {error}"),
        file_path: file_path.to_path_buf(),
        location: Some(SourceLocation {
            line: error.pos().row as usize,
            column: error.pos().col as usize,
        }),
    })?;
    let source = DefsSource {
        file_path,
        doc: &doc,
    };

    let root = doc.root_element();
    if root.tag_name().name() != "Defs" {
        return Err(source.error(
            root,
            ContentErrorCode::InvalidRoot,
            "root element must be <Defs>",
        ));
    }
    root.children()
        .filter(|node| node.is_element())
        .map(|child| match child.tag_name().name() {
            "AgentDef" => source.agent_def(child),
            other => Err(source.error(
                child,
                ContentErrorCode::UnknownDefType,
                format!("<{other}> is not a def type; expected <AgentDef>"),
            )),
        })
        .collect()
}

/// A parsed defs file. Errors raised through it carry its path and the
/// offending node's position.
struct DefsSource<'a, 'input> {
    file_path: &'a Path,
    doc: &'a Document<'input>,
}

impl DefsSource<'_, '_> {
    fn agent_def(&self, node: Node<'_, '_>) -> Result<AgentDef, ContentCompileError> {
        let mut seen = HashSet::<&str>::new();
        let mut def_name = None;
        let mut label = None;
        let mut behavior = None;
        let mut health = None;
        let mut damage = None;
        let mut speed = None;
        let mut detection_radius = None;
        let mut wander_radius = None;
        let mut max_force = None;
        let mut script = None;

        for field in node.children().filter(|child| child.is_element()) {
            let name = field.tag_name().name();
            if !seen.insert(name) {
                return Err(self.error(
                    field,
                    ContentErrorCode::DuplicateField,
                    format!("<{name}> appears twice in one <AgentDef>"),
                ));
            }
            match name {
                "defName" => def_name = Some(self.text(field)?),
                "label" => label = Some(self.text(field)?),
                "behavior" => behavior = Some(self.behavior(field)?),
                "health" => health = Some(self.number(field)?),
                "damage" => damage = Some(self.number(field)?),
                "speed" => speed = Some(self.number(field)?),
                "detectionRadius" => detection_radius = Some(self.number(field)?),
                "wanderRadius" => wander_radius = Some(self.number(field)?),
                "maxForce" => max_force = Some(self.number(field)?),
                "script" => script = Some(self.text(field)?),
                _ => {
                    return Err(self.error(
                        field,
                        ContentErrorCode::UnknownField,
                        format!("<AgentDef> has no field <{name}>"),
                    ))
                }
            }
        }

        let missing = |name: &str| {
            self.error(
                node,
                ContentErrorCode::MissingField,
                format!("<AgentDef> is missing required field <{name}>"),
            )
        };
        Ok(AgentDef {
            def_name: def_name.ok_or_else(|| missing("defName"))?,
            label: label.ok_or_else(|| missing("label"))?,
            behavior: behavior.ok_or_else(|| missing("behavior"))?,
            health: health.ok_or_else(|| missing("health"))?,
            damage: damage.ok_or_else(|| missing("damage"))?,
            speed: speed.ok_or_else(|| missing("speed"))?,
            detection_radius: detection_radius.ok_or_else(|| missing("detectionRadius"))?,
            wander_radius,
            max_force,
            script,
        })
    }

    fn text(&self, field: Node<'_, '_>) -> Result<String, ContentCompileError> {
        match field.text().map(str::trim) {
            Some(value) if !value.is_empty() => Ok(value.to_string()),
            _ => Err(self.error(
                field,
                ContentErrorCode::MissingField,
                format!("<{}> is empty", field.tag_name().name()),
            )),
        }
    }

    fn behavior(&self, field: Node<'_, '_>) -> Result<BehaviorCategory, ContentCompileError> {
        let value = self.text(field)?;
        value.parse().map_err(|_| {
            self.error(
                field,
                ContentErrorCode::InvalidValue,
                format!("behavior '{value}' is not one of Aggressive, Passive, Friendly"),
            )
        })
    }

    /// Stats and radii: finite and never negative.
    fn number(&self, field: Node<'_, '_>) -> Result<f32, ContentCompileError> {
        let value = self.text(field)?;
        let name = field.tag_name().name();
        match value.parse::<f32>() {
            Ok(number) if number.is_finite() && number >= 0.0 => Ok(number),
            Ok(_) => Err(self.error(
                field,
                ContentErrorCode::InvalidValue,
                format!("<{name}> must be a finite number >= 0, got {value}"),
            )),
            Err(_) => Err(self.error(
                field,
                ContentErrorCode::InvalidValue,
                format!("<{name}> value '{value}' is not a number"),
            )),
        }
    }

    fn error(
        &self,
        node: Node<'_, '_>,
        code: ContentErrorCode,
        message: impl Into<String>,
    ) -> ContentCompileError {
        let pos = self.doc.text_pos_at(node.range().start);
        ContentCompileError {
            code,
            message: message.into(),
            file_path: self.file_path.to_path_buf(),
            location: Some(SourceLocation {
                line: pos.row as usize,
                column: pos.col as usize,
            }),
        }
    }
}

fn read_error(path: PathBuf, source: std::io::Error) -> ContentCompileError {
    ContentCompileError {
        code: ContentErrorCode::ReadFile,
        message: format!("failed to read agent defs: {source}"),
        file_path: path,
        location: None,
    }
}
