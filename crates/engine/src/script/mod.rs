use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::dialogue::{DialogueError, DialogueId, NodeId};
use crate::sim::entity::{BehaviorCategory, EntityId, EntityInfo, EntityState};
use crate::sim::math::Vec3;
use crate::sim::world::{NearbyObject, ObjectId};

mod host;
#[cfg(feature = "lua")]
mod lua;

pub(crate) use host::ScriptHost;
#[cfg(feature = "lua")]
pub use lua::LuaScriptLoader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScriptHook {
    Init,
    Main,
    End,
}

impl ScriptHook {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Main => "main",
            Self::End => "end",
        }
    }
}

impl fmt::Display for ScriptHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("script '{name}' not found")]
    NotFound { name: String },
    #[error("failed to load script '{name}': {message}")]
    Load { name: String, message: String },
    #[error("script {hook} hook failed: {message}")]
    Hook { hook: ScriptHook, message: String },
}

/// Capabilities a script may use, bound to the entity whose hook is running.
///
/// Reads on an entity that no longer exists return zeroed values and
/// commands on it do nothing.
pub trait ScriptApi {
    fn entity_id(&self) -> EntityId;

    fn position(&self) -> Vec3;
    fn health(&self) -> f32;
    fn max_health(&self) -> f32;
    fn damage(&self) -> f32;
    fn speed(&self) -> f32;
    fn state(&self) -> EntityState;
    fn behavior(&self) -> BehaviorCategory;
    fn object_id(&self) -> ObjectId;
    fn velocity(&self) -> Vec3;

    fn set_waypoints(&mut self, waypoints: Vec<Vec3>);
    fn add_waypoint(&mut self, waypoint: Vec3);
    fn clear_waypoints(&mut self);
    fn move_towards(&mut self, target: Vec3) -> bool;
    fn set_max_speed(&mut self, max_speed: f32);
    fn set_max_force(&mut self, max_force: f32);

    fn attack(&mut self, target: EntityId) -> bool;
    fn heal(&mut self, amount: f32);

    /// Returns false for unknown state names or when the entity is dead.
    fn set_state(&mut self, state_name: &str) -> bool;

    fn find_nearest(&self, category: BehaviorCategory) -> Option<EntityId>;
    fn distance_to(&self, other: EntityId) -> Option<f32>;
    fn nearby_objects(&self, radius: f32) -> Vec<NearbyObject>;
    fn nearby_entities(&self, radius: f32) -> Vec<EntityId>;
    fn entity_info(&self, id: EntityId) -> Option<EntityInfo>;
    /// Position of the designated player, if one is set.
    fn player_position(&self) -> Option<Vec3>;
    fn time_of_day(&self) -> f32;
    fn terrain_height(&self, x: f32, z: f32) -> f32;
    fn line_of_sight(&self, target: Vec3) -> bool;

    fn create_dialogue(&mut self, name: &str) -> DialogueId;
    fn clone_dialogue(&mut self, source: DialogueId) -> Result<DialogueId, DialogueError>;
    fn remove_dialogue(&mut self, id: DialogueId) -> Result<(), DialogueError>;
    fn add_dialogue_node(
        &mut self,
        id: DialogueId,
        node: NodeId,
        text: &str,
    ) -> Result<(), DialogueError>;
    fn update_dialogue_node(
        &mut self,
        id: DialogueId,
        node: NodeId,
        text: &str,
    ) -> Result<(), DialogueError>;
    fn remove_dialogue_node(&mut self, id: DialogueId, node: NodeId) -> Result<(), DialogueError>;
    fn add_dialogue_option(
        &mut self,
        id: DialogueId,
        node: NodeId,
        text: &str,
        next_node: NodeId,
    ) -> Result<(), DialogueError>;
    fn update_dialogue_option(
        &mut self,
        id: DialogueId,
        node: NodeId,
        index: usize,
        text: &str,
    ) -> Result<(), DialogueError>;
    fn remove_dialogue_option(
        &mut self,
        id: DialogueId,
        node: NodeId,
        index: usize,
    ) -> Result<(), DialogueError>;
    fn associate_dialogue(&mut self, id: DialogueId) -> bool;
    fn disassociate_dialogue(&mut self);
    fn dialogue_id(&self) -> Option<DialogueId>;
    fn trigger_dialogue(&mut self, start_node: NodeId) -> bool;

    fn log(&self, message: &str);
}

/// A loaded script. Side effects made through `api` before an error stand.
pub trait ScriptRuntime {
    fn call(&mut self, hook: ScriptHook, api: &mut dyn ScriptApi) -> Result<(), ScriptError>;
}

pub trait ScriptLoader {
    fn load(&mut self, name: &str) -> Result<Box<dyn ScriptRuntime>, ScriptError>;
}

pub struct ScriptedBehavior {
    name: String,
    runtime: Box<dyn ScriptRuntime>,
}

impl ScriptedBehavior {
    pub fn new(name: impl Into<String>, runtime: Box<dyn ScriptRuntime>) -> Self {
        Self {
            name: name.into(),
            runtime,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn run(
        &mut self,
        hook: ScriptHook,
        api: &mut dyn ScriptApi,
    ) -> Result<(), ScriptError> {
        self.runtime.call(hook, api)
    }
}

impl fmt::Debug for ScriptedBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptedBehavior")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Who decides an entity's actions each tick.
#[derive(Debug, Default)]
pub enum BehaviorSource {
    #[default]
    DefaultArbiter,
    Scripted(ScriptedBehavior),
}

impl BehaviorSource {
    pub fn is_scripted(&self) -> bool {
        matches!(self, Self::Scripted(_))
    }

    pub fn script_name(&self) -> Option<&str> {
        match self {
            Self::DefaultArbiter => None,
            Self::Scripted(script) => Some(script.name()),
        }
    }
}

pub type HookFn = Box<dyn FnMut(&mut dyn ScriptApi) -> Result<(), String>>;

/// Script written in Rust as up to three hook closures. Missing hooks are
/// skipped.
#[derive(Default)]
pub struct NativeScript {
    init: Option<HookFn>,
    main: Option<HookFn>,
    end: Option<HookFn>,
}

impl NativeScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_init(
        mut self,
        hook: impl FnMut(&mut dyn ScriptApi) -> Result<(), String> + 'static,
    ) -> Self {
        self.init = Some(Box::new(hook));
        self
    }

    pub fn on_main(
        mut self,
        hook: impl FnMut(&mut dyn ScriptApi) -> Result<(), String> + 'static,
    ) -> Self {
        self.main = Some(Box::new(hook));
        self
    }

    pub fn on_end(
        mut self,
        hook: impl FnMut(&mut dyn ScriptApi) -> Result<(), String> + 'static,
    ) -> Self {
        self.end = Some(Box::new(hook));
        self
    }
}

impl ScriptRuntime for NativeScript {
    fn call(&mut self, hook: ScriptHook, api: &mut dyn ScriptApi) -> Result<(), ScriptError> {
        let slot = match hook {
            ScriptHook::Init => &mut self.init,
            ScriptHook::Main => &mut self.main,
            ScriptHook::End => &mut self.end,
        };
        let Some(function) = slot.as_mut() else {
            return Ok(());
        };
        function(api).map_err(|message| ScriptError::Hook { hook, message })
    }
}

pub type ScriptFactory = Box<dyn Fn() -> NativeScript>;

/// Resolves script names against factories registered in code.
#[derive(Default)]
pub struct NativeScriptLoader {
    factories: HashMap<String, ScriptFactory>,
}

impl NativeScriptLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        factory: impl Fn() -> NativeScript + 'static,
    ) -> &mut Self {
        self.factories.insert(name.into(), Box::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl ScriptLoader for NativeScriptLoader {
    fn load(&mut self, name: &str) -> Result<Box<dyn ScriptRuntime>, ScriptError> {
        let factory = self.factories.get(name).ok_or_else(|| ScriptError::NotFound {
            name: name.to_string(),
        })?;
        Ok(Box::new(factory()))
    }
}
