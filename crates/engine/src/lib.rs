use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub mod config;
pub mod content;
pub mod dialogue;
pub mod nav;
pub mod script;
pub mod sim;

pub use config::{ConfigError, SimConfig, WorldSize};
pub use content::{
    load_agent_defs, parse_agent_defs, AgentDef, AgentDefDatabase, ContentCompileError,
    ContentErrorCode, SourceLocation,
};
pub use dialogue::{
    Dialogue, DialogueDisplay, DialogueError, DialogueId, DialogueNode, DialogueOption,
    DialogueStep, DialogueSystem, LogDialogueDisplay, NodeId, END_CONVERSATION,
};
pub use nav::{NavGrid, NavGridError, OccupancyProbe, OpenSpace, Pathfinder};
#[cfg(feature = "lua")]
pub use script::LuaScriptLoader;
pub use script::{
    BehaviorSource, NativeScript, NativeScriptLoader, ScriptApi, ScriptError, ScriptHook,
    ScriptLoader, ScriptRuntime, ScriptedBehavior,
};
pub use sim::{
    AgentManager, BehaviorCategory, Effect, EffectKind, Entity, EntityId, EntityInfo,
    EntitySpawn, EntityState, NearbyObject, ObjectId, ObjectRegistry, TickReport, Vec3,
    WorldObjects,
};

pub const ROOT_ENV_VAR: &str = "AGENT_SANDBOX_ROOT";

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
    pub agents_dir: PathBuf,
    pub scripts_dir: PathBuf,
    pub config_path: PathBuf,
    pub cache_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{var} is not valid unicode: {source}")]
    EnvVar {
        var: &'static str,
        #[source]
        source: env::VarError,
    },
    #[error("failed to locate the running executable: {0}")]
    CurrentExe(#[source] std::io::Error),
    #[error("failed to create cache directory at {path}: {source}")]
    CreateCacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{var} points at {path}, which has no Cargo.toml next to assets/agents")]
    InvalidEnvRoot { var: &'static str, path: PathBuf },
    #[error(
        "no sandbox root (Cargo.toml next to assets/agents) above {searched_from}; \
set {var} to the checkout directory"
    )]
    RootNotFound {
        searched_from: PathBuf,
        var: &'static str,
    },
}

pub fn resolve_app_paths() -> Result<AppPaths, StartupError> {
    let root = resolve_root()?;
    let paths = AppPaths::under(root);
    fs::create_dir_all(&paths.cache_dir).map_err(|source| StartupError::CreateCacheDir {
        path: paths.cache_dir.clone(),
        source,
    })?;
    Ok(paths)
}

impl AppPaths {
    /// Standard layout below a sandbox checkout.
    pub fn under(root: PathBuf) -> Self {
        Self {
            agents_dir: agents_dir(&root),
            scripts_dir: root.join("scripts"),
            config_path: root.join("config").join("sim.json"),
            cache_dir: root.join("cache"),
            root,
        }
    }
}

fn agents_dir(root: &Path) -> PathBuf {
    root.join("assets").join("agents")
}

fn resolve_root() -> Result<PathBuf, StartupError> {
    match env::var(ROOT_ENV_VAR) {
        Ok(value) => {
            let path = canonical_or_raw(Path::new(&value));
            if is_sandbox_root(&path) {
                Ok(path)
            } else {
                Err(StartupError::InvalidEnvRoot {
                    var: ROOT_ENV_VAR,
                    path,
                })
            }
        }
        Err(env::VarError::NotPresent) => {
            let exe = env::current_exe().map_err(StartupError::CurrentExe)?;
            let searched_from = exe.parent().unwrap_or(exe.as_path());
            find_root_above(searched_from).ok_or_else(|| StartupError::RootNotFound {
                searched_from: canonical_or_raw(searched_from),
                var: ROOT_ENV_VAR,
            })
        }
        Err(source) => Err(StartupError::EnvVar {
            var: ROOT_ENV_VAR,
            source,
        }),
    }
}

fn find_root_above(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|candidate| is_sandbox_root(candidate))
        .map(canonical_or_raw)
}

fn is_sandbox_root(path: &Path) -> bool {
    path.join("Cargo.toml").is_file() && agents_dir(path).is_dir()
}

fn canonical_or_raw(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
