use agent_engine::{
    load_agent_defs, resolve_app_paths, AgentDefDatabase, AppPaths, ConfigError,
    ContentCompileError, SimConfig, StartupError,
};
use thiserror::Error;
use tracing::info;
use tracing_subscriber::EnvFilter;

const TICKS_ENV_VAR: &str = "AGENT_SANDBOX_TICKS";
const DEFAULT_TICKS: u32 = 600;

#[derive(Debug, Error)]
pub(crate) enum SandboxError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Content(#[from] ContentCompileError),
    #[error(transparent)]
    NavGrid(#[from] agent_engine::NavGridError),
    #[error("agent def '{def_name}' is required by the sandbox scene but was not loaded")]
    MissingDef { def_name: String },
}

pub(crate) struct AppWiring {
    pub(crate) paths: AppPaths,
    pub(crate) sim_config: SimConfig,
    pub(crate) defs: AgentDefDatabase,
    pub(crate) total_ticks: u32,
}

pub(crate) fn build_app() -> Result<AppWiring, SandboxError> {
    init_tracing();
    info!("=== Agent Sandbox Startup ===");

    let paths = resolve_app_paths()?;
    info!(root = %paths.root.display(), "sandbox_root_resolved");

    let sim_config = if paths.config_path.is_file() {
        let config = SimConfig::load(&paths.config_path)?;
        info!(path = %paths.config_path.display(), "sim_config_loaded");
        config
    } else {
        info!(path = %paths.config_path.display(), "sim_config_missing_using_defaults");
        SimConfig::default()
    };
    let defs = load_agent_defs(&paths.agents_dir)?;

    Ok(AppWiring {
        paths,
        sim_config,
        defs,
        total_ticks: parse_ticks(std::env::var(TICKS_ENV_VAR).ok().as_deref()),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn parse_ticks(raw: Option<&str>) -> u32 {
    raw.map(str::trim)
        .and_then(|value| value.parse::<u32>().ok())
        .filter(|ticks| *ticks > 0)
        .unwrap_or(DEFAULT_TICKS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_count_falls_back_on_missing_or_bad_values() {
        assert_eq!(parse_ticks(None), DEFAULT_TICKS);
        assert_eq!(parse_ticks(Some("abc")), DEFAULT_TICKS);
        assert_eq!(parse_ticks(Some("0")), DEFAULT_TICKS);
        assert_eq!(parse_ticks(Some(" 120 ")), 120);
    }
}
