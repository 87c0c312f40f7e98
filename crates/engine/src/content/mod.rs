mod agent_defs;

pub use agent_defs::{
    load_agent_defs, parse_agent_defs, AgentDef, AgentDefDatabase, ContentCompileError,
    ContentErrorCode, SourceLocation,
};
