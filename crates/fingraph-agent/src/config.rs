//! Agent runner configuration.

use std::path::PathBuf;

/// Agent runner configuration.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Agent CLI binary
    pub program: String,
    /// Agent to select with `--agent` (none means the CLI default)
    pub agent: Option<String>,
    /// Agent config directory (router instructions live under `agents/`)
    pub config_dir: PathBuf,
    /// Root for relocated outputs and trace files
    pub output_root: PathBuf,
    /// Destination for generated tables
    pub exports_dir: PathBuf,
    /// Destination for generated images
    pub citations_dir: PathBuf,
    /// Directory for raw stream traces
    pub trace_dir: PathBuf,
    /// Directories scanned for freshly generated files
    pub scan_dirs: Vec<PathBuf>,
    /// Redis URL handed to the child so it can publish events itself
    pub redis_url: String,
    /// Whether MCP tool events stream live (suppresses re-publishing them
    /// from recovered tool traces)
    pub live_mcp_events: bool,
}

impl AgentConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let output_root =
            PathBuf::from(std::env::var("OUTPUT_ROOT").unwrap_or_else(|_| "/output".to_string()));

        Self {
            program: std::env::var("OPENCODE_BIN").unwrap_or_else(|_| "opencode".to_string()),
            agent: std::env::var("OPENCODE_AGENT").ok().filter(|s| !s.is_empty()),
            config_dir: PathBuf::from(
                std::env::var("OPENCODE_CONFIG_PATH")
                    .unwrap_or_else(|_| "/opencode-config".to_string()),
            ),
            exports_dir: std::env::var("OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| output_root.join("exports")),
            citations_dir: std::env::var("CITATION_OUTPUT_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| output_root.join("citations")),
            trace_dir: std::env::var("OPENCODE_TRACE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| output_root.join("opencode")),
            scan_dirs: std::env::var("OPENCODE_OUTPUT_SCAN_DIRS")
                .unwrap_or_else(|_| "/app".to_string())
                .split(':')
                .filter(|s| !s.is_empty())
                .map(PathBuf::from)
                .collect(),
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            live_mcp_events: std::env::var("LIVE_MCP_TOOL_EVENTS")
                .unwrap_or_else(|_| "1".to_string())
                == "1",
            output_root,
        }
    }
}
