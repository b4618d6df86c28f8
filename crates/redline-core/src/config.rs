//! Configuration management for redline
//!
//! Settings are layered: built-in defaults, then an optional TOML file, then
//! environment variables. The target repository and entry point are optional
//! at load time; requests that need them fail with a configuration error.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::{RedlineError, Result};

/// Name of the config file looked up in the current directory
pub const DEFAULT_CONFIG_FILE: &str = "redline.toml";

/// Environment variable naming the target repository
pub const ENV_WORKING_DIR: &str = "REDLINE_WORKING_DIR";
/// Environment variable naming the entry point, relative to the repository
pub const ENV_ENTRY_POINT: &str = "REDLINE_ENTRY_POINT";
/// Environment variable selecting the agent model
pub const ENV_MODEL: &str = "REDLINE_MODEL";
/// Environment variable overriding the agent executable
pub const ENV_AGENT_BIN: &str = "REDLINE_AGENT_BIN";
/// Environment variable overriding the listen port
pub const ENV_PORT: &str = "REDLINE_PORT";

/// Top-level redline configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedlineConfig {
    /// Project being edited
    #[serde(default)]
    pub target: TargetConfig,

    /// Coding agent invocation
    #[serde(default)]
    pub agent: AgentConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerSettings,

    /// Git identity and commit settings
    #[serde(default)]
    pub git: GitSettings,
}

/// Target project settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Absolute path to the target repository
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    /// Component file being edited, relative to `working_dir`
    #[serde(default)]
    pub entry_point: Option<PathBuf>,
}

/// Coding agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Executable to spawn
    #[serde(default = "default_program")]
    pub program: String,

    /// Arguments placed before the generated flags
    #[serde(default = "default_base_args")]
    pub base_args: Vec<String>,

    /// Tools the agent may use; empty means no allowlist flag is passed
    #[serde(default = "default_allowed_tools")]
    pub allowed_tools: Vec<String>,

    /// Model override
    #[serde(default)]
    pub model: Option<String>,
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Seconds of silence before a keep-alive comment is sent on the edit stream
    #[serde(default = "default_heartbeat_secs")]
    pub heartbeat_secs: u64,

    /// Upload size limit (screenshots arrive as base64 JSON)
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,

    /// Where uploaded screenshots are written
    #[serde(default = "default_screenshots_dir")]
    pub screenshots_dir: PathBuf,
}

/// Git settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    /// Author/committer name passed to git when set
    #[serde(default)]
    pub author_name: Option<String>,

    /// Author/committer email passed to git when set
    #[serde(default)]
    pub author_email: Option<String>,

    /// Message for the commit made after each successful agent run
    #[serde(default = "default_commit_message")]
    pub commit_message: String,
}

fn default_program() -> String {
    "claude".to_string()
}

fn default_base_args() -> Vec<String> {
    vec!["-p".to_string()]
}

fn default_allowed_tools() -> Vec<String> {
    ["Read", "Edit", "MultiEdit", "Write", "Glob", "Grep", "LS"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_port() -> u16 {
    3001
}

fn default_heartbeat_secs() -> u64 {
    15
}

fn default_body_limit() -> usize {
    50 * 1024 * 1024
}

fn default_screenshots_dir() -> PathBuf {
    PathBuf::from("screenshots")
}

fn default_commit_message() -> String {
    "Applied visual edit".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            base_args: default_base_args(),
            allowed_tools: default_allowed_tools(),
            model: None,
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: default_port(),
            heartbeat_secs: default_heartbeat_secs(),
            body_limit_bytes: default_body_limit(),
            screenshots_dir: default_screenshots_dir(),
        }
    }
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            author_name: None,
            author_email: None,
            commit_message: default_commit_message(),
        }
    }
}

impl RedlineConfig {
    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| RedlineError::Configuration(format!("Failed to parse config file: {}", e)))
    }

    /// Load from an explicit file, or `redline.toml` in `cwd` if present, or defaults
    pub fn load(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let path = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let candidate = cwd.join(DEFAULT_CONFIG_FILE);
                candidate.exists().then_some(candidate)
            }
        };

        match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    RedlineError::Configuration(format!(
                        "Failed to read config file {}: {}",
                        path.display(),
                        e
                    ))
                })?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply overrides using the given lookup (empty values are ignored)
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(dir) = get(ENV_WORKING_DIR) {
            self.target.working_dir = Some(PathBuf::from(dir));
        }
        if let Some(entry) = get(ENV_ENTRY_POINT) {
            self.target.entry_point = Some(PathBuf::from(entry));
        }
        if let Some(model) = get(ENV_MODEL) {
            self.agent.model = Some(model);
        }
        if let Some(bin) = get(ENV_AGENT_BIN) {
            self.agent.program = bin;
        }
        if let Some(port) = get(ENV_PORT) {
            self.server.port = port.trim().parse().map_err(|_| {
                RedlineError::Configuration(format!("{} is not a valid port: {}", ENV_PORT, port))
            })?;
        }
        Ok(())
    }
}

impl TargetConfig {
    /// Require both target settings to be present
    ///
    /// Only presence is checked here; path validity is checked right before the
    /// agent is spawned.
    pub fn require(&self) -> Result<(&Path, &Path)> {
        let working_dir = self.working_dir.as_deref().ok_or_else(|| {
            RedlineError::Configuration(format!("{} is not set", ENV_WORKING_DIR))
        })?;
        let entry_point = self.entry_point.as_deref().ok_or_else(|| {
            RedlineError::Configuration(format!("{} is not set", ENV_ENTRY_POINT))
        })?;
        Ok((working_dir, entry_point))
    }

    /// Describe what is wrong with the target settings, if anything
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        match &self.working_dir {
            None => problems.push(format!("{} is not set", ENV_WORKING_DIR)),
            Some(dir) if !dir.is_absolute() => {
                problems.push(format!("{} must be absolute: {}", ENV_WORKING_DIR, dir.display()))
            }
            Some(dir) if !dir.is_dir() => {
                problems.push(format!("{} is not a directory: {}", ENV_WORKING_DIR, dir.display()))
            }
            Some(dir) => {
                if let Some(entry) = &self.entry_point {
                    if !dir.join(entry).exists() {
                        problems.push(format!("{} does not exist: {}", ENV_ENTRY_POINT, entry.display()));
                    }
                }
            }
        }
        if self.entry_point.is_none() {
            problems.push(format!("{} is not set", ENV_ENTRY_POINT));
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = RedlineConfig::default();
        assert_eq!(config.agent.program, "claude");
        assert_eq!(config.agent.base_args, vec!["-p".to_string()]);
        assert!(config.agent.allowed_tools.contains(&"Edit".to_string()));
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.server.heartbeat_secs, 15);
        assert!(config.target.working_dir.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RedlineConfig::from_toml(
            r#"
            [target]
            working_dir = "/srv/app"

            [agent]
            model = "sonnet"
            "#,
        )
        .unwrap();
        assert_eq!(config.target.working_dir, Some(PathBuf::from("/srv/app")));
        assert_eq!(config.agent.model.as_deref(), Some("sonnet"));
        assert_eq!(config.agent.program, "claude");
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_invalid_toml() {
        let err = RedlineConfig::from_toml("[target\nworking_dir = 1").unwrap_err();
        assert!(matches!(err, RedlineError::Configuration(_)));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_WORKING_DIR, "/repo"),
            (ENV_ENTRY_POINT, "src/App.jsx"),
            (ENV_MODEL, "opus"),
            (ENV_PORT, "4000"),
            (ENV_AGENT_BIN, "  "),
        ]
        .into_iter()
        .collect();

        let mut config = RedlineConfig::default();
        config
            .apply_env_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.target.working_dir, Some(PathBuf::from("/repo")));
        assert_eq!(config.target.entry_point, Some(PathBuf::from("src/App.jsx")));
        assert_eq!(config.agent.model.as_deref(), Some("opus"));
        assert_eq!(config.server.port, 4000);
        // Blank values do not override
        assert_eq!(config.agent.program, "claude");
    }

    #[test]
    fn test_bad_port() {
        let mut config = RedlineConfig::default();
        let err = config
            .apply_env_with(|k| (k == ENV_PORT).then(|| "eighty".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_PORT));
    }

    #[test]
    fn test_load_from_cwd() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join(DEFAULT_CONFIG_FILE), "[server]\nport = 9999\n").unwrap();
        let config = RedlineConfig::load(None, temp.path()).unwrap();
        assert_eq!(config.server.port, 9999);

        let empty = TempDir::new().unwrap();
        let config = RedlineConfig::load(None, empty.path()).unwrap();
        assert_eq!(config.server.port, 3001);
    }

    #[test]
    fn test_load_missing_explicit_file() {
        let temp = TempDir::new().unwrap();
        let missing = temp.path().join("nope.toml");
        assert!(RedlineConfig::load(Some(&missing), temp.path()).is_err());
    }

    #[test]
    fn test_require_target() {
        let mut target = TargetConfig::default();
        assert!(matches!(target.require(), Err(RedlineError::Configuration(_))));

        target.working_dir = Some(PathBuf::from("/repo"));
        let err = target.require().unwrap_err();
        assert!(err.to_string().contains(ENV_ENTRY_POINT));

        target.entry_point = Some(PathBuf::from("src/App.jsx"));
        let (dir, entry) = target.require().unwrap();
        assert_eq!(dir, Path::new("/repo"));
        assert_eq!(entry, Path::new("src/App.jsx"));
    }

    #[test]
    fn test_problems() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("App.jsx"), "export default 1;").unwrap();

        let target = TargetConfig {
            working_dir: Some(temp.path().to_path_buf()),
            entry_point: Some(PathBuf::from("App.jsx")),
        };
        assert!(target.problems().is_empty());

        let relative = TargetConfig {
            working_dir: Some(PathBuf::from("relative/dir")),
            entry_point: Some(PathBuf::from("App.jsx")),
        };
        assert_eq!(relative.problems().len(), 1);

        assert_eq!(TargetConfig::default().problems().len(), 2);
    }
}
