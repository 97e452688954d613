//! Configuration loading for pinmux.
//!
//! The configuration file is located at `~/.pinmux/config.toml`:
//!
//! ```toml
//! name = "pinmux"
//!
//! [agent]
//! command = "claude"
//! args = ["--continue"]
//! ```
//!
//! A missing file or missing `agent.command` falls back to the login shell
//! (`$SHELL`, then `/bin/sh`; `%COMSPEC%`, then `cmd.exe` on Windows).

use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instance name, shown in the overview header
    pub name: String,
    /// Command launched in every new session
    pub agent: AgentConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            name: "pinmux".to_string(),
            agent: AgentConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Program to run; `None` means the login shell
    pub command: Option<String>,
    pub args: Vec<String>,
}

impl Config {
    pub fn load() -> Self {
        if let Some(path) = Self::config_path() {
            if path.exists() {
                if let Ok(content) = fs::read_to_string(&path) {
                    match toml::from_str(&content) {
                        Ok(config) => return config,
                        Err(err) => {
                            tracing::warn!("ignoring malformed config: {}", err);
                        }
                    }
                }
            }
        }
        Self::default()
    }

    /// Command and args to spawn, resolving the shell fallback.
    pub fn resolve_command(&self) -> (String, Vec<String>) {
        match &self.agent.command {
            Some(command) => (command.clone(), self.agent.args.clone()),
            None => (default_shell(), Vec::new()),
        }
    }

    fn config_path() -> Option<PathBuf> {
        Some(pinmux_dir()?.join("config.toml"))
    }
}

/// `~/.pinmux`, created on first use. Also holds the log file.
pub fn pinmux_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".pinmux");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

#[cfg(windows)]
fn default_shell() -> String {
    std::env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
}

#[cfg(not(windows))]
fn default_shell() -> String {
    std::env::var("SHELL").unwrap_or_else(|_| "/bin/sh".to_string())
}

// Get home directory
fn home_dir() -> Option<PathBuf> {
    std::env::var_os("USERPROFILE")
        .or_else(|| std::env::var_os("HOME"))
        .map(PathBuf::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.name, "pinmux");
        assert!(config.agent.command.is_none());
    }

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
            name = "work"

            [agent]
            command = "claude"
            args = ["--continue"]
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.name, "work");
        let (command, args) = config.resolve_command();
        assert_eq!(command, "claude");
        assert_eq!(args, vec!["--continue".to_string()]);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: Config = toml::from_str("name = \"x\"").unwrap();
        assert_eq!(config.name, "x");
        assert!(config.agent.command.is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_missing_command_resolves_to_shell() {
        let config = Config::default();
        let (command, args) = config.resolve_command();
        assert!(!command.is_empty());
        assert!(args.is_empty());
    }
}
