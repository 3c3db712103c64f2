// Tala Configuration
// `tala.toml` options with environment overrides

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_FILE: &str = "tala.toml";
pub const ENV_REPL_DEBUGGER: &str = "TALA_REPL_DEBUGGER";
pub const DEFAULT_MAX_CALL_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{var} must be a boolean flag, got '{value}'")]
    InvalidFlag { var: String, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Options {
    pub debugger: DebuggerOptions,
    pub runtime: RuntimeOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DebuggerOptions {
    /// Attach the REPL debugger instrumentation to halt points
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeOptions {
    /// Nested host calls allowed on one thread, debugger evaluations included
    pub max_call_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl Options {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read `path` if given, else `tala.toml` in the working directory if it
    /// exists, then apply environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let options = match path {
            Some(path) => Self::read(path)?,
            None => {
                let default = Path::new(CONFIG_FILE);
                if default.exists() {
                    Self::read(default)?
                } else {
                    Self::default()
                }
            }
        };
        options.with_env_overrides(|name| std::env::var(name).ok())
    }

    fn read(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let options = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), ?options, "loaded configuration");
        Ok(options)
    }

    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_REPL_DEBUGGER) {
            self.debugger.enabled = parse_flag(ENV_REPL_DEBUGGER, &value)?;
        }
        Ok(self)
    }

    pub fn repl_debugger(mut self, enabled: bool) -> Self {
        self.debugger.enabled = enabled;
        self
    }

    pub fn repl_debugger_enabled(&self) -> bool {
        self.debugger.enabled
    }

    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.runtime.max_call_depth = depth;
        self
    }
}

fn parse_flag(var: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::InvalidFlag {
            var: var.to_string(),
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debugger_is_off_by_default() {
        assert!(!Options::from_toml_str("").unwrap().repl_debugger_enabled());
    }

    #[test]
    fn toml_enables_debugger() {
        let options = Options::from_toml_str("[debugger]\nenabled = true\n").unwrap();
        assert!(options.repl_debugger_enabled());
    }

    #[test]
    fn call_depth_defaults_and_overrides() {
        let options = Options::from_toml_str("").unwrap();
        assert_eq!(options.runtime.max_call_depth, DEFAULT_MAX_CALL_DEPTH);
        let options = Options::from_toml_str("[runtime]\nmax_call_depth = 16\n").unwrap();
        assert_eq!(options.runtime.max_call_depth, 16);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            Options::from_toml_str("[debugger]\nport = 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let options = Options::from_toml_str("[debugger]\nenabled = true\n")
            .unwrap()
            .with_env_overrides(|name| (name == ENV_REPL_DEBUGGER).then(|| "off".to_string()))
            .unwrap();
        assert!(!options.repl_debugger_enabled());

        let err = Options::default()
            .with_env_overrides(|_| Some("maybe".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFlag { .. }));
    }
}
