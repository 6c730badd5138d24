//! TOML-based configuration for git-aflow.
//!
//! Every field has a default, so an absent file is equivalent to an empty
//! one. The file is looked up by [`AflowConfig::discover`] in the order
//! explicit path, `GIT_AFLOW_CONFIG`, `<git-dir>/aflow.toml`, user config
//! directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

/// Environment variable naming an explicit configuration file.
pub const CONFIG_ENV: &str = "GIT_AFLOW_CONFIG";

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AflowConfig {
    /// Names of the integration branches.
    #[serde(default)]
    pub branches: BranchesConfig,

    /// Logging settings used by the CLI.
    #[serde(default)]
    pub log: LogConfig,
}

// ---------------------------------------------------------------------------
// Branches
// ---------------------------------------------------------------------------

/// Integration branch naming.
///
/// `develop` and `staging` are suffixes: the branches of iteration `1` are
/// `1/develop` and `1/staging`. `release` is a prefix for release branches
/// (`release/...`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchesConfig {
    #[serde(default = "default_master")]
    pub master: String,

    #[serde(default = "default_develop")]
    pub develop: String,

    #[serde(default = "default_staging")]
    pub staging: String,

    #[serde(default = "default_release")]
    pub release: String,
}

fn default_master() -> String {
    "master".into()
}

fn default_develop() -> String {
    "develop".into()
}

fn default_staging() -> String {
    "staging".into()
}

fn default_release() -> String {
    "release".into()
}

impl Default for BranchesConfig {
    fn default() -> Self {
        Self {
            master: default_master(),
            develop: default_develop(),
            staging: default_staging(),
            release: default_release(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default filter directive when neither `-v`/`-q` nor `RUST_LOG` is given.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Write logs to this file instead of stderr.
    #[serde(default)]
    pub file: Option<PathBuf>,
}

fn default_log_level() -> String {
    "warn".into()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl AflowConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AflowConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve the configuration for a repository.
    ///
    /// An explicit path must exist; the implicit locations are optional.
    pub fn discover(explicit: Option<&Path>, git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match explicit {
            Some(path) => Self::load_from_file(path)?,
            None => match Self::candidate_paths(git_dir).into_iter().find(|p| p.exists()) {
                Some(path) => Self::load_from_file(path)?,
                None => {
                    debug!("no configuration file found, using defaults");
                    Self::default()
                }
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn candidate_paths(git_dir: Option<&Path>) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            if !env_path.is_empty() {
                paths.push(PathBuf::from(env_path));
            }
        }
        if let Some(dir) = git_dir {
            paths.push(dir.join("aflow.toml"));
        }
        if let Some(dir) = dirs::config_dir() {
            paths.push(dir.join("git-aflow").join("config.toml"));
        }
        paths
    }

    /// Validate the configuration for obvious errors.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let b = &self.branches;
        for (field, value) in [
            ("branches.master", &b.master),
            ("branches.develop", &b.develop),
            ("branches.staging", &b.staging),
            ("branches.release", &b.release),
        ] {
            if value.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "branch name must not be empty".into(),
                });
            }
            if value.contains('/') {
                return Err(ConfigError::InvalidValue {
                    field: field.into(),
                    detail: "branch name must not contain '/'".into(),
                });
            }
        }
        if b.develop == b.staging || b.master == b.develop || b.master == b.staging {
            return Err(ConfigError::InvalidValue {
                field: "branches".into(),
                detail: "master, develop and staging must have distinct names".into(),
            });
        }
        if self.log.level.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "log.level".into(),
                detail: "log level must not be empty".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CONFIG: &str = r#"
[branches]
master = "main"
develop = "dev"

[log]
level = "info"
file = "/tmp/aflow.log"
"#;

    #[test]
    fn test_parse_sample_config() {
        let config: AflowConfig = toml::from_str(SAMPLE_CONFIG).unwrap();
        assert_eq!(config.branches.master, "main");
        assert_eq!(config.branches.develop, "dev");
        assert_eq!(config.branches.staging, "staging");
        assert_eq!(config.branches.release, "release");
        assert_eq!(config.log.level, "info");
        assert_eq!(config.log.file, Some(PathBuf::from("/tmp/aflow.log")));
        config.validate().unwrap();
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AflowConfig = toml::from_str("").unwrap();
        assert_eq!(config.branches, BranchesConfig::default());
        assert_eq!(config.log.level, "warn");
        assert!(config.log.file.is_none());
    }

    #[test]
    fn test_validate_rejects_bad_names() {
        let mut config = AflowConfig::default();
        config.branches.develop = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::InvalidValue { .. })));

        let mut config = AflowConfig::default();
        config.branches.staging = "a/b".into();
        assert!(config.validate().is_err());

        let mut config = AflowConfig::default();
        config.branches.staging = "develop".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("aflow.toml");
        std::fs::write(&path, SAMPLE_CONFIG).unwrap();
        let config = AflowConfig::load_from_file(&path).unwrap();
        assert_eq!(config.branches.master, "main");

        let missing = AflowConfig::load_from_file(dir.path().join("nope.toml"));
        assert!(matches!(missing, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_discover_prefers_git_dir_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("aflow.toml"), "[branches]\nstaging = \"qa\"\n").unwrap();
        let config = AflowConfig::discover(None, Some(dir.path())).unwrap();
        assert_eq!(config.branches.staging, "qa");
    }

    #[test]
    fn test_discover_explicit_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let res = AflowConfig::discover(Some(&dir.path().join("missing.toml")), None);
        assert!(matches!(res, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[branches\nmaster = ").unwrap();
        assert!(matches!(
            AflowConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }
}
