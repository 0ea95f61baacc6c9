use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level configuration loaded from symbench.toml.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
#[derive(Default)]
pub struct Config {
    pub tool: ToolConfig,
    pub paths: PathsConfig,
    pub run: RunConfig,
}

/// How to launch the optimization tool and recognize its transcript.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ToolConfig {
    pub command: String,
    pub args: Vec<String>,
    /// Directory the tool is started in; relative paths in scripts resolve against it.
    pub working_dir: PathBuf,
    /// Resource file sourced as the first instruction of every script.
    pub rc_file: String,
    /// Text every well-formed transcript starts with.
    pub banner: String,
    /// Prompt name printed before each echoed instruction (`abc 01> ...`).
    pub prompt: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PathsConfig {
    pub networks_dir: PathBuf,
    pub preprocessed_dir: PathBuf,
    pub compwise_dir: PathBuf,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunConfig {
    /// Per-invocation time budget, `timeout(1)` style (`4h`, `30m`, `90`).
    pub timeout: String,
    pub optimize_command: String,
    /// Error bound passed to `symmetrize` in the unbounded regime.
    pub unbounded_error_bound: String,
}

// --- Default implementations ---

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            command: "./../../abc".to_string(),
            args: Vec::new(),
            working_dir: PathBuf::from("."),
            rc_file: "./../../abc.rc".to_string(),
            banner: "UC Berkeley, ABC".to_string(),
            prompt: "abc".to_string(),
        }
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            networks_dir: PathBuf::from("benchmark/networks"),
            preprocessed_dir: PathBuf::from("benchmark/preprocessed"),
            compwise_dir: PathBuf::from("benchmark/compwise"),
        }
    }
}

impl PathsConfig {
    /// Resolve relative entries against `base`, the directory the tool runs in,
    /// so the tool and symbench agree on every benchmark path.
    pub fn anchored(&self, base: &Path) -> PathsConfig {
        let anchor = |p: &PathBuf| {
            if p.is_relative() {
                base.join(p)
            } else {
                p.clone()
            }
        };
        PathsConfig {
            networks_dir: anchor(&self.networks_dir),
            preprocessed_dir: anchor(&self.preprocessed_dir),
            compwise_dir: anchor(&self.compwise_dir),
        }
    }
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout: "4h".to_string(),
            optimize_command: "runsc resyn2".to_string(),
            unbounded_error_bound: "100".to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid timeout {value:?}: {reason}")]
    Timeout { value: String, reason: String },
    #[error("optimize command must be a single line without double quotes: {0:?}")]
    OptimizeCommand(String),
    #[error("error threshold must be one token without ';' or path separators: {0:?}")]
    Threshold(String),
    #[error("failed to resolve tool working directory {}: {source}", path.display())]
    WorkingDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Config {
    /// Load the config file, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
        };
        toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Parse a time budget the way `timeout(1)` reads its duration argument:
/// a bare number is seconds, otherwise a humantime string such as `4h` or `1m 30s`.
pub fn parse_timeout(value: &str) -> Result<Duration, ConfigError> {
    let trimmed = value.trim();
    let invalid = |reason: String| ConfigError::Timeout {
        value: value.to_string(),
        reason,
    };

    let duration = match trimmed.parse::<f64>() {
        Ok(secs) => Duration::try_from_secs_f64(secs).map_err(|e| invalid(e.to_string()))?,
        Err(_) => humantime::parse_duration(trimmed).map_err(|e| invalid(e.to_string()))?,
    };
    if duration.is_zero() {
        return Err(invalid("must be greater than zero".to_string()));
    }
    Ok(duration)
}

/// The optimize command is embedded in a double-quoted `symmetrize` argument
/// and must fit on one script line.
pub fn validate_optimize_command(command: &str) -> Result<(), ConfigError> {
    if command.contains(['\n', '\r', '"']) {
        return Err(ConfigError::OptimizeCommand(command.to_string()));
    }
    Ok(())
}

/// The threshold lands in a script line, a table field and the table file name.
pub fn validate_threshold(threshold: &str) -> Result<(), ConfigError> {
    let bad = threshold.trim().is_empty()
        || threshold.contains(['\n', '\r', ';', '/', '\\', '"', ' ']);
    if bad {
        return Err(ConfigError::Threshold(threshold.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_benchmark_layout() {
        let config = Config::default();
        assert_eq!(config.tool.banner, "UC Berkeley, ABC");
        assert_eq!(config.tool.prompt, "abc");
        assert_eq!(config.run.timeout, "4h");
        assert_eq!(config.run.optimize_command, "runsc resyn2");
        assert_eq!(
            config.paths.preprocessed_dir,
            PathBuf::from("benchmark/preprocessed")
        );
    }

    #[test]
    fn test_load_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.run.unbounded_error_bound, "100");
    }

    #[test]
    fn test_load_partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbench.toml");
        std::fs::write(
            &path,
            r#"
[tool]
command = "/opt/abc/abc"

[run]
timeout = "30m"
"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.tool.command, "/opt/abc/abc");
        assert_eq!(config.tool.prompt, "abc");
        assert_eq!(config.run.timeout, "30m");
        assert_eq!(config.run.optimize_command, "runsc resyn2");
    }

    #[test]
    fn test_load_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symbench.toml");
        std::fs::write(&path, "[tool\ncommand = 3").unwrap();
        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_parse_timeout_units() {
        assert_eq!(parse_timeout("4h").unwrap(), Duration::from_secs(4 * 3600));
        assert_eq!(parse_timeout("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_timeout("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_timeout("1m 30s").unwrap(), Duration::from_secs(90));
    }

    #[test]
    fn test_parse_timeout_bare_seconds() {
        assert_eq!(parse_timeout("10").unwrap(), Duration::from_secs(10));
        assert_eq!(parse_timeout("0.5").unwrap(), Duration::from_millis(500));
    }

    #[test]
    fn test_parse_timeout_rejects_garbage_and_zero() {
        assert!(parse_timeout("soon").is_err());
        assert!(parse_timeout("0").is_err());
        assert!(parse_timeout("-3").is_err());
    }

    #[test]
    fn test_validate_optimize_command() {
        assert!(validate_optimize_command("runsc resyn2").is_ok());
        assert!(validate_optimize_command("strash; dc2").is_ok());
        assert!(validate_optimize_command("a\nb").is_err());
        assert!(validate_optimize_command("echo \"x\"").is_err());
    }

    #[test]
    fn test_validate_threshold() {
        assert!(validate_threshold("0.05").is_ok());
        assert!(validate_threshold("1e-3").is_ok());
        for bad in ["", "0.1;2", "0.1\n", "a/b", "a\\b", "0.1 0.2"] {
            assert!(
                matches!(validate_threshold(bad), Err(ConfigError::Threshold(_))),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn test_anchored_joins_only_relative_paths() {
        let paths = PathsConfig {
            networks_dir: PathBuf::from("/data/networks"),
            ..Default::default()
        };
        let anchored = paths.anchored(Path::new("/work/abc"));
        assert_eq!(anchored.networks_dir, PathBuf::from("/data/networks"));
        assert_eq!(
            anchored.preprocessed_dir,
            PathBuf::from("/work/abc/benchmark/preprocessed")
        );
        assert_eq!(
            anchored.compwise_dir,
            PathBuf::from("/work/abc/benchmark/compwise")
        );
    }
}
