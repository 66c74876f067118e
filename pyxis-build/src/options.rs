//! Build options
//!
//! One flat, serde-friendly struct read from a TOML file and then overridden
//! by command line flags. Options are read-only while a build runs.

use pyxis_checker::AnalysisOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How imports of modules not named on the command line are handled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FollowImports {
    /// Analyze and report like any other module
    #[default]
    Normal,
    /// Analyze but hide the module's own diagnostics
    Silent,
    /// Treat the module as an `Any` stub
    Skip,
    /// Like `Skip`, and report the import
    Error,
}

impl FollowImports {
    pub fn as_str(&self) -> &'static str {
        match self {
            FollowImports::Normal => "normal",
            FollowImports::Silent => "silent",
            FollowImports::Skip => "skip",
            FollowImports::Error => "error",
        }
    }

    /// Whether imported (non-root) modules are loaded at all
    pub fn follows(&self) -> bool {
        matches!(self, FollowImports::Normal | FollowImports::Silent)
    }
}

impl fmt::Display for FollowImports {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FollowImports {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(FollowImports::Normal),
            "silent" => Ok(FollowImports::Silent),
            "skip" => Ok(FollowImports::Skip),
            "error" => Ok(FollowImports::Error),
            other => Err(OptionsError::Invalid {
                field: "follow_imports".to_string(),
                message: format!("unknown value \"{}\" (expected normal, silent, skip or error)", other),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Options {
    /// Target language version, written `"3.11"` in option files
    #[serde(default = "default_python_version", with = "version_format")]
    pub python_version: (u32, u32),

    /// Interpreter used to infer the version
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub python_executable: Option<PathBuf>,

    #[serde(default)]
    pub no_site_packages: bool,

    #[serde(default = "default_true")]
    pub strict_optional: bool,

    #[serde(default)]
    pub follow_imports: FollowImports,

    #[serde(default)]
    pub ignore_missing_imports: bool,

    #[serde(default = "default_true")]
    pub incremental: bool,

    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Worker count
    #[serde(default = "default_jobs")]
    pub jobs: usize,

    #[serde(default = "default_extra_pass_budget")]
    pub extra_pass_budget: u32,

    /// Extra roots searched for modules, before the working directory
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    #[serde(default)]
    pub show_column_numbers: bool,

    /// The file these options were loaded from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_file: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            python_version: default_python_version(),
            python_executable: None,
            no_site_packages: false,
            strict_optional: default_true(),
            follow_imports: FollowImports::default(),
            ignore_missing_imports: false,
            incremental: default_true(),
            cache_dir: default_cache_dir(),
            jobs: default_jobs(),
            extra_pass_budget: default_extra_pass_budget(),
            search_paths: Vec::new(),
            show_column_numbers: false,
            config_file: None,
        }
    }
}

impl Options {
    /// Load options from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, OptionsError> {
        let content = std::fs::read_to_string(path).map_err(|error| OptionsError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        let mut options: Options = toml::from_str(&content).map_err(|error| OptionsError::Parse {
            path: path.to_path_buf(),
            error,
        })?;
        options.config_file = Some(path.to_path_buf());
        options.validate()?;
        Ok(options)
    }

    /// Save options to a TOML file
    pub fn to_file(&self, path: &Path) -> Result<(), OptionsError> {
        let content = toml::to_string_pretty(self).map_err(|error| OptionsError::Serialize { error })?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|error| OptionsError::Io {
                path: parent.to_path_buf(),
                error,
            })?;
        }
        std::fs::write(path, content).map_err(|error| OptionsError::Io {
            path: path.to_path_buf(),
            error,
        })
    }

    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.jobs == 0 {
            return Err(OptionsError::Invalid {
                field: "jobs".to_string(),
                message: "at least one worker is required".to_string(),
            });
        }
        let (major, minor) = self.python_version;
        if major != 3 || minor < 7 {
            return Err(OptionsError::Invalid {
                field: "python_version".to_string(),
                message: format!("{}.{} is not supported (3.7 or newer required)", major, minor),
            });
        }
        Ok(())
    }

    /// Every option as a JSON value, keyed by field name
    pub fn snapshot(&self) -> BTreeMap<String, serde_json::Value> {
        let mut snapshot = match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
            _ => BTreeMap::new(),
        };
        // skipped when unset, but part of the snapshot all the same
        for key in ["python_executable", "config_file"] {
            snapshot.entry(key.to_string()).or_insert(serde_json::Value::Null);
        }
        snapshot
    }

    /// Options whose values feed module fingerprints
    pub fn fingerprint_flags(&self) -> Vec<(&'static str, String)> {
        vec![
            ("python_version", format_version(self.python_version)),
            ("strict_optional", self.strict_optional.to_string()),
            ("follow_imports", self.follow_imports.to_string()),
            ("extra_pass_budget", self.extra_pass_budget.to_string()),
        ]
    }

    /// The subset the analyzer needs
    pub fn analysis_options(&self) -> AnalysisOptions {
        AnalysisOptions {
            python_version: self.python_version,
            strict_optional: self.strict_optional,
            extra_pass_budget: self.extra_pass_budget,
        }
    }
}

/// Parse a version written as `3.11`
pub fn parse_python_version(text: &str) -> Result<(u32, u32), OptionsError> {
    let invalid = || OptionsError::InvalidVersion(text.to_string());
    let (major, minor) = text.trim().split_once('.').ok_or_else(invalid)?;
    let major = major.parse().map_err(|_| invalid())?;
    let minor = minor.parse().map_err(|_| invalid())?;
    Ok((major, minor))
}

pub fn format_version(version: (u32, u32)) -> String {
    format!("{}.{}", version.0, version.1)
}

mod version_format {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(version: &(u32, u32), serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_version(*version))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<(u32, u32), D::Error> {
        let text = String::deserialize(deserializer)?;
        super::parse_python_version(&text).map_err(de::Error::custom)
    }
}

// Default value functions
fn default_python_version() -> (u32, u32) {
    (3, 11)
}

fn default_true() -> bool {
    true
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".pyxis_cache")
}

fn default_jobs() -> usize {
    1
}

fn default_extra_pass_budget() -> u32 {
    2
}

/// Option loading errors
#[derive(Debug, thiserror::Error)]
pub enum OptionsError {
    #[error("I/O error for {path:?}: {error}")]
    Io { path: PathBuf, error: std::io::Error },

    #[error("Parse error for {path:?}: {error}")]
    Parse { path: PathBuf, error: toml::de::Error },

    #[error("Serialization error: {error}")]
    Serialize { error: toml::ser::Error },

    #[error("Invalid Python version \"{0}\" (expected MAJOR.MINOR)")]
    InvalidVersion(String),

    #[error("Invalid configuration for {field}: {message}")]
    Invalid { field: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_options() {
        let options = Options::default();
        assert_eq!(options.python_version, (3, 11));
        assert!(options.strict_optional);
        assert_eq!(options.follow_imports, FollowImports::Normal);
        assert_eq!(options.jobs, 1);
        assert!(options.validate().is_ok());
        assert_eq!(options.analysis_options(), AnalysisOptions::default());
    }

    #[test]
    fn test_options_file_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pyxis.toml");

        let mut options = Options::default();
        options.python_version = (3, 9);
        options.follow_imports = FollowImports::Silent;
        options.search_paths = vec![PathBuf::from("lib")];
        options.to_file(&path).unwrap();

        let loaded = Options::from_file(&path).unwrap();
        assert_eq!(loaded.python_version, (3, 9));
        assert_eq!(loaded.follow_imports, FollowImports::Silent);
        assert_eq!(loaded.search_paths, vec![PathBuf::from("lib")]);
        assert_eq!(loaded.config_file.as_deref(), Some(path.as_path()));
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pyxis.toml");
        std::fs::write(&path, "python_version = \"3.10\"\nfollow_imports = \"skip\"\n").unwrap();

        let loaded = Options::from_file(&path).unwrap();
        let mut expected = Options::default();
        expected.python_version = (3, 10);
        expected.follow_imports = FollowImports::Skip;
        expected.config_file = Some(path.clone());
        assert_eq!(loaded, expected);
    }

    #[test]
    fn test_invalid_files_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("pyxis.toml");

        std::fs::write(&path, "python_version = \"three\"\n").unwrap();
        assert!(matches!(Options::from_file(&path), Err(OptionsError::Parse { .. })));

        std::fs::write(&path, "jobs = 0\n").unwrap();
        assert!(matches!(Options::from_file(&path), Err(OptionsError::Invalid { .. })));

        let missing = temp_dir.path().join("missing.toml");
        assert!(matches!(Options::from_file(&missing), Err(OptionsError::Io { .. })));
    }

    #[test]
    fn test_snapshot_covers_every_field() {
        let snapshot = Options::default().snapshot();
        for key in [
            "python_version",
            "python_executable",
            "no_site_packages",
            "strict_optional",
            "follow_imports",
            "ignore_missing_imports",
            "incremental",
            "cache_dir",
            "jobs",
            "extra_pass_budget",
            "search_paths",
            "show_column_numbers",
            "config_file",
        ] {
            assert!(snapshot.contains_key(key), "{}", key);
        }
        assert_eq!(snapshot["python_version"], serde_json::json!("3.11"));
        assert_eq!(snapshot["python_executable"], serde_json::Value::Null);
    }

    #[test]
    fn test_fingerprint_flags() {
        let mut options = Options::default();
        let before = options.fingerprint_flags();
        options.jobs = 8;
        options.show_column_numbers = true;
        assert_eq!(before, options.fingerprint_flags());
        options.strict_optional = false;
        assert_ne!(before, options.fingerprint_flags());

        let mut budget = Options::default();
        budget.extra_pass_budget += 8;
        assert_ne!(Options::default().fingerprint_flags(), budget.fingerprint_flags());
    }

    #[test]
    fn test_parse_python_version() {
        assert_eq!(parse_python_version("3.8").unwrap(), (3, 8));
        assert_eq!(parse_python_version(" 3.12 ").unwrap(), (3, 12));
        assert!(parse_python_version("3").is_err());
        assert!(parse_python_version("3.x").is_err());
        assert_eq!("silent".parse::<FollowImports>().unwrap(), FollowImports::Silent);
        assert!("sometimes".parse::<FollowImports>().is_err());
    }
}
