//! Configuration file discovery

use anyhow::{Context, Result};
use pyxis_build::Options;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "pyxis.toml";

/// Load options from `explicit`, or from the first config file found;
/// defaults when there is none
pub fn load_options(explicit: Option<&Path>) -> Result<Options> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => find_config_file(Path::new(".")),
    };
    let Some(path) = path else {
        debug!("no config file found; using defaults");
        return Ok(Options::default());
    };
    debug!(path = %path.display(), "loading config file");
    Options::from_file(&path).with_context(|| format!("Failed to load config file: {}", path.display()))
}

/// `pyxis.toml` in `dir`, then the user-wide file
pub fn find_config_file(dir: &Path) -> Option<PathBuf> {
    let local = dir.join(CONFIG_FILE_NAME);
    if local.is_file() {
        return Some(local);
    }
    user_config_path().filter(|path| path.is_file())
}

fn user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("pyxis").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyxis_build::FollowImports;
    use tempfile::TempDir;

    #[test]
    fn test_local_config_file_is_found() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "follow_imports = \"silent\"\njobs = 3\n").unwrap();

        assert_eq!(find_config_file(temp_dir.path()), Some(path.clone()));
        let options = load_options(Some(&path)).unwrap();
        assert_eq!(options.follow_imports, FollowImports::Silent);
        assert_eq!(options.jobs, 3);
        assert_eq!(options.config_file, Some(path));
    }

    #[test]
    fn test_bad_config_file_names_the_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("broken.toml");
        std::fs::write(&path, "jobs = \"many\"\n").unwrap();

        let message = format!("{:#}", load_options(Some(&path)).unwrap_err());
        assert!(message.contains("broken.toml"), "{}", message);
    }
}
