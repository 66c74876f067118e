//! Command line parsing
//!
//! Flags override the values loaded from the config file; the result is the
//! list of requested sources plus the final [`Options`].

use crate::config::load_options;
use anyhow::{bail, Context, Result};
use clap::Parser;
use pyxis_build::options::{format_version, parse_python_version};
use pyxis_build::{BuildSource, FollowImports, Options};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// pyxis - static type checker for Python programs
#[derive(Parser, Debug)]
#[command(name = "pyxis")]
#[command(about = "Static type checker for Python programs")]
#[command(version)]
pub struct Cli {
    /// Files, directories or module names to check
    #[arg(value_name = "FILES|MODULES")]
    pub targets: Vec<String>,

    /// Check a module by name
    #[arg(short = 'm', long = "module", value_name = "MODULE")]
    pub modules: Vec<String>,

    /// Check a program passed in as a string
    #[arg(short = 'c', long = "command", value_name = "PROGRAM", conflicts_with_all = ["targets", "modules"])]
    pub command: Option<String>,

    /// Read options from this file instead of pyxis.toml
    #[arg(long, value_name = "FILE")]
    pub config_file: Option<PathBuf>,

    /// Target language version, e.g. 3.9
    #[arg(long, value_name = "X.Y", value_parser = parse_python_version)]
    pub python_version: Option<(u32, u32)>,

    /// Interpreter whose version is targeted
    #[arg(long, value_name = "EXECUTABLE")]
    pub python_executable: Option<PathBuf>,

    /// Do not look for an interpreter on PATH
    #[arg(long)]
    pub no_site_packages: bool,

    #[arg(long, overrides_with = "no_strict_optional")]
    pub strict_optional: bool,

    /// Treat None as compatible with every type
    #[arg(long, overrides_with = "strict_optional")]
    pub no_strict_optional: bool,

    /// How to treat imports of modules not named on the command line
    #[arg(long, value_name = "normal|silent|skip|error")]
    pub follow_imports: Option<FollowImports>,

    /// Do not report imports that cannot be resolved
    #[arg(long)]
    pub ignore_missing_imports: bool,

    #[arg(long, overrides_with = "no_incremental")]
    pub incremental: bool,

    /// Analyze every module from scratch and write no cache
    #[arg(long, overrides_with = "incremental")]
    pub no_incremental: bool,

    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Number of analysis workers
    #[arg(short = 'j', long, value_name = "N")]
    pub jobs: Option<usize>,

    /// Extra semantic analysis passes allowed per import cycle
    #[arg(long, value_name = "N")]
    pub extra_pass_budget: Option<u32>,

    /// Additional module search root; may be repeated
    #[arg(long = "search-path", value_name = "DIR")]
    pub search_paths: Vec<PathBuf>,

    #[arg(long)]
    pub show_column_numbers: bool,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long)]
    pub no_color: bool,
}

/// Python executable inference errors
#[derive(Debug, thiserror::Error)]
pub enum PythonExecutableInferenceError {
    #[error(
        "Python version {requested:?} did not match executable {}, got version {found:?}.",
        .executable.display()
    )]
    VersionMismatch {
        requested: (u32, u32),
        executable: PathBuf,
        found: (u32, u32),
    },

    #[error("Failed to probe Python executable {}: {message}", .executable.display())]
    Probe { executable: PathBuf, message: String },
}

/// Asks an interpreter for its version and finds interpreters on `PATH`
pub trait VersionProbe {
    fn version_of(&self, executable: &Path) -> Result<(u32, u32), PythonExecutableInferenceError>;

    fn find_executable(&self, version: (u32, u32)) -> Option<PathBuf>;
}

/// Runs real interpreters
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl VersionProbe for SystemProbe {
    fn version_of(&self, executable: &Path) -> Result<(u32, u32), PythonExecutableInferenceError> {
        let probe_error = |message: String| PythonExecutableInferenceError::Probe {
            executable: executable.to_path_buf(),
            message,
        };
        let output = Command::new(executable)
            .args(["-c", "import sys; print('%d.%d' % sys.version_info[:2])"])
            .output()
            .map_err(|e| probe_error(e.to_string()))?;
        if !output.status.success() {
            return Err(probe_error(format!("exited with {}", output.status)));
        }
        let text = String::from_utf8_lossy(&output.stdout);
        parse_python_version(&text).map_err(|e| probe_error(e.to_string()))
    }

    fn find_executable(&self, version: (u32, u32)) -> Option<PathBuf> {
        let name = format!("python{}", format_version(version));
        let path = std::env::var_os("PATH")?;
        std::env::split_paths(&path)
            .map(|dir| dir.join(&name))
            .find(|candidate| candidate.is_file())
    }
}

/// Values given explicitly on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplicitFlags {
    pub python_version: Option<(u32, u32)>,
    pub python_executable: Option<PathBuf>,
}

/// Make `python_version` and `python_executable` agree
pub fn infer_python_version_and_executable(
    options: &mut Options,
    special: &ExplicitFlags,
    probe: &dyn VersionProbe,
) -> Result<(), PythonExecutableInferenceError> {
    match (special.python_version, &special.python_executable) {
        (Some(requested), Some(executable)) => {
            let found = probe.version_of(executable)?;
            if found != requested {
                return Err(PythonExecutableInferenceError::VersionMismatch {
                    requested,
                    executable: executable.clone(),
                    found,
                });
            }
            options.python_version = requested;
            options.python_executable = Some(executable.clone());
        }
        (None, Some(executable)) => {
            options.python_version = probe.version_of(executable)?;
            options.python_executable = Some(executable.clone());
        }
        (Some(requested), None) => {
            options.python_version = requested;
            options.python_executable = if options.no_site_packages {
                None
            } else {
                probe.find_executable(requested)
            };
        }
        (None, None) => {}
    }
    debug!(
        version = %format_version(options.python_version),
        executable = ?options.python_executable,
        "python target"
    );
    Ok(())
}

impl Cli {
    pub fn parse_args<I, T>(argv: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let argv = std::iter::once(OsString::from("pyxis")).chain(argv.into_iter().map(Into::into));
        Cli::try_parse_from(argv)
    }

    /// Apply the flags on top of options loaded from a config file
    pub fn apply(&self, options: &mut Options) {
        if self.no_site_packages {
            options.no_site_packages = true;
        }
        if self.strict_optional {
            options.strict_optional = true;
        }
        if self.no_strict_optional {
            options.strict_optional = false;
        }
        if let Some(mode) = self.follow_imports {
            options.follow_imports = mode;
        }
        if self.ignore_missing_imports {
            options.ignore_missing_imports = true;
        }
        if self.incremental {
            options.incremental = true;
        }
        if self.no_incremental {
            options.incremental = false;
        }
        if let Some(dir) = &self.cache_dir {
            options.cache_dir = dir.clone();
        }
        if let Some(jobs) = self.jobs {
            options.jobs = jobs;
        }
        if let Some(budget) = self.extra_pass_budget {
            options.extra_pass_budget = budget;
        }
        options.search_paths.extend(self.search_paths.iter().cloned());
        if self.show_column_numbers {
            options.show_column_numbers = true;
        }
    }

    fn explicit_flags(&self) -> ExplicitFlags {
        ExplicitFlags {
            python_version: self.python_version,
            python_executable: self.python_executable.clone(),
        }
    }

    /// Requested sources in command line order
    pub fn sources(&self) -> Result<Vec<BuildSource>> {
        if let Some(program) = &self.command {
            return Ok(vec![BuildSource::text("__main__", program.clone())]);
        }
        let mut sources = Vec::new();
        for target in &self.targets {
            let path = Path::new(target);
            if path.is_dir() {
                sources.extend(find_sources(path)?.into_iter().map(BuildSource::file));
            } else if path.is_file() || target.ends_with(".py") || target.ends_with(".pyi") {
                sources.push(BuildSource::file(path));
            } else {
                sources.push(BuildSource::module(target.clone()));
            }
        }
        sources.extend(self.modules.iter().map(|m| BuildSource::module(m.clone())));
        Ok(sources)
    }
}

/// `.py` and `.pyi` files below `dir`, sorted; a stub hides the source file
/// next to it and hidden directories are skipped
pub fn find_sources(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .collect();
    entries.sort();
    for path in &entries {
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        if name.starts_with('.') || name == "__pycache__" {
            continue;
        }
        if path.is_dir() {
            found.extend(find_sources(path)?);
            continue;
        }
        match path.extension().and_then(|e| e.to_str()) {
            Some("pyi") => found.push(path.clone()),
            Some("py") if !path.with_extension("pyi").is_file() => found.push(path.clone()),
            _ => {}
        }
    }
    Ok(found)
}

/// Parse `argv` (without the program name) into sources and options
#[allow(dead_code)]
pub fn process_options<I, T>(argv: I, require_targets: bool) -> Result<(Vec<BuildSource>, Options)>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = Cli::parse_args(argv)?;
    process_cli(&cli, require_targets, &SystemProbe)
}

pub fn process_cli(cli: &Cli, require_targets: bool, probe: &dyn VersionProbe) -> Result<(Vec<BuildSource>, Options)> {
    let mut options = load_options(cli.config_file.as_deref())?;
    cli.apply(&mut options);
    infer_python_version_and_executable(&mut options, &cli.explicit_flags(), probe)?;
    options.validate()?;

    let sources = cli.sources()?;
    if require_targets && sources.is_empty() {
        bail!("Missing target module, package, files, or command.");
    }
    Ok((sources, options))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    /// Answers with a fixed version and never finds anything on PATH
    struct FixedProbe((u32, u32));

    impl VersionProbe for FixedProbe {
        fn version_of(&self, _executable: &Path) -> Result<(u32, u32), PythonExecutableInferenceError> {
            Ok(self.0)
        }

        fn find_executable(&self, version: (u32, u32)) -> Option<PathBuf> {
            Some(PathBuf::from(format!("/usr/bin/python{}", format_version(version))))
        }
    }

    fn parse(argv: &[&str]) -> Cli {
        Cli::parse_args(argv.iter().copied()).unwrap()
    }

    #[test]
    fn test_empty_command_line_matches_defaults() {
        let (sources, options) = process_cli(&parse(&[]), false, &FixedProbe((3, 11))).unwrap();
        assert!(sources.is_empty());
        let mut expected = Options::default();
        expected.config_file = options.config_file.clone();
        if expected.config_file.is_none() {
            assert_eq!(options.snapshot(), expected.snapshot());
        }
    }

    #[test]
    fn test_flags_override_options() {
        let cli = parse(&[
            "--no-strict-optional",
            "--follow-imports",
            "skip",
            "--no-incremental",
            "-j",
            "4",
            "--search-path",
            "lib",
            "--show-column-numbers",
            "--ignore-missing-imports",
            "--extra-pass-budget",
            "5",
        ]);
        let mut options = Options::default();
        cli.apply(&mut options);
        assert!(!options.strict_optional);
        assert_eq!(options.follow_imports, FollowImports::Skip);
        assert!(!options.incremental);
        assert_eq!(options.jobs, 4);
        assert_eq!(options.search_paths, vec![PathBuf::from("lib")]);
        assert!(options.show_column_numbers && options.ignore_missing_imports);
        assert_eq!(options.extra_pass_budget, 5);

        // the last of a flag pair wins
        let cli = parse(&["--no-strict-optional", "--strict-optional"]);
        let mut options = Options::default();
        options.strict_optional = false;
        cli.apply(&mut options);
        assert!(options.strict_optional);
    }

    #[test]
    fn test_bad_flag_values_are_usage_errors() {
        assert!(Cli::parse_args(["--follow-imports", "sometimes"]).is_err());
        assert!(Cli::parse_args(["--python-version", "three"]).is_err());
        assert!(Cli::parse_args(["-c", "x = 1", "main.py"]).is_err());
        assert_eq!(parse(&["--python-version", "3.9"]).python_version, Some((3, 9)));
    }

    #[test]
    fn test_version_and_executable_must_agree() {
        let mut options = Options::default();
        let special = ExplicitFlags {
            python_version: Some((2, 10)),
            python_executable: Some(PathBuf::from("/path")),
        };
        let err = infer_python_version_and_executable(&mut options, &special, &FixedProbe((3, 11))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Python version (2, 10) did not match executable /path, got version (3, 11)."
        );

        let special = ExplicitFlags {
            python_version: Some((3, 11)),
            python_executable: Some(PathBuf::from("/path")),
        };
        infer_python_version_and_executable(&mut options, &special, &FixedProbe((3, 11))).unwrap();
        assert_eq!(options.python_executable, Some(PathBuf::from("/path")));
    }

    #[test]
    fn test_executable_sets_version() {
        let mut options = Options::default();
        let special = ExplicitFlags {
            python_version: None,
            python_executable: Some(PathBuf::from("/opt/python")),
        };
        infer_python_version_and_executable(&mut options, &special, &FixedProbe((3, 8))).unwrap();
        assert_eq!(options.python_version, (3, 8));
    }

    #[test]
    fn test_version_finds_executable_unless_no_site_packages() {
        let special = ExplicitFlags {
            python_version: Some((3, 9)),
            python_executable: None,
        };
        let mut options = Options::default();
        infer_python_version_and_executable(&mut options, &special, &FixedProbe((3, 9))).unwrap();
        assert_eq!(options.python_executable, Some(PathBuf::from("/usr/bin/python3.9")));

        let mut options = Options {
            no_site_packages: true,
            ..Options::default()
        };
        infer_python_version_and_executable(&mut options, &special, &FixedProbe((3, 9))).unwrap();
        assert_eq!(options.python_version, (3, 9));
        assert_eq!(options.python_executable, None);
    }

    #[test]
    fn test_sources() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        std::fs::create_dir_all(root.join("pkg").join(".hidden")).unwrap();
        std::fs::write(root.join("pkg").join("__init__.py"), "").unwrap();
        std::fs::write(root.join("pkg").join("a.py"), "").unwrap();
        std::fs::write(root.join("pkg").join("b.py"), "").unwrap();
        std::fs::write(root.join("pkg").join("b.pyi"), "").unwrap();
        std::fs::write(root.join("pkg").join(".hidden").join("c.py"), "").unwrap();
        std::fs::write(root.join("pkg").join("notes.txt"), "").unwrap();

        let pkg = root.join("pkg");
        let cli = parse(&[pkg.to_str().unwrap(), "some.module", "-m", "other"]);
        let sources = cli.sources().unwrap();
        let modules: Vec<&str> = sources.iter().map(|s| s.module.as_str()).collect();
        assert_eq!(modules, vec!["pkg", "pkg.a", "pkg.b", "some.module", "other"]);
        assert_eq!(sources[2].path, Some(pkg.join("b.pyi")));

        let cli = parse(&["-c", "x = 1"]);
        assert_eq!(cli.sources().unwrap(), vec![BuildSource::text("__main__", "x = 1")]);
    }

    #[test]
    fn test_process_options() {
        let (sources, options) = process_options(["-c", "x = 1", "--python-version", "3.9", "--no-site-packages"], true)
            .unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(options.python_version, (3, 9));
        assert_eq!(options.python_executable, None);

        let err = process_options(["--jobs", "0", "-m", "m"], true).unwrap_err();
        assert!(err.downcast_ref::<pyxis_build::OptionsError>().is_some());
        assert!(process_options(["--bogus"], false)
            .unwrap_err()
            .downcast_ref::<clap::Error>()
            .is_some());
    }

    #[test]
    fn test_targets_required() {
        let err = process_cli(&parse(&[]), true, &FixedProbe((3, 11))).unwrap_err();
        assert_eq!(err.to_string(), "Missing target module, package, files, or command.");
    }
}
