//! pyxis - incremental static type checker for a Python-like language
//!
//! The workspace is split the way the pipeline runs:
//!
//! - [`syntax`]: lexer, parser and syntax tree
//! - [`checker`]: semantic analysis and type checking of one import cycle
//! - [`build`]: import resolution, SCC scheduling and the incremental cache
//!
//! This crate re-exports all three and adds a one-call entry point for
//! checking a program held in memory.

pub use pyxis_build as build;
pub use pyxis_checker as checker;
pub use pyxis_syntax as syntax;

pub use pyxis_build::{
    BuildError, BuildManager, BuildResult, BuildSource, FollowImports, MemoryResolver, ModuleResult, Options,
};
pub use pyxis_checker::{Diagnostic, DiagnosticKind, Severity};

use pyxis_build::NoCache;
use std::sync::Arc;

/// Check in-memory modules; `roots` are checked, the rest only when imported
///
/// ```
/// let result = pyxis::check_modules(
///     &[("util", "def twice(x: int) -> int:\n    return x * 2\n"), ("app", "from util import twice\n\ny: str = twice(2)\n")],
///     &["app"],
///     pyxis::Options::default(),
/// )
/// .unwrap();
/// assert_eq!(result.error_count(), 1);
/// assert_eq!(result.diagnostics[0].module, "app");
/// ```
pub fn check_modules(modules: &[(&str, &str)], roots: &[&str], options: Options) -> Result<BuildResult, BuildError> {
    let mut resolver = MemoryResolver::new();
    for (name, source) in modules {
        resolver.insert(name, source, false);
    }
    let sources: Vec<BuildSource> = roots.iter().map(|m| BuildSource::module(*m)).collect();
    BuildManager::new(options, Arc::new(resolver), Arc::new(NoCache)).build(&sources)
}

/// Check a single program as module `__main__`
///
/// ```
/// let result = pyxis::check_program("x: int = 1\n", pyxis::Options::default()).unwrap();
/// assert!(!result.has_errors());
/// assert_eq!(result.exit_code(), 0);
/// ```
pub fn check_program(source: &str, options: Options) -> Result<BuildResult, BuildError> {
    BuildManager::new(options, Arc::new(MemoryResolver::new()), Arc::new(NoCache))
        .build(&[BuildSource::text("__main__", source)])
}
