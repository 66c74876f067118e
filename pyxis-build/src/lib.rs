//! pyxis build
//!
//! Turns a set of requested modules into checked results: resolves imports,
//! orders the import graph into SCCs, runs the checker on each SCC in
//! dependency order and keeps an incremental cache between runs.

pub mod build;
pub mod cache;
pub mod fingerprint;
pub mod graph;
pub mod options;
pub mod resolver;

// Re-export main types
pub use build::{
    module_name_for_path, BuildError, BuildManager, BuildResult, BuildSource, ModuleRecord, ModuleResult,
};
pub use cache::{CacheEntry, CacheError, CacheStore, JsonFileStore, MemoryStore, NoCache, ReanalyzeReason};
pub use fingerprint::Fingerprint;
pub use graph::{DependencyEdge, ModuleGraph};
pub use options::{FollowImports, Options, OptionsError};
pub use resolver::{FileSystemResolver, ImportResolver, MemoryResolver, ModuleLocation};

use std::path::PathBuf;
use std::sync::Arc;

pub type Result<T> = std::result::Result<T, BuildError>;

/// Check `sources` with files found on disk and the on-disk cache
pub fn build(sources: &[BuildSource], options: Options) -> Result<BuildResult> {
    let resolver = FileSystemResolver::new(search_roots(sources, &options));
    let store: Arc<dyn CacheStore> = if options.incremental {
        Arc::new(JsonFileStore::new(options.cache_dir.clone()))
    } else {
        Arc::new(NoCache)
    };
    BuildManager::new(options, Arc::new(resolver), store).build(sources)
}

/// Directories imports are looked up in: configured search paths, the
/// directory each requested file's top-level package lives in, then the
/// working directory
pub fn search_roots(sources: &[BuildSource], options: &Options) -> Vec<PathBuf> {
    let mut roots = options.search_paths.clone();
    for source in sources {
        let Some(path) = &source.path else {
            continue;
        };
        let mut depth = source.module.split('.').count();
        if path.file_stem().map_or(false, |s| s == "__init__") {
            depth += 1;
        }
        if let Some(root) = path.ancestors().nth(depth) {
            let root = if root.as_os_str().is_empty() {
                PathBuf::from(".")
            } else {
                root.to_path_buf()
            };
            if !roots.contains(&root) {
                roots.push(root);
            }
        }
    }
    let cwd = PathBuf::from(".");
    if !roots.contains(&cwd) {
        roots.push(cwd);
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_roots() {
        let mut options = Options::default();
        options.search_paths = vec![PathBuf::from("stubs")];
        let sources = vec![
            BuildSource {
                module: "pkg.sub.mod".to_string(),
                path: Some(PathBuf::from("src/pkg/sub/mod.py")),
                text: None,
            },
            BuildSource {
                module: "other".to_string(),
                path: Some(PathBuf::from("src/other/__init__.py")),
                text: None,
            },
            BuildSource {
                module: "top".to_string(),
                path: Some(PathBuf::from("top.py")),
                text: None,
            },
            BuildSource::text("__main__", "x = 1\n"),
        ];
        assert_eq!(
            search_roots(&sources, &options),
            vec![PathBuf::from("stubs"), PathBuf::from("src"), PathBuf::from(".")]
        );
    }
}
