//! Import resolution
//!
//! Maps a module name to the place its source lives. Resolution happens
//! while the module graph is built, never during analysis.

use std::collections::{BTreeMap, HashMap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::trace;

/// Where a module's source was found
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleLocation {
    pub module: String,
    pub path: PathBuf,
    /// `pkg/__init__.py`
    pub is_package: bool,
    /// `.pyi`
    pub is_stub: bool,
}

pub trait ImportResolver: Send + Sync {
    /// Find `module` as imported by `importer` (`None` for build roots)
    fn resolve(&self, importer: Option<&str>, module: &str) -> Option<ModuleLocation>;

    /// Read the source text at a resolved location
    fn read_source(&self, location: &ModuleLocation) -> io::Result<String>;
}

/// Searches directories for `a/b.pyi`, `a/b.py` or `a/b/__init__.py`
#[derive(Debug)]
pub struct FileSystemResolver {
    roots: Vec<PathBuf>,
    cache: Mutex<HashMap<String, Option<ModuleLocation>>>,
}

impl FileSystemResolver {
    pub fn new(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    fn search(&self, module: &str) -> Option<ModuleLocation> {
        let parts: Vec<&str> = module.split('.').collect();
        if parts.iter().any(|p| p.is_empty()) {
            return None;
        }
        for root in &self.roots {
            let base = parts.iter().fold(root.clone(), |dir, part| dir.join(part));
            // a package wins over a module of the same name, a stub over source
            for (file, is_stub) in [("__init__.pyi", true), ("__init__.py", false)] {
                let path = base.join(file);
                if path.is_file() {
                    return Some(ModuleLocation {
                        module: module.to_string(),
                        path,
                        is_package: true,
                        is_stub,
                    });
                }
            }
            for (ext, is_stub) in [("pyi", true), ("py", false)] {
                let path = base.with_extension(ext);
                if path.is_file() {
                    return Some(ModuleLocation {
                        module: module.to_string(),
                        path,
                        is_package: false,
                        is_stub,
                    });
                }
            }
        }
        None
    }
}

impl ImportResolver for FileSystemResolver {
    fn resolve(&self, importer: Option<&str>, module: &str) -> Option<ModuleLocation> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(found) = cache.get(module) {
            return found.clone();
        }
        let found = self.search(module);
        trace!(module, importer, found = ?found.as_ref().map(|l| &l.path), "resolved import");
        cache.insert(module.to_string(), found.clone());
        found
    }

    fn read_source(&self, location: &ModuleLocation) -> io::Result<String> {
        std::fs::read_to_string(&location.path)
    }
}

/// Module sources held in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryResolver {
    modules: BTreeMap<String, MemoryModule>,
}

#[derive(Debug, Clone)]
struct MemoryModule {
    source: String,
    is_package: bool,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_module(mut self, name: &str, source: &str) -> Self {
        self.insert(name, source, false);
        self
    }

    pub fn with_package(mut self, name: &str, source: &str) -> Self {
        self.insert(name, source, true);
        self
    }

    pub fn insert(&mut self, name: &str, source: &str, is_package: bool) {
        self.modules.insert(
            name.to_string(),
            MemoryModule {
                source: source.to_string(),
                is_package,
            },
        );
    }

    pub fn remove(&mut self, name: &str) {
        self.modules.remove(name);
    }
}

fn virtual_path(module: &str, is_package: bool) -> PathBuf {
    let base = Path::new("").join(module.replace('.', "/"));
    if is_package {
        base.join("__init__.py")
    } else {
        base.with_extension("py")
    }
}

impl ImportResolver for MemoryResolver {
    fn resolve(&self, _importer: Option<&str>, module: &str) -> Option<ModuleLocation> {
        self.modules.get(module).map(|m| ModuleLocation {
            module: module.to_string(),
            path: virtual_path(module, m.is_package),
            is_package: m.is_package,
            is_stub: false,
        })
    }

    fn read_source(&self, location: &ModuleLocation) -> io::Result<String> {
        self.modules
            .get(&location.module)
            .map(|m| m.source.clone())
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("no module named {}", location.module)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, "").unwrap();
    }

    #[test]
    fn test_file_system_lookup_order() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        touch(root, "plain.py");
        touch(root, "stubbed.py");
        touch(root, "stubbed.pyi");
        touch(root, "pkg/__init__.py");
        touch(root, "pkg/sub.py");

        let resolver = FileSystemResolver::new(vec![root.to_path_buf()]);

        let plain = resolver.resolve(None, "plain").unwrap();
        assert_eq!(plain.path, root.join("plain.py"));
        assert!(!plain.is_package && !plain.is_stub);

        let stubbed = resolver.resolve(Some("plain"), "stubbed").unwrap();
        assert_eq!(stubbed.path, root.join("stubbed.pyi"));
        assert!(stubbed.is_stub);

        let pkg = resolver.resolve(None, "pkg").unwrap();
        assert!(pkg.is_package);
        assert_eq!(pkg.path, root.join("pkg").join("__init__.py"));
        assert_eq!(resolver.resolve(None, "pkg.sub").unwrap().path, root.join("pkg").join("sub.py"));

        assert!(resolver.resolve(None, "missing").is_none());
        assert!(resolver.resolve(None, "pkg..sub").is_none());
    }

    #[test]
    fn test_file_system_results_are_memoised() {
        let temp_dir = TempDir::new().unwrap();
        let resolver = FileSystemResolver::new(vec![temp_dir.path().to_path_buf()]);
        assert!(resolver.resolve(None, "late").is_none());
        touch(temp_dir.path(), "late.py");
        assert!(resolver.resolve(None, "late").is_none());
        assert!(FileSystemResolver::new(vec![temp_dir.path().to_path_buf()])
            .resolve(None, "late")
            .is_some());
    }

    #[test]
    fn test_earlier_roots_win() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        touch(first.path(), "shared.py");
        touch(second.path(), "shared.py");
        touch(second.path(), "only_second.py");
        let resolver = FileSystemResolver::new(vec![first.path().to_path_buf(), second.path().to_path_buf()]);
        assert_eq!(resolver.resolve(None, "shared").unwrap().path, first.path().join("shared.py"));
        assert!(resolver.resolve(None, "only_second").is_some());
    }

    #[test]
    fn test_memory_resolver() {
        let resolver = MemoryResolver::new()
            .with_module("a", "x = 1\n")
            .with_package("pkg", "");
        let a = resolver.resolve(None, "a").unwrap();
        assert_eq!(a.path, PathBuf::from("a.py"));
        assert_eq!(resolver.read_source(&a).unwrap(), "x = 1\n");
        assert_eq!(resolver.resolve(None, "pkg").unwrap().path, PathBuf::from("pkg/__init__.py"));
        assert!(resolver.resolve(None, "b").is_none());
    }
}
