//! Incremental cache
//!
//! After a module is analyzed its table, interface, diagnostics and the
//! interface hashes of everything it depends on are stored by module name.
//! On the next build a module is reused only if its fingerprint, its
//! dependency set and every dependency's interface hash are unchanged.
//! A missing, unreadable or outdated entry only means the module is analyzed
//! again.

use crate::fingerprint::Fingerprint;
use pyxis_checker::{AnalysisState, Diagnostic, InterfaceSummary, SymbolTable};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// Bumped whenever the entry layout or the analysis changes meaning
pub const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub version: u32,
    pub module: String,
    pub fingerprint: Fingerprint,
    /// Interface hash of every transitive dependency when the module was
    /// analyzed
    pub dependencies: BTreeMap<String, String>,
    pub state: AnalysisState,
    pub table: SymbolTable,
    pub interface: InterfaceSummary,
    pub interface_hash: String,
    /// Analysis diagnostics only; resolution diagnostics are recomputed
    pub diagnostics: Vec<Diagnostic>,
}

/// Why a module cannot be taken from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReanalyzeReason {
    NotCached,
    FingerprintChanged,
    DependenciesChanged,
    InterfaceChanged(String),
}

impl fmt::Display for ReanalyzeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReanalyzeReason::NotCached => write!(f, "not cached"),
            ReanalyzeReason::FingerprintChanged => write!(f, "fingerprint changed"),
            ReanalyzeReason::DependenciesChanged => write!(f, "dependency set changed"),
            ReanalyzeReason::InterfaceChanged(module) => write!(f, "interface of {} changed", module),
        }
    }
}

/// Decide whether the cached entry can stand in for analysis
///
/// `current` maps every transitive dependency to its interface hash in this
/// build.
pub fn reanalyze_reason(
    entry: Option<&CacheEntry>,
    fingerprint: &Fingerprint,
    current: &BTreeMap<String, String>,
) -> Option<ReanalyzeReason> {
    let Some(entry) = entry else {
        return Some(ReanalyzeReason::NotCached);
    };
    if entry.fingerprint != *fingerprint {
        return Some(ReanalyzeReason::FingerprintChanged);
    }
    if !entry.dependencies.keys().eq(current.keys()) {
        return Some(ReanalyzeReason::DependenciesChanged);
    }
    entry
        .dependencies
        .iter()
        .find(|(module, hash)| current.get(*module) != Some(*hash))
        .map(|(module, _)| ReanalyzeReason::InterfaceChanged(module.clone()))
}

pub fn should_reanalyze(
    entry: Option<&CacheEntry>,
    fingerprint: &Fingerprint,
    current: &BTreeMap<String, String>,
) -> bool {
    reanalyze_reason(entry, fingerprint, current).is_some()
}

/// Key-value storage of cache entries by module name
pub trait CacheStore: Send + Sync {
    fn get(&self, module: &str) -> Option<CacheEntry>;
    fn put(&self, module: &str, entry: &CacheEntry) -> Result<(), CacheError>;
}

/// Cache errors
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error for {path:?}: {error}")]
    Io { path: PathBuf, error: std::io::Error },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Disables caching: nothing is found, nothing is kept
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl CacheStore for NoCache {
    fn get(&self, _module: &str) -> Option<CacheEntry> {
        None
    }

    fn put(&self, _module: &str, _entry: &CacheEntry) -> Result<(), CacheError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, module: &str) -> Option<CacheEntry> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).remove(module)
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, module: &str) -> Option<CacheEntry> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.get(module).filter(|e| e.version == CACHE_VERSION).cloned()
    }

    fn put(&self, module: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(module.to_string(), entry.clone());
        Ok(())
    }
}

/// One `<module>.json` file per module under a cache directory
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, module: &str) -> PathBuf {
        self.dir.join(format!("{}.json", module))
    }
}

impl CacheStore for JsonFileStore {
    fn get(&self, module: &str) -> Option<CacheEntry> {
        let path = self.path_for(module);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(module, path = %path.display(), error = %e, "unreadable cache entry");
                return None;
            }
        };
        match serde_json::from_str::<CacheEntry>(&content) {
            Ok(entry) if entry.version == CACHE_VERSION && entry.module == module => Some(entry),
            Ok(entry) => {
                debug!(module, version = entry.version, "outdated cache entry");
                None
            }
            Err(e) => {
                warn!(module, path = %path.display(), error = %e, "corrupt cache entry");
                None
            }
        }
    }

    fn put(&self, module: &str, entry: &CacheEntry) -> Result<(), CacheError> {
        std::fs::create_dir_all(&self.dir).map_err(|error| CacheError::Io {
            path: self.dir.clone(),
            error,
        })?;
        let content = serde_json::to_string(entry)?;
        let path = self.path_for(module);
        let partial = path.with_extension("json.tmp");
        std::fs::write(&partial, content).map_err(|error| CacheError::Io {
            path: partial.clone(),
            error,
        })?;
        std::fs::rename(&partial, &path).map_err(|error| CacheError::Io { path, error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::Options;
    use pyxis_checker::{SymbolKind, SymbolNode};
    use tempfile::TempDir;

    fn entry(module: &str, source: &str, deps: &[(&str, &str)]) -> CacheEntry {
        let mut table = SymbolTable::new();
        table.declare(SymbolNode::new("x", format!("{}.x", module), SymbolKind::Variable, 1));
        let interface = InterfaceSummary::from_table(module, &table);
        CacheEntry {
            version: CACHE_VERSION,
            module: module.to_string(),
            fingerprint: Fingerprint::compute(source, &Options::default()),
            dependencies: deps.iter().map(|(m, h)| (m.to_string(), h.to_string())).collect(),
            state: AnalysisState::TypeChecked,
            interface_hash: interface.hash(),
            interface,
            table,
            diagnostics: Vec::new(),
        }
    }

    fn hashes(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(m, h)| (m.to_string(), h.to_string())).collect()
    }

    #[test]
    fn test_reanalyze_reasons() {
        let options = Options::default();
        let cached = entry("m", "x = 1\n", &[("a", "h1"), ("b", "h2")]);
        let same = Fingerprint::compute("x = 1\n", &options);

        assert_eq!(reanalyze_reason(None, &same, &hashes(&[])), Some(ReanalyzeReason::NotCached));
        assert_eq!(reanalyze_reason(Some(&cached), &same, &hashes(&[("a", "h1"), ("b", "h2")])), None);
        assert_eq!(
            reanalyze_reason(
                Some(&cached),
                &Fingerprint::compute("x = 2\n", &options),
                &hashes(&[("a", "h1"), ("b", "h2")])
            ),
            Some(ReanalyzeReason::FingerprintChanged)
        );
        assert_eq!(
            reanalyze_reason(Some(&cached), &same, &hashes(&[("a", "h1")])),
            Some(ReanalyzeReason::DependenciesChanged)
        );
        assert_eq!(
            reanalyze_reason(Some(&cached), &same, &hashes(&[("a", "h1"), ("b", "new")])),
            Some(ReanalyzeReason::InterfaceChanged("b".to_string()))
        );
        assert!(!should_reanalyze(Some(&cached), &same, &hashes(&[("a", "h1"), ("b", "h2")])));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert!(store.get("m").is_none());
        store.put("m", &entry("m", "x = 1\n", &[])).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("m").unwrap().module, "m");

        let mut old = entry("old", "", &[]);
        old.version = CACHE_VERSION + 1;
        store.put("old", &old).unwrap();
        assert!(store.get("old").is_none());
        assert!(NoCache.get("m").is_none());
    }

    #[test]
    fn test_json_store_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path().join("cache"));
        let stored = entry("pkg.mod", "x = 1\n", &[("a", "h1")]);
        store.put("pkg.mod", &stored).unwrap();

        assert!(store.path_for("pkg.mod").is_file());
        assert_eq!(store.get("pkg.mod"), Some(stored));
        assert!(store.get("other").is_none());
    }

    #[test]
    fn test_json_store_rejects_bad_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = JsonFileStore::new(temp_dir.path());

        std::fs::write(store.path_for("corrupt"), "{ not json").unwrap();
        assert!(store.get("corrupt").is_none());

        let mut outdated = entry("outdated", "", &[]);
        outdated.version = 0;
        store.put("outdated", &outdated).unwrap();
        assert!(store.get("outdated").is_none());

        // an entry stored under the wrong name is not trusted either
        store.put("renamed", &entry("original", "", &[])).unwrap();
        assert!(store.get("renamed").is_none());
    }
}
