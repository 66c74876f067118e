//! Build driver
//!
//! A build runs in three phases:
//!
//! 1. Load: starting from the requested sources, parse every module, resolve
//!    its imports and record the import graph. Missing modules become `Any`
//!    stubs with a diagnostic at the import site.
//! 2. Plan: collapse the graph into SCCs, dependencies first. The embedded
//!    `builtins` and `typing` stubs always form the first SCC.
//! 3. Schedule: each SCC whose dependencies have all been published is either
//!    taken from the cache or analyzed on a blocking worker. Workers get an
//!    immutable snapshot of the tables they may see and hand back finished
//!    results; nothing is shared mutably while an SCC is analyzed.

use crate::cache::{reanalyze_reason, CacheEntry, CacheStore, NoCache, CACHE_VERSION};
use crate::fingerprint::Fingerprint;
use crate::graph::ModuleGraph;
use crate::options::{FollowImports, Options, OptionsError};
use crate::resolver::{ImportResolver, ModuleLocation};
use pyxis_checker::builtins::{analyze_builtins, is_builtin_module};
use pyxis_checker::diagnostics::messages;
use pyxis_checker::{
    analyze_scc, sort_diagnostics, AnalysisOptions, AnalysisState, Diagnostic, DiagnosticKind, InterfaceSummary,
    ModuleMap, SccModule, SccOutcome, Severity, SymbolTable, BUILTINS, TYPING,
};
use pyxis_syntax::{absolute_module, parse_module, FileId, LineIndex, ModuleAst, Span};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

/// A module requested on the command line or by an API caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSource {
    pub module: String,
    pub path: Option<PathBuf>,
    /// Source text given directly instead of read from `path`
    pub text: Option<String>,
}

impl BuildSource {
    /// A module found through the resolver
    pub fn module(name: impl Into<String>) -> Self {
        Self {
            module: name.into(),
            path: None,
            text: None,
        }
    }

    /// A file on disk; the module name follows the enclosing packages
    pub fn file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            module: module_name_for_path(&path),
            path: Some(path),
            text: None,
        }
    }

    /// Source text under a module name, as given by `-c`
    pub fn text(name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            module: name.into(),
            path: None,
            text: Some(text.into()),
        }
    }
}

/// `pkg/sub/mod.py` is `pkg.sub.mod` when `pkg` and `pkg/sub` hold an
/// `__init__` file; `pkg/__init__.py` is `pkg`
pub fn module_name_for_path(path: &Path) -> String {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let mut parts = Vec::new();
    let mut dir = path.parent();
    if stem == "__init__" {
        if let Some(name) = dir.and_then(|d| d.file_name()).and_then(|n| n.to_str()) {
            parts.push(name.to_string());
            dir = dir.and_then(|d| d.parent());
        }
    } else {
        parts.push(stem.to_string());
    }
    while let Some(current) = dir {
        let is_package = ["__init__.py", "__init__.pyi"].iter().any(|f| current.join(f).is_file());
        match current.file_name().and_then(|n| n.to_str()) {
            Some(name) if is_package => parts.push(name.to_string()),
            _ => break,
        }
        dir = current.parent();
    }
    parts.reverse();
    parts.join(".")
}

/// Everything known about one module during a build
#[derive(Debug)]
pub struct ModuleRecord {
    pub name: String,
    pub path: Option<PathBuf>,
    pub source: String,
    /// `None` after a syntax error
    pub ast: Option<Arc<ModuleAst>>,
    pub lines: Arc<LineIndex>,
    pub is_package: bool,
    pub is_stub: bool,
    /// Named in the build request rather than reached through an import
    pub is_root: bool,
    /// Imports that do not close a cycle
    pub dependencies: Vec<String>,
    /// Imports that close a cycle inside the module's SCC
    pub deferred: Vec<String>,
    pub fingerprint: Fingerprint,
    pub state: AnalysisState,
    /// Resolution and syntax problems found while loading
    pub diagnostics: Vec<Diagnostic>,
}

impl ModuleRecord {
    fn diagnostic_at(&self, span: Span, severity: Severity, kind: DiagnosticKind, message: String) -> Diagnostic {
        let pos = self.lines.line_col(span.start);
        Diagnostic::new(self.name.clone(), pos.line, pos.column, severity, kind, message)
    }
}

/// Finished result of one module
#[derive(Debug, Clone)]
pub struct ModuleResult {
    pub name: String,
    pub path: Option<PathBuf>,
    pub state: AnalysisState,
    pub table: Arc<SymbolTable>,
    pub interface: InterfaceSummary,
    pub interface_hash: String,
    pub fingerprint: Fingerprint,
    pub diagnostics: Vec<Diagnostic>,
    /// Semantic analysis passes of the module's SCC; 0 when reused
    pub passes: u32,
}

#[derive(Debug, Clone)]
pub struct BuildResult {
    /// SCCs in processing order, the builtin stubs first
    pub order: Vec<Vec<String>>,
    pub modules: BTreeMap<String, ModuleResult>,
    /// Reported diagnostics in processing order, then source position
    pub diagnostics: Vec<Diagnostic>,
    pub reanalyzed: BTreeSet<String>,
    pub reused: BTreeSet<String>,
    /// The build stopped early; `modules` holds what finished
    pub cancelled: bool,
}

impl BuildResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    /// Modules with at least one reported error
    pub fn files_with_errors(&self) -> BTreeSet<&str> {
        self.diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| d.module.as_str())
            .collect()
    }

    pub fn exit_code(&self) -> i32 {
        if self.has_errors() {
            1
        } else {
            0
        }
    }
}

/// Build errors
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Can't find module '{0}'")]
    ModuleNotFound(String),

    #[error("Duplicate module named '{0}'")]
    DuplicateModule(String),

    #[error("Can't read file {path:?}: {error}")]
    Io { path: PathBuf, error: std::io::Error },

    #[error("Invalid options: {0}")]
    Options(#[from] OptionsError),

    #[error("Failed to start worker runtime: {0}")]
    Runtime(std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Owns every module record of one build
pub struct BuildManager {
    options: Options,
    resolver: Arc<dyn ImportResolver>,
    store: Arc<dyn CacheStore>,
    cancelled: Arc<AtomicBool>,
}

impl BuildManager {
    pub fn new(options: Options, resolver: Arc<dyn ImportResolver>, store: Arc<dyn CacheStore>) -> Self {
        let store: Arc<dyn CacheStore> = if options.incremental { store } else { Arc::new(NoCache) };
        Self {
            options,
            resolver,
            store,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Setting the flag stops the build before the next SCC starts
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn build(&self, sources: &[BuildSource]) -> Result<BuildResult, BuildError> {
        self.options.validate()?;
        let analysis = self.options.analysis_options();
        let builtins = analyze_builtins(&analysis)
            .map_err(|e| BuildError::Internal(format!("builtin stubs failed to parse: {}", e)))?;

        let (graph, records) = self.load(sources)?;
        let order = graph.sccs();
        debug!(modules = records.len(), sccs = order.len(), "module graph built");

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(self.options.jobs)
            .max_blocking_threads(self.options.jobs)
            .enable_all()
            .build()
            .map_err(BuildError::Runtime)?;
        let scheduler = Scheduler::new(self, &graph, &records, &order, builtins, analysis)?;
        let outcome = runtime.block_on(scheduler.run())?;
        Ok(self.assemble(&records, order, outcome))
    }

    // Load phase

    fn load(&self, sources: &[BuildSource]) -> Result<(ModuleGraph, BTreeMap<String, ModuleRecord>), BuildError> {
        let mut graph = ModuleGraph::new();
        let mut records: BTreeMap<String, ModuleRecord> = BTreeMap::new();
        let mut queue = VecDeque::new();

        for source in sources {
            if is_builtin_module(&source.module) {
                debug!(module = %source.module, "builtin module requested; using the embedded stub");
                continue;
            }
            if records.contains_key(&source.module) {
                return Err(BuildError::DuplicateModule(source.module.clone()));
            }
            let record = self.load_root(source, records.len())?;
            graph.add_module(&record.name);
            queue.push_back(record.name.clone());
            records.insert(record.name.clone(), record);
        }

        while let Some(name) = queue.pop_front() {
            let imports = match records.get(&name) {
                Some(record) => self.import_targets(record),
                None => continue,
            };
            let mut found: Vec<(String, (ModuleLocation, String))> = Vec::new();
            let mut diagnostics = Vec::new();
            for target in imports {
                if is_builtin_module(&target.module) {
                    continue;
                }
                if records.contains_key(&target.module) || found.iter().any(|(m, _)| *m == target.module) {
                    graph.add_dependency(&name, &target.module);
                    continue;
                }
                if !self.options.follow_imports.follows() {
                    if target.required && self.options.follow_imports == FollowImports::Error {
                        diagnostics.push((target.span, Severity::Error, messages::import_ignored(&target.module)));
                        diagnostics.push((
                            target.span,
                            Severity::Note,
                            "(Using --follow-imports=error, module not passed on command line)".to_string(),
                        ));
                    }
                    continue;
                }
                match self.resolver.resolve(Some(&name), &target.module) {
                    Some(location) => {
                        let source = self.resolver.read_source(&location).map_err(|error| BuildError::Io {
                            path: location.path.clone(),
                            error,
                        })?;
                        graph.add_dependency(&name, &target.module);
                        found.push((target.module.clone(), (location, source)));
                    }
                    None if target.required && !self.options.ignore_missing_imports => {
                        diagnostics.push((target.span, Severity::Error, messages::cannot_find_module(&target.module)));
                    }
                    None => trace!(module = %target.module, importer = %name, "optional import target not found"),
                }
            }

            if let Some(record) = records.get_mut(&name) {
                for (span, severity, message) in diagnostics {
                    let diagnostic = record.diagnostic_at(span, severity, DiagnosticKind::Resolution, message);
                    record.diagnostics.push(diagnostic);
                }
            }
            for (module, (location, source)) in found {
                let record = self.parse_record(module.clone(), Some(location), source, false, records.len());
                queue.push_back(module.clone());
                records.insert(module, record);
            }
        }

        self.note_unanalyzable_imports(&mut records);
        for edge in graph.edges() {
            if let Some(record) = records.get_mut(&edge.source) {
                if edge.is_deferred {
                    record.deferred.push(edge.target);
                } else {
                    record.dependencies.push(edge.target);
                }
            }
        }
        Ok((graph, records))
    }

    fn load_root(&self, source: &BuildSource, index: usize) -> Result<ModuleRecord, BuildError> {
        let name = source.module.clone();
        if let Some(text) = &source.text {
            let location = source.path.as_ref().map(|path| location_for_path(&name, path));
            return Ok(self.parse_record(name, location, text.clone(), true, index));
        }
        let location = match &source.path {
            Some(path) => location_for_path(&name, path),
            None => self
                .resolver
                .resolve(None, &name)
                .ok_or_else(|| BuildError::ModuleNotFound(name.clone()))?,
        };
        let text = match &source.path {
            Some(path) => std::fs::read_to_string(path),
            None => self.resolver.read_source(&location),
        }
        .map_err(|error| BuildError::Io {
            path: location.path.clone(),
            error,
        })?;
        Ok(self.parse_record(name, Some(location), text, true, index))
    }

    fn parse_record(
        &self,
        name: String,
        location: Option<ModuleLocation>,
        source: String,
        is_root: bool,
        index: usize,
    ) -> ModuleRecord {
        let lines = Arc::new(LineIndex::new(&source));
        let fingerprint = Fingerprint::compute(&source, &self.options);
        // 0 and 1 belong to the builtin stubs
        let parsed = parse_module(&source, FileId::new(index as u32 + 2));
        let (is_package, is_stub, path) = match location {
            Some(l) => (l.is_package, l.is_stub, Some(l.path)),
            None => (false, false, None),
        };
        let mut record = ModuleRecord {
            name,
            path,
            source,
            ast: None,
            lines,
            is_package,
            is_stub,
            is_root,
            dependencies: Vec::new(),
            deferred: Vec::new(),
            fingerprint,
            state: AnalysisState::Unprocessed,
            diagnostics: Vec::new(),
        };
        match parsed {
            Ok(ast) => record.ast = Some(Arc::new(ast)),
            Err(e) => {
                debug!(module = %record.name, error = %e, "syntax error");
                let diagnostic = record.diagnostic_at(e.span(), Severity::Error, DiagnosticKind::Syntax, e.to_string());
                record.diagnostics.push(diagnostic);
                record.state = AnalysisState::Stable;
            }
        }
        record
    }

    /// Modules an import statement may load: the named module itself, plus
    /// its parent packages and any `from m import sub` submodules if present
    fn import_targets(&self, record: &ModuleRecord) -> Vec<ImportTarget> {
        let Some(ast) = &record.ast else {
            return Vec::new();
        };
        let mut targets = Vec::new();
        for import in ast.imports() {
            let Some(base) = absolute_module(&record.name, record.is_package, import.level, &import.module) else {
                continue;
            };
            let parts: Vec<&str> = base.split('.').collect();
            for n in 1..parts.len() {
                targets.push(ImportTarget::optional(parts[..n].join("."), import.span));
            }
            targets.push(ImportTarget {
                module: base.clone(),
                span: import.span,
                required: true,
            });
            for name in &import.from_names {
                targets.push(ImportTarget::optional(format!("{}.{}", base, name), import.span));
            }
        }
        targets
    }

    fn note_unanalyzable_imports(&self, records: &mut BTreeMap<String, ModuleRecord>) {
        let broken: BTreeSet<String> = records
            .values()
            .filter(|r| r.ast.is_none())
            .map(|r| r.name.clone())
            .collect();
        if broken.is_empty() {
            return;
        }
        let mut notes = Vec::new();
        for record in records.values() {
            let Some(ast) = &record.ast else {
                continue;
            };
            for import in ast.imports() {
                let target = absolute_module(&record.name, record.is_package, import.level, &import.module);
                if let Some(module) = target.filter(|m| broken.contains(m)) {
                    let message = format!("Module \"{}\" could not be analyzed; its names are treated as \"Any\"", module);
                    let note = record.diagnostic_at(import.span, Severity::Note, DiagnosticKind::Resolution, message);
                    notes.push((record.name.clone(), note));
                }
            }
        }
        for (name, note) in notes {
            if let Some(record) = records.get_mut(&name) {
                record.diagnostics.push(note);
            }
        }
    }

    // Assembly

    fn assemble(
        &self,
        records: &BTreeMap<String, ModuleRecord>,
        order: Vec<Vec<String>>,
        outcome: ScheduleOutcome,
    ) -> BuildResult {
        let mut diagnostics = Vec::new();
        for name in order.iter().flatten() {
            let (Some(record), Some(result)) = (records.get(name), outcome.results.get(name)) else {
                continue;
            };
            if self.options.follow_imports == FollowImports::Silent && !record.is_root {
                continue;
            }
            diagnostics.extend(result.diagnostics.iter().cloned());
        }
        let mut full_order = vec![vec![BUILTINS.to_string(), TYPING.to_string()]];
        full_order.extend(order);

        let result = BuildResult {
            order: full_order,
            modules: outcome.results,
            diagnostics,
            reanalyzed: outcome.reanalyzed,
            reused: outcome.reused,
            cancelled: outcome.cancelled,
        };
        info!(
            modules = result.modules.len(),
            reanalyzed = result.reanalyzed.len(),
            reused = result.reused.len(),
            errors = result.error_count(),
            cancelled = result.cancelled,
            "build finished"
        );
        result
    }
}

fn location_for_path(module: &str, path: &Path) -> ModuleLocation {
    ModuleLocation {
        module: module.to_string(),
        path: path.to_path_buf(),
        is_package: path.file_stem().map_or(false, |s| s == "__init__"),
        is_stub: path.extension().map_or(false, |e| e == "pyi"),
    }
}

#[derive(Debug)]
struct ImportTarget {
    module: String,
    span: Span,
    /// Missing required targets are reported
    required: bool,
}

impl ImportTarget {
    fn optional(module: String, span: Span) -> Self {
        Self {
            module,
            span,
            required: false,
        }
    }
}

// Schedule phase

struct ScheduleOutcome {
    results: BTreeMap<String, ModuleResult>,
    reanalyzed: BTreeSet<String>,
    reused: BTreeSet<String>,
    cancelled: bool,
}

/// What a worker needs to analyze one SCC; owns all of it
struct SccJob {
    index: usize,
    modules: Vec<JobModule>,
    deps: ModuleMap,
    options: AnalysisOptions,
}

struct JobModule {
    name: String,
    ast: Arc<ModuleAst>,
    lines: Arc<LineIndex>,
    is_package: bool,
    is_stub: bool,
}

impl SccJob {
    fn run(self) -> (usize, SccOutcome) {
        let modules: Vec<SccModule<'_>> = self
            .modules
            .iter()
            .map(|m| SccModule {
                name: &m.name,
                ast: &m.ast,
                lines: &m.lines,
                is_package: m.is_package,
                is_stub: m.is_stub,
            })
            .collect();
        let outcome = analyze_scc(&modules, &self.deps, &self.options);
        (self.index, outcome)
    }
}

/// For each SCC, the SCCs that import it and the number of SCCs it waits on.
/// Cycle-closing imports must stay inside their own SCC.
fn component_links(
    order: &[Vec<String>],
    records: &BTreeMap<String, ModuleRecord>,
) -> Result<(Vec<Vec<usize>>, Vec<usize>), BuildError> {
    let component_of: BTreeMap<&str, usize> = order
        .iter()
        .enumerate()
        .flat_map(|(i, scc)| scc.iter().map(move |m| (m.as_str(), i)))
        .collect();
    let mut dependents = vec![Vec::new(); order.len()];
    let mut waiting_on = vec![0; order.len()];
    for (i, scc) in order.iter().enumerate() {
        let mut upstream = BTreeSet::new();
        for record in scc.iter().filter_map(|m| records.get(m)) {
            if let Some(target) = record.deferred.iter().find(|t| component_of.get(t.as_str()) != Some(&i)) {
                return Err(BuildError::Internal(format!(
                    "import of \"{}\" from \"{}\" closes a cycle outside its component",
                    target, record.name
                )));
            }
            upstream.extend(
                record
                    .dependencies
                    .iter()
                    .filter_map(|d| component_of.get(d.as_str()).copied())
                    .filter(|&j| j != i),
            );
        }
        waiting_on[i] = upstream.len();
        for j in upstream {
            dependents[j].push(i);
        }
    }
    Ok((dependents, waiting_on))
}

/// Coordinator: starts an SCC only once every SCC it imports has published
struct Scheduler<'b> {
    manager: &'b BuildManager,
    graph: &'b ModuleGraph,
    records: &'b BTreeMap<String, ModuleRecord>,
    order: &'b [Vec<String>],
    builtins: ModuleMap,
    analysis: AnalysisOptions,
    /// Published tables and interface hashes; write-once per module
    tables: ModuleMap,
    hashes: BTreeMap<String, String>,
    dependents: Vec<Vec<usize>>,
    waiting_on: Vec<usize>,
    outcome: ScheduleOutcome,
}

impl<'b> Scheduler<'b> {
    fn new(
        manager: &'b BuildManager,
        graph: &'b ModuleGraph,
        records: &'b BTreeMap<String, ModuleRecord>,
        order: &'b [Vec<String>],
        builtins: ModuleMap,
        analysis: AnalysisOptions,
    ) -> Result<Self, BuildError> {
        let (dependents, waiting_on) = component_links(order, records)?;
        Ok(Self {
            manager,
            graph,
            records,
            order,
            builtins,
            analysis,
            tables: ModuleMap::new(),
            hashes: BTreeMap::new(),
            dependents,
            waiting_on,
            outcome: ScheduleOutcome {
                results: BTreeMap::new(),
                reanalyzed: BTreeSet::new(),
                reused: BTreeSet::new(),
                cancelled: false,
            },
        })
    }

    async fn run(mut self) -> Result<ScheduleOutcome, BuildError> {
        let mut ready: VecDeque<usize> = (0..self.order.len()).filter(|&i| self.waiting_on[i] == 0).collect();
        let mut running: JoinSet<(usize, SccOutcome)> = JoinSet::new();
        let mut finished = 0;

        loop {
            while running.len() < self.manager.options.jobs {
                let Some(index) = ready.pop_front() else {
                    break;
                };
                if self.manager.cancelled.load(Ordering::SeqCst) {
                    self.outcome.cancelled = true;
                    ready.clear();
                    break;
                }
                match self.prepare(index) {
                    Some(job) => {
                        debug!(scc = index, modules = ?self.order[index], "analyzing");
                        running.spawn_blocking(move || job.run());
                    }
                    None => {
                        finished += 1;
                        ready.extend(self.release(index));
                    }
                }
            }
            let Some(joined) = running.join_next().await else {
                break;
            };
            let (index, outcome) = joined.map_err(|e| BuildError::Internal(format!("analysis worker failed: {}", e)))?;
            self.publish_analyzed(index, outcome);
            finished += 1;
            if !self.outcome.cancelled {
                ready.extend(self.release(index));
            }
        }

        if !self.outcome.cancelled && finished != self.order.len() {
            return Err(BuildError::Internal(format!(
                "scheduler stalled with {} of {} components unfinished",
                self.order.len() - finished,
                self.order.len()
            )));
        }
        Ok(self.outcome)
    }

    /// SCCs that became ready once `index` published
    fn release(&mut self, index: usize) -> Vec<usize> {
        let mut released = Vec::new();
        for &j in &self.dependents[index] {
            self.waiting_on[j] -= 1;
            if self.waiting_on[j] == 0 {
                released.push(j);
            }
        }
        released
    }

    /// Transitive dependencies of a module, excluding itself
    fn dependency_closure(&self, name: &str) -> BTreeSet<String> {
        let mut closure = self.graph.transitive_dependencies(name);
        closure.remove(name);
        closure
    }

    /// Reuse the SCC from the cache if possible and return `None`, otherwise
    /// build a job for it
    fn prepare(&mut self, index: usize) -> Option<SccJob> {
        let records = self.records;
        let members: Vec<&ModuleRecord> = self.order[index].iter().filter_map(|m| records.get(m)).collect();

        let cached: BTreeMap<&str, CacheEntry> = members
            .iter()
            .filter_map(|r| self.manager.store.get(&r.name).map(|e| (r.name.as_str(), e)))
            .collect();
        let reusable = members.iter().all(|record| {
            if record.ast.is_none() {
                return false;
            }
            let current = self.current_hashes(&record.name, &cached);
            match reanalyze_reason(cached.get(record.name.as_str()), &record.fingerprint, &current) {
                Some(reason) => {
                    debug!(module = %record.name, %reason, "re-analyzing");
                    false
                }
                None => true,
            }
        });

        if reusable {
            for record in &members {
                if let Some(entry) = cached.get(record.name.as_str()) {
                    trace!(module = %record.name, "reusing cached result");
                    self.publish_reused(record, entry.clone());
                }
            }
            return None;
        }

        // modules that failed to parse are published as opaque stubs
        for record in members.iter().filter(|r| r.ast.is_none()) {
            self.publish_broken(record);
        }
        let analyzable: Vec<&ModuleRecord> = members.into_iter().filter(|r| r.ast.is_some()).collect();
        if analyzable.is_empty() {
            return None;
        }

        let mut deps = self.builtins.clone();
        for record in &analyzable {
            for dep in self.dependency_closure(&record.name) {
                if let Some(table) = self.tables.get(&dep) {
                    deps.insert(dep, table.clone());
                }
            }
        }
        let modules = analyzable
            .iter()
            .filter_map(|r| {
                r.ast.as_ref().map(|ast| JobModule {
                    name: r.name.clone(),
                    ast: ast.clone(),
                    lines: r.lines.clone(),
                    is_package: r.is_package,
                    is_stub: r.is_stub,
                })
            })
            .collect();
        Some(SccJob {
            index,
            modules,
            deps,
            options: self.analysis.clone(),
        })
    }

    /// Current interface hash of every transitive dependency; members of the
    /// same SCC that are not published yet count with their cached hash
    fn current_hashes(&self, name: &str, cached: &BTreeMap<&str, CacheEntry>) -> BTreeMap<String, String> {
        self.dependency_closure(name)
            .into_iter()
            .map(|dep| {
                let hash = self
                    .hashes
                    .get(&dep)
                    .cloned()
                    .or_else(|| cached.get(dep.as_str()).map(|e| e.interface_hash.clone()))
                    .unwrap_or_default();
                (dep, hash)
            })
            .collect()
    }

    fn publish(&mut self, result: ModuleResult) {
        self.tables.insert(result.name.clone(), result.table.clone());
        self.hashes.insert(result.name.clone(), result.interface_hash.clone());
        self.outcome.results.insert(result.name.clone(), result);
    }

    fn publish_reused(&mut self, record: &ModuleRecord, entry: CacheEntry) {
        let mut diagnostics = record.diagnostics.clone();
        diagnostics.extend(entry.diagnostics);
        sort_diagnostics(&mut diagnostics);
        self.outcome.reused.insert(record.name.clone());
        self.publish(ModuleResult {
            name: record.name.clone(),
            path: record.path.clone(),
            state: entry.state,
            table: Arc::new(entry.table),
            interface: entry.interface,
            interface_hash: entry.interface_hash,
            fingerprint: record.fingerprint.clone(),
            diagnostics,
            passes: 0,
        });
    }

    fn publish_broken(&mut self, record: &ModuleRecord) {
        let interface = InterfaceSummary::opaque(&record.name);
        self.outcome.reanalyzed.insert(record.name.clone());
        self.publish(ModuleResult {
            name: record.name.clone(),
            path: record.path.clone(),
            state: AnalysisState::Stable,
            table: Arc::new(SymbolTable::opaque()),
            interface_hash: interface.hash(),
            interface,
            fingerprint: record.fingerprint.clone(),
            diagnostics: record.diagnostics.clone(),
            passes: 0,
        });
    }

    fn publish_analyzed(&mut self, index: usize, outcome: SccOutcome) {
        // hashes of this SCC's own members are only known now
        for module in &outcome.modules {
            self.hashes.insert(module.name.clone(), module.interface_hash.clone());
        }
        let records = self.records;
        for module in outcome.modules {
            let Some(record) = records.get(&module.name) else {
                continue;
            };
            let entry = CacheEntry {
                version: CACHE_VERSION,
                module: module.name.clone(),
                fingerprint: record.fingerprint.clone(),
                dependencies: self
                    .dependency_closure(&module.name)
                    .into_iter()
                    .map(|dep| {
                        let hash = self.hashes.get(&dep).cloned().unwrap_or_default();
                        (dep, hash)
                    })
                    .collect(),
                state: module.state,
                table: module.table,
                interface: module.interface,
                interface_hash: module.interface_hash,
                diagnostics: module.diagnostics,
            };
            if let Err(e) = self.manager.store.put(&module.name, &entry) {
                warn!(module = %module.name, error = %e, "failed to store cache entry");
            }

            let mut diagnostics = record.diagnostics.clone();
            diagnostics.extend(entry.diagnostics);
            sort_diagnostics(&mut diagnostics);
            self.outcome.reanalyzed.insert(module.name.clone());
            self.publish(ModuleResult {
                name: module.name,
                path: record.path.clone(),
                state: entry.state,
                table: Arc::new(entry.table),
                interface: entry.interface,
                interface_hash: entry.interface_hash,
                fingerprint: entry.fingerprint,
                diagnostics,
                passes: outcome.passes,
            });
        }
        debug!(scc = index, passes = outcome.passes, "published");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, dependencies: &[&str], deferred: &[&str]) -> (String, ModuleRecord) {
        let record = ModuleRecord {
            name: name.to_string(),
            path: None,
            source: String::new(),
            ast: None,
            lines: Arc::new(LineIndex::new("")),
            is_package: false,
            is_stub: false,
            is_root: true,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
            deferred: deferred.iter().map(|d| d.to_string()).collect(),
            fingerprint: Fingerprint::compute("", &Options::default()),
            state: AnalysisState::Unprocessed,
            diagnostics: Vec::new(),
        };
        (name.to_string(), record)
    }

    fn order(components: &[&[&str]]) -> Vec<Vec<String>> {
        components
            .iter()
            .map(|scc| scc.iter().map(|m| m.to_string()).collect())
            .collect()
    }

    #[test]
    fn test_component_links_follow_record_imports() {
        // main -> {a <-> b} -> base
        let records: BTreeMap<String, ModuleRecord> = [
            record("base", &[], &[]),
            record("a", &["b", "base"], &[]),
            record("b", &["base"], &["a"]),
            record("main", &["a"], &[]),
        ]
        .into_iter()
        .collect();
        let order = order(&[&["base"], &["a", "b"], &["main"]]);
        let (dependents, waiting_on) = component_links(&order, &records).unwrap();
        assert_eq!(waiting_on, vec![0, 1, 1]);
        assert_eq!(dependents, vec![vec![1], vec![2], vec![]]);
    }

    #[test]
    fn test_cycle_import_across_components_is_internal_error() {
        let records: BTreeMap<String, ModuleRecord> =
            [record("a", &[], &["b"]), record("b", &[], &[])].into_iter().collect();
        let order = order(&[&["b"], &["a"]]);
        match component_links(&order, &records) {
            Err(BuildError::Internal(message)) => assert!(message.contains("\"b\" from \"a\""), "{}", message),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }
}
