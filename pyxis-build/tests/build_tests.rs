//! Whole-build tests over in-memory and on-disk module trees

use pyxis_build::{
    build, BuildError, BuildManager, BuildResult, BuildSource, CacheStore, FollowImports, MemoryResolver,
    MemoryStore, NoCache, Options,
};
use pyxis_checker::{AnalysisState, DiagnosticKind, Severity};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tempfile::TempDir;

const BASE: &str = "def value() -> int:\n    return 1\n\ndef _helper() -> int:\n    return 2\n";
const MID: &str = "from base import value\n\ndef doubled() -> int:\n    return value()\n";
const MAIN: &str = "from mid import doubled\n\nresult: int = doubled()\n";

fn layered(base: &str) -> MemoryResolver {
    MemoryResolver::new()
        .with_module("base", base)
        .with_module("mid", MID)
        .with_module("main", MAIN)
}

fn run_with(resolver: MemoryResolver, store: Arc<dyn CacheStore>, options: Options, roots: &[&str]) -> BuildResult {
    let sources: Vec<BuildSource> = roots.iter().map(|m| BuildSource::module(*m)).collect();
    BuildManager::new(options, Arc::new(resolver), store)
        .build(&sources)
        .expect("build succeeds")
}

fn run(resolver: MemoryResolver, store: &Arc<MemoryStore>) -> BuildResult {
    run_with(resolver, store.clone(), Options::default(), &["main"])
}

fn names(set: &std::collections::BTreeSet<String>) -> Vec<&str> {
    set.iter().map(|s| s.as_str()).collect()
}

fn rendered(result: &BuildResult, module: &str) -> Vec<String> {
    result
        .diagnostics
        .iter()
        .filter(|d| d.module == module)
        .map(|d| d.to_string())
        .collect()
}

#[test]
fn test_clean_build_then_full_reuse() {
    let store = Arc::new(MemoryStore::new());
    let first = run(layered(BASE), &store);
    assert!(!first.has_errors(), "{:?}", first.diagnostics);
    assert_eq!(names(&first.reanalyzed), vec!["base", "main", "mid"]);
    assert!(first.reused.is_empty());
    assert_eq!(store.len(), 3);
    assert_eq!(first.order[0], vec!["builtins".to_string(), "typing".to_string()]);
    assert_eq!(first.order.last().unwrap(), &vec!["main".to_string()]);

    let second = run(layered(BASE), &store);
    assert!(second.reanalyzed.is_empty());
    assert_eq!(names(&second.reused), vec!["base", "main", "mid"]);
    assert_eq!(second.modules["main"].passes, 0);
    assert_eq!(second.modules["main"].state, AnalysisState::TypeChecked);
    assert_eq!(first.modules["mid"].interface_hash, second.modules["mid"].interface_hash);
}

#[test]
fn test_private_change_only_reanalyzes_the_module() {
    let store = Arc::new(MemoryStore::new());
    run(layered(BASE), &store);

    let edited = BASE.replace("return 2", "return 2 + 3");
    let result = run(layered(&edited), &store);
    assert_eq!(names(&result.reanalyzed), vec!["base"]);
    assert_eq!(names(&result.reused), vec!["main", "mid"]);
}

#[test]
fn test_private_signature_change_reanalyzes_direct_readers() {
    let main = "from base import _helper\n\nx: str = _helper()\n";
    let resolver = |base: &str| MemoryResolver::new().with_module("base", base).with_module("main", main);
    let store = Arc::new(MemoryStore::new());
    let first = run(resolver(BASE), &store);
    assert_eq!(
        rendered(&first, "main"),
        vec!["3:10: error: Incompatible types in assignment (expression has type \"int\", variable has type \"str\")"
            .to_string()]
    );

    let edited = BASE.replace("def _helper() -> int:\n    return 2", "def _helper() -> str:\n    return \"two\"");
    let incremental = run(resolver(&edited), &store);
    assert_eq!(names(&incremental.reanalyzed), vec!["base", "main"]);
    assert!(incremental.diagnostics.is_empty(), "{:?}", incremental.diagnostics);

    let fresh = run_with(resolver(&edited), Arc::new(NoCache), Options::default(), &["main"]);
    assert_eq!(incremental.diagnostics, fresh.diagnostics);
}

#[test]
fn test_pass_budget_change_invalidates_cache() {
    // A -> B -> C -> D with the links alternating between the two modules
    let resolver = || {
        MemoryResolver::new()
            .with_module("m0", "from m1 import B, D\n\nclass A(B):\n    pass\n\nclass C(D):\n    pass\n")
            .with_module("m1", "from m0 import C\n\nclass B(C):\n    pass\n\nclass D:\n    pass\n")
    };
    let tight = Options {
        extra_pass_budget: 0,
        ..Options::default()
    };
    let store = Arc::new(MemoryStore::new());
    let first = run_with(resolver(), store.clone(), tight, &["m0"]);
    assert_eq!(first.diagnostics.len(), 1, "{:?}", first.diagnostics);
    assert_eq!(first.diagnostics[0].kind, DiagnosticKind::Internal);

    let second = run_with(resolver(), store.clone(), Options::default(), &["m0"]);
    assert_eq!(names(&second.reanalyzed), vec!["m0", "m1"]);
    assert!(second.diagnostics.is_empty(), "{:?}", second.diagnostics);
}

#[test]
fn test_exported_change_reanalyzes_all_importers() {
    let store = Arc::new(MemoryStore::new());
    run(layered(BASE), &store);

    let edited = BASE.replace("def value() -> int:\n    return 1", "def value() -> str:\n    return \"one\"");
    let incremental = run(layered(&edited), &store);
    // main only reaches base through mid
    assert_eq!(names(&incremental.reanalyzed), vec!["base", "main", "mid"]);
    assert_eq!(
        rendered(&incremental, "mid"),
        vec!["4:12: error: Incompatible return value type (got \"str\", expected \"int\")".to_string()]
    );

    let fresh = run_with(layered(&edited), Arc::new(NoCache), Options::default(), &["main"]);
    assert_eq!(incremental.diagnostics, fresh.diagnostics);
}

#[test]
fn test_reused_results_match_fresh_analysis() {
    let main = "from mid import doubled\n\nresult: str = doubled()\n";
    let resolver = || layered(BASE).with_module("main", main);
    let store = Arc::new(MemoryStore::new());
    let first = run(resolver(), &store);
    let second = run(resolver(), &store);
    assert_eq!(second.reanalyzed.len(), 0);
    assert_eq!(first.diagnostics, second.diagnostics);
    assert_eq!(first.error_count(), 1);
    assert_eq!(second.exit_code(), 1);
    assert_eq!(first.modules["main"].table, second.modules["main"].table);
}

#[test]
fn test_incremental_off_never_reuses() {
    let store = Arc::new(MemoryStore::new());
    let options = Options {
        incremental: false,
        ..Options::default()
    };
    run_with(layered(BASE), store.clone(), options.clone(), &["main"]);
    let second = run_with(layered(BASE), store.clone(), options, &["main"]);
    assert!(store.is_empty());
    assert_eq!(second.reanalyzed.len(), 3);
}

#[test]
fn test_missing_imports() {
    let resolver = MemoryResolver::new().with_module("main", "import missing\nfrom nowhere import thing\n\nx: int = thing\n");
    let store = Arc::new(MemoryStore::new());
    let result = run(resolver.clone(), &store);
    assert_eq!(
        rendered(&result, "main"),
        vec![
            "1:8: error: Cannot find implementation or library stub for module named \"missing\"".to_string(),
            "2:1: error: Cannot find implementation or library stub for module named \"nowhere\"".to_string(),
        ]
    );
    assert!(result.diagnostics.iter().all(|d| d.kind == DiagnosticKind::Resolution));

    // resolution problems are reported again when the module is reused
    let again = run(resolver.clone(), &store);
    assert_eq!(names(&again.reused), vec!["main"]);
    assert_eq!(again.diagnostics, result.diagnostics);

    let options = Options {
        ignore_missing_imports: true,
        ..Options::default()
    };
    let ignored = run_with(resolver, Arc::new(NoCache), options, &["main"]);
    assert!(ignored.diagnostics.is_empty());
}

#[test]
fn test_syntax_error_module_is_opaque_to_importers() {
    let resolver = MemoryResolver::new()
        .with_module("broken", "def f(:\n    pass\n")
        .with_module("main", "from broken import f\n\nf(1, 2, 3)\n");
    let result = run(resolver, &Arc::new(MemoryStore::new()));

    let broken: Vec<_> = result.diagnostics.iter().filter(|d| d.module == "broken").collect();
    assert_eq!(broken.len(), 1);
    assert_eq!(broken[0].kind, DiagnosticKind::Syntax);
    assert_eq!(broken[0].line, 1);
    assert!(result.modules["broken"].table.is_opaque());

    assert_eq!(
        rendered(&result, "main"),
        vec!["1:1: note: Module \"broken\" could not be analyzed; its names are treated as \"Any\"".to_string()]
    );
    assert_eq!(result.error_count(), 1);
}

#[test]
fn test_import_cycle_is_one_component() {
    let resolver = MemoryResolver::new()
        .with_module(
            "a",
            "from b import B\n\nclass A:\n    def partner(self) -> B:\n        return B()\n",
        )
        .with_module("b", "from a import A\n\nclass B:\n    owner: A\n");
    let result = run_with(resolver, Arc::new(NoCache), Options::default(), &["a"]);
    assert!(result.diagnostics.is_empty(), "{:?}", result.diagnostics);
    assert_eq!(result.order.last().unwrap(), &vec!["a".to_string(), "b".to_string()]);
    assert!(result.modules["a"].passes <= 2);
    assert_eq!(result.modules["b"].state, AnalysisState::TypeChecked);
}

fn follow_resolver() -> MemoryResolver {
    MemoryResolver::new()
        .with_module("helper", "def value() -> int:\n    return \"x\"\n")
        .with_module("main", "from helper import value\n\nx: str = value()\n")
}

fn follow(mode: FollowImports) -> BuildResult {
    let options = Options {
        follow_imports: mode,
        ..Options::default()
    };
    run_with(follow_resolver(), Arc::new(NoCache), options, &["main"])
}

#[test]
fn test_follow_imports_modes() {
    let normal = follow(FollowImports::Normal);
    assert_eq!(normal.files_with_errors().into_iter().collect::<Vec<_>>(), vec!["helper", "main"]);

    let silent = follow(FollowImports::Silent);
    assert_eq!(silent.files_with_errors().into_iter().collect::<Vec<_>>(), vec!["main"]);
    assert_eq!(silent.modules["helper"].diagnostics.len(), 1);

    // an unfollowed module is Any, so main has nothing to complain about
    let skip = follow(FollowImports::Skip);
    assert!(skip.diagnostics.is_empty());
    assert!(!skip.modules.contains_key("helper"));

    let error = follow(FollowImports::Error);
    assert_eq!(
        rendered(&error, "main"),
        vec![
            "1:1: error: Import of \"helper\" ignored".to_string(),
            "1:1: note: (Using --follow-imports=error, module not passed on command line)".to_string(),
        ]
    );
}

#[test]
fn test_follow_imports_skip_still_checks_roots() {
    let options = Options {
        follow_imports: FollowImports::Skip,
        ..Options::default()
    };
    let result = run_with(follow_resolver(), Arc::new(NoCache), options, &["main", "helper"]);
    assert_eq!(result.error_count(), 2);
}

#[test]
fn test_cancelled_build_stops_before_analysis() {
    let manager = BuildManager::new(Options::default(), Arc::new(layered(BASE)), Arc::new(NoCache));
    manager.cancellation_flag().store(true, Ordering::SeqCst);
    let result = manager.build(&[BuildSource::module("main")]).unwrap();
    assert!(result.cancelled);
    assert!(result.modules.is_empty());
}

#[test]
fn test_request_errors() {
    let manager = BuildManager::new(Options::default(), Arc::new(layered(BASE)), Arc::new(NoCache));
    assert!(matches!(
        manager.build(&[BuildSource::module("nope")]),
        Err(BuildError::ModuleNotFound(name)) if name == "nope"
    ));
    assert!(matches!(
        manager.build(&[BuildSource::module("main"), BuildSource::module("main")]),
        Err(BuildError::DuplicateModule(_))
    ));

    let invalid = Options {
        jobs: 0,
        ..Options::default()
    };
    let manager = BuildManager::new(invalid, Arc::new(layered(BASE)), Arc::new(NoCache));
    assert!(matches!(
        manager.build(&[BuildSource::module("main")]),
        Err(BuildError::Options(_))
    ));
}

#[test]
fn test_parallel_jobs_agree_with_serial() {
    let mut resolver = MemoryResolver::new();
    let mut main = String::new();
    for i in 0..8 {
        resolver.insert(
            &format!("leaf{}", i),
            &format!("from base import value\n\ndef get{}() -> str:\n    return value()\n", i),
            false,
        );
        main.push_str(&format!("from leaf{} import get{}\n", i, i));
    }
    resolver.insert("base", BASE, false);
    resolver.insert("main", &main, false);

    let serial = run_with(resolver.clone(), Arc::new(NoCache), Options::default(), &["main"]);
    let parallel = run_with(
        resolver,
        Arc::new(NoCache),
        Options {
            jobs: 4,
            ..Options::default()
        },
        &["main"],
    );
    assert_eq!(serial.error_count(), 8);
    assert_eq!(serial.diagnostics, parallel.diagnostics);
    assert_eq!(serial.order, parallel.order);
}

#[test]
fn test_text_source_is_checked() {
    let result = run_with(
        layered(BASE),
        Arc::new(NoCache),
        Options::default(),
        &[],
    );
    assert!(result.modules.is_empty());

    let manager = BuildManager::new(Options::default(), Arc::new(layered(BASE)), Arc::new(NoCache));
    let result = manager
        .build(&[BuildSource::text("__main__", "from base import value\n\nx: str = value()\n")])
        .unwrap();
    assert_eq!(result.error_count(), 1);
    assert!(result.modules.contains_key("base"));
    assert_eq!(result.diagnostics[0].severity, Severity::Error);
}

#[test]
fn test_packages_on_disk_with_json_cache() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    std::fs::create_dir_all(root.join("pkg")).unwrap();
    std::fs::write(root.join("pkg").join("__init__.py"), "from .util import twice\n").unwrap();
    std::fs::write(
        root.join("pkg").join("util.py"),
        "def twice(x: int) -> int:\n    return x * 2\n",
    )
    .unwrap();
    std::fs::write(root.join("main.py"), "import pkg\n\ny: str = pkg.twice(2)\n").unwrap();

    let options = Options {
        cache_dir: root.join(".cache"),
        search_paths: vec![root.to_path_buf()],
        ..Options::default()
    };
    let sources = vec![BuildSource::file(root.join("main.py"))];
    assert_eq!(sources[0].module, "main");

    let first = build(&sources, options.clone()).unwrap();
    assert_eq!(names(&first.reanalyzed), vec!["main", "pkg", "pkg.util"]);
    assert_eq!(first.error_count(), 1);
    assert!(first.diagnostics[0].message.starts_with("Incompatible types in assignment"));
    assert!(root.join(".cache").join("pkg.util.json").is_file());

    let second = build(&sources, options).unwrap();
    assert_eq!(names(&second.reused), vec!["main", "pkg", "pkg.util"]);
    assert_eq!(first.diagnostics, second.diagnostics);
}
