//! Built-in modules
//!
//! `builtins` and `typing` are ordinary stub files compiled into the crate.
//! They go through the same analysis pipeline as user code and always form
//! the first SCC of a build.

use crate::env::{AnalysisOptions, ModuleMap, BUILTINS, TYPING};
use crate::semanal::SccModule;
use crate::analyze_scc;
use pyxis_syntax::{parse_module, FileId, LineIndex, ModuleAst, ParseError};
use std::sync::Arc;

pub const BUILTINS_STUB: &str = include_str!("../stubs/builtins.pyi");
pub const TYPING_STUB: &str = include_str!("../stubs/typing.pyi");

/// Stub sources by module name, `builtins` first
pub fn stub_sources() -> [(&'static str, &'static str); 2] {
    [(BUILTINS, BUILTINS_STUB), (TYPING, TYPING_STUB)]
}

/// Modules whose source is embedded rather than searched for
pub fn is_builtin_module(name: &str) -> bool {
    name == BUILTINS || name == TYPING
}

/// Analyze the embedded stubs on their own and publish their tables
pub fn analyze_builtins(options: &AnalysisOptions) -> Result<ModuleMap, ParseError> {
    let mut parsed: Vec<(&str, ModuleAst, LineIndex)> = Vec::new();
    for (i, (name, source)) in stub_sources().into_iter().enumerate() {
        let ast = parse_module(source, FileId::new(i as u32))?;
        parsed.push((name, ast, LineIndex::new(source)));
    }
    let modules: Vec<SccModule<'_>> = parsed
        .iter()
        .map(|(name, ast, lines)| SccModule {
            name,
            ast,
            lines,
            is_package: false,
            is_stub: true,
        })
        .collect();
    let deps = ModuleMap::new();
    let outcome = analyze_scc(&modules, &deps, options);
    Ok(outcome
        .modules
        .into_iter()
        .map(|m| (m.name, Arc::new(m.table)))
        .collect())
}
