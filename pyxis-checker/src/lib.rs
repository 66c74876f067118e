//! pyxis checker
//!
//! Semantic analysis and type checking for one strongly connected component
//! of the import graph at a time. The build driver hands [`analyze_scc`] the
//! SCC's parsed modules plus an immutable snapshot of the symbol tables
//! published by earlier SCCs, and gets back one finished table, interface
//! and diagnostic list per module.

pub mod binder;
pub mod builtins;
pub mod checker;
pub mod diagnostics;
pub mod env;
pub mod expr;
pub mod interface;
pub mod join;
pub mod mro;
pub mod scope;
pub mod semanal;
pub mod subst;
pub mod subtype;
pub mod symbols;
pub mod typeanal;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

// Re-export core types
pub use checker::{check_module, CheckOutput, InferredType, TypeChecker};
pub use diagnostics::{sort_diagnostics, Diagnostic, DiagnosticKind, Severity};
pub use env::{AnalysisOptions, Env, ModuleMap, BUILTINS, TYPING};
pub use interface::InterfaceSummary;
pub use semanal::{AnalysisState, SccModule, SemanticAnalyzer};
pub use symbols::{SymbolFlags, SymbolKind, SymbolNode, SymbolTable};
pub use types::Type;

use std::collections::BTreeMap;
use tracing::debug;

/// Finished analysis of one module
#[derive(Debug, Clone)]
pub struct AnalyzedModule {
    pub name: String,
    pub table: SymbolTable,
    pub diagnostics: Vec<Diagnostic>,
    pub state: AnalysisState,
    pub interface: InterfaceSummary,
    pub interface_hash: String,
}

#[derive(Debug)]
pub struct SccOutcome {
    /// In the order the modules were given
    pub modules: Vec<AnalyzedModule>,
    /// Semantic analysis passes used by the SCC
    pub passes: u32,
}

/// Analyze and type check every module of one SCC
pub fn analyze_scc(modules: &[SccModule<'_>], deps: &ModuleMap, options: &AnalysisOptions) -> SccOutcome {
    let output = SemanticAnalyzer::new(modules, deps, options).run();
    let mut tables = output.tables;
    let mut diagnostics = output.diagnostics;
    let mut states = BTreeMap::new();

    for module in modules {
        if output.aborted.contains(module.name) {
            states.insert(module.name, AnalysisState::Stable);
            continue;
        }
        let check = {
            let env = Env::new(deps, &tables, options);
            check_module(&env, *module)
        };
        apply_inferred(&mut tables, module.name, &check.inferred);
        diagnostics
            .entry(module.name.to_string())
            .or_default()
            .extend(check.diagnostics);
        let state = if check.aborted {
            AnalysisState::Stable
        } else {
            AnalysisState::TypeChecked
        };
        states.insert(module.name, state);
    }

    let modules = modules
        .iter()
        .map(|module| {
            let table = tables.remove(module.name).unwrap_or_default();
            let mut list = diagnostics.remove(module.name).unwrap_or_default();
            sort_diagnostics(&mut list);
            let interface = InterfaceSummary::from_table(module.name, &table);
            let interface_hash = interface.hash();
            let state = states.get(module.name).copied().unwrap_or(AnalysisState::Stable);
            debug!(module = module.name, ?state, errors = list.len(), "module analyzed");
            AnalyzedModule {
                name: module.name.to_string(),
                table,
                diagnostics: list,
                state,
                interface,
                interface_hash,
            }
        })
        .collect();
    SccOutcome {
        modules,
        passes: output.passes,
    }
}

/// Store types the checker inferred for variables declared without one
fn apply_inferred(tables: &mut BTreeMap<String, SymbolTable>, module: &str, inferred: &[InferredType]) {
    for item in inferred {
        let node = semanal::scope_table_mut(tables, module, &item.classes).and_then(|t| t.lookup_mut(&item.name));
        if let Some(node) = node.filter(|n| n.ty.is_none()) {
            node.ty = Some(item.ty.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::check_sources;

    #[test]
    fn test_inferred_types_are_written_back() {
        let outcome = check_sources(&[(
            "m",
            "def make() -> int:\n    return 1\n\nx = make()\n\nclass C:\n    def __init__(self) -> None:\n        self.n = make()\n",
        )]);
        let table = &outcome.modules[0].table;
        assert_eq!(table.lookup("x").unwrap().ty, Some(Type::named(types::INT)));
        let class = table.lookup("C").unwrap().class.as_ref().unwrap();
        assert_eq!(class.members.lookup("n").unwrap().ty, Some(Type::named(types::INT)));
        assert_eq!(outcome.modules[0].state, AnalysisState::TypeChecked);
    }

    #[test]
    fn test_interface_ignores_bodies() {
        let a = check_sources(&[("m", "def f(x: int) -> int:\n    return x\n")]);
        let b = check_sources(&[("m", "def f(x: int) -> int:\n    y = x + 1\n    return y\n")]);
        let c = check_sources(&[("m", "def f(x: str) -> int:\n    return 1\n")]);
        assert_eq!(a.modules[0].interface_hash, b.modules[0].interface_hash);
        assert_ne!(a.modules[0].interface_hash, c.modules[0].interface_hash);
    }
}
