//! Test helpers: hand-built class hierarchies for the type algebra, and
//! whole-source analysis on top of the embedded stubs

use crate::builtins::analyze_builtins;
use crate::env::{AnalysisOptions, TypeContext};
use crate::semanal::SccModule;
use crate::symbols::ClassInfo;
use crate::types::*;
use crate::{analyze_scc, SccOutcome};
use pyxis_syntax::{parse_module, FileId, LineIndex};
use std::collections::HashMap;

/// Analyze `sources` as a single SCC, in the given order
pub fn check_sources(sources: &[(&str, &str)]) -> SccOutcome {
    check_sources_with(sources, &AnalysisOptions::default())
}

pub fn check_sources_with(sources: &[(&str, &str)], options: &AnalysisOptions) -> SccOutcome {
    let deps = analyze_builtins(options).expect("embedded stubs parse");
    let parsed: Vec<_> = sources
        .iter()
        .enumerate()
        .map(|(i, (name, source))| {
            let ast = parse_module(source, FileId::new(100 + i as u32))
                .unwrap_or_else(|e| panic!("{}: {}", name, e));
            (ast, LineIndex::new(source))
        })
        .collect();
    let modules: Vec<SccModule<'_>> = sources
        .iter()
        .zip(&parsed)
        .map(|((name, _), (ast, lines))| SccModule {
            name,
            ast,
            lines,
            is_package: false,
            is_stub: false,
        })
        .collect();
    analyze_scc(&modules, &deps, options)
}

/// Diagnostics of one module rendered as `line:col: severity: message`
pub fn rendered(outcome: &SccOutcome, module: &str) -> Vec<String> {
    outcome
        .modules
        .iter()
        .filter(|m| m.name == module)
        .flat_map(|m| m.diagnostics.iter().map(|d| d.to_string()))
        .collect()
}

/// Diagnostics of a single-module program
pub fn check_program(source: &str) -> Vec<String> {
    rendered(&check_sources(&[("m", source)]), "m")
}

pub struct ClassFixture {
    classes: HashMap<String, ClassInfo>,
    strict: bool,
}

fn type_var(name: &str, variance: Variance) -> TypeVarDef {
    TypeVarDef {
        name: name.to_string(),
        fullname: format!("m.{}", name),
        variance,
    }
}

impl ClassFixture {
    /// `object`, `int`, `float`, `bool(int)`, `str`, `function`, `type`,
    /// `list[T]`, `A`, `B(A)`, `C(A)`, `D(B)`, `E` (unrelated),
    /// covariant `Box[T_co]` and contravariant `Sink[T_contra]`
    pub fn standard() -> Self {
        let mut fx = ClassFixture {
            classes: HashMap::new(),
            strict: true,
        };
        fx.add(OBJECT, &[], vec![]);
        for name in [INT, FLOAT, STR, FUNCTION, TYPE, "m.A", "m.E"] {
            fx.add(name, &[OBJECT], vec![]);
        }
        fx.add(BOOL, &[INT], vec![]);
        fx.add("m.B", &["m.A"], vec![]);
        fx.add("m.C", &["m.A"], vec![]);
        fx.add("m.D", &["m.B"], vec![]);
        fx.add(LIST, &[OBJECT], vec![type_var("T", Variance::Invariant)]);
        fx.add("m.Box", &[OBJECT], vec![type_var("T_co", Variance::Covariant)]);
        fx.add("m.Sink", &[OBJECT], vec![type_var("T_contra", Variance::Contravariant)]);
        fx
    }

    pub fn non_strict(mut self) -> Self {
        self.strict = false;
        self
    }

    pub fn without_object(mut self) -> Self {
        self.classes.remove(OBJECT);
        for info in self.classes.values_mut() {
            info.mro.retain(|c| c != OBJECT);
            info.bases.retain(|b| b.class != OBJECT);
        }
        self
    }

    pub fn inst(&self, name: &str) -> Type {
        Type::named(name)
    }

    fn add(&mut self, name: &str, bases: &[&str], type_vars: Vec<TypeVarDef>) {
        let mut info = ClassInfo::new(name);
        info.type_vars = type_vars;
        info.bases = bases
            .iter()
            .map(|b| Instance {
                class: b.to_string(),
                args: Vec::new(),
            })
            .collect();
        let mut mro = vec![name.to_string()];
        for base in bases {
            if let Some(base_info) = self.classes.get(*base) {
                for entry in &base_info.mro {
                    if !mro.contains(entry) {
                        mro.push(entry.clone());
                    }
                }
            }
        }
        info.mro = mro;
        self.classes.insert(name.to_string(), info);
    }
}

impl TypeContext for ClassFixture {
    fn class_info(&self, fullname: &str) -> Option<&ClassInfo> {
        self.classes.get(fullname)
    }

    fn strict_optional(&self) -> bool {
        self.strict
    }
}
