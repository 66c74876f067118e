//! Lookup environment
//!
//! Everything an analysis step may read: the published symbol tables of
//! already-analyzed modules (an immutable snapshot) and the tables of the
//! SCC currently being analyzed.

use crate::subst::{substitute, TypeBindings};
use crate::symbols::{ClassInfo, SymbolKind, SymbolNode, SymbolTable};
use crate::types::{Instance, Type, OBJECT};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Published symbol tables keyed by module name
pub type ModuleMap = im::HashMap<String, Arc<SymbolTable>>;

pub const BUILTINS: &str = "builtins";
pub const TYPING: &str = "typing";

/// Analysis settings derived from the build options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisOptions {
    pub python_version: (u32, u32),
    pub strict_optional: bool,
    /// Slack added to the SCC size when capping semantic analysis passes
    pub extra_pass_budget: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        AnalysisOptions {
            python_version: (3, 11),
            strict_optional: true,
            extra_pass_budget: 2,
        }
    }
}

/// What the type algebra needs to know about classes
pub trait TypeContext {
    fn class_info(&self, fullname: &str) -> Option<&ClassInfo>;

    fn strict_optional(&self) -> bool;

    fn has_object(&self) -> bool {
        self.class_info(OBJECT).is_some()
    }

    /// View `inst` as an instance of its ancestor `ancestor`, translating
    /// type arguments through the base class list
    fn map_to_supertype(&self, inst: &Instance, ancestor: &str) -> Option<Instance> {
        if inst.class == ancestor {
            return Some(inst.clone());
        }
        let info = self.class_info(&inst.class)?;
        let bindings = class_bindings(info, &inst.args);
        for base in &info.bases {
            let mapped = match substitute(&Type::Instance(base.clone()), &bindings) {
                Ok(Type::Instance(mapped)) => mapped,
                _ => continue,
            };
            if let Some(found) = self.map_to_supertype(&mapped, ancestor) {
                return Some(found);
            }
        }
        None
    }
}

/// Bind a class's type variables to concrete arguments; missing arguments
/// are `Any`
pub fn class_bindings(info: &ClassInfo, args: &[Type]) -> TypeBindings {
    info.type_vars
        .iter()
        .enumerate()
        .map(|(i, tv)| {
            (
                tv.fullname.clone(),
                args.get(i)
                    .cloned()
                    .unwrap_or(Type::Any(crate::types::AnyKind::Special)),
            )
        })
        .collect()
}

/// Read-only view used during analysis of one SCC
pub struct Env<'a> {
    deps: &'a ModuleMap,
    local: &'a BTreeMap<String, SymbolTable>,
    pub options: &'a AnalysisOptions,
}

impl<'a> Env<'a> {
    pub fn new(deps: &'a ModuleMap, local: &'a BTreeMap<String, SymbolTable>, options: &'a AnalysisOptions) -> Self {
        Env { deps, local, options }
    }

    /// Symbol table of a module, from the current SCC or the snapshot
    pub fn module(&self, name: &str) -> Option<&'a SymbolTable> {
        self.local
            .get(name)
            .or_else(|| self.deps.get(name).map(|t| t.as_ref()))
    }

    pub fn is_local(&self, module: &str) -> bool {
        self.local.contains_key(module)
    }

    pub fn builtins(&self) -> Option<&'a SymbolTable> {
        self.module(BUILTINS)
    }

    pub fn lookup_builtin(&self, name: &str) -> Option<&'a SymbolNode> {
        self.builtins().and_then(|t| t.lookup(name))
    }

    /// Resolve a fully-qualified name such as `pkg.mod.Class.attr`
    pub fn lookup_fullname(&self, fullname: &str) -> Option<&'a SymbolNode> {
        let mut split = fullname.len();
        while let Some(dot) = fullname[..split].rfind('.') {
            let (module, rest) = (&fullname[..dot], &fullname[dot + 1..]);
            if let Some(table) = self.module(module) {
                return lookup_path(table, rest);
            }
            split = dot;
        }
        None
    }

    /// Follow an imported binding to the node in its defining module
    pub fn resolve_node(&self, node: &'a SymbolNode) -> &'a SymbolNode {
        let mut current = node;
        for _ in 0..8 {
            if current.kind == SymbolKind::ModuleRef || current.class.is_some() {
                return current;
            }
            match self.lookup_fullname(&current.fullname) {
                Some(target) if !std::ptr::eq(target, current) && target.fullname == current.fullname => {
                    current = target
                }
                _ => return current,
            }
        }
        current
    }

    /// Attribute of an instance, searched along the MRO
    pub fn find_member(&self, class: &str, name: &str) -> Option<(&'a ClassInfo, &'a SymbolNode)> {
        let info = self.class(class)?;
        for ancestor in &info.mro {
            if let Some(base) = self.class(ancestor) {
                if let Some(node) = base.members.lookup(name) {
                    return Some((base, node));
                }
            }
        }
        None
    }

    /// Class definition by fullname
    pub fn class(&self, fullname: &str) -> Option<&'a ClassInfo> {
        self.lookup_fullname(fullname)
            .and_then(|node| node.class.as_deref())
    }
}

fn lookup_path<'t>(table: &'t SymbolTable, path: &str) -> Option<&'t SymbolNode> {
    let mut parts = path.split('.');
    let mut node = table.lookup(parts.next()?)?;
    for part in parts {
        node = node.class.as_ref()?.members.lookup(part)?;
    }
    Some(node)
}

impl<'a> TypeContext for Env<'a> {
    fn class_info(&self, fullname: &str) -> Option<&ClassInfo> {
        self.class(fullname)
    }

    fn strict_optional(&self) -> bool {
        self.options.strict_optional
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::SymbolNode;

    fn class_node(module: &str, name: &str, mro: &[&str]) -> SymbolNode {
        let mut node = SymbolNode::new(name, format!("{}.{}", module, name), SymbolKind::Class, 1);
        let mut info = ClassInfo::new(format!("{}.{}", module, name));
        info.mro = mro.iter().map(|s| s.to_string()).collect();
        node.class = Some(Box::new(info));
        node
    }

    #[test]
    fn test_lookup_fullname_across_tables() {
        let mut builtins = SymbolTable::new();
        builtins.declare(class_node("builtins", "object", &["builtins.object"]));
        let deps: ModuleMap = im::HashMap::unit("builtins".to_string(), Arc::new(builtins));

        let mut a = SymbolTable::new();
        a.declare(class_node("pkg.a", "A", &["pkg.a.A", "builtins.object"]));
        let mut local = BTreeMap::new();
        local.insert("pkg.a".to_string(), a);

        let options = AnalysisOptions::default();
        let env = Env::new(&deps, &local, &options);
        assert!(env.lookup_fullname("pkg.a.A").is_some());
        assert!(env.class("builtins.object").is_some());
        assert!(env.lookup_fullname("pkg.b.B").is_none());
        assert!(env.has_object());
        assert_eq!(env.find_member("pkg.a.A", "missing").map(|(c, _)| c.fullname.clone()), None);
    }
}
