//! Name lookup
//!
//! Module-level names are visible everywhere in the module. A class body is
//! a nested scope, visible only from the body itself (not from its methods).
//! Anything not found falls back to the names `builtins` exports.

use crate::env::{Env, BUILTINS};
use crate::symbols::{SymbolFlags, SymbolKind, SymbolNode, SymbolTable};

/// Outcome of a name lookup
#[derive(Debug, Clone)]
pub enum Lookup<'a> {
    Found(&'a SymbolNode),
    /// A submodule reached through a package attribute
    Module(String),
    /// The module could not be analyzed; everything in it is `Any`
    Opaque,
    /// Bound to a placeholder; try again in a later pass
    Pending,
    Missing,
}

fn classify(node: &SymbolNode) -> Lookup<'_> {
    if node.kind == SymbolKind::Placeholder {
        Lookup::Pending
    } else {
        Lookup::Found(node)
    }
}

/// Where a name is being looked up from
#[derive(Debug, Clone, Copy)]
pub struct Scope<'s> {
    pub module: &'s str,
    /// Enclosing class bodies, outermost first
    pub classes: &'s [String],
    pub in_function: bool,
}

impl<'s> Scope<'s> {
    pub fn module_level(module: &'s str) -> Self {
        Scope {
            module,
            classes: &[],
            in_function: false,
        }
    }

    pub fn class_body(module: &'s str, classes: &'s [String]) -> Self {
        Scope {
            module,
            classes,
            in_function: false,
        }
    }

    pub fn function_body(module: &'s str, classes: &'s [String]) -> Self {
        Scope {
            module,
            classes,
            in_function: true,
        }
    }

    /// Fully-qualified name of a definition in this scope
    pub fn fullname(&self, name: &str) -> String {
        let mut parts = vec![self.module];
        parts.extend(self.classes.iter().map(String::as_str));
        parts.push(name);
        parts.join(".")
    }

    /// Innermost enclosing class, if any
    pub fn class_fullname(&self) -> Option<String> {
        if self.classes.is_empty() {
            return None;
        }
        let mut parts = vec![self.module];
        parts.extend(self.classes.iter().map(String::as_str));
        Some(parts.join("."))
    }

    /// Members of the innermost enclosing class
    pub fn class_table<'a>(&self, env: &Env<'a>) -> Option<&'a SymbolTable> {
        let (first, rest) = self.classes.split_first()?;
        let mut node = env.module(self.module)?.lookup(first)?;
        for name in rest {
            node = node.class.as_ref()?.members.lookup(name)?;
        }
        node.class.as_ref().map(|info| &info.members)
    }

    pub fn lookup<'a>(&self, env: &Env<'a>, name: &str) -> Lookup<'a> {
        if !self.in_function {
            if let Some(node) = self
                .class_table(env)
                .and_then(|t| t.lookup(name))
                .filter(|n| !n.flags.contains(SymbolFlags::INSTANCE_ATTR))
            {
                return classify(node);
            }
        }
        if let Some(node) = env.module(self.module).and_then(|t| t.lookup(name)) {
            return classify(node);
        }
        if self.module != BUILTINS {
            if let Some(node) = env.lookup_builtin(name).filter(|n| n.is_exported()) {
                return classify(node);
            }
        }
        Lookup::Missing
    }
}

/// Attribute of a module: a name in its table or a submodule
pub fn lookup_module_attr<'a>(env: &Env<'a>, module: &str, name: &str) -> Lookup<'a> {
    let table = match env.module(module) {
        Some(table) if !table.is_opaque() => table,
        _ => return Lookup::Opaque,
    };
    if let Some(node) = table.lookup(name) {
        return classify(node);
    }
    let submodule = format!("{}.{}", module, name);
    if env.module(&submodule).is_some() {
        return Lookup::Module(submodule);
    }
    Lookup::Missing
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::env::{AnalysisOptions, ModuleMap};
    use crate::symbols::{ClassInfo, SymbolNode};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    #[test]
    fn test_class_scope_is_not_visible_from_methods() {
        let mut class = SymbolNode::new("C", "m.C", SymbolKind::Class, 1);
        let mut info = ClassInfo::new("m.C");
        info.members.declare(SymbolNode::new("attr", "m.C.attr", SymbolKind::Variable, 2));
        class.class = Some(Box::new(info));
        let mut table = SymbolTable::new();
        table.declare(class);
        table.declare(SymbolNode::new("pending", "m.pending", SymbolKind::Placeholder, 3));
        let mut local = BTreeMap::new();
        local.insert("m".to_string(), table);

        let mut builtins = SymbolTable::new();
        builtins.declare(SymbolNode::new("len", "builtins.len", SymbolKind::Function, 1));
        let deps: ModuleMap = im::HashMap::unit(BUILTINS.to_string(), Arc::new(builtins));
        let options = AnalysisOptions::default();
        let env = Env::new(&deps, &local, &options);

        let classes = vec!["C".to_string()];
        let body = Scope::class_body("m", &classes);
        let method = Scope::function_body("m", &classes);
        assert!(matches!(body.lookup(&env, "attr"), Lookup::Found(_)));
        assert!(matches!(method.lookup(&env, "attr"), Lookup::Missing));
        assert!(matches!(method.lookup(&env, "len"), Lookup::Found(_)));
        assert!(matches!(method.lookup(&env, "pending"), Lookup::Pending));
        assert_eq!(body.fullname("x"), "m.C.x");
        assert!(matches!(lookup_module_attr(&env, "missing", "x"), Lookup::Opaque));
    }
}
