//! Symbol tables
//!
//! A [`SymbolTable`] maps names in one scope (a module or a class body) to a
//! single live [`SymbolNode`]. Tables are ordered maps so that serialization
//! and interface hashing are deterministic.

use crate::types::{Instance, Type, TypeVarDef};
use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declaration kind of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Variable,
    Function,
    Class,
    TypeAlias,
    TypeVar,
    ModuleRef,
    /// Bound to an expression that could not be analyzed yet; references
    /// to it are deferred
    Placeholder,
}

impl SymbolKind {
    pub fn describe(self) -> &'static str {
        match self {
            SymbolKind::Variable => "Variable",
            SymbolKind::Function => "Function",
            SymbolKind::Class => "Class",
            SymbolKind::TypeAlias => "Type alias",
            SymbolKind::TypeVar => "Type variable",
            SymbolKind::ModuleRef => "Module",
            SymbolKind::Placeholder => "Name",
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct SymbolFlags: u8 {
        /// Visible to importers (no leading underscore)
        const EXPORTED = 0b0000_0001;
        /// Replaced an earlier definition of the same name
        const REDEFINED = 0b0000_0010;
        /// Bound by an import statement
        const IMPORTED = 0b0000_0100;
        /// Type came from an annotation rather than inference
        const EXPLICIT_TYPE = 0b0000_1000;
        /// Module attribute defined by the runtime (`__name__`, ...)
        const IMPLICIT = 0b0001_0000;
        /// Instance attribute defined through `self.x = ...`
        const INSTANCE_ATTR = 0b0010_0000;
        /// `@staticmethod`; never bound to a receiver
        const STATICMETHOD = 0b0100_0000;
        /// `@classmethod`; bound to the class object
        const CLASSMETHOD = 0b1000_0000;
    }
}

/// A class definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassInfo {
    pub fullname: String,
    /// Direct bases, with type arguments expressed in this class's type
    /// variables
    pub bases: Vec<Instance>,
    /// Method resolution order, starting with the class itself
    pub mro: Vec<String>,
    pub type_vars: Vec<TypeVarDef>,
    pub members: SymbolTable,
    /// A base could not be resolved to a class; unknown attributes are `Any`
    pub fallback_to_any: bool,
}

impl ClassInfo {
    pub fn new(fullname: impl Into<String>) -> Self {
        ClassInfo {
            fullname: fullname.into(),
            bases: Vec::new(),
            mro: Vec::new(),
            type_vars: Vec::new(),
            members: SymbolTable::new(),
            fallback_to_any: false,
        }
    }

    /// `C[T1, T2]` in terms of the class's own type variables
    pub fn self_instance(&self) -> Instance {
        Instance {
            class: self.fullname.clone(),
            args: self.type_vars.iter().cloned().map(Type::TypeVar).collect(),
        }
    }

    /// MRO is known once every base has been resolved
    pub fn is_ready(&self) -> bool {
        !self.mro.is_empty()
    }
}

/// Binding of one name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolNode {
    pub name: String,
    /// Fully-qualified name of the definition; for imported names this is
    /// the name in the defining module
    pub fullname: String,
    pub kind: SymbolKind,
    /// Declared or inferred type; `None` until inferred
    pub ty: Option<Type>,
    /// Present on the defining node of a class
    pub class: Option<Box<ClassInfo>>,
    pub flags: SymbolFlags,
    /// 1-based definition line
    pub line: u32,
}

impl SymbolNode {
    pub fn new(name: impl Into<String>, fullname: impl Into<String>, kind: SymbolKind, line: u32) -> Self {
        let name = name.into();
        let flags = if name.starts_with('_') {
            SymbolFlags::empty()
        } else {
            SymbolFlags::EXPORTED
        };
        SymbolNode {
            name,
            fullname: fullname.into(),
            kind,
            ty: None,
            class: None,
            flags,
            line,
        }
    }

    pub fn with_type(mut self, ty: Type) -> Self {
        self.ty = Some(ty);
        self
    }

    pub fn with_flags(mut self, flags: SymbolFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_exported(&self) -> bool {
        self.flags.contains(SymbolFlags::EXPORTED)
    }
}

/// Result of [`SymbolTable::declare`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclareOutcome {
    /// New name
    Inserted,
    /// The same definition seen again in a later pass
    Updated,
    /// A later definition of the name already exists; it stays bound
    Shadowed,
    /// The name is already a variable; later assignments do not rebind it
    Existing,
    /// Incompatible redefinition; the binding was replaced
    Conflict { previous_line: u32, previous_kind: SymbolKind },
}

/// Names of one scope
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SymbolTable {
    entries: BTreeMap<String, SymbolNode>,
    /// Stand-in for a module that could not be analyzed: every lookup
    /// yields `Any`
    opaque: bool,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opaque() -> Self {
        SymbolTable {
            entries: BTreeMap::new(),
            opaque: true,
        }
    }

    pub fn is_opaque(&self) -> bool {
        self.opaque
    }

    pub fn lookup(&self, name: &str) -> Option<&SymbolNode> {
        self.entries.get(name)
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut SymbolNode> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Bind a definition, enforcing one live node per name
    pub fn declare(&mut self, mut node: SymbolNode) -> DeclareOutcome {
        let Some(existing) = self.entries.get(&node.name) else {
            self.entries.insert(node.name.clone(), node);
            return DeclareOutcome::Inserted;
        };

        if existing.line == node.line {
            if node.flags.contains(SymbolFlags::INSTANCE_ATTR) && existing.kind == SymbolKind::Variable {
                // two `self.x = ...` in one line cannot happen; keep the first
                return DeclareOutcome::Existing;
            }
            // keep a redefinition mark across passes
            node.flags |= existing.flags & SymbolFlags::REDEFINED;
            self.entries.insert(node.name.clone(), node);
            return DeclareOutcome::Updated;
        }
        if existing.line > node.line {
            return DeclareOutcome::Shadowed;
        }

        let compatible = match (existing.kind, node.kind) {
            (SymbolKind::Variable, SymbolKind::Variable) => true,
            (SymbolKind::ModuleRef, SymbolKind::ModuleRef) => existing.fullname == node.fullname,
            (_, _) if node.flags.contains(SymbolFlags::IMPORTED) => existing.fullname == node.fullname,
            (SymbolKind::Placeholder, _) | (_, SymbolKind::Placeholder) => true,
            _ => false,
        };
        if compatible {
            if existing.kind == SymbolKind::Placeholder && node.kind != SymbolKind::Placeholder {
                self.entries.insert(node.name.clone(), node);
                return DeclareOutcome::Updated;
            }
            return DeclareOutcome::Existing;
        }

        let previous_line = existing.line;
        let previous_kind = existing.kind;
        node.flags |= SymbolFlags::REDEFINED;
        self.entries.insert(node.name.clone(), node);
        DeclareOutcome::Conflict {
            previous_line,
            previous_kind,
        }
    }

    /// Replace or add a binding without conflict checks
    pub fn insert(&mut self, node: SymbolNode) {
        self.entries.insert(node.name.clone(), node);
    }

    pub fn remove(&mut self, name: &str) -> Option<SymbolNode> {
        self.entries.remove(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SymbolNode)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut SymbolNode)> {
        self.entries.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exported names, for star imports and interface summaries
    pub fn exported(&self) -> impl Iterator<Item = &SymbolNode> {
        self.entries.values().filter(|n| n.is_exported())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, kind: SymbolKind, line: u32) -> SymbolNode {
        SymbolNode::new(name, format!("m.{}", name), kind, line)
    }

    #[test]
    fn test_declare_and_lookup() {
        let mut table = SymbolTable::new();
        assert_eq!(table.declare(node("x", SymbolKind::Variable, 1)), DeclareOutcome::Inserted);
        assert_eq!(table.lookup("x").map(|n| n.kind), Some(SymbolKind::Variable));
        assert!(table.lookup("y").is_none());
        assert!(table.lookup("x").map(|n| n.is_exported()).unwrap_or(false));
        table.declare(node("_private", SymbolKind::Variable, 2));
        assert_eq!(table.exported().count(), 1);
    }

    #[test]
    fn test_redefinition_conflict() {
        let mut table = SymbolTable::new();
        table.declare(node("f", SymbolKind::Function, 1));
        let outcome = table.declare(node("f", SymbolKind::Class, 4));
        assert_eq!(
            outcome,
            DeclareOutcome::Conflict {
                previous_line: 1,
                previous_kind: SymbolKind::Function
            }
        );
        let live = table.lookup("f").unwrap();
        assert_eq!(live.kind, SymbolKind::Class);
        assert!(live.flags.contains(SymbolFlags::REDEFINED));
    }

    #[test]
    fn test_later_passes_do_not_conflict() {
        let mut table = SymbolTable::new();
        table.declare(node("f", SymbolKind::Function, 1));
        table.declare(node("f", SymbolKind::Function, 5));
        // second pass revisits both definitions in program order
        assert_eq!(table.declare(node("f", SymbolKind::Function, 1)), DeclareOutcome::Shadowed);
        assert_eq!(table.declare(node("f", SymbolKind::Function, 5)), DeclareOutcome::Updated);
        assert_eq!(table.lookup("f").unwrap().line, 5);
    }

    #[test]
    fn test_variable_reassignment_keeps_first_binding() {
        let mut table = SymbolTable::new();
        table.declare(node("x", SymbolKind::Variable, 1).with_type(Type::named("builtins.int")));
        assert_eq!(table.declare(node("x", SymbolKind::Variable, 3)), DeclareOutcome::Existing);
        assert_eq!(table.lookup("x").unwrap().line, 1);
    }

    #[test]
    fn test_table_serializes() {
        let mut table = SymbolTable::new();
        let mut class = node("A", SymbolKind::Class, 1);
        class.class = Some(Box::new(ClassInfo::new("m.A")));
        table.declare(class);
        let json = serde_json::to_string(&table).unwrap();
        let back: SymbolTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
    }
}
