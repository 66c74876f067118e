//! Module interfaces
//!
//! The interface of a module is what importers can observe: every module-level
//! binding with its kind and type, and every member of its classes. Private
//! names are included since `from m import _helper` and `obj._attr` still
//! reach them. Definition lines and function bodies are left out, so editing
//! a body keeps the interface hash unchanged.

use crate::symbols::{SymbolFlags, SymbolKind, SymbolNode, SymbolTable};
use crate::types::Type;
use pyxis_syntax::ContentHasher;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceSummary {
    pub module: String,
    pub entries: BTreeMap<String, InterfaceEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceEntry {
    pub fullname: String,
    pub kind: SymbolKind,
    pub ty: Option<Type>,
    pub class: Option<ClassSummary>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassSummary {
    pub mro: Vec<String>,
    pub bases: Vec<String>,
    pub type_vars: Vec<String>,
    pub fallback_to_any: bool,
    pub members: BTreeMap<String, InterfaceEntry>,
}

fn entry(node: &SymbolNode) -> InterfaceEntry {
    let class = node.class.as_ref().map(|info| ClassSummary {
        mro: info.mro.clone(),
        bases: info.bases.iter().map(|b| format!("{:?}", b)).collect(),
        type_vars: info.type_vars.iter().map(|tv| tv.fullname.clone()).collect(),
        fallback_to_any: info.fallback_to_any,
        members: info
            .members
            .iter()
            .map(|(name, member)| (name.clone(), entry(member)))
            .collect(),
    });
    InterfaceEntry {
        fullname: node.fullname.clone(),
        kind: node.kind,
        ty: node.ty.clone(),
        class,
    }
}

impl InterfaceSummary {
    pub fn from_table(module: &str, table: &SymbolTable) -> Self {
        let entries = table
            .iter()
            .filter(|(_, node)| !node.flags.contains(SymbolFlags::IMPLICIT))
            .map(|(name, node)| (name.clone(), entry(node)))
            .collect();
        InterfaceSummary {
            module: module.to_string(),
            entries,
        }
    }

    /// Summary of a module that could not be analyzed
    pub fn opaque(module: &str) -> Self {
        InterfaceSummary {
            module: module.to_string(),
            entries: BTreeMap::new(),
        }
    }

    /// Deterministic hex digest of the summary
    pub fn hash(&self) -> String {
        let mut hasher = ContentHasher::new();
        hasher.write_field(b'M', &self.module);
        for (name, entry) in &self.entries {
            hasher.write_field(b'N', name);
            hasher.write_str(&format!("{:?}", entry));
        }
        hasher.finalize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::ClassInfo;
    use crate::types::{INT, STR};

    fn table(helper_line: u32, helper_return: &str, cache_ty: &str) -> SymbolTable {
        let mut table = SymbolTable::new();
        table.declare(SymbolNode::new("x", "m.x", SymbolKind::Variable, 1).with_type(Type::named(INT)));
        table.declare(
            SymbolNode::new("_helper", "m._helper", SymbolKind::Function, helper_line)
                .with_type(Type::named(helper_return)),
        );
        let mut class = SymbolNode::new("C", "m.C", SymbolKind::Class, 3);
        let mut info = ClassInfo::new("m.C");
        info.members.declare(SymbolNode::new("__init__", "m.C.__init__", SymbolKind::Function, 4));
        info.members
            .declare(SymbolNode::new("_cache", "m.C._cache", SymbolKind::Variable, 5).with_type(Type::named(cache_ty)));
        class.class = Some(Box::new(info));
        table.declare(class);
        table
    }

    #[test]
    fn test_moved_definitions_keep_hash() {
        let a = InterfaceSummary::from_table("m", &table(2, INT, INT));
        let b = InterfaceSummary::from_table("m", &table(9, INT, INT));
        assert_eq!(a.hash(), b.hash());
        let members = &a.entries["C"].class.as_ref().unwrap().members;
        assert!(members.contains_key("__init__"));
        assert!(members.contains_key("_cache"));
    }

    #[test]
    fn test_private_signature_change_alters_hash() {
        let a = InterfaceSummary::from_table("m", &table(2, INT, INT));
        let helper = InterfaceSummary::from_table("m", &table(2, STR, INT));
        let member = InterfaceSummary::from_table("m", &table(2, INT, STR));
        assert_ne!(a.hash(), helper.hash());
        assert_ne!(a.hash(), member.hash());
        assert_ne!(a.hash(), InterfaceSummary::opaque("m").hash());
    }
}
