//! Flow-sensitive narrowing
//!
//! The binder keeps a stack of frames, one per open branch. Each frame maps
//! an expression key (`x`, `self.attr`) to the type it is known to have on
//! that branch. When branches rejoin, the per-branch types are unioned.

use crate::env::TypeContext;
use crate::join::simplify_union;
use crate::types::Type;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Frame {
    types: HashMap<String, Type>,
    /// Control never falls out of this branch
    pub unreachable: bool,
}

impl Frame {
    pub fn get(&self, key: &str) -> Option<&Type> {
        self.types.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.types.keys()
    }
}

#[derive(Debug)]
pub struct Binder {
    frames: Vec<Frame>,
}

impl Default for Binder {
    fn default() -> Self {
        Self::new()
    }
}

impl Binder {
    pub fn new() -> Self {
        Binder {
            frames: vec![Frame::default()],
        }
    }

    pub fn push(&mut self) {
        self.frames.push(Frame::default());
    }

    pub fn pop(&mut self) -> Frame {
        if self.frames.len() == 1 {
            return std::mem::take(&mut self.frames[0]);
        }
        self.frames.pop().unwrap_or_default()
    }

    fn top(&mut self) -> &mut Frame {
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    /// Narrowed type of `key`, innermost frame first
    pub fn get(&self, key: &str) -> Option<&Type> {
        self.frames.iter().rev().find_map(|f| f.types.get(key))
    }

    pub fn put(&mut self, key: impl Into<String>, ty: Type) {
        self.top().types.insert(key.into(), ty);
    }

    /// Forget what is known about `key` and everything reached through it
    pub fn invalidate(&mut self, key: &str) {
        let prefix = format!("{}.", key);
        let top = self.top();
        top.types.retain(|k, _| k.as_str() != key && !k.starts_with(&prefix));
        // outer narrowings no longer hold either
        let masked: Vec<String> = self.frames[..self.frames.len() - 1]
            .iter()
            .flat_map(|f| f.types.keys())
            .filter(|k| k.as_str() == key || k.starts_with(&prefix))
            .cloned()
            .collect();
        for key in masked {
            self.top().types.insert(key, Type::Never);
        }
    }

    pub fn mark_unreachable(&mut self) {
        self.top().unreachable = true;
    }

    pub fn is_unreachable(&self) -> bool {
        self.frames.iter().any(|f| f.unreachable)
    }

    /// Join the frames of alternative branches into the current frame
    ///
    /// `declared` gives the unnarrowed type of a key; a key missing from a
    /// branch has its declared (or currently narrowed) type there.
    pub fn merge(&mut self, ctx: &dyn TypeContext, branches: Vec<Frame>, declared: &dyn Fn(&str) -> Option<Type>) {
        let live: Vec<&Frame> = branches.iter().filter(|f| !f.unreachable).collect();
        if live.is_empty() {
            self.mark_unreachable();
            return;
        }
        let mut keys: Vec<&String> = live.iter().flat_map(|f| f.types.keys()).collect();
        keys.sort();
        keys.dedup();
        let mut updates = Vec::new();
        for key in keys {
            let current = self.get(key).cloned().filter(|t| *t != Type::Never).or_else(|| declared(key));
            let mut items = Vec::new();
            let mut known = true;
            for frame in &live {
                match frame.types.get(key.as_str()).or(current.as_ref()) {
                    Some(Type::Never) | None => {
                        known = false;
                        break;
                    }
                    Some(ty) => items.push(ty.clone()),
                }
            }
            updates.push((key.clone(), known.then(|| simplify_union(ctx, items))));
        }
        for (key, ty) in updates {
            match ty {
                Some(ty) => self.put(key, ty),
                None => {
                    self.top().types.remove(&key);
                    if self.get(&key).is_some() {
                        self.put(key, Type::Never);
                    }
                }
            }
        }
    }

    /// Current narrowing of `key`; `Never` marks a masked entry
    pub fn narrowed(&self, key: &str) -> Option<Type> {
        self.get(key).filter(|t| **t != Type::Never).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ClassFixture;
    use crate::types::{make_union, INT, STR};

    #[test]
    fn test_branch_merge_unions_types() {
        let fx = ClassFixture::standard();
        let declared = |_: &str| Some(make_union(vec![Type::named(INT), Type::named(STR), Type::None]));
        let mut binder = Binder::new();

        binder.push();
        binder.put("x", Type::named(INT));
        let then = binder.pop();
        binder.push();
        binder.put("x", Type::named(STR));
        let orelse = binder.pop();
        binder.merge(&fx, vec![then, orelse], &declared);
        assert_eq!(
            binder.narrowed("x"),
            Some(make_union(vec![Type::named(INT), Type::named(STR)]))
        );
    }

    #[test]
    fn test_unreachable_branch_is_ignored() {
        let fx = ClassFixture::standard();
        let declared = |_: &str| Some(make_union(vec![Type::named(INT), Type::None]));
        let mut binder = Binder::new();

        binder.push();
        binder.mark_unreachable();
        let then = binder.pop();
        binder.push();
        binder.put("x", Type::named(INT));
        let orelse = binder.pop();
        binder.merge(&fx, vec![then, orelse], &declared);
        assert_eq!(binder.narrowed("x"), Some(Type::named(INT)));
        assert!(!binder.is_unreachable());
    }

    #[test]
    fn test_missing_key_falls_back_to_declared() {
        let fx = ClassFixture::standard();
        let optional = make_union(vec![Type::named(INT), Type::None]);
        let declared = |_: &str| Some(make_union(vec![Type::named(INT), Type::None]));
        let mut binder = Binder::new();

        binder.push();
        binder.put("x", Type::named(INT));
        let then = binder.pop();
        binder.push();
        let orelse = binder.pop();
        binder.merge(&fx, vec![then, orelse], &declared);
        assert_eq!(binder.narrowed("x"), Some(optional));
    }

    #[test]
    fn test_invalidate_masks_outer_narrowing() {
        let mut binder = Binder::new();
        binder.put("self.x", Type::named(INT));
        binder.push();
        binder.invalidate("self");
        assert_eq!(binder.narrowed("self.x"), None);
        binder.pop();
        assert_eq!(binder.narrowed("self.x"), Some(Type::named(INT)));
    }
}
