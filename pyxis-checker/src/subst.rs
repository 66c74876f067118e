//! Type variable substitution
//!
//! Used for generic instantiation: class type arguments into member types,
//! and inferred call-site bindings into a callable's signature.

use crate::types::{make_union, CallableParam, CallableType, Instance, Type};
use std::collections::HashMap;
use thiserror::Error;

/// Type variable fullname to replacement type
pub type TypeBindings = HashMap<String, Type>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubstitutionError {
    #[error("type variable \"{name}\" has no binding")]
    UnboundTypeVar { name: String },
}

/// Replace type variables according to `bindings`
///
/// Variables bound by an inner generic callable are left alone. Any other
/// variable without a binding is an internal inconsistency.
pub fn substitute(ty: &Type, bindings: &TypeBindings) -> Result<Type, SubstitutionError> {
    let mut scope = Vec::new();
    subst(ty, bindings, &mut scope)
}

fn subst(ty: &Type, bindings: &TypeBindings, scope: &mut Vec<String>) -> Result<Type, SubstitutionError> {
    Ok(match ty {
        Type::TypeVar(tv) => {
            if scope.contains(&tv.fullname) {
                ty.clone()
            } else {
                match bindings.get(&tv.fullname) {
                    Some(bound) => bound.clone(),
                    None => {
                        return Err(SubstitutionError::UnboundTypeVar {
                            name: tv.name.clone(),
                        })
                    }
                }
            }
        }
        Type::Instance(inst) => Type::Instance(subst_instance(inst, bindings, scope)?),
        Type::ClassObject(inst) => Type::ClassObject(subst_instance(inst, bindings, scope)?),
        Type::Union(items) => make_union(
            items
                .iter()
                .map(|t| subst(t, bindings, scope))
                .collect::<Result<Vec<_>, _>>()?,
        ),
        Type::Callable(callable) => {
            let depth = scope.len();
            scope.extend(
                callable
                    .type_vars
                    .iter()
                    .filter(|tv| !bindings.contains_key(&tv.fullname))
                    .map(|tv| tv.fullname.clone()),
            );
            let result = subst_callable(callable, bindings, scope);
            scope.truncate(depth);
            Type::Callable(Box::new(result?))
        }
        other => other.clone(),
    })
}

fn subst_instance(inst: &Instance, bindings: &TypeBindings, scope: &mut Vec<String>) -> Result<Instance, SubstitutionError> {
    Ok(Instance {
        class: inst.class.clone(),
        args: inst
            .args
            .iter()
            .map(|a| subst(a, bindings, scope))
            .collect::<Result<_, _>>()?,
    })
}

fn subst_callable(
    callable: &CallableType,
    bindings: &TypeBindings,
    scope: &mut Vec<String>,
) -> Result<CallableType, SubstitutionError> {
    let params = callable
        .params
        .iter()
        .map(|p| {
            Ok(CallableParam {
                name: p.name.clone(),
                ty: subst(&p.ty, bindings, scope)?,
                kind: p.kind,
            })
        })
        .collect::<Result<Vec<_>, SubstitutionError>>()?;
    Ok(CallableType {
        params,
        ret: subst(&callable.ret, bindings, scope)?,
        // variables that received a binding are no longer generic
        type_vars: callable
            .type_vars
            .iter()
            .filter(|tv| !bindings.contains_key(&tv.fullname))
            .cloned()
            .collect(),
        name: callable.name.clone(),
    })
}
