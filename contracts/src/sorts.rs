// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Infer and check the sorts of terms.
//!
//! Terms handed to the engine are fully resolved, so unlike a front-end sort
//! checker there is no unification here: a [`Scope`] supplies the sorts of
//! the receiver and the free identifiers, and [`Scope::sort_of`] walks the
//! term.

use crate::decls::Module;
use crate::syntax::*;
use std::collections::HashMap;
use thiserror::Error;

/// An error encountered while sorting a term
#[derive(Error, Debug, PartialEq)]
pub enum SortError {
    /// The term referred to a variable that was not declared.
    #[error("unknown variable {0}")]
    UnknownVariable(String),
    /// The term referred to the receiver, but the scope has none.
    #[error("no receiver in scope")]
    UnknownReceiver,
    /// The term referred to a class that the module does not declare.
    #[error("unknown class {0}")]
    UnknownClass(String),
    /// A field selection on a sort that has no such field.
    #[error("sort {0} has no field {1}")]
    NoSuchField(Sort, String),
    /// An indexing operation on a sort that is not a sequence or map.
    #[error("sort {0} cannot be indexed")]
    NotIndexable(Sort),
    /// A cardinality of a non-collection sort.
    #[error("sort {0} has no cardinality")]
    NoCardinality(Sort),
    /// The sort of `null` depends on context and cannot be inferred.
    #[error("null has no sort of its own")]
    UntypedNull,
}

/// The sorting environment for a term: the module's class declarations, the
/// receiver's sort, and the sorts of free identifiers.
#[derive(Clone)]
pub struct Scope<'a> {
    module: Option<&'a Module>,
    this: Option<Sort>,
    vars: HashMap<String, Sort>,
}

impl<'a> Scope<'a> {
    /// An empty scope over the given module.
    pub fn new(module: &'a Module) -> Self {
        Scope {
            module: Some(module),
            this: None,
            vars: HashMap::new(),
        }
    }

    /// A scope with no module (field selection will fail to sort).
    pub fn detached() -> Self {
        Scope {
            module: None,
            this: None,
            vars: HashMap::new(),
        }
    }

    /// Set the receiver sort.
    pub fn with_this(mut self, sort: Sort) -> Self {
        self.this = Some(sort);
        self
    }

    /// Bind an identifier to a sort.
    pub fn bind(&mut self, name: &str, sort: Sort) {
        self.vars.insert(name.to_string(), sort);
    }

    /// Bind every binder in the slice.
    pub fn bind_all(mut self, binders: &[Binder]) -> Self {
        for b in binders {
            self.vars.insert(b.name.clone(), b.sort.clone());
        }
        self
    }

    /// The sort a free identifier is bound to, if any.
    pub fn var_sort(&self, name: &str) -> Option<&Sort> {
        self.vars.get(name)
    }

    /// Compute the sort of a term in this scope.
    pub fn sort_of(&self, term: &Term) -> Result<Sort, SortError> {
        self.sort_of_rec(term, &im::HashMap::new())
    }

    fn sort_of_rec(
        &self,
        term: &Term,
        locals: &im::HashMap<String, Sort>,
    ) -> Result<Sort, SortError> {
        match term {
            Term::Literal(lit) => lit.sort().ok_or(SortError::UntypedNull),
            Term::Id(name) => locals
                .get(name)
                .or_else(|| self.vars.get(name))
                .cloned()
                .ok_or_else(|| SortError::UnknownVariable(name.clone())),
            Term::This => self.this.clone().ok_or(SortError::UnknownReceiver),
            Term::Field(obj, field) => {
                let obj_sort = self.sort_of_rec(obj, locals)?;
                let Sort::Object(class_name) = &obj_sort else {
                    return Err(SortError::NoSuchField(obj_sort, field.clone()));
                };
                let class = self
                    .module
                    .and_then(|m| m.find_class(class_name))
                    .ok_or_else(|| SortError::UnknownClass(class_name.clone()))?;
                class
                    .field_sort(field)
                    .cloned()
                    .ok_or_else(|| SortError::NoSuchField(obj_sort.clone(), field.clone()))
            }
            Term::Select(coll, _) => match self.sort_of_rec(coll, locals)? {
                Sort::Seq(elt) => Ok(*elt),
                Sort::Map(_, value) => Ok(*value),
                other => Err(SortError::NotIndexable(other)),
            },
            Term::UnaryOp(UOp::Not, _) => Ok(Sort::Bool),
            Term::UnaryOp(UOp::Card, coll) => match self.sort_of_rec(coll, locals)? {
                Sort::Set(_) | Sort::Seq(_) | Sort::Map(..) | Sort::String => Ok(Sort::Int),
                other => Err(SortError::NoCardinality(other)),
            },
            Term::BinOp(..) | Term::NAryOp(..) => Ok(Sort::Bool),
            Term::Quantified { binders, body, .. } => {
                let mut locals = locals.clone();
                for b in binders {
                    locals.insert(b.name.clone(), b.sort.clone());
                }
                self.sort_of_rec(body, &locals)?;
                Ok(Sort::Bool)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decls::{ClassDecl, Module};
    use crate::parser::term;

    fn module() -> Module {
        Module {
            classes: vec![ClassDecl {
                name: "Account".to_string(),
                fields: vec![
                    Binder::new("balance", Sort::Int),
                    Binder::new("owners", Sort::Set(Box::new(Sort::String))),
                ],
                operations: vec![],
            }],
            goals: vec![],
        }
    }

    #[test]
    fn test_sort_of_fields() {
        let module = module();
        let scope = Scope::new(&module).with_this(Sort::object("Account"));
        assert_eq!(
            scope.sort_of(&term("this.balance").unwrap()),
            Ok(Sort::Int)
        );
        assert_eq!(
            scope.sort_of(&term("this.owners").unwrap()),
            Ok(Sort::Set(Box::new(Sort::String)))
        );
        assert_eq!(
            scope.sort_of(&term("\"A\" in this.owners").unwrap()),
            Ok(Sort::Bool)
        );
        assert!(scope.sort_of(&term("this.missing").unwrap()).is_err());
    }

    #[test]
    fn test_quantifier_binds() {
        let module = module();
        let scope = Scope::new(&module).with_this(Sort::object("Account"));
        assert_eq!(
            scope.sort_of(&term("forall k: string :: k in this.owners").unwrap()),
            Ok(Sort::Bool)
        );
        assert!(scope.sort_of(&term("k in this.owners").unwrap()).is_err());
    }
}
