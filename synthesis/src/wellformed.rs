// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Conditions under which a property is defined (well-formed).
//!
//! For a property like `someMap["key"] == "value"` the condition is
//! `"key" in someMap`. The heuristic uses these conditions to probe
//! Undefined-valued transitions: a property is Undefined exactly when its
//! well-formedness condition fails.

use contracts::sorts::Scope;
use contracts::syntax::{Sort, Term};

/// The well-formedness condition of a term. `Term::literal(true)` when the
/// term is defined everywhere.
pub fn condition(term: &Term, scope: &Scope) -> Term {
    let mut conditions = vec![];
    collect(term, scope, &mut conditions);
    Term::and(conditions)
}

fn collect(term: &Term, scope: &Scope, out: &mut Vec<Term>) {
    match term {
        Term::Literal(_) | Term::Id(_) | Term::This => (),
        Term::Field(obj, _) => {
            collect(obj, scope, out);
            // field access on a nested reference requires it to be non-null;
            // the receiver itself is always allocated
            if !matches!(obj.as_ref(), Term::This)
                && matches!(scope.sort_of(obj), Ok(Sort::Object(_)))
            {
                out.push(Term::BinOp(
                    contracts::syntax::BinOp::NotEquals,
                    obj.clone(),
                    Box::new(Term::null()),
                ));
            }
        }
        Term::Select(coll, key) => {
            collect(coll, scope, out);
            collect(key, scope, out);
            match scope.sort_of(coll) {
                Ok(Sort::Map(..)) => {
                    out.push(Term::in_(key.as_ref().clone(), coll.as_ref().clone()));
                }
                Ok(Sort::Seq(_)) => {
                    out.push(Term::BinOp(
                        contracts::syntax::BinOp::Gt,
                        Box::new(Term::card(coll.as_ref().clone())),
                        key.clone(),
                    ));
                }
                _ => (),
            }
        }
        Term::UnaryOp(_, arg) => collect(arg, scope, out),
        Term::BinOp(_, lhs, rhs) => {
            collect(lhs, scope, out);
            collect(rhs, scope, out);
        }
        Term::NAryOp(_, args) => {
            for arg in args {
                collect(arg, scope, out);
            }
        }
        Term::Quantified {
            quantifier,
            binders,
            body,
        } => {
            let inner_scope = scope.clone().bind_all(binders);
            let mut inner = vec![];
            collect(body, &inner_scope, &mut inner);
            if !inner.is_empty() {
                out.push(Term::Quantified {
                    quantifier: *quantifier,
                    binders: binders.clone(),
                    body: Box::new(Term::and(inner)),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::decls::{ClassDecl, Module};
    use contracts::parser::term;
    use contracts::syntax::Binder;

    fn module() -> Module {
        Module {
            classes: vec![
                ClassDecl {
                    name: "Store".to_string(),
                    fields: vec![
                        Binder::new(
                            "table",
                            Sort::Map(Box::new(Sort::String), Box::new(Sort::Int)),
                        ),
                        Binder::new("items", Sort::Seq(Box::new(Sort::Int))),
                        Binder::new("next", Sort::object("Store")),
                        Binder::new("flag", Sort::Bool),
                    ],
                    operations: vec![],
                },
            ],
            goals: vec![],
        }
    }

    #[test]
    fn test_map_selection() {
        let module = module();
        let mut scope = Scope::new(&module).with_this(Sort::object("Store"));
        scope.bind("k", Sort::String);
        scope.bind("v", Sort::Int);
        let wf = condition(&term("this.table[k] == v").unwrap(), &scope);
        assert_eq!(wf, term("k in this.table").unwrap());
    }

    #[test]
    fn test_sequence_selection() {
        let module = module();
        let mut scope = Scope::new(&module).with_this(Sort::object("Store"));
        scope.bind("i", Sort::Int);
        let wf = condition(&term("this.items[i] == 0").unwrap(), &scope);
        assert_eq!(wf, term("|this.items| > i").unwrap());
    }

    #[test]
    fn test_nested_field_needs_non_null() {
        let module = module();
        let scope = Scope::new(&module).with_this(Sort::object("Store"));
        let wf = condition(&term("this.next.flag == true").unwrap(), &scope);
        assert_eq!(wf, term("this.next != null").unwrap());
    }

    #[test]
    fn test_total_terms_are_trivially_wellformed() {
        let module = module();
        let scope = Scope::new(&module).with_this(Sort::object("Store"));
        let wf = condition(&term("this.flag == true").unwrap(), &scope);
        assert_eq!(wf, Term::literal(true));
    }
}
