// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Perform substitutions of Id terms by other terms.

use std::collections::HashMap;

use crate::syntax::Term;

/// A map from identifiers to Terms.
pub type Substitution = HashMap<String, Term>;

/// Perform a substitution.
pub fn substitute(term: &Term, substitution: &Substitution) -> Term {
    substitute_rec(term, substitution, &im::HashSet::new())
}

/// Perform a substitution, accounting for the given bound variables
fn substitute_rec(
    term: &Term,
    substitution: &Substitution,
    bound_vars: &im::HashSet<String>,
) -> Term {
    match term {
        Term::Literal(_) | Term::This => term.clone(),
        Term::Id(s) => {
            if !bound_vars.contains(s) && substitution.contains_key(s) {
                substitution[s].clone()
            } else {
                Term::id(s)
            }
        }

        Term::Field(obj, name) => Term::Field(
            Box::new(substitute_rec(obj, substitution, bound_vars)),
            name.clone(),
        ),

        Term::Select(coll, key) => Term::Select(
            Box::new(substitute_rec(coll, substitution, bound_vars)),
            Box::new(substitute_rec(key, substitution, bound_vars)),
        ),

        Term::UnaryOp(op, arg) => {
            Term::UnaryOp(*op, Box::new(substitute_rec(arg, substitution, bound_vars)))
        }

        Term::BinOp(op, lhs, rhs) => Term::BinOp(
            *op,
            Box::new(substitute_rec(lhs, substitution, bound_vars)),
            Box::new(substitute_rec(rhs, substitution, bound_vars)),
        ),

        Term::NAryOp(op, args) => Term::NAryOp(
            *op,
            args.iter()
                .map(|a| substitute_rec(a, substitution, bound_vars))
                .collect(),
        ),

        Term::Quantified {
            quantifier,
            binders,
            body,
        } => {
            let mut new_bound_vars = bound_vars.clone();
            new_bound_vars.extend(binders.iter().map(|b| b.name.clone()));
            Term::Quantified {
                quantifier: *quantifier,
                binders: binders.clone(),
                body: Box::new(substitute_rec(body, substitution, &new_bound_vars)),
            }
        }
    }
}
