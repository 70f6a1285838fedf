// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Turning counterexample models into states.
//!
//! For one formal parameter of interest, the extractor takes the model
//! constraints transitively reachable from it, keeps only the boolean ones,
//! canonicalizes `x != y` to `!(x == y)` and `x !in S` to `!(x in S)` (so
//! both polarities of a comparison intern to one property), rewrites the
//! formal to the receiver, and classifies each constraint into an indexed
//! property keyed by appearance order.

use contracts::rewrite::id_to_receiver;
use contracts::sorts::Scope;
use contracts::syntax::{BinOp, Binder, Sort, Term};
use oracle::{Model, Phase};
use std::collections::HashSet;

use crate::context::SynthesisContext;
use crate::state::{IndexedProperty, State};

/// Reconstruct the state of `formal` witnessed by a counterexample model, or
/// `None` when the model does not constrain it (the under-constrained /
/// irrelevant case). `formals` supplies the sorts of every identifier the
/// model may mention.
pub fn state_from_model(
    ctx: &SynthesisContext,
    model: &Model,
    phase: Phase,
    formal: &Binder,
    formals: &[Binder],
) -> Option<State> {
    let reachable = model.constraints_for(phase, &formal.name);
    if reachable.is_empty() {
        return None;
    }

    let mut scope = Scope::new(ctx.module()).with_this(formal.sort.clone());
    for binder in formals {
        scope.bind(&binder.name, binder.sort.clone());
    }

    // convert, filter to boolean constraints, and deduplicate syntactically
    let mut seen = HashSet::new();
    let mut constraints = vec![];
    for constraint in &reachable {
        let converted = id_to_receiver(constraint, &formal.name);
        if scope.sort_of(&converted) != Ok(Sort::Bool) {
            continue;
        }
        if seen.insert(converted.to_string()) {
            constraints.push(converted);
        }
    }

    let class = formal.sort.to_string();
    let mut state = State::new(ctx, &class, &formal.name);
    for (index, constraint) in constraints.into_iter().enumerate() {
        let (canonical, value) = match constraint {
            Term::BinOp(BinOp::NotEquals, lhs, rhs) => {
                (Term::BinOp(BinOp::Equals, lhs, rhs), false)
            }
            Term::BinOp(BinOp::NotIn, lhs, rhs) => (Term::BinOp(BinOp::In, lhs, rhs), false),
            other => (other, true),
        };
        let property = ctx.classify(&class, &canonical, &scope);
        state.insert(ctx, IndexedProperty::new(property, index), value);
    }
    Some(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Options, SynthesisContext};
    use contracts::decls::{ClassDecl, Module};
    use contracts::parser::term;

    fn module() -> Module {
        Module {
            classes: vec![ClassDecl {
                name: "Registry".to_string(),
                fields: vec![Binder::new(
                    "users",
                    Sort::Set(Box::new(Sort::String)),
                )],
                operations: vec![],
            }],
            goals: vec![],
        }
    }

    fn receiver() -> Binder {
        Binder::new("receiver", Sort::object("Registry"))
    }

    #[test]
    fn test_absent_formal_yields_none() {
        let module = module();
        let ctx = SynthesisContext::new(&module, Options::default());
        let model = Model::new().pre(term("other == 5").unwrap());
        let state = state_from_model(
            &ctx,
            &model,
            Phase::Before,
            &receiver(),
            &[receiver(), Binder::new("other", Sort::Int)],
        );
        assert!(state.is_none());
    }

    #[test]
    fn test_canonicalization_and_dedup() {
        let module = module();
        let ctx = SynthesisContext::new(&module, Options::default());
        let model = Model::new()
            .pre(term("\"A\" !in receiver.users").unwrap())
            .pre(term("\"B\" in receiver.users").unwrap())
            .pre(term("\"B\" in receiver.users").unwrap());
        let state =
            state_from_model(&ctx, &model, Phase::Before, &receiver(), &[receiver()]).unwrap();
        assert_eq!(state.len(), 2);
        // !in interned as the negation of the membership property
        let values: Vec<bool> = state.entries().iter().map(|(_, v)| *v).collect();
        assert!(values.contains(&false) && values.contains(&true));
        // both entries intern into the same family
        let parents: HashSet<_> = state
            .properties()
            .map(|p| ctx.property(p).parent())
            .collect();
        assert_eq!(parents.len(), 1);
    }

    #[test]
    fn test_primitive_formal_state() {
        let module = module();
        let ctx = SynthesisContext::new(&module, Options::default());
        let arg = Binder::new("argument_0_0_0", Sort::Int);
        let model = Model::new().pre(term("argument_0_0_0 == 5").unwrap());
        let state =
            state_from_model(&ctx, &model, Phase::Before, &arg, &[receiver(), arg.clone()])
                .unwrap();
        assert_eq!(state.class(), "int");
        assert_eq!(state.len(), 1);
        let prop = ctx.property(state.entries()[0].0.property);
        assert_eq!(prop.key, "this == default0");
    }
}
