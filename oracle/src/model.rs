// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Counterexample models.
//!
//! A model records, as boolean terms over the query's formal names, the
//! ground and partial constraints the verifier used to falsify a query:
//! equalities, memberships, field accesses. The constraints are split into
//! the execution state before the first call and after the last one, which
//! is all the resolution the engine ever needs.

use contracts::syntax::Term;

/// Which execution state of the query a constraint talks about.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// The state before the first operation call
    Before,
    /// The state after the last operation call
    After,
}

/// A counterexample model: per-phase constraint lists over formal names.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Model {
    pre: Vec<Term>,
    post: Vec<Term>,
}

impl Model {
    /// An empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add a constraint on the pre-call state.
    pub fn pre(mut self, term: Term) -> Self {
        self.pre.push(term);
        self
    }

    /// Builder: add a constraint on the post-call state.
    pub fn post(mut self, term: Term) -> Self {
        self.post.push(term);
        self
    }

    fn phase(&self, phase: Phase) -> &[Term] {
        match phase {
            Phase::Before => &self.pre,
            Phase::After => &self.post,
        }
    }

    /// Whether the model constrains the named formal at all in this phase.
    pub fn mentions(&self, phase: Phase, formal: &str) -> bool {
        self.phase(phase)
            .iter()
            .any(|t| t.free_ids().contains(formal))
    }

    /// The constraints transitively reachable from the named formal: the
    /// ones mentioning it, plus the ones mentioning any identifier those
    /// reach, to a fixpoint. Returned in model order. Empty when the formal
    /// is absent from the model (the under-constrained case).
    pub fn constraints_for(&self, phase: Phase, formal: &str) -> Vec<Term> {
        let all = self.phase(phase);
        let ids: Vec<_> = all.iter().map(|t| t.free_ids()).collect();
        let mut reached = std::collections::HashSet::from([formal.to_string()]);
        let mut used = vec![false; all.len()];
        loop {
            let mut changed = false;
            for (i, term_ids) in ids.iter().enumerate() {
                if used[i] || term_ids.is_disjoint(&reached) {
                    continue;
                }
                used[i] = true;
                reached.extend(term_ids.iter().cloned());
                changed = true;
            }
            if !changed {
                break;
            }
        }
        all.iter()
            .zip(&used)
            .filter(|(_, &u)| u)
            .map(|(t, _)| t.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::parser::term;

    #[test]
    fn test_reachability_closure() {
        let model = Model::new()
            .pre(term("a == 5").unwrap())
            .pre(term("b == a").unwrap())
            .pre(term("c == 7").unwrap());
        let for_b = model.constraints_for(Phase::Before, "b");
        assert_eq!(
            for_b,
            vec![term("a == 5").unwrap(), term("b == a").unwrap()]
        );
        assert!(model.constraints_for(Phase::Before, "d").is_empty());
        assert!(!model.mentions(Phase::Before, "d"));
    }
}
