// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Symbolic states: finite, signed sets of indexed properties.
//!
//! A non-negated state denotes the conjunction of its (possibly negated)
//! properties; a negated state denotes the disjunction of their negations,
//! the De Morgan dual used for backward reasoning. Entries are kept sorted
//! by the property total order, then occurrence index, so states built in
//! different insertion orders compare equal. States are immutable once they
//! enter a search; negation and simplification always build new instances.

use contracts::syntax::{Binder, Term};
use itertools::Itertools;
use oracle::{AssumeKind, Stmt};
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use crate::context::SynthesisContext;
use crate::property::PropertyId;
use crate::query::RECEIVER_NAME;

/// Prefix of the renamed property parameters a state introduces into a query.
pub const FORMAL_PREFIX: &str = "formal_";

/// A property paired with an occurrence index, so the same property family
/// can occur several times in one state (two different elements of one
/// collection, say). Ordered by property, then index.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexedProperty {
    /// The interned property
    pub property: PropertyId,
    /// The occurrence index
    pub index: usize,
}

impl IndexedProperty {
    /// Smart constructor.
    pub fn new(property: PropertyId, index: usize) -> Self {
        IndexedProperty { property, index }
    }
}

/// A signed set of indexed properties describing an object.
#[derive(Clone, Debug)]
pub struct State {
    class: String,
    receiver: String,
    negated: bool,
    id: u32,
    entries: Vec<(IndexedProperty, bool)>,
}

impl PartialEq for State {
    /// Equality is the ordered key/value sequence plus polarity; identifiers
    /// and receiver names do not participate.
    fn eq(&self, other: &Self) -> bool {
        self.negated == other.negated && self.entries == other.entries
    }
}

impl Eq for State {}

impl Hash for State {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.negated.hash(hasher);
        self.entries.hash(hasher);
    }
}

impl State {
    /// A fresh empty state for an object of the given class (a sort name;
    /// primitive-sorted argument states use the sort's print form). The
    /// receiver name is the formal the state constrains, or `""` for the
    /// synthesis receiver itself.
    pub fn new(ctx: &SynthesisContext, class: &str, receiver: &str) -> Self {
        State {
            class: class.to_string(),
            receiver: receiver.to_string(),
            negated: false,
            id: ctx.fresh_state_id(),
            entries: vec![],
        }
    }

    /// The class (sort name) this state describes.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The formal this state constrains.
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    /// This state's registry identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Whether this state denotes the disjunction of negations.
    pub fn is_negated(&self) -> bool {
        self.negated
    }

    /// Number of indexed properties.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the state constrains nothing ("any state").
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entries in canonical order.
    pub fn entries(&self) -> &[(IndexedProperty, bool)] {
        &self.entries
    }

    /// The properties referenced by this state, in canonical order.
    pub fn properties(&self) -> impl Iterator<Item = PropertyId> + '_ {
        self.entries.iter().map(|(ip, _)| ip.property)
    }

    /// Set the value of an indexed property, keeping entries in canonical
    /// order regardless of insertion order.
    pub fn insert(&mut self, ctx: &SynthesisContext, ip: IndexedProperty, value: bool) {
        let position = self.entries.binary_search_by(|(existing, _)| {
            ctx.compare_properties(existing.property, ip.property)
                .then(existing.index.cmp(&ip.index))
        });
        match position {
            Ok(i) => self.entries[i].1 = value,
            Err(i) => self.entries.insert(i, (ip, value)),
        }
    }

    /// The signed value of an indexed property, if present.
    pub fn get(&self, ip: &IndexedProperty) -> Option<bool> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == ip)
            .map(|(_, v)| *v)
    }

    /// The first occurrence of a property family member in this state,
    /// matched by property id alone.
    pub fn occurrence_of(&self, property: PropertyId) -> Option<(IndexedProperty, bool)> {
        self.entries
            .iter()
            .find(|(ip, _)| ip.property == property)
            .copied()
    }

    /// The De Morgan dual: a fresh state with the same entries and flipped
    /// polarity. `negate(negate(s))` equals `s`.
    pub fn negate(&self, ctx: &SynthesisContext) -> State {
        State {
            class: self.class.clone(),
            receiver: self.receiver.clone(),
            negated: !self.negated,
            id: ctx.fresh_state_id(),
            entries: self.entries.clone(),
        }
    }

    /// Render for logs.
    pub fn display(&self, ctx: &SynthesisContext) -> String {
        if self.entries.is_empty() {
            return "any state".to_string();
        }
        self.entries
            .iter()
            .map(|(ip, value)| {
                let prop = ctx.property(ip.property);
                if *value {
                    format!("{prop}")
                } else {
                    format!("!({prop})")
                }
            })
            .join(", ")
    }

    /// Emit statements that assume the object is in this state. For a
    /// non-negated state this is one assumption per signed property; for a
    /// negated state, a single assumption of the negated conjunction; for
    /// the empty negated state, `assume false`.
    pub fn as_precondition(
        &self,
        ctx: &SynthesisContext,
        formals: &mut FormalsTable,
        receiver: &str,
    ) -> Vec<Stmt> {
        if self.negated {
            if self.entries.is_empty() {
                return vec![Stmt::Assume {
                    term: Term::literal(false),
                    kind: AssumeKind::Plain,
                }];
            }
            let (exprs, mut stmts) = self.as_expressions(ctx, formals, receiver);
            stmts.push(Stmt::Assume {
                term: Term::not_(Term::and(exprs)),
                kind: AssumeKind::Plain,
            });
            return stmts;
        }
        if self.entries.is_empty() {
            return vec![];
        }
        // A state describing an operation argument rather than the synthesis
        // receiver is tagged with its registry id, so the search can later
        // recover it as a nested construction goal.
        let kind = if receiver.starts_with(RECEIVER_NAME) {
            AssumeKind::Plain
        } else {
            ctx.register_state(self);
            AssumeKind::DescribesArgument(self.id)
        };
        let (exprs, mut stmts) = self.as_expressions(ctx, formals, receiver);
        for expr in exprs {
            stmts.push(Stmt::Assume {
                term: expr,
                kind: kind.clone(),
            });
        }
        stmts
    }

    /// Emit statements that assert the object is in this state, mirroring
    /// [`State::as_precondition`]. The empty non-negated state asserts
    /// `true`; the empty negated state asserts `false`. Assertions are
    /// marked kept so precondition-assuming passes leave them in place.
    pub fn as_postcondition(
        &self,
        ctx: &SynthesisContext,
        formals: &mut FormalsTable,
        receiver: &str,
    ) -> Vec<Stmt> {
        if self.negated {
            if self.entries.is_empty() {
                return vec![Stmt::Assert {
                    term: Term::literal(false),
                    keep: true,
                }];
            }
            let (exprs, mut stmts) = self.as_expressions(ctx, formals, receiver);
            stmts.push(Stmt::Assert {
                term: Term::not_(Term::and(exprs)),
                keep: true,
            });
            return stmts;
        }
        if self.entries.is_empty() {
            return vec![Stmt::Assert {
                term: Term::literal(true),
                keep: true,
            }];
        }
        let (exprs, mut stmts) = self.as_expressions(ctx, formals, receiver);
        for expr in exprs {
            stmts.push(Stmt::Assert { term: expr, keep: true });
        }
        stmts
    }

    /// The signed property expressions of this state, renamed apart, plus
    /// the auxiliary statements constraining their parameters: a value
    /// binding for each parameter that carries one, and pairwise-distinctness
    /// disjunctions between occurrences of the same family that share
    /// unvalued parameters (so the oracle cannot conflate two logically
    /// distinct elements).
    fn as_expressions(
        &self,
        ctx: &SynthesisContext,
        formals: &mut FormalsTable,
        receiver: &str,
    ) -> (Vec<Term>, Vec<Stmt>) {
        let mut stmts = vec![];
        let mut exprs = vec![];
        // emission is ordered by occurrence index, canonical order within
        let order = self
            .entries
            .iter()
            .sorted_by_key(|(ip, _)| ip.index)
            .collect::<Vec<_>>();
        for (ip, value) in order {
            let prop = ctx.property(ip.property);
            // the first suffix is the occurrence index, the second the
            // property id, so occurrences of one family line up by name
            let prefix = format!("{}{}_{}_", FORMAL_PREFIX, ip.index, ip.property);
            let (renamed, assignments) = prop.prefix_with(&prefix, receiver);
            exprs.push(if *value {
                renamed
            } else {
                Term::not_(renamed)
            });

            let per_property = formals.map.entry(ip.property).or_default();
            per_property.entry(*ip).or_default();
            let others: Vec<IndexedProperty> = per_property
                .keys()
                .filter(|other| **other != *ip)
                .copied()
                .collect();
            let mut not_equal: BTreeMap<IndexedProperty, Term> = others
                .iter()
                .map(|other| (*other, Term::literal(false)))
                .collect();
            let mut emit_not_equal = false;
            for (position, assignment) in assignments.iter().enumerate() {
                let known = per_property
                    .get(ip)
                    .is_some_and(|fs| fs.iter().any(|f| f.name == assignment.formal.name));
                if known {
                    continue;
                }
                per_property
                    .get_mut(ip)
                    .unwrap()
                    .push(assignment.formal.clone());
                if let Some(value) = &assignment.value {
                    stmts.push(Stmt::Assume {
                        term: Term::equals(Term::id(&assignment.formal.name), value.clone()),
                        kind: AssumeKind::DescribesFormal,
                    });
                } else {
                    for other in &others {
                        emit_not_equal = true;
                        let other_name = format!(
                            "{}{}_{}_{}",
                            FORMAL_PREFIX, other.index, ip.property, position
                        );
                        let disequal = Term::not_(Term::equals(
                            Term::id(&assignment.formal.name),
                            Term::id(&other_name),
                        ));
                        let previous = not_equal[other].clone();
                        not_equal.insert(*other, Term::or([previous, disequal]));
                    }
                }
            }
            if emit_not_equal {
                for expr in not_equal.values() {
                    stmts.push(Stmt::Assume {
                        term: expr.clone(),
                        kind: AssumeKind::Plain,
                    });
                }
            }
        }
        (exprs, stmts)
    }
}

#[cfg(test)]
impl State {
    /// A detached empty state for tests that never touch a context.
    pub(crate) fn empty_for_tests() -> Self {
        State {
            class: String::new(),
            receiver: String::new(),
            negated: false,
            id: 0,
            entries: vec![],
        }
    }
}

/// The renamed parameters each indexed property contributed to a query,
/// grouped by family so distinctness constraints can find sibling
/// occurrences.
#[derive(Default)]
pub struct FormalsTable {
    map: BTreeMap<PropertyId, BTreeMap<IndexedProperty, Vec<Binder>>>,
}

impl FormalsTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every formal recorded, in deterministic order.
    pub fn all(&self) -> Vec<Binder> {
        self.map
            .values()
            .flat_map(|per_property| per_property.values().flatten())
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Options, SynthesisContext};
    use contracts::decls::Module;
    use contracts::parser::term;
    use contracts::sorts::Scope;
    use contracts::syntax::Sort;

    fn classify(ctx: &SynthesisContext, s: &str) -> PropertyId {
        let scope = Scope::detached().with_this(Sort::object("Store"));
        ctx.classify("Store", &term(s).unwrap(), &scope)
    }

    #[test]
    fn test_insertion_order_is_irrelevant() {
        let module = Module::default();
        let ctx = SynthesisContext::new(&module, Options::default());
        let a = classify(&ctx, "this.data[1] == 2");
        let b = classify(&ctx, "this.flag == true");

        let mut first = State::new(&ctx, "Store", "");
        first.insert(&ctx, IndexedProperty::new(a, 0), true);
        first.insert(&ctx, IndexedProperty::new(b, 1), false);

        let mut second = State::new(&ctx, "Store", "");
        second.insert(&ctx, IndexedProperty::new(b, 1), false);
        second.insert(&ctx, IndexedProperty::new(a, 0), true);

        assert_eq!(first, second);
        assert_eq!(first.entries(), second.entries());
    }

    #[test]
    fn test_equality_is_an_equivalence() {
        let module = Module::default();
        let ctx = SynthesisContext::new(&module, Options::default());
        let a = classify(&ctx, "this.flag == true");
        let mut x = State::new(&ctx, "Store", "");
        x.insert(&ctx, IndexedProperty::new(a, 0), true);
        let y = x.clone();
        let mut z = State::new(&ctx, "Store", "");
        z.insert(&ctx, IndexedProperty::new(a, 0), true);
        // reflexive, symmetric, transitive; ids do not participate
        assert_eq!(x, x);
        assert_eq!(x, y);
        assert_eq!(y, z);
        assert_eq!(x, z);
        assert_ne!(x.id(), z.id());
    }

    #[test]
    fn test_negation_duality() {
        let module = Module::default();
        let ctx = SynthesisContext::new(&module, Options::default());
        let a = classify(&ctx, "this.flag == true");
        let mut state = State::new(&ctx, "Store", "");
        state.insert(&ctx, IndexedProperty::new(a, 0), false);
        let negated = state.negate(&ctx);
        assert!(negated.is_negated());
        assert_ne!(state, negated);
        let back = negated.negate(&ctx);
        assert!(!back.is_negated());
        assert_eq!(back, state);
    }

    #[test]
    fn test_empty_state_fragments() {
        let module = Module::default();
        let ctx = SynthesisContext::new(&module, Options::default());
        let state = State::new(&ctx, "Store", "");
        let mut formals = FormalsTable::new();
        assert!(state
            .as_precondition(&ctx, &mut formals, RECEIVER_NAME)
            .is_empty());
        assert_eq!(
            state.as_postcondition(&ctx, &mut formals, RECEIVER_NAME),
            vec![Stmt::Assert {
                term: Term::literal(true),
                keep: true
            }]
        );
        let negated = state.negate(&ctx);
        assert_eq!(
            negated.as_precondition(&ctx, &mut formals, RECEIVER_NAME),
            vec![Stmt::Assume {
                term: Term::literal(false),
                kind: AssumeKind::Plain
            }]
        );
        assert_eq!(
            negated.as_postcondition(&ctx, &mut formals, RECEIVER_NAME),
            vec![Stmt::Assert {
                term: Term::literal(false),
                keep: true
            }]
        );
    }

    #[test]
    fn test_value_bindings_and_distinctness() {
        let module = Module::default();
        let ctx = SynthesisContext::new(&module, Options::default());
        // a parametrized family with an unvalued parameter, twice
        let scope = Scope::detached().with_this(Sort::object("Store"));
        let concrete = ctx.classify("Store", &term("this.data[3] == 4").unwrap(), &scope);
        let parent = ctx.property(concrete).parent();

        let mut state = State::new(&ctx, "Store", "");
        state.insert(&ctx, IndexedProperty::new(parent, 0), true);
        state.insert(&ctx, IndexedProperty::new(parent, 1), true);
        let mut formals = FormalsTable::new();
        let stmts = state.as_precondition(&ctx, &mut formals, RECEIVER_NAME);
        let rendered = stmts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        // two property assumptions and one distinctness assumption per
        // occurrence pair, no value bindings
        assert!(rendered
            .iter()
            .any(|s| s.contains("receiver.data[formal_0_")));
        assert!(rendered
            .iter()
            .any(|s| s.contains("receiver.data[formal_1_")));
        assert!(rendered.iter().any(|s| s.contains("false || !(formal_1_")));
        assert_eq!(formals.all().len(), 4);

        // a concrete occurrence emits value bindings instead
        let mut concrete_state = State::new(&ctx, "Store", "");
        concrete_state.insert(&ctx, IndexedProperty::new(concrete, 0), true);
        let mut formals = FormalsTable::new();
        let stmts = concrete_state.as_precondition(&ctx, &mut formals, RECEIVER_NAME);
        let rendered = stmts.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        assert!(rendered.iter().any(|s| s.contains("== 3;")));
        assert!(rendered.iter().any(|s| s.contains("== 4;")));
    }

    #[test]
    fn test_argument_states_are_tagged_and_registered() {
        let module = Module::default();
        let ctx = SynthesisContext::new(&module, Options::default());
        let a = classify(&ctx, "this.flag == true");
        let mut state = State::new(&ctx, "Store", "argument_0_0_0");
        state.insert(&ctx, IndexedProperty::new(a, 0), true);
        let mut formals = FormalsTable::new();
        let stmts = state.as_precondition(&ctx, &mut formals, "argument_0_0_0");
        let tag = stmts.iter().find_map(|s| s.describes_argument());
        assert_eq!(tag, Some(state.id()));
        let registered = ctx.state_by_id(state.id()).unwrap();
        assert_eq!(registered, state);
        assert_eq!(registered.receiver(), "argument_0_0_0");
    }
}
