// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The property model: canonical, parametrized boolean predicates about an
//! object's state.
//!
//! Classifying a term replaces every literal and every free primitive-sorted
//! identifier with a fresh parameter, in order of first appearance, and
//! interns the result per (class, print form, parameter values). A property
//! whose parameters all carry concrete values links to a fully generalized
//! *parent* property (the parent's parent is itself); parents group the
//! occurrences of one property *family*. Properties live for the lifetime of
//! the owning context and are never destroyed.

use contracts::sorts::Scope;
use contracts::syntax::{Binder, Sort, Term};
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

/// Prefix of the fresh parameters introduced by classification.
const DEFAULT_PREFIX: &str = "default";

/// Handle of an interned property.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct PropertyId(pub(crate) u32);

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One parameter of a property: the fresh formal that replaced a literal or
/// identifier, and the concrete value it replaced. A `None` value means the
/// property quantifies over all values of the parameter.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct Assignment {
    /// The fresh formal parameter
    pub formal: Binder,
    /// The concrete value the parameter stands for, if any
    pub value: Option<Term>,
}

/// An interned property.
pub struct Property {
    /// This property's handle
    pub id: PropertyId,
    /// The class (or primitive sort) the property describes
    pub class: String,
    /// The canonical print form of the normalized term; the interning key
    pub key: String,
    /// The normalized term; its identifiers are the assignment formals
    pub term: Term,
    /// The term the property was first classified from
    pub original: Term,
    /// The parameters, in order of first appearance
    pub assignments: Vec<Assignment>,
    parent: Cell<PropertyId>,
    children: RefCell<BTreeSet<PropertyId>>,
}

impl Property {
    /// The fully generalized property of this family (itself, when no
    /// parameter carries a value).
    pub fn parent(&self) -> PropertyId {
        self.parent.get()
    }

    /// Whether this property is its own family representative.
    pub fn is_parent(&self) -> bool {
        self.parent.get() == self.id
    }

    /// The concrete instances of this family seen so far.
    pub fn children(&self) -> Vec<PropertyId> {
        self.children.borrow().iter().copied().collect()
    }

    /// The number of parameters.
    pub fn arity(&self) -> usize {
        self.assignments.len()
    }

    /// The canonical total order: class, then print form, then parameters.
    pub fn compare(a: &Property, b: &Property) -> Ordering {
        a.class
            .cmp(&b.class)
            .then_with(|| a.key.cmp(&b.key))
            .then_with(|| a.assignments.len().cmp(&b.assignments.len()))
            .then_with(|| a.assignments.cmp(&b.assignments))
    }

    /// Rename this property's term and parameters with the given prefix for
    /// collision-free embedding into a query, replacing the receiver with
    /// the named identifier.
    pub fn prefix_with(&self, prefix: &str, receiver: &str) -> (Term, Vec<Assignment>) {
        let previous: HashMap<String, Option<Term>> = self
            .assignments
            .iter()
            .map(|a| (a.formal.name.clone(), a.value.clone()))
            .collect();
        let sorts: HashMap<String, Sort> = self
            .assignments
            .iter()
            .map(|a| (a.formal.name.clone(), a.formal.sort.clone()))
            .collect();
        normalize(
            &self.term,
            prefix,
            &previous,
            Some(receiver),
            &|name| sorts.get(name).cloned(),
        )
    }

    /// A term equivalent to the original classified expression: the
    /// normalized term with every valued parameter substituted back.
    /// Classifying this term again yields this property.
    pub fn reconstructed(&self) -> Term {
        let substitution = self
            .assignments
            .iter()
            .filter_map(|a| a.value.clone().map(|v| (a.formal.name.clone(), v)))
            .collect();
        contracts::subst::substitute(&self.term, &substitution)
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.original)
    }
}

/// The append-only interning table.
#[derive(Default)]
pub(crate) struct PropertyTable {
    props: Vec<Rc<Property>>,
    index: HashMap<(String, String), Vec<PropertyId>>,
}

impl PropertyTable {
    pub(crate) fn get(&self, id: PropertyId) -> Rc<Property> {
        self.props[id.0 as usize].clone()
    }

    pub(crate) fn classify(&mut self, class: &str, term: &Term, scope: &Scope) -> PropertyId {
        let lookup = |name: &str| scope.var_sort(name).cloned();
        self.classify_with(class, term, &lookup)
    }

    fn classify_with(
        &mut self,
        class: &str,
        original: &Term,
        ident_sort: &dyn Fn(&str) -> Option<Sort>,
    ) -> PropertyId {
        let (term, assignments) =
            normalize(original, DEFAULT_PREFIX, &HashMap::new(), None, ident_sort);
        let key = term.to_string();
        let bucket_key = (class.to_string(), key.clone());
        if let Some(bucket) = self.index.get(&bucket_key) {
            for &id in bucket {
                if self.props[id.0 as usize].assignments == assignments {
                    return id;
                }
            }
        }

        let id = PropertyId(self.props.len() as u32);
        let has_values = assignments.iter().any(|a| a.value.is_some());
        self.props.push(Rc::new(Property {
            id,
            class: class.to_string(),
            key,
            term: term.clone(),
            original: original.clone(),
            assignments: assignments.clone(),
            parent: Cell::new(id),
            children: RefCell::new(BTreeSet::new()),
        }));
        self.index.entry(bucket_key).or_default().push(id);

        let parent = if has_values {
            let sorts: HashMap<String, Sort> = assignments
                .iter()
                .map(|a| (a.formal.name.clone(), a.formal.sort.clone()))
                .collect();
            self.classify_with(class, &term, &|name| sorts.get(name).cloned())
        } else {
            id
        };
        self.props[id.0 as usize].parent.set(parent);
        self.props[parent.0 as usize]
            .children
            .borrow_mut()
            .insert(id);
        id
    }
}

/// Normalize a term: replace literals and free primitive-sorted identifiers
/// with prefixed fresh parameters, recording what each parameter stands for.
/// Identifiers are deduplicated by name (the same identifier maps to the
/// same parameter); every literal occurrence gets its own parameter.
/// `previous` carries the values recorded by an earlier normalization, so a
/// renaming pass preserves them. Quantifier-bound names are never touched.
fn normalize(
    term: &Term,
    prefix: &str,
    previous: &HashMap<String, Option<Term>>,
    receiver: Option<&str>,
    ident_sort: &dyn Fn(&str) -> Option<Sort>,
) -> (Term, Vec<Assignment>) {
    struct Normalizer<'a> {
        prefix: &'a str,
        previous: &'a HashMap<String, Option<Term>>,
        receiver: Option<&'a str>,
        ident_sort: &'a dyn Fn(&str) -> Option<Sort>,
        assignments: Vec<Assignment>,
        by_name: HashMap<String, usize>,
    }

    impl Normalizer<'_> {
        fn fresh(&mut self, sort: Sort, value: Option<Term>) -> String {
            let name = format!("{}{}", self.prefix, self.assignments.len());
            self.assignments.push(Assignment {
                formal: Binder { name: name.clone(), sort },
                value,
            });
            name
        }

        fn walk(&mut self, term: &Term, bound: &im::HashSet<String>) -> Term {
            match term {
                Term::This => match self.receiver {
                    Some(name) => Term::id(name),
                    None => Term::This,
                },
                Term::Id(name) if bound.contains(name) => term.clone(),
                Term::Id(name) => match (self.ident_sort)(name) {
                    Some(sort) if sort.is_primitive() => {
                        if let Some(&idx) = self.by_name.get(name) {
                            return Term::id(&self.assignments[idx].formal.name);
                        }
                        let value = self.previous.get(name).cloned().unwrap_or(None);
                        let fresh = self.fresh(sort, value);
                        self.by_name.insert(name.clone(), self.assignments.len() - 1);
                        Term::id(&fresh)
                    }
                    _ => term.clone(),
                },
                Term::Literal(lit) => match lit.sort() {
                    Some(sort) if sort.is_primitive() => {
                        let fresh = self.fresh(sort, Some(term.clone()));
                        Term::id(&fresh)
                    }
                    _ => term.clone(),
                },
                Term::Field(obj, name) => {
                    Term::Field(Box::new(self.walk(obj, bound)), name.clone())
                }
                Term::Select(coll, key) => Term::Select(
                    Box::new(self.walk(coll, bound)),
                    Box::new(self.walk(key, bound)),
                ),
                Term::UnaryOp(op, arg) => Term::UnaryOp(*op, Box::new(self.walk(arg, bound))),
                Term::BinOp(op, lhs, rhs) => Term::BinOp(
                    *op,
                    Box::new(self.walk(lhs, bound)),
                    Box::new(self.walk(rhs, bound)),
                ),
                Term::NAryOp(op, args) => Term::NAryOp(
                    *op,
                    args.iter().map(|a| self.walk(a, bound)).collect(),
                ),
                Term::Quantified {
                    quantifier,
                    binders,
                    body,
                } => {
                    let mut bound = bound.clone();
                    bound.extend(binders.iter().map(|b| b.name.clone()));
                    Term::Quantified {
                        quantifier: *quantifier,
                        binders: binders.clone(),
                        body: Box::new(self.walk(body, &bound)),
                    }
                }
            }
        }
    }

    let mut normalizer = Normalizer {
        prefix,
        previous,
        receiver,
        ident_sort,
        assignments: vec![],
        by_name: HashMap::new(),
    };
    let term = normalizer.walk(term, &im::HashSet::new());
    (term, normalizer.assignments)
}
