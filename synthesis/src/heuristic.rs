// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The online-learned admissible distance estimate.
//!
//! Per class, the heuristic learns two tables by querying the oracle: how
//! many properties of one family a single call to each operation can flip
//! between value pairs (the *capability* table), and what value each family
//! has right after construction (the *start value* table). Estimating a
//! state's distance then becomes a small integer program: one call-count
//! variable per operation, covering constraints per required transition
//! direction, minimized total. The optimum never exceeds the true number of
//! calls needed, so the estimate is admissible.

use contracts::sorts::Scope;
use contracts::syntax::{Sort, Term};
use oracle::{AssumeKind, Oracle, QueryType, Stmt, Verdict};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use contracts::decls::{ClassDecl, OperationDecl};

use crate::context::{Persistence, SynthesisContext};
use crate::error::SynthesisError;
use crate::ilp;
use crate::property::PropertyId;
use crate::query::{TransitionQuery, RECEIVER_NAME};
use crate::state::{FormalsTable, IndexedProperty, State, FORMAL_PREFIX};
use crate::wellformed;

/// Estimating a capability exactly can cost unboundedly many oracle
/// queries, so probing stops here; an operation that can flip this many
/// properties of one family at once is treated as able to flip any number
/// (a bulk clear, say).
const AFFECTED_PROPERTIES_CAP: u32 = 3;
/// The sentinel capability for operations with saturated probes.
const UNBOUNDED_FLIPS: u32 = 10_000;
/// Per-query time limit for learning probes.
const QUERY_TIME_LIMIT: Duration = Duration::from_secs(40);

/// The learned value of a property family in some state.
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum PropertyValue {
    /// The property holds
    True,
    /// The property does not hold
    False,
    /// The property is not defined (its well-formedness condition fails)
    Undefined,
    /// Reachable as both true and undefined, but never exactly false
    NotTrue,
    /// Reachable as both false and undefined, but never exactly true
    NotFalse,
    /// Varies; no usable fact
    Unknown,
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropertyValue::True => "true",
            PropertyValue::False => "false",
            PropertyValue::Undefined => "undefined",
            PropertyValue::NotTrue => "not-true",
            PropertyValue::NotFalse => "not-false",
            PropertyValue::Unknown => "unknown",
        };
        write!(f, "{name}")
    }
}

fn third_one_out(one: PropertyValue, two: PropertyValue) -> PropertyValue {
    if one != PropertyValue::True && two != PropertyValue::True {
        return PropertyValue::True;
    }
    if one != PropertyValue::False && two != PropertyValue::False {
        return PropertyValue::False;
    }
    PropertyValue::Undefined
}

/// Required transition counts for one property family, split by direction.
#[derive(Clone, Copy, Debug, Default)]
struct Required {
    false_to_true: u64,
    true_to_false: u64,
    undef_to_true: u64,
    undef_to_false: u64,
    uncertain_to_true: u64,
    uncertain_to_false: u64,
}

/// The per-class distance estimator.
pub struct Heuristic {
    class: String,
    /// capability[(family, from, to, operation)] = number of properties of
    /// the family one call can flip from `from` to `to`
    capabilities: BTreeMap<(PropertyId, PropertyValue, PropertyValue, usize), u32>,
    value_at_start: BTreeMap<PropertyId, PropertyValue>,
    /// families whose facts have not been learned yet, with the concrete
    /// members seen so far
    to_index: BTreeMap<PropertyId, BTreeSet<PropertyId>>,
    under_analysis: Option<PropertyId>,
}

impl Heuristic {
    /// Create the estimator for a class, validating its constructor
    /// contract: a default constructor must exist and constructors are
    /// never marked usable.
    pub fn new(decl: &ClassDecl) -> Result<Self, SynthesisError> {
        if decl.constructor().is_none() {
            return Err(SynthesisError::MissingConstructor(decl.name.clone()));
        }
        if decl.constructors().any(|ctor| ctor.usable) {
            return Err(SynthesisError::UsableConstructor(decl.name.clone()));
        }
        if decl.constructors().count() > 1 {
            log::warn!(
                "named constructors will not be considered, only the default constructor of {} will be used",
                decl.name
            );
        }
        Ok(Heuristic {
            class: decl.name.clone(),
            capabilities: BTreeMap::new(),
            value_at_start: BTreeMap::new(),
            to_index: BTreeMap::new(),
            under_analysis: None,
        })
    }

    /// The class this estimator serves.
    pub fn class(&self) -> &str {
        &self.class
    }

    /// The operations available to the synthesizer for this class.
    pub fn operations<'m>(&self, ctx: &SynthesisContext<'m>) -> Vec<&'m OperationDecl> {
        ctx.module()
            .find_class(&self.class)
            .map(|class| class.usable_operations())
            .unwrap_or_default()
    }

    fn class_decl<'m>(&self, ctx: &SynthesisContext<'m>) -> &'m ClassDecl {
        ctx.module()
            .find_class(&self.class)
            .expect("heuristic class was validated at construction")
    }

    /// Queue newly seen properties for lazy fact learning. Families whose
    /// start value is already known get their concrete member resolved
    /// immediately instead.
    pub fn update_with_new_properties(
        &mut self,
        ctx: &SynthesisContext,
        oracle: &dyn Oracle,
        properties: Vec<PropertyId>,
    ) {
        if ctx.options().disable_heuristic {
            return;
        }
        for pid in properties {
            let parent = ctx.property(pid).parent();
            if self.value_at_start.contains_key(&parent) {
                self.update_start_values(ctx, oracle, &[pid], false);
            } else {
                if ctx.property(parent).arity() > 3 {
                    continue;
                }
                self.to_index.entry(parent).or_default().insert(pid);
            }
        }
    }

    /// Combine the learned facts into a lower bound on the number of calls
    /// needed to take a freshly constructed object to `goal`. Returns 0
    /// when the heuristic is disabled or no operations exist (trivially
    /// admissible), and on an infeasible program (logged; should not occur).
    pub fn estimate_distance(&self, ctx: &SynthesisContext, goal: &State) -> u32 {
        if ctx.options().disable_heuristic {
            return 0;
        }
        let operations = self.operations(ctx);
        if operations.is_empty() {
            log::info!(
                "there are no operations available for class {}, so no estimate is made",
                self.class
            );
            return 0;
        }
        log::debug!("estimating the distance to {}", goal.display(ctx));

        let mut relevant: BTreeMap<PropertyId, Required> = BTreeMap::new();
        for &(ip, want) in goal.entries() {
            let parent = ctx.property(ip.property).parent();
            if self.to_index.contains_key(&parent) {
                continue; // facts still pending
            }
            let mut starting = PropertyValue::Unknown;
            if let Some(&value) = self.value_at_start.get(&parent) {
                if value != PropertyValue::Unknown {
                    starting = value;
                }
            }
            if let Some(&value) = self.value_at_start.get(&ip.property) {
                if matches!(
                    starting,
                    PropertyValue::Unknown | PropertyValue::NotFalse | PropertyValue::NotTrue
                ) {
                    starting = value;
                }
            }
            if starting == PropertyValue::Unknown {
                continue;
            }
            // skip properties whose start value already satisfies the goal
            let satisfied = if want {
                matches!(
                    starting,
                    PropertyValue::True | PropertyValue::Unknown | PropertyValue::NotFalse
                )
            } else {
                matches!(
                    starting,
                    PropertyValue::False | PropertyValue::Unknown | PropertyValue::NotTrue
                )
            };
            if satisfied {
                continue;
            }
            let required = relevant.entry(parent).or_default();
            if want {
                match starting {
                    PropertyValue::False => required.false_to_true += 1,
                    PropertyValue::Undefined => required.undef_to_true += 1,
                    _ => required.uncertain_to_true += 1,
                }
            } else {
                match starting {
                    PropertyValue::True => required.true_to_false += 1,
                    PropertyValue::Undefined => required.undef_to_false += 1,
                    _ => required.uncertain_to_false += 1,
                }
            }
        }

        if ctx.options().greedy {
            let total: u64 = relevant
                .values()
                .map(|r| {
                    r.false_to_true
                        + r.true_to_false
                        + r.undef_to_true
                        + r.undef_to_false
                        + r.uncertain_to_true
                        + r.uncertain_to_false
                })
                .sum();
            return total as u32;
        }

        let mut problem = ilp::Problem {
            variables: operations.len(),
            constraints: vec![],
        };
        for (&parent, required) in &relevant {
            use PropertyValue::*;
            self.add_constraint(&mut problem, parent, required.undef_to_true, Undefined, True);
            self.add_constraint(&mut problem, parent, required.undef_to_false, Undefined, False);
            self.add_constraint(&mut problem, parent, required.true_to_false, True, False);
            self.add_constraint(&mut problem, parent, required.false_to_true, False, True);
            self.add_two_way_constraint(&mut problem, parent, required.uncertain_to_true, True);
            self.add_two_way_constraint(&mut problem, parent, required.uncertain_to_false, False);
        }

        match ilp::minimize_calls(&problem) {
            Ok(solution) => {
                log::debug!(
                    "integer programming gives a lower bound of {} calls",
                    solution.objective
                );
                for (operation, count) in operations.iter().zip(&solution.assignment) {
                    if *count > 0 {
                        log::debug!("in particular, need at least {count} calls to {}", operation.name);
                    }
                }
                solution.objective as u32
            }
            Err(ilp::Infeasible) => {
                log::error!("the integer programming problem has no solution");
                0
            }
        }
    }

    fn capability(
        &self,
        parent: PropertyId,
        from: PropertyValue,
        to: PropertyValue,
        operation: usize,
    ) -> u64 {
        self.capabilities
            .get(&(parent, from, to, operation))
            .copied()
            .unwrap_or(0) as u64
    }

    /// Lower-bound the calls needed to flip `required` properties of the
    /// family from `from` to `to`. Flips may be routed directly or through
    /// the third value, so two inequalities are added; the bound holds
    /// whichever way the flips travel.
    fn add_constraint(
        &self,
        problem: &mut ilp::Problem,
        parent: PropertyId,
        required: u64,
        from: PropertyValue,
        to: PropertyValue,
    ) {
        if required == 0 {
            return;
        }
        let third = third_one_out(from, to);
        let direct: Vec<u64> = (0..problem.variables)
            .map(|op| self.capability(parent, from, to, op))
            .collect();
        let via_first_leg: Vec<u64> = (0..problem.variables)
            .map(|op| self.capability(parent, from, third, op))
            .collect();
        let via_second_leg: Vec<u64> = (0..problem.variables)
            .map(|op| self.capability(parent, third, to, op))
            .collect();
        problem.constraints.push(ilp::Constraint {
            coefficients: direct
                .iter()
                .zip(&via_first_leg)
                .map(|(d, v)| d + v)
                .collect(),
            minimum: required,
        });
        problem.constraints.push(ilp::Constraint {
            coefficients: direct
                .iter()
                .zip(&via_second_leg)
                .map(|(d, v)| d + v)
                .collect(),
            minimum: required,
        });
    }

    /// Lower-bound the calls needed to bring `required` properties whose
    /// start value is only known to differ from `to` (NotTrue/NotFalse) to
    /// `to`: they may start at either other value, so four inequalities
    /// cover both origins and the paths between them.
    fn add_two_way_constraint(
        &self,
        problem: &mut ilp::Problem,
        parent: PropertyId,
        required: u64,
        to: PropertyValue,
    ) {
        if required == 0 {
            return;
        }
        let from1 = if to == PropertyValue::True {
            PropertyValue::False
        } else {
            PropertyValue::True
        };
        let from2 = third_one_out(from1, to);
        let mut rows = [vec![], vec![], vec![], vec![]];
        for op in 0..problem.variables {
            let direct1 = self.capability(parent, from1, to, op);
            let direct2 = self.capability(parent, from2, to, op);
            let leg12 = self.capability(parent, from1, from2, op);
            let leg21 = self.capability(parent, from2, from1, op);
            rows[0].push(direct1 + direct2 + leg12 + leg21);
            rows[1].push(2 * direct1 + leg12 + direct2);
            rows[2].push(2 * direct2 + leg21 + direct1);
            rows[3].push(2 * direct1 + 2 * direct2);
        }
        for coefficients in rows {
            problem.constraints.push(ilp::Constraint {
                coefficients,
                minimum: required,
            });
        }
    }

    /// Learn any still-missing facts for the most promising pending family,
    /// returning after the first new oracle query so the caller can
    /// interleave re-prioritization. Once a family is fully resolved it is
    /// retired and learning recurses into the next one.
    ///
    /// Returns true iff the heuristic changed in a way that requires
    /// reevaluating existing states.
    pub fn try_improve(
        &mut self,
        ctx: &SynthesisContext,
        oracle: &dyn Oracle,
        count_incremental_progress: bool,
    ) -> bool {
        if ctx.options().disable_heuristic
            || matches!(ctx.options().persistence, Persistence::Load(_))
        {
            return false;
        }
        if self.to_index.is_empty() {
            return false;
        }

        if self.under_analysis.is_none() {
            let score = |pid: &PropertyId, members: &BTreeSet<PropertyId>| {
                let arity = ctx.property(*pid).arity();
                if arity == 0 {
                    1.0
                } else {
                    (members.len() as f64).powf(1.0 / arity as f64)
                }
            };
            self.under_analysis = self
                .to_index
                .iter()
                .max_by(|(a, members_a), (b, members_b)| {
                    score(a, members_a)
                        .partial_cmp(&score(b, members_b))
                        .unwrap_or(Ordering::Equal)
                })
                .map(|(pid, _)| *pid);
            if let Some(selected) = self.under_analysis {
                log::warn!(
                    "selecting property {} for heuristic analysis",
                    ctx.property(selected)
                );
            }
        }
        let Some(current) = self.under_analysis else {
            return false;
        };
        let members: Vec<PropertyId> = self
            .to_index
            .get(&current)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();

        if self.update_start_values(ctx, oracle, &members, true) {
            return count_incremental_progress;
        }
        if !ctx.options().greedy && self.probe_capabilities(ctx, oracle, &[current], true) {
            return count_incremental_progress;
        }

        self.to_index.remove(&current);
        self.under_analysis = None;
        let _ = self.try_improve(ctx, oracle, false);
        true
    }

    /// Learn the start value of each property: whether a freshly
    /// constructed object always, never, or sometimes satisfies it, and
    /// whether it is even defined. Parent families are resolved before
    /// their concrete members.
    ///
    /// Returns true iff any oracle query was made.
    fn update_start_values(
        &mut self,
        ctx: &SynthesisContext,
        oracle: &dyn Oracle,
        properties: &[PropertyId],
        return_after_first: bool,
    ) -> bool {
        let mut queried = false;
        let class = self.class_decl(ctx);
        let ctor = class.constructor().expect("validated at construction");
        for &pid in properties {
            if queried && return_after_first {
                return true;
            }
            let parent = ctx.property(pid).parent();
            if parent == pid {
                // a fully general property constrains nothing concrete at
                // the start
                self.value_at_start.insert(parent, PropertyValue::Unknown);
            }
            if !self.value_at_start.contains_key(&parent) {
                queried = true;
                let mut true_state = State::new(ctx, &self.class, "");
                true_state.insert(ctx, IndexedProperty::new(parent, 0), true);
                let mut formals_table = FormalsTable::new();
                let _ = true_state.as_precondition(ctx, &mut formals_table, RECEIVER_NAME);
                let formals = formals_table.all();
                let (wf, not_wf) = self.wellformedness(ctx, parent, 0);

                let wf_query = TransitionQuery::new(
                    ctx,
                    &self.class,
                    &self.class,
                    vec![ctor],
                    State::new(ctx, &self.class, ""),
                    State::new(ctx, &self.class, ""),
                )
                .with_extras(vec![], vec![wf], formals.clone());
                if !wf_query
                    .verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT)
                    .is_verified()
                {
                    let malformed_query = TransitionQuery::new(
                        ctx,
                        &self.class,
                        &self.class,
                        vec![ctor],
                        State::new(ctx, &self.class, ""),
                        State::new(ctx, &self.class, ""),
                    )
                    .with_extras(vec![], vec![not_wf], formals.clone());
                    if malformed_query
                        .verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT)
                        .is_verified()
                    {
                        self.value_at_start.insert(parent, PropertyValue::Undefined);
                        log::debug!(
                            "properties of the form {} are always undefined at the start",
                            ctx.property(parent)
                        );
                        continue;
                    }
                    self.value_at_start.insert(parent, PropertyValue::Unknown);
                    log::debug!(
                        "properties of the form {} might vary at the start",
                        ctx.property(parent)
                    );
                }

                let true_query = TransitionQuery::new(
                    ctx,
                    &self.class,
                    &self.class,
                    vec![ctor],
                    State::new(ctx, &self.class, ""),
                    true_state,
                );
                if true_query
                    .verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT)
                    .is_verified()
                {
                    if !self.value_at_start.contains_key(&parent) {
                        self.value_at_start.insert(parent, PropertyValue::True);
                        log::debug!(
                            "properties of the form {} are always true at the start",
                            ctx.property(parent)
                        );
                        continue;
                    }
                    self.value_at_start.insert(parent, PropertyValue::NotFalse);
                    log::debug!(
                        "properties of the form {} are never false at the start",
                        ctx.property(parent)
                    );
                } else {
                    let mut false_state = State::new(ctx, &self.class, "");
                    false_state.insert(ctx, IndexedProperty::new(parent, 0), false);
                    let false_query = TransitionQuery::new(
                        ctx,
                        &self.class,
                        &self.class,
                        vec![ctor],
                        State::new(ctx, &self.class, ""),
                        false_state,
                    );
                    if false_query
                        .verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT)
                        .is_verified()
                    {
                        if !self.value_at_start.contains_key(&parent) {
                            self.value_at_start.insert(parent, PropertyValue::False);
                            log::debug!(
                                "properties of the form {} are always false at the start",
                                ctx.property(parent)
                            );
                            continue;
                        }
                        self.value_at_start.insert(parent, PropertyValue::NotTrue);
                        log::debug!(
                            "properties of the form {} are never true at the start",
                            ctx.property(parent)
                        );
                    } else {
                        self.value_at_start.insert(parent, PropertyValue::Unknown);
                        log::debug!(
                            "the value of properties of the form {} might vary at the start",
                            ctx.property(parent)
                        );
                    }
                }
            }

            if matches!(
                self.value_at_start.get(&parent),
                Some(PropertyValue::True | PropertyValue::False | PropertyValue::Undefined)
            ) || self.value_at_start.contains_key(&pid)
            {
                continue;
            }

            // the family varies; pin down this concrete member
            queried = true;
            let mut concrete_true = State::new(ctx, &self.class, "");
            concrete_true.insert(ctx, IndexedProperty::new(pid, 0), true);
            let mut formals_table = FormalsTable::new();
            let _ = concrete_true.as_precondition(ctx, &mut formals_table, RECEIVER_NAME);
            let formals = formals_table.all();
            let value_assumes: Vec<(Term, AssumeKind)> = concrete_true
                .as_precondition(ctx, &mut FormalsTable::new(), "")
                .into_iter()
                .filter_map(|stmt| match stmt {
                    Stmt::Assume {
                        term,
                        kind: AssumeKind::DescribesFormal,
                    } => Some((term, AssumeKind::DescribesFormal)),
                    _ => None,
                })
                .collect();
            let (wf, not_wf) = self.wellformedness(ctx, pid, 0);

            let wf_query = TransitionQuery::new(
                ctx,
                &self.class,
                &self.class,
                vec![ctor],
                State::new(ctx, &self.class, ""),
                State::new(ctx, &self.class, ""),
            )
            .with_extras(value_assumes.clone(), vec![wf], formals.clone());
            if !wf_query
                .verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT)
                .is_verified()
            {
                let malformed_query = TransitionQuery::new(
                    ctx,
                    &self.class,
                    &self.class,
                    vec![ctor],
                    State::new(ctx, &self.class, ""),
                    State::new(ctx, &self.class, ""),
                )
                .with_extras(value_assumes.clone(), vec![not_wf], formals.clone());
                if malformed_query
                    .verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT)
                    .is_verified()
                {
                    self.value_at_start.insert(pid, PropertyValue::Undefined);
                    log::debug!(
                        "property {} is undefined at the start",
                        ctx.property(pid)
                    );
                    continue;
                }
                self.value_at_start.insert(pid, PropertyValue::Unknown);
                log::debug!("property {} might vary at the start", ctx.property(pid));
            }

            let concrete_true_query = TransitionQuery::new(
                ctx,
                &self.class,
                &self.class,
                vec![ctor],
                State::new(ctx, &self.class, ""),
                concrete_true,
            );
            if concrete_true_query
                .verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT)
                .is_verified()
            {
                if !self.value_at_start.contains_key(&pid) {
                    self.value_at_start.insert(pid, PropertyValue::True);
                    log::debug!("property {} is true at the start", ctx.property(pid));
                } else {
                    self.value_at_start.insert(pid, PropertyValue::NotFalse);
                    log::debug!("property {} is not false at the start", ctx.property(pid));
                }
                continue;
            }

            let mut concrete_false = State::new(ctx, &self.class, "");
            concrete_false.insert(ctx, IndexedProperty::new(pid, 0), false);
            let concrete_false_query = TransitionQuery::new(
                ctx,
                &self.class,
                &self.class,
                vec![ctor],
                State::new(ctx, &self.class, ""),
                concrete_false,
            );
            if concrete_false_query
                .verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT)
                .is_verified()
            {
                if !self.value_at_start.contains_key(&pid) {
                    self.value_at_start.insert(pid, PropertyValue::False);
                    log::debug!("property {} is false at the start", ctx.property(pid));
                } else {
                    self.value_at_start.insert(pid, PropertyValue::NotTrue);
                    log::debug!("property {} is not true at the start", ctx.property(pid));
                }
                continue;
            }

            log::debug!(
                "the value of property {} might vary at the start",
                ctx.property(pid)
            );
            self.value_at_start.insert(pid, PropertyValue::Unknown);
        }
        queried
    }

    /// The well-formedness condition (and its negation) of one renamed
    /// occurrence of a property.
    fn wellformedness(
        &self,
        ctx: &SynthesisContext,
        pid: PropertyId,
        occurrence: usize,
    ) -> (Term, Term) {
        let prop = ctx.property(pid);
        let prefix = format!("{}{}_{}_", FORMAL_PREFIX, occurrence, pid);
        let (renamed, assignments) = prop.prefix_with(&prefix, RECEIVER_NAME);
        let mut scope = Scope::new(ctx.module()).with_this(Sort::object(&self.class));
        scope.bind(RECEIVER_NAME, Sort::object(&self.class));
        for assignment in &assignments {
            scope.bind(&assignment.formal.name, assignment.formal.sort.clone());
        }
        let renamed = contracts::rewrite::id_to_receiver(&renamed, RECEIVER_NAME);
        let condition = wellformed::condition(&renamed, &scope);
        let condition = contracts::rewrite::receiver_to_id(&condition, RECEIVER_NAME);
        let negated = Term::not_(condition.clone());
        (condition, negated)
    }

    /// Probe the capability table for each of the six transition-direction
    /// pairs of each (family, operation). Returns true iff any oracle query
    /// was made.
    fn probe_capabilities(
        &mut self,
        ctx: &SynthesisContext,
        oracle: &dyn Oracle,
        properties: &[PropertyId],
        return_after_first: bool,
    ) -> bool {
        use PropertyValue::*;
        let mut queried = false;
        for &pid in properties {
            let parent = ctx.property(pid).parent();
            let cap = if ctx.property(parent).arity() == 0 {
                1
            } else {
                AFFECTED_PROPERTIES_CAP
            };
            let operations = self.operations(ctx);
            for op_index in 0..operations.len() {
                for (from, to) in [
                    (False, True),
                    (True, False),
                    (Undefined, True),
                    (Undefined, False),
                    (False, Undefined),
                    (True, Undefined),
                ] {
                    queried |= self.probe_capability(ctx, oracle, parent, op_index, from, to, cap);
                    if queried && return_after_first {
                        return true;
                    }
                }
            }
        }
        queried
    }

    /// Estimate how many properties of one family a single call can flip
    /// from `from` to `to`, by asking the oracle for increasingly many
    /// simultaneous flips until one fails, the probe cap is reached, or the
    /// oracle times out. A saturated or timed-out probe records the
    /// unbounded sentinel.
    fn probe_capability(
        &mut self,
        ctx: &SynthesisContext,
        oracle: &dyn Oracle,
        parent: PropertyId,
        op_index: usize,
        from: PropertyValue,
        to: PropertyValue,
        cap: u32,
    ) -> bool {
        use PropertyValue::*;
        let key = (parent, from, to, op_index);
        if self.capabilities.contains_key(&key) {
            return false;
        }
        self.capabilities.insert(key, 0);
        let operation = self.operations(ctx)[op_index];

        let mut before = State::new(ctx, &self.class, "");
        let mut after = State::new(ctx, &self.class, "");
        let mut assume_before = (from == Undefined).then(|| Term::literal(true));
        let mut assert_instead = (to == Undefined).then(|| Term::literal(true));

        for occurrence in 0..cap {
            let (wf, _) = self.wellformedness(ctx, parent, occurrence as usize);
            if matches!(wf, Term::Literal(_)) && (from == Undefined || to == Undefined) {
                // a total property can never be undefined
                return false;
            }
            let ip = IndexedProperty::new(parent, occurrence as usize);
            match from {
                True => before.insert(ctx, ip, true),
                False => before.insert(ctx, ip, false),
                _ => {
                    assume_before = assume_before
                        .take()
                        .map(|acc| Term::and([acc, Term::not_(wf.clone())]));
                }
            }
            match to {
                True => after.insert(ctx, ip, true),
                False => after.insert(ctx, ip, false),
                _ => {
                    assert_instead = assert_instead.take().map(|acc| Term::and([acc, wf.clone()]));
                }
            }
            let after_for_query = if after.is_empty() {
                State::new(ctx, &self.class, "")
            } else {
                after.negate(ctx)
            };
            let query = TransitionQuery::new(
                ctx,
                &self.class,
                &self.class,
                vec![operation],
                before.clone(),
                after_for_query,
            )
            .with_extras(
                assume_before
                    .iter()
                    .map(|t| (t.clone(), AssumeKind::Plain))
                    .collect(),
                assert_instead.iter().cloned().collect(),
                vec![],
            );
            match query.verify(ctx, oracle, QueryType::Heuristic, true, QUERY_TIME_LIMIT) {
                Verdict::Verified => break,
                Verdict::Timeout => {
                    self.capabilities.insert(key, AFFECTED_PROPERTIES_CAP);
                    break;
                }
                Verdict::Counterexample(_) => {
                    *self.capabilities.get_mut(&key).unwrap() += 1;
                }
            }
        }

        let count = self.capabilities[&key];
        if count == AFFECTED_PROPERTIES_CAP {
            self.capabilities.insert(key, UNBOUNDED_FLIPS);
            log::debug!(
                "assuming a single call to {} can flip arbitrarily many properties of the form {} from {from} to {to}",
                operation.name,
                ctx.property(parent)
            );
        } else if count > 0 {
            log::debug!(
                "a single call to {} can flip up to {count} properties of the form {} from {from} to {to}",
                operation.name,
                ctx.property(parent)
            );
        }
        true
    }

    // --- persistence access ---------------------------------------------

    /// The learned capability facts, for persistence.
    pub(crate) fn capability_facts(
        &self,
    ) -> impl Iterator<Item = (PropertyId, PropertyValue, PropertyValue, usize, u32)> + '_ {
        self.capabilities
            .iter()
            .map(|(&(pid, from, to, op), &count)| (pid, from, to, op, count))
    }

    /// The learned start-value facts, for persistence.
    pub(crate) fn start_value_facts(
        &self,
    ) -> impl Iterator<Item = (PropertyId, PropertyValue)> + '_ {
        self.value_at_start.iter().map(|(&pid, &value)| (pid, value))
    }

    /// Install a capability fact without querying (used when loading).
    pub(crate) fn install_capability(
        &mut self,
        parent: PropertyId,
        from: PropertyValue,
        to: PropertyValue,
        op_index: usize,
        count: u32,
    ) {
        self.capabilities.insert((parent, from, to, op_index), count);
    }

    /// Install a start-value fact without querying (used when loading).
    pub(crate) fn install_start_value(&mut self, pid: PropertyId, value: PropertyValue) {
        self.value_at_start.insert(pid, value);
    }
}
