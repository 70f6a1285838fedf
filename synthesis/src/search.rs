// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Backward best-first search over symbolic states.
//!
//! The search starts from the goal state and walks backward: for each
//! frontier state it asks, per operation, whether some predecessor state and
//! argument binding reaches it (counterexample-guided inference), and it
//! attempts direct construction whenever the distance estimate hits zero.
//! Nodes are ordered by `estimate * WEIGHT + distance`; the weight trades
//! shortest-path optimality for convergence speed, so the contract is a
//! valid sequence, not a minimal one.

use contracts::decls::ClassDecl;
use contracts::rewrite::id_to_receiver;
use contracts::sorts::Scope;
use contracts::subst::{substitute, Substitution};
use contracts::syntax::{BinOp, NOp, Sort, Term};
use itertools::Itertools;
use oracle::{AssumeKind, Oracle, QueryType, Stmt};
use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

use crate::context::{Persistence, SynthesisContext};
use crate::error::SynthesisError;
use crate::persist;
use crate::query::{Inference, TransitionQuery, DEFAULT_TIME_LIMIT};
use crate::state::{IndexedProperty, State};

/// Frontier nodes are ordered by `estimate * HEURISTIC_WEIGHT + distance`.
/// A weight of 1 would be A*; 2 converges faster at the cost of minimality.
const HEURISTIC_WEIGHT: u64 = 2;
/// Time limit for predecessor-simplification re-checks.
const SIMPLIFICATION_TIME_LIMIT: Duration = Duration::from_secs(40);

/// The outcome of a synthesis run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// A call sequence reaching the goal, rendered as statements
    Success(String),
    /// The wall-clock budget ran out first
    Timeout,
    /// The state space was exhausted without a solution
    Fail,
}

/// The result of a synthesis run, with per-purpose query counters.
#[derive(Clone, Debug)]
pub struct SearchResult {
    /// What happened
    pub outcome: Outcome,
    /// Wall-clock time spent
    pub elapsed: Duration,
    /// Oracle queries issued, by purpose
    pub stats: oracle::StatsSnapshot,
}

struct SearchNode {
    solution: Vec<Stmt>,
    operations: Vec<String>,
    state: State,
    estimate: u32,
    distance: u32,
}

impl SearchNode {
    fn priority(&self) -> u64 {
        self.estimate as u64 * HEURISTIC_WEIGHT + self.distance as u64
    }
}

struct FrontierEntry {
    priority: u64,
    sequence: u64,
    node: SearchNode,
}

impl PartialEq for FrontierEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl Eq for FrontierEntry {}

impl PartialOrd for FrontierEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FrontierEntry {
    // BinaryHeap is a max-heap; reverse so the lowest priority pops first,
    // oldest first among ties
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then(other.sequence.cmp(&self.sequence))
    }
}

#[derive(Default)]
struct Frontier {
    heap: BinaryHeap<FrontierEntry>,
    next_sequence: u64,
}

impl Frontier {
    fn push(&mut self, node: SearchNode) {
        let entry = FrontierEntry {
            priority: node.priority(),
            sequence: self.next_sequence,
            node,
        };
        self.next_sequence += 1;
        self.heap.push(entry);
    }

    fn pop(&mut self) -> Option<SearchNode> {
        self.heap.pop().map(|entry| entry.node)
    }
}

/// Synthesize a call sequence for the module's goal predicate.
///
/// Input contract violations (no goal, ambiguous goals, goal receiver not a
/// class, missing default constructor, usable-marked constructor) are
/// reported as errors before any search runs.
pub fn synthesize(
    ctx: &SynthesisContext,
    oracle: &dyn Oracle,
) -> Result<SearchResult, SynthesisError> {
    let began = Instant::now();
    let module = ctx.module();
    let goal = match &ctx.options().goal {
        Some(name) => module
            .goals
            .iter()
            .find(|g| g.name == *name)
            .ok_or_else(|| SynthesisError::MissingGoal(name.clone()))?,
        None => match module.goals.len() {
            0 => return Err(SynthesisError::NoGoals),
            1 => &module.goals[0],
            _ => return Err(SynthesisError::AmbiguousGoal),
        },
    };
    let Sort::Object(class_name) = &goal.receiver.sort else {
        return Err(SynthesisError::BadGoalReceiver(
            goal.receiver.sort.to_string(),
        ));
    };
    let class = module
        .find_class(class_name)
        .ok_or_else(|| SynthesisError::UnknownClass(class_name.clone()))?;
    if let Persistence::Load(dir) = &ctx.options().persistence {
        persist::load_all(ctx, dir)?;
    }

    let end_state = goal_state(ctx, class, goal);
    let solution = synthesize_for(ctx, oracle, class, end_state, "result")?;
    let elapsed = began.elapsed();
    let stats = ctx.stats_snapshot();

    let outcome = match solution {
        Some(statements) => {
            let text = render(&statements);
            log::info!("have found the following solution!\n{text}");
            stats.report("total");
            Outcome::Success(text)
        }
        None if ctx.deadline_exceeded() => {
            log::warn!("have reached the allotted time limit; terminating the search");
            Outcome::Timeout
        }
        None => {
            log::info!("have enumerated all possible states and could not find a solution");
            stats.report("total");
            Outcome::Fail
        }
    };
    log::info!("total time spent on synthesis: {:.1}s", elapsed.as_secs_f64());
    Ok(SearchResult {
        outcome,
        elapsed,
        stats,
    })
}

/// Build the goal state from a goal predicate: each conjunct of the body
/// becomes one indexed property, with the receiver parameter rewritten to
/// the receiver.
fn goal_state(ctx: &SynthesisContext, class: &ClassDecl, goal: &contracts::decls::GoalDecl) -> State {
    let scope = Scope::new(ctx.module()).with_this(class.sort());
    let mut state = State::new(ctx, &class.name, "");
    let mut index = 0;
    for subgoal in subgoals(&goal.body) {
        // a trivially true conjunct constrains nothing; the goal state for
        // `true` is empty and reachable by plain construction
        if subgoal == Term::literal(true) {
            continue;
        }
        let converted = id_to_receiver(&subgoal, &goal.receiver.name);
        let property = ctx.classify(&class.name, &converted, &scope);
        state.insert(ctx, IndexedProperty::new(property, index), true);
        index += 1;
    }
    state
}

fn subgoals(goal: &Term) -> Vec<Term> {
    match goal {
        Term::NAryOp(NOp::And, args) => args.iter().flat_map(subgoals).collect(),
        other => vec![other.clone()],
    }
}

/// Solve one synthesis (sub)problem: find statements that construct an
/// object of `class` satisfying `end_state`, named `receiver_name` in the
/// output. `Ok(None)` means exhaustion or deadline; the caller tells the
/// two apart through the context deadline.
fn synthesize_for<'m>(
    ctx: &SynthesisContext<'m>,
    oracle: &dyn Oracle,
    class: &'m ClassDecl,
    end_state: State,
    receiver_name: &str,
) -> Result<Option<Vec<Stmt>>, SynthesisError> {
    let began = Instant::now();
    let prior_stats = ctx.stats_snapshot();
    let heuristic = ctx.heuristic_for(&class.name)?;
    heuristic.borrow_mut().update_with_new_properties(
        ctx,
        oracle,
        end_state.properties().collect(),
    );

    let mut frontier = Frontier::default();
    let mut explored: HashSet<State> = HashSet::from([end_state.clone()]);
    let initial_estimate = heuristic.borrow().estimate_distance(ctx, &end_state);
    log::info!("initial heuristic value is {initial_estimate}");
    frontier.push(SearchNode {
        solution: vec![],
        operations: vec![],
        state: end_state,
        estimate: initial_estimate,
        distance: 0,
    });

    let mut solution: Option<Vec<Stmt>> = None;
    'search: while let Some(node) = frontier.pop() {
        log::info!(
            "expanding operation sequence [{}] -- estimated distance to start = {}, distance to end = {}",
            node.operations.iter().join(", "),
            node.estimate,
            node.distance
        );
        // the estimate is a lower bound, so direct construction can only
        // succeed when it is 0
        if node.estimate == 0 {
            let ctor = class
                .constructor()
                .expect("validated when the heuristic was created");
            let query = TransitionQuery::new(
                ctx,
                &class.name,
                &class.name,
                vec![ctor],
                State::new(ctx, &class.name, ""),
                node.state.clone(),
            );
            if let Inference::Predecessor { script, .. } =
                query.infer_args_and_predecessor(ctx, oracle, QueryType::Regular, DEFAULT_TIME_LIMIT, false)
            {
                let mut statements = format_solution(&script.statements, receiver_name);
                statements.extend(node.solution.clone());
                log::info!(
                    "have found a solution to a subproblem after {:.1}s",
                    began.elapsed().as_secs_f64()
                );
                (&ctx.stats_snapshot() - &prior_stats).report("subproblem");
                solution = Some(statements);
                break 'search;
            }
        }

        for operation in class.usable_operations() {
            if ctx.deadline_exceeded() {
                return Ok(None);
            }
            if explored.len() > 1 {
                let improved = heuristic.borrow_mut().try_improve(ctx, oracle, false);
                if improved {
                    // the heuristic must stay consistent across the open
                    // set; recompute every frontier priority
                    let mut rebuilt = Frontier::default();
                    while let Some(mut node) = frontier.pop() {
                        node.estimate = heuristic.borrow().estimate_distance(ctx, &node.state);
                        rebuilt.push(node);
                    }
                    frontier = rebuilt;
                }
            }

            log::debug!(
                "trying operation sequence: [{}]",
                std::iter::once(operation.name.as_str())
                    .chain(node.operations.iter().map(|s| s.as_str()))
                    .join(", ")
            );
            let query = TransitionQuery::new(
                ctx,
                &class.name,
                &class.name,
                vec![operation],
                node.state.negate(ctx),
                node.state.clone(),
            );
            let query_id = query.id();
            let Inference::Predecessor {
                state: Some(previous),
                script,
            } = query.infer_args_and_predecessor(ctx, oracle, QueryType::Regular, DEFAULT_TIME_LIMIT, false)
            else {
                continue;
            };

            // keep only the properties shared, with equal value, between the
            // discovered predecessor and the current state; if the same
            // transition still verifies from the smaller state, use it to
            // widen state reuse and reduce branching
            let mut simplified = State::new(ctx, &class.name, "");
            for &(ip, value) in previous
                .entries()
                .iter()
                .sorted_by_key(|(ip, _)| ip.index)
            {
                if let Some((_, current_value)) = node.state.occurrence_of(ip.property) {
                    if current_value == value {
                        simplified.insert(ctx, ip, value);
                    }
                }
            }
            let mut argument_assumes = vec![];
            let mut argument_formals = vec![];
            if !operation.params.is_empty() {
                if let Some(last) = script
                    .statements
                    .iter()
                    .rposition(|s| s.describes_argument().is_some())
                {
                    argument_assumes = script.statements[..=last]
                        .iter()
                        .filter_map(|s| match s {
                            Stmt::Assume { term, kind } => Some((term.clone(), kind.clone())),
                            _ => None,
                        })
                        .collect();
                }
                argument_formals = script
                    .formals
                    .iter()
                    .filter(|f| f.name.starts_with(crate::state::FORMAL_PREFIX))
                    .cloned()
                    .collect();
            }
            log::debug!("trying simplification");
            let simplify_query = TransitionQuery::with_id(
                query_id,
                &class.name,
                &class.name,
                vec![operation],
                simplified.clone(),
                node.state.clone(),
            )
            .with_extras(argument_assumes, vec![], argument_formals);
            let previous = if simplify_query
                .verify(ctx, oracle, QueryType::Simplify, false, SIMPLIFICATION_TIME_LIMIT)
                .is_verified()
            {
                simplified
            } else {
                previous
            };

            if explored.contains(&previous) {
                continue;
            }
            explored.insert(previous.clone());
            heuristic.borrow_mut().update_with_new_properties(
                ctx,
                oracle,
                previous.properties().collect(),
            );
            let estimate = heuristic.borrow().estimate_distance(ctx, &previous);
            log::info!(
                "the following operation sequence is possible (heuristic={estimate}): [{}]",
                std::iter::once(operation.name.as_str())
                    .chain(node.operations.iter().map(|s| s.as_str()))
                    .join(", ")
            );
            log::info!("new state is {}", previous.display(ctx));

            let mut statements = format_solution(&script.statements, receiver_name);
            statements.extend(node.solution.clone());
            let mut operations = vec![operation.name.clone()];
            operations.extend(node.operations.clone());
            frontier.push(SearchNode {
                solution: statements,
                operations,
                state: previous,
                estimate,
                distance: node.distance + 1,
            });
        }
    }

    let Some(mut solution) = solution else {
        log::info!("have enumerated all possible states and could not find a solution to a subproblem");
        (&ctx.stats_snapshot() - &prior_stats).report("subproblem");
        return Ok(None);
    };

    // Recursive decomposition: an argument-describing assumption whose
    // registered state belongs to a declared class is a nested construction
    // goal. Solve it with the same search and splice the result in place.
    let mut targets: Vec<u32> = vec![];
    for stmt in &solution {
        if let Some(id) = stmt.describes_argument() {
            if targets.contains(&id) {
                continue;
            }
            let known_class = ctx
                .state_by_id(id)
                .is_some_and(|state| ctx.module().find_class(state.class()).is_some());
            if known_class {
                targets.push(id);
            }
        }
    }
    for id in targets {
        let sub_state = ctx
            .state_by_id(id)
            .expect("argument states are registered when their assumption is emitted");
        let position = solution
            .iter()
            .position(|s| s.describes_argument() == Some(id))
            .expect("the target was found in the solution");
        solution.retain(|s| s.describes_argument() != Some(id));
        let sub_class = ctx
            .module()
            .find_class(sub_state.class())
            .expect("checked when collecting targets");
        let sub_receiver = sub_state.receiver().to_string();
        let Some(mut replacement) =
            synthesize_for(ctx, oracle, sub_class, sub_state, &sub_receiver)?
        else {
            if !ctx.deadline_exceeded() {
                log::error!("cannot solve a subproblem!");
            }
            return Ok(None);
        };
        // the nested sequence constructs its receiver into a fresh local
        if let Some(alloc) = replacement.iter().position(
            |s| matches!(s, Stmt::Alloc { target: Term::Id(name), .. } if *name == sub_receiver),
        ) {
            let init = replacement[alloc].clone();
            replacement[alloc] = Stmt::VarDecl {
                name: sub_receiver.clone(),
                init: Box::new(init),
            };
        }
        solution.splice(position..position, replacement);
    }
    Ok(Some(solution))
}

/// Prepare a verified script for output: fold `identifier == value`
/// assumptions into a substitution, propagate it through chains, rename the
/// receiver, and drop the bookkeeping -- assertions, precondition
/// assumptions, and argument descriptions that became fully concrete.
/// Argument descriptions still naming unresolved identifiers survive as
/// subproblem placeholders.
fn format_solution(statements: &[Stmt], receiver_name: &str) -> Vec<Stmt> {
    let mut substitution = Substitution::new();
    let mut kept: Vec<Stmt> = vec![];
    for stmt in statements {
        if let Stmt::Assume {
            term: Term::BinOp(BinOp::Equals, lhs, rhs),
            ..
        } = stmt
        {
            if let (Term::Id(name), Term::Id(_) | Term::Literal(_)) = (lhs.as_ref(), rhs.as_ref())
            {
                substitution.insert(name.clone(), rhs.as_ref().clone());
                continue;
            }
        }
        kept.push(stmt.clone());
    }

    // propagate constants through identifier chains
    loop {
        let mut changed = false;
        let keys: Vec<String> = substitution.keys().cloned().collect();
        for key in keys {
            if let Term::Id(next) = &substitution[&key] {
                if *next == key {
                    continue;
                }
                if let Some(value) = substitution.get(next).cloned() {
                    if substitution[&key] != value {
                        substitution.insert(key, value);
                        changed = true;
                    }
                }
            }
        }
        if !changed {
            break;
        }
    }
    substitution.insert(
        crate::query::RECEIVER_NAME.to_string(),
        Term::id(receiver_name),
    );

    kept.iter()
        .map(|stmt| substitute_stmt(stmt, &substitution))
        .filter(|stmt| match stmt {
            Stmt::Assert { .. } => false,
            Stmt::Assume { term, kind } => {
                matches!(kind, AssumeKind::DescribesArgument(_)) && !term.free_ids().is_empty()
            }
            _ => true,
        })
        .collect()
}

fn substitute_stmt(stmt: &Stmt, substitution: &Substitution) -> Stmt {
    match stmt {
        Stmt::Assume { term, kind } => Stmt::Assume {
            term: substitute(term, substitution),
            kind: kind.clone(),
        },
        Stmt::Assert { term, keep } => Stmt::Assert {
            term: substitute(term, substitution),
            keep: *keep,
        },
        Stmt::Call {
            receiver,
            operation,
            args,
            has_outs,
        } => Stmt::Call {
            receiver: substitute(receiver, substitution),
            operation: operation.clone(),
            args: args.iter().map(|a| substitute(a, substitution)).collect(),
            has_outs: *has_outs,
        },
        Stmt::Alloc {
            target,
            class,
            args,
        } => Stmt::Alloc {
            target: substitute(target, substitution),
            class: class.clone(),
            args: args.iter().map(|a| substitute(a, substitution)).collect(),
        },
        Stmt::VarDecl { name, init } => Stmt::VarDecl {
            name: name.clone(),
            init: Box::new(substitute_stmt(init, substitution)),
        },
    }
}

fn render(statements: &[Stmt]) -> String {
    statements.iter().map(|s| s.to_string()).join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_solution_propagates_and_filters() {
        let statements = vec![
            Stmt::Assume {
                term: Term::equals(Term::id("a"), Term::id("b")),
                kind: AssumeKind::DescribesFormal,
            },
            Stmt::Assume {
                term: Term::equals(Term::id("b"), Term::int(5)),
                kind: AssumeKind::DescribesFormal,
            },
            Stmt::Assume {
                term: Term::literal(true),
                kind: AssumeKind::Plain,
            },
            Stmt::Call {
                receiver: Term::id("receiver"),
                operation: "Push".to_string(),
                args: vec![Term::id("a")],
                has_outs: false,
            },
            Stmt::Assert {
                term: Term::literal(true),
                keep: true,
            },
        ];
        let formatted = format_solution(&statements, "result");
        assert_eq!(formatted.len(), 1);
        assert_eq!(formatted[0].to_string(), "result.Push(5);");
    }

    #[test]
    fn test_format_keeps_unresolved_argument_descriptions() {
        let statements = vec![
            Stmt::Assume {
                term: Term::equals(
                    Term::field(Term::id("argument_1_0_0"), "ready"),
                    Term::literal(true),
                ),
                kind: AssumeKind::DescribesArgument(7),
            },
            Stmt::Call {
                receiver: Term::id("receiver"),
                operation: "PutItem".to_string(),
                args: vec![Term::id("argument_1_0_0")],
                has_outs: false,
            },
        ];
        let formatted = format_solution(&statements, "result");
        assert_eq!(formatted.len(), 2);
        assert_eq!(formatted[0].describes_argument(), Some(7));
    }

    #[test]
    fn test_frontier_orders_by_priority_then_age() {
        let mut frontier = Frontier::default();
        let node = |estimate, distance| SearchNode {
            solution: vec![],
            operations: vec![],
            state: State::empty_for_tests(),
            estimate,
            distance,
        };
        frontier.push(node(2, 0)); // priority 4
        frontier.push(node(0, 1)); // priority 1
        frontier.push(node(0, 3)); // priority 3
        frontier.push(node(1, 1)); // priority 3, younger
        assert_eq!(frontier.pop().unwrap().priority(), 1);
        let first_tie = frontier.pop().unwrap();
        assert_eq!(first_tie.priority(), 3);
        assert_eq!(first_tie.distance, 3); // the older of the tied pair
        assert_eq!(frontier.pop().unwrap().priority(), 3);
        assert_eq!(frontier.pop().unwrap().priority(), 4);
        assert!(frontier.pop().is_none());
    }
}
