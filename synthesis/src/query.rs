// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Building transition queries, and inferring operation arguments and
//! predecessor states from oracle counterexamples.
//!
//! Inference is a two-step protocol. `negate and query`: prove the *negated*
//! goal while assuming every precondition; a counterexample then witnesses
//! concrete values for the call's argument parameters and the receiver's
//! pre-state. `bind and re-verify`: substitute the witnessed values back
//! into the original query as assumptions and verify it for real, with
//! preconditions now proof obligations. The second step is mandatory: the
//! first-stage witness can be spurious relative to the original
//! postcondition, and re-verification is what rejects it.

use contracts::decls::OperationDecl;
use contracts::rewrite::receiver_to_id;
use contracts::subst::{substitute, Substitution};
use contracts::syntax::{Binder, Sort, Term};
use oracle::{AssumeKind, Model, Oracle, Phase, Query, QueryType, Stmt, Verdict};
use std::time::Duration;

use crate::context::SynthesisContext;
use crate::extract::state_from_model;
use crate::state::{FormalsTable, State};

/// The name of the object being modified or constructed.
pub const RECEIVER_NAME: &str = "receiver";
/// Operation arguments' names start with this prefix.
pub const ARGUMENT_PREFIX: &str = "argument_";
/// Default per-query time limit for search queries.
pub const DEFAULT_TIME_LIMIT: Duration = Duration::from_secs(150);

/// The body a query was built from: its statements and its formal
/// parameters (the receiver excluded). After successful inference the
/// script contains the bound-argument assumptions and is the raw material
/// the search formats into solution text.
#[derive(Clone, Debug)]
pub struct Script {
    /// The statements, in execution order
    pub statements: Vec<Stmt>,
    /// The formal parameters, receiver excluded
    pub formals: Vec<Binder>,
}

/// The outcome of predecessor inference.
#[derive(Debug)]
pub enum Inference {
    /// A predecessor exists; `state` is the witnessed pre-state (or the
    /// post-state when requested; `None` for constructor queries) and
    /// `script` the verified statements with bound arguments
    Predecessor {
        /// The witnessed state
        state: Option<State>,
        /// The verified query body
        script: Script,
    },
    /// No admissible predecessor exists via these operations, or the
    /// witness was spurious
    NoPredecessor,
    /// The oracle timed out; the caller abandons this edge
    Timeout,
}

enum Bind {
    Verified(Script),
    Refuted,
    Timeout,
}

/// A transition query: a before-state, a sequence of operation calls, and an
/// after-state, with optional extra assumptions, assertions, and formals.
pub struct TransitionQuery<'m> {
    id: u32,
    class: String,
    synth_class: String,
    ops: Vec<&'m OperationDecl>,
    before: State,
    after: State,
    extra_assumes: Vec<(Term, AssumeKind)>,
    extra_asserts: Vec<Term>,
    extra_formals: Vec<Binder>,
}

impl<'m> TransitionQuery<'m> {
    /// A query with a fresh identifier.
    pub fn new(
        ctx: &SynthesisContext,
        class: &str,
        synth_class: &str,
        ops: Vec<&'m OperationDecl>,
        before: State,
        after: State,
    ) -> Self {
        Self::with_id(ctx.fresh_query_id(), class, synth_class, ops, before, after)
    }

    /// A query reusing an existing identifier, so its argument formals line
    /// up with a previously built query's.
    pub fn with_id(
        id: u32,
        class: &str,
        synth_class: &str,
        ops: Vec<&'m OperationDecl>,
        before: State,
        after: State,
    ) -> Self {
        TransitionQuery {
            id,
            class: class.to_string(),
            synth_class: synth_class.to_string(),
            ops,
            before,
            after,
            extra_assumes: vec![],
            extra_asserts: vec![],
            extra_formals: vec![],
        }
    }

    /// Attach extra assumptions (inserted before the before-state's),
    /// assertions (inserted before the after-state's, marked kept), and
    /// formal parameters.
    pub fn with_extras(
        mut self,
        assumes: Vec<(Term, AssumeKind)>,
        asserts: Vec<Term>,
        formals: Vec<Binder>,
    ) -> Self {
        self.extra_assumes = assumes;
        self.extra_asserts = asserts;
        self.extra_formals = formals;
        self
    }

    /// This query's identifier.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Run the query through the oracle and return only the verdict.
    pub fn verify(
        &self,
        ctx: &SynthesisContext,
        oracle: &dyn Oracle,
        query_type: QueryType,
        assume_preconditions: bool,
        time_limit: Duration,
    ) -> Verdict {
        let query = self.to_query(ctx, query_type, assume_preconditions, time_limit);
        ctx.verify_query(oracle, &query)
    }

    /// Infer operation arguments and the receiver's pre-state that make this
    /// query verify. With `want_post_state`, the returned state is instead
    /// the witnessed post-state (used by forward exploration).
    pub fn infer_args_and_predecessor(
        &self,
        ctx: &SynthesisContext,
        oracle: &dyn Oracle,
        query_type: QueryType,
        time_limit: Duration,
        want_post_state: bool,
    ) -> Inference {
        // Supporting extra assertions here would mean folding them into the
        // negated after-state, which nothing needs.
        assert!(
            self.extra_asserts.is_empty(),
            "cannot infer arguments for a query with extra assertions"
        );
        let reversed = TransitionQuery {
            id: self.id,
            class: self.synth_class.clone(),
            synth_class: self.synth_class.clone(),
            ops: self.ops.clone(),
            before: self.before.clone(),
            after: self.after.negate(ctx),
            extra_assumes: self.extra_assumes.clone(),
            extra_asserts: vec![],
            extra_formals: self.extra_formals.clone(),
        };
        let reversed_query = reversed.to_query(ctx, query_type, true, time_limit);
        let model = match ctx.verify_query(oracle, &reversed_query) {
            Verdict::Counterexample(model) => model,
            Verdict::Timeout => return Inference::Timeout,
            Verdict::Verified => return Inference::NoPredecessor,
        };
        let receiver = Binder::new(RECEIVER_NAME, Sort::object(&self.class));

        if self.ops[0].is_constructor() {
            // there is no object state before an allocation; bind the
            // witnessed constructor arguments into the reversed script
            let script = Script {
                statements: reversed_query.statements.clone(),
                formals: reversed_query
                    .formals
                    .iter()
                    .filter(|b| b.name != RECEIVER_NAME)
                    .cloned()
                    .collect(),
            };
            let modifies = reversed_query.modifies.clone();
            return match self.bind_and_reverify(
                ctx, oracle, query_type, &model, script, modifies, time_limit,
            ) {
                Bind::Verified(script) => {
                    let state = want_post_state
                        .then(|| {
                            let formals = with_receiver(&script.formals, &receiver);
                            state_from_model(ctx, &model, Phase::After, &receiver, &formals)
                        })
                        .flatten();
                    Inference::Predecessor { state, script }
                }
                Bind::Timeout => Inference::Timeout,
                Bind::Refuted => Inference::NoPredecessor,
            };
        }

        let Some(predecessor) = state_from_model(
            ctx,
            &model,
            Phase::Before,
            &receiver,
            &reversed_query.formals,
        ) else {
            return Inference::NoPredecessor;
        };

        // rebuild the query from the witnessed pre-state; preconditions are
        // no longer assumed, so they become part of what is proven
        let mut formals_table = FormalsTable::new();
        let mut statements = predecessor.as_precondition(ctx, &mut formals_table, RECEIVER_NAME);
        let assertion =
            self.after
                .negate(ctx)
                .as_postcondition(ctx, &mut formals_table, RECEIVER_NAME);
        let mut formals = formals_table.all();
        let mut modifies = vec![];
        let calls = self.construct_calls(&mut formals, &mut modifies, false);
        statements.extend(calls);
        statements.extend(assertion);
        let script = Script { statements, formals };

        match self.bind_and_reverify(ctx, oracle, query_type, &model, script, modifies, time_limit)
        {
            Bind::Verified(script) => {
                let state = if want_post_state {
                    let formals = with_receiver(&script.formals, &receiver);
                    state_from_model(ctx, &model, Phase::After, &receiver, &formals)
                } else {
                    Some(predecessor)
                };
                Inference::Predecessor { state, script }
            }
            Bind::Timeout => Inference::Timeout,
            Bind::Refuted => Inference::NoPredecessor,
        }
    }

    /// Insert the model's witnessed argument states into the script as
    /// assumptions, flip the (negated) assertions back, and verify the
    /// result without assuming preconditions.
    fn bind_and_reverify(
        &self,
        ctx: &SynthesisContext,
        oracle: &dyn Oracle,
        query_type: QueryType,
        model: &Model,
        mut script: Script,
        modifies: Vec<Term>,
        time_limit: Duration,
    ) -> Bind {
        let receiver = Binder::new(RECEIVER_NAME, Sort::object(&self.class));
        let arg_prefix = format!("{}{}_", ARGUMENT_PREFIX, self.id);
        let all_formals = with_receiver(&script.formals, &receiver);
        let mut formals_table = FormalsTable::new();
        let mut insert_at = 0;
        for formal in script
            .formals
            .iter()
            .filter(|b| b.name.starts_with(&arg_prefix))
            .cloned()
            .collect::<Vec<_>>()
        {
            if let Some(state) =
                state_from_model(ctx, model, Phase::Before, &formal, &all_formals)
            {
                for stmt in state.as_precondition(ctx, &mut formals_table, &formal.name) {
                    script.statements.insert(insert_at, stmt);
                    insert_at += 1;
                }
            }
        }
        for binder in formals_table.all() {
            if !script.formals.iter().any(|f| f.name == binder.name) {
                script.formals.push(binder);
            }
        }

        // the reversed script asserted the negated goal; re-assert the
        // original by negating every assertion and disjoining them
        let asserts: Vec<Term> = script
            .statements
            .iter()
            .filter_map(|s| match s {
                Stmt::Assert { term, .. } => Some(term.clone()),
                _ => None,
            })
            .collect();
        script.statements.retain(|s| !matches!(s, Stmt::Assert { .. }));
        script.statements.push(Stmt::Assert {
            term: Term::or(asserts.into_iter().map(Term::negate)),
            keep: true,
        });

        let query = Query {
            query_type,
            class: self.class.clone(),
            synth_class: self.synth_class.clone(),
            receiver_is_input: !self.ops.iter().any(|op| op.is_constructor()),
            formals: with_receiver(&script.formals, &receiver),
            modifies,
            statements: script.statements.clone(),
            assume_preconditions: false,
            time_limit,
        };
        match ctx.verify_query(oracle, &query) {
            Verdict::Verified => Bind::Verified(script),
            Verdict::Timeout => Bind::Timeout,
            Verdict::Counterexample(_) => Bind::Refuted,
        }
    }

    /// Assemble the full query for the oracle.
    fn to_query(
        &self,
        ctx: &SynthesisContext,
        query_type: QueryType,
        assume_preconditions: bool,
        time_limit: Duration,
    ) -> Query {
        let mut formals_table = FormalsTable::new();
        let mut statements =
            self.before
                .as_precondition(ctx, &mut formals_table, RECEIVER_NAME);
        let extra_assumes: Vec<Stmt> = self
            .extra_assumes
            .iter()
            .map(|(term, kind)| Stmt::Assume {
                term: term.clone(),
                kind: kind.clone(),
            })
            .collect();
        statements.splice(0..0, extra_assumes);

        let mut assertion =
            self.after
                .as_postcondition(ctx, &mut formals_table, RECEIVER_NAME);
        let extra_asserts: Vec<Stmt> = self
            .extra_asserts
            .iter()
            .map(|term| Stmt::Assert {
                term: term.clone(),
                keep: true,
            })
            .collect();
        assertion.splice(0..0, extra_asserts);

        let mut formals = formals_table.all();
        for formal in &self.extra_formals {
            if !formals.iter().any(|f| f.name == formal.name) {
                formals.push(formal.clone());
            }
        }
        let mut modifies = vec![];
        let calls = self.construct_calls(&mut formals, &mut modifies, assume_preconditions);
        statements.extend(calls);
        statements.extend(assertion);

        formals.push(Binder::new(RECEIVER_NAME, Sort::object(&self.class)));
        Query {
            query_type,
            class: self.class.clone(),
            synth_class: self.synth_class.clone(),
            receiver_is_input: !self.ops.iter().any(|op| op.is_constructor()),
            formals,
            modifies,
            statements,
            assume_preconditions,
            time_limit,
        }
    }

    /// Emit the operation calls, processed tail-first so the argument
    /// formals introduced by later calls exist when earlier calls are
    /// emitted (arguments flow backward through the state graph). Each call
    /// gets fresh `argument_{query}_{call}_{param}` formals; preconditions
    /// are assumed with arguments substituted in when requested.
    fn construct_calls(
        &self,
        formals: &mut Vec<Binder>,
        modifies: &mut Vec<Term>,
        assume_preconditions: bool,
    ) -> Vec<Stmt> {
        let mut statements = vec![];
        for (i, op) in self.ops.iter().enumerate().rev() {
            let arg_formals: Vec<Binder> = op
                .params
                .iter()
                .enumerate()
                .map(|(j, param)| Binder {
                    name: format!("{}{}_{}_{}", ARGUMENT_PREFIX, self.id, i, j),
                    sort: param.sort.clone(),
                })
                .collect();
            let args: Vec<Term> = arg_formals.iter().map(|f| Term::id(&f.name)).collect();
            formals.extend(arg_formals);

            let substitution: Substitution = op
                .params
                .iter()
                .zip(&args)
                .map(|(param, arg)| (param.name.clone(), arg.clone()))
                .collect();
            let requires = Term::and(std::iter::once(Term::literal(true)).chain(
                op.requires.iter().map(|clause| {
                    receiver_to_id(&substitute(clause, &substitution), RECEIVER_NAME)
                }),
            ));
            for frame in &op.modifies {
                modifies.push(receiver_to_id(&substitute(frame, &substitution), RECEIVER_NAME));
            }

            let call = if op.is_constructor() {
                Stmt::Alloc {
                    target: Term::id(RECEIVER_NAME),
                    class: self.class.clone(),
                    args,
                }
            } else {
                Stmt::Call {
                    receiver: Term::id(RECEIVER_NAME),
                    operation: op.name.clone(),
                    args,
                    has_outs: !op.outs.is_empty(),
                }
            };
            statements.insert(0, call);
            if assume_preconditions {
                statements.insert(
                    0,
                    Stmt::Assume {
                        term: requires,
                        kind: AssumeKind::Plain,
                    },
                );
            }
        }
        statements
    }
}

fn with_receiver(formals: &[Binder], receiver: &Binder) -> Vec<Binder> {
    let mut all = formals.to_vec();
    all.push(receiver.clone());
    all
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Options, SynthesisContext};
    use crate::state::IndexedProperty;
    use contracts::decls::{ClassDecl, Module, OperationDecl, OperationKind};
    use contracts::parser::term;
    use contracts::sorts::Scope;

    fn light_module() -> Module {
        Module {
            classes: vec![ClassDecl {
                name: "Light".to_string(),
                fields: vec![Binder::new("flag", Sort::Bool)],
                operations: vec![
                    OperationDecl {
                        name: "Light".to_string(),
                        params: vec![],
                        outs: vec![],
                        requires: vec![],
                        modifies: vec![],
                        kind: OperationKind::Constructor,
                        usable: false,
                    },
                    OperationDecl {
                        name: "SetFlagTrue".to_string(),
                        params: vec![],
                        outs: vec![],
                        requires: vec![],
                        modifies: vec![Term::This],
                        kind: OperationKind::Mutator,
                        usable: true,
                    },
                ],
            }],
            goals: vec![],
        }
    }

    fn goal_state(ctx: &SynthesisContext) -> State {
        let scope = Scope::detached().with_this(Sort::object("Light"));
        let property = ctx.classify("Light", &term("this.flag == true").unwrap(), &scope);
        let mut state = State::new(ctx, "Light", "");
        state.insert(ctx, IndexedProperty::new(property, 0), true);
        state
    }

    #[test]
    fn test_inference_two_query_protocol() {
        let module = light_module();
        let ctx = SynthesisContext::new(&module, Options::default());
        let goal = goal_state(&ctx);
        let op = &module.classes[0].operations[1];
        let query = TransitionQuery::new(
            &ctx,
            "Light",
            "Light",
            vec![op],
            goal.negate(&ctx),
            goal.clone(),
        );
        let witness = Model::new().pre(term("receiver.flag != true").unwrap());
        let oracle = move |q: &Query| {
            // the negated query assumes preconditions; the re-verification
            // does not
            if q.assume_preconditions {
                Verdict::Counterexample(witness.clone())
            } else {
                Verdict::Verified
            }
        };
        match query.infer_args_and_predecessor(&ctx, &oracle, QueryType::Regular, DEFAULT_TIME_LIMIT, false)
        {
            Inference::Predecessor { state, script } => {
                let state = state.unwrap();
                assert_eq!(state.len(), 1);
                assert_eq!(state.entries()[0].1, false);
                assert!(script
                    .statements
                    .iter()
                    .any(|s| matches!(s, Stmt::Call { operation, .. } if operation == "SetFlagTrue")));
                // the re-asserted goal is the original, un-negated one
                let last = script.statements.last().unwrap();
                assert!(matches!(last, Stmt::Assert { keep: true, .. }));
            }
            other => panic!("expected a predecessor, got {other:?}"),
        }
        assert_eq!(ctx.stats_snapshot().total_count(), 2);
    }

    #[test]
    fn test_spurious_witness_is_rejected() {
        let module = light_module();
        let ctx = SynthesisContext::new(&module, Options::default());
        let goal = goal_state(&ctx);
        let op = &module.classes[0].operations[1];
        let query = TransitionQuery::new(
            &ctx,
            "Light",
            "Light",
            vec![op],
            goal.negate(&ctx),
            goal.clone(),
        );
        let witness = Model::new().pre(term("receiver.flag != true").unwrap());
        let oracle = move |q: &Query| {
            if q.assume_preconditions {
                Verdict::Counterexample(witness.clone())
            } else {
                // the witness does not survive re-verification
                Verdict::Counterexample(Model::new())
            }
        };
        assert!(matches!(
            query.infer_args_and_predecessor(&ctx, &oracle, QueryType::Regular, DEFAULT_TIME_LIMIT, false),
            Inference::NoPredecessor
        ));
    }

    #[test]
    fn test_proven_negation_means_no_predecessor() {
        let module = light_module();
        let ctx = SynthesisContext::new(&module, Options::default());
        let goal = goal_state(&ctx);
        let op = &module.classes[0].operations[1];
        let query = TransitionQuery::new(
            &ctx,
            "Light",
            "Light",
            vec![op],
            goal.negate(&ctx),
            goal.clone(),
        );
        let oracle = |_: &Query| Verdict::Verified;
        assert!(matches!(
            query.infer_args_and_predecessor(&ctx, &oracle, QueryType::Regular, DEFAULT_TIME_LIMIT, false),
            Inference::NoPredecessor
        ));
        let timeout_oracle = |_: &Query| Verdict::Timeout;
        let query = TransitionQuery::new(
            &ctx,
            "Light",
            "Light",
            vec![op],
            goal.negate(&ctx),
            goal.clone(),
        );
        assert!(matches!(
            query.infer_args_and_predecessor(&ctx, &timeout_oracle, QueryType::Regular, DEFAULT_TIME_LIMIT, false),
            Inference::Timeout
        ));
    }

    #[test]
    fn test_calls_are_emitted_tail_first_with_fresh_arguments() {
        let module = Module {
            classes: vec![ClassDecl {
                name: "Registry".to_string(),
                fields: vec![Binder::new(
                    "users",
                    Sort::Set(Box::new(Sort::String)),
                )],
                operations: vec![OperationDecl {
                    name: "AddUser".to_string(),
                    params: vec![Binder::new("name", Sort::String)],
                    outs: vec![],
                    requires: vec![term("name !in this.users").unwrap()],
                    modifies: vec![Term::This],
                    kind: OperationKind::Mutator,
                    usable: true,
                }],
            }],
            goals: vec![],
        };
        let ctx = SynthesisContext::new(&module, Options::default());
        let op = &module.classes[0].operations[0];
        let before = State::new(&ctx, "Registry", "");
        let after = State::new(&ctx, "Registry", "");
        let query = TransitionQuery::new(&ctx, "Registry", "Registry", vec![op, op], before, after);
        let oracle = |q: &Query| {
            assert_eq!(q.operations(), vec!["AddUser", "AddUser"]);
            let rendered: Vec<String> = q.statements.iter().map(|s| s.to_string()).collect();
            let id = 0; // first query id in a fresh context
            assert!(rendered.contains(&format!(
                "receiver.AddUser(argument_{id}_0_0);"
            )));
            assert!(rendered.contains(&format!(
                "receiver.AddUser(argument_{id}_1_0);"
            )));
            // preconditions assumed with arguments substituted in
            assert!(rendered
                .iter()
                .any(|s| s.contains(&format!("argument_{id}_0_0 !in receiver.users"))));
            Verdict::Verified
        };
        assert!(query
            .verify(&ctx, &oracle, QueryType::Regular, true, DEFAULT_TIME_LIMIT)
            .is_verified());
    }
}
