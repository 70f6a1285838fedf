// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Transition queries as data, and the trait an external verifier implements
//! to decide them.

use contracts::syntax::{Binder, Term};
use itertools::Itertools;
use std::fmt;
use std::time::Duration;

use crate::model::Model;

/// The purpose of a query, used for bookkeeping and reporting.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QueryType {
    /// A search query: predecessor inference or direct construction
    Regular,
    /// A predecessor-simplification re-check
    Simplify,
    /// A heuristic-learning probe
    Heuristic,
}

impl QueryType {
    /// All query purposes, in reporting order.
    pub const ALL: [QueryType; 3] = [QueryType::Regular, QueryType::Simplify, QueryType::Heuristic];

    /// A short name for reports.
    pub fn name(&self) -> &'static str {
        match self {
            QueryType::Regular => "regular",
            QueryType::Simplify => "simplify",
            QueryType::Heuristic => "heuristic",
        }
    }
}

/// Why an assumption statement exists. Downstream passes use the kind to
/// tell load-bearing assumptions from incidental ones.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssumeKind {
    /// An ordinary assumption
    Plain,
    /// Describes the state of an operation argument; carries the registry id
    /// of the state it was emitted from, which the search later uses to
    /// recover nested construction goals
    DescribesArgument(u32),
    /// Binds a renamed property parameter to its concrete value
    DescribesFormal,
}

/// One statement in a query body.
#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    /// Assume a boolean term
    Assume {
        /// The assumed term
        term: Term,
        /// Why this assumption exists
        kind: AssumeKind,
    },
    /// Assert a boolean term. `keep` marks load-bearing assertions that must
    /// survive precondition-assuming transformations.
    Assert {
        /// The asserted term
        term: Term,
        /// Whether downstream passes must keep this assertion
        keep: bool,
    },
    /// Call an operation on a receiver, discarding any outputs
    Call {
        /// The receiver expression
        receiver: Term,
        /// The operation name
        operation: String,
        /// The argument expressions
        args: Vec<Term>,
        /// Whether the operation has output parameters (printed discarded)
        has_outs: bool,
    },
    /// Allocate a fresh object via a constructor
    Alloc {
        /// The target the fresh object is assigned to
        target: Term,
        /// The class being constructed
        class: String,
        /// The constructor argument expressions
        args: Vec<Term>,
    },
    /// Declare a local variable initialized by another statement (used when
    /// splicing subproblem solutions into a surrounding sequence)
    VarDecl {
        /// The local variable name
        name: String,
        /// The initializing statement (an [`Stmt::Alloc`] in practice)
        init: Box<Stmt>,
    },
}

impl Stmt {
    /// The assumption kind, when this statement is an assumption.
    pub fn assume_kind(&self) -> Option<&AssumeKind> {
        match self {
            Stmt::Assume { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Whether this is an assumption tagged as describing an argument, and
    /// if so, for which registered state.
    pub fn describes_argument(&self) -> Option<u32> {
        match self.assume_kind() {
            Some(AssumeKind::DescribesArgument(id)) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Assume { term, .. } => write!(f, "assume {term};"),
            Stmt::Assert { term, .. } => write!(f, "assert {term};"),
            Stmt::Call {
                receiver,
                operation,
                args,
                has_outs,
            } => {
                if *has_outs {
                    write!(f, "var _ := ")?;
                }
                write!(f, "{receiver}.{operation}({});", args.iter().format(", "))
            }
            Stmt::Alloc {
                target,
                class,
                args,
            } => write!(f, "{target} := new {class}({});", args.iter().format(", ")),
            Stmt::VarDecl { name, init } => match init.as_ref() {
                Stmt::Alloc { class, args, .. } => {
                    write!(f, "var {name} := new {class}({});", args.iter().format(", "))
                }
                other => write!(f, "var {name} := {other}"),
            },
        }
    }
}

/// A complete transition query: a precondition, a sequence of calls, and a
/// postcondition, ready for the verifier.
#[derive(Clone, Debug)]
pub struct Query {
    /// The purpose of this query
    pub query_type: QueryType,
    /// The class of the receiver being constructed or mutated
    pub class: String,
    /// The class the synthesized check method notionally lives in
    pub synth_class: String,
    /// Whether the receiver is an input of the query (false for
    /// constructor queries, where the receiver is produced)
    pub receiver_is_input: bool,
    /// Formal parameters, including the receiver
    pub formals: Vec<Binder>,
    /// Frame: locations the called operations may modify
    pub modifies: Vec<Term>,
    /// The query body
    pub statements: Vec<Stmt>,
    /// Whether the verifier should assume all operation preconditions and
    /// well-formedness checks, leaving only the kept assertions as goals
    pub assume_preconditions: bool,
    /// Per-query solver time limit
    pub time_limit: Duration,
}

impl Query {
    /// Names of the operations called by this query, in call order.
    pub fn operations(&self) -> Vec<&str> {
        self.statements
            .iter()
            .filter_map(|s| match s {
                Stmt::Call { operation, .. } => Some(operation.as_str()),
                Stmt::Alloc { class, .. } => Some(class.as_str()),
                _ => None,
            })
            .collect()
    }

    /// The terms of the kept assertions, in order.
    pub fn kept_assertions(&self) -> Vec<&Term> {
        self.statements
            .iter()
            .filter_map(|s| match s {
                Stmt::Assert { term, keep: true } => Some(term),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let formals = self
            .formals
            .iter()
            .map(|b| format!("{}: {}", b.name, b.sort))
            .format(", ");
        writeln!(f, "method check({formals})")?;
        if !self.modifies.is_empty() {
            writeln!(f, "  modifies {}", self.modifies.iter().format(", "))?;
        }
        writeln!(f, "{{")?;
        for stmt in &self.statements {
            writeln!(f, "  {stmt}")?;
        }
        write!(f, "}}")
    }
}

/// The verifier's answer to a query.
#[derive(Clone, Debug)]
pub enum Verdict {
    /// The query is proven
    Verified,
    /// The query is disproven, with a witnessing model
    Counterexample(Model),
    /// The verifier exceeded the query's time limit
    Timeout,
}

impl Verdict {
    /// A short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Verdict::Verified => "verified",
            Verdict::Counterexample(_) => "counterexample",
            Verdict::Timeout => "timeout",
        }
    }

    /// Whether this verdict is [`Verdict::Verified`].
    pub fn is_verified(&self) -> bool {
        matches!(self, Verdict::Verified)
    }
}

/// An external deductive verifier.
pub trait Oracle {
    /// Decide a transition query.
    fn verify(&self, query: &Query) -> Verdict;
}

impl<F> Oracle for F
where
    F: Fn(&Query) -> Verdict,
{
    fn verify(&self, query: &Query) -> Verdict {
        self(query)
    }
}
