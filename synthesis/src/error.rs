// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Fatal synthesis errors.
//!
//! Everything here is reported before or instead of a search result.
//! Recoverable conditions -- an oracle timeout, a spurious counterexample, an
//! unreachable predecessor -- are ordinary values on the query and search
//! paths, never errors.

use thiserror::Error;

/// An error that stops synthesis before it can produce an outcome.
#[derive(Error, Debug)]
pub enum SynthesisError {
    /// No goal predicate matches the requested name (or none exists).
    #[error("no synthesis goal named {0} was found")]
    MissingGoal(String),
    /// No goal name was given and the module declares none.
    #[error("the module declares no synthesis goal")]
    NoGoals,
    /// No goal name was given and the module declares several.
    #[error("multiple synthesis goals found; select one by name")]
    AmbiguousGoal,
    /// The goal predicate's receiver is not object-sorted.
    #[error("goal receiver must be an object, got sort {0}")]
    BadGoalReceiver(String),
    /// A class referenced by a goal or subproblem is not declared.
    #[error("unknown class {0}")]
    UnknownClass(String),
    /// A class under synthesis has no constructor.
    #[error("class {0} does not declare a constructor")]
    MissingConstructor(String),
    /// A constructor was marked usable; constructors are always implicit.
    #[error("constructors cannot be marked usable (class {0})")]
    UsableConstructor(String),
    /// Reading or writing heuristic fact files failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// A heuristic fact file is not valid.
    #[error("malformed heuristic fact file: {0}")]
    Facts(#[from] serde_json::Error),
}
