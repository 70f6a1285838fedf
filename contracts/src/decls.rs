// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Class, operation, and goal descriptors.
//!
//! These are the resolved declarations the external front end hands to the
//! synthesis engine: for each class its fields and operation contracts, and
//! the goal predicates marked for synthesis. Operation bodies stay with the
//! verifier; the engine only ever sees the contract surface.

use crate::syntax::{Binder, Sort, Term};

/// A resolved collection of class declarations and synthesis goals.
#[derive(Clone, Debug, Default)]
pub struct Module {
    /// The classes whose instances can be constructed and mutated
    pub classes: Vec<ClassDecl>,
    /// The goal predicates marked for synthesis
    pub goals: Vec<GoalDecl>,
}

impl Module {
    /// Find a class by name.
    pub fn find_class(&self, name: &str) -> Option<&ClassDecl> {
        self.classes.iter().find(|c| c.name == name)
    }
}

/// A class declaration: fields plus operation contracts.
#[derive(Clone, Debug)]
pub struct ClassDecl {
    /// The class name; object sorts reference classes by this name
    pub name: String,
    /// The fields, with their sorts
    pub fields: Vec<Binder>,
    /// Constructors and instance operations
    pub operations: Vec<OperationDecl>,
}

impl ClassDecl {
    /// The object sort of this class's instances.
    pub fn sort(&self) -> Sort {
        Sort::Object(self.name.clone())
    }

    /// The sort of a field, if declared.
    pub fn field_sort(&self, name: &str) -> Option<&Sort> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| &f.sort)
    }

    /// All declared constructors, in declaration order.
    pub fn constructors(&self) -> impl Iterator<Item = &OperationDecl> {
        self.operations.iter().filter(|op| op.is_constructor())
    }

    /// The default constructor (the first declared one), if any.
    pub fn constructor(&self) -> Option<&OperationDecl> {
        self.constructors().next()
    }

    /// The operations the synthesizer is allowed to call.
    pub fn usable_operations(&self) -> Vec<&OperationDecl> {
        self.operations
            .iter()
            .filter(|op| op.usable && !op.is_constructor())
            .collect()
    }
}

/// Distinguishes operations that allocate a new receiver from ones that
/// mutate an existing receiver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OperationKind {
    /// Allocates and returns a fresh receiver
    Constructor,
    /// Mutates an existing receiver
    Mutator,
}

/// An operation contract.
#[derive(Clone, Debug)]
pub struct OperationDecl {
    /// The operation name
    pub name: String,
    /// Formal input parameters
    pub params: Vec<Binder>,
    /// Formal output parameters (results are discarded by synthesized calls)
    pub outs: Vec<Binder>,
    /// Precondition clauses, conjoined
    pub requires: Vec<Term>,
    /// Frame: the locations the operation may modify
    pub modifies: Vec<Term>,
    /// Whether this operation allocates or mutates the receiver
    pub kind: OperationKind,
    /// Whether the synthesizer may call this operation
    pub usable: bool,
}

impl OperationDecl {
    /// Whether this operation allocates a new receiver.
    pub fn is_constructor(&self) -> bool {
        self.kind == OperationKind::Constructor
    }
}

/// A goal predicate marked for synthesis: a single receiver parameter and a
/// body constraining its state.
#[derive(Clone, Debug)]
pub struct GoalDecl {
    /// The goal's name, used to select among multiple goals
    pub name: String,
    /// The receiver parameter the body constrains
    pub receiver: Binder,
    /// The goal body, a boolean term over the receiver
    pub body: Term,
}
