// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Call-sequence synthesis against an external deductive verifier.
//!
//! Given a class API (constructors and operations with contracts) and a goal
//! predicate over a receiver object, the engine searches backward from the
//! goal for a constructor call followed by operation calls that provably
//! reach it. Candidate transitions are decided by an [`oracle::Oracle`];
//! counterexamples are turned into predecessor states and argument bindings,
//! and an online-learned, ILP-backed admissible distance estimate steers the
//! search.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
#![allow(clippy::too_many_arguments)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod context;
pub mod error;
pub mod extract;
pub mod heuristic;
pub mod ilp;
pub mod learner;
pub mod persist;
pub mod property;
pub mod query;
pub mod search;
pub mod state;
pub mod wellformed;

pub use context::{Options, Persistence, SynthesisContext};
pub use error::SynthesisError;
pub use heuristic::{Heuristic, PropertyValue};
pub use learner::learn_all;
pub use property::PropertyId;
pub use query::{Inference, Script, TransitionQuery};
pub use search::{synthesize, Outcome, SearchResult};
pub use state::{IndexedProperty, State};
