// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The deductive-verifier interface.
//!
//! The verifier itself is an external collaborator: the synthesis engine
//! assembles a [`query::Query`] out of statements, formal parameters and a
//! frame, and an [`query::Oracle`] implementation decides it, answering
//! Verified, Counterexample (with a [`model::Model`]), or Timeout.

// configure clippy
#![allow(clippy::needless_return)]
#![allow(clippy::large_enum_variant)]
// documentation-related lints (only checked when running rustdoc)
#![warn(missing_docs)]
#![allow(rustdoc::private_intra_doc_links)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod model;
pub mod query;
pub mod stats;

pub use model::{Model, Phase};
pub use query::{AssumeKind, Oracle, Query, QueryType, Stmt, Verdict};
pub use stats::{QueryStats, StatsSnapshot};
