// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The synthesis context: one arena per synthesis run.
//!
//! Every component takes a [`SynthesisContext`]; it owns the property
//! interning table, the state registry, the per-class heuristics, the query
//! counters, and the run's option set and deadline. Interning and registry
//! tables are append-only for the lifetime of the context.

use contracts::decls::Module;
use contracts::sorts::Scope;
use contracts::syntax::Term;
use oracle::{Oracle, Query, QueryStats, StatsSnapshot, Verdict};
use std::cell::{Cell, RefCell};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::error::SynthesisError;
use crate::heuristic::Heuristic;
use crate::property::{Property, PropertyId, PropertyTable};
use crate::state::State;

/// What to do with learned heuristic facts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum Persistence {
    /// Keep facts in memory only
    #[default]
    None,
    /// Learn facts and save them to the given directory
    Learn(PathBuf),
    /// Load facts from the given directory and learn nothing new
    Load(PathBuf),
}

/// Options for a synthesis run.
#[derive(Clone, Debug, Default)]
pub struct Options {
    /// Name of the goal predicate to synthesize, when the module declares
    /// several
    pub goal: Option<String>,
    /// Wall-clock budget for the whole run; `None` means unbounded
    pub time_limit: Option<Duration>,
    /// Disable the distance estimate entirely (every state estimates 0)
    pub disable_heuristic: bool,
    /// Use the greedy (non-ILP) distance estimate
    pub greedy: bool,
    /// Heuristic fact persistence mode
    pub persistence: Persistence,
}

/// Shared, run-scoped synthesis state.
pub struct SynthesisContext<'m> {
    module: &'m Module,
    options: Options,
    properties: RefCell<PropertyTable>,
    registry: RefCell<HashMap<u32, State>>,
    heuristics: RefCell<HashMap<String, Rc<RefCell<Heuristic>>>>,
    next_state_id: Cell<u32>,
    next_query_id: Cell<u32>,
    started: Instant,
    stats: QueryStats,
}

impl<'m> SynthesisContext<'m> {
    /// Create a fresh context for one run over the given module.
    pub fn new(module: &'m Module, options: Options) -> Self {
        SynthesisContext {
            module,
            options,
            properties: RefCell::new(PropertyTable::default()),
            registry: RefCell::new(HashMap::new()),
            heuristics: RefCell::new(HashMap::new()),
            next_state_id: Cell::new(0),
            next_query_id: Cell::new(0),
            started: Instant::now(),
            stats: QueryStats::new(),
        }
    }

    /// The module under synthesis.
    pub fn module(&self) -> &'m Module {
        self.module
    }

    /// The run's options.
    pub fn options(&self) -> &Options {
        &self.options
    }

    /// The run's query statistics.
    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    /// A copy of the current query statistics.
    pub fn stats_snapshot(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the run's wall-clock budget is spent.
    pub fn deadline_exceeded(&self) -> bool {
        match self.options.time_limit {
            Some(limit) => self.started.elapsed() > limit,
            None => false,
        }
    }

    /// Allocate a state identifier.
    pub(crate) fn fresh_state_id(&self) -> u32 {
        let id = self.next_state_id.get();
        self.next_state_id.set(id + 1);
        id
    }

    /// Allocate a query identifier.
    pub(crate) fn fresh_query_id(&self) -> u32 {
        let id = self.next_query_id.get();
        self.next_query_id.set(id + 1);
        id
    }

    /// Store an immutable snapshot of a state in the registry under its id.
    /// The first snapshot wins; later calls for the same id are no-ops.
    pub fn register_state(&self, state: &State) {
        self.registry
            .borrow_mut()
            .entry(state.id())
            .or_insert_with(|| state.clone());
    }

    /// Recover a registered state by id.
    pub fn state_by_id(&self, id: u32) -> Option<State> {
        self.registry.borrow().get(&id).cloned()
    }

    /// Classify a term into an interned property of the given class.
    /// See the property model for the normalization rules.
    pub fn classify(&self, class: &str, term: &Term, scope: &Scope) -> PropertyId {
        self.properties.borrow_mut().classify(class, term, scope)
    }

    /// Look up an interned property.
    pub fn property(&self, id: PropertyId) -> Rc<Property> {
        self.properties.borrow().get(id)
    }

    /// The canonical total order on properties.
    pub fn compare_properties(&self, a: PropertyId, b: PropertyId) -> Ordering {
        if a == b {
            return Ordering::Equal;
        }
        let properties = self.properties.borrow();
        Property::compare(&properties.get(a), &properties.get(b))
    }

    /// The heuristic for a class, created (and its input contract validated)
    /// on first use.
    pub fn heuristic_for(
        &self,
        class: &str,
    ) -> Result<Rc<RefCell<Heuristic>>, SynthesisError> {
        if let Some(heuristic) = self.heuristics.borrow().get(class) {
            return Ok(heuristic.clone());
        }
        let decl = self
            .module
            .find_class(class)
            .ok_or_else(|| SynthesisError::UnknownClass(class.to_string()))?;
        let heuristic = Rc::new(RefCell::new(Heuristic::new(decl)?));
        self.heuristics
            .borrow_mut()
            .insert(class.to_string(), heuristic.clone());
        Ok(heuristic)
    }

    /// The classes that currently have a heuristic instance.
    pub(crate) fn heuristic_classes(&self) -> Vec<String> {
        self.heuristics.borrow().keys().cloned().collect()
    }

    /// Run a query through the oracle, recording its purpose and duration.
    pub fn verify_query(&self, oracle: &dyn Oracle, query: &Query) -> Verdict {
        log::trace!("verifying:\n{query}");
        let start = Instant::now();
        let verdict = oracle.verify(query);
        let elapsed = start.elapsed();
        self.stats.record(query.query_type, elapsed);
        log::debug!(
            "{} query over {:?} returned {} after {}ms",
            query.query_type.name(),
            query.operations(),
            verdict.name(),
            elapsed.as_millis()
        );
        verdict
    }
}
