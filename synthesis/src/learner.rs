// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Heuristic pretraining, separated from search.
//!
//! For each class with usable operations, forward exploration starts from
//! an arbitrary state, applies each operation through argument inference to
//! discover reachable properties, drives the heuristic to a fact fixpoint,
//! and saves the facts. Classes are independent, so they learn in parallel,
//! one context per class.

use contracts::decls::{ClassDecl, Module};
use itertools::Itertools;
use oracle::{Oracle, QueryType};
use rayon::prelude::*;
use std::collections::{HashSet, VecDeque};

use crate::context::{Options, Persistence, SynthesisContext};
use crate::error::SynthesisError;
use crate::persist;
use crate::query::{Inference, TransitionQuery, DEFAULT_TIME_LIMIT};
use crate::state::State;

/// Exploration depth bound, to prevent combinatorial explosion.
const DEPTH_LIMIT: usize = 1;

/// Learn and save heuristic facts for every class in the module that has
/// usable operations. Requires [`Persistence::Learn`] in the options.
pub fn learn_all<O: Oracle + Sync>(
    module: &Module,
    options: &Options,
    oracle: &O,
) -> Result<(), SynthesisError> {
    let Persistence::Learn(directory) = &options.persistence else {
        log::warn!("no learning directory configured; nothing to pretrain");
        return Ok(());
    };
    let classes: Vec<&ClassDecl> = module
        .classes
        .iter()
        .filter(|class| !class.usable_operations().is_empty())
        .collect();
    if classes.is_empty() {
        log::warn!("no classes with usable operations found");
        return Ok(());
    }
    log::info!(
        "starting heuristic learning for classes: {}",
        classes.iter().map(|c| &c.name).join(", ")
    );
    classes
        .par_iter()
        .map(|&class| {
            let ctx = SynthesisContext::new(module, options.clone());
            learn_class(&ctx, oracle, class)?;
            persist::save_all(&ctx, directory)
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(())
}

fn learn_class(
    ctx: &SynthesisContext,
    oracle: &dyn Oracle,
    class: &ClassDecl,
) -> Result<(), SynthesisError> {
    let heuristic = ctx.heuristic_for(&class.name)?;
    let initial = State::new(ctx, &class.name, "");
    let mut fringe = VecDeque::from([(initial.clone(), 0usize)]);
    let mut explored = HashSet::from([initial]);
    while let Some((state, depth)) = fringe.pop_front() {
        if depth >= DEPTH_LIMIT {
            continue;
        }
        for operation in class.usable_operations() {
            log::info!("trying out {}", operation.name);
            let query = TransitionQuery::new(
                ctx,
                &class.name,
                &class.name,
                vec![operation],
                state.clone(),
                State::new(ctx, &class.name, ""),
            );
            if let Inference::Predecessor {
                state: Some(new_state),
                ..
            } = query.infer_args_and_predecessor(ctx, oracle, QueryType::Regular, DEFAULT_TIME_LIMIT, true)
            {
                heuristic.borrow_mut().update_with_new_properties(
                    ctx,
                    oracle,
                    new_state.properties().collect(),
                );
                if explored.insert(new_state.clone()) {
                    log::info!("new state is {}", new_state.display(ctx));
                    fringe.push_back((new_state, depth + 1));
                }
            }
        }
    }
    // drive the heuristic to a fixpoint on everything exploration surfaced
    while heuristic.borrow_mut().try_improve(ctx, oracle, true) {}
    Ok(())
}
