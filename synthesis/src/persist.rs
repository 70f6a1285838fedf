// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Saving and loading learned heuristic facts.
//!
//! Each class gets one JSON file of named facts: `Change` records (how many
//! properties of a family one call to an operation flips between two
//! values) and `AtStart` records (a property's value right after
//! construction), each tagged with a blueprint of the underlying property.
//! Loading reconstructs the capability and start-value tables and issues no
//! oracle queries for facts already present.

use contracts::sorts::Scope;
use contracts::syntax::{Binder, Term};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::context::SynthesisContext;
use crate::error::SynthesisError;
use crate::heuristic::PropertyValue;
use crate::property::PropertyId;

/// Everything needed to reclassify a property in a fresh context: its
/// class, a term equivalent to the originally classified expression, and
/// the sorts of the term's free identifiers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropertyBlueprint {
    class: String,
    term: Term,
    idents: Vec<Binder>,
}

/// One persisted fact.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum HeuristicFact {
    /// One call to `operation` flips up to `count` properties of the
    /// family from `from` to `to`
    Change {
        /// The operation name
        operation: String,
        /// The flip capability (the unbounded sentinel included)
        count: u32,
        /// The value flipped from
        from: PropertyValue,
        /// The value flipped to
        to: PropertyValue,
        /// The property family
        property: PropertyBlueprint,
    },
    /// The property has `value` right after construction
    AtStart {
        /// The start value
        value: PropertyValue,
        /// Whether the fact is about the fully generalized family rather
        /// than a concrete member
        parent_family: bool,
        /// The property
        property: PropertyBlueprint,
    },
}

fn blueprint(ctx: &SynthesisContext, pid: PropertyId) -> PropertyBlueprint {
    let prop = ctx.property(pid);
    PropertyBlueprint {
        class: prop.class.clone(),
        term: prop.reconstructed(),
        idents: prop
            .assignments
            .iter()
            .filter(|a| a.value.is_none())
            .map(|a| a.formal.clone())
            .collect(),
    }
}

fn reclassify(ctx: &SynthesisContext, blueprint: &PropertyBlueprint) -> PropertyId {
    let mut scope = Scope::new(ctx.module());
    for binder in &blueprint.idents {
        scope.bind(&binder.name, binder.sort.clone());
    }
    ctx.classify(&blueprint.class, &blueprint.term, &scope)
}

fn facts_file(dir: &Path, class: &str) -> std::path::PathBuf {
    dir.join(format!("{class}.facts.json"))
}

/// Save every class's learned facts into the directory, one file per class.
pub fn save_all(ctx: &SynthesisContext, dir: &Path) -> Result<(), SynthesisError> {
    fs::create_dir_all(dir)?;
    for class in ctx.heuristic_classes() {
        let heuristic = ctx.heuristic_for(&class)?;
        let heuristic = heuristic.borrow();
        let mut facts = vec![];
        let operations = heuristic.operations(ctx);
        for (pid, from, to, op_index, count) in heuristic.capability_facts() {
            facts.push(HeuristicFact::Change {
                operation: operations[op_index].name.clone(),
                count,
                from,
                to,
                property: blueprint(ctx, pid),
            });
        }
        for (pid, value) in heuristic.start_value_facts() {
            facts.push(HeuristicFact::AtStart {
                value,
                parent_family: ctx.property(pid).is_parent(),
                property: blueprint(ctx, pid),
            });
        }
        let file = fs::File::create(facts_file(dir, &class))?;
        serde_json::to_writer_pretty(file, &facts)?;
        log::info!("saved {} heuristic facts for class {class}", facts.len());
    }
    Ok(())
}

/// Load every fact file in the directory whose class the module declares.
/// Facts naming unknown operations are skipped with an error log, matching
/// the append-only contract: loading never un-learns anything.
pub fn load_all(ctx: &SynthesisContext, dir: &Path) -> Result<(), SynthesisError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(class) = name.strip_suffix(".facts.json") else {
            continue;
        };
        if ctx.module().find_class(class).is_none() {
            continue;
        }
        let facts: Vec<HeuristicFact> = serde_json::from_reader(fs::File::open(&path)?)?;
        let heuristic = ctx.heuristic_for(class)?;
        let mut heuristic = heuristic.borrow_mut();
        let operations: Vec<String> = heuristic
            .operations(ctx)
            .iter()
            .map(|op| op.name.clone())
            .collect();
        for fact in facts {
            match fact {
                HeuristicFact::Change {
                    operation,
                    count,
                    from,
                    to,
                    property,
                } => {
                    let Some(op_index) = operations.iter().position(|n| *n == operation) else {
                        log::error!("unexpected operation {operation} in heuristic facts for {class}");
                        continue;
                    };
                    let pid = reclassify(ctx, &property);
                    let parent = ctx.property(pid).parent();
                    heuristic.install_capability(parent, from, to, op_index, count);
                }
                HeuristicFact::AtStart {
                    value,
                    parent_family,
                    property,
                } => {
                    let mut pid = reclassify(ctx, &property);
                    if parent_family {
                        pid = ctx.property(pid).parent();
                    }
                    heuristic.install_start_value(pid, value);
                }
            }
        }
        log::info!("loaded heuristic facts for class {class}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{Options, SynthesisContext};
    use crate::heuristic::Heuristic;
    use contracts::decls::{ClassDecl, Module, OperationDecl, OperationKind};
    use contracts::parser::term;
    use contracts::syntax::Sort;

    fn module() -> Module {
        Module {
            classes: vec![ClassDecl {
                name: "Registry".to_string(),
                fields: vec![Binder::new(
                    "table",
                    Sort::Map(Box::new(Sort::String), Box::new(Sort::Int)),
                )],
                operations: vec![
                    OperationDecl {
                        name: "Registry".to_string(),
                        params: vec![],
                        outs: vec![],
                        requires: vec![],
                        modifies: vec![],
                        kind: OperationKind::Constructor,
                        usable: false,
                    },
                    OperationDecl {
                        name: "Put".to_string(),
                        params: vec![
                            Binder::new("key", Sort::String),
                            Binder::new("value", Sort::Int),
                        ],
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

    #[test]
    fn test_round_trip_preserves_tables_without_queries() {
        let module = module();
        let dir = tempfile::tempdir().unwrap();

        let saved_facts;
        {
            let ctx = SynthesisContext::new(&module, Options::default());
            let scope = Scope::new(&module).with_this(Sort::object("Registry"));
            let concrete = ctx.classify(
                "Registry",
                &term("this.table[\"k\"] == 1").unwrap(),
                &scope,
            );
            let parent = ctx.property(concrete).parent();
            {
                let heuristic = ctx.heuristic_for("Registry").unwrap();
                let mut heuristic = heuristic.borrow_mut();
                heuristic.install_start_value(parent, PropertyValue::Unknown);
                heuristic.install_start_value(concrete, PropertyValue::False);
                heuristic.install_capability(
                    parent,
                    PropertyValue::False,
                    PropertyValue::True,
                    0,
                    1,
                );
                heuristic.install_capability(
                    parent,
                    PropertyValue::True,
                    PropertyValue::False,
                    0,
                    10_000,
                );
            }
            save_all(&ctx, dir.path()).unwrap();
            let ctx2 = SynthesisContext::new(&module, Options::default());
            load_all(&ctx2, dir.path()).unwrap();
            // loading issued no oracle queries at all
            assert_eq!(ctx2.stats_snapshot().total_count(), 0);

            let reloaded = ctx2.heuristic_for("Registry").unwrap();
            let reloaded = reloaded.borrow();
            let caps: Vec<_> = reloaded.capability_facts().collect();
            let starts: Vec<_> = reloaded.start_value_facts().collect();
            assert_eq!(caps.len(), 2);
            assert_eq!(starts.len(), 2);
            assert!(caps
                .iter()
                .any(|&(_, from, to, op, count)| from == PropertyValue::False
                    && to == PropertyValue::True
                    && op == 0
                    && count == 1));
            assert!(caps
                .iter()
                .any(|&(_, _, to, _, count)| to == PropertyValue::False && count == 10_000));
            // parent/concrete distinction survives the trip
            let parent_starts: Vec<_> = starts
                .iter()
                .filter(|(pid, _)| ctx2.property(*pid).is_parent())
                .collect();
            assert_eq!(parent_starts.len(), 1);
            assert_eq!(parent_starts[0].1, PropertyValue::Unknown);
            saved_facts = std::fs::read_to_string(facts_file(dir.path(), "Registry")).unwrap();
        }

        // saving the reloaded tables produces the same logical facts
        let ctx3 = SynthesisContext::new(&module, Options::default());
        load_all(&ctx3, dir.path()).unwrap();
        let dir2 = tempfile::tempdir().unwrap();
        save_all(&ctx3, dir2.path()).unwrap();
        let resaved = std::fs::read_to_string(facts_file(dir2.path(), "Registry")).unwrap();
        let parse = |s: &str| serde_json::from_str::<Vec<HeuristicFact>>(s).unwrap().len();
        assert_eq!(parse(&saved_facts), parse(&resaved));
    }

    #[test]
    fn test_unknown_operation_is_skipped() {
        let module = module();
        let dir = tempfile::tempdir().unwrap();
        let facts = vec![HeuristicFact::Change {
            operation: "Vanished".to_string(),
            count: 1,
            from: PropertyValue::False,
            to: PropertyValue::True,
            property: PropertyBlueprint {
                class: "Registry".to_string(),
                term: term("this.table[\"k\"] == 1").unwrap(),
                idents: vec![],
            },
        }];
        std::fs::write(
            facts_file(dir.path(), "Registry"),
            serde_json::to_string(&facts).unwrap(),
        )
        .unwrap();
        let ctx = SynthesisContext::new(&module, Options::default());
        load_all(&ctx, dir.path()).unwrap();
        let heuristic = ctx.heuristic_for("Registry").unwrap();
        assert_eq!(heuristic.borrow().capability_facts().count(), 0);
    }

    #[test]
    fn test_missing_class_files_are_ignored() {
        let module = module();
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(facts_file(dir.path(), "Elsewhere"), "[]").unwrap();
        let ctx = SynthesisContext::new(&module, Options::default());
        load_all(&ctx, dir.path()).unwrap();
        assert!(ctx.heuristic_classes().is_empty());
        let _ = Heuristic::new(&module.classes[0]).unwrap();
    }
}
