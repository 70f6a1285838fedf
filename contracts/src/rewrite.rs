// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Tree-rewriting passes over terms.
//!
//! [`Rewriter`] is the transform interface: implementations override
//! [`Rewriter::rewrite`] for the node kinds they care about and fall back to
//! [`rewrite_children`] for the default recurse-and-rebuild behavior.

use crate::syntax::Term;

/// A term transform with default recurse-and-rebuild behavior.
pub trait Rewriter {
    /// Rewrite one term. The default forwards to [`rewrite_children`].
    fn rewrite(&mut self, term: &Term) -> Term {
        rewrite_children(self, term)
    }
}

/// Rebuild a term, rewriting each child through `rw`.
pub fn rewrite_children<R: Rewriter + ?Sized>(rw: &mut R, term: &Term) -> Term {
    match term {
        Term::Literal(_) | Term::Id(_) | Term::This => term.clone(),
        Term::Field(obj, name) => Term::Field(Box::new(rw.rewrite(obj)), name.clone()),
        Term::Select(coll, key) => {
            Term::Select(Box::new(rw.rewrite(coll)), Box::new(rw.rewrite(key)))
        }
        Term::UnaryOp(op, arg) => Term::UnaryOp(*op, Box::new(rw.rewrite(arg))),
        Term::BinOp(op, lhs, rhs) => {
            Term::BinOp(*op, Box::new(rw.rewrite(lhs)), Box::new(rw.rewrite(rhs)))
        }
        Term::NAryOp(op, args) => Term::NAryOp(*op, args.iter().map(|a| rw.rewrite(a)).collect()),
        Term::Quantified {
            quantifier,
            binders,
            body,
        } => Term::Quantified {
            quantifier: *quantifier,
            binders: binders.clone(),
            body: Box::new(rw.rewrite(body)),
        },
    }
}

struct IdToReceiver<'a>(&'a str);

impl Rewriter for IdToReceiver<'_> {
    fn rewrite(&mut self, term: &Term) -> Term {
        match term {
            Term::Id(name) if name == self.0 => Term::This,
            _ => rewrite_children(self, term),
        }
    }
}

struct ReceiverToId<'a>(&'a str);

impl Rewriter for ReceiverToId<'_> {
    fn rewrite(&mut self, term: &Term) -> Term {
        match term {
            Term::This => Term::id(self.0),
            _ => rewrite_children(self, term),
        }
    }
}

/// Replace every reference to the named identifier with the receiver.
pub fn id_to_receiver(term: &Term, name: &str) -> Term {
    IdToReceiver(name).rewrite(term)
}

/// Replace the receiver with a reference to the named identifier.
pub fn receiver_to_id(term: &Term, name: &str) -> Term {
    ReceiverToId(name).rewrite(term)
}
