// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! The expression tree for object contracts and goal predicates.
//!
//! `Display` on [`Term`] produces the canonical print form. The synthesis
//! engine interns properties by this form, so printing is deterministic and
//! parenthesizes purely by precedence, never by source layout.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

/// A Sort represents a collection of values: the built-in primitive sorts,
/// object sorts identified by their class name, and collection sorts.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Sort {
    /// Boolean sort
    Bool,
    /// Mathematical integers
    Int,
    /// Immutable character strings
    String,
    /// Reference to an object of the named class
    Object(String),
    /// Finite set over an element sort
    Set(Box<Sort>),
    /// Finite sequence over an element sort
    Seq(Box<Sort>),
    /// Finite map from a key sort to a value sort
    Map(Box<Sort>, Box<Sort>),
}

impl Sort {
    /// Smart constructor for an object sort that takes &str.
    pub fn object(name: &str) -> Self {
        Self::Object(name.to_string())
    }

    /// Whether values of this sort can appear as property parameters.
    /// Only primitive-sorted literals and identifiers are generalized away
    /// during property normalization.
    pub fn is_primitive(&self) -> bool {
        matches!(self, Sort::Bool | Sort::Int | Sort::String)
    }
}

impl fmt::Display for Sort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sort::Bool => write!(f, "bool"),
            Sort::Int => write!(f, "int"),
            Sort::String => write!(f, "string"),
            Sort::Object(name) => write!(f, "{name}"),
            Sort::Set(elt) => write!(f, "set<{elt}>"),
            Sort::Seq(elt) => write!(f, "seq<{elt}>"),
            Sort::Map(key, value) => write!(f, "map<{key}, {value}>"),
        }
    }
}

/// A binder is a variable name and a sort (used for formal parameters and
/// quantifiers).
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Binder {
    /// Bound name
    pub name: String,
    /// Sort for this binder
    pub sort: Sort,
}

impl Binder {
    /// Smart constructor for a Binder that takes arguments by reference.
    pub fn new(name: &str, sort: Sort) -> Self {
        Binder {
            name: name.to_string(),
            sort,
        }
    }
}

/// A literal constant
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Literal {
    /// A boolean constant
    Bool(bool),
    /// An integer constant
    Int(i64),
    /// A string constant
    Str(String),
    /// The null reference
    Null,
}

impl Literal {
    /// The sort of this literal, or `None` for `null`, whose sort depends on
    /// context.
    pub fn sort(&self) -> Option<Sort> {
        match self {
            Literal::Bool(_) => Some(Sort::Bool),
            Literal::Int(_) => Some(Sort::Int),
            Literal::Str(_) => Some(Sort::String),
            Literal::Null => None,
        }
    }
}

/// Unary operators
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum UOp {
    /// Boolean negation
    Not,
    /// Cardinality of a collection, printed `|x|`
    Card,
}

/// Binary operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum BinOp {
    Equals,
    NotEquals,
    In,
    NotIn,
    Lt,
    Le,
    Gt,
    Ge,
    Implies,
    Iff,
}

/// N-ary logical operators
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum NOp {
    And,
    Or,
}

/// A kind of quantifier (forall or exists)
#[allow(missing_docs)]
#[derive(PartialEq, Eq, Clone, Copy, Debug, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Quantifier {
    Forall,
    Exists,
}

/// A term over an object's state.
///
/// Terms are always interpreted relative to a receiver object, referenced by
/// [`Term::This`]. Free identifiers refer to formal parameters of the
/// enclosing query or declaration.
#[derive(PartialEq, Eq, Clone, Debug, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Term {
    /// A literal constant
    Literal(Literal),
    /// A reference to a formal parameter or bound variable
    Id(String),
    /// The receiver object
    This,
    /// Field selection, `obj.field`
    Field(Box<Term>, String),
    /// Sequence or map indexing, `coll[key]`
    Select(Box<Term>, Box<Term>),
    /// An applied unary operation
    UnaryOp(UOp, Box<Term>),
    /// An applied binary operation
    BinOp(BinOp, Box<Term>, Box<Term>),
    /// An applied n-ary operation
    NAryOp(NOp, Vec<Term>),
    /// A quantifier with a sequence of binders and a body where the binders
    /// might be used freely.
    #[allow(missing_docs)]
    Quantified {
        quantifier: Quantifier,
        binders: Vec<Binder>,
        body: Box<Term>,
    },
}

impl Term {
    /// Smart constructor for boolean literals.
    pub fn literal(value: bool) -> Self {
        Self::Literal(Literal::Bool(value))
    }

    /// Smart constructor for integer literals.
    pub fn int(value: i64) -> Self {
        Self::Literal(Literal::Int(value))
    }

    /// Smart constructor for string literals.
    pub fn str(value: &str) -> Self {
        Self::Literal(Literal::Str(value.to_string()))
    }

    /// The null reference.
    pub fn null() -> Self {
        Self::Literal(Literal::Null)
    }

    /// Smart constructor for identifiers that takes &str.
    pub fn id(name: &str) -> Self {
        Self::Id(name.to_string())
    }

    /// Smart constructor for field selection.
    pub fn field(obj: Term, name: &str) -> Self {
        Self::Field(Box::new(obj), name.to_string())
    }

    /// Smart constructor for indexing.
    pub fn select(coll: Term, key: Term) -> Self {
        Self::Select(Box::new(coll), Box::new(key))
    }

    /// Smart constructor for cardinality.
    pub fn card(coll: Term) -> Self {
        Self::UnaryOp(UOp::Card, Box::new(coll))
    }

    /// Plain boolean negation (always wraps).
    pub fn not_(t: Term) -> Self {
        Self::UnaryOp(UOp::Not, Box::new(t))
    }

    /// Boolean negation that cancels a double negation instead of stacking
    /// `Not` nodes.
    pub fn negate(t: Term) -> Self {
        match t {
            Term::UnaryOp(UOp::Not, inner) => *inner,
            t => Term::not_(t),
        }
    }

    /// Smart constructor for equality.
    pub fn equals(lhs: Term, rhs: Term) -> Self {
        Self::BinOp(BinOp::Equals, Box::new(lhs), Box::new(rhs))
    }

    /// Smart constructor for membership.
    pub fn in_(elt: Term, coll: Term) -> Self {
        Self::BinOp(BinOp::In, Box::new(elt), Box::new(coll))
    }

    /// Conjunction of terms; the empty conjunction is `true` and a singleton
    /// is returned as-is.
    pub fn and<I: IntoIterator<Item = Term>>(ts: I) -> Self {
        let mut ts: Vec<Term> = ts.into_iter().collect();
        match ts.len() {
            0 => Term::literal(true),
            1 => ts.pop().unwrap(),
            _ => Self::NAryOp(NOp::And, ts),
        }
    }

    /// Disjunction of terms; the empty disjunction is `false` and a singleton
    /// is returned as-is.
    pub fn or<I: IntoIterator<Item = Term>>(ts: I) -> Self {
        let mut ts: Vec<Term> = ts.into_iter().collect();
        match ts.len() {
            0 => Term::literal(false),
            1 => ts.pop().unwrap(),
            _ => Self::NAryOp(NOp::Or, ts),
        }
    }

    /// Smart constructor for implication.
    pub fn implies(lhs: Term, rhs: Term) -> Self {
        Self::BinOp(BinOp::Implies, Box::new(lhs), Box::new(rhs))
    }

    /// Free identifiers of this term, excluding quantifier-bound names and
    /// the receiver.
    pub fn free_ids(&self) -> HashSet<String> {
        fn go(t: &Term, bound: &im::HashSet<String>, out: &mut HashSet<String>) {
            match t {
                Term::Literal(_) | Term::This => (),
                Term::Id(name) => {
                    if !bound.contains(name) {
                        out.insert(name.clone());
                    }
                }
                Term::Field(obj, _) => go(obj, bound, out),
                Term::Select(coll, key) => {
                    go(coll, bound, out);
                    go(key, bound, out);
                }
                Term::UnaryOp(_, arg) => go(arg, bound, out),
                Term::BinOp(_, lhs, rhs) => {
                    go(lhs, bound, out);
                    go(rhs, bound, out);
                }
                Term::NAryOp(_, args) => {
                    for arg in args {
                        go(arg, bound, out);
                    }
                }
                Term::Quantified { binders, body, .. } => {
                    let mut bound = bound.clone();
                    bound.extend(binders.iter().map(|b| b.name.clone()));
                    go(body, &bound, out);
                }
            }
        }
        let mut out = HashSet::new();
        go(self, &im::HashSet::new(), &mut out);
        out
    }
}

// Precedence levels used by `Display`; higher binds tighter. The parser in
// `crate::parser` accepts exactly the forms printed here.
fn precedence(t: &Term) -> u32 {
    match t {
        Term::Quantified { .. } => 0,
        Term::BinOp(BinOp::Iff, ..) => 1,
        Term::BinOp(BinOp::Implies, ..) => 2,
        Term::NAryOp(NOp::Or, _) => 3,
        Term::NAryOp(NOp::And, _) => 4,
        Term::BinOp(..) => 5,
        Term::UnaryOp(UOp::Not, _) => 6,
        Term::Field(..) | Term::Select(..) => 7,
        Term::Literal(_) | Term::Id(_) | Term::This | Term::UnaryOp(UOp::Card, _) => 8,
    }
}

fn fmt_term(t: &Term, f: &mut fmt::Formatter<'_>, ctx: u32) -> fmt::Result {
    let prec = precedence(t);
    if prec < ctx {
        write!(f, "(")?;
        fmt_term(t, f, 0)?;
        return write!(f, ")");
    }
    match t {
        Term::Literal(Literal::Bool(b)) => write!(f, "{b}"),
        Term::Literal(Literal::Int(i)) => write!(f, "{i}"),
        Term::Literal(Literal::Str(s)) => write!(f, "\"{s}\""),
        Term::Literal(Literal::Null) => write!(f, "null"),
        Term::Id(name) => write!(f, "{name}"),
        Term::This => write!(f, "this"),
        Term::Field(obj, name) => {
            fmt_term(obj, f, 7)?;
            write!(f, ".{name}")
        }
        Term::Select(coll, key) => {
            fmt_term(coll, f, 7)?;
            write!(f, "[")?;
            fmt_term(key, f, 0)?;
            write!(f, "]")
        }
        Term::UnaryOp(UOp::Not, arg) => {
            write!(f, "!")?;
            fmt_term(arg, f, 7)
        }
        Term::UnaryOp(UOp::Card, arg) => {
            write!(f, "|")?;
            fmt_term(arg, f, 0)?;
            write!(f, "|")
        }
        Term::BinOp(op, lhs, rhs) => {
            let (symbol, child) = match op {
                BinOp::Equals => ("==", 6),
                BinOp::NotEquals => ("!=", 6),
                BinOp::In => ("in", 6),
                BinOp::NotIn => ("!in", 6),
                BinOp::Lt => ("<", 6),
                BinOp::Le => ("<=", 6),
                BinOp::Gt => (">", 6),
                BinOp::Ge => (">=", 6),
                BinOp::Implies => ("==>", 3),
                BinOp::Iff => ("<==>", 2),
            };
            fmt_term(lhs, f, child)?;
            write!(f, " {symbol} ")?;
            fmt_term(rhs, f, child)
        }
        Term::NAryOp(op, args) => {
            let symbol = match op {
                NOp::And => "&&",
                NOp::Or => "||",
            };
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    write!(f, " {symbol} ")?;
                }
                fmt_term(arg, f, prec + 1)?;
            }
            Ok(())
        }
        Term::Quantified {
            quantifier,
            binders,
            body,
        } => {
            let kw = match quantifier {
                Quantifier::Forall => "forall",
                Quantifier::Exists => "exists",
            };
            write!(f, "{kw} ")?;
            for (i, b) in binders.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}: {}", b.name, b.sort)?;
            }
            write!(f, " :: ")?;
            fmt_term(body, f, 0)
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt_term(self, f, 0)
    }
}
