// Copyright 2022-2023 VMware, Inc.
// SPDX-License-Identifier: BSD-2-Clause

//! Parser for contract terms and sorts.
//!
//! The grammar accepts exactly the forms [`crate::syntax::Term`]'s `Display`
//! prints, so parse-print round trips are stable. The full contract language
//! front end lives outside this workspace; this parser exists for goal
//! predicates, persisted heuristic facts, and tests.

use crate::syntax::*;
use peg::{error::ParseError, str::LineCol};

peg::parser! {

grammar parser() for str {
    use BinOp::*;
    use Quantifier::*;

    rule ident_start() = ['a'..='z' | 'A'..='Z' | '_']
    rule ident_char() = ident_start() / ['0'..='9']
    rule ident() -> String
    = s:$(quiet!{ident_start() ident_char()*} / expected!("identifier"))
    { s.to_string() }

    rule whitespace() = quiet! { [' ' | '\t' | '\n' | '\r'] }
    rule word_boundary() = !ident_char()
    rule _ = whitespace()*
    rule __ = word_boundary() _

    rule int() -> i64
    = n:$(quiet!{"-"? ['0'..='9']+} / expected!("integer")) {? n.parse().or(Err("i64")) }

    rule string_contents() -> String
    = s:$([^ '"']*) { s.to_string() }

    pub(super) rule sort() -> Sort = precedence!{
        "bool" word_boundary() { Sort::Bool }
        "int" word_boundary() { Sort::Int }
        "string" word_boundary() { Sort::String }
        "set" _ "<" _ elt:sort() _ ">" { Sort::Set(Box::new(elt)) }
        "seq" _ "<" _ elt:sort() _ ">" { Sort::Seq(Box::new(elt)) }
        "map" _ "<" _ key:sort() _ "," _ value:sort() _ ">"
        { Sort::Map(Box::new(key), Box::new(value)) }
        name:ident() { Sort::Object(name) }
    }

    rule binder() -> Binder
    = name:ident() _ ":" _ sort:sort() { Binder { name, sort } }

    pub(super) rule term() -> Term = precedence!{
        q:("forall" { Forall } / "exists" { Exists }) __
            binders:(binder() ** (_ "," _)) _ "::" _ body:@
        { Term::Quantified {
            quantifier: q,
            binders,
            body: Box::new(body),
          } }
        --
        x:(@) _ "<==>" _ y:@ { Term::BinOp(Iff, Box::new(x), Box::new(y)) }
        --
        x:@ _ "==>" _ y:(@) { Term::BinOp(Implies, Box::new(x), Box::new(y)) }
        --
        x:(@) _ "||" _ y:@ { Term::or([x, y]) }
        --
        x:(@) _ "&&" _ y:@ { Term::and([x, y]) }
        --
        x:(@) _ "==" _ y:@ { Term::BinOp(Equals, Box::new(x), Box::new(y)) }
        x:(@) _ "!=" _ y:@ { Term::BinOp(NotEquals, Box::new(x), Box::new(y)) }
        x:(@) _ "!in" __ y:@ { Term::BinOp(NotIn, Box::new(x), Box::new(y)) }
        x:(@) _ "in" __ y:@ { Term::BinOp(In, Box::new(x), Box::new(y)) }
        x:(@) _ "<=" _ y:@ { Term::BinOp(Le, Box::new(x), Box::new(y)) }
        x:(@) _ ">=" _ y:@ { Term::BinOp(Ge, Box::new(x), Box::new(y)) }
        x:(@) _ "<" _ y:@ { Term::BinOp(Lt, Box::new(x), Box::new(y)) }
        x:(@) _ ">" _ y:@ { Term::BinOp(Gt, Box::new(x), Box::new(y)) }
        --
        "!" _ x:@ { Term::not_(x) }
        --
        t:(@) "." name:ident() { Term::field(t, &name) }
        t:(@) "[" _ key:term() _ "]" { Term::select(t, key) }
        --
        "true" word_boundary() { Term::literal(true) }
        "false" word_boundary() { Term::literal(false) }
        "null" word_boundary() { Term::null() }
        "this" word_boundary() { Term::This }
        n:int() { Term::Literal(Literal::Int(n)) }
        "\"" s:string_contents() "\"" { Term::Literal(Literal::Str(s)) }
        "|" _ t:term() _ "|" { Term::card(t) }
        name:ident() { Term::Id(name) }
        "(" _ t:term() _ ")" { t }
    }

    pub(super) rule term_eof() -> Term = _ t:term() _ ![_] { t }
    pub(super) rule sort_eof() -> Sort = _ s:sort() _ ![_] { s }
}

}

/// Parse a single term.
pub fn term(s: &str) -> Result<Term, ParseError<LineCol>> {
    parser::term_eof(s)
}

/// Parse a single sort.
pub fn sort(s: &str) -> Result<Sort, ParseError<LineCol>> {
    parser::sort_eof(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(s: &str) {
        let t = term(s).expect("parse");
        assert_eq!(t.to_string(), s);
        assert_eq!(term(&t.to_string()).expect("reparse"), t);
    }

    #[test]
    fn test_term_roundtrip() {
        roundtrip("this.flag == true");
        roundtrip("\"A\" in this.users[\"B\"].friends");
        roundtrip("!(x in this.elements)");
        roundtrip("a && (b || c)");
        roundtrip("|this.items| > 0");
        roundtrip("forall k: string :: k in this.keys ==> this.counts[k] >= 0");
        roundtrip("this.next != null");
    }

    #[test]
    fn test_term_precedence() {
        assert_eq!(
            term("a && b || c").unwrap(),
            Term::or([Term::and([Term::id("a"), Term::id("b")]), Term::id("c")])
        );
        assert_eq!(
            term("!a.flag").unwrap(),
            Term::not_(Term::field(Term::id("a"), "flag"))
        );
    }

    #[test]
    fn test_in_needs_boundary() {
        // `inn` is an identifier, not the membership operator
        assert!(term("x inn").is_err());
        assert_eq!(
            term("x in inn").unwrap(),
            Term::in_(Term::id("x"), Term::id("inn"))
        );
    }

    #[test]
    fn test_sorts() {
        assert_eq!(sort("map<string, set<int>>").unwrap().to_string(), "map<string, set<int>>");
        assert_eq!(sort("Account").unwrap(), Sort::object("Account"));
    }
}
