// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//


//! Reduce checks: pure predicates, keyed by nonterminal, that accept or reject a candidate
//! reduction by comparing jump targets with join-point origins. They encode how the
//! compiler lowers each construct, which the context-free grammar alone cannot express.

use lazy_static::lazy_static;
use std::collections::HashMap;

use crate::ast::Node;
use crate::errors::GrammarError;
use crate::grammar::Grammar;
use crate::token::Token;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

impl From<Option<bool>> for Verdict {
    fn from(holds: Option<bool>) -> Self {
        if holds == Some(true) {
            Verdict::Accept
        } else {
            Verdict::Reject
        }
    }
}

/// `(tokens, first, last, candidate)`, with `first..=last` the candidate's token span.
pub type ReduceCheck = fn(&[Token], usize, usize, &Node) -> Verdict;

#[derive(Clone, Default)]
pub struct CheckRegistry {
    checks: HashMap<&'static str, ReduceCheck>,
}

lazy_static! {
    static ref STANDARD: CheckRegistry = {
        let mut r = CheckRegistry::default();
        r.register("and", and_check);
        r.register("or", or_check);
        r.register("ifstmt", ifstmt_check);
        r.register("iflaststmt", iflaststmt_check);
        r.register("ifelsestmt", ifelsestmt_check);
        r.register("while1stmt", loop_check);
        r.register("whilestmt", loop_check);
        r.register("forstmt", loop_check);
        r.register("try_except", try_except_check);
        r.register("try_except_else", try_except_else_check);
        r
    };
}

impl CheckRegistry {
    /// The checks every dialect grammar relies on.
    pub fn standard() -> &'static CheckRegistry {
        &STANDARD
    }

    pub fn register(&mut self, nonterminal: &'static str, check: ReduceCheck) {
        self.checks.insert(nonterminal, check);
    }

    pub fn get(&self, nonterminal: &str) -> Option<ReduceCheck> {
        self.checks.get(nonterminal).copied()
    }

    /// Every `%check` in `grammar` must have a predicate here.
    pub fn validate(&self, grammar: &Grammar) -> Result<(), GrammarError> {
        for name in grammar.checked_names() {
            if !self.checks.contains_key(name) {
                return Err(GrammarError::UnknownPredicate(name.to_string()));
            }
        }
        Ok(())
    }
}

fn child_token(node: &Node, i: usize) -> Option<&Token> {
    node.child(i).and_then(|c| c.token())
}

/// The jump that decides a test: the last conditional jump under the test node.
fn deciding_jump<'a>(tokens: &'a [Token], test: &Node) -> Option<&'a Token> {
    tokens
        .get(test.span())?
        .iter()
        .rev()
        .find(|t| t.is_conditional_jump())
}

fn origin_is(token: &Token, from: &Token) -> bool {
    token.is_come_from() && token.pattern_offset() == Some(from.offset)
}

/// A short-circuit jump lands strictly inside its own span, or on the right operand of the
/// `or` that immediately follows.
fn and_check(tokens: &[Token], first: usize, last: usize, node: &Node) -> Verdict {
    let holds = (|| {
        let jump = node.child(1)?.tokens().last().copied()?;
        let target = jump.jump_target()?;
        if tokens.get(first)?.offset < target && target <= tokens.get(last)?.offset {
            return Some(true);
        }
        let next = tokens.get(last + 1)?;
        let join = tokens.get(last + 2)?;
        let or_jump = matches!(next.kind.as_str(), "JUMP_IF_TRUE_OR_POP" | "POP_JUMP_IF_TRUE");
        Some(or_jump && origin_is(join, jump) && join.offset == target)
    })();
    holds.into()
}

/// A value `or` lands on its own closing join point. A test `or` skips the conditional
/// jump that follows it and lands on the first join point of the body.
fn or_check(tokens: &[Token], _first: usize, last: usize, node: &Node) -> Verdict {
    let holds = (|| {
        let jump = node.child(1)?.tokens().last().copied()?;
        let lands = if jump.kind == "JUMP_IF_TRUE_OR_POP" {
            let closing = node.children().last()?.token()?;
            origin_is(closing, jump) && jump.jump_target() == Some(closing.offset)
        } else {
            let next = tokens.get(last + 1)?;
            next.is_conditional_jump()
                && tokens
                    .get(last + 2..)?
                    .iter()
                    .take_while(|t| t.is_come_from())
                    .any(|t| origin_is(t, jump))
        };
        if node.child(0)?.tag() != "and" {
            return Some(lands);
        }
        let and_jump = node.child(0)?.child(1)?.tokens().last().copied()?;
        let join = child_token(node, 2)?;
        Some(lands && origin_is(join, and_jump))
    })();
    holds.into()
}

/// No conditional jump of the test may land strictly inside the body.
fn test_jumps_stay_out(tokens: &[Token], first: usize, test: &Node, closing: u32) -> Option<bool> {
    let body_start = tokens.get(test.span().end)?.offset;
    Some(tokens[first..test.span().end].iter().all(|t| {
        !t.is_conditional_jump()
            || t
                .jump_target()
                .is_none_or(|target| target <= body_start || target >= closing)
    }))
}

/// `if not c: raise AssertionError` and `assert c` compile alike; the assert wins.
fn guards_an_assert(tokens: &[Token], test: &Node, jump: &Token) -> Option<bool> {
    Some(jump.kind == "POP_JUMP_IF_TRUE" && tokens.get(test.span().end)?.kind == "LOAD_ASSERT")
}

fn ifstmt_check(tokens: &[Token], first: usize, last: usize, node: &Node) -> Verdict {
    let holds = (|| {
        let test = node.child(0)?;
        let jump = deciding_jump(tokens, test)?;
        let closing = tokens.get(last)?;
        Some(
            origin_is(closing, jump)
                && !guards_an_assert(tokens, test, jump)?
                && test_jumps_stay_out(tokens, first, test, closing.offset)?,
        )
    })();
    holds.into()
}

/// The last statement of a loop body: its test jumps straight back to the loop head, which
/// is the test itself when the `if` opens the body of a `while True`.
fn iflaststmt_check(tokens: &[Token], first: usize, last: usize, node: &Node) -> Verdict {
    let holds = (|| {
        let test = node.child(0)?;
        let jump = deciding_jump(tokens, test)?;
        let end = tokens.get(last)?.offset;
        Some(
            jump.jump_target()? <= tokens.get(first)?.offset
                && test_jumps_stay_out(tokens, first, test, end)?,
        )
    })();
    holds.into()
}

fn ifelsestmt_check(tokens: &[Token], _first: usize, last: usize, node: &Node) -> Verdict {
    let holds = (|| {
        let jump = deciding_jump(tokens, node.child(0)?)?;
        let jump_forward = child_token(node, 2)?;
        let else_join = child_token(node, 3)?;
        let closing = tokens.get(last)?;
        Some(origin_is(else_join, jump) && origin_is(closing, jump_forward))
    })();
    holds.into()
}

/// The back-edge returns to the loop head: the `FOR_ITER` of a for loop, otherwise the
/// first instruction after `SETUP_LOOP`.
fn loop_check(tokens: &[Token], first: usize, _last: usize, node: &Node) -> Verdict {
    let holds = (|| {
        let back = node
            .children()
            .iter()
            .filter_map(|c| c.token())
            .find(|t| t.kind == "JUMP_BACK")?;
        let head = if node.tag() == "forstmt" {
            node.children()
                .iter()
                .filter_map(|c| c.token())
                .find(|t| t.kind == "FOR_ITER")?
                .offset
        } else {
            tokens.get(first + 1)?.offset
        };
        Some(back.jump_target()? == head)
    })();
    holds.into()
}

/// Offsets of the `JUMP_FORWARD`s that end each handler.
fn handler_exits(handlers: &Node) -> Vec<u32> {
    handlers
        .children()
        .iter()
        .flat_map(|h| h.children().iter().filter_map(|c| c.token()))
        .filter(|t| t.kind == "JUMP_FORWARD")
        .map(|t| t.offset)
        .collect()
}

/// A plain try/except: the handlers' exits join after `END_FINALLY`. If only the try body's
/// jump joins there, the code after it is an else clause.
fn try_except_check(_tokens: &[Token], _first: usize, _last: usize, node: &Node) -> Verdict {
    let holds = (|| {
        let exits = handler_exits(node.child(5)?);
        if exits.is_empty() {
            return Some(true);
        }
        let trailing = node.child(7)?.tokens();
        Some(
            trailing
                .iter()
                .any(|t| t.pattern_offset().is_some_and(|o| exits.contains(&o))),
        )
    })();
    holds.into()
}

fn try_except_else_check(_tokens: &[Token], _first: usize, _last: usize, node: &Node) -> Verdict {
    let holds = (|| {
        let handler_start = child_token(node, 4)?.offset;
        let else_join = child_token(node, 7)?;
        Some(else_join.is_come_from() && else_join.pattern_offset()? < handler_start)
    })();
    holds.into()
}
