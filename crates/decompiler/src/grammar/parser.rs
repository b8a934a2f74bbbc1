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


//! The grammar engine. Recognition is Earley (so every ambiguity of the grammar is
//! tolerated, and nullable symbols are handled with the Aycock-Horspool prediction rule);
//! the tree is then extracted top-down, one (nonterminal, span) at a time, resolving
//! competing reductions with the policy in [`Extraction::resolve`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace};

use super::{Grammar, RuleId, SymbolId};
use crate::ast::Node;
use crate::blocks::BlockMap;
use crate::checks::{CheckRegistry, Verdict};
use crate::errors::{GrammarError, ParseError};
use crate::token::Token;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Item {
    rule: RuleId,
    dot: usize,
    origin: usize,
}

impl Item {
    fn advance(self) -> Self {
        Item {
            dot: self.dot + 1,
            ..self
        }
    }
}

/// What the recognizer learned about the token stream.
struct Chart {
    /// Terminal symbol of each token, if the grammar knows its kind.
    terminals: Vec<Option<SymbolId>>,
    /// Completed nonterminals: (symbol, start) to the sorted ends it was completed at.
    ends: HashMap<(SymbolId, usize), Vec<usize>>,
    /// Completed rules as (rule, start, end).
    rules: HashSet<(RuleId, usize, usize)>,
}

pub struct Parser<'a> {
    grammar: &'a Grammar,
    checks: &'a CheckRegistry,
    max_candidates: usize,
    start: SymbolId,
    nullable: HashSet<SymbolId>,
}

impl<'a> Parser<'a> {
    pub fn new(
        grammar: &'a Grammar,
        checks: &'a CheckRegistry,
        max_candidates: usize,
    ) -> Result<Self, GrammarError> {
        let start = grammar.start()?;
        checks.validate(grammar)?;
        Ok(Self {
            grammar,
            checks,
            max_candidates,
            start,
            nullable: grammar.nullable(),
        })
    }

    /// Parse `tokens` into a single tree spanning all of them. `blocks` are the unit's
    /// control-flow blocks, whose boundaries readings may not straddle.
    pub fn parse(&self, tokens: &[Token], blocks: &BlockMap) -> Result<Arc<Node>, ParseError> {
        debug!(
            tokens = tokens.len(),
            rules = self.grammar.rules().len(),
            "parsing"
        );
        let chart = self.recognize(tokens)?;
        let mut extraction = Extraction {
            parser: self,
            tokens,
            leaves: tokens
                .iter()
                .enumerate()
                .map(|(i, t)| Arc::new(Node::leaf(i, t.clone())))
                .collect(),
            blocks: block_pairs(tokens, blocks),
            chart,
            memo: HashMap::new(),
            rejected: None,
        };
        match extraction.build(self.start, 0, tokens.len())? {
            Some(Resolved {
                node,
                ambiguity: None,
            }) => Ok(node),
            Some(Resolved {
                ambiguity: Some(e), ..
            }) => Err(e),
            None => Err(match extraction.rejected {
                Some((sym, i, j)) => {
                    let (first_offset, last_offset) = span_offsets(tokens, i, j);
                    ParseError::Rejected {
                        nonterminal: self.grammar.name(sym).to_string(),
                        first_offset,
                        last_offset,
                    }
                }
                None => no_parse(tokens, 0),
            }),
        }
    }

    fn recognize(&self, tokens: &[Token]) -> Result<Chart, ParseError> {
        let g = self.grammar;
        let n = tokens.len();
        let terminals: Vec<Option<SymbolId>> = tokens
            .iter()
            .map(|t| g.symbol(&t.kind).filter(|s| !g.is_nonterminal(*s)))
            .collect();

        let mut sets: Vec<Vec<Item>> = vec![vec![]; n + 1];
        let mut seen: Vec<HashSet<Item>> = vec![HashSet::new(); n + 1];
        let mut ends: HashMap<(SymbolId, usize), Vec<usize>> = HashMap::new();
        let mut rules = HashSet::new();

        for &rule in g.rules_for(self.start) {
            push(&mut sets, &mut seen, 0, Item { rule, dot: 0, origin: 0 });
        }

        let mut reached = 0;
        for i in 0..=n {
            if sets[i].is_empty() {
                break;
            }
            reached = i;
            let mut k = 0;
            while k < sets[i].len() {
                let item = sets[i][k];
                k += 1;
                let rule = g.rule(item.rule);
                match rule.rhs.get(item.dot) {
                    Some(&next) if g.is_nonterminal(next) => {
                        for &r in g.rules_for(next) {
                            push(&mut sets, &mut seen, i, Item { rule: r, dot: 0, origin: i });
                        }
                        if self.nullable.contains(&next) {
                            push(&mut sets, &mut seen, i, item.advance());
                        }
                    }
                    Some(&next) => {
                        if i < n && terminals[i] == Some(next) {
                            push(&mut sets, &mut seen, i + 1, item.advance());
                        }
                    }
                    None => {
                        if rules.insert((item.rule, item.origin, i)) {
                            let at = ends.entry((rule.lhs, item.origin)).or_default();
                            if !at.contains(&i) {
                                at.push(i);
                            }
                        }
                        let waiting: Vec<Item> = sets[item.origin]
                            .iter()
                            .filter(|w| g.rule(w.rule).rhs.get(w.dot) == Some(&rule.lhs))
                            .map(|w| w.advance())
                            .collect();
                        for w in waiting {
                            push(&mut sets, &mut seen, i, w);
                        }
                    }
                }
            }
        }

        let accepted = rules.iter().any(|(r, from, to)| {
            *from == 0 && *to == n && g.rule(*r).lhs == self.start
        });
        if !accepted {
            // Either token `reached` could not be shifted, or the input ended early.
            return Err(no_parse(tokens, reached.min(n.saturating_sub(1))));
        }
        for v in ends.values_mut() {
            v.sort_unstable();
        }
        Ok(Chart {
            terminals,
            ends,
            rules,
        })
    }
}

fn push(sets: &mut [Vec<Item>], seen: &mut [HashSet<Item>], i: usize, item: Item) {
    if seen[i].insert(item) {
        sets[i].push(item);
    }
}

fn no_parse(tokens: &[Token], index: usize) -> ParseError {
    match tokens.get(index) {
        Some(t) => ParseError::NoParse {
            index,
            offset: t.offset,
            kind: t.kind.to_string(),
        },
        None => ParseError::NoParse {
            index,
            offset: 0,
            kind: "<end>".to_string(),
        },
    }
}

fn span_offsets(tokens: &[Token], i: usize, j: usize) -> (u32, u32) {
    let first = tokens.get(i).map(|t| t.offset).unwrap_or_default();
    let last = match j.checked_sub(1).and_then(|l| tokens.get(l)) {
        Some(t) if j > i => t.offset,
        _ => first,
    };
    (first, last)
}

/// Token indices of each block's `SETUP_*` and of the join point that closes it.
fn block_pairs(tokens: &[Token], blocks: &BlockMap) -> Vec<(usize, usize)> {
    blocks
        .blocks()
        .iter()
        .filter_map(|b| {
            let open = tokens
                .iter()
                .position(|t| t.offset == b.start_offset && !t.is_come_from())?;
            let close = tokens.iter().position(|t| {
                t.offset == b.end_offset
                    && t.kind == b.come_from_kind()
                    && t.pattern_offset() == Some(b.start_offset)
            })?;
            Some((open, close))
        })
        .collect()
}

/// The reading chosen for one span. `ambiguity` records a span at or below this one where
/// more than one reading survived; it is only an error if this reading is kept.
#[derive(Clone)]
struct Resolved {
    node: Arc<Node>,
    ambiguity: Option<ParseError>,
}

enum Memo {
    InProgress,
    Done(Option<Resolved>),
}

struct Extraction<'p, 't> {
    parser: &'p Parser<'p>,
    tokens: &'t [Token],
    leaves: Vec<Arc<Node>>,
    blocks: Vec<(usize, usize)>,
    chart: Chart,
    memo: HashMap<(SymbolId, usize, usize), Memo>,
    /// Widest span whose every derivation a reduce check rejected.
    rejected: Option<(SymbolId, usize, usize)>,
}

impl Extraction<'_, '_> {
    /// The single tree for `sym` over tokens `i..j`, `None` if no derivation survives.
    fn build(&mut self, sym: SymbolId, i: usize, j: usize) -> Result<Option<Resolved>, ParseError> {
        match self.memo.get(&(sym, i, j)) {
            Some(Memo::Done(node)) => return Ok(node.clone()),
            // A derivation that needs itself over the same span adds nothing new.
            Some(Memo::InProgress) => return Ok(None),
            None => {}
        }
        self.memo.insert((sym, i, j), Memo::InProgress);
        let node = self.resolve(sym, i, j)?;
        self.memo.insert((sym, i, j), Memo::Done(node.clone()));
        Ok(node)
    }

    /// Resolution order for competing reductions of one span:
    /// 1. a reduce check registered for the nonterminal filters every candidate;
    /// 2. a specific rule beats one that only wraps a `%generic` nonterminal;
    /// 3. candidates whose children straddle a block boundary are dropped.
    ///
    /// Anything still ambiguous is an error once the reading is kept; it is never resolved
    /// by rule order.
    fn resolve(&mut self, sym: SymbolId, i: usize, j: usize) -> Result<Option<Resolved>, ParseError> {
        let g = self.parser.grammar;
        let mut splits = vec![];
        for &rule in g.rules_for(sym) {
            if self.chart.rules.contains(&(rule, i, j)) {
                let mut bounds = vec![i];
                self.splits(sym, rule, 0, j, &mut bounds, &mut splits)?;
            }
        }

        let mut candidates: Vec<(RuleId, Resolved)> = vec![];
        for (rule, bounds) in splits {
            if let Some(node) = self.candidate(sym, rule, &bounds)? {
                candidates.push((rule, node));
            }
        }
        if candidates.is_empty() {
            return Ok(None);
        }

        let check = match g.is_checked(sym) {
            true if i < j => self.parser.checks.get(g.name(sym)),
            _ => None,
        };
        if let Some(check) = check {
            let tokens = self.tokens;
            candidates.retain(|(rule, r)| {
                let verdict = check(tokens, i, j - 1, &r.node);
                if verdict == Verdict::Reject {
                    trace!(rule = %g.rule_text(*rule), first = i, last = j - 1, "reduce check rejected");
                }
                verdict == Verdict::Accept
            });
            if candidates.is_empty() {
                if self.rejected.is_none_or(|(_, a, b)| b - a <= j - i) {
                    self.rejected = Some((sym, i, j));
                }
                return Ok(None);
            }
        }

        if candidates.len() > 1 && candidates.iter().any(|(r, _)| !g.is_generic_rule(*r)) {
            candidates.retain(|(r, _)| !g.is_generic_rule(*r));
        }

        if candidates.len() > 1 {
            let nested: Vec<(RuleId, Resolved)> = candidates
                .iter()
                .filter(|(_, r)| !self.straddles_block(&r.node))
                .cloned()
                .collect();
            if !nested.is_empty() {
                candidates = nested;
            }
        }

        let ambiguity = (candidates.len() > 1).then(|| {
            let (first_offset, last_offset) = span_offsets(self.tokens, i, j);
            ParseError::Ambiguous {
                nonterminal: g.name(sym).to_string(),
                candidates: candidates.iter().map(|(r, _)| g.rule_text(*r)).collect(),
                first_offset,
                last_offset,
            }
        });
        Ok(candidates.into_iter().next().map(|(_, mut chosen)| {
            if ambiguity.is_some() {
                chosen.ambiguity = ambiguity;
            }
            chosen
        }))
    }

    /// Enumerate every way `rule`'s right-hand side, from position `k` on, tiles `bounds.last()..j`.
    fn splits(
        &self,
        sym: SymbolId,
        rule: RuleId,
        k: usize,
        j: usize,
        bounds: &mut Vec<usize>,
        out: &mut Vec<(RuleId, Vec<usize>)>,
    ) -> Result<(), ParseError> {
        let g = self.parser.grammar;
        let rhs = &g.rule(rule).rhs;
        let at = bounds[bounds.len() - 1];
        let Some(&next) = rhs.get(k) else {
            if at == j {
                if out.len() >= self.parser.max_candidates {
                    let (first_offset, last_offset) = span_offsets(self.tokens, bounds[0], j);
                    return Err(ParseError::Ambiguous {
                        nonterminal: g.name(sym).to_string(),
                        candidates: vec![format!(
                            "more than {} derivations",
                            self.parser.max_candidates
                        )],
                        first_offset,
                        last_offset,
                    });
                }
                out.push((rule, bounds.clone()));
            }
            return Ok(());
        };
        if g.is_nonterminal(next) {
            let Some(ends) = self.chart.ends.get(&(next, at)) else {
                return Ok(());
            };
            for &end in ends.iter().filter(|e| **e <= j) {
                bounds.push(end);
                self.splits(sym, rule, k + 1, j, bounds, out)?;
                bounds.pop();
            }
        } else if at < j && self.chart.terminals[at] == Some(next) {
            bounds.push(at + 1);
            self.splits(sym, rule, k + 1, j, bounds, out)?;
            bounds.pop();
        }
        Ok(())
    }

    fn candidate(
        &mut self,
        sym: SymbolId,
        rule: RuleId,
        bounds: &[usize],
    ) -> Result<Option<Resolved>, ParseError> {
        let g = self.parser.grammar;
        let rule_def = g.rule(rule);
        let mut children = Vec::with_capacity(rule_def.rhs.len());
        let mut ambiguity = None;
        for (k, &s) in rule_def.rhs.iter().enumerate() {
            let (a, b) = (bounds[k], bounds[k + 1]);
            if !g.is_nonterminal(s) {
                children.push(self.leaves[a].clone());
                continue;
            }
            let Some(child) = self.build(s, a, b)? else {
                return Ok(None);
            };
            if ambiguity.is_none() {
                ambiguity = child.ambiguity;
            }
            if k == 0 && rule_def.is_left_recursive() {
                children.extend(child.node.children().iter().cloned());
            } else {
                children.push(child.node);
            }
        }
        let span = bounds[0]..bounds[bounds.len() - 1];
        Ok(Some(Resolved {
            node: Arc::new(Node::tree(g.name(sym).clone(), span, children)),
            ambiguity,
        }))
    }

    /// True if some reduced child contains a block's opening but not its closing join
    /// point, or the other way round.
    fn straddles_block(&self, node: &Node) -> bool {
        node.children()
            .iter()
            .filter(|c| c.token().is_none())
            .any(|c| {
                let span = c.span();
                self.blocks
                    .iter()
                    .any(|(open, close)| span.contains(open) != span.contains(close))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blocks::ControlFlowBlock;
    use crate::token::Attr;
    use pretty_assertions::assert_eq;
    use retrace_bytecode::BlockKind;

    fn tokens(kinds: &[&str]) -> Vec<Token> {
        kinds
            .iter()
            .enumerate()
            .map(|(i, k)| Token::new(*k, Attr::None, 2 * i as u32))
            .collect()
    }

    fn parse_with(
        text: &str,
        checks: &CheckRegistry,
        kinds: &[&str],
    ) -> Result<Arc<Node>, ParseError> {
        let g = Grammar::from_text(text).unwrap();
        Parser::new(&g, checks, 64)
            .unwrap()
            .parse(&tokens(kinds), &BlockMap::default())
    }

    fn parse(text: &str, kinds: &[&str]) -> Result<Arc<Node>, ParseError> {
        parse_with(text, &CheckRegistry::default(), kinds)
    }

    const STMTS: &str = r#"
        %generic expr_stmt
        unit ::= stmts
        stmts ::= stmt
        stmts ::= stmts stmt
        stmt ::= call_stmt
        stmt ::= expr_stmt
        call_stmt ::= call POP_TOP
        expr_stmt ::= expr POP_TOP
        expr ::= LOAD_NAME
        expr ::= call
        call ::= expr CALL_FUNCTION_0
    "#;

    #[test]
    fn list_rules_are_flattened() {
        let root = parse(STMTS, &["LOAD_NAME", "POP_TOP", "LOAD_NAME", "POP_TOP", "LOAD_NAME", "POP_TOP"]).unwrap();
        let stmts = root.child(0).unwrap();
        assert_eq!(stmts.tag(), "stmts");
        assert_eq!(stmts.children().len(), 3);
        assert!(stmts.children().iter().all(|c| c.tag() == "stmt"));
    }

    #[test]
    fn specific_rules_beat_generic_ones() {
        let root = parse(STMTS, &["LOAD_NAME", "CALL_FUNCTION_0", "POP_TOP"]).unwrap();
        assert!(root.find("call_stmt").is_some());
        assert!(root.find("expr_stmt").is_none());
    }

    #[test]
    fn no_parse_names_the_stuck_token() {
        let err = parse(STMTS, &["LOAD_NAME", "POP_TOP", "BOGUS", "POP_TOP"]).unwrap_err();
        assert_eq!(
            err,
            ParseError::NoParse {
                index: 2,
                offset: 4,
                kind: "BOGUS".into()
            }
        );
        // input that ends too early is reported at its last token
        let err = parse(STMTS, &["LOAD_NAME"]).unwrap_err();
        assert!(matches!(err, ParseError::NoParse { index: 0, .. }));
    }

    #[test]
    fn unresolved_ambiguity_is_an_error() {
        let err = parse("unit ::= a\nunit ::= b\na ::= X\nb ::= X", &["X"]).unwrap_err();
        let ParseError::Ambiguous {
            nonterminal,
            candidates,
            ..
        } = err
        else {
            panic!("expected ambiguity, got {err}");
        };
        assert_eq!(nonterminal, "unit");
        assert_eq!(candidates, vec!["unit ::= a", "unit ::= b"]);
    }

    #[test]
    fn ambiguity_below_a_kept_reading_is_reported_where_it_occurs() {
        let err = parse("unit ::= w Y\nw ::= a\nw ::= b\na ::= X\nb ::= X", &["X", "Y"]).unwrap_err();
        assert!(matches!(err, ParseError::Ambiguous { ref nonterminal, .. } if nonterminal == "w"));
    }

    #[test]
    fn ambiguity_below_a_generic_reading_that_loses_is_harmless() {
        let text = r#"
            %generic w
            unit ::= w
            unit ::= s
            w ::= a
            w ::= b
            a ::= X
            b ::= X
            s ::= X
        "#;
        let root = parse(text, &["X"]).unwrap();
        assert_eq!(root.child(0).map(|c| c.tag()), Some("s"));
    }

    #[test]
    fn ambiguity_below_a_rejected_reading_is_harmless() {
        let mut checks = CheckRegistry::default();
        checks.register("p", |_, _, _, _| Verdict::Reject);
        let text = r#"
            %check p
            unit ::= p
            unit ::= q
            p ::= w Y
            w ::= a
            w ::= b
            a ::= X
            b ::= X
            q ::= X Y
        "#;
        let root = parse_with(text, &checks, &["X", "Y"]).unwrap();
        assert_eq!(root.child(0).map(|c| c.tag()), Some("q"));
    }

    #[test]
    fn reduce_checks_pick_between_readings() {
        let mut checks = CheckRegistry::default();
        checks.register("b", |_, _, _, _| Verdict::Reject);
        let text = "%check b\nunit ::= a\nunit ::= b\na ::= X\nb ::= X";
        let root = parse_with(text, &checks, &["X"]).unwrap();
        assert_eq!(root.child(0).map(|c| c.tag()), Some("a"));

        let err = parse_with("%check b\nunit ::= b\nb ::= X", &checks, &["X"]).unwrap_err();
        assert!(matches!(err, ParseError::Rejected { ref nonterminal, .. } if nonterminal == "b"));
    }

    #[test]
    fn unknown_checks_fail_grammar_construction() {
        let g = Grammar::from_text("%check b\nunit ::= b\nb ::= X").unwrap();
        let err = Parser::new(&g, &CheckRegistry::default(), 64).err();
        assert_eq!(err, Some(GrammarError::UnknownPredicate("b".into())));
    }

    #[test]
    fn readings_that_straddle_a_block_lose() {
        let text = r#"
            unit ::= p q
            unit ::= A r
            p ::= A SETUP_LOOP
            q ::= X COME_FROM_LOOP
            r ::= SETUP_LOOP X COME_FROM_LOOP
        "#;
        let g = Grammar::from_text(text).unwrap();
        let toks = vec![
            Token::new("A", Attr::None, 0),
            Token::new("SETUP_LOOP", Attr::Offset(6), 2),
            Token::new("X", Attr::None, 4),
            Token::come_from("COME_FROM_LOOP", 6, 2),
        ];
        let checks = CheckRegistry::default();
        let parser = Parser::new(&g, &checks, 64).unwrap();
        let blocks: BlockMap = [ControlFlowBlock {
            kind: BlockKind::Loop,
            start_offset: 2,
            end_offset: 6,
        }]
        .into_iter()
        .collect();
        let root = parser.parse(&toks, &blocks).unwrap();
        let tags: Vec<&str> = root.children().iter().map(|c| c.tag()).collect();
        assert_eq!(tags, vec!["A", "r"]);

        // Without a detected block both readings stand.
        let err = parser.parse(&toks, &BlockMap::default()).unwrap_err();
        assert!(matches!(err, ParseError::Ambiguous { ref nonterminal, .. } if nonterminal == "unit"));
    }

    #[test]
    fn nullable_symbols_produce_empty_nodes() {
        let text = "unit ::= X opt Y\nopt ::=\nopt ::= Z";
        let root = parse(text, &["X", "Y"]).unwrap();
        let opt = root.child(1).unwrap();
        assert_eq!(opt.tag(), "opt");
        assert_eq!(opt.span(), 1..1);
        assert!(opt.children().is_empty());
    }

    #[test]
    fn derivation_explosion_is_bounded() {
        let g = Grammar::from_text("unit ::= xs\nxs ::= xs xs\nxs ::= X").unwrap();
        let err = Parser::new(&g, &CheckRegistry::default(), 2)
            .unwrap()
            .parse(&tokens(&["X", "X", "X", "X", "X", "X"]), &BlockMap::default())
            .unwrap_err();
        assert!(matches!(err, ParseError::Ambiguous { .. }));
    }
}
