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


//! Grammars as data. A grammar is a set of BNF-style rules written as text, one per line:
//!
//! ```text
//! # comment
//! %generic expr_stmt
//! %check ifstmt
//! ifstmt ::= testexpr suite COME_FROM
//! suite_opt ::=
//! -stmt ::= print_stmt
//! ```
//!
//! A symbol is a nonterminal iff it appears on some left-hand side. Lines prefixed with `-`
//! remove a rule, which is how dialect diffs are layered on a base grammar.

mod dialects;
mod parser;
mod synthetic;

pub use dialects::{base_grammar, dialect_grammar};
pub use parser::Parser;
pub use synthetic::add_synthetic_rules;

use arcstr::ArcStr;
use std::collections::{HashMap, HashSet};
use std::fmt::{Display, Formatter};

use crate::errors::GrammarError;

pub const START_SYMBOL: &str = "unit";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(u32);

pub type RuleId = usize;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Rule {
    pub lhs: SymbolId,
    pub rhs: Vec<SymbolId>,
}

impl Rule {
    /// `x ::= x y ...`: list rules whose nodes are flattened into their parent.
    pub fn is_left_recursive(&self) -> bool {
        self.rhs.first() == Some(&self.lhs)
    }
}

#[derive(Clone, Debug)]
pub struct Grammar {
    symbols: Vec<ArcStr>,
    ids: HashMap<ArcStr, SymbolId>,
    rules: Vec<Rule>,
    by_lhs: HashMap<SymbolId, Vec<RuleId>>,
    generic: HashSet<SymbolId>,
    checked: HashSet<SymbolId>,
}

impl Default for Grammar {
    fn default() -> Self {
        Self::new()
    }
}

impl Grammar {
    pub fn new() -> Self {
        Self {
            symbols: vec![],
            ids: HashMap::new(),
            rules: vec![],
            by_lhs: HashMap::new(),
            generic: HashSet::new(),
            checked: HashSet::new(),
        }
    }

    pub fn from_text(text: &str) -> Result<Self, GrammarError> {
        let mut g = Self::new();
        g.apply(text)?;
        Ok(g)
    }

    /// A copy of this grammar with `diff` applied on top.
    pub fn merged(&self, diff: &str) -> Result<Self, GrammarError> {
        let mut g = self.clone();
        g.apply(diff)?;
        Ok(g)
    }

    /// Apply rule text (additions, `-` removals and directives) to this grammar.
    pub fn apply(&mut self, text: &str) -> Result<(), GrammarError> {
        for (n, raw) in text.lines().enumerate() {
            let line_no = n + 1;
            let line = match raw.find('#') {
                Some(i) => &raw[..i],
                None => raw,
            }
            .trim();
            if line.is_empty() {
                continue;
            }
            if let Some(directive) = line.strip_prefix('%') {
                let mut words = directive.split_whitespace();
                let kind = words.next().unwrap_or_default();
                let names: Vec<&str> = words.collect();
                if names.is_empty() {
                    return Err(syntax(line_no, format!("%{kind} needs at least one name")));
                }
                for name in names {
                    check_symbol(line_no, name)?;
                    let id = self.intern(name);
                    match kind {
                        "generic" => self.generic.insert(id),
                        "check" => self.checked.insert(id),
                        other => return Err(syntax(line_no, format!("unknown directive %{other}"))),
                    };
                }
                continue;
            }
            let (remove, line) = match line.strip_prefix('-') {
                Some(rest) => (true, rest.trim_start()),
                None => (false, line),
            };
            let Some((lhs, rhs)) = line.split_once("::=") else {
                return Err(syntax(line_no, format!("expected `lhs ::= rhs`, got `{line}`")));
            };
            let lhs = lhs.trim();
            if lhs.is_empty() || lhs.contains(char::is_whitespace) {
                return Err(syntax(line_no, format!("bad left-hand side `{lhs}`")));
            }
            check_symbol(line_no, lhs)?;
            let rhs: Vec<&str> = rhs.split_whitespace().collect();
            for s in &rhs {
                check_symbol(line_no, s)?;
            }
            if remove {
                if !self.remove_rule(lhs, &rhs) {
                    return Err(syntax(line_no, format!("no rule `{line}` to remove")));
                }
            } else {
                self.add_rule(lhs, &rhs);
            }
        }
        Ok(())
    }

    pub fn intern(&mut self, name: &str) -> SymbolId {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        let name = ArcStr::from(name);
        self.symbols.push(name.clone());
        self.ids.insert(name, id);
        id
    }

    /// Add `lhs ::= rhs`. Returns false if the rule was already present.
    pub fn add_rule(&mut self, lhs: &str, rhs: &[&str]) -> bool {
        let rule = Rule {
            lhs: self.intern(lhs),
            rhs: rhs.iter().map(|s| self.intern(s)).collect(),
        };
        if self.rules.contains(&rule) {
            return false;
        }
        self.by_lhs
            .entry(rule.lhs)
            .or_default()
            .push(self.rules.len());
        self.rules.push(rule);
        true
    }

    pub fn remove_rule(&mut self, lhs: &str, rhs: &[&str]) -> bool {
        let (Some(lhs), Some(rhs)) = (
            self.symbol(lhs),
            rhs.iter()
                .map(|s| self.symbol(s))
                .collect::<Option<Vec<_>>>(),
        ) else {
            return false;
        };
        let before = self.rules.len();
        self.rules.retain(|r| !(r.lhs == lhs && r.rhs == rhs));
        if self.rules.len() == before {
            return false;
        }
        self.by_lhs.clear();
        for (id, r) in self.rules.iter().enumerate() {
            self.by_lhs.entry(r.lhs).or_default().push(id);
        }
        true
    }

    pub fn symbol(&self, name: &str) -> Option<SymbolId> {
        self.ids.get(name).copied()
    }

    pub fn name(&self, id: SymbolId) -> &ArcStr {
        &self.symbols[id.0 as usize]
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rule(&self, id: RuleId) -> &Rule {
        &self.rules[id]
    }

    pub fn rules_for(&self, lhs: SymbolId) -> &[RuleId] {
        self.by_lhs.get(&lhs).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn is_nonterminal(&self, id: SymbolId) -> bool {
        !self.rules_for(id).is_empty()
    }

    pub fn is_generic(&self, id: SymbolId) -> bool {
        self.generic.contains(&id)
    }

    pub fn is_checked(&self, id: SymbolId) -> bool {
        self.checked.contains(&id)
    }

    /// Names of every predicate-guarded nonterminal, sorted.
    pub fn checked_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.checked.iter().map(|id| self.name(*id).as_str()).collect();
        names.sort_unstable();
        names
    }

    /// A rule is generic when it merely wraps a single catch-all nonterminal.
    pub fn is_generic_rule(&self, id: RuleId) -> bool {
        let rule = &self.rules[id];
        self.is_generic(rule.lhs) || matches!(rule.rhs.as_slice(), [only] if self.is_generic(*only))
    }

    pub fn start(&self) -> Result<SymbolId, GrammarError> {
        self.symbol(START_SYMBOL)
            .filter(|id| self.is_nonterminal(*id))
            .ok_or_else(|| GrammarError::NoStartSymbol(START_SYMBOL.to_string()))
    }

    /// Symbols that derive the empty string.
    pub fn nullable(&self) -> HashSet<SymbolId> {
        let mut nullable = HashSet::new();
        loop {
            let mut changed = false;
            for rule in &self.rules {
                if !nullable.contains(&rule.lhs) && rule.rhs.iter().all(|s| nullable.contains(s)) {
                    nullable.insert(rule.lhs);
                    changed = true;
                }
            }
            if !changed {
                return nullable;
            }
        }
    }

    pub fn rule_text(&self, id: RuleId) -> String {
        let rule = &self.rules[id];
        let mut s = format!("{} ::=", self.name(rule.lhs));
        for sym in &rule.rhs {
            s.push(' ');
            s.push_str(self.name(*sym));
        }
        s
    }
}

impl Display for Grammar {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut generic: Vec<&str> = self.generic.iter().map(|id| self.name(*id).as_str()).collect();
        generic.sort_unstable();
        for name in generic {
            writeln!(f, "%generic {name}")?;
        }
        for name in self.checked_names() {
            writeln!(f, "%check {name}")?;
        }
        for id in 0..self.rules.len() {
            writeln!(f, "{}", self.rule_text(id))?;
        }
        Ok(())
    }
}

fn syntax(line: usize, message: String) -> GrammarError {
    GrammarError::Syntax { line, message }
}

fn check_symbol(line: usize, name: &str) -> Result<(), GrammarError> {
    if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '+') {
        Ok(())
    } else {
        Err(syntax(line, format!("bad symbol `{name}`")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const TOY: &str = r#"
        %generic expr_stmt
        %check ifstmt
        unit ::= stmts
        stmts ::= stmt
        stmts ::= stmts stmt   # left recursive
        stmt ::= expr_stmt
        expr_stmt ::= expr POP_TOP
        suite_opt ::=
        suite_opt ::= stmts
        expr ::= LOAD_NAME
    "#;

    #[test]
    fn parses_rules_and_directives() {
        let g = Grammar::from_text(TOY).unwrap();
        assert_eq!(g.rules().len(), 8);
        let stmts = g.symbol("stmts").unwrap();
        assert!(g.is_nonterminal(stmts));
        assert!(!g.is_nonterminal(g.symbol("POP_TOP").unwrap()));
        assert!(g.rule(2).is_left_recursive());
        assert_eq!(g.checked_names(), vec!["ifstmt"]);
        // `stmt ::= expr_stmt` wraps the catch-all
        assert!(g.is_generic_rule(3));
        assert!(!g.is_generic_rule(0));
        assert_eq!(g.rule_text(5), "suite_opt ::=");
    }

    #[test]
    fn nullable_symbols() {
        let g = Grammar::from_text(TOY).unwrap();
        let nullable = g.nullable();
        assert!(nullable.contains(&g.symbol("suite_opt").unwrap()));
        assert!(!nullable.contains(&g.symbol("stmts").unwrap()));
    }

    #[test]
    fn diffs_add_and_remove() {
        let base = Grammar::from_text(TOY).unwrap();
        let g = base
            .merged("-expr ::= LOAD_NAME\nexpr ::= LOAD_FAST\nexpr ::= LOAD_FAST")
            .unwrap();
        let texts: Vec<String> = (0..g.rules().len()).map(|i| g.rule_text(i)).collect();
        assert!(texts.contains(&"expr ::= LOAD_FAST".to_string()));
        assert!(!texts.contains(&"expr ::= LOAD_NAME".to_string()));
        assert_eq!(g.rules().len(), base.rules().len());
        // the base is untouched
        assert_eq!(base.rule_text(7), "expr ::= LOAD_NAME");
    }

    #[test]
    fn syntax_errors_carry_line_numbers() {
        let err = Grammar::from_text("unit ::= stmts\nstmts stmt").unwrap_err();
        assert!(matches!(err, GrammarError::Syntax { line: 2, .. }));
        let err = Grammar::from_text("unit ::= a-b").unwrap_err();
        assert!(matches!(err, GrammarError::Syntax { line: 1, .. }));
        let err = Grammar::from_text("-unit ::= nothing").unwrap_err();
        assert!(matches!(err, GrammarError::Syntax { line: 1, .. }));
        let err = Grammar::from_text("%frobnicate x").unwrap_err();
        assert!(matches!(err, GrammarError::Syntax { line: 1, .. }));
    }

    #[test]
    fn missing_start_symbol() {
        let g = Grammar::from_text("stmts ::= stmt").unwrap();
        assert_eq!(
            g.start(),
            Err(GrammarError::NoStartSymbol("unit".to_string()))
        );
    }
}
