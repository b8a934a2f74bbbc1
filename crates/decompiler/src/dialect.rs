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


//! A dialect bundles everything that varies by instruction-set version: the opcode table, the
//! scanner and the base grammar. Dialects are built once per process and shared.

use lazy_static::lazy_static;
use retrace_bytecode::Version;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use crate::checks::CheckRegistry;
use crate::errors::GrammarError;
use crate::grammar::{Grammar, add_synthetic_rules, dialect_grammar};
use crate::scanner::{CustomizationTable, Scanner};

#[derive(Debug)]
pub struct Dialect {
    version: Version,
    grammar: Arc<Grammar>,
}

lazy_static! {
    static ref DIALECTS: HashMap<Version, Result<Arc<Dialect>, GrammarError>> = Version::ALL
        .iter()
        .map(|v| (*v, Dialect::build(*v)))
        .collect();
}

impl Dialect {
    fn build(version: Version) -> Result<Arc<Dialect>, GrammarError> {
        let grammar = dialect_grammar(version)?;
        grammar.start()?;
        CheckRegistry::standard().validate(&grammar)?;
        debug!(%version, rules = grammar.rules().len(), "built dialect grammar");
        Ok(Arc::new(Dialect {
            version,
            grammar: Arc::new(grammar),
        }))
    }

    /// The shared dialect for `version`. A defective dialect grammar is reported on every
    /// lookup rather than once.
    pub fn for_version(version: Version) -> Result<Arc<Dialect>, GrammarError> {
        match DIALECTS.get(&version) {
            Some(d) => d.clone(),
            None => Dialect::build(version),
        }
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn scanner(&self) -> Scanner {
        Scanner::new(self.version)
    }

    /// The dialect grammar without any per-unit rules.
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// A private copy of the dialect grammar extended with the synthetic rules for one unit's
    /// customization table. The shared grammar is never mutated.
    pub fn unit_grammar(&self, customizations: &CustomizationTable) -> Grammar {
        let mut grammar = Grammar::clone(&self.grammar);
        let added = add_synthetic_rules(&mut grammar, customizations, self.version);
        debug!(version = %self.version, added, "added synthetic rules");
        grammar
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcstr::ArcStr;
    use retrace_bytecode::ArityFamily;
    use test_case::test_case;

    #[test_case(Version::V2_7)]
    #[test_case(Version::V3_6)]
    #[test_case(Version::V3_7)]
    fn every_dialect_builds(version: Version) {
        let dialect = Dialect::for_version(version).unwrap();
        assert_eq!(dialect.version(), version);
        assert!(dialect.grammar().rules().len() > 50);
    }

    #[test]
    fn dialects_are_shared() {
        let a = Dialect::for_version(Version::V3_6).unwrap();
        let b = Dialect::for_version(Version::V3_6).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn unit_grammar_leaves_dialect_untouched() {
        let dialect = Dialect::for_version(Version::V3_6).unwrap();
        let before = dialect.grammar().rules().len();
        let mut table = CustomizationTable::default();
        table.record(&ArcStr::from("CALL_FUNCTION_2"), ArityFamily::Call, 2);
        let unit = dialect.unit_grammar(&table);
        assert!(unit.rules().len() > before);
        assert_eq!(dialect.grammar().rules().len(), before);
        assert!(unit.symbol("CALL_FUNCTION_2").is_some());
        assert!(dialect.grammar().symbol("CALL_FUNCTION_2").is_none());
    }
}
