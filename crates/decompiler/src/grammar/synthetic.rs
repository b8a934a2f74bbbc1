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


//! Rules synthesized from a unit's customization table. Every arity-suffixed terminal the
//! scanner saw becomes one or more concrete rules; nothing is generated for arities that
//! never occur in the unit.

use retrace_bytecode::{ArityFamily, Version};

use super::Grammar;
use crate::scanner::{Customization, CustomizationTable};

/// Extend `grammar` with the rules implied by `table`. Returns the number of rules added.
pub fn add_synthetic_rules(
    grammar: &mut Grammar,
    table: &CustomizationTable,
    version: Version,
) -> usize {
    let mut added = 0;
    for (terminal, custom) in table.iter() {
        for (lhs, rhs) in rules_for(terminal, custom, version) {
            let rhs: Vec<&str> = rhs.iter().map(|s| s.as_str()).collect();
            if grammar.add_rule(lhs, &rhs) {
                added += 1;
            }
        }
    }
    added
}

fn rules_for(
    terminal: &str,
    custom: &Customization,
    version: Version,
) -> Vec<(&'static str, Vec<String>)> {
    let slots: Vec<String> = custom.slots.iter().map(|s| s.symbol().to_string()).collect();
    let with = |prefix: &[&str], suffix: &[&str]| -> Vec<String> {
        prefix
            .iter()
            .map(|s| s.to_string())
            .chain(slots.iter().cloned())
            .chain(suffix.iter().map(|s| s.to_string()))
            .collect()
    };

    match custom.family {
        ArityFamily::Call | ArityFamily::CallPacked => {
            let mut rules = vec![
                ("expr", vec!["call".to_string()]),
                ("call", with(&["expr"], &[terminal])),
            ];
            // Three-operand class construction: builder, body function, name and bases.
            if version.is_py3() && custom.count() >= 2 {
                let mut rhs = vec!["LOAD_BUILD_CLASS".to_string(), "mkfunc".to_string()];
                rhs.extend(slots.iter().skip(1).cloned());
                rhs.push(terminal.to_string());
                rhs.push("store".to_string());
                rules.push(("classdef", rhs));
            }
            rules
        }
        ArityFamily::CallKw => vec![
            ("expr", vec!["call_kw".to_string()]),
            ("call_kw", with(&["expr"], &["LOAD_CONST", terminal])),
            ("call_stmt", vec!["call_kw".to_string(), "POP_TOP".to_string()]),
        ],
        ArityFamily::CallMethod => vec![
            ("expr", vec!["call_method".to_string()]),
            ("call_method", with(&["expr", "LOAD_METHOD"], &[terminal])),
        ],
        ArityFamily::BuildList => vec![
            ("expr", vec!["build_list".to_string()]),
            ("build_list", with(&[], &[terminal])),
        ],
        ArityFamily::BuildTuple => {
            let closure: Vec<String> = std::iter::repeat_n("LOAD_CLOSURE".to_string(), custom.count())
                .chain([terminal.to_string()])
                .collect();
            vec![
                ("expr", vec!["build_tuple".to_string()]),
                ("build_tuple", with(&[], &[terminal])),
                ("load_closure", closure),
            ]
        }
        ArityFamily::BuildSet => vec![
            ("expr", vec!["build_set".to_string()]),
            ("build_set", with(&[], &[terminal])),
        ],
        ArityFamily::BuildMap => vec![
            ("expr", vec!["dict".to_string()]),
            ("dict", with(&[], &[terminal])),
        ],
        ArityFamily::BuildConstKeyMap => vec![
            ("expr", vec!["dict".to_string()]),
            ("dict", with(&[], &["LOAD_CONST", terminal])),
        ],
        ArityFamily::BuildMapSized => {
            let mut rhs = vec![terminal.to_string()];
            rhs.extend(slots.iter().cloned());
            vec![("expr", vec!["dict".to_string()]), ("dict", rhs)]
        }
        ArityFamily::BuildString => vec![
            ("expr", vec!["joined_str".to_string()]),
            ("joined_str", with(&[], &[terminal])),
        ],
        ArityFamily::BuildSlice => vec![
            ("expr", vec!["slice".to_string()]),
            ("slice", with(&[], &[terminal])),
        ],
        ArityFamily::UnpackSequence => {
            let mut rhs = vec![terminal.to_string()];
            rhs.extend(slots.iter().cloned());
            vec![("unpack", rhs)]
        }
        ArityFamily::RaiseVarargs => vec![("raise_stmt", with(&[], &[terminal]))],
        ArityFamily::MakeFunction | ArityFamily::MakeClosure => vec![
            ("expr", vec!["lambda".to_string()]),
            ("mkfunc", with(&[], &["LOAD_CODE", terminal])),
            ("lambda", with(&[], &["LOAD_LAMBDA", terminal])),
        ],
        ArityFamily::MakeFunctionFlags => vec![
            ("expr", vec!["lambda".to_string()]),
            ("mkfunc", with(&[], &["LOAD_CODE", "LOAD_STR", terminal])),
            ("lambda", with(&[], &["LOAD_LAMBDA", "LOAD_STR", terminal])),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arcstr::ArcStr;
    use pretty_assertions::assert_eq;

    fn rules(version: Version, entries: &[(&str, ArityFamily, u32)]) -> Vec<String> {
        let mut table = CustomizationTable::default();
        for (terminal, family, operand) in entries {
            table.record(&ArcStr::from(*terminal), *family, *operand);
        }
        let mut g = Grammar::new();
        add_synthetic_rules(&mut g, &table, version);
        (0..g.rules().len()).map(|i| g.rule_text(i)).collect()
    }

    #[test]
    fn calls_consume_callable_and_arguments() {
        let r = rules(Version::V3_6, &[("CALL_FUNCTION_2", ArityFamily::Call, 2)]);
        assert!(r.contains(&"call ::= expr expr expr CALL_FUNCTION_2".to_string()));
        assert!(r.contains(&"expr ::= call".to_string()));
        assert!(r.contains(
            &"classdef ::= LOAD_BUILD_CLASS mkfunc expr CALL_FUNCTION_2 store".to_string()
        ));
    }

    #[test]
    fn packed_calls_take_keyword_pairs() {
        let r = rules(Version::V2_7, &[("CALL_FUNCTION_257", ArityFamily::CallPacked, 257)]);
        assert_eq!(
            r,
            vec![
                "expr ::= call".to_string(),
                "call ::= expr expr kwarg CALL_FUNCTION_257".to_string()
            ]
        );
    }

    #[test]
    fn function_flags_select_operands() {
        let r = rules(Version::V3_6, &[("MAKE_FUNCTION_9", ArityFamily::MakeFunctionFlags, 9)]);
        assert!(r.contains(&"mkfunc ::= expr load_closure LOAD_CODE LOAD_STR MAKE_FUNCTION_9".to_string()));
        assert!(r.contains(&"lambda ::= expr load_closure LOAD_LAMBDA LOAD_STR MAKE_FUNCTION_9".to_string()));
    }

    #[test]
    fn shared_wrappers_are_added_once() {
        let mut table = CustomizationTable::default();
        table.record(&ArcStr::from("CALL_FUNCTION_0"), ArityFamily::Call, 0);
        table.record(&ArcStr::from("CALL_FUNCTION_1"), ArityFamily::Call, 1);
        table.record(&ArcStr::from("UNPACK_SEQUENCE_2"), ArityFamily::UnpackSequence, 2);
        let mut g = Grammar::new();
        let added = add_synthetic_rules(&mut g, &table, Version::V3_6);
        // expr ::= call, two call rules, one unpack rule
        assert_eq!(added, 4);
        assert_eq!(g.rule_text(3), "unpack ::= UNPACK_SEQUENCE_2 store store");
    }
}
