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


//! The dialect-specific scanner: normalizes every instruction, inserts join-point tokens and
//! records how each arity-suffixed terminal must be parsed.

use arcstr::ArcStr;
use indexmap::IndexMap;
use retrace_bytecode::{ArityFamily, CodeUnit, Operand, Version};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{Display, Formatter};
use tracing::{debug, trace};

use crate::blocks::{BlockMap, detect_blocks};
use crate::errors::ScanError;
use crate::normalize::{NormalizeContext, normalize};
use crate::token::{Token, UnitId};

/// One grammar symbol consumed by an arity-suffixed terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Slot {
    Expr,
    /// A keyword argument: name constant then value.
    Kwarg,
    /// One `STORE_MAP` item of a 2.x dict display.
    KvItem,
    Store,
    /// The tuple of cells captured by a closure.
    Closure,
}

impl Slot {
    pub fn symbol(&self) -> &'static str {
        match self {
            Slot::Expr => "expr",
            Slot::Kwarg => "kwarg",
            Slot::KvItem => "kv",
            Slot::Store => "store",
            Slot::Closure => "load_closure",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Customization {
    pub family: ArityFamily,
    /// The raw operand the terminal was suffixed with.
    pub operand: u32,
    /// Symbols consumed, in stack order.
    pub slots: Vec<Slot>,
}

impl Customization {
    pub fn new(family: ArityFamily, operand: u32) -> Self {
        let n = operand as usize;
        let slots = match family {
            ArityFamily::Call
            | ArityFamily::CallKw
            | ArityFamily::CallMethod
            | ArityFamily::BuildList
            | ArityFamily::BuildTuple
            | ArityFamily::BuildSet
            | ArityFamily::BuildConstKeyMap
            | ArityFamily::BuildString
            | ArityFamily::BuildSlice
            | ArityFamily::RaiseVarargs
            | ArityFamily::MakeFunction => vec![Slot::Expr; n],
            ArityFamily::CallPacked => {
                let positional = (operand & 0xff) as usize;
                let keyword = ((operand >> 8) & 0xff) as usize;
                let mut slots = vec![Slot::Expr; positional];
                slots.extend(std::iter::repeat_n(Slot::Kwarg, keyword));
                slots
            }
            ArityFamily::BuildMap => vec![Slot::Expr; 2 * n],
            ArityFamily::BuildMapSized => vec![Slot::KvItem; n],
            ArityFamily::UnpackSequence => vec![Slot::Store; n],
            ArityFamily::MakeClosure => {
                let mut slots = vec![Slot::Expr; n];
                slots.push(Slot::Closure);
                slots
            }
            ArityFamily::MakeFunctionFlags => {
                // defaults, keyword defaults, annotations, closure
                let mut slots = vec![];
                for bit in [0x1, 0x2, 0x4] {
                    if operand & bit != 0 {
                        slots.push(Slot::Expr);
                    }
                }
                if operand & 0x8 != 0 {
                    slots.push(Slot::Closure);
                }
                slots
            }
        };
        Self {
            family,
            operand,
            slots,
        }
    }

    pub fn count(&self) -> usize {
        self.slots.len()
    }
}

/// Arity-suffixed terminal name to the shape it consumes, in first-seen order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CustomizationTable {
    entries: IndexMap<ArcStr, Customization>,
}

impl CustomizationTable {
    /// Record `terminal` the first time it is seen; later occurrences reuse the entry.
    pub fn record(&mut self, terminal: &ArcStr, family: ArityFamily, operand: u32) {
        self.entries
            .entry(terminal.clone())
            .or_insert_with(|| Customization::new(family, operand));
    }

    pub fn get(&self, terminal: &str) -> Option<&Customization> {
        self.entries.get(terminal)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArcStr, &Customization)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything the grammar engine needs from one code unit.
#[derive(Clone, Debug)]
pub struct ScanOutput {
    pub tokens: Vec<Token>,
    pub customizations: CustomizationTable,
    pub blocks: BlockMap,
}

impl Display for ScanOutput {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for t in &self.tokens {
            writeln!(f, "{t}")?;
        }
        Ok(())
    }
}

pub struct Scanner {
    version: Version,
}

impl Scanner {
    pub fn new(version: Version) -> Self {
        Self { version }
    }

    pub fn scan(
        &self,
        unit: &CodeUnit,
        nested: &HashMap<usize, UnitId>,
    ) -> Result<ScanOutput, ScanError> {
        let ctx = NormalizeContext {
            unit,
            version: self.version,
            opcodes: self.version.opcodes(),
            nested,
        };
        let blocks = detect_blocks(unit, &ctx)?;

        let mut normalized = Vec::with_capacity(unit.instructions.len());
        // join offset -> (origin offset, join kind)
        let mut joins: BTreeMap<u32, Vec<(u32, &'static str)>> = BTreeMap::new();
        for instr in &unit.instructions {
            let token = normalize(instr, &ctx)?;
            if let Some(token) = &token {
                if let Some(target) = token.jump_target() {
                    let is_setup = matches!(ctx.opcode(instr)?.operand, Operand::Setup(_));
                    if !is_setup {
                        if unit.instruction_index(target).is_none() {
                            return Err(ScanError::MalformedJump {
                                offset: instr.offset,
                                target,
                            });
                        }
                        if target > instr.offset {
                            joins
                                .entry(target)
                                .or_default()
                                .push((instr.offset, "COME_FROM"));
                        }
                    }
                }
            }
            normalized.push((instr, token));
        }
        if !blocks.is_well_nested() {
            debug!(unit = %unit.name, "blocks overlap, leaving their nesting to the grammar");
        }

        let mut tokens = Vec::with_capacity(normalized.len() + joins.len() + blocks.blocks().len());
        let mut customizations = CustomizationTable::default();
        for (instr, token) in normalized {
            let mut at = joins.remove(&instr.offset).unwrap_or_default();
            at.extend(
                blocks
                    .ending_at(instr.offset)
                    .map(|b| (b.start_offset, b.come_from_kind())),
            );
            at.sort_by(|a, b| b.0.cmp(&a.0));
            for (origin, kind) in at {
                tokens.push(Token::come_from(kind, instr.offset, origin));
            }
            let Some(token) = token else {
                continue;
            };
            if let Operand::Arity(family) = ctx.opcode(instr)?.operand {
                customizations.record(&token.kind, family, instr.arg.unwrap_or(0));
            }
            tokens.push(token);
        }
        trace!(
            unit = %unit.name,
            tokens = tokens.len(),
            customizations = customizations.len(),
            "scanned"
        );

        Ok(ScanOutput {
            tokens,
            customizations,
            blocks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use retrace_bytecode::{Constant, Instruction};

    fn unit(ops: &[(&str, Option<u32>)], version: Version) -> CodeUnit {
        let table = version.opcodes();
        let mut u = CodeUnit::new("<module>", &version.to_string());
        let mut offset = 0;
        for (name, arg) in ops {
            let code = table.code_of(name).unwrap();
            u.instructions.push(Instruction::new(code, *arg, offset));
            offset += version.encoding().instruction_size(arg.is_some());
        }
        u.consts = vec![Constant::Int(1), Constant::None];
        u.names = vec!["a".into(), "x".into(), "f".into()];
        u
    }

    fn kinds(out: &ScanOutput) -> Vec<String> {
        out.tokens.iter().map(|t| t.kind.to_string()).collect()
    }

    #[test]
    fn inserts_join_points_innermost_first() {
        // if a: while a: x = 1
        let u = unit(
            &[
                ("LOAD_NAME", Some(0)),         // 0
                ("POP_JUMP_IF_FALSE", Some(20)), // 2
                ("SETUP_LOOP", Some(14)),       // 4 -> 20
                ("LOAD_NAME", Some(0)),         // 6
                ("POP_JUMP_IF_FALSE", Some(18)), // 8
                ("LOAD_CONST", Some(0)),        // 10
                ("STORE_NAME", Some(1)),        // 12
                ("JUMP_ABSOLUTE", Some(6)),     // 14
                ("POP_BLOCK", None),            // 16
                ("LOAD_CONST", Some(1)),        // 18
                ("RETURN_VALUE", None),         // 20
            ],
            Version::V3_6,
        );
        let out = Scanner::new(Version::V3_6)
            .scan(&u, &HashMap::new())
            .unwrap();
        let joins: Vec<(String, u32, u32)> = out
            .tokens
            .iter()
            .filter(|t| t.is_come_from())
            .map(|t| (t.kind.to_string(), t.offset, t.pattern_offset().unwrap()))
            .collect();
        assert_eq!(
            joins,
            vec![
                ("COME_FROM".to_string(), 18, 8),
                ("COME_FROM_LOOP".to_string(), 20, 4),
                ("COME_FROM".to_string(), 20, 2),
            ]
        );
        assert!(kinds(&out).contains(&"JUMP_BACK".to_string()));
    }

    #[test]
    fn customization_entries_are_recorded_once() {
        let u = unit(
            &[
                ("LOAD_NAME", Some(2)),
                ("LOAD_CONST", Some(0)),
                ("CALL_FUNCTION", Some(1)),
                ("POP_TOP", None),
                ("LOAD_NAME", Some(2)),
                ("LOAD_CONST", Some(0)),
                ("CALL_FUNCTION", Some(1)),
                ("BUILD_LIST", Some(2)),
                ("RETURN_VALUE", None),
            ],
            Version::V3_6,
        );
        let out = Scanner::new(Version::V3_6)
            .scan(&u, &HashMap::new())
            .unwrap();
        assert_eq!(out.customizations.len(), 2);
        let call = out.customizations.get("CALL_FUNCTION_1").unwrap();
        assert_eq!(call.family, ArityFamily::Call);
        assert_eq!(call.slots, vec![Slot::Expr]);
        assert_eq!(out.customizations.get("BUILD_LIST_2").unwrap().count(), 2);
    }

    #[test]
    fn packed_calls_split_positional_and_keyword() {
        let c = Customization::new(ArityFamily::CallPacked, 2 + 256);
        assert_eq!(c.slots, vec![Slot::Expr, Slot::Expr, Slot::Kwarg]);
        let c = Customization::new(ArityFamily::MakeFunctionFlags, 0x9);
        assert_eq!(c.slots, vec![Slot::Expr, Slot::Closure]);
        let c = Customization::new(ArityFamily::BuildMap, 2);
        assert_eq!(c.count(), 4);
    }

    #[test]
    fn jump_to_nowhere_is_malformed() {
        let u = unit(
            &[("LOAD_NAME", Some(0)), ("POP_JUMP_IF_FALSE", Some(40)), ("RETURN_VALUE", None)],
            Version::V3_6,
        );
        let err = Scanner::new(Version::V3_6)
            .scan(&u, &HashMap::new())
            .unwrap_err();
        assert_eq!(
            err,
            ScanError::MalformedJump {
                offset: 2,
                target: 40
            }
        );
    }

    #[test]
    fn oversized_jump_operand_is_malformed() {
        let u = unit(
            &[("JUMP_FORWARD", Some(u32::MAX - 1)), ("RETURN_VALUE", None)],
            Version::V3_6,
        );
        let err = Scanner::new(Version::V3_6)
            .scan(&u, &HashMap::new())
            .unwrap_err();
        assert!(matches!(err, ScanError::MalformedJump { offset: 0, .. }));
    }

    #[test]
    fn variable_length_encoding_offsets() {
        let u = unit(
            &[
                ("LOAD_NAME", Some(0)),   // 0
                ("POP_JUMP_IF_FALSE", Some(11)), // 3
                ("LOAD_CONST", Some(0)),  // 6
                ("PRINT_ITEM", None),     // 9
                ("PRINT_NEWLINE", None),  // 10
                ("LOAD_CONST", Some(1)),  // 11
                ("RETURN_VALUE", None),   // 14
            ],
            Version::V2_7,
        );
        let out = Scanner::new(Version::V2_7)
            .scan(&u, &HashMap::new())
            .unwrap();
        assert_eq!(
            kinds(&out),
            vec![
                "LOAD_NAME",
                "POP_JUMP_IF_FALSE",
                "LOAD_CONST",
                "PRINT_ITEM",
                "PRINT_NEWLINE",
                "COME_FROM",
                "LOAD_CONST",
                "RETURN_VALUE"
            ]
        );
    }
}
