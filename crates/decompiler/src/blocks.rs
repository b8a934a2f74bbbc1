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


//! Control-flow block detection. Every `SETUP_*` instruction opens a block that ends at its
//! static jump target. Blocks are paired by offset alone; nesting is left to the grammar.

use retrace_bytecode::{BlockKind, CodeUnit};
use std::collections::BTreeMap;

use crate::errors::ScanError;
use crate::normalize::{NormalizeContext, jump_target};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ControlFlowBlock {
    pub kind: BlockKind,
    pub start_offset: u32,
    pub end_offset: u32,
}

impl ControlFlowBlock {
    /// The join-point terminal emitted where this block ends.
    pub fn come_from_kind(&self) -> &'static str {
        match self.kind {
            BlockKind::Loop => "COME_FROM_LOOP",
            BlockKind::ExceptionGuard => "COME_FROM_EXCEPT",
            BlockKind::Cleanup => "COME_FROM_FINALLY",
            BlockKind::ContextManager => "COME_FROM_WITH",
        }
    }

    /// Disjoint or nested, never partially overlapping.
    pub fn nests_with(&self, other: &ControlFlowBlock) -> bool {
        let disjoint =
            self.end_offset <= other.start_offset || other.end_offset <= self.start_offset;
        let self_inside = other.start_offset <= self.start_offset
            && self.end_offset <= other.end_offset;
        let other_inside = self.start_offset <= other.start_offset
            && other.end_offset <= self.end_offset;
        disjoint || self_inside || other_inside
    }
}

/// Offset-indexed view of the blocks of one code unit.
#[derive(Clone, Debug, Default)]
pub struct BlockMap {
    blocks: Vec<ControlFlowBlock>,
    ends: BTreeMap<u32, Vec<usize>>,
}

impl BlockMap {
    pub fn blocks(&self) -> &[ControlFlowBlock] {
        &self.blocks
    }

    /// Blocks ending at `offset`, innermost (latest opened) first.
    pub fn ending_at(&self, offset: u32) -> impl Iterator<Item = &ControlFlowBlock> {
        self.ends
            .get(&offset)
            .into_iter()
            .flat_map(|ids| ids.iter().rev().map(|&i| &self.blocks[i]))
    }

    pub fn is_well_nested(&self) -> bool {
        self.blocks.iter().enumerate().all(|(i, a)| {
            self.blocks[i + 1..].iter().all(|b| a.nests_with(b))
        })
    }
}

impl FromIterator<ControlFlowBlock> for BlockMap {
    fn from_iter<I: IntoIterator<Item = ControlFlowBlock>>(iter: I) -> Self {
        let mut map = BlockMap::default();
        for block in iter {
            map.ends
                .entry(block.end_offset)
                .or_default()
                .push(map.blocks.len());
            map.blocks.push(block);
        }
        map
    }
}

/// Single linear scan over the raw instructions of `unit`.
pub fn detect_blocks(unit: &CodeUnit, ctx: &NormalizeContext) -> Result<BlockMap, ScanError> {
    let mut blocks = vec![];
    for instr in &unit.instructions {
        let info = ctx.opcode(instr)?;
        let Some(kind) = info.block_kind() else {
            continue;
        };
        let end = match jump_target(info, instr, ctx.encoding()) {
            Ok(end) => end.unwrap_or(instr.offset),
            Err(ScanError::MalformedJump { target, .. }) => target,
            Err(e) => return Err(e),
        };
        if end <= instr.offset || unit.instruction_index(end).is_none() {
            return Err(ScanError::MalformedBlock {
                kind,
                offset: instr.offset,
                end,
            });
        }
        blocks.push(ControlFlowBlock {
            kind,
            start_offset: instr.offset,
            end_offset: end,
        });
    }
    Ok(blocks.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::UnitId;
    use proptest::prelude::*;
    use retrace_bytecode::{Instruction, Version};
    use std::collections::HashMap;

    const SETUP_LOOP: u8 = 120;
    const SETUP_EXCEPT: u8 = 121;
    const POP_TOP: u8 = 1;

    fn run(instructions: Vec<Instruction>) -> Result<BlockMap, ScanError> {
        let mut unit = CodeUnit::new("<module>", "3.6");
        unit.instructions = instructions;
        let nested: HashMap<usize, UnitId> = HashMap::new();
        let ctx = NormalizeContext {
            unit: &unit,
            version: Version::V3_6,
            opcodes: Version::V3_6.opcodes(),
            nested: &nested,
        };
        detect_blocks(&unit, &ctx)
    }

    fn body(from: u32, to: u32) -> impl Iterator<Item = Instruction> {
        (from..to).step_by(2).map(|o| Instruction::new(POP_TOP, None, o))
    }

    #[test]
    fn records_start_and_end() {
        let mut code = vec![Instruction::new(SETUP_LOOP, Some(6), 0)];
        code.extend(body(2, 12));
        let map = run(code).unwrap();
        assert_eq!(
            map.blocks(),
            &[ControlFlowBlock {
                kind: BlockKind::Loop,
                start_offset: 0,
                end_offset: 8
            }]
        );
        assert_eq!(map.ending_at(8).count(), 1);
        assert_eq!(map.ending_at(6).count(), 0);
    }

    #[test]
    fn nested_blocks_end_innermost_first() {
        let mut code = vec![
            Instruction::new(SETUP_LOOP, Some(8), 0),
            Instruction::new(SETUP_EXCEPT, Some(6), 2),
        ];
        code.extend(body(4, 14));
        let map = run(code).unwrap();
        let ending: Vec<_> = map.ending_at(10).map(|b| b.kind).collect();
        assert_eq!(ending, vec![BlockKind::ExceptionGuard, BlockKind::Loop]);
        assert!(map.is_well_nested());
    }

    #[test]
    fn end_off_an_instruction_boundary_is_malformed() {
        let mut code = vec![Instruction::new(SETUP_LOOP, Some(3), 0)];
        code.extend(body(2, 10));
        let err = run(code).unwrap_err();
        assert_eq!(
            err,
            ScanError::MalformedBlock {
                kind: BlockKind::Loop,
                offset: 0,
                end: 5
            }
        );
    }

    #[test]
    fn end_past_the_code_is_malformed() {
        let mut code = vec![Instruction::new(SETUP_EXCEPT, Some(40), 0)];
        code.extend(body(2, 10));
        assert!(matches!(run(code), Err(ScanError::MalformedBlock { .. })));
    }

    #[test]
    fn end_past_the_offset_space_is_malformed() {
        let mut code = vec![Instruction::new(SETUP_LOOP, Some(u32::MAX), 2)];
        code.extend(body(4, 10));
        assert_eq!(
            run(code).unwrap_err(),
            ScanError::MalformedBlock {
                kind: BlockKind::Loop,
                offset: 2,
                end: u32::MAX
            }
        );
    }

    #[test]
    fn partial_overlap_is_detected() {
        let a = ControlFlowBlock {
            kind: BlockKind::Loop,
            start_offset: 0,
            end_offset: 10,
        };
        let b = ControlFlowBlock {
            kind: BlockKind::ExceptionGuard,
            start_offset: 4,
            end_offset: 14,
        };
        assert!(!a.nests_with(&b));
        assert!(a.nests_with(&a));
    }

    /// Generates properly nested SETUP regions the way a compiler would lay them out.
    fn nested_layout() -> impl Strategy<Value = Vec<Instruction>> {
        prop::collection::vec((0u8..3, 0u32..4), 1..8).prop_map(|shape| {
            // Each element opens a block that runs to the end of the generated region, so
            // later blocks sit inside earlier ones.
            let total: u32 = shape.iter().map(|(_, pad)| 1 + pad).sum();
            let mut code = vec![];
            let mut offset = 0;
            let mut remaining = total;
            for (kind, pad) in &shape {
                let opcode = [SETUP_LOOP, SETUP_EXCEPT, 122][*kind as usize];
                let covered = remaining - 1;
                code.push(Instruction::new(opcode, Some(covered * 2), offset));
                offset += 2;
                remaining -= 1;
                for _ in 0..*pad {
                    code.push(Instruction::new(POP_TOP, None, offset));
                    offset += 2;
                    remaining -= 1;
                }
            }
            code.extend(body(offset, offset + 2 * (shape.len() as u32 + 1)));
            code
        })
    }

    proptest! {
        #[test]
        fn detected_blocks_are_ordered_and_nested(code in nested_layout()) {
            let map = run(code).unwrap();
            for b in map.blocks() {
                prop_assert!(b.start_offset < b.end_offset);
            }
            prop_assert!(map.is_well_nested());
        }
    }
}
