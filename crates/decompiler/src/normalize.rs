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


//! Instruction normalization: one decoded instruction in, at most one grammar terminal out.
//! Everything here is a pure function of the instruction, the unit's tables and the dialect's
//! opcode table.

use arcstr::ArcStr;
use retrace_bytecode::{
    COMPARE_OPS, CodeUnit, Constant, Encoding, Instruction, JumpKind, OpcodeInfo, OpcodeTable,
    Operand, Version,
};
use std::collections::HashMap;

use crate::errors::ScanError;
use crate::token::{Attr, Token, UnitId};

/// Everything the normalizer may consult besides the instruction itself.
pub struct NormalizeContext<'a> {
    pub unit: &'a CodeUnit,
    pub version: Version,
    pub opcodes: &'a OpcodeTable,
    /// Unit ids of nested code constants, keyed by constant-pool index.
    pub nested: &'a HashMap<usize, UnitId>,
}

impl NormalizeContext<'_> {
    pub fn encoding(&self) -> Encoding {
        self.version.encoding()
    }

    pub fn opcode(&self, instr: &Instruction) -> Result<&OpcodeInfo, ScanError> {
        self.opcodes
            .get(instr.opcode)
            .ok_or(ScanError::UnsupportedOpcode {
                opcode: instr.opcode,
                offset: instr.offset,
                version: self.version,
            })
    }
}

/// Absolute target of a jump or block-opening instruction, or `None` if it isn't one.
/// A relative target past the end of the offset space is a [`ScanError::MalformedJump`].
pub fn jump_target(
    info: &OpcodeInfo,
    instr: &Instruction,
    encoding: Encoding,
) -> Result<Option<u32>, ScanError> {
    let Some(kind) = info.jump_kind() else {
        return Ok(None);
    };
    let arg = require_arg(info, instr)?;
    let target = match kind {
        JumpKind::Relative => instr
            .offset
            .checked_add(encoding.instruction_size(true))
            .and_then(|next| next.checked_add(arg))
            .ok_or(ScanError::MalformedJump {
                offset: instr.offset,
                target: u32::MAX,
            })?,
        JumpKind::Absolute => arg,
    };
    Ok(Some(target))
}

fn require_arg(info: &OpcodeInfo, instr: &Instruction) -> Result<u32, ScanError> {
    instr.arg.ok_or(ScanError::MissingOperand {
        name: info.name,
        offset: instr.offset,
    })
}

fn lookup<'a, T>(
    table: &'static str,
    items: &'a [T],
    index: u32,
    offset: u32,
) -> Result<&'a T, ScanError> {
    items
        .get(index as usize)
        .ok_or(ScanError::OperandOutOfRange {
            table,
            index,
            offset,
        })
}

/// Re-tag a constant load by what is being loaded, so structurally different uses of
/// `LOAD_CONST` become different terminals.
fn constant_kind(constant: &Constant) -> &'static str {
    match constant {
        Constant::Str(_) => "LOAD_STR",
        Constant::Code(code) => match code.name.as_str() {
            "<lambda>" => "LOAD_LAMBDA",
            "<listcomp>" => "LOAD_LISTCOMP",
            "<genexpr>" => "LOAD_GENEXPR",
            "<setcomp>" => "LOAD_SETCOMP",
            "<dictcomp>" => "LOAD_DICTCOMP",
            _ => "LOAD_CODE",
        },
        _ => "LOAD_CONST",
    }
}

/// Normalize one instruction. Returns `Ok(None)` for positioning markers.
pub fn normalize(instr: &Instruction, ctx: &NormalizeContext) -> Result<Option<Token>, ScanError> {
    let info = ctx.opcode(instr)?;
    let unit = ctx.unit;
    let offset = instr.offset;

    let (kind, attr, pattern_attr): (ArcStr, Attr, Attr) = match info.operand {
        Operand::Marker => return Ok(None),
        Operand::None => (info.name.into(), Attr::None, Attr::None),
        Operand::Const => {
            let index = require_arg(info, instr)?;
            let constant = lookup("constant", &unit.consts, index, offset)?;
            let kind = if info.name == "LOAD_CONST" {
                constant_kind(constant)
            } else {
                info.name
            };
            let attr = match ctx.nested.get(&(index as usize)) {
                Some(id) if matches!(constant, Constant::Code(_)) => Attr::Code(*id),
                _ => Attr::Const(constant.clone()),
            };
            (kind.into(), attr.clone(), attr)
        }
        Operand::Name => {
            let index = require_arg(info, instr)?;
            let name = lookup("name", &unit.names, index, offset)?;
            let kind = match info.name {
                "LOAD_GLOBAL" | "LOAD_NAME" if name == "AssertionError" => "LOAD_ASSERT",
                other => other,
            };
            let attr = Attr::Name(name.clone());
            (kind.into(), attr.clone(), attr)
        }
        Operand::Local => {
            let index = require_arg(info, instr)?;
            let name = lookup("varname", &unit.varnames, index, offset)?;
            let attr = Attr::Name(name.clone());
            (info.name.into(), attr.clone(), attr)
        }
        Operand::Deref => {
            let index = require_arg(info, instr)?;
            let name = unit
                .deref_name(index as usize)
                .ok_or(ScanError::OperandOutOfRange {
                    table: "cell",
                    index,
                    offset,
                })?;
            let attr = Attr::Name(name.to_string());
            (info.name.into(), attr.clone(), attr)
        }
        Operand::Compare => {
            let index = require_arg(info, instr)?;
            let op = lookup("compare", &COMPARE_OPS, index, offset)?;
            (
                info.name.into(),
                Attr::Name(op.to_string()),
                Attr::Count(index),
            )
        }
        Operand::Jump(_) | Operand::Setup(_) => {
            // Both arms of `jump_kind` are covered, so a target always exists here.
            let target = jump_target(info, instr, ctx.encoding())?.unwrap_or(offset);
            let kind = if info.name == "JUMP_ABSOLUTE" && target <= offset {
                "JUMP_BACK"
            } else {
                info.name
            };
            (kind.into(), Attr::Offset(target), Attr::Offset(target))
        }
        Operand::Arity(_) => {
            let count = require_arg(info, instr)?;
            (
                ArcStr::from(format!("{}_{count}", info.name)),
                Attr::Count(count),
                Attr::Count(count),
            )
        }
        Operand::Raw => {
            let raw = require_arg(info, instr)?;
            (info.name.into(), Attr::Raw(raw), Attr::Raw(raw))
        }
    };

    Ok(Some(Token {
        kind,
        attr,
        pattern_attr,
        offset,
        is_line_start: unit.is_line_start(offset),
        opcode: Some(instr.opcode),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use retrace_bytecode::{LineStart, opcodes_27, opcodes_36};
    use std::sync::Arc;

    fn unit() -> CodeUnit {
        let mut lambda = CodeUnit::new("<lambda>", "3.6");
        lambda.instructions = vec![Instruction::new(83, None, 0)];
        let mut u = CodeUnit::new("<module>", "3.6");
        u.consts = vec![
            Constant::Int(1),
            Constant::Str("s".into()),
            Constant::Code(Arc::new(lambda)),
            Constant::None,
        ];
        u.names = vec!["a".into(), "AssertionError".into()];
        u.varnames = vec!["x".into()];
        u.line_starts = vec![LineStart { offset: 0, line: 1 }];
        u
    }

    fn norm(u: &CodeUnit, version: Version, op: &str, arg: Option<u32>, offset: u32) -> Token {
        let nested = HashMap::from([(2usize, UnitId(7))]);
        let ctx = NormalizeContext {
            unit: u,
            version,
            opcodes: version.opcodes(),
            nested: &nested,
        };
        let code = ctx.opcodes.code_of(op).unwrap();
        normalize(&Instruction::new(code, arg, offset), &ctx)
            .unwrap()
            .unwrap()
    }

    #[test]
    fn constants_are_retagged_by_type() {
        let u = unit();
        assert_eq!(norm(&u, Version::V3_6, "LOAD_CONST", Some(0), 0).kind, "LOAD_CONST");
        assert_eq!(norm(&u, Version::V3_6, "LOAD_CONST", Some(1), 2).kind, "LOAD_STR");
        let code = norm(&u, Version::V3_6, "LOAD_CONST", Some(2), 4);
        assert_eq!(code.kind, "LOAD_LAMBDA");
        assert_eq!(code.attr, Attr::Code(UnitId(7)));
    }

    #[test]
    fn assertion_sentinel() {
        let u = unit();
        let t = norm(&u, Version::V3_6, "LOAD_GLOBAL", Some(1), 0);
        assert_eq!(t.kind, "LOAD_ASSERT");
        assert_eq!(t.attr, Attr::Name("AssertionError".into()));
        assert!(t.is_line_start);
    }

    #[test]
    fn jump_targets_resolve_per_encoding() {
        let u = unit();
        // wordcode: next instruction (offset + 2) + operand
        let t = norm(&u, Version::V3_6, "JUMP_FORWARD", Some(4), 8);
        assert_eq!(t.jump_target(), Some(14));
        // 2.7: three byte instruction
        let t = norm(&u, Version::V2_7, "JUMP_FORWARD", Some(4), 8);
        assert_eq!(t.jump_target(), Some(15));
        let t = norm(&u, Version::V3_6, "POP_JUMP_IF_FALSE", Some(30), 8);
        assert_eq!(t.jump_target(), Some(30));
    }

    #[test]
    fn relative_jump_past_the_offset_space_is_malformed() {
        let u = unit();
        let nested = HashMap::new();
        let ctx = NormalizeContext {
            unit: &u,
            version: Version::V3_6,
            opcodes: opcodes_36(),
            nested: &nested,
        };
        let code = ctx.opcodes.code_of("JUMP_FORWARD").unwrap();
        let instr = Instruction::new(code, Some(u32::MAX - 1), 8);
        assert_eq!(
            normalize(&instr, &ctx),
            Err(ScanError::MalformedJump {
                offset: 8,
                target: u32::MAX
            })
        );
    }

    #[test]
    fn backward_absolute_jump_is_a_back_edge() {
        let u = unit();
        assert_eq!(norm(&u, Version::V3_6, "JUMP_ABSOLUTE", Some(2), 10).kind, "JUMP_BACK");
        assert_eq!(norm(&u, Version::V3_6, "JUMP_ABSOLUTE", Some(20), 10).kind, "JUMP_ABSOLUTE");
    }

    #[test]
    fn arity_opcodes_get_suffixed() {
        let u = unit();
        let t = norm(&u, Version::V3_6, "CALL_FUNCTION", Some(3), 0);
        assert_eq!(t.kind, "CALL_FUNCTION_3");
        assert_eq!(t.attr, Attr::Count(3));
        let t = norm(&u, Version::V2_7, "CALL_FUNCTION", Some(258), 0);
        assert_eq!(t.kind, "CALL_FUNCTION_258");
    }

    #[test]
    fn markers_produce_nothing() {
        let u = unit();
        let nested = HashMap::new();
        let ctx = NormalizeContext {
            unit: &u,
            version: Version::V3_6,
            opcodes: opcodes_36(),
            nested: &nested,
        };
        let nop = Instruction::new(9, None, 0);
        assert_eq!(normalize(&nop, &ctx).unwrap(), None);
    }

    #[test]
    fn unknown_opcode_is_unsupported() {
        let u = unit();
        let nested = HashMap::new();
        let ctx = NormalizeContext {
            unit: &u,
            version: Version::V2_7,
            opcodes: opcodes_27(),
            nested: &nested,
        };
        // LOAD_METHOD only exists from 3.7 on.
        let err = normalize(&Instruction::new(160, Some(0), 0), &ctx).unwrap_err();
        assert!(matches!(err, ScanError::UnsupportedOpcode { opcode: 160, .. }));
    }

    #[test]
    fn out_of_range_operand() {
        let u = unit();
        let nested = HashMap::new();
        let ctx = NormalizeContext {
            unit: &u,
            version: Version::V3_6,
            opcodes: opcodes_36(),
            nested: &nested,
        };
        let err = normalize(&Instruction::new(100, Some(99), 0), &ctx).unwrap_err();
        assert!(matches!(err, ScanError::OperandOutOfRange { table: "constant", .. }));
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(opcode in 0u8..=255, arg in 0u32..4, offset in 0u32..64) {
            let u = unit();
            let nested = HashMap::from([(2usize, UnitId(1))]);
            let ctx = NormalizeContext {
                unit: &u,
                version: Version::V3_6,
                opcodes: opcodes_36(),
                nested: &nested,
            };
            let instr = Instruction::new(opcode, Some(arg), offset * 2);
            prop_assert_eq!(normalize(&instr, &ctx), normalize(&instr, &ctx));
        }
    }
}
