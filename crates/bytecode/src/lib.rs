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


//! The input side of the decompiler: decoded code units and the static opcode tables of every
//! supported instruction-set dialect.

mod code;
mod opcodes;
mod version;

pub use code::{CodeUnit, Constant, Instruction, LineStart};
pub use opcodes::{
    ArityFamily, BlockKind, COMPARE_OPS, Encoding, JumpKind, OpDef, OpcodeInfo, OpcodeTable,
    Operand, opcodes_27, opcodes_36, opcodes_37,
};
pub use version::{UnknownVersion, Version};
