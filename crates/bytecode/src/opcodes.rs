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


//! Static per-dialect opcode tables. A table is data, not a type: later dialects are produced
//! from earlier ones with [`OpcodeTable::patched`].

use lazy_static::lazy_static;
use std::collections::HashMap;
use strum::Display;

/// How a relative or absolute jump operand is turned into a target offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum JumpKind {
    /// Target is the offset of the next instruction plus the operand.
    Relative,
    /// Target is the operand itself.
    Absolute,
}

/// The kind of region a `SETUP_*` opcode opens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum BlockKind {
    Loop,
    ExceptionGuard,
    Cleanup,
    ContextManager,
}

/// Opcodes whose operand is an item count, and which therefore need an arity-suffixed terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum ArityFamily {
    /// `CALL_FUNCTION n`: n positional arguments.
    Call,
    /// 2.x `CALL_FUNCTION`: low byte positional, high byte keyword pairs.
    CallPacked,
    /// `CALL_FUNCTION_KW n`: n arguments followed by a tuple of keyword names.
    CallKw,
    CallMethod,
    BuildList,
    BuildTuple,
    BuildSet,
    /// 3.x `BUILD_MAP n`: 2n stacked key/value expressions.
    BuildMap,
    /// 2.x `BUILD_MAP n`: a size hint followed by n `STORE_MAP` items.
    BuildMapSized,
    BuildConstKeyMap,
    BuildString,
    BuildSlice,
    UnpackSequence,
    RaiseVarargs,
    /// 2.x `MAKE_FUNCTION n`: n default values.
    MakeFunction,
    /// 2.x `MAKE_CLOSURE n`: n default values plus a cell tuple.
    MakeClosure,
    /// 3.x `MAKE_FUNCTION flags`.
    MakeFunctionFlags,
}

/// What an opcode's operand refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Operand {
    /// No operand.
    None,
    /// Pure positioning marker; produces no token.
    Marker,
    /// Index into the constant pool.
    Const,
    /// Index into the names table.
    Name,
    /// Index into the local variable table.
    Local,
    /// Index into cell variables followed by free variables.
    Deref,
    /// Index into the comparison operator table.
    Compare,
    Jump(JumpKind),
    Setup(BlockKind),
    Arity(ArityFamily),
    /// An operand that is carried through verbatim.
    Raw,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OpcodeInfo {
    pub code: u8,
    pub name: &'static str,
    pub operand: Operand,
}

impl OpcodeInfo {
    pub fn jump_kind(&self) -> Option<JumpKind> {
        match self.operand {
            Operand::Jump(k) => Some(k),
            Operand::Setup(_) => Some(JumpKind::Relative),
            _ => None,
        }
    }

    pub fn block_kind(&self) -> Option<BlockKind> {
        match self.operand {
            Operand::Setup(k) => Some(k),
            _ => None,
        }
    }
}

/// Instruction layout of a dialect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Display)]
pub enum Encoding {
    /// One byte, or three bytes when the opcode carries an operand.
    Variable,
    /// Always two bytes.
    Wordcode,
}

impl Encoding {
    pub fn instruction_size(&self, has_arg: bool) -> u32 {
        match self {
            Encoding::Variable if has_arg => 3,
            Encoding::Variable => 1,
            Encoding::Wordcode => 2,
        }
    }
}

pub type OpDef = (u8, &'static str, Operand);

#[derive(Clone, Debug)]
pub struct OpcodeTable {
    entries: Vec<Option<OpcodeInfo>>,
    by_name: HashMap<&'static str, u8>,
}

impl OpcodeTable {
    pub fn from_defs(defs: &[OpDef]) -> Self {
        let mut table = OpcodeTable {
            entries: vec![None; 256],
            by_name: HashMap::new(),
        };
        table.apply(defs);
        table
    }

    fn apply(&mut self, defs: &[OpDef]) {
        for &(code, name, operand) in defs {
            if let Some(old) = self.entries[code as usize].take() {
                self.by_name.remove(old.name);
            }
            if let Some(prev) = self.by_name.remove(name) {
                self.entries[prev as usize] = None;
            }
            self.entries[code as usize] = Some(OpcodeInfo {
                code,
                name,
                operand,
            });
            self.by_name.insert(name, code);
        }
    }

    /// A new table: this one, minus the `remove`d names, plus (or overriding with) `add`.
    pub fn patched(&self, add: &[OpDef], remove: &[&str]) -> Self {
        let mut table = self.clone();
        for name in remove {
            if let Some(code) = table.by_name.remove(*name) {
                table.entries[code as usize] = None;
            }
        }
        table.apply(add);
        table
    }

    pub fn get(&self, code: u8) -> Option<&OpcodeInfo> {
        self.entries[code as usize].as_ref()
    }

    pub fn code_of(&self, name: &str) -> Option<u8> {
        self.by_name.get(name).copied()
    }

    pub fn by_name(&self, name: &str) -> Option<&OpcodeInfo> {
        self.code_of(name).and_then(|c| self.get(c))
    }
}

pub const COMPARE_OPS: [&str; 12] = [
    "<",
    "<=",
    "==",
    "!=",
    ">",
    ">=",
    "in",
    "not in",
    "is",
    "is not",
    "exception-match",
    "BAD",
];

use ArityFamily as A;
use Operand as O;

const COMMON: &[OpDef] = &[
    (1, "POP_TOP", O::None),
    (2, "ROT_TWO", O::None),
    (3, "ROT_THREE", O::None),
    (4, "DUP_TOP", O::None),
    (9, "NOP", O::Marker),
    (10, "UNARY_POSITIVE", O::None),
    (11, "UNARY_NEGATIVE", O::None),
    (12, "UNARY_NOT", O::None),
    (15, "UNARY_INVERT", O::None),
    (19, "BINARY_POWER", O::None),
    (20, "BINARY_MULTIPLY", O::None),
    (22, "BINARY_MODULO", O::None),
    (23, "BINARY_ADD", O::None),
    (24, "BINARY_SUBTRACT", O::None),
    (25, "BINARY_SUBSCR", O::None),
    (26, "BINARY_FLOOR_DIVIDE", O::None),
    (27, "BINARY_TRUE_DIVIDE", O::None),
    (28, "INPLACE_FLOOR_DIVIDE", O::None),
    (29, "INPLACE_TRUE_DIVIDE", O::None),
    (55, "INPLACE_ADD", O::None),
    (56, "INPLACE_SUBTRACT", O::None),
    (57, "INPLACE_MULTIPLY", O::None),
    (59, "INPLACE_MODULO", O::None),
    (60, "STORE_SUBSCR", O::None),
    (61, "DELETE_SUBSCR", O::None),
    (62, "BINARY_LSHIFT", O::None),
    (63, "BINARY_RSHIFT", O::None),
    (64, "BINARY_AND", O::None),
    (65, "BINARY_XOR", O::None),
    (66, "BINARY_OR", O::None),
    (67, "INPLACE_POWER", O::None),
    (68, "GET_ITER", O::None),
    (70, "PRINT_EXPR", O::None),
    (75, "INPLACE_LSHIFT", O::None),
    (76, "INPLACE_RSHIFT", O::None),
    (77, "INPLACE_AND", O::None),
    (78, "INPLACE_XOR", O::None),
    (79, "INPLACE_OR", O::None),
    (80, "BREAK_LOOP", O::None),
    (83, "RETURN_VALUE", O::None),
    (84, "IMPORT_STAR", O::None),
    (86, "YIELD_VALUE", O::None),
    (87, "POP_BLOCK", O::None),
    (88, "END_FINALLY", O::None),
    (90, "STORE_NAME", O::Name),
    (91, "DELETE_NAME", O::Name),
    (92, "UNPACK_SEQUENCE", O::Arity(A::UnpackSequence)),
    (93, "FOR_ITER", O::Jump(JumpKind::Relative)),
    (95, "STORE_ATTR", O::Name),
    (96, "DELETE_ATTR", O::Name),
    (97, "STORE_GLOBAL", O::Name),
    (98, "DELETE_GLOBAL", O::Name),
    (100, "LOAD_CONST", O::Const),
    (101, "LOAD_NAME", O::Name),
    (102, "BUILD_TUPLE", O::Arity(A::BuildTuple)),
    (103, "BUILD_LIST", O::Arity(A::BuildList)),
    (104, "BUILD_SET", O::Arity(A::BuildSet)),
    (106, "LOAD_ATTR", O::Name),
    (107, "COMPARE_OP", O::Compare),
    (108, "IMPORT_NAME", O::Name),
    (109, "IMPORT_FROM", O::Name),
    (110, "JUMP_FORWARD", O::Jump(JumpKind::Relative)),
    (111, "JUMP_IF_FALSE_OR_POP", O::Jump(JumpKind::Absolute)),
    (112, "JUMP_IF_TRUE_OR_POP", O::Jump(JumpKind::Absolute)),
    (113, "JUMP_ABSOLUTE", O::Jump(JumpKind::Absolute)),
    (114, "POP_JUMP_IF_FALSE", O::Jump(JumpKind::Absolute)),
    (115, "POP_JUMP_IF_TRUE", O::Jump(JumpKind::Absolute)),
    (116, "LOAD_GLOBAL", O::Name),
    (119, "CONTINUE_LOOP", O::Jump(JumpKind::Absolute)),
    (120, "SETUP_LOOP", O::Setup(BlockKind::Loop)),
    (121, "SETUP_EXCEPT", O::Setup(BlockKind::ExceptionGuard)),
    (122, "SETUP_FINALLY", O::Setup(BlockKind::Cleanup)),
    (124, "LOAD_FAST", O::Local),
    (125, "STORE_FAST", O::Local),
    (126, "DELETE_FAST", O::Local),
    (130, "RAISE_VARARGS", O::Arity(A::RaiseVarargs)),
    (133, "BUILD_SLICE", O::Arity(A::BuildSlice)),
    (135, "LOAD_CLOSURE", O::Deref),
    (136, "LOAD_DEREF", O::Deref),
    (137, "STORE_DEREF", O::Deref),
    (143, "SETUP_WITH", O::Setup(BlockKind::ContextManager)),
    (146, "SET_ADD", O::Raw),
    (147, "MAP_ADD", O::Raw),
];

const PY27: &[OpDef] = &[
    (5, "ROT_FOUR", O::None),
    (13, "UNARY_CONVERT", O::None),
    (21, "BINARY_DIVIDE", O::None),
    (30, "SLICE+0", O::None),
    (31, "SLICE+1", O::None),
    (32, "SLICE+2", O::None),
    (33, "SLICE+3", O::None),
    (40, "STORE_SLICE+0", O::None),
    (41, "STORE_SLICE+1", O::None),
    (42, "STORE_SLICE+2", O::None),
    (43, "STORE_SLICE+3", O::None),
    (50, "DELETE_SLICE+0", O::None),
    (51, "DELETE_SLICE+1", O::None),
    (52, "DELETE_SLICE+2", O::None),
    (53, "DELETE_SLICE+3", O::None),
    (54, "STORE_MAP", O::None),
    (58, "INPLACE_DIVIDE", O::None),
    (71, "PRINT_ITEM", O::None),
    (72, "PRINT_NEWLINE", O::None),
    (73, "PRINT_ITEM_TO", O::None),
    (74, "PRINT_NEWLINE_TO", O::None),
    (81, "WITH_CLEANUP", O::None),
    (82, "LOAD_LOCALS", O::None),
    (85, "EXEC_STMT", O::None),
    (89, "BUILD_CLASS", O::None),
    (94, "LIST_APPEND", O::Raw),
    (99, "DUP_TOPX", O::Raw),
    (105, "BUILD_MAP", O::Arity(A::BuildMapSized)),
    (131, "CALL_FUNCTION", O::Arity(A::CallPacked)),
    (132, "MAKE_FUNCTION", O::Arity(A::MakeFunction)),
    (134, "MAKE_CLOSURE", O::Arity(A::MakeClosure)),
    (145, "EXTENDED_ARG", O::Marker),
];

const PY36: &[OpDef] = &[
    (5, "DUP_TOP_TWO", O::None),
    (16, "BINARY_MATRIX_MULTIPLY", O::None),
    (17, "INPLACE_MATRIX_MULTIPLY", O::None),
    (69, "GET_YIELD_FROM_ITER", O::None),
    (71, "LOAD_BUILD_CLASS", O::None),
    (72, "YIELD_FROM", O::None),
    (81, "WITH_CLEANUP_START", O::None),
    (82, "WITH_CLEANUP_FINISH", O::None),
    (85, "SETUP_ANNOTATIONS", O::None),
    (89, "POP_EXCEPT", O::None),
    (94, "UNPACK_EX", O::Raw),
    (105, "BUILD_MAP", O::Arity(A::BuildMap)),
    (127, "STORE_ANNOTATION", O::Name),
    (131, "CALL_FUNCTION", O::Arity(A::Call)),
    (132, "MAKE_FUNCTION", O::Arity(A::MakeFunctionFlags)),
    (138, "DELETE_DEREF", O::Deref),
    (141, "CALL_FUNCTION_KW", O::Arity(A::CallKw)),
    (142, "CALL_FUNCTION_EX", O::Raw),
    (144, "EXTENDED_ARG", O::Marker),
    (145, "LIST_APPEND", O::Raw),
    (148, "LOAD_CLASSDEREF", O::Deref),
    (155, "FORMAT_VALUE", O::Raw),
    (156, "BUILD_CONST_KEY_MAP", O::Arity(A::BuildConstKeyMap)),
    (157, "BUILD_STRING", O::Arity(A::BuildString)),
];

const PY37_ADD: &[OpDef] = &[
    (160, "LOAD_METHOD", O::Name),
    (161, "CALL_METHOD", O::Arity(A::CallMethod)),
];

const PY37_REMOVE: &[&str] = &["STORE_ANNOTATION"];

lazy_static! {
    static ref COMMON_TABLE: OpcodeTable = OpcodeTable::from_defs(COMMON);
    static ref TABLE_27: OpcodeTable = COMMON_TABLE.patched(PY27, &[]);
    static ref TABLE_36: OpcodeTable = COMMON_TABLE.patched(PY36, &[]);
    static ref TABLE_37: OpcodeTable = TABLE_36.patched(PY37_ADD, PY37_REMOVE);
}

pub fn opcodes_27() -> &'static OpcodeTable {
    &TABLE_27
}

pub fn opcodes_36() -> &'static OpcodeTable {
    &TABLE_36
}

pub fn opcodes_37() -> &'static OpcodeTable {
    &TABLE_37
}
