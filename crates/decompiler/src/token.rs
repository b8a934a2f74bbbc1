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


use arcstr::ArcStr;
use retrace_bytecode::Constant;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Index of a code unit in a module's unit table.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct UnitId(pub usize);

impl Display for UnitId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "unit#{}", self.0)
    }
}

/// The resolved value carried by a token.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Attr {
    None,
    Const(Constant),
    Name(String),
    /// A code offset: a jump target, or for a join point the offset it originates from.
    Offset(u32),
    /// An item count or comparison index.
    Count(u32),
    Raw(u32),
    /// A nested code unit, resolved against the module's unit table.
    Code(UnitId),
}

impl Display for Attr {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Attr::None => Ok(()),
            Attr::Const(c) => write!(f, "{c}"),
            Attr::Name(n) => write!(f, "{n}"),
            Attr::Offset(o) => write!(f, "@{o}"),
            Attr::Count(c) => write!(f, "{c}"),
            Attr::Raw(r) => write!(f, "{r}"),
            Attr::Code(u) => write!(f, "<{u}>"),
        }
    }
}

/// A grammar terminal. Produced by the scanner, immutable afterwards.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Token {
    pub kind: ArcStr,
    /// What the code generator shows.
    pub attr: Attr,
    /// What reduce checks compare against.
    pub pattern_attr: Attr,
    pub offset: u32,
    pub is_line_start: bool,
    /// The opcode this token came from; `None` for synthesized join points.
    pub opcode: Option<u8>,
}

impl Token {
    pub fn new(kind: impl Into<ArcStr>, attr: Attr, offset: u32) -> Self {
        Self {
            kind: kind.into(),
            pattern_attr: attr.clone(),
            attr,
            offset,
            is_line_start: false,
            opcode: None,
        }
    }

    /// A join-point pseudo-token at `offset`, originating from the instruction at `from`.
    pub fn come_from(kind: impl Into<ArcStr>, offset: u32, from: u32) -> Self {
        Self::new(kind, Attr::Offset(from), offset)
    }

    pub fn is_come_from(&self) -> bool {
        self.kind.starts_with("COME_FROM")
    }

    /// The offset carried in `pattern_attr`: a jump's target, or a join point's origin.
    pub fn pattern_offset(&self) -> Option<u32> {
        match self.pattern_attr {
            Attr::Offset(o) => Some(o),
            _ => None,
        }
    }

    /// The target of a jump token. Join points carry an origin, not a target.
    pub fn jump_target(&self) -> Option<u32> {
        if self.is_come_from() {
            return None;
        }
        self.pattern_offset()
    }

    pub fn is_conditional_jump(&self) -> bool {
        matches!(
            self.kind.as_str(),
            "POP_JUMP_IF_FALSE"
                | "POP_JUMP_IF_TRUE"
                | "JUMP_IF_FALSE_OR_POP"
                | "JUMP_IF_TRUE_OR_POP"
        )
    }

    pub fn is_forward_jump(&self) -> bool {
        self.jump_target().is_some_and(|t| t > self.offset)
    }
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let marker = if self.is_line_start { ">" } else { " " };
        write!(f, "{marker}{:>6} {:<24}", self.offset, self.kind.as_str())?;
        if self.attr != Attr::None {
            write!(f, " {}", self.attr)?;
        }
        Ok(())
    }
}
