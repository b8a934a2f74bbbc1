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


//! The decoded form of one code object, as handed over by whatever loader read the container
//! file. Nothing here knows about grammars; it is plain data plus a few lookups.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::sync::Arc;

/// One decoded instruction. `arg` has already had any `EXTENDED_ARG` prefix folded into it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Instruction {
    pub opcode: u8,
    #[serde(default)]
    pub arg: Option<u32>,
    pub offset: u32,
}

impl Instruction {
    pub fn new(opcode: u8, arg: Option<u32>, offset: u32) -> Self {
        Self {
            opcode,
            arg,
            offset,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Constant {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Constant>),
    Code(Arc<CodeUnit>),
}

impl Constant {
    pub fn as_code(&self) -> Option<&Arc<CodeUnit>> {
        match self {
            Constant::Code(c) => Some(c),
            _ => None,
        }
    }
}

impl Display for Constant {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Constant::None => write!(f, "None"),
            Constant::Ellipsis => write!(f, "..."),
            Constant::Bool(true) => write!(f, "True"),
            Constant::Bool(false) => write!(f, "False"),
            Constant::Int(i) => write!(f, "{i}"),
            Constant::Float(x) => write!(f, "{x:?}"),
            Constant::Str(s) => write!(f, "{s:?}"),
            Constant::Bytes(b) => write!(f, "b{:?}", String::from_utf8_lossy(b)),
            Constant::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                if items.len() == 1 {
                    write!(f, ",")?;
                }
                write!(f, ")")
            }
            Constant::Code(c) => write!(f, "<code object {}>", c.name),
        }
    }
}

/// Marks the first instruction of a source line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineStart {
    pub offset: u32,
    pub line: u32,
}

/// A single code object: a module body, a function body, a class body or a comprehension.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodeUnit {
    pub name: String,
    /// The dialect tag as supplied by the loader, e.g. "3.6".
    pub version: String,
    pub instructions: Vec<Instruction>,
    #[serde(default)]
    pub consts: Vec<Constant>,
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub varnames: Vec<String>,
    #[serde(default)]
    pub cellvars: Vec<String>,
    #[serde(default)]
    pub freevars: Vec<String>,
    #[serde(default)]
    pub line_starts: Vec<LineStart>,
}

impl CodeUnit {
    pub fn new(name: &str, version: &str) -> Self {
        Self {
            name: name.to_string(),
            version: version.to_string(),
            instructions: vec![],
            consts: vec![],
            names: vec![],
            varnames: vec![],
            cellvars: vec![],
            freevars: vec![],
            line_starts: vec![],
        }
    }

    /// Cell variables come first, then free variables, matching how `LOAD_DEREF` indexes them.
    pub fn deref_name(&self, index: usize) -> Option<&str> {
        if index < self.cellvars.len() {
            Some(self.cellvars[index].as_str())
        } else {
            self.freevars
                .get(index - self.cellvars.len())
                .map(String::as_str)
        }
    }

    pub fn is_line_start(&self, offset: u32) -> bool {
        self.line_starts.iter().any(|l| l.offset == offset)
    }

    pub fn line_for(&self, offset: u32) -> Option<u32> {
        self.line_starts
            .iter()
            .take_while(|l| l.offset <= offset)
            .last()
            .map(|l| l.line)
    }

    /// Index of the instruction that starts at `offset`, if any.
    pub fn instruction_index(&self, offset: u32) -> Option<usize> {
        self.instructions
            .binary_search_by_key(&offset, |i| i.offset)
            .ok()
    }

    /// Nested code objects in constant-pool order, with their pool index.
    pub fn nested_units(&self) -> impl Iterator<Item = (usize, &Arc<CodeUnit>)> {
        self.consts
            .iter()
            .enumerate()
            .filter_map(|(i, c)| c.as_code().map(|code| (i, code)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit() -> CodeUnit {
        let mut u = CodeUnit::new("<module>", "3.6");
        u.instructions = vec![
            Instruction::new(100, Some(0), 0),
            Instruction::new(90, Some(0), 2),
            Instruction::new(100, Some(1), 4),
            Instruction::new(83, None, 6),
        ];
        u.line_starts = vec![
            LineStart { offset: 0, line: 1 },
            LineStart { offset: 4, line: 2 },
        ];
        u.cellvars = vec!["a".into()];
        u.freevars = vec!["b".into()];
        u
    }

    #[test]
    fn line_lookup() {
        let u = unit();
        assert_eq!(u.line_for(2), Some(1));
        assert_eq!(u.line_for(6), Some(2));
        assert!(u.is_line_start(4));
        assert!(!u.is_line_start(6));
    }

    #[test]
    fn deref_names_span_cells_then_frees() {
        let u = unit();
        assert_eq!(u.deref_name(0), Some("a"));
        assert_eq!(u.deref_name(1), Some("b"));
        assert_eq!(u.deref_name(2), None);
    }

    #[test]
    fn instruction_boundaries() {
        let u = unit();
        assert_eq!(u.instruction_index(4), Some(2));
        assert_eq!(u.instruction_index(5), None);
    }

    #[test]
    fn constants_serialize_tagged() {
        let c = Constant::Tuple(vec![Constant::Int(1), Constant::Str("x".into())]);
        let json = serde_json::to_string(&c).unwrap();
        let back: Constant = serde_json::from_str(&json).unwrap();
        assert_eq!(back, c);
        assert_eq!(c.to_string(), "(1, \"x\")");
    }
}
