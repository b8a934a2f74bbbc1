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


//! Lays out instructions at the offsets the real encoding would give them.

#![allow(dead_code)]

use retrace_bytecode::{CodeUnit, Constant, Instruction, LineStart, Version};
use retrace_decompiler::{Ast, Settings, decompile_unit};
use std::collections::HashMap;

pub struct CodeBuilder {
    version: Version,
    unit: CodeUnit,
    offset: u32,
}

impl CodeBuilder {
    pub fn new(name: &str, version: Version) -> Self {
        Self {
            version,
            unit: CodeUnit::new(name, &version.to_string()),
            offset: 0,
        }
    }

    /// Append one instruction. Panics on an opcode the dialect does not have.
    pub fn op(mut self, name: &str, arg: Option<u32>) -> Self {
        let code = self
            .version
            .opcodes()
            .code_of(name)
            .unwrap_or_else(|| panic!("{name} is not a {} opcode", self.version));
        self.unit
            .instructions
            .push(Instruction::new(code, arg, self.offset));
        self.offset += self.version.encoding().instruction_size(arg.is_some());
        self
    }

    pub fn ops(self, ops: &[(&str, Option<u32>)]) -> Self {
        ops.iter().fold(self, |b, (name, arg)| b.op(name, *arg))
    }

    /// Offset the next instruction will get.
    pub fn here(&self) -> u32 {
        self.offset
    }

    pub fn consts(mut self, consts: Vec<Constant>) -> Self {
        self.unit.consts = consts;
        self
    }

    pub fn names(mut self, names: &[&str]) -> Self {
        self.unit.names = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn varnames(mut self, names: &[&str]) -> Self {
        self.unit.varnames = names.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.unit.line_starts.push(LineStart {
            offset: self.offset,
            line,
        });
        self
    }

    pub fn build(self) -> CodeUnit {
        self.unit
    }
}

pub fn parse(unit: &CodeUnit) -> Ast {
    match decompile_unit(unit, &HashMap::new(), &Settings::default()) {
        Ok(ast) => ast,
        Err(e) => panic!("{} failed: {e}", unit.name),
    }
}

pub fn tags(ast: &Ast, tag: &str) -> usize {
    ast.find_all(tag).len()
}
