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


use retrace_bytecode::{BlockKind, UnknownVersion, Version};

/// Failures while turning raw instructions into tokens. All are fatal for the code unit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("opcode {opcode} at offset {offset} is not part of the {version} instruction set")]
    UnsupportedOpcode {
        opcode: u8,
        offset: u32,
        version: Version,
    },
    #[error("malformed {kind} block opened at offset {offset}: end {end} is not an instruction boundary")]
    MalformedBlock {
        kind: BlockKind,
        offset: u32,
        end: u32,
    },
    #[error("jump at offset {offset} targets {target}, which is not an instruction boundary")]
    MalformedJump { offset: u32, target: u32 },
    #[error("{name} at offset {offset} requires an operand")]
    MissingOperand { name: &'static str, offset: u32 },
    #[error("{table} index {index} out of range at offset {offset}")]
    OperandOutOfRange {
        table: &'static str,
        index: u32,
        offset: u32,
    },
}

/// Failures of the grammar engine over one token stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("no parse: stuck at token {index} ({kind} @ {offset})")]
    NoParse {
        index: usize,
        offset: u32,
        kind: String,
    },
    #[error(
        "unresolved ambiguity for {nonterminal} over offsets {first_offset}..={last_offset}: {}",
        candidates.join(" | ")
    )]
    Ambiguous {
        nonterminal: String,
        candidates: Vec<String>,
        first_offset: u32,
        last_offset: u32,
    },
    #[error("every derivation of {nonterminal} over offsets {first_offset}..={last_offset} was rejected by reduce checks")]
    Rejected {
        nonterminal: String,
        first_offset: u32,
        last_offset: u32,
    },
}

/// Problems in a grammar description. These are defects in the dialect tables, not in input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GrammarError {
    #[error("grammar line {line}: {message}")]
    Syntax { line: usize, message: String },
    #[error("nonterminal {0} is marked %check but has no registered reduce check")]
    UnknownPredicate(String),
    #[error("start symbol {0} has no rules")]
    NoStartSymbol(String),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecompileError {
    #[error(transparent)]
    UnsupportedVersion(#[from] UnknownVersion),
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}
