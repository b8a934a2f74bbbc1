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


//! Reconstructs structured control flow from linear stack-machine instruction streams.
//!
//! The pipeline for one code unit is: [`normalize`] every instruction into a [`Token`], find
//! the block structure with [`blocks`], let the [`Scanner`] insert join points and collect the
//! arity-suffixed terminals, then parse with the dialect [`Grammar`] plus the unit's synthetic
//! rules. Ambiguous reductions are settled by the predicates in [`checks`].

pub mod ast;
pub mod blocks;
pub mod checks;
mod decompile;
mod dialect;
mod errors;
pub mod grammar;
pub mod normalize;
pub mod scanner;
mod settings;
pub mod token;

pub use ast::{Ast, Node};
pub use checks::{CheckRegistry, ReduceCheck, Verdict};
pub use decompile::{Module, UnitOutcome, decompile_module, decompile_unit, tokenize};
pub use dialect::Dialect;
pub use errors::{DecompileError, GrammarError, ParseError, ScanError};
pub use grammar::{Grammar, Parser};
pub use scanner::{Customization, CustomizationTable, ScanOutput, Scanner, Slot};
pub use settings::Settings;
pub use token::{Attr, Token, UnitId};
