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


use serde::{Deserialize, Serialize};

/// Knobs for a decompilation run. Loaded by the command line front end from defaults, an
/// optional config file and flags, in that order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Upper bound on the derivations considered for any one (nonterminal, span) before the
    /// parse is abandoned as ambiguous.
    pub max_candidates: usize,
    /// Decompile the units of a module on the rayon pool.
    pub parallel: bool,
    pub show_tokens: bool,
    pub show_grammar: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_candidates: 64,
            parallel: true,
            show_tokens: false,
            show_grammar: false,
        }
    }
}
