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


//! The per-module driver. A module's root code unit and every code object nested in its
//! constant pools are flattened into one unit table, then each unit is scanned and parsed on
//! its own. Units share nothing but the read-only dialect tables, so they can run in parallel.

use rayon::prelude::*;
use retrace_bytecode::{CodeUnit, Version};
use serde::Serialize;
use serde::ser::{SerializeStruct, Serializer};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::ast::Ast;
use crate::checks::CheckRegistry;
use crate::dialect::Dialect;
use crate::errors::DecompileError;
use crate::grammar::Parser;
use crate::scanner::ScanOutput;
use crate::settings::Settings;
use crate::token::{Token, UnitId};

/// One entry of the flattened unit table.
struct FlatUnit<'a> {
    unit: &'a CodeUnit,
    parent: Option<UnitId>,
    /// Constant-pool index to the id of the nested unit stored there.
    nested: HashMap<usize, UnitId>,
}

fn flatten<'a>(unit: &'a CodeUnit, parent: Option<UnitId>, out: &mut Vec<FlatUnit<'a>>) -> UnitId {
    let id = UnitId(out.len());
    out.push(FlatUnit {
        unit,
        parent,
        nested: HashMap::new(),
    });
    for (index, code) in unit.nested_units() {
        let child = flatten(code, Some(id), out);
        out[id.0].nested.insert(index, child);
    }
    id
}

/// What became of one code unit.
#[derive(Debug)]
pub struct UnitOutcome {
    pub id: UnitId,
    pub name: String,
    pub parent: Option<UnitId>,
    /// The scanned token stream; empty when scanning itself failed.
    pub tokens: Vec<Token>,
    /// Rules synthesized for this unit's arity-suffixed terminals, as text.
    pub synthetic_rules: Vec<String>,
    pub result: Result<Ast, DecompileError>,
}

impl UnitOutcome {
    pub fn ast(&self) -> Option<&Ast> {
        self.result.as_ref().ok()
    }
}

impl Serialize for UnitOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("UnitOutcome", 5)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("name", &self.name)?;
        s.serialize_field("parent", &self.parent)?;
        match &self.result {
            Ok(ast) => {
                s.serialize_field("ast", ast)?;
                s.skip_field("error")?;
            }
            Err(e) => {
                s.skip_field("ast")?;
                s.serialize_field("error", &e.to_string())?;
            }
        }
        s.serialize_field("synthetic_rules", &self.synthetic_rules)?;
        s.end()
    }
}

/// The side table of independently parsed units, indexed by [`UnitId`]. Unit 0 is the root.
#[derive(Debug, Serialize)]
pub struct Module {
    pub units: Vec<UnitOutcome>,
}

impl Module {
    pub fn unit(&self, id: UnitId) -> Option<&UnitOutcome> {
        self.units.get(id.0)
    }

    pub fn root(&self) -> Option<&UnitOutcome> {
        self.units.first()
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.units.iter().filter(|u| u.result.is_err())
    }
}

/// Decompile `root` and everything nested in it. A unit that fails is recorded as such and
/// never stops its siblings.
pub fn decompile_module(root: &CodeUnit, settings: &Settings) -> Module {
    let mut table = vec![];
    flatten(root, None, &mut table);
    debug!(root = %root.name, units = table.len(), parallel = settings.parallel, "decompiling module");

    let run = |(i, flat): (usize, &FlatUnit)| run_unit(UnitId(i), flat, settings);
    let units: Vec<UnitOutcome> = if settings.parallel {
        table.par_iter().enumerate().map(run).collect()
    } else {
        table.iter().enumerate().map(run).collect()
    };
    Module { units }
}

fn run_unit(id: UnitId, flat: &FlatUnit, settings: &Settings) -> UnitOutcome {
    let mut tokens = vec![];
    let mut synthetic_rules = vec![];
    let result = process(
        flat.unit,
        &flat.nested,
        settings,
        &mut tokens,
        &mut synthetic_rules,
    );
    if let Err(e) = &result {
        warn!(unit = %flat.unit.name, %id, error = %e, "unit failed to decompile");
    }
    UnitOutcome {
        id,
        name: flat.unit.name.clone(),
        parent: flat.parent,
        tokens,
        synthetic_rules,
        result,
    }
}

fn process(
    unit: &CodeUnit,
    nested: &HashMap<usize, UnitId>,
    settings: &Settings,
    tokens: &mut Vec<Token>,
    synthetic_rules: &mut Vec<String>,
) -> Result<Ast, DecompileError> {
    let (dialect, scanned) = scan_unit(unit, nested)?;
    tokens.clone_from(&scanned.tokens);

    let base = dialect.grammar().rules().len();
    let grammar = dialect.unit_grammar(&scanned.customizations);
    *synthetic_rules = (base..grammar.rules().len())
        .map(|r| grammar.rule_text(r))
        .collect();

    let parser = Parser::new(&grammar, CheckRegistry::standard(), settings.max_candidates)?;
    let root = parser.parse(&scanned.tokens, &scanned.blocks)?;
    debug!(
        unit = %unit.name,
        tokens = scanned.tokens.len(),
        synthetic = synthetic_rules.len(),
        "parsed unit"
    );
    Ok(Ast::new(root))
}

fn scan_unit(
    unit: &CodeUnit,
    nested: &HashMap<usize, UnitId>,
) -> Result<(Arc<Dialect>, ScanOutput), DecompileError> {
    let version: Version = unit.version.parse()?;
    let dialect = Dialect::for_version(version)?;
    let scanned = dialect.scanner().scan(unit, nested)?;
    Ok((dialect, scanned))
}

/// Decompile a single unit in isolation. Nested code constants are not resolved; pass the
/// unit ids they would have in a module table through `nested` if the caller keeps one.
pub fn decompile_unit(
    unit: &CodeUnit,
    nested: &HashMap<usize, UnitId>,
    settings: &Settings,
) -> Result<Ast, DecompileError> {
    let flat = FlatUnit {
        unit,
        parent: None,
        nested: nested.clone(),
    };
    run_unit(UnitId(0), &flat, settings).result
}

/// Only the scanner half of the pipeline, for disassembly-style listings.
pub fn tokenize(unit: &CodeUnit) -> Result<ScanOutput, DecompileError> {
    let mut table = vec![];
    flatten(unit, None, &mut table);
    let nested = table
        .into_iter()
        .next()
        .map(|root| root.nested)
        .unwrap_or_default();
    Ok(scan_unit(unit, &nested)?.1)
}
