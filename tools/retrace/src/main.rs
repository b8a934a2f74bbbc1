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


mod args;
mod logging;

use crate::args::Args;
use clap::Parser;
use eyre::{WrapErr, eyre};
use retrace_bytecode::CodeUnit;
use retrace_decompiler::{Dialect, Module, Settings, decompile_module};
use std::io::Write;
use tracing::{info, warn};

fn print_module(out: &mut impl Write, module: &Module, settings: &Settings) -> std::io::Result<()> {
    for unit in &module.units {
        match unit.parent {
            Some(parent) => writeln!(out, "== {} {} (in {parent}) ==", unit.id, unit.name)?,
            None => writeln!(out, "== {} {} ==", unit.id, unit.name)?,
        }
        if settings.show_tokens {
            for token in &unit.tokens {
                writeln!(out, "{token}")?;
            }
            writeln!(out)?;
        }
        if settings.show_grammar && !unit.synthetic_rules.is_empty() {
            for rule in &unit.synthetic_rules {
                writeln!(out, "{rule}")?;
            }
            writeln!(out)?;
        }
        match &unit.result {
            Ok(ast) => write!(out, "{ast}")?,
            Err(e) => writeln!(out, "error: {e}")?,
        }
        writeln!(out)?;
    }
    Ok(())
}

fn main() -> Result<(), eyre::Report> {
    color_eyre::install()?;
    let args: Args = Args::parse();
    logging::init_tracing(args.debug)?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    if let Some(version) = args.dump_grammar {
        let dialect = Dialect::for_version(version)?;
        write!(out, "{}", dialect.grammar())?;
        return Ok(());
    }

    let settings = args.load_settings()?;
    let input = args
        .input
        .as_ref()
        .ok_or_else(|| eyre!("no input file given"))?;
    let text = std::fs::read_to_string(input)
        .wrap_err_with(|| format!("reading {}", input.display()))?;
    let root: CodeUnit = serde_json::from_str(&text)
        .wrap_err_with(|| format!("decoding code unit from {}", input.display()))?;

    info!(input = %input.display(), version = %root.version, "decompiling");
    let module = decompile_module(&root, &settings);

    if args.json {
        serde_json::to_writer_pretty(&mut out, &module)?;
        writeln!(out)?;
    } else {
        print_module(&mut out, &module, &settings)?;
    }

    let failed = module.failures().count();
    if failed > 0 {
        warn!(failed, total = module.units.len(), "some units could not be decompiled");
        return Err(eyre!("{failed} of {} units failed", module.units.len()));
    }
    Ok(())
}
