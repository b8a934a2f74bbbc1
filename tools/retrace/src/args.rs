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


use clap::builder::ValueHint;
use clap_derive::Parser;
use eyre::eyre;
use figment::Figment;
use figment::providers::{Format as ProviderFormat, Json, Serialized, Yaml};
use retrace_bytecode::Version;
use retrace_decompiler::Settings;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about = "Rebuild the control-flow tree of decoded bytecode")]
pub struct Args {
    #[arg(
        value_name = "input",
        help = "JSON file holding the decoded root code unit",
        value_hint = ValueHint::FilePath,
        required_unless_present = "dump_grammar"
    )]
    pub input: Option<PathBuf>,

    #[arg(
        long,
        value_name = "config",
        help = "Path to a configuration (YAML or JSON) file to use, if any. \
                Configuration file values can be overridden by command line arguments.",
        value_hint = ValueHint::FilePath
    )]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub settings_args: SettingsArgs,

    #[arg(long, help = "Print the whole module as JSON instead of as text")]
    pub json: bool,

    #[arg(
        long,
        value_name = "version",
        help = "Print the grammar of a dialect (2.7, 3.6, 3.7) and exit"
    )]
    pub dump_grammar: Option<Version>,

    #[arg(long, help = "Enable debug logging when RUST_LOG is not set")]
    pub debug: bool,
}

#[derive(Parser, Debug)]
pub struct SettingsArgs {
    #[arg(
        long,
        help = "Give up on a span once this many derivations compete for it"
    )]
    pub max_candidates: Option<usize>,

    #[arg(long, help = "Decompile the units of a module in parallel")]
    pub parallel: Option<bool>,

    #[arg(long, help = "Print each unit's token stream")]
    pub show_tokens: bool,

    #[arg(long, help = "Print the rules synthesized for each unit")]
    pub show_grammar: bool,
}

impl SettingsArgs {
    fn merge_config(&self, settings: &mut Settings) {
        if let Some(max) = self.max_candidates {
            settings.max_candidates = max;
        }
        if let Some(parallel) = self.parallel {
            settings.parallel = parallel;
        }
        settings.show_tokens |= self.show_tokens;
        settings.show_grammar |= self.show_grammar;
    }
}

impl Args {
    /// Defaults, then the configuration file if there is one, then the command line.
    pub fn load_settings(&self) -> Result<Settings, eyre::Report> {
        let mut settings = match &self.config_file {
            None => Settings::default(),
            Some(path) => {
                let figment = Figment::new().merge(Serialized::defaults(Settings::default()));
                let figment = match path.extension().and_then(|e| e.to_str()) {
                    Some("json") => figment.merge(Json::file(path)),
                    _ => figment.merge(Yaml::file(path)),
                };
                figment.extract::<Settings>().map_err(|e| {
                    eyre!("Failed to parse configuration from {:?}: {}", path, e)
                })?
            }
        };
        self.settings_args.merge_config(&mut settings);
        Ok(settings)
    }
}
