// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! Lodestar - inspection tool for the engine core.
//!
//! Reads a parse tree serialized as JSON, runs the control-flow lowering
//! pass over it and assembles the compiled units, printing diagnostics,
//! lowered trees and unit summaries.

mod cli;
mod input;

use anyhow::{Context as _, Result};
use clap::Parser;
use cli::{Cli, Commands, LowerArgs};
use lodestar_core::compiler::{ListingCodegen, Severity, assemble, lower};
use lodestar_core::ir::{FunctionId, dump::dump_program};
use lodestar_core::{CompiledUnit, Diagnostics, EngineConfig};
use owo_colors::OwoColorize;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}: {:#}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = load_config(cli)?;
    match &cli.command {
        Commands::Lower(args) => run_lower(args, &config),
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(cli: &Cli) -> Result<EngineConfig> {
    match &cli.config {
        Some(path) => {
            let config = EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?;
            debug!(path = %path.display(), "loaded engine configuration");
            Ok(config)
        }
        None => Ok(EngineConfig::default()),
    }
}

fn run_lower(args: &LowerArgs, config: &EngineConfig) -> Result<ExitCode> {
    let script = input::load(&args.file)?;
    let fallback = args.file.display().to_string();
    let mut program = input::build(&script, Some(fallback))?;

    let diagnostics = lower(&mut program, config);
    print_diagnostics(&diagnostics);
    if diagnostics.has_errors() {
        return Ok(ExitCode::FAILURE);
    }

    if args.tree {
        print!("{}", dump_program(&program));
    }

    let unit = assemble(&program, FunctionId::SCRIPT, config, &mut ListingCodegen, args.eval)?;
    info!(
        units = count_units(&unit),
        bytecode = unit.bytecode_len(),
        "assembled script"
    );
    if args.units {
        print_unit(&unit, 0);
    }

    println!(
        "{} {} ({} unit(s))",
        "Compiled".green().bold(),
        program.script().source_name.as_deref().unwrap_or("<script>"),
        count_units(&unit)
    );
    Ok(ExitCode::SUCCESS)
}

fn print_diagnostics(diagnostics: &Diagnostics) {
    for diagnostic in diagnostics.iter() {
        let severity = match diagnostic.severity {
            Severity::Error => "error".red().bold().to_string(),
            Severity::Warning => "warning".yellow().bold().to_string(),
        };
        let location = match diagnostic.line {
            Some(line) => format!(
                "{}:{}",
                diagnostic.source_name.as_deref().unwrap_or("<script>"),
                line
            ),
            None => diagnostic.source_name.as_deref().unwrap_or("<script>").to_string(),
        };
        eprintln!("{}: {}: {}", location.cyan(), severity, diagnostic.message);
    }
    if diagnostics.dropped() > 0 {
        eprintln!(
            "{}",
            format!("... {} more diagnostic(s) not shown", diagnostics.dropped()).dimmed()
        );
    }
}

fn count_units(unit: &Arc<CompiledUnit>) -> usize {
    1 + unit.nested().iter().map(count_units).sum::<usize>()
}

fn print_unit(unit: &CompiledUnit, depth: usize) {
    let indent = "  ".repeat(depth);
    let name = if !unit.is_function() {
        "<script>".to_string()
    } else if unit.name().is_empty() {
        "<anonymous>".to_string()
    } else {
        unit.name().to_string()
    };
    println!("{}{}", indent, name.white().bold());
    println!(
        "{}  params={:?} vars={} locals={} stack={} try-depth={} bytecode={}",
        indent,
        unit.arg_names(),
        unit.max_vars(),
        unit.max_locals(),
        unit.max_stack(),
        unit.max_try_depth(),
        unit.bytecode_len()
    );
    let mut flags = Vec::new();
    if unit.needs_activation() {
        flags.push("activation");
    }
    if unit.check_this() {
        flags.push("check-this");
    }
    if unit.use_dynamic_scope() {
        flags.push("dynamic-scope");
    }
    if unit.from_eval_code() {
        flags.push("eval");
    }
    if !flags.is_empty() {
        println!("{}  {}", indent, flags.join(" ").dimmed());
    }
    for nested in unit.nested() {
        print_unit(nested, depth + 1);
    }
}
