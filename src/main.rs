//! Slarity Compiler
//!
//! Compiles Slarit sources to Slari pseudo-assembly.

mod backend;
mod compiler;
mod feedback;
mod frontend;
mod middle;
mod types;
mod utils;

use std::fs;
use std::path::{Path, PathBuf};
use std::process;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, LevelFilter};

use compiler::Compiler;
use feedback::{CompileReport, UnitReport};
use types::dump_class;

/// Slarity Compiler
#[derive(Parser, Debug)]
#[command(name = "slarityc")]
#[command(version = "0.1.0")]
#[command(about = "Slarity compiler - Slarit sources to Slari pseudo-assembly")]
struct Cli {
    /// Source files (.sl)
    #[arg(value_name = "FILE", required = true)]
    sources: Vec<PathBuf>,

    /// Output file; with several sources each one writes `<stem>.slari`
    #[arg(short, long, value_name = "FILE", default_value = "a.slari")]
    output: PathBuf,

    /// Class summary file to load before compiling (repeatable)
    #[arg(short, long = "classes", value_name = "FILE")]
    classes: Vec<PathBuf>,

    /// Compile every source with one shared context
    #[arg(long)]
    share_context: bool,

    /// Skip the peephole optimizer
    #[arg(long)]
    no_optimize: bool,

    /// Print the syntax tree instead of writing output
    #[arg(long)]
    emit_ast: bool,

    /// Print a JSON compile report
    #[arg(long)]
    json: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() {
    let cli = Cli::parse();

    let mut logger = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if cli.verbose {
        logger.filter_level(LevelFilter::Debug);
    }
    logger.init();

    match run(&cli) {
        Ok(true) => {}
        Ok(false) => process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            process::exit(1);
        }
    }
}

/// Compile every source; `Ok(false)` when some unit failed
fn run(cli: &Cli) -> Result<bool> {
    let mut compiler = Compiler::new(cli.share_context).with_optimization(!cli.no_optimize);
    for path in &cli.classes {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read class summaries {}", path.display()))?;
        compiler
            .load_classes(&text)
            .with_context(|| format!("Failed to load class summaries {}", path.display()))?;
    }

    let mut report = CompileReport::default();
    for path in &cli.sources {
        let name = path.display().to_string();
        let source = fs::read_to_string(path).with_context(|| format!("Failed to read {}", name))?;

        let unit = match compiler.compile(&source) {
            Ok(unit) => unit,
            Err(e) => {
                error!("{}: {}", name, e);
                report.push(UnitReport::failure(name, &e));
                if e.is_fatal() {
                    break;
                }
                continue;
            }
        };

        if cli.emit_ast {
            println!("{:#?}", unit.ast);
        } else {
            let output = output_path(cli, path);
            fs::write(&output, format!("{}\n", unit.assembly))
                .with_context(|| format!("Failed to write {}", output.display()))?;
            info!("{} -> {}", name, output.display());

            if !unit.classes.is_empty() {
                let summaries: Vec<String> = unit.classes.iter().map(dump_class).collect();
                let cls = path.with_extension("cls");
                fs::write(&cls, summaries.join("\n\n") + "\n")
                    .with_context(|| format!("Failed to write {}", cls.display()))?;
                info!("{} class summaries -> {}", summaries.len(), cls.display());
            }
        }

        let classes = unit.classes.iter().map(|c| c.full_name()).collect();
        report.push(UnitReport::success(name, unit.assembly.instruction_count(), classes));
    }

    if cli.json {
        println!("{}", report.to_json());
    }
    Ok(report.success())
}

fn output_path(cli: &Cli, source: &Path) -> PathBuf {
    if cli.sources.len() > 1 {
        source.with_extension("slari")
    } else {
        cli.output.clone()
    }
}
