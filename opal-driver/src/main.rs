//! Opal Compiler Driver
//!
//! Command-line front door for the back end: reads a typed program (the JSON
//! form the front end emits after checking), optionally runs the tree
//! rewrites, and writes one assembly unit. Assembling and linking stay
//! external; `--show-link-command` prints the configured command line for
//! the produced file.

use clap::Parser;
use log::info;
use opal_common::{Platform, TargetConfig};
use opal_ir::Program;
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "opalc")]
#[command(about = "Opal compiler back end")]
#[command(version)]
struct Cli {
    /// Typed program file (JSON) produced by the front end
    input: PathBuf,

    /// Output assembly file (defaults to the input path with a .s extension)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Target platform: linux, macos, or windows (defaults to the host)
    #[arg(long)]
    target: Option<String>,

    /// Run constant propagation and folding before code generation
    #[arg(long)]
    fold: bool,

    /// Remove assignments that are overwritten before any use
    #[arg(long)]
    eliminate_dead: bool,

    /// Print the assemble-and-link command for the generated file
    #[arg(long)]
    show_link_command: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(error) = run(&cli) {
        eprintln!("error: {}", error);
        process::exit(1);
    }
}

fn run(cli: &Cli) -> Result<(), Box<dyn Error>> {
    let config = match &cli.target {
        Some(name) => TargetConfig::for_platform(name.parse::<Platform>()?),
        None => TargetConfig::host(),
    };

    let text = fs::read_to_string(&cli.input)?;
    let mut program: Program = serde_json::from_str(&text)?;

    if cli.fold {
        info!("running constant propagation and folding");
        opal_opt::fold_program(&mut program);
    }
    if cli.eliminate_dead {
        info!("running dead-assignment elimination");
        opal_opt::eliminate_dead_assignments(&mut program);
    }

    let assembly = opal_codegen::generate_assembly(&program, &config)?;

    let output = match &cli.output {
        Some(path) => path.clone(),
        None => cli.input.with_extension(config.asm_extension.trim_start_matches('.')),
    };
    fs::write(&output, assembly)?;
    info!("wrote {}", output.display());

    if cli.show_link_command {
        let binary = output.with_extension(config.binary_extension.trim_start_matches('.'));
        let command = config.assemble_command_for(&binary, &output);
        println!("{}", command.join(" "));
    }
    Ok(())
}
