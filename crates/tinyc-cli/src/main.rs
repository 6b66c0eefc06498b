use std::fs;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;

#[derive(Parser)]
#[command(name = "tinyc")]
#[command(about = "Compiles and runs a small C-like source file")]
struct Cli {
    #[arg(help = "Input source file")]
    input: PathBuf,

    #[arg(long, help = "Run with the tree-walking interpreter instead of native codegen")]
    interpret: bool,

    #[arg(long, help = "Compile only; report the generated code size and exit without running it")]
    emit_only: bool,

    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase log verbosity (-v, -vv)")]
    verbose: u8,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}: {err:#}", cli.input.display());
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    let default_filter = match verbose {
        0 => "tinyc=warn",
        1 => "tinyc=info",
        _ => "tinyc=debug",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .with_writer(io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;

    if cli.emit_only {
        let (program, symtab) = tinyc::parse::Parser::new(&source)?.parse_program()?;
        let emitter = tinyc::codegen::compile(&program, symtab.len())?;
        let executable = emitter.finish()?;
        drop(executable);
        println!("{}: compiled ({} statements)", cli.input.display(), program.body.len());
        return Ok(());
    }

    if cli.interpret {
        let stdout = io::stdout();
        let mut lock = stdout.lock();
        tinyc::interpret(&source, &mut lock)?;
    } else {
        tinyc::run(&source)?;
    }

    Ok(())
}
