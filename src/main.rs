use anyhow::Result;
use bytelox::{compile, interpret, run, InterpretResult};
use clap::{ArgAction, Parser};
use env_logger::Builder;
use log::{error, LevelFilter};
use std::io::BufRead;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(version, about = "Bytecode interpreter for Lox scripts")]
struct Args {
    /// Script to run. Starts a REPL when omitted.
    #[arg(short, long)]
    file: Option<PathBuf>,
    /// Print the disassembled bytecode before running
    #[arg(short, long)]
    disassemble: bool,
    /// Log more (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logger(args.verbose);

    let result = if let Some(path) = &args.file {
        run_file(path, args.disassemble)?
    } else {
        repl(args.disassemble)?;
        InterpretResult::Ok
    };

    Ok(ExitCode::from(result.exit_code()))
}

fn repl(disassemble: bool) -> Result<()> {
    let mut stdout = std::io::stdout();
    write!(stdout, ">")?;
    stdout.flush()?;
    let stdin = std::io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            break;
        }
        let _ = execute(&line, disassemble);
        let mut stdout = std::io::stdout();
        write!(stdout, ">")?;
        stdout.flush()?;
    }
    Ok(())
}

fn run_file(path: &PathBuf, disassemble: bool) -> Result<InterpretResult> {
    let contents = std::fs::read_to_string(path)?;
    Ok(execute(&contents, disassemble))
}

fn execute(source: &str, disassemble: bool) -> InterpretResult {
    let mut stdout = std::io::stdout();
    let result = if disassemble {
        compile(source)
            .map_err(Into::into)
            .and_then(|program| {
                println!("{}", program.disassemble());
                run(&program, &mut stdout)
            })
    } else {
        interpret(source, &mut stdout)
    };
    if let Err(e) = &result {
        error!("{e}");
    }
    InterpretResult::from(&result)
}

fn init_logger(verbose: u8) {
    let mut builder = Builder::from_default_env();
    let level = match verbose {
        0 if cfg!(debug_assertions) => Some(LevelFilter::Trace),
        0 => None,
        1 => Some(LevelFilter::Info),
        2 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    };
    if let Some(level) = level {
        builder.filter_level(level);
    }
    builder.init()
}
