//! LS-8 Emulator - CLI Entry Point
//!
//! Usage:
//! - `ls8-emu <program>` - Run an `.ls8` program until it halts
//! - `ls8-emu asm <source>` - Assemble mnemonics to an `.ls8` program
//! - `ls8-emu disasm <program>` - Disassemble an `.ls8` program
//! - `ls8-emu debug <program>` - Interactive debugger

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use thiserror::Error;

use ls8::cpu::memory::MemoryError;
use ls8::{assemble, disassemble, load_program_file, save_program_file, AssemblerError, Cpu, CpuError, ProgramError};

#[derive(Parser)]
#[command(name = "ls8-emu")]
#[command(version)]
#[command(about = "An emulator for the LS-8, a minimal 8-bit virtual CPU")]
#[command(args_conflicts_with_subcommands = true)]
struct Cli {
    /// Path to the .ls8 program to run
    program: Option<PathBuf>,

    /// Print a trace line to stderr before every instruction
    #[arg(short, long)]
    trace: bool,

    /// Give up after this many instructions
    #[arg(short, long)]
    max_cycles: Option<u64>,

    /// Write the final CPU state as JSON to this file
    #[arg(long, value_name = "FILE")]
    dump_state: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Assemble mnemonic source to an .ls8 program
    Asm {
        /// Path to the source file
        source: PathBuf,
        /// Output program file (defaults to the source with an .ls8 extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Disassemble an .ls8 program to readable text
    Disasm {
        /// Path to the program file
        program: PathBuf,
    },
    /// Interactive debugger
    #[cfg(feature = "tui")]
    Debug {
        /// Path to the program file to debug
        program: PathBuf,
    },
}

/// Everything that can stop the emulator.
#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Program(#[from] ProgramError),

    #[error(transparent)]
    Cpu(#[from] CpuError),

    #[error(transparent)]
    Memory(#[from] MemoryError),

    #[error(transparent)]
    Assembler(#[from] AssemblerError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("failed to serialize CPU state: {0}")]
    Json(#[from] serde_json::Error),

    #[error("program did not halt within {0} cycles")]
    CycleLimit(u64),
}

struct RunOptions {
    trace: bool,
    max_cycles: Option<u64>,
    dump_state: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Some(Commands::Asm { source, output }) => assemble_file(&source, output),
        Some(Commands::Disasm { program }) => disassemble_file(&program),
        #[cfg(feature = "tui")]
        Some(Commands::Debug { program }) => debug_program(&program),
        None => {
            let options = RunOptions {
                trace: cli.trace,
                max_cycles: cli.max_cycles,
                dump_state: cli.dump_state,
            };
            run_program(cli.program.as_deref(), &options)
        }
    };

    if let Err(e) = result {
        eprintln!("error: {}", e);
        process::exit(1);
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(e) = SimpleLogger::new().with_level(level).env().init() {
        eprintln!("warning: logging disabled: {}", e);
    }
}

fn run_program(path: Option<&Path>, options: &RunOptions) -> Result<(), AppError> {
    let program = load_program_file(path)?;
    if program.is_empty() {
        warn!("program is empty, memory is all zeros");
    }

    let mut cpu = Cpu::new();
    cpu.load_program(&program.bytes)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = execute(&mut cpu, &mut out, options);
    out.flush()?;

    if let Some(dump_path) = &options.dump_state {
        let json = serde_json::to_string_pretty(&cpu)?;
        std::fs::write(dump_path, json)?;
        info!("wrote CPU state to {}", dump_path.display());
    }

    result
}

fn execute<W: Write>(cpu: &mut Cpu, out: &mut W, options: &RunOptions) -> Result<(), AppError> {
    let limit = options.max_cycles.unwrap_or(u64::MAX);
    let trace = options.trace;

    let executed = cpu.run_limited(out, limit, |cpu| {
        if trace {
            eprintln!("{}", cpu.trace());
        }
    })?;

    if cpu.is_running() {
        return Err(AppError::CycleLimit(limit));
    }

    info!("executed {} instructions", executed);
    Ok(())
}

fn assemble_file(source_path: &Path, output: Option<PathBuf>) -> Result<(), AppError> {
    let out_path = output.unwrap_or_else(|| source_path.with_extension("ls8"));
    info!("assembling {} -> {}", source_path.display(), out_path.display());

    let source = std::fs::read_to_string(source_path)?;
    let bytes = assemble(&source)?;
    save_program_file(&out_path, &bytes)?;

    eprintln!("Assembled {} bytes to {}", bytes.len(), out_path.display());
    Ok(())
}

fn disassemble_file(path: &Path) -> Result<(), AppError> {
    let program = load_program_file(Some(path))?;
    print!("{}", disassemble(&program.bytes));
    Ok(())
}

#[cfg(feature = "tui")]
fn debug_program(path: &Path) -> Result<(), AppError> {
    let program = load_program_file(Some(path))?;
    ls8::run_debugger(program.bytes)?;
    Ok(())
}
