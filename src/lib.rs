//! # LS-8 Emulator
//!
//! An emulator for the LS-8, a minimal 8-bit virtual CPU with 256 bytes of
//! memory, eight registers and a small instruction set. Programs are plain
//! text files holding one binary literal per line.

pub mod cpu;
pub mod asm;

#[cfg(feature = "tui")]
pub mod tui;

// Re-export commonly used types
pub use cpu::{Cpu, CpuState, CpuError, Memory, Registers, Instruction, Flag};
pub use asm::{assemble, disassemble, AssemblerError, ProgramFile, ProgramError, load_program_file, parse_program, save_program_file};

#[cfg(feature = "tui")]
pub use tui::run_debugger;
