//! Program files, assembler and disassembler for LS-8 programs.
//!
//! This module provides:
//! - The `.ls8` program format (one binary literal per line)
//! - A simple two-pass assembler (mnemonics → bytes)
//! - A disassembler (bytes → readable text)

pub mod assembler;
pub mod disasm;
pub mod program;

pub use assembler::{assemble, AssemblerError};
pub use disasm::disassemble;
pub use program::{ProgramFile, ProgramError, load_program_file, parse_program, save_program_file};
